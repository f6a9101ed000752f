//! Per-session critical sections.
//!
//! Turns within one session must not interleave their context read and
//! turn append. Each session gets its own async mutex, handed out from a
//! keyed registry; the registry lock itself is never held across an await.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

/// Registry of per-session async locks.
#[derive(Debug, Default)]
pub struct SessionLocks {
    inner: Mutex<HashMap<String, Arc<AsyncMutex<()>>>>,
}

impl SessionLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Acquire the exclusive lock for a session, creating it on first use.
    ///
    /// The returned guard is held for the whole turn (steps 1-4 of the
    /// engine algorithm), including capability awaits.
    pub async fn acquire(&self, session_id: &str) -> OwnedMutexGuard<()> {
        let lock = {
            // Registry poisoning cannot corrupt the map: the held section is
            // a plain entry lookup, so recover the guard and continue.
            let mut map = self.inner.lock().unwrap_or_else(|e| e.into_inner());
            Arc::clone(
                map.entry(session_id.to_string())
                    .or_insert_with(|| Arc::new(AsyncMutex::new(()))),
            )
        };
        lock.lock_owned().await
    }

    /// Drop the lock entry for a cleared session.
    ///
    /// The entry is removed only when nothing else holds the lock's `Arc`.
    /// An in-flight turn (guard or pending `acquire`) keeps the entry in
    /// place, so a later turn for the same id contends on the same mutex
    /// instead of minting a fresh one and interleaving.
    pub fn remove(&self, session_id: &str) {
        let mut map = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        if map
            .get(session_id)
            .is_some_and(|lock| Arc::strong_count(lock) == 1)
        {
            map.remove(session_id);
        }
    }

    /// Number of registered session locks.
    pub fn len(&self) -> usize {
        self.inner.lock().map(|m| m.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_acquire_creates_lock() {
        let locks = SessionLocks::new();
        let _guard = locks.acquire("s1").await;
        assert_eq!(locks.len(), 1);
    }

    #[tokio::test]
    async fn test_same_session_is_exclusive() {
        let locks = Arc::new(SessionLocks::new());
        let guard = locks.acquire("s1").await;

        let locks2 = Arc::clone(&locks);
        let contender = tokio::spawn(async move {
            let _guard = locks2.acquire("s1").await;
        });

        // The contender cannot finish while the guard is held.
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!contender.is_finished());

        drop(guard);
        tokio::time::timeout(Duration::from_secs(1), contender)
            .await
            .expect("contender should acquire after release")
            .unwrap();
    }

    #[tokio::test]
    async fn test_distinct_sessions_do_not_block() {
        let locks = SessionLocks::new();
        let _g1 = locks.acquire("s1").await;
        // Acquiring a different session must not deadlock.
        let _g2 = tokio::time::timeout(Duration::from_millis(100), locks.acquire("s2"))
            .await
            .expect("distinct session should acquire immediately");
    }

    #[tokio::test]
    async fn test_remove_drops_entry() {
        let locks = SessionLocks::new();
        {
            let _guard = locks.acquire("s1").await;
        }
        locks.remove("s1");
        assert!(locks.is_empty());
    }

    #[tokio::test]
    async fn test_remove_keeps_entry_while_turn_in_flight() {
        let locks = Arc::new(SessionLocks::new());
        let guard = locks.acquire("s1").await;

        // Clearing mid-turn must not hand out a fresh mutex.
        locks.remove("s1");
        assert_eq!(locks.len(), 1);

        let locks2 = Arc::clone(&locks);
        let contender = tokio::spawn(async move {
            let _guard = locks2.acquire("s1").await;
        });
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!contender.is_finished());

        drop(guard);
        tokio::time::timeout(Duration::from_secs(1), contender)
            .await
            .expect("contender should acquire after release")
            .unwrap();
    }

    #[tokio::test]
    async fn test_reacquire_after_remove() {
        let locks = SessionLocks::new();
        {
            let _guard = locks.acquire("s1").await;
        }
        locks.remove("s1");
        let _guard = locks.acquire("s1").await;
        assert_eq!(locks.len(), 1);
    }
}
