//! Keyed session store with bounded histories.
//!
//! The store-level map lock is held only long enough to fetch or create a
//! session entry; all turn operations run under that session's own mutex,
//! so unrelated sessions never contend.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, RwLock};

use chrono::{DateTime, Duration, Utc};
use tracing::{debug, info};

use colloquy_core::types::{SessionSummary, Turn};

use crate::error::MemoryError;

/// Estimate the token count of a text.
///
/// Roughly four characters per token, rounded up, at least one token per
/// non-empty turn. Good enough for a budget bound; exact tokenization is
/// the language backend's concern.
pub fn estimate_tokens(text: &str) -> usize {
    text.chars().count().div_ceil(4).max(1)
}

/// Internal per-session state.
#[derive(Debug)]
struct SessionState {
    turns: VecDeque<Turn>,
    /// Cached sum of `estimate_tokens` over `turns`.
    token_total: usize,
    created_at: DateTime<Utc>,
    last_activity: DateTime<Utc>,
    /// Turns appended over the session's lifetime, including evicted ones.
    appended_total: u64,
}

impl SessionState {
    fn new() -> Self {
        let now = Utc::now();
        Self {
            turns: VecDeque::new(),
            token_total: 0,
            created_at: now,
            last_activity: now,
            appended_total: 0,
        }
    }
}

/// Per-session bounded conversation history.
///
/// Eviction runs synchronously on every append: oldest turns are dropped
/// first while either the turn window or the token budget is exceeded.
/// The newest turn is never evicted to satisfy the token budget, even when
/// it alone exceeds it.
#[derive(Debug)]
pub struct MemoryStore {
    sessions: RwLock<HashMap<String, Arc<Mutex<SessionState>>>>,
    window_turns: usize,
    max_tokens: usize,
}

impl MemoryStore {
    /// Create a store with the given window and token bounds.
    pub fn new(window_turns: usize, max_tokens: usize) -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            window_turns,
            max_tokens,
        }
    }

    /// Append a turn to a session, creating the session if needed.
    ///
    /// Returns the number of turns evicted to restore the bounds.
    pub fn append(&self, session_id: &str, turn: Turn) -> Result<usize, MemoryError> {
        let entry = self.entry(session_id)?;
        let mut state = entry
            .lock()
            .map_err(|e| MemoryError::LockPoisoned(e.to_string()))?;

        state.token_total += estimate_tokens(&turn.content);
        state.turns.push_back(turn);
        state.last_activity = Utc::now();
        state.appended_total += 1;

        let evicted = Self::evict(&mut state, self.window_turns, self.max_tokens);
        if evicted > 0 {
            debug!(session_id, evicted, "evicted oldest turns");
        }
        Ok(evicted)
    }

    /// Return up to the most recent `max_turns` turns, oldest first.
    ///
    /// An unknown session yields an empty sequence; sessions are created
    /// lazily on first append.
    pub fn get_context(
        &self,
        session_id: &str,
        max_turns: usize,
    ) -> Result<Vec<Turn>, MemoryError> {
        let sessions = self
            .sessions
            .read()
            .map_err(|e| MemoryError::LockPoisoned(e.to_string()))?;
        let Some(entry) = sessions.get(session_id).cloned() else {
            return Ok(Vec::new());
        };
        drop(sessions);

        let state = entry
            .lock()
            .map_err(|e| MemoryError::LockPoisoned(e.to_string()))?;
        let skip = state.turns.len().saturating_sub(max_turns);
        Ok(state.turns.iter().skip(skip).cloned().collect())
    }

    /// Remove a session and its history. Clearing an unknown session is
    /// not an error.
    pub fn clear(&self, session_id: &str) -> Result<(), MemoryError> {
        let mut sessions = self
            .sessions
            .write()
            .map_err(|e| MemoryError::LockPoisoned(e.to_string()))?;
        if sessions.remove(session_id).is_some() {
            info!(session_id, "cleared session");
        }
        Ok(())
    }

    /// Ids of all live sessions.
    pub fn list_sessions(&self) -> Result<Vec<String>, MemoryError> {
        let sessions = self
            .sessions
            .read()
            .map_err(|e| MemoryError::LockPoisoned(e.to_string()))?;
        Ok(sessions.keys().cloned().collect())
    }

    /// Administrative summary of one session, if it exists.
    pub fn summary(&self, session_id: &str) -> Result<Option<SessionSummary>, MemoryError> {
        let sessions = self
            .sessions
            .read()
            .map_err(|e| MemoryError::LockPoisoned(e.to_string()))?;
        let Some(entry) = sessions.get(session_id).cloned() else {
            return Ok(None);
        };
        drop(sessions);

        let state = entry
            .lock()
            .map_err(|e| MemoryError::LockPoisoned(e.to_string()))?;
        Ok(Some(SessionSummary {
            session_id: session_id.to_string(),
            message_count: state.appended_total,
            created_at: state.created_at,
            last_activity: state.last_activity,
        }))
    }

    /// Purge sessions idle longer than `ttl`. Advisory housekeeping, not
    /// required for turn correctness.
    ///
    /// Returns the purged ids so callers can release any per-session state
    /// they hold alongside the store.
    pub fn evict_idle(&self, ttl: Duration) -> Result<Vec<String>, MemoryError> {
        let cutoff = Utc::now() - ttl;
        let mut sessions = self
            .sessions
            .write()
            .map_err(|e| MemoryError::LockPoisoned(e.to_string()))?;

        let stale: Vec<String> = sessions
            .iter()
            .filter_map(|(id, entry)| {
                let state = entry.lock().ok()?;
                (state.last_activity < cutoff).then(|| id.clone())
            })
            .collect();

        for id in &stale {
            sessions.remove(id);
        }
        if !stale.is_empty() {
            info!(purged = stale.len(), "idle session sweep");
        }
        Ok(stale)
    }

    /// Number of live sessions.
    pub fn session_count(&self) -> usize {
        self.sessions.read().map(|s| s.len()).unwrap_or(0)
    }

    // -- Private helpers --

    fn entry(&self, session_id: &str) -> Result<Arc<Mutex<SessionState>>, MemoryError> {
        {
            let sessions = self
                .sessions
                .read()
                .map_err(|e| MemoryError::LockPoisoned(e.to_string()))?;
            if let Some(entry) = sessions.get(session_id) {
                return Ok(Arc::clone(entry));
            }
        }
        let mut sessions = self
            .sessions
            .write()
            .map_err(|e| MemoryError::LockPoisoned(e.to_string()))?;
        Ok(Arc::clone(
            sessions
                .entry(session_id.to_string())
                .or_insert_with(|| Arc::new(Mutex::new(SessionState::new()))),
        ))
    }

    /// Drop oldest turns while the bounds are violated.
    ///
    /// The window bound is enforced exactly; the token bound is enforced
    /// down to a single remaining turn.
    fn evict(state: &mut SessionState, window_turns: usize, max_tokens: usize) -> usize {
        let mut evicted = 0;

        while state.turns.len() > window_turns {
            if let Some(old) = state.turns.pop_front() {
                state.token_total -= estimate_tokens(&old.content);
                evicted += 1;
            }
        }
        while state.token_total > max_tokens && state.turns.len() > 1 {
            if let Some(old) = state.turns.pop_front() {
                state.token_total -= estimate_tokens(&old.content);
                evicted += 1;
            }
        }
        evicted
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use colloquy_core::types::Role;

    fn store() -> MemoryStore {
        MemoryStore::new(10, 4000)
    }

    // ---- Token estimation ----

    #[test]
    fn test_estimate_tokens_rounds_up() {
        assert_eq!(estimate_tokens("abcd"), 1);
        assert_eq!(estimate_tokens("abcde"), 2);
        assert_eq!(estimate_tokens(&"a".repeat(400)), 100);
    }

    #[test]
    fn test_estimate_tokens_minimum_one() {
        assert_eq!(estimate_tokens(""), 1);
        assert_eq!(estimate_tokens("a"), 1);
    }

    // ---- Append and context ----

    #[test]
    fn test_append_and_get_context() {
        let store = store();
        store.append("s1", Turn::user("hello")).unwrap();
        store
            .append("s1", Turn::assistant("hi there", vec![]))
            .unwrap();

        let context = store.get_context("s1", 10).unwrap();
        assert_eq!(context.len(), 2);
        assert_eq!(context[0].role, Role::User);
        assert_eq!(context[0].content, "hello");
        assert_eq!(context[1].role, Role::Assistant);
    }

    #[test]
    fn test_get_context_unknown_session_is_empty() {
        let store = store();
        assert!(store.get_context("missing", 10).unwrap().is_empty());
    }

    #[test]
    fn test_get_context_respects_max_turns() {
        let store = store();
        for i in 0..8 {
            store.append("s1", Turn::user(format!("turn {}", i))).unwrap();
        }
        let context = store.get_context("s1", 3).unwrap();
        assert_eq!(context.len(), 3);
        // The most recent three, oldest first.
        assert_eq!(context[0].content, "turn 5");
        assert_eq!(context[2].content, "turn 7");
    }

    #[test]
    fn test_context_ordered_by_append_time() {
        let store = store();
        for i in 0..5 {
            store.append("s1", Turn::user(format!("m{}", i))).unwrap();
        }
        let context = store.get_context("s1", 10).unwrap();
        for pair in context.windows(2) {
            assert!(pair[0].timestamp <= pair[1].timestamp);
        }
    }

    // ---- Window eviction ----

    #[test]
    fn test_window_evicts_oldest_first() {
        let store = MemoryStore::new(3, 4000);
        for i in 0..6 {
            store.append("s1", Turn::user(format!("turn {}", i))).unwrap();
        }
        let context = store.get_context("s1", 10).unwrap();
        assert_eq!(context.len(), 3);
        assert_eq!(context[0].content, "turn 3");
        assert_eq!(context[2].content, "turn 5");
    }

    #[test]
    fn test_append_reports_eviction_count() {
        let store = MemoryStore::new(2, 4000);
        assert_eq!(store.append("s1", Turn::user("a")).unwrap(), 0);
        assert_eq!(store.append("s1", Turn::user("b")).unwrap(), 0);
        assert_eq!(store.append("s1", Turn::user("c")).unwrap(), 1);
    }

    // ---- Token eviction ----

    #[test]
    fn test_token_budget_evicts_oldest_first() {
        // 100-char turns are 25 tokens each; budget fits two.
        let store = MemoryStore::new(100, 50);
        store.append("s1", Turn::user("a".repeat(100))).unwrap();
        store.append("s1", Turn::user("b".repeat(100))).unwrap();
        let evicted = store.append("s1", Turn::user("c".repeat(100))).unwrap();
        assert_eq!(evicted, 1);

        let context = store.get_context("s1", 100).unwrap();
        assert_eq!(context.len(), 2);
        assert!(context[0].content.starts_with('b'));
        assert!(context[1].content.starts_with('c'));
    }

    #[test]
    fn test_single_oversized_turn_is_kept() {
        let store = MemoryStore::new(100, 10);
        store.append("s1", Turn::user("x".repeat(1000))).unwrap();
        let context = store.get_context("s1", 100).unwrap();
        assert_eq!(context.len(), 1);
    }

    #[test]
    fn test_both_bounds_tighter_wins() {
        // Window allows 5, tokens allow 2 of these turns.
        let store = MemoryStore::new(5, 50);
        for i in 0..5 {
            store
                .append("s1", Turn::user(format!("{}{}", i, "a".repeat(99))))
                .unwrap();
        }
        let context = store.get_context("s1", 100).unwrap();
        assert_eq!(context.len(), 2);
        assert!(context[0].content.starts_with('3'));
        assert!(context[1].content.starts_with('4'));
    }

    #[test]
    fn test_bounds_never_exceeded_under_load() {
        let store = MemoryStore::new(4, 100);
        for i in 0..50 {
            store
                .append("s1", Turn::user(format!("message number {}", i)))
                .unwrap();
        }
        let context = store.get_context("s1", 100).unwrap();
        assert!(context.len() <= 4);
        let tokens: usize = context.iter().map(|t| estimate_tokens(&t.content)).sum();
        assert!(tokens <= 100);
        // Newest survives.
        assert_eq!(context.last().unwrap().content, "message number 49");
    }

    // ---- Clear ----

    #[test]
    fn test_clear_removes_session() {
        let store = store();
        store.append("s1", Turn::user("hello")).unwrap();
        store.clear("s1").unwrap();
        assert!(store.get_context("s1", 10).unwrap().is_empty());
        assert_eq!(store.session_count(), 0);
    }

    #[test]
    fn test_clear_is_idempotent() {
        let store = store();
        store.clear("never-existed").unwrap();
        store.append("s1", Turn::user("hello")).unwrap();
        store.clear("s1").unwrap();
        store.clear("s1").unwrap();
    }

    // ---- Listing and summaries ----

    #[test]
    fn test_list_sessions() {
        let store = store();
        store.append("alpha", Turn::user("a")).unwrap();
        store.append("beta", Turn::user("b")).unwrap();
        let mut ids = store.list_sessions().unwrap();
        ids.sort();
        assert_eq!(ids, vec!["alpha", "beta"]);
    }

    #[test]
    fn test_summary_counts_evicted_turns() {
        let store = MemoryStore::new(2, 4000);
        for i in 0..5 {
            store.append("s1", Turn::user(format!("m{}", i))).unwrap();
        }
        let summary = store.summary("s1").unwrap().unwrap();
        assert_eq!(summary.message_count, 5);
        assert_eq!(summary.session_id, "s1");
        assert!(summary.last_activity >= summary.created_at);
    }

    #[test]
    fn test_summary_unknown_session() {
        assert!(store().summary("missing").unwrap().is_none());
    }

    // ---- Idle sweep ----

    #[test]
    fn test_evict_idle_purges_stale_sessions() {
        let store = store();
        store.append("stale", Turn::user("old")).unwrap();
        store.append("fresh", Turn::user("new")).unwrap();

        // Backdate the stale session.
        {
            let sessions = store.sessions.read().unwrap();
            let entry = sessions.get("stale").unwrap();
            entry.lock().unwrap().last_activity = Utc::now() - Duration::hours(2);
        }

        let purged = store.evict_idle(Duration::hours(1)).unwrap();
        assert_eq!(purged, vec!["stale"]);
        assert_eq!(store.list_sessions().unwrap(), vec!["fresh"]);
    }

    #[test]
    fn test_evict_idle_noop_when_all_fresh() {
        let store = store();
        store.append("s1", Turn::user("hi")).unwrap();
        assert!(store.evict_idle(Duration::hours(1)).unwrap().is_empty());
        assert_eq!(store.session_count(), 1);
    }

    // ---- Session isolation ----

    #[test]
    fn test_sessions_are_isolated() {
        let store = store();
        store.append("s1", Turn::user("one")).unwrap();
        store.append("s2", Turn::user("two")).unwrap();

        let c1 = store.get_context("s1", 10).unwrap();
        let c2 = store.get_context("s2", 10).unwrap();
        assert_eq!(c1.len(), 1);
        assert_eq!(c2.len(), 1);
        assert_eq!(c1[0].content, "one");
        assert_eq!(c2[0].content, "two");
    }

    #[test]
    fn test_concurrent_appends_across_sessions() {
        use std::sync::Arc as StdArc;
        use std::thread;

        let store = StdArc::new(MemoryStore::new(100, 100_000));
        let mut handles = Vec::new();
        for i in 0..8 {
            let store = StdArc::clone(&store);
            handles.push(thread::spawn(move || {
                let sid = format!("session-{}", i);
                for j in 0..20 {
                    store.append(&sid, Turn::user(format!("m{}", j))).unwrap();
                }
            }));
        }
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(store.session_count(), 8);
        for i in 0..8 {
            let context = store.get_context(&format!("session-{}", i), 100).unwrap();
            assert_eq!(context.len(), 20);
        }
    }
}
