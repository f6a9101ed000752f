//! Web search capability adapter.
//!
//! `SearchClient` is the outbound boundary to the real search provider.
//! `SearchAdapter` enforces the configured timeout and bounds the result
//! count. `MockSearch` produces deterministic hits for tests and the demo
//! binary.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tracing::warn;

use colloquy_core::config::SearchConfig;
use colloquy_core::types::Source;

use crate::error::CapabilityError;

/// Outbound boundary to a web-search provider.
#[async_trait]
pub trait SearchClient: Send + Sync {
    /// Run a search and return up to `max_results` hits.
    async fn search(
        &self,
        query: &str,
        max_results: usize,
    ) -> Result<Vec<Source>, CapabilityError>;
}

/// Adapter enforcing timeout and result-count policy around a
/// [`SearchClient`].
pub struct SearchAdapter {
    client: Arc<dyn SearchClient>,
    config: SearchConfig,
}

impl SearchAdapter {
    pub fn new(client: Arc<dyn SearchClient>, config: SearchConfig) -> Self {
        Self { client, config }
    }

    /// Run a search with the configured policy applied.
    ///
    /// A timed-out call is cancelled by dropping the in-flight future.
    /// The result list is truncated to `max_results` even if the provider
    /// returns more.
    pub async fn search(&self, query: &str) -> Result<Vec<Source>, CapabilityError> {
        let limit = Duration::from_secs(self.config.timeout_secs);
        let call = self.client.search(query, self.config.max_results);

        match tokio::time::timeout(limit, call).await {
            Ok(Ok(mut hits)) => {
                hits.truncate(self.config.max_results);
                Ok(hits)
            }
            Ok(Err(e)) => Err(e),
            Err(_) => {
                warn!(timeout_secs = self.config.timeout_secs, "search call timed out");
                Err(CapabilityError::Timeout(limit))
            }
        }
    }
}

// ---------------------------------------------------------------------------
// MockSearch - deterministic scriptable client for tests
// ---------------------------------------------------------------------------

/// Mock search client with deterministic results and scriptable failures.
#[derive(Debug)]
pub struct MockSearch {
    hits_per_query: usize,
    fail_with: Option<CapabilityError>,
    script: Mutex<VecDeque<Result<Vec<Source>, CapabilityError>>>,
    delay: Option<Duration>,
    queries: Mutex<Vec<String>>,
}

impl MockSearch {
    /// A client returning three deterministic hits per query.
    pub fn new() -> Self {
        Self::with_hits(3)
    }

    /// A client returning `hits_per_query` deterministic hits per query.
    pub fn with_hits(hits_per_query: usize) -> Self {
        Self {
            hits_per_query,
            fail_with: None,
            script: Mutex::new(VecDeque::new()),
            delay: None,
            queries: Mutex::new(Vec::new()),
        }
    }

    /// A client that always returns an empty result set.
    pub fn empty() -> Self {
        Self::with_hits(0)
    }

    /// A client whose every call fails with the given error.
    pub fn failing(err: CapabilityError) -> Self {
        Self {
            hits_per_query: 0,
            fail_with: Some(err),
            script: Mutex::new(VecDeque::new()),
            delay: None,
            queries: Mutex::new(Vec::new()),
        }
    }

    /// Queue scripted results, served in order before the default behavior.
    pub fn with_script(
        mut self,
        script: Vec<Result<Vec<Source>, CapabilityError>>,
    ) -> Self {
        self.script = Mutex::new(script.into());
        self
    }

    /// Sleep this long before answering (used to exercise timeouts).
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// All queries received so far, in call order.
    pub fn queries(&self) -> Vec<String> {
        self.queries.lock().expect("query log poisoned").clone()
    }

    /// Number of calls received so far.
    pub fn call_count(&self) -> usize {
        self.queries.lock().expect("query log poisoned").len()
    }

    fn make_hits(&self, query: &str, max_results: usize) -> Vec<Source> {
        (0..self.hits_per_query.min(max_results))
            .map(|i| Source {
                title: format!("Result {} for '{}'", i + 1, query),
                url: format!("https://search.example/{}", i + 1),
                snippet: format!("Snippet {} about {}", i + 1, query),
            })
            .collect()
    }
}

impl Default for MockSearch {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SearchClient for MockSearch {
    async fn search(
        &self,
        query: &str,
        max_results: usize,
    ) -> Result<Vec<Source>, CapabilityError> {
        self.queries
            .lock()
            .expect("query log poisoned")
            .push(query.to_string());

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        let scripted = self.script.lock().expect("script poisoned").pop_front();
        if let Some(result) = scripted {
            return result;
        }
        if let Some(ref err) = self.fail_with {
            return Err(err.clone());
        }
        Ok(self.make_hits(query, max_results))
    }
}
