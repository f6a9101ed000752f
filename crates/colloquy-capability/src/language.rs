//! Language generation capability adapter.
//!
//! `LanguageClient` is the outbound boundary to the real text-generation
//! service. `LanguageAdapter` wraps a client with the configured timeout,
//! a single retry on upstream failure, and output-length bounding.
//! `MockLanguage` is a deterministic, scriptable client for tests and the
//! demo binary.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, warn};

use colloquy_core::config::LanguageConfig;

use crate::error::CapabilityError;

/// Outbound boundary to a text-generation service.
#[async_trait]
pub trait LanguageClient: Send + Sync {
    /// Generate text for the given prompt.
    async fn generate(
        &self,
        prompt: &str,
        max_tokens: u32,
        temperature: f64,
    ) -> Result<String, CapabilityError>;
}

/// Adapter enforcing timeout, retry, and output-length policy around a
/// [`LanguageClient`].
pub struct LanguageAdapter {
    client: Arc<dyn LanguageClient>,
    config: LanguageConfig,
}

impl LanguageAdapter {
    pub fn new(client: Arc<dyn LanguageClient>, config: LanguageConfig) -> Self {
        Self { client, config }
    }

    /// Generate text with the configured policy applied.
    ///
    /// A timed-out call is cancelled: the in-flight future is dropped, so it
    /// cannot race a later call for the same session. Upstream failures are
    /// retried once; timeouts and rate limits are not.
    pub async fn generate(&self, prompt: &str) -> Result<String, CapabilityError> {
        match self.generate_once(prompt).await {
            Ok(text) => Ok(text),
            Err(CapabilityError::Upstream(first)) => {
                warn!(error = %first, "language call failed, retrying once");
                self.generate_once(prompt).await
            }
            Err(e) => Err(e),
        }
    }

    async fn generate_once(&self, prompt: &str) -> Result<String, CapabilityError> {
        let limit = Duration::from_secs(self.config.timeout_secs);
        let call = self
            .client
            .generate(prompt, self.config.max_tokens, self.config.temperature);

        match tokio::time::timeout(limit, call).await {
            Ok(Ok(text)) => Ok(bound_output(text, self.config.max_output_chars)),
            Ok(Err(e)) => Err(e),
            Err(_) => {
                warn!(timeout_secs = self.config.timeout_secs, "language call timed out");
                Err(CapabilityError::Timeout(limit))
            }
        }
    }
}

/// Truncate generated text to at most `max_chars` characters.
fn bound_output(text: String, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text;
    }
    debug!(max_chars, "truncating language output");
    text.chars().take(max_chars).collect()
}

// ---------------------------------------------------------------------------
// MockLanguage - deterministic scriptable client for tests
// ---------------------------------------------------------------------------

/// Mock language client with scriptable replies and failures.
///
/// Replies are served from a FIFO script; once the script is exhausted the
/// client returns the default reply, or the configured permanent failure.
/// Every prompt is recorded for assertions.
#[derive(Debug)]
pub struct MockLanguage {
    default_reply: String,
    fail_with: Option<CapabilityError>,
    script: Mutex<VecDeque<Result<String, CapabilityError>>>,
    delay: Option<Duration>,
    prompts: Mutex<Vec<String>>,
}

impl MockLanguage {
    /// A client that always answers with a fixed default reply.
    pub fn new() -> Self {
        Self::with_reply("This is a mock language response.")
    }

    /// A client that always answers with the given reply.
    pub fn with_reply(reply: impl Into<String>) -> Self {
        Self {
            default_reply: reply.into(),
            fail_with: None,
            script: Mutex::new(VecDeque::new()),
            delay: None,
            prompts: Mutex::new(Vec::new()),
        }
    }

    /// A client whose every call fails with the given error.
    pub fn failing(err: CapabilityError) -> Self {
        Self {
            default_reply: String::new(),
            fail_with: Some(err),
            script: Mutex::new(VecDeque::new()),
            delay: None,
            prompts: Mutex::new(Vec::new()),
        }
    }

    /// Queue scripted results, served in order before the default behavior.
    pub fn with_script(
        mut self,
        script: Vec<Result<String, CapabilityError>>,
    ) -> Self {
        self.script = Mutex::new(script.into());
        self
    }

    /// Sleep this long before answering (used to exercise timeouts).
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// All prompts received so far, in call order.
    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().expect("prompt log poisoned").clone()
    }

    /// Number of calls received so far.
    pub fn call_count(&self) -> usize {
        self.prompts.lock().expect("prompt log poisoned").len()
    }
}

impl Default for MockLanguage {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl LanguageClient for MockLanguage {
    async fn generate(
        &self,
        prompt: &str,
        _max_tokens: u32,
        _temperature: f64,
    ) -> Result<String, CapabilityError> {
        self.prompts
            .lock()
            .expect("prompt log poisoned")
            .push(prompt.to_string());

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
        Ok(self.default_reply.clone())
    }
}
