//! Typed failures for capability calls.

use std::time::Duration;

/// Errors from a capability adapter.
///
/// The underlying transport's native failure never leaks past the adapter;
/// every failure mode is folded into one of these variants.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CapabilityError {
    #[error("capability call timed out after {0:?}")]
    Timeout(Duration),
    #[error("upstream error: {0}")]
    Upstream(String),
    #[error("rate limited by upstream")]
    RateLimited,
}
