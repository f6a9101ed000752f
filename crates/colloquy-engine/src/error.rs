//! Error types and public error kinds for the orchestration engine.

use serde::{Deserialize, Serialize};

use colloquy_capability::CapabilityError;
use colloquy_index::IndexError;
use colloquy_memory::MemoryError;

use crate::state::TurnPhase;

/// Public classification of what went wrong during a turn.
///
/// Capability failures never surface as `Err` from the engine; they drive
/// fallback transitions and are reported through this kind on the turn
/// result. Only `TerminalFailure` accompanies `success: false`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// The router's classifier output was invalid or unavailable; the turn
    /// proceeded on the direct-chat default.
    RoutingDefaulted,
    CapabilityTimeout,
    CapabilityUpstreamError,
    CapabilityRateLimited,
    /// The selected retrieval path produced no usable results.
    EmptyRetrieval,
    /// Every fallback path was exhausted; no answer was produced.
    TerminalFailure,
}

impl From<&CapabilityError> for ErrorKind {
    fn from(err: &CapabilityError) -> Self {
        match err {
            CapabilityError::Timeout(_) => ErrorKind::CapabilityTimeout,
            CapabilityError::Upstream(_) => ErrorKind::CapabilityUpstreamError,
            CapabilityError::RateLimited => ErrorKind::CapabilityRateLimited,
        }
    }
}

/// Errors from the orchestration engine itself.
///
/// These indicate misuse or infrastructure failure, not capability
/// degradation; degradation is expressed in [`crate::TurnResult`].
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("query cannot be empty")]
    EmptyQuery,
    #[error("query exceeds maximum length of {0} characters")]
    QueryTooLong(usize),
    #[error("invalid phase transition: {0:?} -> {1:?}")]
    InvalidTransition(TurnPhase, TurnPhase),
    #[error("memory error: {0}")]
    Memory(#[from] MemoryError),
    #[error("index error: {0}")]
    Index(#[from] IndexError),
}
