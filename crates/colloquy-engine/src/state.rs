//! Turn state machine with validated transitions.
//!
//! Every turn moves through:
//! Idle -> Routing -> Dispatching -> Synthesizing -> Persisted
//! or, when the selected capability path fails:
//! Idle -> Routing -> Dispatching -> Fallback -> Persisted
//!
//! `Dispatching` covers every capability call for the turn, including the
//! synthesis call that grounds a search or document answer; `Synthesizing`
//! is the pure composition of the final result. No state survives a process
//! restart except through the persisted session.

use crate::error::EngineError;

/// Processing phase of a single turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnPhase {
    Idle,
    Routing,
    Dispatching,
    Synthesizing,
    Fallback,
    Persisted,
}

/// Validate that a phase transition is allowed.
///
/// Valid transitions:
/// - Idle -> Routing
/// - Routing -> Dispatching
/// - Dispatching -> Synthesizing
/// - Dispatching -> Fallback
/// - Synthesizing -> Persisted
/// - Fallback -> Persisted
pub fn validate_transition(from: TurnPhase, to: TurnPhase) -> Result<(), EngineError> {
    let valid = matches!(
        (from, to),
        (TurnPhase::Idle, TurnPhase::Routing)
            | (TurnPhase::Routing, TurnPhase::Dispatching)
            | (TurnPhase::Dispatching, TurnPhase::Synthesizing)
            | (TurnPhase::Dispatching, TurnPhase::Fallback)
            | (TurnPhase::Synthesizing, TurnPhase::Persisted)
            | (TurnPhase::Fallback, TurnPhase::Persisted)
    );

    if valid {
        Ok(())
    } else {
        Err(EngineError::InvalidTransition(from, to))
    }
}
