//! Conversation orchestration engine for Colloquy.
//!
//! Sequences each turn through intent classification, capability dispatch,
//! response synthesis, and memory persistence, with an ordered fallback
//! policy when a capability path fails. Turns for the same session are
//! serialized; distinct sessions run concurrently.

pub mod engine;
pub mod error;
pub mod locks;
pub mod prompt;
pub mod router;
pub mod state;

pub use engine::{Engine, TurnResult};
pub use error::{EngineError, ErrorKind};
pub use router::IntentRouter;
pub use state::{validate_transition, TurnPhase};
