//! Per-session conversation memory for Colloquy.
//!
//! Stores bounded, append-only turn histories keyed by session id, with
//! FIFO eviction under a turn-window and a token-budget bound, plus an
//! advisory idle-session sweep.

pub mod error;
pub mod store;

pub use error::MemoryError;
pub use store::{estimate_tokens, MemoryStore};
