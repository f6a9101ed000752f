//! Shared foundation for the Colloquy conversation engine.
//!
//! Defines the configuration surface, the top-level error type, and the
//! domain types (sessions, turns, sources, routes) used across crates.

pub mod config;
pub mod error;
pub mod types;

pub use config::ColloquyConfig;
pub use error::{ColloquyError, Result};
pub use types::*;
