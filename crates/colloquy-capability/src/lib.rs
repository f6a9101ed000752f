//! Capability adapters for remote services.
//!
//! Wraps the external language-generation and web-search calls behind
//! adapters that enforce a per-call timeout, bound result size, and convert
//! every transport failure into a typed [`CapabilityError`]. The uniform
//! error surface is what lets the orchestration engine apply one fallback
//! policy regardless of which capability failed.

pub mod error;
pub mod language;
pub mod search;

pub use error::CapabilityError;
pub use language::{LanguageAdapter, LanguageClient, MockLanguage};
pub use search::{MockSearch, SearchAdapter, SearchClient};
