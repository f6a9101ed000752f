//! Domain types shared across the Colloquy crates.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// =============================================================================
// Conversation turns
// =============================================================================

/// Who produced a turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

/// A reference to external material backing an assistant turn.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Source {
    pub title: String,
    pub url: String,
    pub snippet: String,
}

/// One message within a session. Immutable once appended.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Turn {
    pub role: Role,
    pub content: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub sources: Vec<Source>,
    pub timestamp: DateTime<Utc>,
}

impl Turn {
    /// Create a user turn with the current timestamp.
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
            sources: Vec::new(),
            timestamp: Utc::now(),
        }
    }

    /// Create an assistant turn with the current timestamp.
    pub fn assistant(content: impl Into<String>, sources: Vec<Source>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
            sources,
            timestamp: Utc::now(),
        }
    }
}

// =============================================================================
// Routing
// =============================================================================

/// The capability path selected for a turn.
///
/// Always exactly one of the three values. Internal fan-out (e.g. a search
/// answer synthesized by the language capability) still emits a single tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Route {
    DirectChat,
    WebSearch,
    DocumentQuery,
}

impl Route {
    pub fn as_str(&self) -> &'static str {
        match self {
            Route::DirectChat => "direct_chat",
            Route::WebSearch => "web_search",
            Route::DocumentQuery => "document_query",
        }
    }
}

impl std::fmt::Display for Route {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The router's per-turn classification. Transient, never persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteDecision {
    pub route: Route,
    /// Why this route was chosen (raw classifier output or default reason).
    pub rationale: String,
    /// True when the classifier output was invalid or unavailable and the
    /// router fell back to `DirectChat`.
    pub defaulted: bool,
}

impl RouteDecision {
    /// A decision produced by a valid classifier answer.
    pub fn classified(route: Route, rationale: impl Into<String>) -> Self {
        Self {
            route,
            rationale: rationale.into(),
            defaulted: false,
        }
    }

    /// The designed fallback decision: `DirectChat`, flagged as defaulted.
    pub fn defaulted(rationale: impl Into<String>) -> Self {
        Self {
            route: Route::DirectChat,
            rationale: rationale.into(),
            defaulted: true,
        }
    }
}

// =============================================================================
// Documents
// =============================================================================

/// Inbound shape for document ingestion: plain-text chunks produced by an
/// external file parser.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkInput {
    pub text: String,
    pub index: usize,
}

// =============================================================================
// Sessions
// =============================================================================

/// Administrative view of one session.
#[derive(Debug, Clone, Serialize)]
pub struct SessionSummary {
    pub session_id: String,
    /// Turns appended over the session's lifetime, including evicted ones.
    pub message_count: u64,
    pub created_at: DateTime<Utc>,
    pub last_activity: DateTime<Utc>,
}
