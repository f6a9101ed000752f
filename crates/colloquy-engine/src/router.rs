//! Intent classification.
//!
//! The router asks the language capability for a one-word label and maps it
//! onto a [`Route`]. Anything it cannot interpret, including an adapter
//! failure, falls back to `DirectChat` with `defaulted` set, so a turn can
//! always proceed.

use std::sync::Arc;

use tracing::{debug, warn};

use colloquy_core::{Route, RouteDecision};

use crate::prompt;
use colloquy_capability::LanguageAdapter;

pub struct IntentRouter {
    language: Arc<LanguageAdapter>,
}

impl IntentRouter {
    pub fn new(language: Arc<LanguageAdapter>) -> Self {
        Self { language }
    }

    /// Classify a query into a route.
    ///
    /// `has_documents` lets the prompt mention whether any documents exist;
    /// a `DocumentQuery` label with an empty index is coerced to
    /// `DirectChat`, since there is nothing to retrieve against.
    pub async fn classify(&self, query: &str, context: &str, has_documents: bool) -> RouteDecision {
        let prompt = prompt::routing_prompt(query, context, has_documents);
        let raw = match self.language.generate(&prompt).await {
            Ok(text) => text,
            Err(err) => {
                warn!(error = %err, "routing call failed, defaulting to direct chat");
                return RouteDecision::defaulted(format!("classification failed: {err}"));
            }
        };

        let decision = match parse_route(&raw) {
            Some(route) => {
                debug!(route = %route, label = %raw.trim(), "query classified");
                RouteDecision::classified(route, format!("classified as {route}"))
            }
            None => {
                warn!(label = %raw.trim(), "unrecognized routing label, defaulting");
                RouteDecision::defaulted(format!("unrecognized label {:?}", raw.trim()))
            }
        };

        if decision.route == Route::DocumentQuery && !has_documents {
            return RouteDecision::classified(
                Route::DirectChat,
                "document query with no documents indexed".to_string(),
            );
        }
        decision
    }
}

/// Map a model label onto a route.
///
/// Checked in order of specificity: a verbose reply like "SEARCH THE
/// DOCUMENTS" should land on documents, so that substring wins first.
fn parse_route(label: &str) -> Option<Route> {
    let upper = label.trim().to_uppercase();
    if upper.contains("DOCUMENT") {
        Some(Route::DocumentQuery)
    } else if upper.contains("SEARCH") {
        Some(Route::WebSearch)
    } else if upper.contains("DIRECT") {
        Some(Route::DirectChat)
    } else {
        None
    }
}
