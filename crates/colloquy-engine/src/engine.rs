//! Turn orchestration.
//!
//! `Engine` owns the session memory, the document index, and the capability
//! adapters, and runs each turn through the phase machine in `state`:
//! classify, dispatch, synthesize (or fall back), persist. Capability
//! failures degrade the turn instead of failing it; only an exhausted
//! fallback chain produces `success: false`.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use colloquy_capability::{LanguageAdapter, LanguageClient, SearchAdapter, SearchClient};
use colloquy_core::{ChunkInput, ColloquyConfig, Route, SessionSummary, Source, Turn};
use colloquy_index::{DocumentIndex, IndexInfo, ScoredChunk};
use colloquy_memory::MemoryStore;

use crate::error::{EngineError, ErrorKind};
use crate::locks::SessionLocks;
use crate::prompt;
use crate::router::IntentRouter;
use crate::state::{validate_transition, TurnPhase};

/// Upper bound on accepted query length, in characters.
pub const MAX_QUERY_LENGTH: usize = 2000;

/// Words kept when retrying a failed search with a shortened query.
const RETRY_QUERY_WORDS: usize = 8;

const SEARCH_UNAVAILABLE_NOTE: &str =
    "Live search was unavailable, so this answer comes from general knowledge.";
const NO_DOCUMENTS_NOTE: &str = "I couldn't find relevant information in the uploaded \
     documents, so this answer comes from general knowledge.";
const TERMINAL_MESSAGE: &str =
    "The assistant could not complete this request. Please try again.";

/// Outcome of one completed turn.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TurnResult {
    pub success: bool,
    pub response: String,
    pub sources: Vec<Source>,
    /// The path that actually produced the response. A turn that fell back
    /// reports `DirectChat`, not the route originally selected.
    pub route: Route,
    pub session_id: String,
    pub timestamp: DateTime<Utc>,
    /// Set when the turn degraded or failed; `None` on a clean turn.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<ErrorKind>,
}

/// What a dispatch path produced, before persistence.
///
/// `route` is the path that actually produced the response; a degraded
/// turn reports `DirectChat` regardless of what the router selected.
struct DispatchOutcome {
    success: bool,
    response: String,
    sources: Vec<Source>,
    route: Route,
    error_kind: Option<ErrorKind>,
}

impl DispatchOutcome {
    fn answered(route: Route, response: String, sources: Vec<Source>) -> Self {
        Self {
            success: true,
            response,
            sources,
            route,
            error_kind: None,
        }
    }

    fn degraded(response: String, kind: ErrorKind) -> Self {
        Self {
            success: true,
            response,
            sources: Vec::new(),
            route: Route::DirectChat,
            error_kind: Some(kind),
        }
    }

    fn terminal() -> Self {
        Self {
            success: false,
            response: TERMINAL_MESSAGE.to_string(),
            sources: Vec::new(),
            route: Route::DirectChat,
            error_kind: Some(ErrorKind::TerminalFailure),
        }
    }
}

/// The conversation orchestration engine.
pub struct Engine {
    memory: Arc<MemoryStore>,
    index: Arc<DocumentIndex>,
    language: Arc<LanguageAdapter>,
    search: SearchAdapter,
    router: IntentRouter,
    locks: SessionLocks,
    /// Documents attributed to a session at ingest time; used to scope
    /// retrieval for that session's queries.
    session_docs: RwLock<HashMap<String, Vec<String>>>,
    window_turns: usize,
    top_k: usize,
    min_score: f64,
    session_ttl: chrono::Duration,
}

impl Engine {
    pub fn new(
        config: &ColloquyConfig,
        memory: Arc<MemoryStore>,
        index: Arc<DocumentIndex>,
        search_client: Arc<dyn SearchClient>,
        language_client: Arc<dyn LanguageClient>,
    ) -> Self {
        let language = Arc::new(LanguageAdapter::new(
            language_client,
            config.language.clone(),
        ));
        Self {
            memory,
            index,
            language: Arc::clone(&language),
            search: SearchAdapter::new(search_client, config.search.clone()),
            router: IntentRouter::new(language),
            locks: SessionLocks::new(),
            session_docs: RwLock::new(HashMap::new()),
            window_turns: config.memory.window_turns,
            top_k: config.retrieval.top_k,
            min_score: config.retrieval.min_score,
            session_ttl: chrono::Duration::minutes(config.memory.session_ttl_minutes as i64),
        }
    }

    // =======================================================================
    // Turn execution
    // =======================================================================

    /// Run one conversational turn for a session.
    ///
    /// Turns for the same session are serialized on a per-session lock held
    /// for the whole turn; distinct sessions proceed concurrently. Returns
    /// `Err` only for invalid input or infrastructure failure; capability
    /// trouble is absorbed by the fallback chain and reported through
    /// [`TurnResult::error_kind`].
    pub async fn run(&self, session_id: &str, query: &str) -> Result<TurnResult, EngineError> {
        let query = query.trim();
        if query.is_empty() {
            return Err(EngineError::EmptyQuery);
        }
        if query.chars().count() > MAX_QUERY_LENGTH {
            return Err(EngineError::QueryTooLong(MAX_QUERY_LENGTH));
        }

        let _guard = self.locks.acquire(session_id).await;
        let mut phase = TurnPhase::Idle;

        // Routing: read the window once; every prompt in this turn sees the
        // same context snapshot.
        self.advance(session_id, &mut phase, TurnPhase::Routing)?;
        let context_turns = self.memory.get_context(session_id, self.window_turns)?;
        let context = prompt::format_context(&context_turns);
        let has_documents = !self.index.is_empty();
        let decision = self.router.classify(query, &context, has_documents).await;
        info!(
            session_id,
            route = %decision.route,
            defaulted = decision.defaulted,
            "turn routed"
        );

        // Dispatch covers every capability call, including the synthesis
        // generation; Synthesizing is pure composition of the final text.
        self.advance(session_id, &mut phase, TurnPhase::Dispatching)?;
        let outcome = match decision.route {
            Route::DirectChat => self.dispatch_direct(query, &context).await,
            Route::WebSearch => self.dispatch_search(query, &context).await,
            Route::DocumentQuery => self.dispatch_documents(session_id, query, &context).await,
        };

        let next = if outcome.error_kind.is_none() {
            TurnPhase::Synthesizing
        } else {
            TurnPhase::Fallback
        };
        self.advance(session_id, &mut phase, next)?;
        self.advance(session_id, &mut phase, TurnPhase::Persisted)?;

        // A terminal failure persists nothing: the turn never happened as
        // far as the session history is concerned.
        if outcome.success {
            self.memory.append(session_id, Turn::user(query))?;
            self.memory.append(
                session_id,
                Turn::assistant(outcome.response.clone(), outcome.sources.clone()),
            )?;
        } else {
            warn!(session_id, "turn failed terminally, nothing persisted");
        }

        let error_kind = outcome
            .error_kind
            .or_else(|| decision.defaulted.then_some(ErrorKind::RoutingDefaulted));

        Ok(TurnResult {
            success: outcome.success,
            response: outcome.response,
            sources: outcome.sources,
            route: outcome.route,
            session_id: session_id.to_string(),
            timestamp: Utc::now(),
            error_kind,
        })
    }

    fn advance(
        &self,
        session_id: &str,
        phase: &mut TurnPhase,
        next: TurnPhase,
    ) -> Result<(), EngineError> {
        validate_transition(*phase, next)?;
        debug!(session_id, from = ?*phase, to = ?next, "phase transition");
        *phase = next;
        Ok(())
    }

    // =======================================================================
    // Dispatch paths
    // =======================================================================

    async fn dispatch_direct(&self, query: &str, context: &str) -> DispatchOutcome {
        match self.language.generate(&prompt::direct_prompt(query, context)).await {
            Ok(text) => DispatchOutcome::answered(Route::DirectChat, text, Vec::new()),
            Err(err) => {
                warn!(error = %err, "direct chat failed, no fallback remains");
                DispatchOutcome::terminal()
            }
        }
    }

    /// Web search path: full query, then one shortened retry, then direct
    /// chat with a degradation notice. A failed or empty retry is treated
    /// the same way.
    async fn dispatch_search(&self, query: &str, context: &str) -> DispatchOutcome {
        let (hits, failure) = match self.search.search(query).await {
            Ok(hits) if !hits.is_empty() => (hits, None),
            first => {
                if let Err(ref err) = first {
                    warn!(error = %err, "search failed, retrying with shortened query");
                }
                let short = prompt::shorten_query(query, RETRY_QUERY_WORDS);
                match self.search.search(&short).await {
                    Ok(hits) if !hits.is_empty() => (hits, None),
                    Ok(_) => (Vec::new(), Some(ErrorKind::EmptyRetrieval)),
                    Err(err) => {
                        warn!(error = %err, "search retry failed");
                        (Vec::new(), Some(ErrorKind::from(&err)))
                    }
                }
            }
        };

        if let Some(kind) = failure {
            return self.degrade(query, context, SEARCH_UNAVAILABLE_NOTE, kind).await;
        }

        let synthesis = prompt::search_synthesis_prompt(query, context, &hits);
        match self.language.generate(&synthesis).await {
            Ok(text) => DispatchOutcome::answered(Route::WebSearch, text, hits),
            Err(err) => {
                warn!(error = %err, "search synthesis failed");
                self.degrade(query, context, SEARCH_UNAVAILABLE_NOTE, ErrorKind::from(&err))
                    .await
            }
        }
    }

    /// Document path: scoped retrieval, relevance filter, synthesis. An
    /// empty result set falls straight back to direct chat with a notice.
    async fn dispatch_documents(
        &self,
        session_id: &str,
        query: &str,
        context: &str,
    ) -> DispatchOutcome {
        let scope = self.session_scope(session_id);
        let chunks = match self.index.query(query, self.top_k, scope.as_deref()).await {
            Ok(chunks) => chunks,
            Err(err) => {
                warn!(error = %err, "document query failed");
                return self
                    .degrade(query, context, NO_DOCUMENTS_NOTE, ErrorKind::EmptyRetrieval)
                    .await;
            }
        };
        let relevant: Vec<ScoredChunk> = chunks
            .into_iter()
            .filter(|c| c.score >= self.min_score)
            .collect();
        if relevant.is_empty() {
            debug!(session_id, "no chunks above relevance threshold");
            return self
                .degrade(query, context, NO_DOCUMENTS_NOTE, ErrorKind::EmptyRetrieval)
                .await;
        }

        let sources: Vec<Source> = relevant
            .iter()
            .map(|c| Source {
                title: format!("{} (chunk {})", c.document_id, c.chunk_index),
                url: String::new(),
                snippet: c.text.clone(),
            })
            .collect();

        let synthesis = prompt::document_synthesis_prompt(query, context, &relevant);
        match self.language.generate(&synthesis).await {
            Ok(text) => DispatchOutcome::answered(Route::DocumentQuery, text, sources),
            Err(err) => {
                warn!(error = %err, "document synthesis failed");
                self.degrade(query, context, NO_DOCUMENTS_NOTE, ErrorKind::from(&err))
                    .await
            }
        }
    }

    /// Last rung of the fallback ladder: answer from general knowledge and
    /// prefix the degradation notice. If even this fails, the turn is
    /// terminal.
    async fn degrade(
        &self,
        query: &str,
        context: &str,
        notice: &str,
        kind: ErrorKind,
    ) -> DispatchOutcome {
        match self.language.generate(&prompt::direct_prompt(query, context)).await {
            Ok(text) => DispatchOutcome::degraded(format!("{notice}\n\n{text}"), kind),
            Err(err) => {
                warn!(error = %err, "fallback direct chat failed, turn is terminal");
                DispatchOutcome::terminal()
            }
        }
    }

    fn session_scope(&self, session_id: &str) -> Option<Vec<String>> {
        let docs = self
            .session_docs
            .read()
            .unwrap_or_else(|e| e.into_inner());
        docs.get(session_id).filter(|ids| !ids.is_empty()).cloned()
    }

    // =======================================================================
    // Document and session administration
    // =======================================================================

    /// Ingest (or replace) a document. When `session_id` is given the
    /// document is also attributed to that session, scoping its retrieval.
    pub async fn ingest_document(
        &self,
        session_id: Option<&str>,
        document_id: &str,
        chunks: &[ChunkInput],
    ) -> Result<usize, EngineError> {
        let count = self.index.ingest(document_id, chunks).await?;
        if let Some(session_id) = session_id {
            let mut docs = self
                .session_docs
                .write()
                .unwrap_or_else(|e| e.into_inner());
            let ids = docs.entry(session_id.to_string()).or_default();
            if count == 0 {
                ids.retain(|id| id != document_id);
            } else if !ids.iter().any(|id| id == document_id) {
                ids.push(document_id.to_string());
            }
        }
        Ok(count)
    }

    /// Drop a session's history, lock, and document attribution. The
    /// documents themselves stay in the index.
    pub fn clear_session(&self, session_id: &str) -> Result<(), EngineError> {
        self.memory.clear(session_id)?;
        self.locks.remove(session_id);
        self.session_docs
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .remove(session_id);
        Ok(())
    }

    pub fn list_sessions(&self) -> Result<Vec<String>, EngineError> {
        Ok(self.memory.list_sessions()?)
    }

    pub fn session_summary(&self, session_id: &str) -> Result<Option<SessionSummary>, EngineError> {
        Ok(self.memory.summary(session_id)?)
    }

    pub fn index_info(&self) -> IndexInfo {
        self.index.info()
    }

    /// Evict sessions idle longer than the configured TTL, dropping their
    /// locks and document attribution along with the history so a later
    /// session reusing the id starts clean. Returns how many were removed.
    pub fn sweep_idle(&self) -> Result<usize, EngineError> {
        let purged = self.memory.evict_idle(self.session_ttl)?;
        if purged.is_empty() {
            return Ok(0);
        }
        let mut docs = self
            .session_docs
            .write()
            .unwrap_or_else(|e| e.into_inner());
        for id in &purged {
            docs.remove(id);
            self.locks.remove(id);
        }
        info!(removed = purged.len(), "idle sessions evicted");
        Ok(purged.len())
    }
}
