//! Prompt construction for routing and synthesis.
//!
//! All prompts are plain strings assembled from the turn context and the
//! dispatch evidence. Keeping them in one module makes the wording easy to
//! review and test in isolation.

use colloquy_core::{Source, Turn};
use colloquy_index::ScoredChunk;

/// Render a conversation window as alternating speaker lines.
///
/// Returns an empty string for an empty window so callers can splice it
/// into a prompt without a dangling header.
pub fn format_context(turns: &[Turn]) -> String {
    let mut out = String::new();
    for turn in turns {
        let speaker = match turn.role {
            colloquy_core::Role::User => "User",
            colloquy_core::Role::Assistant => "Assistant",
        };
        out.push_str(speaker);
        out.push_str(": ");
        out.push_str(&turn.content);
        out.push('\n');
    }
    out
}

/// Classification prompt. The model is asked for a single uppercase word.
pub fn routing_prompt(query: &str, context: &str, has_documents: bool) -> String {
    let doc_note = if has_documents {
        "Documents have been uploaded and can be queried."
    } else {
        "No documents have been uploaded."
    };
    let mut prompt = String::new();
    prompt.push_str(
        "Classify the user's request into exactly one category:\n\
         - SEARCH: needs current or real-time information from the web\n\
         - DOCUMENTS: asks about the content of uploaded documents\n\
         - DIRECT: can be answered from general knowledge and conversation\n\n",
    );
    prompt.push_str(doc_note);
    prompt.push('\n');
    if !context.is_empty() {
        prompt.push_str("\nConversation so far:\n");
        prompt.push_str(context);
    }
    prompt.push_str("\nRequest: ");
    prompt.push_str(query);
    prompt.push_str("\n\nAnswer with exactly one word: SEARCH, DOCUMENTS, or DIRECT.");
    prompt
}

/// Prompt for a plain conversational answer.
pub fn direct_prompt(query: &str, context: &str) -> String {
    let mut prompt = String::new();
    prompt.push_str("You are a helpful assistant. Answer the user's request.\n");
    if !context.is_empty() {
        prompt.push_str("\nConversation so far:\n");
        prompt.push_str(context);
    }
    prompt.push_str("\nRequest: ");
    prompt.push_str(query);
    prompt.push_str("\n\nAnswer:");
    prompt
}

/// Prompt that grounds an answer in web search results.
pub fn search_synthesis_prompt(query: &str, context: &str, hits: &[Source]) -> String {
    let mut prompt = String::new();
    prompt.push_str(
        "You are a helpful assistant. Answer the user's request using the \
         search results below. Cite information from the results where it \
         supports the answer.\n\nSearch results:\n",
    );
    for (i, hit) in hits.iter().enumerate() {
        prompt.push_str(&format!(
            "{}. {} ({})\n   {}\n",
            i + 1,
            hit.title,
            hit.url,
            hit.snippet
        ));
    }
    if !context.is_empty() {
        prompt.push_str("\nConversation so far:\n");
        prompt.push_str(context);
    }
    prompt.push_str("\nRequest: ");
    prompt.push_str(query);
    prompt.push_str("\n\nAnswer:");
    prompt
}

/// Prompt that grounds an answer in retrieved document chunks.
pub fn document_synthesis_prompt(query: &str, context: &str, chunks: &[ScoredChunk]) -> String {
    let mut prompt = String::new();
    prompt.push_str(
        "You are a helpful assistant. Answer the user's request using only \
         the document excerpts below. If the excerpts do not contain the \
         answer, say so.\n\nDocument excerpts:\n",
    );
    for (i, chunk) in chunks.iter().enumerate() {
        prompt.push_str(&format!(
            "Excerpt {} (source: {}, chunk {}):\n{}\n\n",
            i + 1,
            chunk.document_id,
            chunk.chunk_index,
            chunk.text
        ));
    }
    if !context.is_empty() {
        prompt.push_str("Conversation so far:\n");
        prompt.push_str(context);
    }
    prompt.push_str("\nRequest: ");
    prompt.push_str(query);
    prompt.push_str("\n\nAnswer:");
    prompt
}

/// Keep the first `max_words` whitespace-separated words of a query.
///
/// Used for the single retry after a failed search attempt; a shorter
/// query tends to survive strict upstream limits.
pub fn shorten_query(query: &str, max_words: usize) -> String {
    query
        .split_whitespace()
        .take(max_words)
        .collect::<Vec<_>>()
        .join(" ")
}
