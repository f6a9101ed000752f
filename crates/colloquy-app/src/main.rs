//! Colloquy application binary - composition root.
//!
//! Ties the Colloquy crates together into an interactive assistant:
//! 1. Load configuration from TOML
//! 2. Build the memory store, document index, and capability adapters
//! 3. Ingest any documents named on the command line
//! 4. Run a single query, or start the interactive prompt
//!
//! The binary wires in the mock capability clients, so it runs fully
//! offline; a deployment swaps in real `SearchClient` / `LanguageClient`
//! implementations at this composition point.

mod cli;

use std::io::{BufRead, Write};
use std::path::Path;
use std::sync::Arc;

use clap::Parser;

use colloquy_capability::{MockLanguage, MockSearch};
use colloquy_core::{ChunkInput, ColloquyConfig};
use colloquy_engine::Engine;
use colloquy_index::{DocumentIndex, MockEmbedding};
use colloquy_memory::MemoryStore;

use cli::CliArgs;

/// Expand ~ to home directory in a path string.
fn resolve_data_dir(data_dir: &str) -> std::path::PathBuf {
    if data_dir.starts_with("~/") || data_dir.starts_with("~\\") {
        #[cfg(target_os = "windows")]
        let home = std::env::var("USERPROFILE").unwrap_or_else(|_| ".".to_string());
        #[cfg(not(target_os = "windows"))]
        let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
        std::path::PathBuf::from(home).join(&data_dir[2..])
    } else {
        std::path::PathBuf::from(data_dir)
    }
}

/// Split file text into paragraph chunks for ingestion.
fn chunk_text(text: &str) -> Vec<ChunkInput> {
    text.split("\n\n")
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .enumerate()
        .map(|(index, p)| ChunkInput {
            text: p.to_string(),
            index,
        })
        .collect()
}

async fn ingest_file(engine: &Engine, session_id: &str, path: &Path) {
    let text = match std::fs::read_to_string(path) {
        Ok(text) => text,
        Err(e) => {
            tracing::error!(path = %path.display(), error = %e, "failed to read document");
            return;
        }
    };
    let document_id = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| path.display().to_string());
    let chunks = chunk_text(&text);
    match engine
        .ingest_document(Some(session_id), &document_id, &chunks)
        .await
    {
        Ok(count) => println!("Ingested {document_id} ({count} chunks)"),
        Err(e) => tracing::error!(document_id, error = %e, "ingest failed"),
    }
}

async fn run_turn(engine: &Engine, session_id: &str, query: &str) {
    match engine.run(session_id, query).await {
        Ok(result) => {
            println!("\n{}", result.response);
            if !result.sources.is_empty() {
                println!("\nSources:");
                for source in &result.sources {
                    if source.url.is_empty() {
                        println!("  - {}", source.title);
                    } else {
                        println!("  - {} ({})", source.title, source.url);
                    }
                }
            }
            if !result.success {
                println!("\n[The request could not be completed. Please try again.]");
            }
            println!();
        }
        Err(e) => println!("\nError: {e}\n"),
    }
}

fn print_help() {
    println!("Commands:");
    println!("  :ingest <file>   add a document to the index");
    println!("  :sessions        list active sessions");
    println!("  :clear           clear the current session's history");
    println!("  :info            show index statistics");
    println!("  :quit            exit");
    println!("Anything else is sent to the assistant.");
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = CliArgs::parse();

    // Tracing.
    let log_level = args.resolve_log_level().unwrap_or_else(|| "warn".to_string());
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level)),
        )
        .init();

    tracing::info!("Starting Colloquy v{}", env!("CARGO_PKG_VERSION"));

    // Config.
    let config_file = args.resolve_config_path();
    let mut config = ColloquyConfig::load_or_default(&config_file);
    tracing::info!(path = %config_file.display(), "Configuration loaded");

    if let Some(data_dir) = args.resolve_data_dir() {
        config.general.data_dir = data_dir;
    }
    let data_dir = resolve_data_dir(&config.general.data_dir);
    if let Err(e) = std::fs::create_dir_all(&data_dir) {
        tracing::error!(path = %data_dir.display(), error = %e, "Failed to create data directory");
        return Err(e.into());
    }

    // Engine with mock capabilities (offline demo wiring).
    let memory = Arc::new(MemoryStore::new(
        config.memory.window_turns,
        config.memory.max_tokens,
    ));
    let index = Arc::new(DocumentIndex::new(Arc::new(
        MockEmbedding::with_dimensions(config.retrieval.embedding_dim),
    )));
    let engine = Arc::new(Engine::new(
        &config,
        memory,
        index,
        Arc::new(MockSearch::new()),
        Arc::new(MockLanguage::new()),
    ));

    // Background sweep of idle sessions.
    let sweeper = Arc::clone(&engine);
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(tokio::time::Duration::from_secs(300));
        loop {
            interval.tick().await;
            if let Err(e) = sweeper.sweep_idle() {
                tracing::warn!(error = %e, "idle session sweep failed");
            }
        }
    });

    let session_id = args.resolve_session();
    tracing::info!(session_id, "session ready");

    for path in &args.ingest {
        ingest_file(&engine, &session_id, path).await;
    }

    // Single-shot mode.
    if let Some(ref query) = args.query {
        run_turn(&engine, &session_id, query).await;
        return Ok(());
    }

    // Interactive prompt.
    println!("Colloquy (session {session_id}). Type :help for commands.");
    let stdin = std::io::stdin();
    loop {
        print!("> ");
        std::io::stdout().flush()?;

        let mut line = String::new();
        if stdin.lock().read_line(&mut line)? == 0 {
            break;
        }
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        match line.split_once(' ').map_or((line, ""), |(c, rest)| (c, rest)) {
            (":quit" | ":q" | ":exit", _) => break,
            (":help", _) => print_help(),
            (":ingest", path) if !path.is_empty() => {
                ingest_file(&engine, &session_id, Path::new(path.trim())).await;
            }
            (":ingest", _) => println!("Usage: :ingest <file>"),
            (":sessions", _) => match engine.list_sessions() {
                Ok(sessions) if sessions.is_empty() => println!("No active sessions."),
                Ok(sessions) => {
                    for id in sessions {
                        println!("  {id}");
                    }
                }
                Err(e) => println!("Error: {e}"),
            },
            (":clear", _) => match engine.clear_session(&session_id) {
                Ok(()) => println!("Session cleared."),
                Err(e) => println!("Error: {e}"),
            },
            (":info", _) => {
                let info = engine.index_info();
                println!(
                    "Index: {} documents, {} chunks",
                    info.document_count, info.chunk_count
                );
            }
            _ => run_turn(&engine, &session_id, line).await,
        }
    }

    Ok(())
}
