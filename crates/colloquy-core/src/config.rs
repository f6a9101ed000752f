use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::{ColloquyError, Result};

/// Top-level configuration for the Colloquy engine.
///
/// Loaded from `~/.colloquy/config.toml` by default. Each section maps to
/// one component: session memory, document retrieval, and the two remote
/// capability adapters.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ColloquyConfig {
    #[serde(default)]
    pub general: GeneralConfig,
    #[serde(default)]
    pub memory: MemoryConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub search: SearchConfig,
    #[serde(default)]
    pub language: LanguageConfig,
}

impl ColloquyConfig {
    /// Load configuration from a TOML file.
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: ColloquyConfig = toml::from_str(&content)?;
        info!("Configuration loaded from {}", path.display());
        Ok(config)
    }

    /// Load configuration from a TOML file, falling back to defaults if the
    /// file does not exist or cannot be parsed.
    pub fn load_or_default(path: &Path) -> Self {
        match Self::load(path) {
            Ok(config) => config,
            Err(e) => {
                warn!(
                    "Failed to load config from {}: {}. Using defaults.",
                    path.display(),
                    e
                );
                Self::default()
            }
        }
    }

    /// Save the current configuration to a TOML file.
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content =
            toml::to_string_pretty(self).map_err(|e| ColloquyError::Config(e.to_string()))?;
        std::fs::write(path, content)?;
        info!("Configuration saved to {}", path.display());
        Ok(())
    }
}

/// General application settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Data directory for uploads and on-disk artifacts.
    pub data_dir: String,
    /// Log level: trace, debug, info, warn, error.
    pub log_level: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            data_dir: "~/.colloquy/data".to_string(),
            log_level: "info".to_string(),
        }
    }
}

/// Session memory settings.
///
/// Both bounds are independent; the store evicts oldest-first while either
/// one is exceeded, so the tighter bound wins.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MemoryConfig {
    /// Maximum number of turns retained per session.
    pub window_turns: usize,
    /// Maximum cumulative token estimate retained per session.
    pub max_tokens: usize,
    /// Sessions idle longer than this may be purged by the sweep.
    pub session_ttl_minutes: u32,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            window_turns: 10,
            max_tokens: 4000,
            session_ttl_minutes: 60,
        }
    }
}

/// Document retrieval settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrievalConfig {
    /// Number of chunks retrieved per query.
    pub top_k: usize,
    /// Minimum cosine similarity for a chunk to be used in synthesis.
    pub min_score: f64,
    /// Embedding dimension expected from the embedding backend.
    pub embedding_dim: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            top_k: 5,
            min_score: 0.2,
            embedding_dim: 384,
        }
    }
}

/// Web search capability settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    /// Maximum results returned per search call.
    pub max_results: usize,
    /// Per-call timeout in seconds.
    pub timeout_secs: u64,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            max_results: 5,
            timeout_secs: 10,
        }
    }
}

/// Language generation capability settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LanguageConfig {
    /// Model identifier passed through to the language backend.
    pub model: String,
    /// Sampling temperature passed through to the language backend.
    pub temperature: f64,
    /// Maximum tokens requested from the language backend.
    pub max_tokens: u32,
    /// Per-call timeout in seconds.
    pub timeout_secs: u64,
    /// Generated text is truncated to this many characters.
    pub max_output_chars: usize,
}

impl Default for LanguageConfig {
    fn default() -> Self {
        Self {
            model: "gpt-3.5-turbo".to_string(),
            temperature: 0.7,
            max_tokens: 1000,
            timeout_secs: 30,
            max_output_chars: 8000,
        }
    }
}
