//! Configuration for wikilite
//!
//! A single [`Config`] value is threaded through ingest, search and the
//! API server. Values persisted in the store's `setup` table (language,
//! model, ANN layout, model prefixes) take effect on open and may be
//! overridden from the CLI for the current run.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Runtime configuration, merged from defaults, persisted setup values
/// and CLI flags.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// SQLite database path
    pub db: PathBuf,

    /// Content language code (persisted as `language`)
    pub language: String,

    /// Maximum number of search results
    pub limit: usize,

    /// Whether embedding support is enabled at all
    pub ai: bool,

    /// Run the embedding model in-process instead of over HTTP
    pub ai_local: bool,

    /// Base URL of an OpenAI-compatible embeddings endpoint
    pub ai_url: String,

    /// API key for the remote endpoint (may be empty for local servers)
    pub ai_api_key: String,

    /// Embedding model identifier (persisted as `model`)
    pub model: String,

    /// Prefix prepended to section text before ingest-time embedding
    /// (persisted as `modelPrefixSave`)
    pub model_prefix_save: String,

    /// Prefix prepended to queries before search-time embedding
    /// (persisted as `modelPrefixSearch`)
    pub model_prefix_search: String,

    /// ANN quantization mode: `binary` or `mrl` (persisted as `annMode`)
    pub ann_mode: String,

    /// MRL prefix length in components (persisted as `annSize`)
    pub ann_size: usize,

    /// HTTP API bind host
    pub web_host: String,

    /// HTTP API bind port
    pub web_port: u16,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            db: PathBuf::from("wikilite.db"),
            language: "en".to_string(),
            limit: 5,
            ai: false,
            ai_local: false,
            ai_url: "http://localhost:11434/v1".to_string(),
            ai_api_key: String::new(),
            model: "all-minilm".to_string(),
            model_prefix_save: String::new(),
            model_prefix_search: String::new(),
            ann_mode: "binary".to_string(),
            ann_size: 0,
            web_host: "localhost".to_string(),
            web_port: 35248,
        }
    }
}
