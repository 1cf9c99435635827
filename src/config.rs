//! Configuration loading.
//!
//! Two sources feed a run:
//!
//! - **Environment** (optionally seeded from `.env`): service endpoints,
//!   API keys, index and deployment names. Required values fail fast with
//!   [`Error::Config`] before any network call is attempted.
//! - **TOML file** (optional): non-secret tuning knobs such as chunk sizes,
//!   `top_k`, generation parameters, bind address and log rotation.
//!
//! ```toml
//! [chunking]
//! chunk_size = 1000
//! chunk_overlap = 100
//!
//! [retrieval]
//! top_k = 10
//!
//! [server]
//! bind = "127.0.0.1:8501"
//! ```
//!
//! Everything is loaded once at process start and passed by reference to
//! each stage.

use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};

pub const DEFAULT_INDEX_NAME: &str = "client-manual-index";
pub const DEFAULT_SEARCH_API_VERSION: &str = "2024-07-01";
pub const DEFAULT_OPENAI_API_VERSION: &str = "2024-12-01-preview";

// ============ Environment settings ============

/// Connection settings for the vector search service.
#[derive(Debug, Clone)]
pub struct SearchSettings {
    pub endpoint: String,
    pub api_key: String,
    pub index_name: String,
    pub api_version: String,
}

/// Connection settings for the language-model service.
#[derive(Debug, Clone)]
pub struct OpenAiSettings {
    pub endpoint: String,
    pub api_key: String,
    pub api_version: String,
    pub embed_deployment: String,
    pub chat_deployment: String,
}

impl SearchSettings {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(env_lookup)
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        Ok(Self {
            endpoint: trim_endpoint(required(&lookup, "AZURE_SEARCH_ENDPOINT")?),
            api_key: required(&lookup, "AZURE_SEARCH_API_KEY")?,
            index_name: optional(&lookup, "AZURE_SEARCH_INDEX", DEFAULT_INDEX_NAME),
            api_version: optional(
                &lookup,
                "AZURE_SEARCH_API_VERSION",
                DEFAULT_SEARCH_API_VERSION,
            ),
        })
    }
}

impl OpenAiSettings {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(env_lookup)
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        Ok(Self {
            endpoint: trim_endpoint(required(&lookup, "AZURE_OPENAI_ENDPOINT")?),
            api_key: required(&lookup, "AZURE_OPENAI_API_KEY")?,
            api_version: optional(&lookup, "OPENAI_API_VERSION", DEFAULT_OPENAI_API_VERSION),
            embed_deployment: optional(&lookup, "AZURE_OPENAI_EMBED_DEPLOYMENT", "embed"),
            chat_deployment: optional(&lookup, "AZURE_OPENAI_CHAT_DEPLOYMENT", "chat"),
        })
    }
}

fn env_lookup(key: &str) -> Option<String> {
    std::env::var(key).ok()
}

/// Empty strings count as missing.
fn required<F>(lookup: &F, key: &str) -> Result<String>
where
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        Some(v) if !v.trim().is_empty() => Ok(v.trim().to_string()),
        _ => Err(Error::config(format!(
            "required environment variable {} is not set",
            key
        ))),
    }
}

fn optional<F>(lookup: &F, key: &str, default: &str) -> String
where
    F: Fn(&str) -> Option<String>,
{
    lookup(key)
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .unwrap_or_else(|| default.to_string())
}

fn trim_endpoint(endpoint: String) -> String {
    endpoint.trim_end_matches('/').to_string()
}

// ============ Tuning file ============

#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct Config {
    pub chunking: ChunkingConfig,
    pub retrieval: RetrievalConfig,
    pub generation: GenerationConfig,
    pub embedding: EmbeddingConfig,
    pub http: HttpConfig,
    pub ingest: IngestConfig,
    pub server: ServerConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ChunkingConfig {
    /// Target chunk size in approximate tokens.
    pub chunk_size: usize,
    pub chunk_overlap: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            chunk_size: 1000,
            chunk_overlap: 100,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct RetrievalConfig {
    pub top_k: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self { top_k: 10 }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct GenerationConfig {
    pub temperature: f32,
    pub max_tokens: u32,
    pub system_prompt: String,
}

pub const DEFAULT_SYSTEM_PROMPT: &str = "You are a helpful assistant. Use the provided context to answer questions accurately. \
If the context is insufficient, give the most careful, concise answer possible. \
Always cite the sources when available. Do not hallucinate beyond the context.";

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            temperature: 0.2,
            max_tokens: 1000,
            system_prompt: DEFAULT_SYSTEM_PROMPT.to_string(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct EmbeddingConfig {
    /// Vector dimensionality; must match the deployed embedding model.
    pub dims: usize,
    /// Texts per embeddings request.
    pub batch_size: usize,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            dims: 3072,
            batch_size: 16,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct HttpConfig {
    pub max_retries: u32,
    pub timeout_secs: u64,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            timeout_secs: 60,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct IngestConfig {
    pub data_dir: PathBuf,
    pub include_globs: Vec<String>,
    pub exclude_globs: Vec<String>,
    /// Abort the whole run on the first unreadable document instead of skipping it.
    pub fail_fast: bool,
    pub max_file_bytes: u64,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./data"),
            include_globs: vec![
                "**/*.pdf".to_string(),
                "**/*.docx".to_string(),
                "**/*.txt".to_string(),
                "**/*.md".to_string(),
            ],
            exclude_globs: Vec::new(),
            fail_fast: false,
            max_file_bytes: 50 * 1024 * 1024,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ServerConfig {
    pub bind: String,
    pub title: String,
    /// Chat sessions unused for this long are dropped.
    pub session_idle_secs: u64,
    /// Least recently used sessions are dropped beyond this count.
    pub max_sessions: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1:8501".to_string(),
            title: "Client Manual Chatbot".to_string(),
            session_idle_secs: 3600,
            max_sessions: 1000,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct LoggingConfig {
    pub dir: PathBuf,
    pub level: String,
    pub max_bytes: u64,
    pub max_files: usize,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("logs"),
            level: "info".to_string(),
            max_bytes: 5 * 1024 * 1024,
            max_files: 3,
        }
    }
}

/// Load the tuning file.
///
/// When `explicit` is false a missing file yields the defaults; an explicitly
/// requested file must exist.
pub fn load_config(path: &Path, explicit: bool) -> Result<Config> {
    if !path.exists() {
        if explicit {
            return Err(Error::config(format!(
                "config file not found: {}",
                path.display()
            )));
        }
        return Ok(Config::default());
    }

    let content = std::fs::read_to_string(path)?;
    parse_config(&content)
}

pub fn parse_config(content: &str) -> Result<Config> {
    let config: Config = toml::from_str(content)?;
    validate(&config)?;
    Ok(config)
}

fn validate(config: &Config) -> Result<()> {
    if config.chunking.chunk_size == 0 {
        return Err(Error::config("chunking.chunk_size must be > 0"));
    }
    if config.chunking.chunk_overlap >= config.chunking.chunk_size {
        return Err(Error::config(
            "chunking.chunk_overlap must be smaller than chunking.chunk_size",
        ));
    }
    if config.retrieval.top_k == 0 {
        return Err(Error::config("retrieval.top_k must be >= 1"));
    }
    if !(0.0..=2.0).contains(&config.generation.temperature) {
        return Err(Error::config("generation.temperature must be in [0.0, 2.0]"));
    }
    if config.embedding.dims == 0 {
        return Err(Error::config("embedding.dims must be > 0"));
    }
    if config.embedding.batch_size == 0 {
        return Err(Error::config("embedding.batch_size must be > 0"));
    }
    if config.server.max_sessions == 0 {
        return Err(Error::config("server.max_sessions must be > 0"));
    }
    if config.logging.max_bytes == 0 {
        return Err(Error::config("logging.max_bytes must be > 0"));
    }
    Ok(())
}
