//! Main settings module

use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::constants::{cache, endpoints, retrieval, timeouts};
use crate::ConfigError;

/// Main application settings
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Settings {
    /// LLM client configuration
    #[serde(default)]
    pub llm: LlmSettings,

    /// Embedding client configuration
    #[serde(default)]
    pub embedding: EmbeddingSettings,

    /// Vector store configuration
    #[serde(default)]
    pub vector_store: VectorStoreSettings,

    /// Query cache configuration
    #[serde(default)]
    pub cache: CacheSettings,

    /// Retrieval pipeline configuration
    #[serde(default)]
    pub retrieval: RetrievalSettings,

    /// Agent session configuration
    #[serde(default)]
    pub agent: AgentSettings,

    /// Durable storage (ScyllaDB) configuration
    #[serde(default)]
    pub persistence: PersistenceSettings,
}

/// LLM client settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmSettings {
    /// OpenAI-compatible API base URL
    pub endpoint: String,
    /// Chat model name
    pub model: String,
    /// API key (optional for local backends)
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    /// Non-streaming request timeout (ms)
    #[serde(default = "default_llm_complete_ms")]
    pub complete_timeout_ms: u64,
    /// Streaming overall timeout (ms)
    #[serde(default = "default_llm_stream_ms")]
    pub stream_timeout_ms: u64,
    /// Per-token inactivity timeout while streaming (ms)
    #[serde(default = "default_llm_token_idle_ms")]
    pub token_idle_timeout_ms: u64,
    /// Maximum retry attempts for transient failures
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    /// Initial backoff (ms), doubled each retry with jitter
    #[serde(default = "default_initial_backoff_ms")]
    pub initial_backoff_ms: u64,
}

impl Default for LlmSettings {
    fn default() -> Self {
        Self {
            endpoint: endpoints::LLM_DEFAULT.clone(),
            model: "qwen3:4b-instruct".to_string(),
            api_key: None,
            max_tokens: default_max_tokens(),
            temperature: default_temperature(),
            complete_timeout_ms: default_llm_complete_ms(),
            stream_timeout_ms: default_llm_stream_ms(),
            token_idle_timeout_ms: default_llm_token_idle_ms(),
            max_retries: default_max_retries(),
            initial_backoff_ms: default_initial_backoff_ms(),
        }
    }
}

/// Embedding client settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingSettings {
    /// Embedding API base URL
    pub endpoint: String,
    /// Embedding model name
    pub model: String,
    /// Output dimension D
    #[serde(default = "default_embedding_dim")]
    pub dimension: usize,
    /// Request timeout (ms)
    #[serde(default = "default_embedding_ms")]
    pub timeout_ms: u64,
}

impl Default for EmbeddingSettings {
    fn default() -> Self {
        Self {
            endpoint: endpoints::EMBEDDING_DEFAULT.clone(),
            model: "qwen3-embedding:0.6b".to_string(),
            dimension: default_embedding_dim(),
            timeout_ms: default_embedding_ms(),
        }
    }
}

/// Vector store settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VectorStoreSettings {
    /// Qdrant endpoint
    pub endpoint: String,
    /// Collection name
    pub collection: String,
    /// API key (optional)
    #[serde(default)]
    pub api_key: Option<String>,
    /// Search timeout (ms)
    #[serde(default = "default_vector_search_ms")]
    pub search_timeout_ms: u64,
}

impl Default for VectorStoreSettings {
    fn default() -> Self {
        Self {
            endpoint: endpoints::QDRANT_DEFAULT.clone(),
            collection: "docqa_chunks".to_string(),
            api_key: None,
            search_timeout_ms: default_vector_search_ms(),
        }
    }
}

/// Query cache settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheSettings {
    /// Entry time-to-live (seconds)
    #[serde(default = "default_cache_ttl_secs")]
    pub ttl_secs: u64,
    /// Local tier capacity (entries)
    #[serde(default = "default_local_capacity")]
    pub local_capacity: usize,
    /// Shared tier read timeout (ms); timeout is treated as a miss
    #[serde(default = "default_cache_read_ms")]
    pub shared_read_timeout_ms: u64,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            ttl_secs: default_cache_ttl_secs(),
            local_capacity: default_local_capacity(),
            shared_read_timeout_ms: default_cache_read_ms(),
        }
    }
}

/// Retrieval pipeline settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievalSettings {
    /// Default top_k when the request omits it
    #[serde(default = "default_top_k")]
    pub default_top_k: usize,
    /// Minimum candidates requested from each path (fusion headroom)
    #[serde(default = "default_min_candidates")]
    pub min_candidates: usize,
    /// Keyword search timeout (ms)
    #[serde(default = "default_bm25_ms")]
    pub bm25_timeout_ms: u64,
}

impl Default for RetrievalSettings {
    fn default() -> Self {
        Self {
            default_top_k: default_top_k(),
            min_candidates: default_min_candidates(),
            bm25_timeout_ms: default_bm25_ms(),
        }
    }
}

/// Agent session settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentSettings {
    /// System prompt injected at the head of every turn
    #[serde(default = "default_system_prompt")]
    pub system_prompt: String,
    /// Maximum tool iterations per turn
    #[serde(default = "default_max_tool_iterations")]
    pub max_tool_iterations: usize,
}

impl Default for AgentSettings {
    fn default() -> Self {
        Self {
            system_prompt: default_system_prompt(),
            max_tool_iterations: default_max_tool_iterations(),
        }
    }
}

/// Durable storage settings (ScyllaDB)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PersistenceSettings {
    /// Enable ScyllaDB persistence (false = local-only cache, no history sink)
    #[serde(default)]
    pub enabled: bool,
    /// Host addresses
    #[serde(default = "default_scylla_hosts")]
    pub hosts: Vec<String>,
    /// Keyspace name
    #[serde(default = "default_scylla_keyspace")]
    pub keyspace: String,
    /// Replication factor
    #[serde(default = "default_replication_factor")]
    pub replication_factor: u8,
}

impl Default for PersistenceSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            hosts: default_scylla_hosts(),
            keyspace: default_scylla_keyspace(),
            replication_factor: default_replication_factor(),
        }
    }
}

fn default_max_tokens() -> u32 {
    1024
}

fn default_temperature() -> f32 {
    0.3
}

fn default_llm_complete_ms() -> u64 {
    timeouts::LLM_COMPLETE_MS
}

fn default_llm_stream_ms() -> u64 {
    timeouts::LLM_STREAM_MS
}

fn default_llm_token_idle_ms() -> u64 {
    timeouts::LLM_TOKEN_IDLE_MS
}

fn default_max_retries() -> u32 {
    3
}

fn default_initial_backoff_ms() -> u64 {
    100
}

fn default_embedding_dim() -> usize {
    2560
}

fn default_embedding_ms() -> u64 {
    timeouts::EMBEDDING_MS
}

fn default_vector_search_ms() -> u64 {
    timeouts::VECTOR_SEARCH_MS
}

fn default_cache_ttl_secs() -> u64 {
    cache::DEFAULT_TTL_SECS
}

fn default_local_capacity() -> usize {
    cache::LOCAL_CAPACITY
}

fn default_cache_read_ms() -> u64 {
    timeouts::CACHE_READ_MS
}

fn default_top_k() -> usize {
    retrieval::DEFAULT_TOP_K
}

fn default_min_candidates() -> usize {
    retrieval::MIN_CANDIDATES
}

fn default_bm25_ms() -> u64 {
    timeouts::BM25_SEARCH_MS
}

fn default_system_prompt() -> String {
    "You are a helpful assistant that answers questions using the knowledge \
     base. Use the search_knowledge tool to look up information before \
     answering; cite the sources you used."
        .to_string()
}

fn default_max_tool_iterations() -> usize {
    crate::constants::agent::MAX_TOOL_ITERATIONS
}

fn default_scylla_hosts() -> Vec<String> {
    std::env::var("SCYLLA_HOSTS")
        .map(|s| s.split(',').map(|h| h.trim().to_string()).collect())
        .unwrap_or_else(|_| vec!["127.0.0.1:9042".to_string()])
}

fn default_scylla_keyspace() -> String {
    std::env::var("SCYLLA_KEYSPACE").unwrap_or_else(|_| "docqa".to_string())
}

fn default_replication_factor() -> u8 {
    1
}

/// Load settings from an optional TOML file, then `DOCQA_*` env overrides.
///
/// Env vars use `__` as the section separator, e.g.
/// `DOCQA_LLM__MODEL=llama3`.
pub fn load_settings(path: Option<&Path>) -> Result<Settings, ConfigError> {
    let mut builder = Config::builder();

    if let Some(path) = path {
        if !path.exists() {
            return Err(ConfigError::FileNotFound(path.display().to_string()));
        }
        builder = builder.add_source(File::from(path));
    }

    let config = builder
        .add_source(Environment::with_prefix("DOCQA").separator("__"))
        .build()?;

    let settings: Settings = config.try_deserialize()?;

    if settings.cache.local_capacity == 0 {
        return Err(ConfigError::Invalid(
            "cache.local_capacity must be at least 1".into(),
        ));
    }

    Ok(settings)
}
