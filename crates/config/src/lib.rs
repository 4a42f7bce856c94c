//! Configuration management for the docqa service
//!
//! Supports loading configuration from:
//! - TOML files
//! - Environment variables (DOCQA_ prefix)
//! - Built-in defaults
//!
//! Every tunable the retrieval pipeline, cache, and agent use lives here;
//! the other crates take their config structs by value at construction time.

pub mod constants;
pub mod settings;
pub mod telemetry;

pub use settings::{
    load_settings, AgentSettings, CacheSettings, EmbeddingSettings, LlmSettings,
    PersistenceSettings, RetrievalSettings, Settings, VectorStoreSettings,
};
pub use telemetry::init_tracing;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("configuration file not found: {0}")]
    FileNotFound(String),

    #[error("configuration error: {0}")]
    Load(#[from] config::ConfigError),

    #[error("invalid configuration: {0}")]
    Invalid(String),
}
