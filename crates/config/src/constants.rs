//! Centralized constants
//!
//! Single source of truth for endpoints, timeouts, and retrieval tuning
//! shared across the workspace. Operational values only; anything a
//! deployment would tune per-environment belongs in `Settings`.

/// Service endpoints (loaded from env vars with fallback defaults)
pub mod endpoints {
    use once_cell::sync::Lazy;

    /// LLM endpoint (env: DOCQA_LLM_URL)
    pub static LLM_DEFAULT: Lazy<String> = Lazy::new(|| {
        std::env::var("DOCQA_LLM_URL").unwrap_or_else(|_| "http://localhost:11434/v1".to_string())
    });

    /// Embedding endpoint (env: DOCQA_EMBEDDING_URL)
    pub static EMBEDDING_DEFAULT: Lazy<String> = Lazy::new(|| {
        std::env::var("DOCQA_EMBEDDING_URL")
            .unwrap_or_else(|_| "http://localhost:11434/v1".to_string())
    });

    /// Qdrant vector store endpoint (env: QDRANT_URL)
    pub static QDRANT_DEFAULT: Lazy<String> = Lazy::new(|| {
        std::env::var("QDRANT_URL").unwrap_or_else(|_| "http://127.0.0.1:6334".to_string())
    });
}

/// Timeouts (in milliseconds unless noted)
pub mod timeouts {
    /// Embedding request timeout (ms)
    pub const EMBEDDING_MS: u64 = 10_000;

    /// Vector search timeout (ms)
    pub const VECTOR_SEARCH_MS: u64 = 5_000;

    /// Keyword search timeout (ms)
    pub const BM25_SEARCH_MS: u64 = 1_000;

    /// LLM non-streaming completion timeout (ms)
    pub const LLM_COMPLETE_MS: u64 = 60_000;

    /// LLM streaming overall timeout (ms)
    pub const LLM_STREAM_MS: u64 = 120_000;

    /// LLM streaming per-token inactivity timeout (ms)
    pub const LLM_TOKEN_IDLE_MS: u64 = 30_000;

    /// Shared cache read timeout (ms); a timeout is treated as a miss
    pub const CACHE_READ_MS: u64 = 200;

    /// Default tool execution timeout (ms)
    pub const TOOL_DEFAULT_MS: u64 = 30_000;
}

/// Retrieval tuning
pub mod retrieval {
    /// Default number of hits returned to the caller
    pub const DEFAULT_TOP_K: usize = 5;

    /// Minimum candidate count requested from each retrieval path, so rank
    /// fusion has headroom beyond the caller's top_k
    pub const MIN_CANDIDATES: usize = 20;

    /// Reciprocal rank fusion constant
    pub const RRF_K: f32 = 60.0;

    /// Okapi BM25 term-frequency saturation
    pub const BM25_K1: f32 = 1.5;

    /// Okapi BM25 length normalization
    pub const BM25_B: f32 = 0.75;

    /// Excerpt length (chars) in RPC responses
    pub const EXCERPT_CHARS: usize = 300;
}

/// Cache tuning
pub mod cache {
    /// Local tier capacity (entries)
    pub const LOCAL_CAPACITY: usize = 1024;

    /// Local tier shard count
    pub const LOCAL_SHARDS: usize = 16;

    /// Default entry time-to-live (seconds)
    pub const DEFAULT_TTL_SECS: u64 = 3_600;

    /// Cache envelope schema version
    pub const ENVELOPE_VERSION: u32 = 1;
}

/// Agent loop tuning
pub mod agent {
    /// Maximum tool iterations per turn; exceeding it forces a final
    /// generation without tools
    pub const MAX_TOOL_ITERATIONS: usize = 3;

    /// Event channel capacity. Single-slot on purpose: a slow consumer
    /// stalls the LLM read loop instead of growing a buffer.
    pub const STREAM_CHANNEL_CAPACITY: usize = 1;
}
