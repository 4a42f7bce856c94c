//! Two-tier query cache
//!
//! Pipeline results are cached under a fingerprint of the full query
//! specification. Reads go local tier → shared tier (populating local on a
//! shared hit); writes go local then shared. The shared tier is a durable
//! external KV store behind [`docqa_core::KvStore`]; every failure there is
//! soft and the local tier keeps serving.

pub mod envelope;
pub mod fingerprint;
pub mod local;
pub mod store;

pub use envelope::CacheEnvelope;
pub use fingerprint::Fingerprint;
pub use local::LocalCache;
pub use store::{QueryCache, QueryCacheConfig};
