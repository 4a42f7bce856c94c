//! Two-tier read-through / write-through cache

use std::sync::Arc;
use std::time::Duration;

use docqa_core::{KvStore, PipelineResult};

use crate::envelope::CacheEnvelope;
use crate::fingerprint::Fingerprint;
use crate::local::LocalCache;

/// Query cache configuration
#[derive(Debug, Clone)]
pub struct QueryCacheConfig {
    /// Entry time-to-live
    pub ttl: Duration,
    /// Local tier capacity (entries)
    pub local_capacity: usize,
    /// Shared tier read budget; a timeout is treated as a miss
    pub shared_read_timeout: Duration,
}

impl Default for QueryCacheConfig {
    fn default() -> Self {
        let settings = docqa_config::CacheSettings::default();
        Self::from(&settings)
    }
}

impl From<&docqa_config::CacheSettings> for QueryCacheConfig {
    fn from(settings: &docqa_config::CacheSettings) -> Self {
        Self {
            ttl: Duration::from_secs(settings.ttl_secs),
            local_capacity: settings.local_capacity,
            shared_read_timeout: Duration::from_millis(settings.shared_read_timeout_ms),
        }
    }
}

/// Two-tier cache for pipeline results.
///
/// The local tier always exists; the shared tier is optional and every
/// failure against it degrades to local-only behavior with a log entry.
pub struct QueryCache {
    local: LocalCache<CacheEnvelope>,
    shared: Option<Arc<dyn KvStore>>,
    config: QueryCacheConfig,
}

impl QueryCache {
    pub fn new(config: QueryCacheConfig) -> Self {
        Self {
            local: LocalCache::new(config.local_capacity),
            shared: None,
            config,
        }
    }

    /// Attach the durable shared tier.
    pub fn with_shared(mut self, shared: Arc<dyn KvStore>) -> Self {
        self.shared = Some(shared);
        self
    }

    /// Look up a result. Local tier first; on a local miss the shared tier
    /// is consulted within the read budget and a hit populates local with
    /// the entry's remaining lifetime.
    pub async fn get(&self, fingerprint: &Fingerprint) -> Option<PipelineResult> {
        if let Some(envelope) = self.local.get(fingerprint.as_str()) {
            if !envelope.is_expired() {
                tracing::debug!(key = %fingerprint, "query cache hit (local)");
                return Some(envelope.payload);
            }
        }

        let shared = self.shared.as_ref()?;
        let read = tokio::time::timeout(
            self.config.shared_read_timeout,
            shared.get(fingerprint.as_str()),
        );

        let bytes = match read.await {
            Ok(Ok(Some(bytes))) => bytes,
            Ok(Ok(None)) => return None,
            Ok(Err(e)) => {
                tracing::warn!(key = %fingerprint, error = %e, "shared cache read failed");
                return None;
            }
            Err(_) => {
                tracing::warn!(key = %fingerprint, "shared cache read timed out, treating as miss");
                return None;
            }
        };

        match CacheEnvelope::from_bytes(&bytes) {
            Ok(envelope) if !envelope.is_expired() => {
                tracing::debug!(key = %fingerprint, "query cache hit (shared)");
                let remaining = envelope
                    .created_at_epoch_ms
                    .saturating_add(envelope.ttl_ms)
                    .saturating_sub(now_epoch_ms());
                self.local.put(
                    fingerprint.as_str(),
                    envelope.clone(),
                    Duration::from_millis(remaining),
                );
                Some(envelope.payload)
            }
            Ok(_) => None,
            Err(e) => {
                tracing::warn!(key = %fingerprint, error = %e, "discarding undecodable cache entry");
                None
            }
        }
    }

    /// Store a result under the fingerprint: local first, then write-through
    /// to the shared tier. A shared failure never rolls back local; the skew
    /// is logged and the entry ages out by TTL.
    pub async fn put(&self, fingerprint: &Fingerprint, result: PipelineResult) {
        let envelope = CacheEnvelope::new(result, self.config.ttl.as_millis() as u64);
        self.local
            .put(fingerprint.as_str(), envelope.clone(), self.config.ttl);

        let Some(shared) = self.shared.as_ref() else {
            return;
        };
        let bytes = match envelope.to_bytes() {
            Ok(bytes) => bytes,
            Err(e) => {
                tracing::error!(key = %fingerprint, error = %e, "cache entry failed to encode");
                return;
            }
        };
        if let Err(e) = shared.put(fingerprint.as_str(), bytes, self.config.ttl).await {
            tracing::warn!(
                key = %fingerprint,
                error = %e,
                "shared cache write failed; tiers skewed until TTL"
            );
        }
    }

    /// Drop every local entry. The shared tier expires on its own.
    pub fn flush_local(&self) {
        self.local.clear();
    }
}

fn now_epoch_ms() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}
