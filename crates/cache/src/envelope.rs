//! Persisted cache-entry layout

use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};

use docqa_core::{Error, PipelineResult, Result};

use docqa_config::constants::cache::ENVELOPE_VERSION;

/// Envelope wrapped around every persisted cache value.
///
/// The shared tier enforces TTL itself; `created_at_epoch_ms` and `ttl_ms`
/// are carried so readers can re-check expiry after transport delays and so
/// the local tier can adopt the remaining lifetime on populate.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheEnvelope {
    pub version: u32,
    pub created_at_epoch_ms: u64,
    pub ttl_ms: u64,
    pub payload: PipelineResult,
}

impl CacheEnvelope {
    pub fn new(payload: PipelineResult, ttl_ms: u64) -> Self {
        Self {
            version: ENVELOPE_VERSION,
            created_at_epoch_ms: epoch_ms(),
            ttl_ms,
            payload,
        }
    }

    /// Whether the entry is past its TTL at the current wall clock.
    pub fn is_expired(&self) -> bool {
        epoch_ms() >= self.created_at_epoch_ms.saturating_add(self.ttl_ms)
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        serde_json::to_vec(self).map_err(|e| Error::Internal(format!("cache encode: {}", e)))
    }

    /// Decode a persisted entry. Unknown versions are rejected rather than
    /// half-read.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let envelope: Self = serde_json::from_slice(bytes)
            .map_err(|e| Error::CacheUnavailable(format!("cache decode: {}", e)))?;
        if envelope.version != ENVELOPE_VERSION {
            return Err(Error::CacheUnavailable(format!(
                "unsupported cache envelope version {}",
                envelope.version
            )));
        }
        Ok(envelope)
    }
}

fn epoch_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use docqa_core::PipelineMetadata;

    fn result() -> PipelineResult {
        PipelineResult {
            answer: "X is Y".into(),
            hits: Vec::new(),
            metadata: PipelineMetadata::default(),
        }
    }

    #[test]
    fn test_roundtrip() {
        let envelope = CacheEnvelope::new(result(), 60_000);
        let bytes = envelope.to_bytes().unwrap();
        let back = CacheEnvelope::from_bytes(&bytes).unwrap();
        assert_eq!(back.version, ENVELOPE_VERSION);
        assert_eq!(back.payload.answer, "X is Y");
        assert!(!back.is_expired());
    }

    #[test]
    fn test_zero_ttl_is_expired_immediately() {
        let envelope = CacheEnvelope::new(result(), 0);
        assert!(envelope.is_expired());
    }

    #[test]
    fn test_unknown_version_rejected() {
        let mut envelope = CacheEnvelope::new(result(), 60_000);
        envelope.version = 99;
        let bytes = serde_json::to_vec(&envelope).unwrap();
        assert!(CacheEnvelope::from_bytes(&bytes).is_err());
    }
}
