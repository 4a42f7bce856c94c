//! Cache key derivation
//!
//! The fingerprint covers the full query specification: query text, source
//! filter, top_k, and every feature toggle. Leaving any of them out would
//! serve a stale hit across configurations.

use sha2::{Digest, Sha256};
use unicode_normalization::UnicodeNormalization;

use docqa_core::QueryRequest;

/// Field delimiter inside the hashed preimage. U+001F cannot appear in
/// source names.
const FIELD_SEP: char = '\u{1F}';

/// Deterministic hash of a query specification, used as the cache key.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Fingerprint(String);

impl Fingerprint {
    /// Compute the fingerprint for a request.
    ///
    /// The preimage is, in order: NFC-normalized trimmed query text; sorted
    /// source names; top_k; use_hybrid; use_reranker; use_hyde; the
    /// effective rerank_top_k. All fields are separator-delimited.
    pub fn compute(request: &QueryRequest) -> Self {
        let normalized: String = request.query.trim().nfc().collect();

        let mut sources = request.sources.clone();
        sources.sort_unstable();

        let mut hasher = Sha256::new();
        hasher.update(normalized.as_bytes());
        hasher.update(FIELD_SEP.to_string().as_bytes());
        for source in &sources {
            hasher.update(source.as_bytes());
            hasher.update(FIELD_SEP.to_string().as_bytes());
        }
        hasher.update(request.top_k.to_string().as_bytes());
        hasher.update(FIELD_SEP.to_string().as_bytes());
        hasher.update([request.use_hybrid as u8]);
        hasher.update([request.use_reranker as u8]);
        hasher.update([request.use_hyde as u8]);
        hasher.update(FIELD_SEP.to_string().as_bytes());
        hasher.update(request.effective_rerank_top_k().to_string().as_bytes());

        let digest = hasher.finalize();
        Self(format!("{:x}", digest))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_request() -> QueryRequest {
        QueryRequest::new("what is x")
            .with_sources(vec!["a".into(), "b".into()])
            .with_top_k(5)
    }

    #[test]
    fn test_stable_for_equal_specs() {
        assert_eq!(
            Fingerprint::compute(&base_request()),
            Fingerprint::compute(&base_request())
        );
    }

    #[test]
    fn test_query_whitespace_trimmed() {
        let mut padded = base_request();
        padded.query = "  what is x \n".into();
        assert_eq!(
            Fingerprint::compute(&padded),
            Fingerprint::compute(&base_request())
        );
    }

    #[test]
    fn test_source_order_irrelevant() {
        let mut reversed = base_request();
        reversed.sources = vec!["b".into(), "a".into()];
        assert_eq!(
            Fingerprint::compute(&reversed),
            Fingerprint::compute(&base_request())
        );
    }

    #[test]
    fn test_nfc_normalization() {
        // "é" precomposed vs "e" + combining acute
        let mut composed = base_request();
        composed.query = "caf\u{00E9}".into();
        let mut decomposed = base_request();
        decomposed.query = "cafe\u{0301}".into();
        assert_eq!(
            Fingerprint::compute(&composed),
            Fingerprint::compute(&decomposed)
        );
    }

    #[test]
    fn test_every_toggle_changes_the_key() {
        // Enumerate all 2^4 toggle combinations; each must yield a distinct
        // fingerprint, and flipping any single toggle must change it.
        let mut seen = std::collections::HashSet::new();
        for bits in 0..16u8 {
            let mut req = base_request();
            req.use_cache = true; // not part of the key
            req.use_hybrid = bits & 1 != 0;
            req.use_reranker = bits & 2 != 0;
            req.use_hyde = bits & 4 != 0;
            req.top_k = if bits & 8 != 0 { 5 } else { 10 };
            assert!(seen.insert(Fingerprint::compute(&req).as_str().to_string()));
        }
        assert_eq!(seen.len(), 16);
    }

    #[test]
    fn test_rerank_top_k_changes_the_key() {
        let narrow = base_request().with_rerank_top_k(3);
        assert_ne!(
            Fingerprint::compute(&narrow),
            Fingerprint::compute(&base_request())
        );
    }

    #[test]
    fn test_sources_change_the_key() {
        let mut other = base_request();
        other.sources = vec!["a".into()];
        assert_ne!(
            Fingerprint::compute(&other),
            Fingerprint::compute(&base_request())
        );
    }

    #[test]
    fn test_concatenation_is_not_ambiguous() {
        // ["ab"] vs ["a", "b"] must hash differently
        let mut joined = base_request();
        joined.sources = vec!["ab".into()];
        let mut split = base_request();
        split.sources = vec!["a".into(), "b".into()];
        assert_ne!(Fingerprint::compute(&joined), Fingerprint::compute(&split));
    }
}
