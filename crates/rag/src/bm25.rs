//! In-process BM25 keyword index
//!
//! An inverted index kept eventually consistent with the vector store:
//! `initialize` bulk-scans the whole collection, `refresh` only scans chunks
//! past the last-seen watermark. Readers take an atomic snapshot pointer and
//! never block on writers; writers build a new snapshot and swap it in, and
//! are serialized against each other.

use std::collections::HashMap;
use std::sync::Arc;

use futures::StreamExt;
use parking_lot::RwLock;
use tokio::sync::Mutex;

use docqa_core::{Chunk, Error, RankedHit, Result, VectorStore};

use docqa_config::constants::retrieval::{BM25_B, BM25_K1};

/// BM25 scoring parameters
#[derive(Debug, Clone, Copy)]
pub struct Bm25Config {
    /// Term-frequency saturation
    pub k1: f32,
    /// Length normalization
    pub b: f32,
}

impl Default for Bm25Config {
    fn default() -> Self {
        Self {
            k1: BM25_K1,
            b: BM25_B,
        }
    }
}

#[derive(Debug, Clone)]
struct DocEntry {
    id: String,
    source: String,
    text: String,
    len: u32,
}

#[derive(Debug, Clone, Copy)]
struct Posting {
    doc: u32,
    tf: u32,
}

/// Immutable index state published to readers.
#[derive(Debug, Default, Clone)]
struct Snapshot {
    postings: HashMap<String, Vec<Posting>>,
    docs: Vec<DocEntry>,
    ordinals: HashMap<String, u32>,
    total_len: u64,
    watermark: u64,
}

impl Snapshot {
    fn avgdl(&self) -> f32 {
        if self.docs.is_empty() {
            0.0
        } else {
            self.total_len as f32 / self.docs.len() as f32
        }
    }

    fn add_chunk(&mut self, chunk: &Chunk) {
        if self.ordinals.contains_key(&chunk.id) {
            // Same id re-scanned (e.g. overlapping refresh); replace content
            self.remove_doc(&chunk.id);
        }
        let tokens = tokenize(&chunk.text);
        let ordinal = self.docs.len() as u32;
        self.docs.push(DocEntry {
            id: chunk.id.clone(),
            source: chunk.source.clone(),
            text: chunk.text.clone(),
            len: tokens.len() as u32,
        });
        self.ordinals.insert(chunk.id.clone(), ordinal);
        self.total_len += tokens.len() as u64;

        let mut tf: HashMap<String, u32> = HashMap::new();
        for token in tokens {
            *tf.entry(token).or_insert(0) += 1;
        }
        for (term, tf) in tf {
            self.postings
                .entry(term)
                .or_default()
                .push(Posting { doc: ordinal, tf });
        }
        self.watermark = self.watermark.max(chunk.seq);
    }

    /// Drop one document and compact ordinals.
    fn remove_doc(&mut self, id: &str) {
        let Some(removed) = self.ordinals.remove(id) else {
            return;
        };
        let entry = self.docs.remove(removed as usize);
        self.total_len -= u64::from(entry.len);

        // Ordinals above the removed slot shift down by one
        for ordinal in self.ordinals.values_mut() {
            if *ordinal > removed {
                *ordinal -= 1;
            }
        }
        self.postings.retain(|_, list| {
            list.retain_mut(|posting| {
                if posting.doc == removed {
                    return false;
                }
                if posting.doc > removed {
                    posting.doc -= 1;
                }
                true
            });
            !list.is_empty()
        });
    }
}

/// BM25 index over the vector store's chunk set.
pub struct Bm25Index {
    store: Arc<dyn VectorStore>,
    config: Bm25Config,
    /// Copy-on-write snapshot pointer; `None` until initialized
    snapshot: RwLock<Option<Arc<Snapshot>>>,
    /// Serializes initialize / refresh / invalidate
    writer: Mutex<()>,
}

impl Bm25Index {
    pub fn new(store: Arc<dyn VectorStore>, config: Bm25Config) -> Self {
        Self {
            store,
            config,
            snapshot: RwLock::new(None),
            writer: Mutex::new(()),
        }
    }

    /// Populate from the vector store's full chunk set. Idempotent: the new
    /// snapshot replaces whatever was there.
    pub async fn initialize(&self) -> Result<()> {
        let _guard = self.writer.lock().await;

        let mut snapshot = Snapshot::default();
        let mut stream = self.store.list_chunks(None).await?;
        let mut count = 0usize;
        while let Some(chunk) = stream.next().await {
            snapshot.add_chunk(&chunk?);
            count += 1;
        }

        tracing::info!(docs = count, watermark = snapshot.watermark, "bm25 index initialized");
        self.publish(snapshot);
        Ok(())
    }

    /// Incremental update: index chunks with `seq` past the watermark and
    /// advance it. Cheap when nothing is new; a no-op leaves the published
    /// snapshot untouched.
    pub async fn refresh(&self) -> Result<()> {
        let _guard = self.writer.lock().await;

        let current = self
            .current()
            .ok_or_else(|| Error::Bm25Unavailable("index not initialized".into()))?;

        let mut stream = self.store.list_chunks(Some(current.watermark)).await?;
        let mut fresh: Vec<Chunk> = Vec::new();
        while let Some(chunk) = stream.next().await {
            fresh.push(chunk?);
        }
        if fresh.is_empty() {
            return Ok(());
        }

        let mut snapshot = (*current).clone();
        for chunk in &fresh {
            snapshot.add_chunk(chunk);
        }
        tracing::debug!(
            added = fresh.len(),
            watermark = snapshot.watermark,
            "bm25 index refreshed"
        );
        self.publish(snapshot);
        Ok(())
    }

    /// Remove one chunk from the index.
    pub async fn invalidate(&self, id: &str) -> Result<()> {
        let _guard = self.writer.lock().await;
        let current = self
            .current()
            .ok_or_else(|| Error::Bm25Unavailable("index not initialized".into()))?;
        if !current.ordinals.contains_key(id) {
            return Ok(());
        }
        let mut snapshot = (*current).clone();
        snapshot.remove_doc(id);
        self.publish(snapshot);
        Ok(())
    }

    /// Remove every chunk of one source document. The periodic full
    /// `initialize` remains the authoritative sweep.
    pub async fn remove_source(&self, source: &str) -> Result<()> {
        let _guard = self.writer.lock().await;
        let current = self
            .current()
            .ok_or_else(|| Error::Bm25Unavailable("index not initialized".into()))?;
        let doomed: Vec<String> = current
            .docs
            .iter()
            .filter(|d| d.source == source)
            .map(|d| d.id.clone())
            .collect();
        if doomed.is_empty() {
            return Ok(());
        }
        let mut snapshot = (*current).clone();
        for id in &doomed {
            snapshot.remove_doc(id);
        }
        tracing::debug!(source, removed = doomed.len(), "bm25 source removed");
        self.publish(snapshot);
        Ok(())
    }

    /// BM25 search over the current snapshot. Runs on the calling thread;
    /// `filter` is a set of allowed source names (empty = all). Hits are
    /// ordered by score descending, ties by chunk id ascending.
    pub fn search(&self, query: &str, top_k: usize, filter: &[String]) -> Result<Vec<RankedHit>> {
        let snapshot = self
            .current()
            .ok_or_else(|| Error::Bm25Unavailable("index not initialized".into()))?;

        let terms = tokenize(query);
        if terms.is_empty() || snapshot.docs.is_empty() {
            return Ok(Vec::new());
        }

        let n = snapshot.docs.len() as f32;
        let avgdl = snapshot.avgdl();
        let mut scores: HashMap<u32, f32> = HashMap::new();

        // Duplicate query terms weigh in once per occurrence, as BM25 defines
        for term in &terms {
            let Some(postings) = snapshot.postings.get(term) else {
                continue;
            };
            let df = postings.len() as f32;
            let idf = ((n - df + 0.5) / (df + 0.5) + 1.0).ln();
            for posting in postings {
                let doc = &snapshot.docs[posting.doc as usize];
                let tf = posting.tf as f32;
                let norm = self.config.k1
                    * (1.0 - self.config.b + self.config.b * doc.len as f32 / avgdl.max(1e-6));
                let contribution = idf * (tf * (self.config.k1 + 1.0)) / (tf + norm);
                *scores.entry(posting.doc).or_insert(0.0) += contribution;
            }
        }

        let mut hits: Vec<RankedHit> = scores
            .into_iter()
            .filter_map(|(ordinal, score)| {
                let doc = &snapshot.docs[ordinal as usize];
                if !filter.is_empty() && !filter.iter().any(|s| s == &doc.source) {
                    return None;
                }
                Some(RankedHit {
                    chunk_id: doc.id.clone(),
                    source: doc.source.clone(),
                    text: doc.text.clone(),
                    dense_score: None,
                    sparse_score: Some(score),
                    fused_score: None,
                    rerank_score: None,
                    final_score: score,
                })
            })
            .collect();

        hits.sort_by(|a, b| {
            b.final_score
                .partial_cmp(&a.final_score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.chunk_id.cmp(&b.chunk_id))
        });
        hits.truncate(top_k);
        Ok(hits)
    }

    /// Number of indexed documents (0 before initialization).
    pub fn doc_count(&self) -> usize {
        self.current().map(|s| s.docs.len()).unwrap_or(0)
    }

    /// Last-seen ingestion watermark.
    pub fn watermark(&self) -> Option<u64> {
        self.current().map(|s| s.watermark)
    }

    fn current(&self) -> Option<Arc<Snapshot>> {
        self.snapshot.read().clone()
    }

    fn publish(&self, snapshot: Snapshot) {
        *self.snapshot.write() = Some(Arc::new(snapshot));
    }
}

/// Unicode-aware tokenizer: case-folded, splits on whitespace and
/// punctuation, CJK codepoints become single-character tokens. No stopword
/// filtering.
pub fn tokenize(text: &str) -> Vec<String> {
    let mut tokens = Vec::new();
    let mut current = String::new();

    for ch in text.chars() {
        if is_cjk(ch) {
            if !current.is_empty() {
                tokens.push(std::mem::take(&mut current));
            }
            tokens.push(ch.to_lowercase().collect());
        } else if ch.is_alphanumeric() {
            current.extend(ch.to_lowercase());
        } else if !current.is_empty() {
            tokens.push(std::mem::take(&mut current));
        }
    }
    if !current.is_empty() {
        tokens.push(current);
    }
    tokens
}

fn is_cjk(ch: char) -> bool {
    matches!(ch,
        '\u{3040}'..='\u{30FF}'   // Hiragana, Katakana
        | '\u{3400}'..='\u{4DBF}' // CJK Extension A
        | '\u{4E00}'..='\u{9FFF}' // CJK Unified Ideographs
        | '\u{AC00}'..='\u{D7AF}' // Hangul syllables
        | '\u{F900}'..='\u{FAFF}' // CJK Compatibility Ideographs
    )
}
