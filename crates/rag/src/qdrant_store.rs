//! Vector store adapter for Qdrant
//!
//! Chunk payloads carry `text`, `source`, and the monotonic `seq` counter;
//! `list_chunks` pages through the collection with the scroll API so keyword
//! index (re)builds never hold more than one page in memory.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use futures::stream::BoxStream;
use qdrant_client::qdrant::{
    condition::ConditionOneOf, r#match::MatchValue,
    value::Kind, vectors_output::VectorsOptions, Condition, CreateCollectionBuilder,
    DeletePointsBuilder, Distance, FieldCondition, Filter, Match, PointStruct,
    Range, RepeatedStrings, ScrollPointsBuilder, SearchPointsBuilder, UpsertPointsBuilder,
    VectorParamsBuilder,
};
use qdrant_client::Qdrant;

use docqa_core::{Chunk, Result, ScoredChunk, VectorStore};

use crate::RagError;

/// Scroll page size for bulk scans
const SCROLL_PAGE: u32 = 256;

/// Qdrant adapter configuration
#[derive(Debug, Clone)]
pub struct QdrantStoreConfig {
    /// Qdrant endpoint
    pub endpoint: String,
    /// Collection name
    pub collection: String,
    /// Vector dimension
    pub vector_dim: usize,
    /// API key (optional)
    pub api_key: Option<String>,
}

impl Default for QdrantStoreConfig {
    fn default() -> Self {
        let settings = docqa_config::VectorStoreSettings::default();
        Self {
            endpoint: settings.endpoint,
            collection: settings.collection,
            vector_dim: docqa_config::EmbeddingSettings::default().dimension,
            api_key: settings.api_key,
        }
    }
}

/// Qdrant-backed [`VectorStore`].
pub struct QdrantVectorStore {
    client: Arc<Qdrant>,
    config: QdrantStoreConfig,
}

impl QdrantVectorStore {
    /// Connect to Qdrant.
    pub async fn new(config: QdrantStoreConfig) -> std::result::Result<Self, RagError> {
        let mut builder = Qdrant::from_url(&config.endpoint);
        if let Some(ref api_key) = config.api_key {
            builder = builder.api_key(api_key.clone());
        }
        let client = builder
            .build()
            .map_err(|e| RagError::Connection(e.to_string()))?;

        Ok(Self {
            client: Arc::new(client),
            config,
        })
    }

    /// Create the collection if it does not exist.
    pub async fn ensure_collection(&self) -> std::result::Result<(), RagError> {
        let exists = self
            .client
            .collection_exists(&self.config.collection)
            .await
            .map_err(|e| RagError::VectorStore(e.to_string()))?;

        if !exists {
            self.client
                .create_collection(
                    CreateCollectionBuilder::new(&self.config.collection).vectors_config(
                        VectorParamsBuilder::new(self.config.vector_dim as u64, Distance::Cosine),
                    ),
                )
                .await
                .map_err(|e| RagError::VectorStore(e.to_string()))?;
        }
        Ok(())
    }

    /// Insert chunks (ingestion hands these over already embedded).
    pub async fn upsert(&self, chunks: &[Chunk]) -> std::result::Result<(), RagError> {
        let points: Vec<PointStruct> = chunks
            .iter()
            .map(|chunk| {
                let mut payload: HashMap<String, qdrant_client::qdrant::Value> = HashMap::new();
                payload.insert("text".to_string(), chunk.text.clone().into());
                payload.insert("source".to_string(), chunk.source.clone().into());
                payload.insert("seq".to_string(), (chunk.seq as i64).into());
                PointStruct::new(chunk.id.clone(), chunk.embedding.clone(), payload)
            })
            .collect();

        self.client
            .upsert_points(UpsertPointsBuilder::new(&self.config.collection, points))
            .await
            .map_err(|e| RagError::VectorStore(e.to_string()))?;
        Ok(())
    }

    fn source_filter(sources: &[String]) -> Option<Filter> {
        if sources.is_empty() {
            return None;
        }
        Some(Filter {
            must: vec![Condition {
                condition_one_of: Some(ConditionOneOf::Field(FieldCondition {
                    key: "source".to_string(),
                    r#match: Some(Match {
                        match_value: Some(MatchValue::Keywords(RepeatedStrings {
                            strings: sources.to_vec(),
                        })),
                    }),
                    ..Default::default()
                })),
            }],
            ..Default::default()
        })
    }

    fn seq_filter(since: u64) -> Filter {
        Filter {
            must: vec![Condition {
                condition_one_of: Some(ConditionOneOf::Field(FieldCondition {
                    key: "seq".to_string(),
                    range: Some(Range {
                        gt: Some(since as f64),
                        ..Default::default()
                    }),
                    ..Default::default()
                })),
            }],
            ..Default::default()
        }
    }
}

#[async_trait]
impl VectorStore for QdrantVectorStore {
    async fn search(
        &self,
        vector: &[f32],
        k: usize,
        sources: &[String],
        min_score: Option<f32>,
    ) -> Result<Vec<ScoredChunk>> {
        let mut builder =
            SearchPointsBuilder::new(&self.config.collection, vector.to_vec(), k as u64)
                .with_payload(true);
        if let Some(filter) = Self::source_filter(sources) {
            builder = builder.filter(filter);
        }
        if let Some(min) = min_score {
            builder = builder.score_threshold(min);
        }

        let response = self
            .client
            .search_points(builder)
            .await
            .map_err(|e| RagError::VectorStore(e.to_string()))?;

        Ok(response
            .result
            .into_iter()
            .map(|point| {
                let (text, source, _) = split_payload(point.payload);
                ScoredChunk {
                    chunk_id: point_id_string(point.id),
                    source,
                    text,
                    score: point.score,
                }
            })
            .collect())
    }

    async fn list_chunks(&self, since: Option<u64>) -> Result<BoxStream<'static, Result<Chunk>>> {
        let client = Arc::clone(&self.client);
        let collection = self.config.collection.clone();
        let filter = since.map(Self::seq_filter);

        let stream = async_stream::try_stream! {
            let mut offset: Option<qdrant_client::qdrant::PointId> = None;
            loop {
                let mut builder = ScrollPointsBuilder::new(&collection)
                    .limit(SCROLL_PAGE)
                    .with_payload(true)
                    .with_vectors(true);
                if let Some(ref filter) = filter {
                    builder = builder.filter(filter.clone());
                }
                if let Some(offset) = offset.take() {
                    builder = builder.offset(offset);
                }

                let response = client
                    .scroll(builder)
                    .await
                    .map_err(|e| docqa_core::Error::from(RagError::VectorStore(e.to_string())))?;

                for point in response.result {
                    let embedding = point
                        .vectors
                        .and_then(|v| v.vectors_options)
                        .map(|options| match options {
                            VectorsOptions::Vector(vector) => vector.data,
                            _ => Vec::new(),
                        })
                        .unwrap_or_default();
                    let (text, source, seq) = split_payload(point.payload);
                    yield Chunk {
                        id: point_id_string(point.id),
                        source,
                        text,
                        embedding,
                        seq,
                    };
                }

                match response.next_page_offset {
                    Some(next) => offset = Some(next),
                    None => break,
                }
            }
        };

        Ok(Box::pin(stream))
    }

    async fn delete_by_source(&self, source: &str) -> Result<()> {
        let sources = vec![source.to_string()];
        let filter = Self::source_filter(&sources).unwrap_or_default();

        self.client
            .delete_points(DeletePointsBuilder::new(&self.config.collection).points(filter))
            .await
            .map_err(|e| RagError::VectorStore(e.to_string()))?;
        Ok(())
    }
}

fn point_id_string(id: Option<qdrant_client::qdrant::PointId>) -> String {
    use qdrant_client::qdrant::point_id::PointIdOptions;
    id.and_then(|pid| pid.point_id_options)
        .map(|options| match options {
            PointIdOptions::Uuid(uuid) => uuid,
            PointIdOptions::Num(num) => num.to_string(),
        })
        .unwrap_or_default()
}

fn split_payload(
    payload: HashMap<String, qdrant_client::qdrant::Value>,
) -> (String, String, u64) {
    let mut text = String::new();
    let mut source = String::new();
    let mut seq = 0u64;
    for (key, value) in payload {
        match (key.as_str(), value.kind) {
            ("text", Some(Kind::StringValue(s))) => text = s,
            ("source", Some(Kind::StringValue(s))) => source = s,
            ("seq", Some(Kind::IntegerValue(n))) => seq = n.max(0) as u64,
            _ => {}
        }
    }
    (text, source, seq)
}
