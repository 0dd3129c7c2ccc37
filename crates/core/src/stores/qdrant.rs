use crate::models::{Candidate, ChunkMetadata, IndexRecord, StorageMode};
use crate::traits::{check_batch, VectorStore};
use crate::SearchError;
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde_json::{json, Value};
use sha2::{Digest, Sha256};
use tracing::{debug, info, warn};
use uuid::Uuid;

const BACKEND: &str = "qdrant";

pub struct QdrantStore {
    endpoint: String,
    collection: String,
    client: Client,
    vector_size: usize,
    embedding_model: Option<String>,
}

impl QdrantStore {
    /// Store handle that has not talked to the server yet; it records no embedding model until
    /// [`QdrantStore::connect`] reads one from the collection.
    pub fn new(endpoint: impl Into<String>, collection: impl Into<String>, vector_size: usize) -> Self {
        Self {
            endpoint: endpoint.into().trim_end_matches('/').to_string(),
            collection: collection.into(),
            client: Client::new(),
            vector_size,
            embedding_model: None,
        }
    }

    /// Opens the collection, creating it for `embedding_model` when it does not exist yet.
    ///
    /// An existing collection reports the model it was created for, which the index compares
    /// against its embedder.
    pub async fn connect(
        endpoint: impl Into<String>,
        collection: impl Into<String>,
        vector_size: usize,
        embedding_model: impl Into<String>,
    ) -> Result<Self, SearchError> {
        let mut store = Self::new(endpoint, collection, vector_size);
        store.embedding_model = store.ensure_collection(&embedding_model.into()).await?;
        Ok(store)
    }

    fn collection_url(&self) -> String {
        format!("{}/collections/{}", self.endpoint, self.collection)
    }

    /// Creates the collection with cosine distance, or checks that an existing one has the
    /// configured vector size. Returns the embedding model recorded on the collection.
    async fn ensure_collection(&self, embedding_model: &str) -> Result<Option<String>, SearchError> {
        let response = self.client.get(self.collection_url()).send().await?;

        if response.status() == StatusCode::NOT_FOUND {
            let response = self
                .client
                .put(self.collection_url())
                .json(&json!({
                    "vectors": { "size": self.vector_size, "distance": "Cosine" },
                    "metadata": { "embedding_model": embedding_model },
                }))
                .send()
                .await?;
            expect_success(response.status())?;
            info!(
                collection = %self.collection,
                size = self.vector_size,
                model = embedding_model,
                "created qdrant collection"
            );
            return Ok(Some(embedding_model.to_string()));
        }

        expect_success(response.status())?;
        let parsed: Value = response.json().await?;
        let (size, recorded) = parse_collection_info(&parsed)?;

        if size != self.vector_size {
            return Err(SearchError::DimensionMismatch {
                expected: size,
                actual: self.vector_size,
            });
        }
        if recorded.is_none() {
            warn!(
                collection = %self.collection,
                "collection records no embedding model; vectors cannot be checked against it"
            );
        }
        Ok(recorded)
    }
}

/// Vector size and recorded embedding model from a `GET /collections/{name}` response.
fn parse_collection_info(parsed: &Value) -> Result<(usize, Option<String>), SearchError> {
    let size = parsed
        .pointer("/result/config/params/vectors/size")
        .and_then(Value::as_u64)
        .ok_or_else(|| SearchError::BackendResponse {
            backend: BACKEND.to_string(),
            details: "collection info has no vector size".to_string(),
        })? as usize;
    let model = parsed
        .pointer("/result/config/metadata/embedding_model")
        .and_then(Value::as_str)
        .map(str::to_string);
    Ok((size, model))
}

fn expect_success(status: StatusCode) -> Result<(), SearchError> {
    if status.is_success() {
        Ok(())
    } else {
        Err(SearchError::BackendResponse {
            backend: BACKEND.to_string(),
            details: status.to_string(),
        })
    }
}

/// Qdrant only accepts integer or UUID point ids, so record ids are hashed into a UUID.
fn point_id(record_id: &str) -> Uuid {
    let digest = Sha256::digest(record_id.as_bytes());
    let mut bytes = [0u8; 16];
    bytes.copy_from_slice(&digest[..16]);
    uuid::Builder::from_random_bytes(bytes).into_uuid()
}

fn point(record: &IndexRecord, embedding: &[f32]) -> Value {
    json!({
        "id": point_id(&record.id).to_string(),
        "vector": embedding,
        "payload": {
            "record_id": record.id,
            "text": record.text,
            "source": record.metadata.source,
            "page": record.metadata.page,
            "chunk_id": record.metadata.chunk_id,
        },
    })
}

/// Converts a `points/search` response into candidates, turning cosine similarity into
/// cosine distance.
fn parse_search_hits(parsed: &Value) -> Result<Vec<Candidate>, SearchError> {
    let hits = parsed
        .pointer("/result")
        .and_then(Value::as_array)
        .ok_or_else(|| SearchError::BackendResponse {
            backend: BACKEND.to_string(),
            details: "search response has no result array".to_string(),
        })?;

    let mut result = Vec::new();
    for hit in hits {
        let text_field = |pointer: &str| {
            hit.pointer(pointer)
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string()
        };
        let score = hit.pointer("/score").and_then(Value::as_f64).unwrap_or(0.0);

        result.push(Candidate {
            id: text_field("/payload/record_id"),
            text: text_field("/payload/text"),
            metadata: ChunkMetadata {
                source: text_field("/payload/source"),
                page: hit
                    .pointer("/payload/page")
                    .and_then(Value::as_u64)
                    .unwrap_or_default() as u32,
                chunk_id: hit
                    .pointer("/payload/chunk_id")
                    .and_then(Value::as_u64)
                    .unwrap_or_default(),
            },
            distance: (1.0 - score) as f32,
        });
    }

    Ok(result)
}

#[async_trait]
impl VectorStore for QdrantStore {
    fn storage(&self) -> StorageMode {
        StorageMode::Remote(self.collection_url())
    }

    fn dimensions(&self) -> usize {
        self.vector_size
    }

    fn embedding_model(&self) -> Option<String> {
        self.embedding_model.clone()
    }

    async fn upsert(
        &self,
        records: &[IndexRecord],
        embeddings: &[Vec<f32>],
    ) -> Result<(), SearchError> {
        check_batch(records, embeddings, self.vector_size)?;

        let points = records
            .iter()
            .zip(embeddings.iter())
            .map(|(record, embedding)| point(record, embedding))
            .collect::<Vec<_>>();

        if points.is_empty() {
            return Ok(());
        }

        let response = self
            .client
            .put(format!("{}/points?wait=true", self.collection_url()))
            .json(&json!({ "points": points }))
            .send()
            .await?;
        expect_success(response.status())?;

        debug!(collection = %self.collection, points = records.len(), "upserted qdrant points");
        Ok(())
    }

    async fn nearest(&self, query_vector: &[f32], k: usize) -> Result<Vec<Candidate>, SearchError> {
        if query_vector.len() != self.vector_size {
            return Err(SearchError::DimensionMismatch {
                expected: self.vector_size,
                actual: query_vector.len(),
            });
        }
        if k == 0 {
            return Ok(Vec::new());
        }

        let response = self
            .client
            .post(format!("{}/points/search", self.collection_url()))
            .json(&json!({
                "vector": query_vector,
                "limit": k,
                "with_payload": true,
            }))
            .send()
            .await?;
        expect_success(response.status())?;

        let parsed: Value = response.json().await?;
        parse_search_hits(&parsed)
    }

    async fn count(&self) -> Result<usize, SearchError> {
        let response = self
            .client
            .post(format!("{}/points/count", self.collection_url()))
            .json(&json!({ "exact": true }))
            .send()
            .await?;
        expect_success(response.status())?;

        let parsed: Value = response.json().await?;
        parsed
            .pointer("/result/count")
            .and_then(Value::as_u64)
            .map(|count| count as usize)
            .ok_or_else(|| SearchError::BackendResponse {
                backend: BACKEND.to_string(),
                details: "count response has no result.count".to_string(),
            })
    }
}
