use crate::embeddings::Embedder;
use crate::models::{Candidate, Chunk, IndexRecord, StorageMode};
use crate::traits::VectorStore;
use crate::SearchError;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info};

/// Chunk text, metadata and embeddings behind one embedding model.
///
/// Record ids are `doc_{counter}_{position}`, where `counter` is the number of records this
/// index had assigned before the batch. The counter only grows and re-uploading the same
/// content produces new records.
pub struct EmbeddingIndex {
    embedder: Arc<dyn Embedder>,
    store: Arc<dyn VectorStore>,
    counter: Mutex<u64>,
}

impl EmbeddingIndex {
    /// Binds `store` to `embedder`, refusing stores written with another model or dimension.
    pub async fn open(
        embedder: Arc<dyn Embedder>,
        store: Arc<dyn VectorStore>,
    ) -> Result<Self, SearchError> {
        if store.dimensions() != embedder.dimensions() {
            return Err(SearchError::DimensionMismatch {
                expected: store.dimensions(),
                actual: embedder.dimensions(),
            });
        }

        if let Some(indexed) = store.embedding_model() {
            if indexed != embedder.model_id() {
                return Err(SearchError::EmbeddingModelMismatch {
                    indexed,
                    configured: embedder.model_id(),
                });
            }
        }

        let existing = store.count().await? as u64;
        info!(
            storage = %store.storage(),
            model = %embedder.model_id(),
            dimensions = embedder.dimensions(),
            records = existing,
            "embedding index open"
        );

        Ok(Self {
            embedder,
            store,
            counter: Mutex::new(existing),
        })
    }

    pub fn storage(&self) -> StorageMode {
        self.store.storage()
    }

    pub fn embedding_model(&self) -> String {
        self.embedder.model_id()
    }

    pub async fn len(&self) -> Result<usize, SearchError> {
        self.store.count().await
    }

    pub async fn is_empty(&self) -> Result<bool, SearchError> {
        Ok(self.len().await? == 0)
    }

    /// Embeds and stores `chunks`, returning the assigned record ids in chunk order.
    ///
    /// The counter lock is held from reading the counter until it has been advanced past the
    /// batch, so concurrent upserts on the same index never share ids.
    pub async fn upsert(&self, chunks: &[Chunk]) -> Result<Vec<String>, SearchError> {
        if chunks.is_empty() {
            return Ok(Vec::new());
        }

        let texts: Vec<String> = chunks.iter().map(|chunk| chunk.text.clone()).collect();
        let embeddings = self.embedder.embed_batch(&texts).await?;
        if embeddings.len() != chunks.len() {
            return Err(SearchError::BackendResponse {
                backend: self.embedder.model_id(),
                details: format!(
                    "{} embeddings returned for {} chunks",
                    embeddings.len(),
                    chunks.len()
                ),
            });
        }

        let mut counter = self.counter.lock().await;
        let base = *counter;
        let records: Vec<IndexRecord> = chunks
            .iter()
            .enumerate()
            .map(|(position, chunk)| IndexRecord {
                id: format!("doc_{base}_{position}"),
                text: chunk.text.clone(),
                metadata: chunk.metadata(),
            })
            .collect();

        // Stores apply a batch whole or not at all, so a failed write leaves these ids unused.
        self.store.upsert(&records, &embeddings).await?;
        *counter = base + chunks.len() as u64;

        debug!(first = base, count = records.len(), "indexed chunks");
        Ok(records.into_iter().map(|record| record.id).collect())
    }

    /// Up to `k` nearest records by cosine distance, closest first. An empty index yields an
    /// empty list.
    pub async fn query(&self, text: &str, k: usize) -> Result<Vec<Candidate>, SearchError> {
        let vector = self.embedder.embed(text).await?;
        if vector.len() != self.store.dimensions() {
            return Err(SearchError::DimensionMismatch {
                expected: self.store.dimensions(),
                actual: vector.len(),
            });
        }

        if k == 0 {
            return Ok(Vec::new());
        }
        self.store.nearest(&vector, k).await
    }
}
