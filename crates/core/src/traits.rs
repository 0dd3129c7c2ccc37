use crate::models::{Candidate, IndexRecord, StorageMode};
use crate::SearchError;
use async_trait::async_trait;

/// Backing storage for the embedding index.
///
/// Stores are keyed by record id: upserting an existing id replaces it.
#[async_trait]
pub trait VectorStore: Send + Sync {
    fn storage(&self) -> StorageMode;

    fn dimensions(&self) -> usize;

    /// Embedding model the stored vectors came from, when the store records it.
    fn embedding_model(&self) -> Option<String>;

    async fn upsert(
        &self,
        records: &[IndexRecord],
        embeddings: &[Vec<f32>],
    ) -> Result<(), SearchError>;

    /// Up to `k` records ordered by increasing cosine distance to `query_vector`.
    async fn nearest(&self, query_vector: &[f32], k: usize) -> Result<Vec<Candidate>, SearchError>;

    async fn count(&self) -> Result<usize, SearchError>;
}

pub(crate) fn check_batch(
    records: &[IndexRecord],
    embeddings: &[Vec<f32>],
    dimensions: usize,
) -> Result<(), SearchError> {
    if records.len() != embeddings.len() {
        return Err(SearchError::Request(format!(
            "embedding count {} doesn't match record count {}",
            embeddings.len(),
            records.len()
        )));
    }

    match embeddings.iter().find(|embedding| embedding.len() != dimensions) {
        Some(wrong) => Err(SearchError::DimensionMismatch {
            expected: dimensions,
            actual: wrong.len(),
        }),
        None => Ok(()),
    }
}
