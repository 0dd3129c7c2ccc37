//! In-process vector store with optional on-disk snapshot.
//!
//! [`MemoryStore::new`] is ephemeral: everything is gone when the process exits and uploads
//! must be ingested again. [`MemoryStore::persistent`] loads a JSON snapshot at startup and
//! rewrites it after every upsert, so the index survives restarts.

use crate::models::{Candidate, IndexRecord, StorageMode};
use crate::traits::{check_batch, VectorStore};
use crate::SearchError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tokio::sync::RwLock;
use tracing::{debug, info};

#[derive(Debug, Clone, Serialize, Deserialize)]
struct StoredRecord {
    record: IndexRecord,
    embedding: Vec<f32>,
}

#[derive(Debug, Serialize, Deserialize)]
struct Snapshot {
    saved_at: DateTime<Utc>,
    dimensions: usize,
    embedding_model: Option<String>,
    records: Vec<StoredRecord>,
}

#[derive(Debug, Clone, Default)]
struct Records {
    entries: Vec<StoredRecord>,
    positions: HashMap<String, usize>,
}

impl Records {
    fn from_entries(entries: Vec<StoredRecord>) -> Self {
        let positions = entries
            .iter()
            .enumerate()
            .map(|(position, entry)| (entry.record.id.clone(), position))
            .collect();
        Self { entries, positions }
    }

    fn put(&mut self, entry: StoredRecord) {
        match self.positions.get(&entry.record.id) {
            Some(&position) => self.entries[position] = entry,
            None => {
                self.positions
                    .insert(entry.record.id.clone(), self.entries.len());
                self.entries.push(entry);
            }
        }
    }
}

pub struct MemoryStore {
    dimensions: usize,
    embedding_model: Option<String>,
    snapshot_path: Option<PathBuf>,
    records: RwLock<Records>,
}

impl MemoryStore {
    #[must_use]
    pub fn new(dimensions: usize) -> Self {
        Self {
            dimensions,
            embedding_model: None,
            snapshot_path: None,
            records: RwLock::new(Records::default()),
        }
    }

    /// Opens (or starts) a snapshot at `path`.
    ///
    /// An existing snapshot keeps the dimension and model it was written with; the index
    /// compares those against its embedder before accepting the store.
    pub async fn persistent(
        path: impl Into<PathBuf>,
        dimensions: usize,
        embedding_model: impl Into<String>,
    ) -> Result<Self, SearchError> {
        let path = path.into();

        if tokio::fs::try_exists(&path).await? {
            let bytes = tokio::fs::read(&path).await?;
            let snapshot: Snapshot = serde_json::from_slice(&bytes)?;
            info!(
                path = %path.display(),
                records = snapshot.records.len(),
                saved_at = %snapshot.saved_at.to_rfc3339(),
                "loaded index snapshot"
            );

            return Ok(Self {
                dimensions: snapshot.dimensions,
                embedding_model: snapshot.embedding_model,
                snapshot_path: Some(path),
                records: RwLock::new(Records::from_entries(snapshot.records)),
            });
        }

        Ok(Self {
            dimensions,
            embedding_model: Some(embedding_model.into()),
            snapshot_path: Some(path),
            records: RwLock::new(Records::default()),
        })
    }

    async fn save(&self, path: &Path, records: &Records) -> Result<(), SearchError> {
        let snapshot = Snapshot {
            saved_at: Utc::now(),
            dimensions: self.dimensions,
            embedding_model: self.embedding_model.clone(),
            records: records.entries.clone(),
        };
        let bytes = serde_json::to_vec(&snapshot)?;

        if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }
        let staging = path.with_extension("tmp");
        tokio::fs::write(&staging, bytes).await?;
        tokio::fs::rename(&staging, path).await?;

        debug!(path = %path.display(), records = records.entries.len(), "saved index snapshot");
        Ok(())
    }
}

/// `1 - cosine similarity`; 0.0 for identical direction, 2.0 for opposite.
pub fn cosine_distance(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if norm_a == 0.0 || norm_b == 0.0 {
        return 1.0;
    }

    1.0 - dot / (norm_a * norm_b)
}

#[async_trait]
impl VectorStore for MemoryStore {
    fn storage(&self) -> StorageMode {
        match &self.snapshot_path {
            Some(path) => StorageMode::Persistent(path.clone()),
            None => StorageMode::Ephemeral,
        }
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn embedding_model(&self) -> Option<String> {
        self.embedding_model.clone()
    }

    async fn upsert(
        &self,
        records: &[IndexRecord],
        embeddings: &[Vec<f32>],
    ) -> Result<(), SearchError> {
        check_batch(records, embeddings, self.dimensions)?;

        let mut store = self.records.write().await;

        // The batch only becomes visible once the snapshot holding it has been written.
        let mut staged = match &self.snapshot_path {
            Some(_) => store.clone(),
            None => std::mem::take(&mut *store),
        };
        for (record, embedding) in records.iter().zip(embeddings) {
            staged.put(StoredRecord {
                record: record.clone(),
                embedding: embedding.clone(),
            });
        }
        if let Some(path) = &self.snapshot_path {
            self.save(path, &staged).await?;
        }

        *store = staged;
        debug!(records = records.len(), total = store.entries.len(), "upserted records");
        Ok(())
    }

    async fn nearest(&self, query_vector: &[f32], k: usize) -> Result<Vec<Candidate>, SearchError> {
        if query_vector.len() != self.dimensions {
            return Err(SearchError::DimensionMismatch {
                expected: self.dimensions,
                actual: query_vector.len(),
            });
        }

        let store = self.records.read().await;
        let mut scored: Vec<(f32, &StoredRecord)> = store
            .entries
            .iter()
            .map(|entry| (cosine_distance(query_vector, &entry.embedding), entry))
            .collect();

        // Stable, so equally distant records stay in insertion order.
        scored.sort_by(|left, right| left.0.total_cmp(&right.0));

        Ok(scored
            .into_iter()
            .take(k)
            .map(|(distance, entry)| Candidate {
                id: entry.record.id.clone(),
                text: entry.record.text.clone(),
                metadata: entry.record.metadata.clone(),
                distance,
            })
            .collect())
    }

    async fn count(&self) -> Result<usize, SearchError> {
        Ok(self.records.read().await.entries.len())
    }
}
