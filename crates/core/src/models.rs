use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Text of one physical PDF page together with where it came from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageDocument {
    pub text: String,
    pub source: String,
    /// 1-indexed physical page number.
    pub page: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chunk {
    pub text: String,
    pub source: String,
    pub page: u32,
    /// Position of the chunk within a single chunking call; restarts at zero on every call.
    pub chunk_id: u64,
}

impl Chunk {
    pub fn metadata(&self) -> ChunkMetadata {
        ChunkMetadata {
            source: self.source.clone(),
            page: self.page,
            chunk_id: self.chunk_id,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ChunkMetadata {
    pub source: String,
    pub page: u32,
    pub chunk_id: u64,
}

/// A chunk as owned by the embedding index.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexRecord {
    pub id: String,
    pub text: String,
    pub metadata: ChunkMetadata,
}

/// Nearest-neighbour hit. `distance` is cosine distance: 0.0 is identical, larger is further.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candidate {
    pub id: String,
    pub text: String,
    pub metadata: ChunkMetadata,
    pub distance: f32,
}

/// Candidate after cross-encoder scoring; higher `score` is more relevant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankedResult {
    pub id: String,
    pub text: String,
    pub metadata: ChunkMetadata,
    pub score: f32,
    pub distance: f32,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RetrievalResponse {
    pub content: String,
    pub sources: Vec<ChunkMetadata>,
}

impl RetrievalResponse {
    pub const SEPARATOR: &'static str = "\n\n";

    pub fn from_ranked(results: &[RankedResult]) -> Self {
        Self {
            content: results
                .iter()
                .map(|result| result.text.as_str())
                .collect::<Vec<_>>()
                .join(Self::SEPARATOR),
            sources: results.iter().map(|result| result.metadata.clone()).collect(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }

    /// Distinct source files in the order they were first cited.
    pub fn source_files(&self) -> Vec<&str> {
        let mut files: Vec<&str> = Vec::new();
        for source in &self.sources {
            if !files.contains(&source.source.as_str()) {
                files.push(&source.source);
            }
        }
        files
    }
}

/// What to do when one file of a multi-file load cannot be read.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum IngestFailurePolicy {
    /// Abort the whole call on the first unreadable file.
    FailFast,
    /// Record the file as skipped and keep going.
    #[default]
    SkipUnreadable,
}

#[derive(Debug, Clone)]
pub struct IngestionOptions {
    pub chunk_max_chars: usize,
    pub chunk_overlap_chars: usize,
    pub failure_policy: IngestFailurePolicy,
}

impl Default for IngestionOptions {
    fn default() -> Self {
        Self {
            chunk_max_chars: 512,
            chunk_overlap_chars: 100,
            failure_policy: IngestFailurePolicy::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct RetrievalOptions {
    /// Reject `n > k` instead of silently truncating.
    pub strict_validation: bool,
}

/// Where the index keeps its records.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StorageMode {
    /// In-process only; lost on restart, re-ingestion required.
    Ephemeral,
    /// Snapshot on local disk; survives restart.
    Persistent(PathBuf),
    /// Held by an external vector database.
    Remote(String),
}

impl std::fmt::Display for StorageMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StorageMode::Ephemeral => write!(f, "ephemeral (in-memory)"),
            StorageMode::Persistent(path) => write!(f, "persistent ({})", path.display()),
            StorageMode::Remote(endpoint) => write!(f, "remote ({endpoint})"),
        }
    }
}
