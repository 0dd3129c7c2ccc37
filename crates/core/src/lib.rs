pub mod chunking;
pub mod embeddings;
pub mod error;
pub mod extractor;
pub mod index;
pub mod ingest;
pub mod models;
pub mod orchestrator;
pub mod pipeline;
pub mod rerank;
pub mod stores;
pub mod traits;

pub use chunking::{chunk_documents, normalize_text, ChunkingConfig};
pub use embeddings::{
    CharacterNgramEmbedder, Embedder, HttpEmbedder, HttpModelConfig, DEFAULT_EMBEDDING_DIMENSIONS,
};
pub use error::{IngestError, PipelineError, SearchError};
pub use extractor::{LopdfExtractor, PdfExtractor};
pub use index::EmbeddingIndex;
pub use ingest::{discover_pdf_files, load_pdfs, LoadReport, SkippedPdf};
pub use models::{
    Candidate, Chunk, ChunkMetadata, IndexRecord, IngestFailurePolicy, IngestionOptions,
    PageDocument, RankedResult, RetrievalOptions, RetrievalResponse, StorageMode,
};
pub use orchestrator::RetrievalCoordinator;
pub use pipeline::{IngestSummary, RagPipeline};
pub use rerank::{CrossEncoder, HttpCrossEncoder, Reranker, TermOverlapScorer};
pub use stores::{cosine_distance, MemoryStore, QdrantStore};
pub use traits::VectorStore;
