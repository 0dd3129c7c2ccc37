//! The ingestion and retrieval operations consumed by the API layer.
//!
//! Models and the store are built once by the caller and handed in, so the pipeline never
//! loads anything itself:
//!
//! ```no_run
//! use pdf_rag_core::{
//!     CharacterNgramEmbedder, EmbeddingIndex, IngestionOptions, LopdfExtractor, MemoryStore,
//!     RagPipeline, Reranker, RetrievalOptions, TermOverlapScorer,
//! };
//! use std::sync::Arc;
//!
//! # async fn run() -> Result<(), pdf_rag_core::PipelineError> {
//! let embedder = CharacterNgramEmbedder::default();
//! let index = EmbeddingIndex::open(
//!     Arc::new(embedder),
//!     Arc::new(MemoryStore::new(embedder.dimensions)),
//! )
//! .await?;
//! let pipeline = RagPipeline::new(
//!     Box::new(LopdfExtractor),
//!     Arc::new(index),
//!     Reranker::new(Arc::new(TermOverlapScorer::default())),
//!     IngestionOptions::default(),
//!     RetrievalOptions::default(),
//! );
//!
//! pipeline.ingest(&["uploads/manual.pdf"]).await?;
//! let response = pipeline.retrieve("How do I bleed the brakes?", 10, 3).await?;
//! println!("{}", response.content);
//! # Ok(())
//! # }
//! ```

use crate::chunking::{chunk_documents, ChunkingConfig};
use crate::extractor::PdfExtractor;
use crate::index::EmbeddingIndex;
use crate::ingest::{load_pdfs, LoadReport, SkippedPdf};
use crate::orchestrator::RetrievalCoordinator;
use crate::rerank::Reranker;
use crate::{
    Chunk, IngestError, IngestionOptions, PageDocument, PipelineError, RankedResult,
    RetrievalOptions, RetrievalResponse, SearchError, StorageMode,
};
use std::path::Path;
use std::sync::Arc;
use tracing::info;

/// Outcome of one `load → chunk → index` run.
#[derive(Debug, Clone, Default)]
pub struct IngestSummary {
    pub pages: usize,
    pub chunks: usize,
    pub record_ids: Vec<String>,
    pub skipped: Vec<SkippedPdf>,
}

pub struct RagPipeline {
    extractor: Box<dyn PdfExtractor>,
    index: Arc<EmbeddingIndex>,
    retriever: RetrievalCoordinator,
    ingestion: IngestionOptions,
}

impl RagPipeline {
    pub fn new(
        extractor: Box<dyn PdfExtractor>,
        index: Arc<EmbeddingIndex>,
        reranker: Reranker,
        ingestion: IngestionOptions,
        retrieval: RetrievalOptions,
    ) -> Self {
        let retriever = RetrievalCoordinator::new(Arc::clone(&index), reranker, retrieval);
        Self {
            extractor,
            index,
            retriever,
            ingestion,
        }
    }

    pub fn storage(&self) -> StorageMode {
        self.index.storage()
    }

    pub fn index_handle(&self) -> &EmbeddingIndex {
        &self.index
    }

    /// Normalized pages of every readable file, plus the files skipped under the configured
    /// failure policy.
    pub fn load<P: AsRef<Path>>(&self, paths: &[P]) -> Result<LoadReport, IngestError> {
        load_pdfs(paths, self.extractor.as_ref(), self.ingestion.failure_policy)
    }

    pub fn chunk(&self, documents: &[PageDocument]) -> Result<Vec<Chunk>, IngestError> {
        chunk_documents(documents, ChunkingConfig::from(&self.ingestion))
    }

    pub async fn index(&self, chunks: &[Chunk]) -> Result<Vec<String>, SearchError> {
        self.index.upsert(chunks).await
    }

    pub async fn retrieve(
        &self,
        query: &str,
        k: usize,
        n: usize,
    ) -> Result<RetrievalResponse, SearchError> {
        self.retriever.retrieve(query, k, n).await
    }

    pub async fn retrieve_ranked(
        &self,
        query: &str,
        k: usize,
        n: usize,
    ) -> Result<Vec<RankedResult>, SearchError> {
        self.retriever.retrieve_ranked(query, k, n).await
    }

    pub async fn ingest<P: AsRef<Path>>(&self, paths: &[P]) -> Result<IngestSummary, PipelineError> {
        let report = self.load(paths)?;
        let chunks = self.chunk(&report.pages)?;
        let record_ids = self.index(&chunks).await?;

        info!(
            files = paths.len(),
            skipped = report.skipped.len(),
            pages = report.pages.len(),
            chunks = chunks.len(),
            "ingested upload batch"
        );

        Ok(IngestSummary {
            pages: report.pages.len(),
            chunks: chunks.len(),
            record_ids,
            skipped: report.skipped,
        })
    }
}
