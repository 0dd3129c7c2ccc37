mod prompt;

use anyhow::Context;
use chrono::Utc;
use clap::{Parser, Subcommand, ValueEnum};
use pdf_rag_core::{
    discover_pdf_files, CharacterNgramEmbedder, CrossEncoder, Embedder, EmbeddingIndex,
    HttpCrossEncoder, HttpEmbedder, HttpModelConfig, IngestFailurePolicy, IngestionOptions,
    LopdfExtractor, MemoryStore, QdrantStore, RagPipeline, Reranker, RetrievalOptions,
    RetrievalResponse, StorageMode, TermOverlapScorer, VectorStore,
};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Clone, Copy, Debug, ValueEnum)]
enum StoreBackend {
    /// In-process store; add --index-path to keep it on disk.
    Memory,
    /// External Qdrant collection.
    Qdrant,
}

#[derive(Parser)]
#[command(name = "pdf-rag", version)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// OpenAI-compatible embeddings base URL. Uses the local trigram embedder when unset.
    #[arg(long, env = "PDF_RAG_EMBEDDING_URL")]
    embedding_url: Option<String>,

    /// Embedding model name sent to the embeddings endpoint
    #[arg(long, env = "PDF_RAG_EMBEDDING_MODEL", default_value = "sentence-transformers/all-MiniLM-L6-v2")]
    embedding_model: String,

    /// Cross-encoder base URL exposing /rerank. Uses the local term-overlap scorer when unset.
    #[arg(long, env = "PDF_RAG_RERANKER_URL")]
    reranker_url: Option<String>,

    /// Cross-encoder model name
    #[arg(long, env = "PDF_RAG_RERANKER_MODEL", default_value = "cross-encoder/ms-marco-MiniLM-L-6-v2")]
    reranker_model: String,

    /// Bearer token for the model endpoints
    #[arg(long, env = "PDF_RAG_MODEL_API_KEY", hide_env_values = true)]
    model_api_key: Option<String>,

    /// Per-request timeout for model calls, in seconds
    #[arg(long, env = "PDF_RAG_MODEL_TIMEOUT_SECS", default_value = "30")]
    model_timeout_secs: u64,

    /// Vector store backend
    #[arg(long, env = "PDF_RAG_STORE", value_enum, default_value_t = StoreBackend::Memory)]
    store: StoreBackend,

    /// Snapshot file for the memory store. Without it the index is lost on exit.
    #[arg(long, env = "PDF_RAG_INDEX_PATH")]
    index_path: Option<PathBuf>,

    /// Qdrant base URL
    #[arg(long, env = "PDF_RAG_QDRANT_URL", default_value = "http://localhost:6333")]
    qdrant_url: String,

    /// Qdrant collection
    #[arg(long, env = "PDF_RAG_QDRANT_COLLECTION", default_value = "pdf_chunks")]
    qdrant_collection: String,

    /// Maximum chunk length in characters
    #[arg(long, default_value = "512")]
    chunk_size: usize,

    /// Characters shared between consecutive chunks
    #[arg(long, default_value = "100")]
    chunk_overlap: usize,

    /// Abort an upload batch on the first unreadable PDF instead of skipping it
    #[arg(long, default_value_t = false)]
    fail_fast: bool,

    /// Reject searches where n exceeds k instead of truncating
    #[arg(long, env = "PDF_RAG_STRICT", default_value_t = false)]
    strict: bool,
}

#[derive(Subcommand)]
enum Command {
    /// Load, chunk and index PDFs.
    Ingest {
        /// PDF file to ingest; repeat for several.
        #[arg(long = "file")]
        files: Vec<PathBuf>,
        /// Folder searched recursively for PDFs.
        #[arg(long)]
        folder: Option<PathBuf>,
    },
    /// Retrieve reranked context for a question.
    Search {
        /// Question to retrieve context for
        #[arg(long)]
        query: String,
        /// Nearest-neighbour candidates fetched before reranking.
        #[arg(short, long, default_value = "10")]
        k: usize,
        /// Passages kept after reranking.
        #[arg(short, long, default_value = "3")]
        n: usize,
        /// PDFs to ingest before searching, for one-shot use with the in-memory store.
        #[arg(long = "file")]
        files: Vec<PathBuf>,
        /// Print relevance score and distance for each passage.
        #[arg(long, default_value_t = false)]
        explain: bool,
        /// Print the prompt the answer model would receive.
        #[arg(long, default_value_t = false)]
        print_prompt: bool,
    },
    /// Show storage mode, model and record count of the index.
    Inspect,
}

impl Cli {
    fn model_config(&self, base_url: &str, model: &str) -> HttpModelConfig {
        HttpModelConfig {
            base_url: base_url.to_string(),
            model: model.to_string(),
            api_key: self.model_api_key.clone(),
            timeout: Duration::from_secs(self.model_timeout_secs),
        }
    }

    fn ingestion_options(&self) -> IngestionOptions {
        IngestionOptions {
            chunk_max_chars: self.chunk_size,
            chunk_overlap_chars: self.chunk_overlap,
            failure_policy: if self.fail_fast {
                IngestFailurePolicy::FailFast
            } else {
                IngestFailurePolicy::SkipUnreadable
            },
        }
    }

    async fn embedder(&self) -> anyhow::Result<Arc<dyn Embedder>> {
        let embedder: Arc<dyn Embedder> = match &self.embedding_url {
            Some(url) => Arc::new(
                HttpEmbedder::connect(self.model_config(url, &self.embedding_model))
                    .await
                    .context("embedding model failed to load")?,
            ),
            None => Arc::new(CharacterNgramEmbedder::default()),
        };
        Ok(embedder)
    }

    async fn cross_encoder(&self) -> anyhow::Result<Arc<dyn CrossEncoder>> {
        let cross_encoder: Arc<dyn CrossEncoder> = match &self.reranker_url {
            Some(url) => Arc::new(
                HttpCrossEncoder::connect(self.model_config(url, &self.reranker_model))
                    .await
                    .context("reranking model failed to load")?,
            ),
            None => Arc::new(TermOverlapScorer::default()),
        };
        Ok(cross_encoder)
    }

    async fn vector_store(&self, embedder: &dyn Embedder) -> anyhow::Result<Arc<dyn VectorStore>> {
        let store: Arc<dyn VectorStore> = match (self.store, &self.index_path) {
            (StoreBackend::Memory, Some(path)) => Arc::new(
                MemoryStore::persistent(path, embedder.dimensions(), embedder.model_id())
                    .await
                    .with_context(|| format!("cannot open index snapshot {}", path.display()))?,
            ),
            (StoreBackend::Memory, None) => Arc::new(MemoryStore::new(embedder.dimensions())),
            (StoreBackend::Qdrant, _) => Arc::new(
                QdrantStore::connect(
                    &self.qdrant_url,
                    &self.qdrant_collection,
                    embedder.dimensions(),
                    embedder.model_id(),
                )
                .await
                .context("qdrant collection is not usable")?,
            ),
        };
        Ok(store)
    }

    /// Loads both models and the store once; everything after this reuses them.
    async fn pipeline(&self) -> anyhow::Result<RagPipeline> {
        let embedder = self.embedder().await?;
        let cross_encoder = self.cross_encoder().await?;
        let store = self.vector_store(embedder.as_ref()).await?;
        let index = EmbeddingIndex::open(embedder, store)
            .await
            .context("index does not match the configured embedding model")?;

        match index.storage() {
            StorageMode::Ephemeral => warn!(
                "index is in-memory only; records are lost on exit and uploads must be re-ingested"
            ),
            storage => info!(storage = %storage, "index storage"),
        }

        Ok(RagPipeline::new(
            Box::new(LopdfExtractor),
            Arc::new(index),
            Reranker::new(cross_encoder),
            self.ingestion_options(),
            RetrievalOptions {
                strict_validation: self.strict,
            },
        ))
    }
}

async fn ingest(pipeline: &RagPipeline, files: Vec<PathBuf>) -> anyhow::Result<()> {
    if files.is_empty() {
        anyhow::bail!("no pdf files given");
    }

    info!(files = files.len(), "ingesting pdfs");
    let summary = pipeline.ingest(&files).await?;

    for skipped in &summary.skipped {
        warn!(path = %skipped.path.display(), reason = %skipped.reason, "skipped pdf");
    }
    println!(
        "{} PDFs uploaded and processed: {} pages, {} chunks indexed at {}",
        files.len() - summary.skipped.len(),
        summary.pages,
        summary.chunks,
        Utc::now().to_rfc3339()
    );
    Ok(())
}

fn print_sources(response: &RetrievalResponse) {
    println!("files: {}", response.source_files().join(", "));
    for source in &response.sources {
        println!(
            "  source={} page={} chunk={}",
            source.source, source.page, source.chunk_id
        );
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let app_version = env!("CARGO_PKG_VERSION");

    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env())
        .with(fmt::layer())
        .init();

    let cli = Cli::parse();
    info!(
        version = app_version,
        started_at = %Utc::now().to_rfc3339(),
        "pdf-rag boot"
    );

    let pipeline = cli.pipeline().await?;

    match &cli.command {
        Command::Ingest { files, folder } => {
            let mut paths = files.clone();
            if let Some(folder) = folder {
                let found = discover_pdf_files(folder);
                info!(folder = %folder.display(), found = found.len(), "discovered pdfs");
                paths.extend(found);
            }
            ingest(&pipeline, paths).await?;
        }
        Command::Search {
            query,
            k,
            n,
            files,
            explain,
            print_prompt,
        } => {
            if !files.is_empty() {
                ingest(&pipeline, files.clone()).await?;
            }

            let ranked = pipeline.retrieve_ranked(query, *k, *n).await?;
            let response = RetrievalResponse::from_ranked(&ranked);

            println!("query: {query}");
            if response.is_empty() {
                println!("no indexed passages; ingest PDFs first");
                return Ok(());
            }

            if *explain {
                for (rank, result) in ranked.iter().enumerate() {
                    println!(
                        "explain: rank={} id={} score={:.4} distance={:.4}",
                        rank + 1,
                        result.id,
                        result.score,
                        result.distance
                    );
                }
            }

            print_sources(&response);
            println!("content:\n{}", response.content);

            if *print_prompt {
                println!("\n{}", prompt::grounded_prompt(query, &response));
            }
        }
        Command::Inspect => {
            let index = pipeline.index_handle();
            println!("storage: {}", index.storage());
            println!("embedding_model: {}", index.embedding_model());
            println!("records: {}", index.len().await?);
        }
    }

    Ok(())
}
