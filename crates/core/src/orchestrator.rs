use crate::index::EmbeddingIndex;
use crate::rerank::Reranker;
use crate::{RankedResult, RetrievalOptions, RetrievalResponse, SearchError};
use std::sync::Arc;
use tracing::debug;

/// Two-stage retrieval: `k` nearest neighbours from the index, reranked by the cross-encoder,
/// cut down to the best `n`.
///
/// Asking for more than the index holds is not an error; the coordinator works with whatever
/// is there. `n > k` is truncated unless strict validation is on.
pub struct RetrievalCoordinator {
    index: Arc<EmbeddingIndex>,
    reranker: Reranker,
    options: RetrievalOptions,
}

impl RetrievalCoordinator {
    pub fn new(index: Arc<EmbeddingIndex>, reranker: Reranker, options: RetrievalOptions) -> Self {
        Self {
            index,
            reranker,
            options,
        }
    }

    fn validate(&self, query: &str, k: usize, n: usize) -> Result<(), SearchError> {
        if query.trim().is_empty() {
            return Err(SearchError::InvalidRequest("query is empty".to_string()));
        }
        if k < 1 {
            return Err(SearchError::InvalidRequest("k must be at least 1".to_string()));
        }
        if n < 1 {
            return Err(SearchError::InvalidRequest("n must be at least 1".to_string()));
        }
        if self.options.strict_validation && n > k {
            return Err(SearchError::InvalidRequest(format!(
                "n ({n}) must not exceed k ({k})"
            )));
        }
        Ok(())
    }

    /// The best `n` reranked results, most relevant first.
    pub async fn retrieve_ranked(
        &self,
        query: &str,
        k: usize,
        n: usize,
    ) -> Result<Vec<RankedResult>, SearchError> {
        self.validate(query, k, n)?;

        let candidates = self.index.query(query, k).await?;
        if candidates.is_empty() {
            debug!(k, "no candidates in index");
            return Ok(Vec::new());
        }

        let fetched = candidates.len();
        let mut ranked = self.reranker.rerank(query, candidates).await?;
        ranked.truncate(n);

        debug!(k, n, fetched, kept = ranked.len(), "retrieved context");
        Ok(ranked)
    }

    pub async fn retrieve(
        &self,
        query: &str,
        k: usize,
        n: usize,
    ) -> Result<RetrievalResponse, SearchError> {
        let ranked = self.retrieve_ranked(query, k, n).await?;
        Ok(RetrievalResponse::from_ranked(&ranked))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embeddings::{CharacterNgramEmbedder, Embedder};
    use crate::rerank::{CrossEncoder, TermOverlapScorer};
    use crate::stores::MemoryStore;
    use crate::Chunk;
    use async_trait::async_trait;

    fn chunk(text: &str, page: u32, chunk_id: u64) -> Chunk {
        Chunk {
            text: text.to_string(),
            source: "/uploads/geo.pdf".to_string(),
            page,
            chunk_id,
        }
    }

    async fn coordinator_with(
        encoder: Arc<dyn CrossEncoder>,
        options: RetrievalOptions,
        texts: &[&str],
    ) -> RetrievalCoordinator {
        let embedder = CharacterNgramEmbedder::default();
        let index = EmbeddingIndex::open(
            Arc::new(embedder),
            Arc::new(MemoryStore::new(embedder.dimensions())),
        )
        .await
        .unwrap();
        let chunks: Vec<Chunk> = texts
            .iter()
            .enumerate()
            .map(|(position, text)| chunk(text, position as u32 + 1, position as u64))
            .collect();
        index.upsert(&chunks).await.unwrap();

        RetrievalCoordinator::new(Arc::new(index), Reranker::new(encoder), options)
    }

    /// Scores a passage by how many characters it has, so the longest passage wins regardless
    /// of what the vector search preferred.
    struct LongestWins;

    #[async_trait]
    impl CrossEncoder for LongestWins {
        fn model_id(&self) -> String {
            "longest".to_string()
        }

        async fn score(&self, _query: &str, documents: &[&str]) -> Result<Vec<f32>, SearchError> {
            Ok(documents.iter().map(|document| document.len() as f32).collect())
        }
    }

    const PASSAGES: [&str; 4] = [
        "Paris is the capital of France.",
        "Berlin is the capital of Germany and its largest city.",
        "Madrid is the capital of Spain.",
        "Rome is the capital of Italy, founded according to legend in 753 BC.",
    ];

    #[tokio::test]
    async fn empty_index_returns_empty_response() {
        let coordinator =
            coordinator_with(Arc::new(TermOverlapScorer::default()), RetrievalOptions::default(), &[])
                .await;
        let response = coordinator.retrieve("capital of France", 5, 2).await.unwrap();
        assert_eq!(response.content, "");
        assert!(response.sources.is_empty());
    }

    #[tokio::test]
    async fn reranker_order_decides_the_final_set() {
        let coordinator =
            coordinator_with(Arc::new(LongestWins), RetrievalOptions::default(), &PASSAGES).await;

        let response = coordinator.retrieve("Paris", 4, 2).await.unwrap();
        assert_eq!(response.sources.len(), 2);
        assert_eq!(response.sources[0].page, 4);
        assert_eq!(response.sources[1].page, 2);
        assert_eq!(response.content, format!("{}\n\n{}", PASSAGES[3], PASSAGES[1]));
    }

    #[tokio::test]
    async fn sources_never_exceed_n() {
        let coordinator =
            coordinator_with(Arc::new(TermOverlapScorer::default()), RetrievalOptions::default(), &PASSAGES)
                .await;

        for k in 1..=6 {
            for n in 1..=k {
                let ranked = coordinator.retrieve_ranked("capital city", k, n).await.unwrap();
                assert!(ranked.len() <= n);
                assert!(ranked.len() <= k.min(PASSAGES.len()));
                assert!(ranked.windows(2).all(|pair| pair[0].score >= pair[1].score));
            }
        }
    }

    #[tokio::test]
    async fn k_larger_than_index_uses_everything() {
        let coordinator =
            coordinator_with(Arc::new(LongestWins), RetrievalOptions::default(), &PASSAGES).await;
        let ranked = coordinator.retrieve_ranked("capital", 50, 50).await.unwrap();
        assert_eq!(ranked.len(), PASSAGES.len());
    }

    #[tokio::test]
    async fn n_above_k_is_truncated_unless_strict() {
        let lenient =
            coordinator_with(Arc::new(LongestWins), RetrievalOptions::default(), &PASSAGES).await;
        let response = lenient.retrieve("capital", 2, 3).await.unwrap();
        assert_eq!(response.sources.len(), 2);

        let strict = coordinator_with(
            Arc::new(LongestWins),
            RetrievalOptions {
                strict_validation: true,
            },
            &PASSAGES,
        )
        .await;
        let result = strict.retrieve("capital", 2, 3).await;
        assert!(matches!(result, Err(SearchError::InvalidRequest(_))));
    }

    #[tokio::test]
    async fn structural_misuse_is_rejected() {
        let coordinator =
            coordinator_with(Arc::new(LongestWins), RetrievalOptions::default(), &PASSAGES).await;

        for (query, k, n) in [("capital", 0, 1), ("capital", 3, 0), ("   ", 3, 1)] {
            let result = coordinator.retrieve(query, k, n).await;
            assert!(
                matches!(result, Err(SearchError::InvalidRequest(_))),
                "query={query:?} k={k} n={n}"
            );
        }
    }
}
