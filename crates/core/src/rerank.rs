//! Second-stage relevance scoring.
//!
//! A [`CrossEncoder`] looks at the query and a candidate passage together and returns a
//! relevance score, higher meaning more relevant. [`Reranker`] turns those scores into a total
//! order over the nearest-neighbour candidates.

use crate::embeddings::HttpModelConfig;
use crate::error::SearchError;
use crate::models::{Candidate, RankedResult};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, info};
use url::Url;

#[async_trait]
pub trait CrossEncoder: Send + Sync {
    fn model_id(&self) -> String;

    /// One score per document, in document order.
    async fn score(&self, query: &str, documents: &[&str]) -> Result<Vec<f32>, SearchError>;
}

const STOPWORDS: [&str; 32] = [
    "a", "an", "and", "are", "as", "at", "be", "by", "can", "do", "does", "for", "from", "how",
    "in", "is", "it", "of", "on", "or", "the", "that", "this", "to", "was", "what", "when",
    "where", "which", "who", "why", "with",
];

fn tokenize(text: &str) -> Vec<String> {
    text.split(|ch: char| !ch.is_alphanumeric())
        .filter(|token| !token.is_empty())
        .map(|token| token.to_lowercase())
        .collect()
}

/// Local pairwise scorer: saturated coverage of the query's content terms in the passage plus
/// a bonus for query term pairs that appear adjacently in the passage.
#[derive(Debug, Clone, Copy)]
pub struct TermOverlapScorer {
    pub saturation: f32,
    pub phrase_weight: f32,
}

impl Default for TermOverlapScorer {
    fn default() -> Self {
        Self {
            saturation: 1.2,
            phrase_weight: 0.5,
        }
    }
}

impl TermOverlapScorer {
    fn query_terms(query: &str) -> Vec<String> {
        let mut seen = HashSet::new();
        let mut terms: Vec<String> = tokenize(query)
            .into_iter()
            .filter(|token| !STOPWORDS.contains(&token.as_str()))
            .filter(|token| seen.insert(token.clone()))
            .collect();
        if terms.is_empty() {
            terms = tokenize(query);
        }
        terms
    }

    pub fn score_pair(&self, query: &str, document: &str) -> f32 {
        let terms = Self::query_terms(query);
        if terms.is_empty() {
            return 0.0;
        }
        let tokens = tokenize(document);

        let coverage = terms
            .iter()
            .map(|term| {
                let frequency = tokens.iter().filter(|token| *token == term).count() as f32;
                frequency / (frequency + self.saturation)
            })
            .sum::<f32>()
            / terms.len() as f32;

        let phrase = if terms.len() < 2 {
            0.0
        } else {
            let adjacent: HashSet<(&str, &str)> = tokens
                .windows(2)
                .map(|pair| (pair[0].as_str(), pair[1].as_str()))
                .collect();
            let hits = terms
                .windows(2)
                .filter(|pair| adjacent.contains(&(pair[0].as_str(), pair[1].as_str())))
                .count();
            hits as f32 / (terms.len() - 1) as f32
        };

        coverage + self.phrase_weight * phrase
    }
}

#[async_trait]
impl CrossEncoder for TermOverlapScorer {
    fn model_id(&self) -> String {
        "term-overlap".to_string()
    }

    async fn score(&self, query: &str, documents: &[&str]) -> Result<Vec<f32>, SearchError> {
        Ok(documents
            .iter()
            .map(|document| self.score_pair(query, document))
            .collect())
    }
}

#[derive(Debug, Serialize)]
struct RerankRequest<'a> {
    query: &'a str,
    texts: &'a [&'a str],
    raw_scores: bool,
}

#[derive(Debug, Deserialize)]
struct RerankEntry {
    index: usize,
    score: f32,
}

/// Client for a cross-encoder served behind a text-embeddings-inference style `/rerank` route.
pub struct HttpCrossEncoder {
    client: Client,
    endpoint: Url,
    model: String,
    api_key: Option<String>,
}

impl HttpCrossEncoder {
    pub async fn connect(config: HttpModelConfig) -> Result<Self, SearchError> {
        let encoder = Self {
            client: config.client()?,
            endpoint: config.endpoint("rerank")?,
            model: config.model.clone(),
            api_key: config.api_key.clone(),
        };

        encoder
            .score("probe", &["probe passage"])
            .await
            .map_err(|error| SearchError::ModelUnavailable {
                model: config.model.clone(),
                reason: error.to_string(),
            })?;

        info!(model = %encoder.model, endpoint = %encoder.endpoint, "cross-encoder ready");
        Ok(encoder)
    }
}

fn scores_by_position(
    entries: Vec<RerankEntry>,
    expected: usize,
    model: &str,
) -> Result<Vec<f32>, SearchError> {
    let mut scores = vec![None; expected];
    for entry in entries {
        match scores.get_mut(entry.index) {
            Some(slot) => *slot = Some(entry.score),
            None => {
                return Err(SearchError::BackendResponse {
                    backend: model.to_string(),
                    details: format!("score index {} out of range {expected}", entry.index),
                })
            }
        }
    }

    scores
        .into_iter()
        .enumerate()
        .map(|(position, score)| {
            score.ok_or_else(|| SearchError::BackendResponse {
                backend: model.to_string(),
                details: format!("no score for passage {position}"),
            })
        })
        .collect()
}

#[async_trait]
impl CrossEncoder for HttpCrossEncoder {
    fn model_id(&self) -> String {
        self.model.clone()
    }

    async fn score(&self, query: &str, documents: &[&str]) -> Result<Vec<f32>, SearchError> {
        let mut request = self.client.post(self.endpoint.clone()).json(&RerankRequest {
            query,
            texts: documents,
            raw_scores: false,
        });
        if let Some(api_key) = &self.api_key {
            request = request.bearer_auth(api_key);
        }

        let response = request.send().await?;
        if !response.status().is_success() {
            return Err(SearchError::BackendResponse {
                backend: self.model.clone(),
                details: format!("rerank request returned {}", response.status()),
            });
        }

        let entries: Vec<RerankEntry> = response.json().await?;
        scores_by_position(entries, documents.len(), &self.model)
    }
}

/// Orders candidates by cross-encoder score, most relevant first.
///
/// Equal scores keep their incoming (nearest-first) order. NaN scores sort last.
#[derive(Clone)]
pub struct Reranker {
    model: Arc<dyn CrossEncoder>,
}

impl Reranker {
    pub fn new(model: Arc<dyn CrossEncoder>) -> Self {
        Self { model }
    }

    pub fn model_id(&self) -> String {
        self.model.model_id()
    }

    pub async fn rerank(
        &self,
        query: &str,
        candidates: Vec<Candidate>,
    ) -> Result<Vec<RankedResult>, SearchError> {
        if candidates.is_empty() {
            return Ok(Vec::new());
        }

        let documents: Vec<&str> = candidates.iter().map(|candidate| candidate.text.as_str()).collect();
        let scores = self.model.score(query, &documents).await?;
        if scores.len() != candidates.len() {
            return Err(SearchError::BackendResponse {
                backend: self.model.model_id(),
                details: format!(
                    "{} scores returned for {} candidates",
                    scores.len(),
                    candidates.len()
                ),
            });
        }

        let mut ranked: Vec<RankedResult> = candidates
            .into_iter()
            .zip(scores)
            .map(|(candidate, score)| RankedResult {
                id: candidate.id,
                text: candidate.text,
                metadata: candidate.metadata,
                score: if score.is_nan() { f32::NEG_INFINITY } else { score },
                distance: candidate.distance,
            })
            .collect();

        // `sort_by` is stable, which is what keeps ties in distance order.
        ranked.sort_by(|left, right| right.score.total_cmp(&left.score));

        debug!(
            model = %self.model.model_id(),
            candidates = ranked.len(),
            top_score = ranked.first().map(|result| result.score),
            "reranked candidates"
        );
        Ok(ranked)
    }
}
