use crate::error::SearchError;
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, info};
use url::Url;

const DEFAULT: usize = 128;

pub const DEFAULT_EMBEDDING_DIMENSIONS: usize = DEFAULT;

/// Text embedding model shared by ingestion and querying.
///
/// The same instance must be used on both paths: vectors from different models are not
/// comparable, so the index records `model_id` and refuses a different one.
#[async_trait]
pub trait Embedder: Send + Sync {
    fn model_id(&self) -> String;

    fn dimensions(&self) -> usize;

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, SearchError>;

    async fn embed(&self, text: &str) -> Result<Vec<f32>, SearchError> {
        let mut vectors = self.embed_batch(&[text.to_string()]).await?;
        vectors.pop().ok_or_else(|| SearchError::BackendResponse {
            backend: self.model_id(),
            details: "no vector returned for query".to_string(),
        })
    }
}

/// Deterministic hashed character-trigram embedder. Needs no model files, which makes it the
/// offline default and the test double for the HTTP embedder.
#[derive(Debug, Clone, Copy)]
pub struct CharacterNgramEmbedder {
    pub dimensions: usize,
}

impl Default for CharacterNgramEmbedder {
    fn default() -> Self {
        Self {
            dimensions: DEFAULT_EMBEDDING_DIMENSIONS,
        }
    }
}

impl CharacterNgramEmbedder {
    pub fn embed_text(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0f32; self.dimensions.max(1)];
        let lowered = text.to_lowercase();
        let chars: Vec<char> = lowered.chars().collect();

        if chars.is_empty() {
            return vector;
        }

        for window in chars.windows(3) {
            let token = window.iter().collect::<String>();
            let mut hash = 1469598103934665603u64;
            for byte in token.bytes() {
                hash ^= byte as u64;
                hash = hash.wrapping_mul(1099511628211);
            }
            let bucket = (hash % vector.len() as u64) as usize;
            vector[bucket] += 1.0;
        }

        let magnitude = vector.iter().map(|value| value * value).sum::<f32>().sqrt();
        if magnitude > 0.0 {
            for value in &mut vector {
                *value /= magnitude;
            }
        }

        vector
    }
}

#[async_trait]
impl Embedder for CharacterNgramEmbedder {
    fn model_id(&self) -> String {
        format!("char-trigram-{}", self.dimensions.max(1))
    }

    fn dimensions(&self) -> usize {
        self.dimensions.max(1)
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, SearchError> {
        Ok(texts.iter().map(|text| self.embed_text(text)).collect())
    }
}

/// Connection settings for a model served over HTTP.
#[derive(Debug, Clone)]
pub struct HttpModelConfig {
    pub base_url: String,
    pub model: String,
    pub api_key: Option<String>,
    pub timeout: Duration,
}

impl HttpModelConfig {
    pub(crate) fn endpoint(&self, route: &str) -> Result<Url, SearchError> {
        let endpoint = format!("{}/{}", self.base_url.trim_end_matches('/'), route);
        Ok(Url::parse(&endpoint)?)
    }

    pub(crate) fn client(&self) -> Result<Client, SearchError> {
        Ok(Client::builder().timeout(self.timeout).build()?)
    }
}

#[derive(Debug, Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a [String],
}

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingEntry>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingEntry {
    index: usize,
    embedding: Vec<f32>,
}

/// Client for an OpenAI-compatible `/embeddings` endpoint.
pub struct HttpEmbedder {
    client: Client,
    endpoint: Url,
    model: String,
    api_key: Option<String>,
    dimensions: usize,
    batch_size: usize,
}

impl HttpEmbedder {
    const BATCH_SIZE: usize = 64;

    /// Probes the model once so a missing or misconfigured model fails at startup with
    /// `ModelUnavailable` instead of on the first upload. The probe also fixes the dimension.
    pub async fn connect(config: HttpModelConfig) -> Result<Self, SearchError> {
        let unavailable = |reason: String| SearchError::ModelUnavailable {
            model: config.model.clone(),
            reason,
        };

        let endpoint = config.endpoint("embeddings")?;
        let client = config.client()?;
        let mut embedder = Self {
            client,
            endpoint,
            model: config.model.clone(),
            api_key: config.api_key.clone(),
            dimensions: 0,
            batch_size: Self::BATCH_SIZE,
        };

        let probe = embedder
            .request(&["dimension probe".to_string()])
            .await
            .map_err(|error| unavailable(error.to_string()))?;
        let dimensions = probe.first().map(Vec::len).unwrap_or_default();
        if dimensions == 0 {
            return Err(unavailable("probe returned an empty embedding".to_string()));
        }

        embedder.dimensions = dimensions;
        info!(model = %embedder.model, endpoint = %embedder.endpoint, dimensions, "embedding model ready");
        Ok(embedder)
    }

    async fn request(&self, inputs: &[String]) -> Result<Vec<Vec<f32>>, SearchError> {
        let mut request = self.client.post(self.endpoint.clone()).json(&EmbeddingRequest {
            model: &self.model,
            input: inputs,
        });
        if let Some(api_key) = &self.api_key {
            request = request.bearer_auth(api_key);
        }

        let response = request.send().await?;
        if !response.status().is_success() {
            return Err(SearchError::BackendResponse {
                backend: self.model.clone(),
                details: format!("embedding request returned {}", response.status()),
            });
        }

        let payload: EmbeddingResponse = response.json().await?;
        order_embeddings(payload, inputs.len(), &self.model)
    }
}

fn order_embeddings(
    mut payload: EmbeddingResponse,
    expected: usize,
    model: &str,
) -> Result<Vec<Vec<f32>>, SearchError> {
    payload.data.sort_by_key(|entry| entry.index);
    let in_order = payload
        .data
        .iter()
        .enumerate()
        .all(|(position, entry)| entry.index == position);

    if payload.data.len() != expected || !in_order {
        return Err(SearchError::BackendResponse {
            backend: model.to_string(),
            details: format!(
                "expected {expected} embeddings indexed 0..{expected}, got {}",
                payload.data.len()
            ),
        });
    }

    Ok(payload.data.into_iter().map(|entry| entry.embedding).collect())
}

#[async_trait]
impl Embedder for HttpEmbedder {
    fn model_id(&self) -> String {
        self.model.clone()
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, SearchError> {
        let mut vectors = Vec::with_capacity(texts.len());
        for batch in texts.chunks(self.batch_size) {
            let embedded = self.request(batch).await?;
            if let Some(wrong) = embedded.iter().find(|vector| vector.len() != self.dimensions) {
                return Err(SearchError::DimensionMismatch {
                    expected: self.dimensions,
                    actual: wrong.len(),
                });
            }
            vectors.extend(embedded);
        }
        debug!(model = %self.model, count = vectors.len(), "embedded texts");
        Ok(vectors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn embedder_is_deterministic() {
        let embedder = CharacterNgramEmbedder::default();
        let first = embedder.embed("Hydraulic pressure and flow").await.unwrap();
        let second = embedder.embed("Hydraulic pressure and flow").await.unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn embedder_outputs_expected_length() {
        let embedder = CharacterNgramEmbedder { dimensions: 32 };
        let vector = embedder.embed_text("abc");
        assert_eq!(vector.len(), 32);
        assert_eq!(embedder.model_id(), "char-trigram-32");
    }

    #[test]
    fn embeddings_are_unit_length() {
        let vector = CharacterNgramEmbedder::default().embed_text("The capital of France is Paris.");
        let magnitude = vector.iter().map(|value| value * value).sum::<f32>().sqrt();
        assert!((magnitude - 1.0).abs() < 1e-5);
    }

    #[tokio::test]
    async fn batch_embedding_preserves_order() {
        let embedder = CharacterNgramEmbedder::default();
        let texts = vec!["alpha".to_string(), "beta".to_string()];
        let vectors = embedder.embed_batch(&texts).await.unwrap();
        assert_eq!(vectors[0], embedder.embed_text("alpha"));
        assert_eq!(vectors[1], embedder.embed_text("beta"));
    }

    #[test]
    fn out_of_order_response_is_reordered() {
        let payload: EmbeddingResponse = serde_json::from_str(
            r#"{"data":[{"index":1,"embedding":[0.0,1.0]},{"index":0,"embedding":[1.0,0.0]}]}"#,
        )
        .unwrap();
        let vectors = order_embeddings(payload, 2, "test-model").unwrap();
        assert_eq!(vectors, vec![vec![1.0, 0.0], vec![0.0, 1.0]]);
    }

    #[test]
    fn short_response_is_rejected() {
        let payload: EmbeddingResponse =
            serde_json::from_str(r#"{"data":[{"index":0,"embedding":[1.0]}]}"#).unwrap();
        let result = order_embeddings(payload, 2, "test-model");
        assert!(matches!(result, Err(SearchError::BackendResponse { .. })));
    }

    #[test]
    fn endpoint_joins_route_once() {
        let config = HttpModelConfig {
            base_url: "http://localhost:8080/v1/".to_string(),
            model: "all-MiniLM-L6-v2".to_string(),
            api_key: None,
            timeout: Duration::from_secs(5),
        };
        assert_eq!(
            config.endpoint("embeddings").unwrap().as_str(),
            "http://localhost:8080/v1/embeddings"
        );
    }

    #[tokio::test]
    async fn unreachable_model_is_unavailable() {
        let config = HttpModelConfig {
            base_url: "http://127.0.0.1:9".to_string(),
            model: "missing-model".to_string(),
            api_key: None,
            timeout: Duration::from_millis(500),
        };
        let result = HttpEmbedder::connect(config).await;
        assert!(matches!(result, Err(SearchError::ModelUnavailable { .. })));
    }
}
