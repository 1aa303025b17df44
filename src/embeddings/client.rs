//! Embedding model backends and their loaders

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde::Serialize;
use tracing::debug;
use tracing::info;

use super::EmbeddingConfig;
use crate::errors::Result;
use crate::errors::TriageError;

/// Supported embedding providers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmbeddingProvider {
    /// Ollama embeddings endpoint
    Ollama,
    /// Local hashed term-frequency encoder
    Hashing,
}

/// A loaded encoder turning preprocessed text into a vector
#[async_trait]
pub trait EmbeddingModel: Send + Sync {
    async fn encode(&self, text: &str) -> Result<Vec<f32>>;

    fn dimension(&self) -> usize;

    fn name(&self) -> &str;
}

/// Produces the encoder on first use
///
/// Loading may be slow (model download, remote handshake); the embedding
/// service calls it at most once per successful load.
#[async_trait]
pub trait ModelLoader: Send + Sync {
    async fn load(&self) -> Result<Arc<dyn EmbeddingModel>>;
}

/// Loader picking the backend named by configuration
pub struct ConfiguredModelLoader {
    config: EmbeddingConfig,
}

impl ConfiguredModelLoader {
    pub const fn new(config: EmbeddingConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl ModelLoader for ConfiguredModelLoader {
    async fn load(&self) -> Result<Arc<dyn EmbeddingModel>> {
        match self.config.provider {
            EmbeddingProvider::Ollama => {
                let model = OllamaEmbeddingModel::connect(&self.config).await?;
                Ok(Arc::new(model))
            }
            EmbeddingProvider::Hashing => {
                Ok(Arc::new(HashingEmbeddingModel::new(self.config.dimension)))
            }
        }
    }
}

/// Client for the Ollama embeddings API
pub struct OllamaEmbeddingModel {
    model: String,
    endpoint: String,
    dimension: usize,
    client: Client,
}

impl OllamaEmbeddingModel {
    /// Build the HTTP client and check that the service answers
    pub async fn connect(config: &EmbeddingConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.request_timeout)
            .pool_idle_timeout(std::time::Duration::from_secs(30))
            .build()
            .map_err(|e| TriageError::ModelUnavailable(e.to_string()))?;

        let url = format!("{}/api/tags", config.endpoint);
        debug!("Probing Ollama embeddings endpoint: {}", url);
        let response = client.get(&url).send().await.map_err(|e| {
            TriageError::ModelUnavailable(format!("embedding service unreachable: {e}"))
        })?;
        if !response.status().is_success() {
            return Err(TriageError::ModelUnavailable(format!(
                "embedding service answered {}",
                response.status()
            )));
        }

        info!(model = %config.model, endpoint = %config.endpoint, "Ollama embedding model ready");

        Ok(Self {
            model: config.model.clone(),
            endpoint: config.endpoint.clone(),
            dimension: config.dimension,
            client,
        })
    }
}

#[async_trait]
impl EmbeddingModel for OllamaEmbeddingModel {
    async fn encode(&self, text: &str) -> Result<Vec<f32>> {
        #[derive(Serialize)]
        struct OllamaRequest<'a> {
            model: &'a str,
            prompt: &'a str,
        }

        #[derive(Deserialize)]
        struct OllamaResponse {
            embedding: Vec<f32>,
        }

        let url = format!("{}/api/embeddings", self.endpoint);
        let request = OllamaRequest {
            model: &self.model,
            prompt: text,
        };

        let response = self
            .client
            .post(&url)
            .json(&request)
            .send()
            .await
            .map_err(|e| TriageError::ModelUnavailable(format!("embedding request failed: {e}")))?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(TriageError::EmbeddingError(format!(
                "Ollama API error ({status}): {error_text}"
            )));
        }

        let result: OllamaResponse = response
            .json()
            .await
            .map_err(|e| TriageError::EmbeddingError(format!("Failed to parse response: {e}")))?;

        Ok(result.embedding)
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn name(&self) -> &str {
        &self.model
    }
}

/// Hashed term-frequency encoder
///
/// Terms are hashed into fixed buckets with FNV-1a and weighted by frequency,
/// then the vector is L2-normalized. Deterministic and always available, but
/// only lexical: "dor torácica" and "dor no peito" share one term.
pub struct HashingEmbeddingModel {
    dimension: usize,
}

impl HashingEmbeddingModel {
    pub const fn new(dimension: usize) -> Self {
        Self { dimension }
    }

    fn hash_term(term: &str, dims: usize) -> usize {
        let mut h: u64 = 0xcbf29ce484222325;
        for b in term.as_bytes() {
            h ^= u64::from(*b);
            h = h.wrapping_mul(0x100000001b3);
        }
        (h % dims as u64) as usize
    }

    /// Lowercase alphanumeric terms of at least two characters
    fn tokenize(text: &str) -> Vec<String> {
        text.split(|c: char| !c.is_alphanumeric())
            .filter(|s| s.chars().count() >= 2)
            .map(str::to_lowercase)
            .collect()
    }

    fn vectorize(&self, text: &str) -> Vec<f32> {
        let mut vec = vec![0.0f32; self.dimension];
        let tokens = Self::tokenize(text);
        if tokens.is_empty() || self.dimension == 0 {
            return vec;
        }

        let mut tf: HashMap<&str, f32> = HashMap::new();
        for tok in &tokens {
            *tf.entry(tok.as_str()).or_default() += 1.0;
        }

        let total = tokens.len() as f32;
        for (term, count) in tf {
            // Longer terms carry more signal than short function words
            let idf = 1.0 + (term.chars().count() as f32).ln();
            vec[Self::hash_term(term, self.dimension)] += (count / total) * idf;
        }

        let norm: f32 = vec.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > f32::EPSILON {
            for v in &mut vec {
                *v /= norm;
            }
        }

        vec
    }
}

#[async_trait]
impl EmbeddingModel for HashingEmbeddingModel {
    async fn encode(&self, text: &str) -> Result<Vec<f32>> {
        Ok(self.vectorize(text))
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn name(&self) -> &str {
        "hashing-tf"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_hashing_dimensions() {
        let model = HashingEmbeddingModel::new(384);
        let v = model.encode("febre alta e tosse seca").await.unwrap();
        assert_eq!(v.len(), 384);
    }

    #[tokio::test]
    async fn test_hashing_is_normalized() {
        let model = HashingEmbeddingModel::new(256);
        let v = model.encode("dor torácica intensa, sudorese, náuseas").await.unwrap();
        let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-5, "expected unit norm, got {norm}");
    }

    #[tokio::test]
    async fn test_hashing_is_deterministic() {
        let model = HashingEmbeddingModel::new(128);
        let a = model.encode("cefaleia súbita").await.unwrap();
        let b = model.encode("cefaleia súbita").await.unwrap();
        assert_eq!(a, b);
    }

    #[tokio::test]
    async fn test_hashing_short_tokens_give_zero_vector() {
        let model = HashingEmbeddingModel::new(64);
        let v = model.encode("a e o").await.unwrap();
        assert!(v.iter().all(|&x| x == 0.0));
    }

    #[test]
    fn test_tokenize_keeps_accents() {
        let tokens = HashingEmbeddingModel::tokenize("Náuseas, VÔMITOS e dor");
        assert_eq!(tokens, vec!["náuseas", "vômitos", "dor"]);
    }

    #[tokio::test]
    async fn test_configured_loader_hashing() {
        let config = EmbeddingConfig {
            provider: EmbeddingProvider::Hashing,
            model: "unused".to_string(),
            endpoint: "http://localhost:11434".to_string(),
            dimension: 32,
            max_input_chars: 100,
            cache_dir: std::path::PathBuf::from("unused"),
            flush_every: 10,
            request_timeout: std::time::Duration::from_secs(1),
        };
        let model = ConfiguredModelLoader::new(config).load().await.unwrap();
        assert_eq!(model.dimension(), 32);
        assert_eq!(model.name(), "hashing-tf");
    }
}
