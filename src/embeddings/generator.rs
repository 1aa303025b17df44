//! Embedding service: lazy model, exact-match cache, similarity helpers

use std::path::Path;
use std::sync::Arc;

use futures::stream::StreamExt;
use futures::stream::{
    self,
};
use serde::Serialize;
use tokio::sync::OnceCell;
use tracing::debug;
use tracing::info;
use tracing::warn;

use super::cache::text_hash;
use super::cache::CacheStats;
use super::cache::EmbeddingCache;
use super::client::ConfiguredModelLoader;
use super::client::EmbeddingModel;
use super::client::ModelLoader;
use super::EmbeddingConfig;
use crate::errors::Result;
use crate::errors::TriageError;
use crate::index::cosine_similarity;
use crate::models::EmbeddingRecord;

/// Concurrent encodes issued by `embed_batch`
const BATCH_CONCURRENCY: usize = 4;

/// Corpus entry ranked against a query text
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TextSimilarity {
    pub index: usize,
    pub text: String,
    pub similarity: f32,
}

/// Service for generating embeddings with caching
///
/// Shared behind an `Arc` by every request. The model is loaded on the first
/// cache miss; concurrent first callers wait on the same load.
pub struct EmbeddingService {
    loader: Arc<dyn ModelLoader>,
    model: OnceCell<Arc<dyn EmbeddingModel>>,
    cache: EmbeddingCache,
    config: EmbeddingConfig,
}

impl EmbeddingService {
    /// Create a new embedding service from application config
    pub fn new(config: &crate::config::AppConfig) -> Result<Self> {
        let embedding_config = EmbeddingConfig::from_app_config(config)?;
        let loader = Arc::new(ConfiguredModelLoader::new(embedding_config.clone()));
        Self::with_loader(embedding_config, loader)
    }

    /// Create with a custom model loader
    pub fn with_loader(config: EmbeddingConfig, loader: Arc<dyn ModelLoader>) -> Result<Self> {
        let cache = EmbeddingCache::open(config.cache_file(), config.flush_every)?;
        Ok(Self {
            loader,
            model: OnceCell::new(),
            cache,
            config,
        })
    }

    /// Embed a single text
    ///
    /// Cache hits return without touching the model. On a miss the text is
    /// preprocessed, encoded once and cached under the hash of the original
    /// (untruncated) text.
    pub async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let hash = text_hash(text);
        if let Some(vector) = self.cache.get(&hash) {
            debug!("Embedding cache hit for: {}", preview(text));
            return Ok(vector);
        }

        let processed = super::preprocess_text_for_embedding(text, self.config.max_input_chars)?;
        let model = self.model().await?;

        debug!("Generating new embedding for: {}", preview(text));
        let vector = model.encode(&processed).await?;
        self.validate_vector(&vector)?;

        self.cache.insert(EmbeddingRecord {
            text_hash: hash,
            vector: vector.clone(),
        });
        Ok(vector)
    }

    /// Embed several texts, preserving input order
    pub async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let results: Vec<Result<Vec<f32>>> = stream::iter(texts.iter())
            .map(|text| self.embed(text))
            .buffered(BATCH_CONCURRENCY)
            .collect()
            .await;

        results.into_iter().collect()
    }

    /// Cosine similarity between two texts
    pub async fn compute_similarity(&self, first: &str, second: &str) -> Result<f32> {
        let a = self.embed(first).await?;
        let b = self.embed(second).await?;
        Ok(cosine_similarity(&a, &b))
    }

    /// Rank `corpus` by similarity to `query`, best first, at most `top_k`
    pub async fn find_similar_texts(
        &self,
        query: &str,
        corpus: &[String],
        top_k: usize,
    ) -> Result<Vec<TextSimilarity>> {
        let query_embedding = self.embed(query).await?;
        let corpus_embeddings = self.embed_batch(corpus).await?;

        let mut ranked: Vec<TextSimilarity> = corpus
            .iter()
            .zip(corpus_embeddings.iter())
            .enumerate()
            .map(|(index, (text, embedding))| TextSimilarity {
                index,
                text: text.clone(),
                similarity: cosine_similarity(&query_embedding, embedding),
            })
            .collect();

        // Stable: equal scores keep corpus order
        ranked.sort_by(|a, b| b.similarity.total_cmp(&a.similarity));
        ranked.truncate(top_k);
        Ok(ranked)
    }

    /// Empty the cache and persist the empty state
    pub async fn clear_cache(&self) -> Result<()> {
        self.cache.clear().await
    }

    /// Persist the cache now
    pub async fn flush(&self) -> Result<()> {
        self.cache.flush().await
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.cache.stats()
    }

    pub fn cache_len(&self) -> usize {
        self.cache.len()
    }

    /// File the cache is persisted to
    pub fn cache_path(&self) -> &Path {
        self.cache.path()
    }

    pub fn is_model_loaded(&self) -> bool {
        self.model.initialized()
    }

    /// Get the embedding dimension
    #[must_use]
    pub const fn dimension(&self) -> usize {
        self.config.dimension
    }

    /// Get the model name
    #[must_use]
    pub fn model_name(&self) -> &str {
        &self.config.model
    }

    /// Loaded model, loading it on first use
    async fn model(&self) -> Result<Arc<dyn EmbeddingModel>> {
        let model = self
            .model
            .get_or_try_init(|| async {
                info!("Loading embedding model {}...", self.config.model);
                match self.loader.load().await {
                    Ok(model) => {
                        info!("Embedding model loaded: {}", model.name());
                        Ok(model)
                    }
                    Err(e) => {
                        warn!("Failed to load embedding model: {}", e);
                        Err(match e {
                            TriageError::ModelUnavailable(msg) => TriageError::ModelUnavailable(msg),
                            other => TriageError::ModelUnavailable(other.to_string()),
                        })
                    }
                }
            })
            .await?;
        Ok(Arc::clone(model))
    }

    fn validate_vector(&self, vector: &[f32]) -> Result<()> {
        if vector.len() != self.config.dimension {
            return Err(TriageError::EmbeddingError(format!(
                "expected {} dimensions, model returned {}",
                self.config.dimension,
                vector.len()
            )));
        }
        if vector.iter().any(|v| !v.is_finite()) {
            return Err(TriageError::EmbeddingError(
                "model returned non-finite values".to_string(),
            ));
        }
        Ok(())
    }
}

fn preview(text: &str) -> String {
    let head: String = text.chars().take(30).collect();
    format!("{head}...")
}
