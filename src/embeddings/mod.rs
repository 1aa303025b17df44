//! Embeddings generation module
//!
//! This module turns symptom descriptions into fixed-size vectors:
//! - Ollama (`/api/embeddings`, local or remote models)
//! - Hashed term-frequency encoder (deterministic, no network)
//!
//! Vectors are cached by the SHA-256 of the exact input text and persisted to
//! a JSON document on disk in batches.
//!
//! # Examples
//!
//! ```rust,no_run
//! use triagerag::embeddings::EmbeddingService;
//! use triagerag::config::AppConfig;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = AppConfig::load()?;
//!     let service = EmbeddingService::new(&config)?;
//!
//!     let embedding = service.embed("dor torácica intensa, sudorese").await?;
//!     println!("Generated embedding with {} dimensions", embedding.len());
//!
//!     Ok(())
//! }
//! ```

pub mod cache;
pub mod client;
pub mod generator;
pub mod text_preprocessing;

use std::path::PathBuf;
use std::time::Duration;

pub use cache::CacheStats;
pub use cache::EmbeddingCache;
pub use client::ConfiguredModelLoader;
pub use client::EmbeddingModel;
pub use client::EmbeddingProvider;
pub use client::HashingEmbeddingModel;
pub use client::ModelLoader;
pub use client::OllamaEmbeddingModel;
pub use generator::EmbeddingService;
pub use generator::TextSimilarity;
pub use text_preprocessing::preprocess_text_for_embedding;

use crate::errors::Result;
use crate::errors::TriageError;

/// Name of the cache document inside the cache directory
pub const CACHE_FILE_NAME: &str = "embedding_cache.json";

/// Configuration for embedding generation
#[derive(Debug, Clone)]
pub struct EmbeddingConfig {
    pub provider: EmbeddingProvider,
    pub model: String,
    pub endpoint: String,
    pub dimension: usize,
    pub max_input_chars: usize,
    pub cache_dir: PathBuf,
    pub flush_every: usize,
    pub request_timeout: Duration,
}

impl EmbeddingConfig {
    pub fn from_app_config(config: &crate::config::AppConfig) -> Result<Self> {
        let provider = match config.embeddings.provider.as_str() {
            "ollama" => EmbeddingProvider::Ollama,
            "hashing" => EmbeddingProvider::Hashing,
            other => {
                return Err(TriageError::ConfigError(format!(
                    "unknown embeddings provider: {other}"
                )))
            }
        };

        Ok(Self {
            provider,
            model: config.embedding_model().to_string(),
            endpoint: config.embeddings.endpoint.trim_end_matches('/').to_string(),
            dimension: config.embedding_dimension(),
            max_input_chars: config.embeddings.max_input_chars,
            cache_dir: config.embedding_cache_dir().to_path_buf(),
            flush_every: config.embeddings.flush_every.max(1),
            request_timeout: Duration::from_secs(config.embeddings.request_timeout_secs),
        })
    }

    /// Full path of the persisted cache document
    pub fn cache_file(&self) -> PathBuf {
        self.cache_dir.join(CACHE_FILE_NAME)
    }
}
