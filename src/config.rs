use std::path::Path;
use std::path::PathBuf;

use serde::Deserialize;
use serde::Serialize;

use crate::errors::TriageError;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default)]
    pub backtrace: bool,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            backtrace: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingsConfig {
    /// `ollama` or `hashing`
    #[serde(default = "default_embedding_provider")]
    pub provider: String,
    #[serde(default = "default_embedding_model")]
    pub model: String,
    #[serde(default = "default_endpoint")]
    pub endpoint: String,
    #[serde(default = "default_dimension")]
    pub dimension: usize,
    /// Inputs longer than this are truncated before encoding
    #[serde(default = "default_max_input_chars")]
    pub max_input_chars: usize,
    #[serde(default = "default_cache_dir")]
    pub cache_dir: PathBuf,
    /// Number of new cache entries between two flushes to disk
    #[serde(default = "default_flush_every")]
    pub flush_every: usize,
    #[serde(default = "default_embedding_timeout")]
    pub request_timeout_secs: u64,
}

fn default_embedding_provider() -> String {
    "ollama".to_string()
}

fn default_embedding_model() -> String {
    "nomic-embed-text".to_string()
}

fn default_endpoint() -> String {
    "http://localhost:11434".to_string()
}

pub(crate) const fn default_dimension() -> usize {
    768
}

pub(crate) const fn default_max_input_chars() -> usize {
    2048
}

fn default_cache_dir() -> PathBuf {
    PathBuf::from("./embedding_cache")
}

pub(crate) const fn default_flush_every() -> usize {
    10
}

const fn default_embedding_timeout() -> u64 {
    30
}

impl Default for EmbeddingsConfig {
    fn default() -> Self {
        Self {
            provider: default_embedding_provider(),
            model: default_embedding_model(),
            endpoint: default_endpoint(),
            dimension: default_dimension(),
            max_input_chars: default_max_input_chars(),
            cache_dir: default_cache_dir(),
            flush_every: default_flush_every(),
            request_timeout_secs: default_embedding_timeout(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievalConfig {
    #[serde(default = "default_top_k")]
    pub top_k: usize,
    #[serde(default = "default_max_context_chars")]
    pub max_context_chars: usize,
}

pub(crate) const fn default_top_k() -> usize {
    3
}

const fn default_max_context_chars() -> usize {
    4000
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            top_k: default_top_k(),
            max_context_chars: default_max_context_chars(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    /// `ollama` or `mock`
    #[serde(default = "default_llm_provider")]
    pub provider: String,
    #[serde(default = "default_endpoint")]
    pub endpoint: String,
    #[serde(default = "default_llm_model")]
    pub model: String,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Backoff before retry `n` is `backoff_base_ms * 2^n`
    #[serde(default = "default_backoff_base_ms")]
    pub backoff_base_ms: u64,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default = "default_top_p")]
    pub top_p: f32,
    #[serde(default)]
    pub stream: bool,
}

fn default_llm_provider() -> String {
    "ollama".to_string()
}

fn default_llm_model() -> String {
    "mistral".to_string()
}

pub(crate) const fn default_max_retries() -> u32 {
    3
}

pub(crate) const fn default_timeout_secs() -> u64 {
    60
}

pub(crate) const fn default_backoff_base_ms() -> u64 {
    1000
}

pub(crate) const fn default_temperature() -> f32 {
    0.2
}

pub(crate) const fn default_top_p() -> f32 {
    0.9
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: default_llm_provider(),
            endpoint: default_endpoint(),
            model: default_llm_model(),
            max_retries: default_max_retries(),
            timeout_secs: default_timeout_secs(),
            backoff_base_ms: default_backoff_base_ms(),
            temperature: default_temperature(),
            top_p: default_top_p(),
            stream: false,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub embeddings: EmbeddingsConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub llm: LlmConfig,
}

impl AppConfig {
    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> crate::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    /// Parse and validate configuration from TOML text
    pub fn from_toml_str(content: &str) -> crate::Result<Self> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from default config file path
    pub fn load() -> crate::Result<Self> {
        // Try to load from config.toml first, then fall back to config.example.toml
        if Path::new("config.toml").exists() {
            Self::from_file("config.toml")
        } else if Path::new("config.example.toml").exists() {
            tracing::warn!(
                "Using config.example.toml. Please create config.toml for production use."
            );
            Self::from_file("config.example.toml")
        } else {
            Err(TriageError::Io(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                "No config file found. Please create config.toml or config.example.toml",
            )))
        }
    }

    /// Reject values the pipeline cannot run with
    pub fn validate(&self) -> crate::Result<()> {
        for (name, endpoint) in [
            ("embeddings.endpoint", &self.embeddings.endpoint),
            ("llm.endpoint", &self.llm.endpoint),
        ] {
            url::Url::parse(endpoint).map_err(|e| {
                TriageError::ConfigError(format!("{name} is not a valid URL ({endpoint}): {e}"))
            })?;
        }

        if self.embeddings.dimension == 0 {
            return Err(TriageError::ConfigError(
                "embeddings.dimension must be greater than zero".to_string(),
            ));
        }
        if self.embeddings.max_input_chars == 0 {
            return Err(TriageError::ConfigError(
                "embeddings.max_input_chars must be greater than zero".to_string(),
            ));
        }
        if !matches!(self.embeddings.provider.as_str(), "ollama" | "hashing") {
            return Err(TriageError::ConfigError(format!(
                "unknown embeddings.provider '{}' (expected 'ollama' or 'hashing')",
                self.embeddings.provider
            )));
        }
        if !matches!(self.llm.provider.as_str(), "ollama" | "mock") {
            return Err(TriageError::ConfigError(format!(
                "unknown llm.provider '{}' (expected 'ollama' or 'mock')",
                self.llm.provider
            )));
        }
        if self.llm.max_retries == 0 {
            return Err(TriageError::ConfigError(
                "llm.max_retries must be at least 1".to_string(),
            ));
        }
        if !(0.0..=2.0).contains(&self.llm.temperature) {
            return Err(TriageError::ConfigError(format!(
                "llm.temperature {} is outside [0, 2]",
                self.llm.temperature
            )));
        }
        if self.llm.top_p <= 0.0 || self.llm.top_p > 1.0 {
            return Err(TriageError::ConfigError(format!(
                "llm.top_p {} is outside (0, 1]",
                self.llm.top_p
            )));
        }

        Ok(())
    }

    /// Get embedding dimension
    pub fn embedding_dimension(&self) -> usize {
        self.embeddings.dimension
    }

    /// Get embedding model name
    pub fn embedding_model(&self) -> &str {
        &self.embeddings.model
    }

    /// Get the directory holding the embedding cache file
    pub fn embedding_cache_dir(&self) -> &Path {
        &self.embeddings.cache_dir
    }

    /// Get number of similar cases retrieved per triage
    pub fn retrieval_top_k(&self) -> usize {
        self.retrieval.top_k
    }

    /// Get LLM endpoint
    pub fn llm_endpoint(&self) -> &str {
        &self.llm.endpoint
    }

    /// Get LLM model
    pub fn llm_model(&self) -> &str {
        &self.llm.model
    }
}
