use thiserror::Error;

#[derive(Error, Debug)]
pub enum TriageError {
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Model unavailable: {0}")]
    ModelUnavailable(String),

    #[error("Embedding error: {0}")]
    EmbeddingError(String),

    #[error("Vector index unavailable: {0}")]
    IndexUnavailable(String),

    #[error("Generation failed after {attempts} attempt(s): {message}")]
    GenerationFailure { attempts: u32, message: String },

    #[error("Persistence error: {0}")]
    Persistence(String),

    #[error("HTTP error: {0}")]
    HttpError(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("TOML parsing error: {0}")]
    TomlParsing(#[from] toml::de::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl TriageError {
    /// Errors caused by the caller's request rather than by a dependency
    pub const fn is_client_error(&self) -> bool {
        matches!(self, Self::InvalidInput(_))
    }

    /// Errors an outer surface should report as "service unavailable"
    pub const fn is_service_unavailable(&self) -> bool {
        matches!(
            self,
            Self::ModelUnavailable(_) | Self::IndexUnavailable(_) | Self::HttpError(_)
        )
    }
}

impl From<reqwest::Error> for TriageError {
    fn from(err: reqwest::Error) -> Self {
        Self::HttpError(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, TriageError>;
