pub mod config;
pub mod embeddings;
pub mod errors;
pub mod index;
pub mod llm;
pub mod logging;
pub mod models;
pub mod rag;
pub mod store;

pub use config::AppConfig;
pub use errors::*;
pub use models::Classification;
pub use models::TriageOutcome;
pub use models::UrgencyLevel;
pub use rag::TriageService;

#[cfg(test)]
mod config_tests;
