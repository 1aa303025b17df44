//! RAG (Retrieval-Augmented Generation) triage module
//!
//! This module provides the end-to-end triage pipeline:
//! - Embedding of the symptoms description
//! - Retrieval of similar validated cases
//! - Context assembly and prompt construction
//! - LLM generation and structured parsing
//! - Hand-off to the store for human validation
//!
//! # Examples
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use triagerag::config::AppConfig;
//! use triagerag::rag::TriageService;
//! use triagerag::store::InMemoryTriageStore;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = AppConfig::load()?;
//!     let service = TriageService::new(&config, Arc::new(InMemoryTriageStore::new()))?;
//!     service.sync_index().await?;
//!
//!     let outcome = service.triage("dor torácica intensa, sudorese, náuseas").await?;
//!     println!("Classification: {}", outcome.classification);
//!     println!("Similar cases: {}", outcome.similar_cases.len());
//!
//!     Ok(())
//! }
//! ```

pub mod context;
pub mod pipeline;
pub mod retriever;

pub use context::ContextAssembler;
pub use pipeline::TriageService;
pub use retriever::Retriever;
pub use retriever::SyncReport;
