//! Generation layer: prompt construction, the generation client and the
//! response parser
//!
//! Backends:
//! - Ollama (`/api/generate`, optionally streamed as NDJSON)
//! - Keyword mock (offline, deterministic)

pub mod client;
pub mod mock;
pub mod parser;
pub mod prompts;
pub mod streaming;

pub use client::CompletionRequest;
pub use client::Generation;
pub use client::GenerationBackend;
pub use client::GenerationClient;
pub use client::GenerationSettings;
pub use client::OllamaBackend;
pub use mock::KeywordMockBackend;
pub use parser::ResponseParser;
pub use prompts::build_triage_prompt;
pub use prompts::fallback_response;
pub use prompts::PROTOCOL_VERSION;
pub use streaming::StreamingResponse;
