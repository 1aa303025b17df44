//! Generation client with retry, backoff and a deterministic fallback

use std::sync::Arc;
use std::time::Duration;
use std::time::Instant;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde::Serialize;
use tracing::error;
use tracing::info;
use tracing::warn;

use super::mock::KeywordMockBackend;
use super::prompts::fallback_response;
use super::streaming::StreamingResponse;
use crate::config::AppConfig;
use crate::config::LlmConfig;
use crate::errors::Result;
use crate::errors::TriageError;

/// Timeout for the `/api/tags` availability check
const AVAILABILITY_TIMEOUT: Duration = Duration::from_secs(5);

/// One call to a generation backend
#[derive(Debug, Clone, PartialEq)]
pub struct CompletionRequest {
    pub prompt: String,
    pub temperature: f32,
    pub top_p: f32,
    pub stream: bool,
}

/// A text-generation service
#[async_trait]
pub trait GenerationBackend: Send + Sync {
    /// Run one generation; any error counts as a failed attempt
    async fn complete(&self, request: &CompletionRequest) -> Result<String>;

    async fn is_available(&self) -> bool;

    fn name(&self) -> &str;
}

/// Ollama `/api/generate` backend
pub struct OllamaBackend {
    endpoint: String,
    model: String,
    client: Client,
}

impl OllamaBackend {
    /// Create a backend; per-attempt timeouts are applied by [`GenerationClient`]
    pub fn new(endpoint: &str, model: &str) -> Result<Self> {
        let client = Client::builder()
            .pool_idle_timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| TriageError::HttpError(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            endpoint: endpoint.trim_end_matches('/').to_string(),
            model: model.to_string(),
            client,
        })
    }
}

#[async_trait]
impl GenerationBackend for OllamaBackend {
    async fn complete(&self, request: &CompletionRequest) -> Result<String> {
        #[derive(Serialize)]
        struct Options {
            temperature: f32,
            top_p: f32,
        }

        #[derive(Serialize)]
        struct OllamaRequest<'a> {
            model: &'a str,
            prompt: &'a str,
            stream: bool,
            options: Options,
        }

        #[derive(Deserialize)]
        struct OllamaResponse {
            #[serde(default)]
            response: String,
        }

        let url = format!("{}/api/generate", self.endpoint);
        let body = OllamaRequest {
            model: &self.model,
            prompt: &request.prompt,
            stream: request.stream,
            options: Options {
                temperature: request.temperature,
                top_p: request.top_p,
            },
        };

        let response = self.client.post(&url).json(&body).send().await?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(TriageError::HttpError(format!(
                "Ollama API error ({status}): {error_text}"
            )));
        }

        if request.stream {
            return StreamingResponse::from_ndjson(response).collect_all().await;
        }

        let result: OllamaResponse = response
            .json()
            .await
            .map_err(|e| TriageError::HttpError(format!("Failed to parse response: {e}")))?;
        Ok(result.response)
    }

    async fn is_available(&self) -> bool {
        let url = format!("{}/api/tags", self.endpoint);
        match self
            .client
            .get(&url)
            .timeout(AVAILABILITY_TIMEOUT)
            .send()
            .await
        {
            Ok(response) => response.status().is_success(),
            Err(e) => {
                warn!("Generation service unreachable at {}: {}", url, e);
                false
            }
        }
    }

    fn name(&self) -> &str {
        &self.model
    }
}

/// Retry and sampling settings
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationSettings {
    pub max_attempts: u32,
    pub attempt_timeout: Duration,
    pub backoff_base: Duration,
    pub temperature: f32,
    pub top_p: f32,
    pub stream: bool,
}

impl GenerationSettings {
    #[must_use]
    pub fn from_config(config: &LlmConfig) -> Self {
        Self {
            max_attempts: config.max_retries.max(1),
            attempt_timeout: Duration::from_secs(config.timeout_secs),
            backoff_base: Duration::from_millis(config.backoff_base_ms),
            temperature: config.temperature,
            top_p: config.top_p,
            stream: config.stream,
        }
    }

    /// Delay after failed attempt `attempt` (1-based): `base * 2^attempt`
    #[must_use]
    pub fn backoff(&self, attempt: u32) -> Duration {
        self.backoff_base
            .saturating_mul(2u32.saturating_pow(attempt))
    }
}

impl Default for GenerationSettings {
    fn default() -> Self {
        Self::from_config(&LlmConfig::default())
    }
}

/// Generated text and whether it is the fallback
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Generation {
    pub text: String,
    pub used_fallback: bool,
}

/// Client that never surfaces transient generation failures
///
/// Each attempt is bounded by `attempt_timeout`. Failed attempts (transport
/// error, non-success status, timeout, empty answer) are retried after an
/// exponential backoff; once every attempt failed the fallback answer is
/// returned.
pub struct GenerationClient {
    backend: Arc<dyn GenerationBackend>,
    settings: GenerationSettings,
}

impl GenerationClient {
    pub fn new(backend: Arc<dyn GenerationBackend>, settings: GenerationSettings) -> Self {
        Self { backend, settings }
    }

    /// Build the backend named by `[llm] provider`
    pub fn from_config(config: &AppConfig) -> Result<Self> {
        let backend: Arc<dyn GenerationBackend> = match config.llm.provider.as_str() {
            "ollama" => Arc::new(OllamaBackend::new(config.llm_endpoint(), config.llm_model())?),
            "mock" => Arc::new(KeywordMockBackend::new()),
            other => {
                return Err(TriageError::ConfigError(format!(
                    "unknown llm provider: {other}"
                )))
            }
        };
        info!(
            "Generation client initialized: backend={}, max_attempts={}",
            backend.name(),
            config.llm.max_retries
        );
        Ok(Self::new(backend, GenerationSettings::from_config(&config.llm)))
    }

    pub const fn settings(&self) -> &GenerationSettings {
        &self.settings
    }

    pub fn backend_name(&self) -> &str {
        self.backend.name()
    }

    pub async fn is_available(&self) -> bool {
        self.backend.is_available().await
    }

    /// Generate text, returning the fallback answer if every attempt fails
    pub async fn generate(&self, prompt: &str) -> String {
        self.generate_detailed(prompt).await.text
    }

    /// Like [`Self::generate`], also reporting whether the fallback was used
    pub async fn generate_detailed(&self, prompt: &str) -> Generation {
        match self.try_generate(prompt).await {
            Ok(text) => Generation {
                text,
                used_fallback: false,
            },
            Err(e) => {
                error!("All generation attempts failed, using fallback answer: {}", e);
                Generation {
                    text: fallback_response(),
                    used_fallback: true,
                }
            }
        }
    }

    /// Generate text, reporting `GenerationFailure` once every attempt failed
    pub async fn try_generate(&self, prompt: &str) -> Result<String> {
        let request = CompletionRequest {
            prompt: prompt.to_string(),
            temperature: self.settings.temperature,
            top_p: self.settings.top_p,
            stream: self.settings.stream,
        };
        let max_attempts = self.settings.max_attempts.max(1);
        let mut last_error = String::new();

        for attempt in 1..=max_attempts {
            info!(attempt, max_attempts, backend = %self.backend.name(), "Sending prompt for generation");
            let started = Instant::now();

            let outcome =
                tokio::time::timeout(self.settings.attempt_timeout, self.backend.complete(&request))
                    .await;
            let latency_ms = started.elapsed().as_millis() as u64;

            match outcome {
                Ok(Ok(text)) if !text.trim().is_empty() => {
                    info!(
                        attempt,
                        max_attempts,
                        latency_ms,
                        chars = text.chars().count(),
                        "Generation succeeded"
                    );
                    return Ok(text);
                }
                Ok(Ok(_)) => {
                    last_error = "empty response".to_string();
                    warn!(attempt, max_attempts, latency_ms, "Generation returned an empty response");
                }
                Ok(Err(e)) => {
                    last_error = e.to_string();
                    warn!(attempt, max_attempts, latency_ms, error = %e, "Generation attempt failed");
                }
                Err(_) => {
                    last_error = format!(
                        "timed out after {}s",
                        self.settings.attempt_timeout.as_secs_f64()
                    );
                    warn!(attempt, max_attempts, latency_ms, "Generation attempt timed out");
                }
            }

            if attempt < max_attempts {
                let wait = self.settings.backoff(attempt);
                info!("Waiting {:?} before the next generation attempt", wait);
                tokio::time::sleep(wait).await;
            }
        }

        Err(TriageError::GenerationFailure {
            attempts: max_attempts,
            message: last_error,
        })
    }
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::sync::atomic::AtomicU32;
    use std::sync::atomic::Ordering;
    use std::sync::Mutex;

    use super::*;
    use crate::llm::ResponseParser;
    use crate::models::Classification;
    use crate::models::UrgencyLevel;

    enum Step {
        Fail,
        Hang,
        Reply(&'static str),
    }

    struct ScriptedBackend {
        steps: Mutex<VecDeque<Step>>,
        calls: AtomicU32,
    }

    impl ScriptedBackend {
        fn new(steps: Vec<Step>) -> Arc<Self> {
            Arc::new(Self {
                steps: Mutex::new(steps.into()),
                calls: AtomicU32::new(0),
            })
        }
    }

    #[async_trait]
    impl GenerationBackend for ScriptedBackend {
        async fn complete(&self, _request: &CompletionRequest) -> Result<String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let step = self.steps.lock().unwrap().pop_front().unwrap_or(Step::Fail);
            match step {
                Step::Fail => Err(TriageError::HttpError("503 Service Unavailable".to_string())),
                Step::Hang => {
                    tokio::time::sleep(Duration::from_secs(60)).await;
                    Ok("too late".to_string())
                }
                Step::Reply(text) => Ok(text.to_string()),
            }
        }

        async fn is_available(&self) -> bool {
            false
        }

        fn name(&self) -> &str {
            "scripted"
        }
    }

    fn fast_settings() -> GenerationSettings {
        GenerationSettings {
            max_attempts: 3,
            attempt_timeout: Duration::from_millis(50),
            backoff_base: Duration::from_millis(1),
            ..GenerationSettings::default()
        }
    }

    #[tokio::test]
    async fn test_fails_twice_then_succeeds() {
        let backend = ScriptedBackend::new(vec![
            Step::Fail,
            Step::Fail,
            Step::Reply("CLASSIFICAÇÃO: VERDE"),
        ]);
        let client = GenerationClient::new(backend.clone(), fast_settings());

        let generation = client.generate_detailed("prompt").await;
        assert_eq!(generation.text, "CLASSIFICAÇÃO: VERDE");
        assert!(!generation.used_fallback);
        assert_eq!(backend.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_always_failing_returns_fallback() {
        let backend = ScriptedBackend::new(vec![]);
        let client = GenerationClient::new(backend.clone(), fast_settings());

        let text = client.generate("prompt").await;
        assert_eq!(text, fallback_response());
        assert!(text.contains(UrgencyLevel::SAFE_DEFAULT.label()));
        assert_eq!(
            ResponseParser::parse(&text).classification,
            Classification::Tier(UrgencyLevel::SAFE_DEFAULT)
        );
        assert_eq!(backend.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_try_generate_reports_failure() {
        let backend = ScriptedBackend::new(vec![]);
        let client = GenerationClient::new(backend, fast_settings());

        match client.try_generate("prompt").await {
            Err(TriageError::GenerationFailure { attempts, message }) => {
                assert_eq!(attempts, 3);
                assert!(message.contains("503"));
            }
            other => panic!("expected GenerationFailure, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_timeout_counts_as_failed_attempt() {
        let backend = ScriptedBackend::new(vec![Step::Hang, Step::Reply("CLASSIFICAÇÃO: AZUL")]);
        let client = GenerationClient::new(backend.clone(), fast_settings());

        assert_eq!(client.generate("prompt").await, "CLASSIFICAÇÃO: AZUL");
        assert_eq!(backend.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_empty_response_is_retried() {
        let backend = ScriptedBackend::new(vec![Step::Reply("  \n"), Step::Reply("ok")]);
        let client = GenerationClient::new(backend.clone(), fast_settings());

        assert_eq!(client.generate("prompt").await, "ok");
        assert_eq!(backend.calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_backoff_doubles() {
        let settings = GenerationSettings::default();
        assert_eq!(settings.backoff(1), Duration::from_secs(2));
        assert_eq!(settings.backoff(2), Duration::from_secs(4));
        assert_eq!(settings.max_attempts, 3);
        assert_eq!(settings.attempt_timeout, Duration::from_secs(60));
    }

    #[test]
    fn test_from_config_rejects_unknown_provider() {
        let mut config = AppConfig::default();
        config.llm.provider = "gpt".to_string();
        assert!(GenerationClient::from_config(&config).is_err());

        config.llm.provider = "mock".to_string();
        let client = GenerationClient::from_config(&config).unwrap();
        assert_eq!(client.backend_name(), "mock");
    }
}
