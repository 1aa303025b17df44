//! Triage pipeline: Embed -> Retrieve -> Prompt -> Generate -> Parse -> Persist

use std::sync::Arc;

use chrono::Utc;
use tracing::debug;
use tracing::error;
use tracing::field;
use tracing::info;
use tracing::info_span;
use tracing::warn;
use tracing::Instrument;
use tracing::Span;

use super::context::truncate_chars;
use crate::config::AppConfig;
use crate::config::RetrievalConfig;
use crate::embeddings::EmbeddingService;
use crate::errors::Result;
use crate::errors::TriageError;
use crate::index::InMemoryVectorIndex;
use crate::index::VectorIndex;
use crate::llm::build_triage_prompt;
use crate::llm::GenerationClient;
use crate::llm::ResponseParser;
use crate::models::GenerationRequest;
use crate::models::ServiceStatus;
use crate::models::TriageOutcome;
use crate::models::TriageStage;
use crate::rag::ContextAssembler;
use crate::rag::Retriever;
use crate::rag::SyncReport;
use crate::store::PendingTriage;
use crate::store::TriageStore;

/// Current stage of one request, mirrored into its tracing span
struct StageTracker {
    stage: TriageStage,
    span: Span,
}

impl StageTracker {
    fn new(span: Span) -> Self {
        span.record("stage", field::display(TriageStage::Embedding));
        Self {
            stage: TriageStage::Embedding,
            span,
        }
    }

    fn advance(&mut self, next: TriageStage) {
        debug!("Triage stage {} -> {}", self.stage, next);
        self.stage = next;
        self.span.record("stage", field::display(next));
    }
}

/// Complete triage service
pub struct TriageService {
    embedding_service: Arc<EmbeddingService>,
    retriever: Retriever,
    context_assembler: ContextAssembler,
    generation_client: GenerationClient,
    store: Arc<dyn TriageStore>,
    top_k: usize,
}

impl TriageService {
    /// Create a triage service with an in-memory index
    ///
    /// The index starts empty; call [`Self::sync_index`] to load the store's
    /// validated cases.
    ///
    /// # Errors
    /// - Embedding configuration errors (unknown provider, cache directory)
    /// - Generation configuration errors (unknown provider, HTTP client)
    pub fn new(config: &AppConfig, store: Arc<dyn TriageStore>) -> Result<Self> {
        let embedding_service = Arc::new(EmbeddingService::new(config)?);
        let generation_client = GenerationClient::from_config(config)?;
        Ok(Self::from_services(
            embedding_service,
            Arc::new(InMemoryVectorIndex::new()),
            generation_client,
            store,
            &config.retrieval,
        ))
    }

    /// Create from existing services
    #[must_use]
    pub fn from_services(
        embedding_service: Arc<EmbeddingService>,
        index: Arc<dyn VectorIndex>,
        generation_client: GenerationClient,
        store: Arc<dyn TriageStore>,
        retrieval: &RetrievalConfig,
    ) -> Self {
        let retriever = Retriever::new(index, Arc::clone(&embedding_service));
        Self {
            embedding_service,
            retriever,
            context_assembler: ContextAssembler::new(retrieval.max_context_chars),
            generation_client,
            store,
            top_k: retrieval.top_k,
        }
    }

    /// Triage a symptoms description
    ///
    /// # Errors
    /// - `InvalidInput` for empty or whitespace-only symptoms, before any
    ///   dependency is called
    /// - `ModelUnavailable` / `EmbeddingError` when the symptoms cannot be
    ///   embedded; no classification is produced
    /// - `Persistence` when the result cannot be stored for validation
    ///
    /// An unavailable index degrades to triage without similar cases, and
    /// generation failures resolve to the fallback answer.
    pub async fn triage(&self, symptoms: &str) -> Result<TriageOutcome> {
        if symptoms.trim().is_empty() {
            return Err(TriageError::InvalidInput(
                "symptoms description is empty".to_string(),
            ));
        }

        let span = info_span!("triage", stage = field::Empty);
        let mut tracker = StageTracker::new(span.clone());

        let result = self.run(symptoms, &mut tracker).instrument(span).await;
        if let Err(e) = &result {
            error!(stage = %tracker.stage, "Triage failed: {}", e);
            tracker.advance(TriageStage::Failed);
        }
        result
    }

    async fn run(&self, symptoms: &str, tracker: &mut StageTracker) -> Result<TriageOutcome> {
        info!("Processing triage: {}", truncate_chars(symptoms, 60));

        let embedding = self.embedding_service.embed(symptoms).await?;

        tracker.advance(TriageStage::Retrieving);
        let (similar_cases, retrieval_degraded) =
            match self.retriever.similar_cases(&embedding, self.top_k).await {
                Ok(cases) => (cases, false),
                Err(TriageError::IndexUnavailable(msg)) => {
                    warn!("Vector index unavailable, continuing without similar cases: {}", msg);
                    (Vec::new(), true)
                }
                Err(e) => return Err(e),
            };

        tracker.advance(TriageStage::Prompting);
        let request = GenerationRequest {
            symptoms_text: symptoms.to_string(),
            retrieved_cases: similar_cases,
        };
        let prompt = self.build_prompt(&request);

        tracker.advance(TriageStage::Generating);
        let generation = self.generation_client.generate_detailed(&prompt).await;

        tracker.advance(TriageStage::Parsing);
        let parsed = ResponseParser::parse(&generation.text);
        let classification = parsed.urgency();
        if parsed.classification.is_unknown() {
            warn!(
                "No classification found in model response, using {}",
                classification
            );
        }

        let triage_id = self
            .store
            .save_for_validation(PendingTriage {
                symptoms_text: request.symptoms_text.clone(),
                raw_response: generation.text.clone(),
                classification,
                justification: parsed.justification.clone(),
                recommendations: parsed.recommendations.clone(),
            })
            .await
            .map_err(|e| match e {
                persistence @ TriageError::Persistence(_) => persistence,
                other => TriageError::Persistence(other.to_string()),
            })?;

        tracker.advance(TriageStage::Done);
        info!(
            "Triage completed: id={}, classification={}, similar_cases={}, degraded={}, fallback={}",
            triage_id,
            classification,
            request.retrieved_cases.len(),
            retrieval_degraded,
            generation.used_fallback
        );

        Ok(TriageOutcome {
            triage_id,
            symptoms_text: request.symptoms_text,
            raw_response: generation.text,
            classification,
            parsed_classification: parsed.classification,
            justification: parsed.justification,
            recommendations: parsed.recommendations,
            similar_cases: request.retrieved_cases,
            retrieval_degraded,
            generation_fallback: generation.used_fallback,
            created_at: Utc::now(),
        })
    }

    /// Build the generation prompt for a request
    #[must_use]
    pub fn build_prompt(&self, request: &GenerationRequest) -> String {
        let context = self.context_assembler.assemble(&request.retrieved_cases);
        build_triage_prompt(&request.symptoms_text, &context)
    }

    /// Re-sync the index with the store's validated cases
    pub async fn sync_index(&self) -> Result<SyncReport> {
        self.retriever.sync_from_store(self.store.as_ref()).await
    }

    /// Availability of the pipeline's dependencies
    pub async fn status(&self) -> ServiceStatus {
        let indexed_cases = match self.retriever.indexed_cases().await {
            Ok(count) => Some(count),
            Err(e) => {
                warn!("Vector index unavailable: {}", e);
                None
            }
        };

        ServiceStatus {
            embedding_model_loaded: self.embedding_service.is_model_loaded(),
            cached_embeddings: self.embedding_service.cache_len(),
            indexed_cases,
            generation_available: self.generation_client.is_available().await,
        }
    }

    /// Get embedding service reference
    #[must_use]
    pub fn embedding_service(&self) -> &EmbeddingService {
        &self.embedding_service
    }

    /// Get context assembler reference
    #[must_use]
    pub const fn context_assembler(&self) -> &ContextAssembler {
        &self.context_assembler
    }
}
