use std::fmt;
use std::str::FromStr;

use chrono::DateTime;
use chrono::Utc;
use serde::Deserialize;
use serde::Serialize;

use crate::errors::TriageError;

/// Manchester protocol urgency tiers, most severe first
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum UrgencyLevel {
    Vermelho, // Emergência
    Laranja,  // Muito urgente
    Amarelo,  // Urgente
    Verde,    // Pouco urgente
    Azul,     // Não urgente
}

impl UrgencyLevel {
    /// Tier used whenever the pipeline cannot determine one: the generation
    /// fallback text, unparseable model output and persisted defaults.
    pub const SAFE_DEFAULT: Self = Self::Amarelo;

    /// Keyword scan order used by the response parser. Part of the prompt
    /// contract: changing it requires bumping `PROTOCOL_VERSION`.
    pub const PRIORITY_ORDER: [Self; 5] = [
        Self::Vermelho,
        Self::Laranja,
        Self::Amarelo,
        Self::Verde,
        Self::Azul,
    ];

    /// Uppercase Portuguese label, as emitted by the model
    pub const fn label(self) -> &'static str {
        match self {
            Self::Vermelho => "VERMELHO",
            Self::Laranja => "LARANJA",
            Self::Amarelo => "AMARELO",
            Self::Verde => "VERDE",
            Self::Azul => "AZUL",
        }
    }

    pub const fn description(self) -> &'static str {
        match self {
            Self::Vermelho => "Emergência",
            Self::Laranja => "Muito Urgente",
            Self::Amarelo => "Urgente",
            Self::Verde => "Pouco Urgente",
            Self::Azul => "Não Urgente",
        }
    }

    pub const fn risk(self) -> &'static str {
        match self {
            Self::Vermelho => "Risco imediato à vida",
            Self::Laranja => "Risco alto",
            Self::Amarelo => "Risco moderado",
            Self::Verde => "Risco baixo",
            Self::Azul => "Sem risco",
        }
    }

    /// Maximum acceptable time to care, in minutes (0 = immediate)
    pub const fn max_wait_minutes(self) -> u32 {
        match self {
            Self::Vermelho => 0,
            Self::Laranja => 10,
            Self::Amarelo => 60,
            Self::Verde => 120,
            Self::Azul => 240,
        }
    }
}

impl fmt::Display for UrgencyLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for UrgencyLevel {
    type Err = TriageError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim();
        Self::PRIORITY_ORDER
            .into_iter()
            .find(|level| level.label().eq_ignore_ascii_case(wanted))
            .ok_or_else(|| TriageError::InvalidInput(format!("unknown urgency level: {s}")))
    }
}

/// Classification extracted from model output
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub enum Classification {
    Tier(UrgencyLevel),
    Unknown,
}

impl Classification {
    pub const UNKNOWN_LABEL: &'static str = "UNKNOWN";

    /// Concrete tier, mapping `Unknown` to the safe default
    pub const fn resolve(self) -> UrgencyLevel {
        match self {
            Self::Tier(level) => level,
            Self::Unknown => UrgencyLevel::SAFE_DEFAULT,
        }
    }

    pub const fn is_unknown(self) -> bool {
        matches!(self, Self::Unknown)
    }
}

impl fmt::Display for Classification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Tier(level) => level.fmt(f),
            Self::Unknown => f.write_str(Self::UNKNOWN_LABEL),
        }
    }
}

impl From<UrgencyLevel> for Classification {
    fn from(level: UrgencyLevel) -> Self {
        Self::Tier(level)
    }
}

impl From<Classification> for String {
    fn from(classification: Classification) -> Self {
        classification.to_string()
    }
}

impl TryFrom<String> for Classification {
    type Error = TriageError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        if value.trim().eq_ignore_ascii_case(Self::UNKNOWN_LABEL) {
            return Ok(Self::Unknown);
        }
        value.parse::<UrgencyLevel>().map(Self::Tier)
    }
}

/// Structured fields recovered from a raw model answer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParsedTriageResult {
    pub classification: Classification,
    pub justification: String,
    pub recommendations: String,
}

impl ParsedTriageResult {
    /// Tier to persist and display
    pub const fn urgency(&self) -> UrgencyLevel {
        self.classification.resolve()
    }
}

/// Cached embedding keyed by the content hash of its source text
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmbeddingRecord {
    pub text_hash: String,
    pub vector: Vec<f32>,
}

/// Searchable payload of an indexed validated case
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CaseMetadata {
    pub case_id: String,
    pub symptoms_text: String,
    pub outcome_text: String,
}

/// A human-validated triage together with its embedding
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidatedCase {
    pub case_id: String,
    pub symptoms_text: String,
    pub outcome_text: String,
    pub embedding: Vec<f32>,
}

impl ValidatedCase {
    pub fn metadata(&self) -> CaseMetadata {
        CaseMetadata {
            case_id: self.case_id.clone(),
            symptoms_text: self.symptoms_text.clone(),
            outcome_text: self.outcome_text.clone(),
        }
    }
}

/// Index hit with its cosine similarity to the query
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimilarCase {
    pub metadata: CaseMetadata,
    pub similarity: f32,
}

/// Input to prompt construction
#[derive(Debug, Clone)]
pub struct GenerationRequest {
    pub symptoms_text: String,
    pub retrieved_cases: Vec<SimilarCase>,
}

/// Per-request pipeline stage
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TriageStage {
    Embedding,
    Retrieving,
    Prompting,
    Generating,
    Parsing,
    Done,
    Failed,
}

impl fmt::Display for TriageStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Embedding => "EMBEDDING",
            Self::Retrieving => "RETRIEVING",
            Self::Prompting => "PROMPTING",
            Self::Generating => "GENERATING",
            Self::Parsing => "PARSING",
            Self::Done => "DONE",
            Self::Failed => "FAILED",
        };
        f.write_str(name)
    }
}

/// Result of a completed triage request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TriageOutcome {
    pub triage_id: String,
    pub symptoms_text: String,
    pub raw_response: String,
    /// Tier after mapping an unparseable answer to the safe default
    pub classification: UrgencyLevel,
    /// What the parser actually found in the raw response
    pub parsed_classification: Classification,
    pub justification: String,
    pub recommendations: String,
    pub similar_cases: Vec<SimilarCase>,
    /// True when retrieval was skipped because the index was unavailable
    pub retrieval_degraded: bool,
    /// True when every generation attempt failed and the fallback answer was used
    pub generation_fallback: bool,
    pub created_at: DateTime<Utc>,
}

/// Availability snapshot of the pipeline's dependencies
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceStatus {
    pub embedding_model_loaded: bool,
    pub cached_embeddings: usize,
    /// `None` when the index could not be reached
    pub indexed_cases: Option<usize>,
    pub generation_available: bool,
}
