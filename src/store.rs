//! Persistence collaborator for triage results awaiting human validation

use async_trait::async_trait;
use chrono::DateTime;
use chrono::Utc;
use serde::Deserialize;
use serde::Serialize;
use tokio::sync::RwLock;
use tracing::info;
use uuid::Uuid;

use crate::errors::Result;
use crate::errors::TriageError;
use crate::models::CaseMetadata;
use crate::models::UrgencyLevel;

/// Triage result handed to the store
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PendingTriage {
    pub symptoms_text: String,
    pub raw_response: String,
    pub classification: UrgencyLevel,
    pub justification: String,
    pub recommendations: String,
}

/// Human sign-off on a stored triage
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Validation {
    pub validated_by: String,
    pub feedback: String,
    pub validated_at: DateTime<Utc>,
}

/// Stored triage record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TriageRecord {
    pub triage_id: String,
    pub triage: PendingTriage,
    pub created_at: DateTime<Utc>,
    pub validation: Option<Validation>,
}

impl TriageRecord {
    pub const fn is_validated(&self) -> bool {
        self.validation.is_some()
    }

    /// Index metadata; the validated answer is the case outcome
    pub fn case_metadata(&self) -> CaseMetadata {
        CaseMetadata {
            case_id: self.triage_id.clone(),
            symptoms_text: self.triage.symptoms_text.clone(),
            outcome_text: self.triage.raw_response.clone(),
        }
    }
}

/// Which records `list` returns
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RecordFilter {
    #[default]
    All,
    Pending,
    Validated,
}

impl RecordFilter {
    const fn matches(self, record: &TriageRecord) -> bool {
        match self {
            Self::All => true,
            Self::Pending => !record.is_validated(),
            Self::Validated => record.is_validated(),
        }
    }
}

/// Record counts by validation state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct StoreCounts {
    pub total: usize,
    pub validated: usize,
    pub pending: usize,
}

/// Storage of triage results and source of validated cases
#[async_trait]
pub trait TriageStore: Send + Sync {
    /// Store a result for later validation, returning its id
    async fn save_for_validation(&self, triage: PendingTriage) -> Result<String>;

    /// Every validated case
    async fn list_validated_cases(&self) -> Result<Vec<CaseMetadata>>;
}

/// Store kept in process memory
#[derive(Default)]
pub struct InMemoryTriageStore {
    records: RwLock<Vec<TriageRecord>>,
}

impl InMemoryTriageStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark a triage as validated
    pub async fn validate(&self, triage_id: &str, validated_by: &str, feedback: &str) -> Result<()> {
        let mut records = self.records.write().await;
        let record = records
            .iter_mut()
            .find(|r| r.triage_id == triage_id)
            .ok_or_else(|| TriageError::InvalidInput(format!("unknown triage id {triage_id}")))?;

        record.validation = Some(Validation {
            validated_by: validated_by.to_string(),
            feedback: feedback.to_string(),
            validated_at: Utc::now(),
        });
        info!("Triage validated: id={}, validated_by={}", triage_id, validated_by);
        Ok(())
    }

    /// Remove a record; returns whether it existed
    pub async fn delete(&self, triage_id: &str) -> bool {
        let mut records = self.records.write().await;
        let before = records.len();
        records.retain(|r| r.triage_id != triage_id);
        records.len() != before
    }

    pub async fn get(&self, triage_id: &str) -> Option<TriageRecord> {
        self.records
            .read()
            .await
            .iter()
            .find(|r| r.triage_id == triage_id)
            .cloned()
    }

    /// Records matching `filter`, newest first
    pub async fn list(&self, filter: RecordFilter) -> Vec<TriageRecord> {
        self.records
            .read()
            .await
            .iter()
            .rev()
            .filter(|r| filter.matches(r))
            .cloned()
            .collect()
    }

    pub async fn counts(&self) -> StoreCounts {
        let records = self.records.read().await;
        let validated = records.iter().filter(|r| r.is_validated()).count();
        StoreCounts {
            total: records.len(),
            validated,
            pending: records.len() - validated,
        }
    }

    pub async fn len(&self) -> usize {
        self.records.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.records.read().await.is_empty()
    }
}

#[async_trait]
impl TriageStore for InMemoryTriageStore {
    async fn save_for_validation(&self, triage: PendingTriage) -> Result<String> {
        let triage_id = Uuid::new_v4().to_string();
        self.records.write().await.push(TriageRecord {
            triage_id: triage_id.clone(),
            triage,
            created_at: Utc::now(),
            validation: None,
        });
        info!("Triage saved for validation: id={}", triage_id);
        Ok(triage_id)
    }

    async fn list_validated_cases(&self) -> Result<Vec<CaseMetadata>> {
        Ok(self
            .records
            .read()
            .await
            .iter()
            .filter(|r| r.is_validated())
            .map(TriageRecord::case_metadata)
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pending(symptoms: &str) -> PendingTriage {
        PendingTriage {
            symptoms_text: symptoms.to_string(),
            raw_response: format!("CLASSIFICAÇÃO: VERDE\n{symptoms}"),
            classification: UrgencyLevel::Verde,
            justification: "estável".to_string(),
            recommendations: "orientações".to_string(),
        }
    }

    #[tokio::test]
    async fn test_only_validated_cases_are_listed() {
        let store = InMemoryTriageStore::new();
        let a = store.save_for_validation(pending("tosse")).await.unwrap();
        let _b = store.save_for_validation(pending("coriza")).await.unwrap();

        assert!(store.list_validated_cases().await.unwrap().is_empty());

        store.validate(&a, "enf. silva", "correto").await.unwrap();
        let cases = store.list_validated_cases().await.unwrap();
        assert_eq!(cases.len(), 1);
        assert_eq!(cases[0].case_id, a);
        assert_eq!(cases[0].symptoms_text, "tosse");
        assert!(cases[0].outcome_text.contains("VERDE"));
    }

    #[tokio::test]
    async fn test_validate_unknown_id() {
        let store = InMemoryTriageStore::new();
        let err = store.validate("missing", "x", "y").await.unwrap_err();
        assert!(err.is_client_error());
    }

    #[tokio::test]
    async fn test_counts_and_filters() {
        let store = InMemoryTriageStore::new();
        let a = store.save_for_validation(pending("a")).await.unwrap();
        store.save_for_validation(pending("b")).await.unwrap();
        store.validate(&a, "dr. souza", "").await.unwrap();

        let counts = store.counts().await;
        assert_eq!(
            counts,
            StoreCounts {
                total: 2,
                validated: 1,
                pending: 1
            }
        );
        assert_eq!(store.list(RecordFilter::Pending).await.len(), 1);
        let all = store.list(RecordFilter::All).await;
        assert_eq!(all[0].triage.symptoms_text, "b");
    }

    #[tokio::test]
    async fn test_delete() {
        let store = InMemoryTriageStore::new();
        let a = store.save_for_validation(pending("a")).await.unwrap();
        assert!(store.delete(&a).await);
        assert!(!store.delete(&a).await);
        assert!(store.get(&a).await.is_none());
        assert!(store.is_empty().await);
    }
}
