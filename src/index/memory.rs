//! In-process vector index

use std::collections::HashMap;
use std::sync::RwLock;
use std::sync::RwLockReadGuard;
use std::sync::RwLockWriteGuard;

use async_trait::async_trait;
use tracing::debug;

use super::cosine_similarity;
use super::VectorIndex;
use crate::errors::Result;
use crate::errors::TriageError;
use crate::models::CaseMetadata;
use crate::models::SimilarCase;
use crate::models::ValidatedCase;

#[derive(Default)]
struct IndexState {
    entries: Vec<ValidatedCase>,
    positions: HashMap<String, usize>,
    dimension: Option<usize>,
}

impl IndexState {
    fn reindex_from(&mut self, start: usize) {
        for (offset, entry) in self.entries[start..].iter().enumerate() {
            self.positions.insert(entry.case_id.clone(), start + offset);
        }
    }
}

/// Brute-force cosine index kept in memory
///
/// Every query scans all entries. Suitable for the few thousand validated
/// cases a triage unit accumulates.
#[derive(Default)]
pub struct InMemoryVectorIndex {
    state: RwLock<IndexState>,
}

impl InMemoryVectorIndex {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, IndexState>> {
        self.state
            .read()
            .map_err(|_| TriageError::IndexUnavailable("index lock poisoned".to_string()))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, IndexState>> {
        self.state
            .write()
            .map_err(|_| TriageError::IndexUnavailable("index lock poisoned".to_string()))
    }
}

fn check_dimension(expected: Option<usize>, actual: usize) -> Result<()> {
    match expected {
        Some(dim) if dim != actual => Err(TriageError::EmbeddingError(format!(
            "vector has {actual} dimensions, index holds {dim}"
        ))),
        _ => Ok(()),
    }
}

#[async_trait]
impl VectorIndex for InMemoryVectorIndex {
    async fn add(&self, case_id: &str, vector: Vec<f32>, metadata: CaseMetadata) -> Result<()> {
        if vector.is_empty() {
            return Err(TriageError::EmbeddingError(format!(
                "empty vector for case {case_id}"
            )));
        }

        let mut state = self.write()?;
        check_dimension(state.dimension, vector.len())?;
        state.dimension = Some(vector.len());

        if let Some(&pos) = state.positions.get(case_id) {
            debug!("Replacing indexed case {}", case_id);
            let entry = &mut state.entries[pos];
            entry.embedding = vector;
            entry.symptoms_text = metadata.symptoms_text;
            entry.outcome_text = metadata.outcome_text;
        } else {
            let pos = state.entries.len();
            state.entries.push(ValidatedCase {
                case_id: case_id.to_string(),
                symptoms_text: metadata.symptoms_text,
                outcome_text: metadata.outcome_text,
                embedding: vector,
            });
            state.positions.insert(case_id.to_string(), pos);
        }
        Ok(())
    }

    async fn remove(&self, case_id: &str) -> Result<bool> {
        let mut state = self.write()?;
        let Some(pos) = state.positions.remove(case_id) else {
            return Ok(false);
        };

        state.entries.remove(pos);
        state.reindex_from(pos);
        if state.entries.is_empty() {
            state.dimension = None;
        }
        Ok(true)
    }

    async fn query(&self, vector: &[f32], k: usize) -> Result<Vec<SimilarCase>> {
        let state = self.read()?;
        if k == 0 || state.entries.is_empty() {
            return Ok(Vec::new());
        }
        check_dimension(state.dimension, vector.len())?;

        let mut scored: Vec<(usize, f32)> = state
            .entries
            .iter()
            .enumerate()
            .map(|(pos, entry)| (pos, cosine_similarity(vector, &entry.embedding)))
            .collect();

        // sort_by is stable, so ties stay in insertion order
        scored.sort_by(|a, b| b.1.total_cmp(&a.1));
        scored.truncate(k);

        Ok(scored
            .into_iter()
            .map(|(pos, similarity)| SimilarCase {
                metadata: state.entries[pos].metadata(),
                similarity,
            })
            .collect())
    }

    async fn case_ids(&self) -> Result<Vec<String>> {
        Ok(self
            .read()?
            .entries
            .iter()
            .map(|e| e.case_id.clone())
            .collect())
    }

    async fn len(&self) -> Result<usize> {
        Ok(self.read()?.entries.len())
    }
}
