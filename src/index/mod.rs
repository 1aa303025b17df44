//! Similarity search over validated triage cases
//!
//! The index holds one vector per validated case together with its symptoms
//! and outcome text. Queries rank by cosine similarity; equal scores keep
//! insertion order.

pub mod memory;

use async_trait::async_trait;

pub use memory::InMemoryVectorIndex;

use crate::errors::Result;
use crate::models::CaseMetadata;
use crate::models::SimilarCase;

/// Searchable store of validated-case vectors
#[async_trait]
pub trait VectorIndex: Send + Sync {
    /// Insert a case, replacing any existing entry with the same `case_id`
    async fn add(&self, case_id: &str, vector: Vec<f32>, metadata: CaseMetadata) -> Result<()>;

    /// Remove a case; returns whether it was present
    async fn remove(&self, case_id: &str) -> Result<bool>;

    /// At most `k` cases, most similar first
    async fn query(&self, vector: &[f32], k: usize) -> Result<Vec<SimilarCase>>;

    /// Ids currently indexed, in insertion order
    async fn case_ids(&self) -> Result<Vec<String>>;

    async fn len(&self) -> Result<usize>;

    async fn is_empty(&self) -> Result<bool> {
        Ok(self.len().await? == 0)
    }
}

/// Cosine similarity of two vectors
///
/// Returns 0.0 when the lengths differ, either vector has zero norm or the
/// result is not finite. Accumulates in f64 and clamps to [-1, 1].
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let (mut dot, mut norm_a, mut norm_b) = (0.0f64, 0.0f64, 0.0f64);
    for (x, y) in a.iter().zip(b.iter()) {
        let (x, y) = (f64::from(*x), f64::from(*y));
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    let denom = norm_a.sqrt() * norm_b.sqrt();
    if !denom.is_finite() || denom < f64::EPSILON {
        return 0.0;
    }

    let similarity = dot / denom;
    if similarity.is_finite() {
        similarity.clamp(-1.0, 1.0) as f32
    } else {
        0.0
    }
}
