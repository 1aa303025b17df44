//! Retrieval of similar validated cases and index maintenance

use std::collections::HashSet;
use std::sync::Arc;

use serde::Serialize;
use tracing::debug;
use tracing::info;
use tracing::warn;

use crate::embeddings::EmbeddingService;
use crate::errors::Result;
use crate::errors::TriageError;
use crate::index::VectorIndex;
use crate::models::SimilarCase;
use crate::store::TriageStore;

/// Changes applied by [`Retriever::sync_from_store`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SyncReport {
    pub added: usize,
    pub removed: usize,
    /// Cases skipped because their text could not be embedded
    pub failed: usize,
    /// Index size after the sync
    pub indexed: usize,
}

/// Similarity search over the validated-case index
pub struct Retriever {
    index: Arc<dyn VectorIndex>,
    embedding_service: Arc<EmbeddingService>,
}

impl Retriever {
    /// Create a new retriever
    pub fn new(index: Arc<dyn VectorIndex>, embedding_service: Arc<EmbeddingService>) -> Self {
        Self {
            index,
            embedding_service,
        }
    }

    /// Up to `k` validated cases most similar to `embedding`
    pub async fn similar_cases(&self, embedding: &[f32], k: usize) -> Result<Vec<SimilarCase>> {
        let cases = self.index.query(embedding, k).await?;
        debug!("Retrieved {} similar cases", cases.len());
        Ok(cases)
    }

    pub async fn indexed_cases(&self) -> Result<usize> {
        self.index.len().await
    }

    /// Bring the index in line with the store's validated cases
    ///
    /// New cases are embedded and added; indexed cases missing from the store
    /// are removed. Indexed cases are immutable and are not re-embedded. A
    /// case whose text fails to embed is skipped; an unavailable embedding
    /// model aborts the sync.
    pub async fn sync_from_store(&self, store: &dyn TriageStore) -> Result<SyncReport> {
        let cases = store.list_validated_cases().await?;
        let wanted: HashSet<&str> = cases.iter().map(|c| c.case_id.as_str()).collect();
        let indexed: HashSet<String> = self.index.case_ids().await?.into_iter().collect();

        let mut report = SyncReport::default();

        for case_id in indexed.iter().filter(|id| !wanted.contains(id.as_str())) {
            if self.index.remove(case_id).await? {
                debug!("Removed stale case {} from index", case_id);
                report.removed += 1;
            }
        }

        for case in cases.iter().filter(|c| !indexed.contains(&c.case_id)) {
            let embedding = match self.embedding_service.embed(&case.symptoms_text).await {
                Ok(embedding) => embedding,
                Err(e @ TriageError::ModelUnavailable(_)) => return Err(e),
                Err(e) => {
                    warn!("Skipping validated case {}: {}", case.case_id, e);
                    report.failed += 1;
                    continue;
                }
            };
            self.index
                .add(&case.case_id, embedding, case.clone())
                .await?;
            report.added += 1;
        }

        report.indexed = self.index.len().await?;
        info!(
            "Index synced: added={}, removed={}, failed={}, indexed={}",
            report.added, report.removed, report.failed, report.indexed
        );
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::embeddings::ConfiguredModelLoader;
    use crate::embeddings::EmbeddingConfig;
    use crate::embeddings::EmbeddingProvider;
    use crate::index::InMemoryVectorIndex;
    use crate::models::UrgencyLevel;
    use crate::store::InMemoryTriageStore;
    use crate::store::PendingTriage;

    fn embedding_service(dir: &std::path::Path) -> Arc<EmbeddingService> {
        let config = EmbeddingConfig {
            provider: EmbeddingProvider::Hashing,
            model: "hashing".to_string(),
            endpoint: "http://localhost:11434".to_string(),
            dimension: 64,
            max_input_chars: 512,
            cache_dir: dir.to_path_buf(),
            flush_every: 100,
            request_timeout: Duration::from_secs(1),
        };
        let loader = Arc::new(ConfiguredModelLoader::new(config.clone()));
        Arc::new(EmbeddingService::with_loader(config, loader).unwrap())
    }

    async fn validated(store: &InMemoryTriageStore, symptoms: &str) -> String {
        let id = store
            .save_for_validation(PendingTriage {
                symptoms_text: symptoms.to_string(),
                raw_response: "CLASSIFICAÇÃO: VERDE".to_string(),
                classification: UrgencyLevel::Verde,
                justification: String::new(),
                recommendations: String::new(),
            })
            .await
            .unwrap();
        store.validate(&id, "enf. lima", "ok").await.unwrap();
        id
    }

    #[tokio::test]
    async fn test_sync_adds_and_removes() {
        let dir = tempfile::tempdir().unwrap();
        let index = Arc::new(InMemoryVectorIndex::new());
        let retriever = Retriever::new(index.clone(), embedding_service(dir.path()));
        let store = InMemoryTriageStore::new();

        let a = validated(&store, "tosse seca").await;
        let b = validated(&store, "dor lombar").await;

        let report = retriever.sync_from_store(&store).await.unwrap();
        assert_eq!(report.added, 2);
        assert_eq!(report.indexed, 2);

        // Second sync is a no-op
        let report = retriever.sync_from_store(&store).await.unwrap();
        assert_eq!(report, SyncReport { indexed: 2, ..SyncReport::default() });

        store.delete(&a).await;
        let report = retriever.sync_from_store(&store).await.unwrap();
        assert_eq!(report.removed, 1);
        assert_eq!(index.case_ids().await.unwrap(), vec![b]);
    }

    #[tokio::test]
    async fn test_blank_case_is_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let index = Arc::new(InMemoryVectorIndex::new());
        let retriever = Retriever::new(index, embedding_service(dir.path()));
        let store = InMemoryTriageStore::new();

        validated(&store, "   ").await;
        validated(&store, "febre").await;

        let report = retriever.sync_from_store(&store).await.unwrap();
        assert_eq!(report.added, 1);
        assert_eq!(report.failed, 1);
    }

    #[tokio::test]
    async fn test_similar_cases_ranks_by_embedding() {
        let dir = tempfile::tempdir().unwrap();
        let service = embedding_service(dir.path());
        let retriever = Retriever::new(Arc::new(InMemoryVectorIndex::new()), service.clone());
        let store = InMemoryTriageStore::new();

        validated(&store, "renovação de receita").await;
        let chest = validated(&store, "dor torácica com sudorese").await;
        retriever.sync_from_store(&store).await.unwrap();

        let query = service.embed("dor torácica e sudorese fria").await.unwrap();
        let cases = retriever.similar_cases(&query, 1).await.unwrap();
        assert_eq!(cases.len(), 1);
        assert_eq!(cases[0].metadata.case_id, chest);
    }
}
