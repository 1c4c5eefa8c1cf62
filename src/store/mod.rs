//! Vector storage abstraction.
//!
//! The [`VectorStore`] trait defines the three operations the pipeline
//! needs from its vector backend: add records, owner-scoped similarity
//! search, and delete-by-document. Implementations must be
//! `Send + Sync` to work with async runtimes.
//!
//! All records are scoped per owner; a search never crosses owner
//! boundaries.

pub mod memory;
pub mod sqlite;

use anyhow::Result;
use async_trait::async_trait;

use crate::models::{SearchHit, VectorRecord};

/// Options for [`VectorStore::search`].
#[derive(Debug, Clone, Default)]
pub struct SearchOptions {
    /// Maximum hits to return.
    pub limit: usize,
    /// Minimum relevance in `[0.0, 1.0]`; hits below are dropped.
    pub threshold: f64,
    /// Restrict the search to these document ids.
    pub file_ids: Option<Vec<String>>,
}

/// Abstract vector storage backend.
///
/// | Method | Purpose |
/// |--------|---------|
/// | [`add`](VectorStore::add) | Upsert vector records (id collision overwrites) |
/// | [`search`](VectorStore::search) | Ranked similarity search scoped to one owner |
/// | [`delete_document`](VectorStore::delete_document) | Drop all records for one document |
#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Upsert records for an owner. Records whose id already exists are
    /// overwritten — this is what makes re-ingestion idempotent.
    async fn add(&self, owner_id: &str, records: Vec<VectorRecord>) -> Result<()>;

    /// Similarity search over one owner's records, ranked by relevance
    /// descending.
    async fn search(
        &self,
        owner_id: &str,
        query_vector: &[f32],
        options: &SearchOptions,
    ) -> Result<Vec<SearchHit>>;

    /// Delete every record belonging to `(owner_id, document_id)`.
    async fn delete_document(&self, owner_id: &str, document_id: &str) -> Result<()>;

    /// Number of records stored for `(owner_id, document_id)`.
    async fn document_record_count(&self, owner_id: &str, document_id: &str) -> Result<usize>;
}

/// Map a cosine similarity in `[-1, 1]` to a relevance in `[0, 1]`.
///
/// Negative similarities clamp to zero; text embeddings are almost
/// never anti-correlated, and a negative relevance has no meaning to
/// the confidence evaluator.
pub fn similarity_to_relevance(similarity: f32) -> f64 {
    (similarity as f64).clamp(0.0, 1.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_relevance_clamped_to_unit() {
        assert_eq!(similarity_to_relevance(-0.4), 0.0);
        assert_eq!(similarity_to_relevance(0.0), 0.0);
        assert!((similarity_to_relevance(0.62) - 0.62).abs() < 1e-6);
        assert_eq!(similarity_to_relevance(1.0), 1.0);
    }
}
