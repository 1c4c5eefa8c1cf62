//! In-memory [`VectorStore`] implementation for testing and embedded use.
//!
//! Uses a `HashMap` keyed by owner behind `std::sync::RwLock`. Search
//! is brute-force cosine similarity over the owner's records.

use std::collections::HashMap;
use std::sync::RwLock;

use anyhow::Result;
use async_trait::async_trait;

use crate::embedding::cosine_similarity;
use crate::models::{SearchHit, VectorRecord};

use super::{similarity_to_relevance, SearchOptions, VectorStore};

/// In-memory vector store.
#[derive(Default)]
pub struct InMemoryVectorStore {
    records: RwLock<HashMap<String, Vec<VectorRecord>>>,
}

impl InMemoryVectorStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Total records for an owner, across all documents.
    pub fn owner_record_count(&self, owner_id: &str) -> usize {
        self.records
            .read()
            .unwrap()
            .get(owner_id)
            .map(|r| r.len())
            .unwrap_or(0)
    }
}

#[async_trait]
impl VectorStore for InMemoryVectorStore {
    async fn add(&self, owner_id: &str, records: Vec<VectorRecord>) -> Result<()> {
        let mut all = self.records.write().unwrap();
        let owned = all.entry(owner_id.to_string()).or_default();
        for record in records {
            // Content-addressed ids: last writer wins.
            owned.retain(|r| r.id != record.id);
            owned.push(record);
        }
        Ok(())
    }

    async fn search(
        &self,
        owner_id: &str,
        query_vector: &[f32],
        options: &SearchOptions,
    ) -> Result<Vec<SearchHit>> {
        let all = self.records.read().unwrap();
        let owned = match all.get(owner_id) {
            Some(r) => r,
            None => return Ok(Vec::new()),
        };

        let mut hits: Vec<SearchHit> = owned
            .iter()
            .filter(|r| match &options.file_ids {
                Some(ids) => ids.iter().any(|id| *id == r.metadata.document_id),
                None => true,
            })
            .map(|r| SearchHit {
                content: r.content.clone(),
                source: r.metadata.document_name.clone(),
                document_id: r.metadata.document_id.clone(),
                relevance: similarity_to_relevance(cosine_similarity(query_vector, &r.embedding)),
            })
            .filter(|h| h.relevance >= options.threshold)
            .collect();

        hits.sort_by(|a, b| {
            b.relevance
                .partial_cmp(&a.relevance)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        hits.truncate(options.limit);
        Ok(hits)
    }

    async fn delete_document(&self, owner_id: &str, document_id: &str) -> Result<()> {
        let mut all = self.records.write().unwrap();
        if let Some(owned) = all.get_mut(owner_id) {
            owned.retain(|r| r.metadata.document_id != document_id);
        }
        Ok(())
    }

    async fn document_record_count(&self, owner_id: &str, document_id: &str) -> Result<usize> {
        let all = self.records.read().unwrap();
        Ok(all
            .get(owner_id)
            .map(|owned| {
                owned
                    .iter()
                    .filter(|r| r.metadata.document_id == document_id)
                    .count()
            })
            .unwrap_or(0))
    }
}
