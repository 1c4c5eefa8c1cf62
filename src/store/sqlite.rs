//! SQLite-backed [`VectorStore`] implementation.
//!
//! Stores embeddings as little-endian f32 BLOBs and performs
//! brute-force cosine similarity in Rust over one owner's rows. Fine
//! for the per-user corpus sizes this pipeline targets; an ANN index
//! is the vector backend's concern, not this crate's.

use anyhow::Result;
use async_trait::async_trait;
use sqlx::{Row, SqlitePool};

use crate::embedding::{blob_to_vec, cosine_similarity, vec_to_blob};
use crate::models::{SearchHit, VectorRecord};

use super::{similarity_to_relevance, SearchOptions, VectorStore};

/// SQLite implementation of the [`VectorStore`] trait.
pub struct SqliteVectorStore {
    pool: SqlitePool,
}

impl SqliteVectorStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl VectorStore for SqliteVectorStore {
    async fn add(&self, owner_id: &str, records: Vec<VectorRecord>) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        for record in &records {
            let blob = vec_to_blob(&record.embedding);
            let metadata_json = serde_json::to_string(&record.metadata)?;
            sqlx::query(
                r#"
                INSERT INTO vector_records (id, owner_id, document_id, chunk_index, content, embedding, metadata_json)
                VALUES (?, ?, ?, ?, ?, ?, ?)
                ON CONFLICT(id) DO UPDATE SET
                    owner_id = excluded.owner_id,
                    document_id = excluded.document_id,
                    chunk_index = excluded.chunk_index,
                    content = excluded.content,
                    embedding = excluded.embedding,
                    metadata_json = excluded.metadata_json
                "#,
            )
            .bind(&record.id)
            .bind(owner_id)
            .bind(&record.metadata.document_id)
            .bind(record.metadata.chunk_index)
            .bind(&record.content)
            .bind(&blob)
            .bind(&metadata_json)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    async fn search(
        &self,
        owner_id: &str,
        query_vector: &[f32],
        options: &SearchOptions,
    ) -> Result<Vec<SearchHit>> {
        let rows = sqlx::query(
            "SELECT document_id, content, embedding, metadata_json FROM vector_records WHERE owner_id = ?",
        )
        .bind(owner_id)
        .fetch_all(&self.pool)
        .await?;

        let mut hits: Vec<SearchHit> = rows
            .iter()
            .filter_map(|row| {
                let document_id: String = row.get("document_id");
                if let Some(ids) = &options.file_ids {
                    if !ids.iter().any(|id| *id == document_id) {
                        return None;
                    }
                }
                let blob: Vec<u8> = row.get("embedding");
                let vec = blob_to_vec(&blob);
                let relevance = similarity_to_relevance(cosine_similarity(query_vector, &vec));
                if relevance < options.threshold {
                    return None;
                }
                let metadata_json: String = row.get("metadata_json");
                let source = serde_json::from_str::<serde_json::Value>(&metadata_json)
                    .ok()
                    .and_then(|m| m.get("document_name")?.as_str().map(String::from))
                    .unwrap_or_default();
                Some(SearchHit {
                    content: row.get("content"),
                    source,
                    document_id,
                    relevance,
                })
            })
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
        sqlx::query("DELETE FROM vector_records WHERE owner_id = ? AND document_id = ?")
            .bind(owner_id)
            .bind(document_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn document_record_count(&self, owner_id: &str, document_id: &str) -> Result<usize> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM vector_records WHERE owner_id = ? AND document_id = ?",
        )
        .bind(owner_id)
        .bind(document_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(count as usize)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db;
    use crate::models::ChunkMetadata;
    use chrono::Utc;
    use std::collections::BTreeMap;

    async fn test_store() -> (tempfile::TempDir, SqliteVectorStore) {
        let tmp = tempfile::tempdir().unwrap();
        let pool = db::connect(&tmp.path().join("test.sqlite")).await.unwrap();
        db::init_schema(&pool).await.unwrap();
        (tmp, SqliteVectorStore::new(pool))
    }

    fn record(doc: &str, index: i64, embedding: Vec<f32>) -> VectorRecord {
        VectorRecord {
            id: VectorRecord::record_id(doc, index),
            embedding,
            content: format!("{} chunk {}", doc, index),
            metadata: ChunkMetadata {
                document_id: doc.to_string(),
                document_name: format!("{}.txt", doc),
                chunk_index: index,
                owner_id: "u1".to_string(),
                created_at: Utc::now(),
                embedding_model: "test".to_string(),
                embedding_dimensions: 3,
                extra: BTreeMap::new(),
            },
        }
    }

    #[tokio::test]
    async fn test_upsert_and_search() {
        let (_tmp, store) = test_store().await;
        store
            .add(
                "u1",
                vec![
                    record("doc1", 0, vec![1.0, 0.0, 0.0]),
                    record("doc1", 1, vec![0.0, 1.0, 0.0]),
                ],
            )
            .await
            .unwrap();
        // Re-add with the same ids: must overwrite, not duplicate.
        store
            .add("u1", vec![record("doc1", 0, vec![1.0, 0.0, 0.0])])
            .await
            .unwrap();

        assert_eq!(store.document_record_count("u1", "doc1").await.unwrap(), 2);

        let opts = SearchOptions {
            limit: 10,
            ..Default::default()
        };
        let hits = store.search("u1", &[1.0, 0.0, 0.0], &opts).await.unwrap();
        assert_eq!(hits[0].source, "doc1.txt");
        assert!(hits[0].relevance > 0.99);
    }

    #[tokio::test]
    async fn test_delete_document() {
        let (_tmp, store) = test_store().await;
        store
            .add(
                "u1",
                vec![
                    record("doc1", 0, vec![1.0, 0.0, 0.0]),
                    record("doc2", 0, vec![0.0, 1.0, 0.0]),
                ],
            )
            .await
            .unwrap();

        store.delete_document("u1", "doc1").await.unwrap();
        assert_eq!(store.document_record_count("u1", "doc1").await.unwrap(), 0);
        assert_eq!(store.document_record_count("u1", "doc2").await.unwrap(), 1);
    }
}
