//! Document registry and usage sink collaborator seams.
//!
//! [`DocumentRegistry`] tracks per-document processing status — the
//! user-visible surface for ingestion failures, which are reflected as
//! a status field and never as a blocking error for sibling documents.
//!
//! [`UsageSink`] receives one event per billable operation. Sink
//! failures are caught and logged by callers; they never block the
//! primary operation's success path.

use std::collections::HashMap;
use std::sync::RwLock;

use anyhow::Result;
use async_trait::async_trait;
use chrono::Utc;
use sqlx::{Row, SqlitePool};
use tracing::info;

use crate::models::{ProcessingStatus, UsageEvent};

/// A registered document and its processing state.
#[derive(Debug, Clone)]
pub struct DocumentRecord {
    pub id: String,
    pub owner_id: String,
    pub name: String,
    pub status: ProcessingStatus,
    /// Machine-readable code of the failure, when `status` is failed.
    pub error_code: Option<String>,
    pub chunk_count: usize,
}

/// Tracks document records and their processing status.
#[async_trait]
pub trait DocumentRegistry: Send + Sync {
    /// Create or reset a document record in `processing` state.
    async fn mark_processing(&self, owner_id: &str, document_id: &str, name: &str) -> Result<()>;

    /// Flip a document to `completed` with its final chunk count.
    async fn mark_completed(&self, owner_id: &str, document_id: &str, chunk_count: usize)
        -> Result<()>;

    /// Flip a document to `failed`, recording the error code.
    async fn mark_failed(&self, owner_id: &str, document_id: &str, error_code: &str) -> Result<()>;

    /// Fetch a document record, if registered.
    async fn get(&self, owner_id: &str, document_id: &str) -> Result<Option<DocumentRecord>>;

    /// Delete the document record. Called after vector deletion so a
    /// failure here leaves the document visible rather than orphaning
    /// vectors invisibly.
    async fn delete(&self, owner_id: &str, document_id: &str) -> Result<()>;
}

/// Receives usage events for billing and telemetry.
#[async_trait]
pub trait UsageSink: Send + Sync {
    async fn record(&self, event: UsageEvent) -> Result<()>;
}

// ============ In-memory implementations ============

/// In-memory registry for tests and embedded use.
#[derive(Default)]
pub struct InMemoryRegistry {
    records: RwLock<HashMap<(String, String), DocumentRecord>>,
}

impl InMemoryRegistry {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl DocumentRegistry for InMemoryRegistry {
    async fn mark_processing(&self, owner_id: &str, document_id: &str, name: &str) -> Result<()> {
        let mut records = self.records.write().unwrap();
        records.insert(
            (owner_id.to_string(), document_id.to_string()),
            DocumentRecord {
                id: document_id.to_string(),
                owner_id: owner_id.to_string(),
                name: name.to_string(),
                status: ProcessingStatus::Processing,
                error_code: None,
                chunk_count: 0,
            },
        );
        Ok(())
    }

    async fn mark_completed(
        &self,
        owner_id: &str,
        document_id: &str,
        chunk_count: usize,
    ) -> Result<()> {
        let mut records = self.records.write().unwrap();
        if let Some(rec) = records.get_mut(&(owner_id.to_string(), document_id.to_string())) {
            rec.status = ProcessingStatus::Completed;
            rec.error_code = None;
            rec.chunk_count = chunk_count;
        }
        Ok(())
    }

    async fn mark_failed(&self, owner_id: &str, document_id: &str, error_code: &str) -> Result<()> {
        let mut records = self.records.write().unwrap();
        if let Some(rec) = records.get_mut(&(owner_id.to_string(), document_id.to_string())) {
            rec.status = ProcessingStatus::Failed;
            rec.error_code = Some(error_code.to_string());
        }
        Ok(())
    }

    async fn get(&self, owner_id: &str, document_id: &str) -> Result<Option<DocumentRecord>> {
        let records = self.records.read().unwrap();
        Ok(records
            .get(&(owner_id.to_string(), document_id.to_string()))
            .cloned())
    }

    async fn delete(&self, owner_id: &str, document_id: &str) -> Result<()> {
        let mut records = self.records.write().unwrap();
        records.remove(&(owner_id.to_string(), document_id.to_string()));
        Ok(())
    }
}

/// Usage sink that logs events via `tracing` and keeps them in memory.
#[derive(Default)]
pub struct InMemoryUsageSink {
    events: RwLock<Vec<UsageEvent>>,
}

impl InMemoryUsageSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<UsageEvent> {
        self.events.read().unwrap().clone()
    }
}

#[async_trait]
impl UsageSink for InMemoryUsageSink {
    async fn record(&self, event: UsageEvent) -> Result<()> {
        info!(owner = %event.owner_id, action = event.action.as_str(), "usage event");
        self.events.write().unwrap().push(event);
        Ok(())
    }
}

// ============ SQLite implementations ============

/// SQLite-backed [`DocumentRegistry`].
pub struct SqliteRegistry {
    pool: SqlitePool,
}

impl SqliteRegistry {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl DocumentRegistry for SqliteRegistry {
    async fn mark_processing(&self, owner_id: &str, document_id: &str, name: &str) -> Result<()> {
        let now = Utc::now().timestamp();
        sqlx::query(
            r#"
            INSERT INTO documents (id, owner_id, name, processing_status, error_code, chunk_count, created_at, updated_at)
            VALUES (?, ?, ?, 'processing', NULL, 0, ?, ?)
            ON CONFLICT(owner_id, id) DO UPDATE SET
                name = excluded.name,
                processing_status = 'processing',
                error_code = NULL,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(document_id)
        .bind(owner_id)
        .bind(name)
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn mark_completed(
        &self,
        owner_id: &str,
        document_id: &str,
        chunk_count: usize,
    ) -> Result<()> {
        sqlx::query(
            "UPDATE documents SET processing_status = 'completed', error_code = NULL, chunk_count = ?, updated_at = ? WHERE owner_id = ? AND id = ?",
        )
        .bind(chunk_count as i64)
        .bind(Utc::now().timestamp())
        .bind(owner_id)
        .bind(document_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn mark_failed(&self, owner_id: &str, document_id: &str, error_code: &str) -> Result<()> {
        sqlx::query(
            "UPDATE documents SET processing_status = 'failed', error_code = ?, updated_at = ? WHERE owner_id = ? AND id = ?",
        )
        .bind(error_code)
        .bind(Utc::now().timestamp())
        .bind(owner_id)
        .bind(document_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get(&self, owner_id: &str, document_id: &str) -> Result<Option<DocumentRecord>> {
        let row = sqlx::query(
            "SELECT id, owner_id, name, processing_status, error_code, chunk_count FROM documents WHERE owner_id = ? AND id = ?",
        )
        .bind(owner_id)
        .bind(document_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|r| {
            let status: String = r.get("processing_status");
            let chunk_count: i64 = r.get("chunk_count");
            DocumentRecord {
                id: r.get("id"),
                owner_id: r.get("owner_id"),
                name: r.get("name"),
                status: match status.as_str() {
                    "completed" => ProcessingStatus::Completed,
                    "failed" => ProcessingStatus::Failed,
                    _ => ProcessingStatus::Processing,
                },
                error_code: r.get("error_code"),
                chunk_count: chunk_count as usize,
            }
        }))
    }

    async fn delete(&self, owner_id: &str, document_id: &str) -> Result<()> {
        sqlx::query("DELETE FROM documents WHERE owner_id = ? AND id = ?")
            .bind(owner_id)
            .bind(document_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

/// SQLite-backed [`UsageSink`] (append-only `usage_events` table).
pub struct SqliteUsageSink {
    pool: SqlitePool,
}

impl SqliteUsageSink {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl UsageSink for SqliteUsageSink {
    async fn record(&self, event: UsageEvent) -> Result<()> {
        sqlx::query(
            "INSERT INTO usage_events (owner_id, action, detail_json, created_at) VALUES (?, ?, ?, ?)",
        )
        .bind(&event.owner_id)
        .bind(event.action.as_str())
        .bind(serde_json::to_string(&event.detail)?)
        .bind(event.created_at.timestamp())
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db;
    use crate::models::UsageAction;

    #[tokio::test]
    async fn test_memory_registry_lifecycle() {
        let reg = InMemoryRegistry::new();
        reg.mark_processing("u1", "doc1", "notes.txt").await.unwrap();
        let rec = reg.get("u1", "doc1").await.unwrap().unwrap();
        assert_eq!(rec.status, ProcessingStatus::Processing);

        reg.mark_completed("u1", "doc1", 3).await.unwrap();
        let rec = reg.get("u1", "doc1").await.unwrap().unwrap();
        assert_eq!(rec.status, ProcessingStatus::Completed);
        assert_eq!(rec.chunk_count, 3);

        reg.mark_failed("u1", "doc1", "embedding_count_mismatch")
            .await
            .unwrap();
        let rec = reg.get("u1", "doc1").await.unwrap().unwrap();
        assert_eq!(rec.status, ProcessingStatus::Failed);
        assert_eq!(rec.error_code.as_deref(), Some("embedding_count_mismatch"));

        reg.delete("u1", "doc1").await.unwrap();
        assert!(reg.get("u1", "doc1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_sqlite_registry_lifecycle() {
        let tmp = tempfile::tempdir().unwrap();
        let pool = db::connect(&tmp.path().join("db.sqlite")).await.unwrap();
        db::init_schema(&pool).await.unwrap();
        let reg = SqliteRegistry::new(pool.clone());

        reg.mark_processing("u1", "doc1", "notes.txt").await.unwrap();
        reg.mark_completed("u1", "doc1", 5).await.unwrap();
        let rec = reg.get("u1", "doc1").await.unwrap().unwrap();
        assert_eq!(rec.status, ProcessingStatus::Completed);
        assert_eq!(rec.chunk_count, 5);

        // Re-processing resets status without duplicating the row.
        reg.mark_processing("u1", "doc1", "notes.txt").await.unwrap();
        let rec = reg.get("u1", "doc1").await.unwrap().unwrap();
        assert_eq!(rec.status, ProcessingStatus::Processing);

        let sink = SqliteUsageSink::new(pool);
        sink.record(UsageEvent::new(
            "u1",
            UsageAction::DocumentProcessed,
            serde_json::json!({ "chunks": 5 }),
        ))
        .await
        .unwrap();
    }
}
