//! Core data models used throughout the pipeline.
//!
//! These types represent the chunks, vector records, search hits, and
//! conversation turns that flow through ingestion and chat.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A bounded, ordered slice of a document's extracted text — the unit
/// of embedding. Immutable once embedded; `chunk_index` is a dense
/// 0-based sequence per document.
#[derive(Debug, Clone)]
pub struct Chunk {
    pub document_id: String,
    pub owner_id: String,
    pub chunk_index: i64,
    pub content: String,
}

/// Metadata attached to every vector record.
///
/// Fixed well-known fields plus one explicit `extra` escape hatch for
/// caller-supplied values, so callers cannot shadow required fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChunkMetadata {
    pub document_id: String,
    pub document_name: String,
    pub chunk_index: i64,
    pub owner_id: String,
    pub created_at: DateTime<Utc>,
    pub embedding_model: String,
    pub embedding_dimensions: usize,
    #[serde(default)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

/// A chunk's embedding plus metadata, as stored by the vector store.
///
/// One-to-one with a [`Chunk`]. The id is deterministic
/// (`{document_id}_{chunk_index}`), so re-ingesting the same document
/// overwrites rather than duplicates.
#[derive(Debug, Clone)]
pub struct VectorRecord {
    pub id: String,
    pub embedding: Vec<f32>,
    pub content: String,
    pub metadata: ChunkMetadata,
}

impl VectorRecord {
    /// Deterministic record id for a `(document, chunk_index)` pair.
    pub fn record_id(document_id: &str, chunk_index: i64) -> String {
        format!("{}_{}", document_id, chunk_index)
    }
}

/// A ranked result returned from vector search.
#[derive(Debug, Clone, Serialize)]
pub struct SearchHit {
    /// Chunk text.
    pub content: String,
    /// Document name the chunk came from.
    pub source: String,
    /// Parent document id.
    pub document_id: String,
    /// Cosine similarity mapped into `[0.0, 1.0]`.
    pub relevance: f64,
}

/// Processing status of an ingested document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProcessingStatus {
    Processing,
    Completed,
    Failed,
}

impl ProcessingStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProcessingStatus::Processing => "processing",
            ProcessingStatus::Completed => "completed",
            ProcessingStatus::Failed => "failed",
        }
    }
}

/// Who authored a conversation turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

/// A source citation attached to an assistant turn.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceRef {
    pub source: String,
    pub content: String,
    pub relevance_score: f64,
}

/// One persisted conversation turn. Created once per exchange and never
/// mutated; assistant turns carry sources and provenance metadata.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationTurn {
    pub conversation_id: String,
    pub owner_id: String,
    pub role: Role,
    pub content: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub sources: Vec<SourceRef>,
    /// Free-form turn metadata; assistant turns store the frozen
    /// provenance record under the `provenance` key.
    #[serde(default, skip_serializing_if = "serde_json::Value::is_null")]
    pub metadata: serde_json::Value,
}

/// A usage event emitted by the pipeline for billing and telemetry.
#[derive(Debug, Clone, Serialize)]
pub struct UsageEvent {
    pub owner_id: String,
    pub action: UsageAction,
    pub detail: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

impl UsageEvent {
    pub fn new(owner_id: &str, action: UsageAction, detail: serde_json::Value) -> Self {
        Self {
            owner_id: owner_id.to_string(),
            action,
            detail,
            created_at: Utc::now(),
        }
    }
}

/// The kind of operation a [`UsageEvent`] records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum UsageAction {
    DocumentProcessed,
    Search,
    ChatMessage,
}

impl UsageAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            UsageAction::DocumentProcessed => "document_processed",
            UsageAction::Search => "search",
            UsageAction::ChatMessage => "chat_message",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_id_format() {
        assert_eq!(VectorRecord::record_id("doc1", 0), "doc1_0");
        assert_eq!(VectorRecord::record_id("doc1", 12), "doc1_12");
    }

    #[test]
    fn test_metadata_extra_roundtrip() {
        let mut extra = BTreeMap::new();
        extra.insert("mime_type".to_string(), serde_json::json!("text/plain"));
        let meta = ChunkMetadata {
            document_id: "d1".into(),
            document_name: "notes.txt".into(),
            chunk_index: 2,
            owner_id: "u1".into(),
            created_at: Utc::now(),
            embedding_model: "text-embedding-3-small".into(),
            embedding_dimensions: 1536,
            extra,
        };
        let json = serde_json::to_string(&meta).unwrap();
        let back: ChunkMetadata = serde_json::from_str(&json).unwrap();
        assert_eq!(back, meta);
    }
}
