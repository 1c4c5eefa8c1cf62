//! Pipeline error taxonomy.
//!
//! Every failure mode that crosses a component boundary gets its own
//! variant with a stable machine-readable code, so callers can react
//! per class without parsing messages. User-facing surfaces return the
//! code, never an internal backtrace.

use thiserror::Error;

use crate::provenance::ProvenanceError;

/// Errors produced by the ingestion and chat pipeline.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// Zero chunks were produced from non-empty input. Logged, document
    /// marked failed; never a crash for sibling documents.
    #[error("no chunks extracted from document {document_id}")]
    ExtractionEmpty { document_id: String },

    /// The embedding gateway returned a different number of vectors
    /// than chunks sent. Fatal for the document: silent misalignment
    /// would corrupt every chunk's semantic identity.
    #[error("embedding count mismatch for document {document_id}: sent {expected} chunks, got {actual} vectors")]
    EmbeddingCountMismatch {
        document_id: String,
        expected: usize,
        actual: usize,
    },

    /// The embedding gateway call itself failed.
    #[error("embedding gateway error: {0}")]
    Embedding(#[source] anyhow::Error),

    /// A vector-store add/search/delete failed.
    #[error("vector store error: {0}")]
    VectorStore(#[source] anyhow::Error),

    /// Document registry (status/record persistence) failed.
    #[error("document registry error: {0}")]
    Registry(#[source] anyhow::Error),

    /// A routing decision failed independent safety validation. Fatal
    /// for the request; generation is never attempted.
    #[error("routing safety violation: {0}")]
    RoutingSafetyViolation(String),

    /// The generation backend failed. No fallback model substitution.
    #[error("generation backend error: {0}")]
    Generation(#[source] anyhow::Error),

    /// Conversation persistence failed.
    #[error("conversation store error: {0}")]
    Conversation(#[source] anyhow::Error),

    /// Provenance builder was driven out of order — a programmer error
    /// surfaced fast rather than producing a partial audit record.
    #[error(transparent)]
    Provenance(#[from] ProvenanceError),
}

impl PipelineError {
    /// Stable machine-readable code for user-visible error responses.
    pub fn code(&self) -> &'static str {
        match self {
            PipelineError::ExtractionEmpty { .. } => "extraction_empty",
            PipelineError::EmbeddingCountMismatch { .. } => "embedding_count_mismatch",
            PipelineError::Embedding(_) => "embedding_failed",
            PipelineError::VectorStore(_) => "vector_store_failed",
            PipelineError::Registry(_) => "registry_failed",
            PipelineError::RoutingSafetyViolation(_) => "routing_safety_violation",
            PipelineError::Generation(_) => "generation_failed",
            PipelineError::Conversation(_) => "conversation_store_failed",
            PipelineError::Provenance(_) => "provenance_order_violation",
        }
    }
}
