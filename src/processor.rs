//! Document processing orchestration.
//!
//! Coordinates the full ingestion flow: chunk → embed → store → status
//! update → usage record. Also owns search, delete, reprocess, and
//! bounded-concurrency batch operations.
//!
//! Failure semantics (see `error`):
//! - zero chunks → `ExtractionEmpty`, document marked failed
//! - embedding/vector count mismatch → fatal for that document, no
//!   partial vector-store writes
//! - any step failing → document marked failed, original error
//!   surfaced to the caller
//! - usage-sink failures → logged, never block the success path

use std::sync::Arc;

use chrono::Utc;
use futures::future::join_all;
use tracing::{debug, info, warn};

use crate::chunk::chunk_text;
use crate::config::{ChunkingConfig, RetrievalConfig};
use crate::embedding::EmbeddingGateway;
use crate::error::PipelineError;
use crate::models::{
    ChunkMetadata, SearchHit, UsageAction, UsageEvent, VectorRecord,
};
use crate::registry::{DocumentRegistry, UsageSink};
use crate::store::{SearchOptions, VectorStore};

/// Input for one document ingestion. Text extraction from raw file
/// bytes happens upstream; the processor only consumes plain text.
#[derive(Debug, Clone)]
pub struct IngestRequest {
    pub owner_id: String,
    pub document_id: String,
    pub document_name: String,
    pub text: String,
    /// Caller-supplied metadata, stored under each record's `extra`.
    pub metadata: std::collections::BTreeMap<String, serde_json::Value>,
}

/// Outcome of a batch ingestion. Partial failure is expected and must
/// not abort sibling documents, so this is a result set, not an error.
#[derive(Debug, Default)]
pub struct BatchOutcome {
    pub successful: Vec<String>,
    pub failed: Vec<(String, PipelineError)>,
}

/// Orchestrates chunking, embedding, and vector storage.
///
/// Holds its collaborators explicitly — one processor per process or
/// request scope, no hidden global instance.
pub struct DocumentProcessor {
    embedding: Arc<dyn EmbeddingGateway>,
    vectors: Arc<dyn VectorStore>,
    registry: Arc<dyn DocumentRegistry>,
    usage: Arc<dyn UsageSink>,
    chunking: ChunkingConfig,
    retrieval: RetrievalConfig,
}

impl DocumentProcessor {
    pub fn new(
        embedding: Arc<dyn EmbeddingGateway>,
        vectors: Arc<dyn VectorStore>,
        registry: Arc<dyn DocumentRegistry>,
        usage: Arc<dyn UsageSink>,
        chunking: ChunkingConfig,
        retrieval: RetrievalConfig,
    ) -> Self {
        Self {
            embedding,
            vectors,
            registry,
            usage,
            chunking,
            retrieval,
        }
    }

    /// Ingest one document: chunk, batch-embed, store vectors, update
    /// status, record usage.
    ///
    /// On failure at any step the document is marked `failed` with the
    /// error's machine code and the original error is returned.
    pub async fn process_document(&self, req: &IngestRequest) -> Result<(), PipelineError> {
        self.registry
            .mark_processing(&req.owner_id, &req.document_id, &req.document_name)
            .await
            .map_err(PipelineError::Registry)?;

        match self.process_inner(req).await {
            Ok(chunk_count) => {
                self.registry
                    .mark_completed(&req.owner_id, &req.document_id, chunk_count)
                    .await
                    .map_err(PipelineError::Registry)?;
                self.record_usage(UsageEvent::new(
                    &req.owner_id,
                    UsageAction::DocumentProcessed,
                    serde_json::json!({
                        "document_id": req.document_id,
                        "chunks": chunk_count,
                    }),
                ))
                .await;
                info!(
                    document = %req.document_id,
                    chunks = chunk_count,
                    "document processed"
                );
                Ok(())
            }
            Err(err) => {
                // Surface the original error; the failed status is the
                // user-visible record of what happened.
                if let Err(reg_err) = self
                    .registry
                    .mark_failed(&req.owner_id, &req.document_id, err.code())
                    .await
                {
                    warn!(document = %req.document_id, error = %reg_err, "failed to mark document failed");
                }
                Err(err)
            }
        }
    }

    async fn process_inner(&self, req: &IngestRequest) -> Result<usize, PipelineError> {
        let chunks = chunk_text(
            &req.owner_id,
            &req.document_id,
            &req.text,
            self.chunking.chunk_size,
            self.chunking.overlap,
        );

        if chunks.is_empty() {
            return Err(PipelineError::ExtractionEmpty {
                document_id: req.document_id.clone(),
            });
        }

        let texts: Vec<String> = chunks.iter().map(|c| c.content.clone()).collect();
        let batch = self
            .embedding
            .embed_batch(&texts)
            .await
            .map_err(PipelineError::Embedding)?;

        // Hard postcondition: one vector per chunk. A mismatch would
        // silently misalign every chunk's semantic identity, so no
        // partial writes happen past this point.
        if batch.embeddings.len() != chunks.len() {
            return Err(PipelineError::EmbeddingCountMismatch {
                document_id: req.document_id.clone(),
                expected: chunks.len(),
                actual: batch.embeddings.len(),
            });
        }

        let created_at = Utc::now();
        let records: Vec<VectorRecord> = chunks
            .iter()
            .zip(batch.embeddings.into_iter())
            .map(|(chunk, embedding)| VectorRecord {
                id: VectorRecord::record_id(&req.document_id, chunk.chunk_index),
                embedding,
                content: chunk.content.clone(),
                metadata: ChunkMetadata {
                    document_id: req.document_id.clone(),
                    document_name: req.document_name.clone(),
                    chunk_index: chunk.chunk_index,
                    owner_id: req.owner_id.clone(),
                    created_at,
                    embedding_model: batch.model.clone(),
                    embedding_dimensions: batch.dimensions,
                    extra: req.metadata.clone(),
                },
            })
            .collect();

        let count = records.len();
        self.vectors
            .add(&req.owner_id, records)
            .await
            .map_err(PipelineError::VectorStore)?;

        Ok(count)
    }

    /// Embed the query once and run owner-scoped similarity search.
    pub async fn search_documents(
        &self,
        owner_id: &str,
        query: &str,
        options: Option<SearchOptions>,
    ) -> Result<Vec<SearchHit>, PipelineError> {
        let options = options.unwrap_or(SearchOptions {
            limit: self.retrieval.limit,
            threshold: self.retrieval.threshold,
            file_ids: None,
        });

        let embedded = self
            .embedding
            .embed(query)
            .await
            .map_err(PipelineError::Embedding)?;

        let hits = self
            .vectors
            .search(owner_id, &embedded.vector, &options)
            .await
            .map_err(PipelineError::VectorStore)?;

        debug!(owner = owner_id, hits = hits.len(), "search complete");

        self.record_usage(UsageEvent::new(
            owner_id,
            UsageAction::Search,
            serde_json::json!({ "hits": hits.len() }),
        ))
        .await;

        Ok(hits)
    }

    /// Delete a document's vectors, then its registry record.
    ///
    /// Ordering matters: if the record deletion fails after the vectors
    /// are gone, the document stays listed (visible failure) instead of
    /// leaving orphaned vectors consuming storage invisibly.
    pub async fn delete_document(
        &self,
        owner_id: &str,
        document_id: &str,
    ) -> Result<(), PipelineError> {
        self.vectors
            .delete_document(owner_id, document_id)
            .await
            .map_err(PipelineError::VectorStore)?;

        self.registry
            .delete(owner_id, document_id)
            .await
            .map_err(PipelineError::Registry)?;

        info!(document = document_id, "document deleted");
        Ok(())
    }

    /// Prepare a document for re-ingestion.
    ///
    /// Idempotent: a `completed` document is a no-op unless `force`.
    /// Otherwise clears existing vectors and flips the status back to
    /// `processing` — extraction itself happens upstream.
    pub async fn reprocess_document(
        &self,
        owner_id: &str,
        document_id: &str,
        force: bool,
    ) -> Result<bool, PipelineError> {
        let record = match self
            .registry
            .get(owner_id, document_id)
            .await
            .map_err(PipelineError::Registry)?
        {
            Some(rec) => rec,
            None => {
                // Never registered: nothing to reset, and marking it
                // processing would fabricate a phantom record.
                debug!(document = document_id, "not registered, skipping reprocess");
                return Ok(false);
            }
        };

        if record.status == crate::models::ProcessingStatus::Completed && !force {
            debug!(document = document_id, "already processed, skipping");
            return Ok(false);
        }

        self.vectors
            .delete_document(owner_id, document_id)
            .await
            .map_err(PipelineError::VectorStore)?;

        self.registry
            .mark_processing(owner_id, document_id, &record.name)
            .await
            .map_err(PipelineError::Registry)?;

        Ok(true)
    }

    /// Process documents in fixed-size concurrency windows.
    ///
    /// Each window runs fully in parallel before the next starts,
    /// bounding fan-out toward the embedding gateway and vector store.
    /// Per-document failures are collected, never propagated — partial
    /// batch failure is expected and must not abort siblings.
    pub async fn batch_process_documents(&self, requests: Vec<IngestRequest>) -> BatchOutcome {
        let mut outcome = BatchOutcome::default();
        let window = self.retrieval.batch_window.max(1);

        for group in requests.chunks(window) {
            let futures = group.iter().map(|req| async move {
                let result = self.process_document(req).await;
                (req.document_id.clone(), result)
            });

            for (document_id, result) in join_all(futures).await {
                match result {
                    Ok(()) => outcome.successful.push(document_id),
                    Err(err) => {
                        warn!(document = %document_id, error = %err, "batch document failed");
                        outcome.failed.push((document_id, err));
                    }
                }
            }
        }

        outcome
    }

    async fn record_usage(&self, event: UsageEvent) {
        // Usage logging must never block the primary operation.
        if let Err(err) = self.usage.record(event).await {
            warn!(error = %err, "usage sink failure ignored");
        }
    }
}
