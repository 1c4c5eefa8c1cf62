//! The query-time pipeline: classify, retrieve, route, validate,
//! generate, persist.
//!
//! One query runs strictly sequentially and is non-cancellable
//! mid-flight; callers needing cancellation wrap the whole call with an
//! external timeout. Retry policy belongs to the collaborators, never
//! here.

use std::sync::Arc;

use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::classify::{classify, TaskType};
use crate::config::{ConfidenceConfig, RetrievalConfig};
use crate::confidence::{evaluate, RetrievalConfidence};
use crate::conversation::ConversationStore;
use crate::embedding::EmbeddingGateway;
use crate::error::PipelineError;
use crate::generation::{GenerationBackend, GenerationRequest};
use crate::models::{
    ConversationTurn, Role, SearchHit, SourceRef, UsageAction, UsageEvent,
};
use crate::provenance::{ProvenanceBuilder, ProvenanceRecord};
use crate::registry::UsageSink;
use crate::router::{route, validate_decision, RouteContext, Tier};
use crate::store::{SearchOptions, VectorStore};

/// One chat request. Tier and key presence come from the caller's
/// session; billing and auth are upstream concerns.
#[derive(Debug, Clone)]
pub struct ChatRequest {
    pub owner_id: String,
    pub message: String,
    /// Continue an existing conversation, or start a new one.
    pub conversation_id: Option<String>,
    pub tier: Tier,
    pub accuracy_mode: bool,
    pub has_byok_key: bool,
}

/// The pipeline's answer to one chat request.
#[derive(Debug, Clone)]
pub struct ChatResponse {
    pub conversation_id: String,
    pub response: String,
    pub sources: Vec<SourceRef>,
    pub provenance: ProvenanceRecord,
}

/// Chains classification, retrieval, routing, safety validation,
/// generation, provenance, and turn persistence for one query.
pub struct ChatPipeline {
    embedding: Arc<dyn EmbeddingGateway>,
    vectors: Arc<dyn VectorStore>,
    conversations: Arc<dyn ConversationStore>,
    backend: Arc<dyn GenerationBackend>,
    usage: Arc<dyn UsageSink>,
    retrieval: RetrievalConfig,
    confidence: ConfidenceConfig,
}

impl ChatPipeline {
    pub fn new(
        embedding: Arc<dyn EmbeddingGateway>,
        vectors: Arc<dyn VectorStore>,
        conversations: Arc<dyn ConversationStore>,
        backend: Arc<dyn GenerationBackend>,
        usage: Arc<dyn UsageSink>,
        retrieval: RetrievalConfig,
        confidence: ConfidenceConfig,
    ) -> Self {
        Self {
            embedding,
            vectors,
            conversations,
            backend,
            usage,
            retrieval,
            confidence,
        }
    }

    /// Run the full pipeline for one request.
    pub async fn chat(&self, request: &ChatRequest) -> Result<ChatResponse, PipelineError> {
        let conversation_id = request
            .conversation_id
            .clone()
            .unwrap_or_else(|| Uuid::new_v4().to_string());

        // History is read before the new user turn lands; the user
        // message itself goes last in the prompt, not via history.
        let history = self
            .conversations
            .history(&request.owner_id, &conversation_id)
            .await
            .map_err(PipelineError::Conversation)?;

        self.conversations
            .append_turn(&ConversationTurn {
                conversation_id: conversation_id.clone(),
                owner_id: request.owner_id.clone(),
                role: Role::User,
                content: request.message.clone(),
                sources: Vec::new(),
                metadata: serde_json::Value::Null,
            })
            .await
            .map_err(PipelineError::Conversation)?;

        let mut provenance = ProvenanceBuilder::new();

        let classification = classify(&request.message);
        debug!(
            task_type = classification.task_type.as_str(),
            confidence = classification.confidence,
            "query classified"
        );
        provenance.record_classification(&classification)?;

        let (hits, confidence, performed) =
            if classification.task_type == TaskType::DocGrounded {
                let hits = self.retrieve(&request.owner_id, &request.message).await?;
                let confidence = evaluate(&hits, &self.confidence);
                debug!(
                    level = confidence.level.as_str(),
                    top_score = confidence.score.top_score,
                    "retrieval evaluated"
                );
                (hits, confidence, true)
            } else {
                (Vec::new(), RetrievalConfidence::not_retrieved(), false)
            };
        provenance.record_retrieval(&confidence, performed)?;

        let ctx = RouteContext {
            tier: request.tier,
            classification,
            confidence,
            accuracy_mode: request.accuracy_mode,
            has_byok_key: request.has_byok_key,
        };
        let decision = route(&ctx);

        // Defense-in-depth: a routing bug must never reach generation.
        if let Err(violation) = validate_decision(&decision, &ctx) {
            warn!(violation = %violation, "routing decision rejected");
            return Err(PipelineError::RoutingSafetyViolation(violation));
        }
        provenance.record_routing(&decision)?;

        let (response_text, sources, input_tokens, output_tokens) = match decision.model {
            Some(model) if decision.should_respond => {
                let output = self
                    .backend
                    .generate(&GenerationRequest {
                        model,
                        context: hits.clone(),
                        history,
                        message: request.message.clone(),
                    })
                    .await
                    .map_err(PipelineError::Generation)?;
                let sources = hits
                    .iter()
                    .map(|h| SourceRef {
                        source: h.source.clone(),
                        content: h.content.clone(),
                        relevance_score: h.relevance,
                    })
                    .collect();
                (output.text, sources, output.input_tokens, output.output_tokens)
            }
            _ => {
                // Canned refusal; validated non-empty above.
                let message = decision.response_message.clone().unwrap_or_default();
                (message, Vec::new(), 0, 0)
            }
        };
        provenance.record_generation(input_tokens, output_tokens)?;

        let record = provenance.build()?;

        self.conversations
            .append_turn(&ConversationTurn {
                conversation_id: conversation_id.clone(),
                owner_id: request.owner_id.clone(),
                role: Role::Assistant,
                content: response_text.clone(),
                sources: sources.clone(),
                metadata: serde_json::json!({
                    "provenance": serde_json::to_value(&record)
                        .map_err(|e| PipelineError::Conversation(e.into()))?,
                }),
            })
            .await
            .map_err(PipelineError::Conversation)?;

        if let Err(err) = self
            .usage
            .record(UsageEvent::new(
                &request.owner_id,
                UsageAction::ChatMessage,
                serde_json::json!({
                    "conversation_id": conversation_id,
                    "model": record.routing.model.map(|m| m.as_str()),
                    "input_tokens": input_tokens,
                    "output_tokens": output_tokens,
                }),
            ))
            .await
        {
            warn!(error = %err, "usage sink failure ignored");
        }

        info!(
            conversation = %conversation_id,
            responded = record.routing.should_respond,
            "chat exchange complete"
        );

        Ok(ChatResponse {
            conversation_id,
            response: response_text,
            sources,
            provenance: record,
        })
    }

    async fn retrieve(
        &self,
        owner_id: &str,
        query: &str,
    ) -> Result<Vec<SearchHit>, PipelineError> {
        let embedded = self
            .embedding
            .embed(query)
            .await
            .map_err(PipelineError::Embedding)?;
        self.vectors
            .search(
                owner_id,
                &embedded.vector,
                &SearchOptions {
                    limit: self.retrieval.limit,
                    threshold: self.retrieval.threshold,
                    file_ids: None,
                },
            )
            .await
            .map_err(PipelineError::VectorStore)
    }
}
