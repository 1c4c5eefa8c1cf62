//! Provenance tracking for generated answers.
//!
//! A builder accumulates classification, retrieval, routing, and
//! generation facts in that fixed order, then freezes them into one
//! immutable record attached verbatim to the persisted assistant turn.
//! Out-of-order or duplicate calls are programmer errors and fail
//! fast instead of producing a partial audit record.

use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;

use crate::classify::{TaskClassification, TaskType};
use crate::confidence::{ConfidenceLevel, RetrievalConfidence, RetrievalScore};
use crate::router::{ModelId, RoutingDecision};

/// Builder driven out of its fixed stage order.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ProvenanceError {
    #[error("provenance builder expected stage {expected}, got {attempted}")]
    OutOfOrder {
        expected: &'static str,
        attempted: &'static str,
    },
}

/// Classification facts for one answer.
#[derive(Debug, Clone, Serialize)]
pub struct ClassificationFacts {
    pub task_type: TaskType,
    pub doc_intent: bool,
    pub realtime_intent: bool,
    pub confidence: f64,
}

/// Retrieval facts for one answer. `performed` is false when the task
/// type skipped retrieval entirely.
#[derive(Debug, Clone, Serialize)]
pub struct RetrievalFacts {
    pub performed: bool,
    pub level: ConfidenceLevel,
    pub is_sufficient: bool,
    pub score: RetrievalScore,
    pub reasoning: String,
}

/// Routing facts for one answer. `model` is `None` for refusals.
#[derive(Debug, Clone, Serialize)]
pub struct RoutingFacts {
    pub model: Option<ModelId>,
    pub should_respond: bool,
    pub reasoning: String,
}

/// Generation facts for one answer. Refusals record zero tokens.
#[derive(Debug, Clone, Serialize)]
pub struct GenerationFacts {
    pub input_tokens: u32,
    pub output_tokens: u32,
}

/// The frozen audit trail for one answer: which classifier decision,
/// what retrieval evidence, which model, and token cost.
#[derive(Debug, Clone, Serialize)]
pub struct ProvenanceRecord {
    pub classification: ClassificationFacts,
    pub retrieval: RetrievalFacts,
    pub routing: RoutingFacts,
    pub generation: GenerationFacts,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug)]
enum Stage {
    Created,
    Classified(ClassificationFacts),
    Retrieved(ClassificationFacts, RetrievalFacts),
    Routed(ClassificationFacts, RetrievalFacts, RoutingFacts),
    Generated(
        ClassificationFacts,
        RetrievalFacts,
        RoutingFacts,
        GenerationFacts,
    ),
}

impl Stage {
    fn name(&self) -> &'static str {
        match self {
            Stage::Created => "created",
            Stage::Classified(..) => "classified",
            Stage::Retrieved(..) => "retrieved",
            Stage::Routed(..) => "routed",
            Stage::Generated(..) => "generated",
        }
    }
}

/// Scoped to one query; four write-once stage calls, then [`build`].
///
/// [`build`]: ProvenanceBuilder::build
#[derive(Debug)]
pub struct ProvenanceBuilder {
    stage: Stage,
}

impl Default for ProvenanceBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl ProvenanceBuilder {
    pub fn new() -> Self {
        Self {
            stage: Stage::Created,
        }
    }

    fn order_err(&self, attempted: &'static str) -> ProvenanceError {
        let expected = match self.stage {
            Stage::Created => "record_classification",
            Stage::Classified(..) => "record_retrieval",
            Stage::Retrieved(..) => "record_routing",
            Stage::Routed(..) => "record_generation",
            Stage::Generated(..) => "build",
        };
        ProvenanceError::OutOfOrder {
            expected,
            attempted,
        }
    }

    pub fn record_classification(
        &mut self,
        classification: &TaskClassification,
    ) -> Result<(), ProvenanceError> {
        match std::mem::replace(&mut self.stage, Stage::Created) {
            Stage::Created => {
                self.stage = Stage::Classified(ClassificationFacts {
                    task_type: classification.task_type,
                    doc_intent: classification.doc_intent,
                    realtime_intent: classification.realtime_intent,
                    confidence: classification.confidence,
                });
                Ok(())
            }
            other => {
                self.stage = other;
                Err(self.order_err("record_classification"))
            }
        }
    }

    /// `performed` distinguishes a real retrieval pass from a task type
    /// that never retrieves.
    pub fn record_retrieval(
        &mut self,
        confidence: &RetrievalConfidence,
        performed: bool,
    ) -> Result<(), ProvenanceError> {
        match std::mem::replace(&mut self.stage, Stage::Created) {
            Stage::Classified(c) => {
                self.stage = Stage::Retrieved(
                    c,
                    RetrievalFacts {
                        performed,
                        level: confidence.level,
                        is_sufficient: confidence.is_sufficient,
                        score: confidence.score,
                        reasoning: confidence.reasoning.clone(),
                    },
                );
                Ok(())
            }
            other => {
                self.stage = other;
                Err(self.order_err("record_retrieval"))
            }
        }
    }

    pub fn record_routing(&mut self, decision: &RoutingDecision) -> Result<(), ProvenanceError> {
        match std::mem::replace(&mut self.stage, Stage::Created) {
            Stage::Retrieved(c, r) => {
                self.stage = Stage::Routed(
                    c,
                    r,
                    RoutingFacts {
                        model: decision.model,
                        should_respond: decision.should_respond,
                        reasoning: decision.reasoning.clone(),
                    },
                );
                Ok(())
            }
            other => {
                self.stage = other;
                Err(self.order_err("record_routing"))
            }
        }
    }

    pub fn record_generation(
        &mut self,
        input_tokens: u32,
        output_tokens: u32,
    ) -> Result<(), ProvenanceError> {
        match std::mem::replace(&mut self.stage, Stage::Created) {
            Stage::Routed(c, r, d) => {
                self.stage = Stage::Generated(
                    c,
                    r,
                    d,
                    GenerationFacts {
                        input_tokens,
                        output_tokens,
                    },
                );
                Ok(())
            }
            other => {
                self.stage = other;
                Err(self.order_err("record_generation"))
            }
        }
    }

    /// Freeze the record. Fails unless all four stages have recorded.
    pub fn build(self) -> Result<ProvenanceRecord, ProvenanceError> {
        match self.stage {
            Stage::Generated(classification, retrieval, routing, generation) => {
                Ok(ProvenanceRecord {
                    classification,
                    retrieval,
                    routing,
                    generation,
                    created_at: Utc::now(),
                })
            }
            ref other => Err(ProvenanceError::OutOfOrder {
                expected: match other {
                    Stage::Created => "record_classification",
                    Stage::Classified(..) => "record_retrieval",
                    Stage::Retrieved(..) => "record_routing",
                    Stage::Routed(..) => "record_generation",
                    Stage::Generated(..) => "build",
                },
                attempted: "build",
            }),
        }
    }

    /// Current stage name, for debug logging.
    pub fn stage_name(&self) -> &'static str {
        self.stage.name()
    }
}
