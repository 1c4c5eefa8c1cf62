//! Tier-aware model routing and independent safety validation.
//!
//! Routing is a decision table over closed enums, not free-form
//! inference. Adding a tier or task type forces every match below to be
//! revisited at compile time.

use serde::Serialize;

use crate::classify::{TaskClassification, TaskType};
use crate::confidence::RetrievalConfidence;

/// Refusal text for queries the pipeline cannot serve at all.
pub const UNSUPPORTED_MESSAGE: &str =
    "I can only help with questions about your documents or general knowledge. \
     I can't generate images, video, or audio.";

/// Refusal text when document-grounded retrieval is too weak to answer
/// from.
pub const INSUFFICIENT_CONTEXT_MESSAGE: &str =
    "I couldn't find enough relevant information in your documents to answer \
     that confidently. Try rephrasing, or upload a document that covers it.";

/// The caller's subscription level. Bounds which models routing may
/// select.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Tier {
    Free,
    Pro,
    ProByok,
}

impl Tier {
    pub fn as_str(&self) -> &'static str {
        match self {
            Tier::Free => "free",
            Tier::Pro => "pro",
            Tier::ProByok => "pro_byok",
        }
    }

    /// Models this tier is entitled to use, in preference order.
    pub fn allowed_models(&self) -> &'static [ModelId] {
        match self {
            Tier::Free => &[ModelId::Gpt35Turbo],
            Tier::Pro => &[ModelId::Gpt35Turbo, ModelId::Gpt4Turbo],
            // A BYOK user without a stored key falls back to the
            // platform baseline model.
            Tier::ProByok => &[ModelId::Byok, ModelId::Gpt35Turbo],
        }
    }

    /// Usage ceilings for this tier. Enforcement lives upstream; the
    /// pipeline only surfaces usage events against these numbers.
    pub fn limits(&self) -> TierLimits {
        match self {
            Tier::Free => TierLimits {
                documents: 10,
                chat_messages: 100,
                api_calls: 1_000,
                storage_bytes: 100 * 1024 * 1024,
            },
            Tier::Pro => TierLimits {
                documents: 1_000,
                chat_messages: 1_000,
                api_calls: 10_000,
                storage_bytes: 10 * 1024 * 1024 * 1024,
            },
            Tier::ProByok => TierLimits {
                documents: 10_000,
                chat_messages: 5_000,
                api_calls: 50_000,
                storage_bytes: 100 * 1024 * 1024 * 1024,
            },
        }
    }
}

/// Per-tier usage ceilings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TierLimits {
    pub documents: u64,
    pub chat_messages: u64,
    pub api_calls: u64,
    pub storage_bytes: u64,
}

/// A generation backend the router can select. Serializes as its wire
/// model name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelId {
    #[serde(rename = "gpt-3.5-turbo")]
    Gpt35Turbo,
    #[serde(rename = "gpt-4-turbo")]
    Gpt4Turbo,
    /// The user's own key and model, for `pro_byok` callers.
    Byok,
}

impl ModelId {
    pub fn as_str(&self) -> &'static str {
        match self {
            ModelId::Gpt35Turbo => "gpt-3.5-turbo",
            ModelId::Gpt4Turbo => "gpt-4-turbo",
            ModelId::Byok => "byok",
        }
    }
}

/// Everything the router needs to decide one query.
#[derive(Debug, Clone)]
pub struct RouteContext {
    pub tier: Tier,
    pub classification: TaskClassification,
    pub confidence: RetrievalConfidence,
    /// Caller asked for the stronger model where the tier permits one.
    pub accuracy_mode: bool,
    /// Whether a `pro_byok` caller has a stored API key.
    pub has_byok_key: bool,
}

/// The router's verdict for one query.
///
/// When `should_respond` is false, `model` is `None` and
/// `response_message` carries the canned refusal. When true, `model` is
/// set and drawn from the tier's allowed set.
#[derive(Debug, Clone, Serialize)]
pub struct RoutingDecision {
    pub model: Option<ModelId>,
    pub should_respond: bool,
    pub response_message: Option<String>,
    pub reasoning: String,
}

impl RoutingDecision {
    fn refuse(message: &str, reasoning: String) -> Self {
        Self {
            model: None,
            should_respond: false,
            response_message: Some(message.to_string()),
            reasoning,
        }
    }

    fn respond(model: ModelId, reasoning: String) -> Self {
        Self {
            model: Some(model),
            should_respond: true,
            response_message: None,
            reasoning,
        }
    }
}

/// Decide which backend (if any) handles this query.
///
/// Hard rules first: unsupported task types and weak document-grounded
/// retrieval refuse unconditionally. No tier, confidence level, or
/// accuracy mode overrides either.
pub fn route(ctx: &RouteContext) -> RoutingDecision {
    match ctx.classification.task_type {
        TaskType::Unsupported => {
            return RoutingDecision::refuse(
                UNSUPPORTED_MESSAGE,
                "task type is unsupported".to_string(),
            );
        }
        TaskType::DocGrounded if !ctx.confidence.is_sufficient => {
            return RoutingDecision::refuse(
                INSUFFICIENT_CONTEXT_MESSAGE,
                format!(
                    "doc-grounded query with insufficient retrieval ({})",
                    ctx.confidence.level.as_str()
                ),
            );
        }
        _ => {}
    }

    let (model, why) = match ctx.tier {
        Tier::Free => (ModelId::Gpt35Turbo, "free tier baseline"),
        Tier::Pro => {
            if ctx.accuracy_mode {
                (ModelId::Gpt4Turbo, "pro tier, accuracy mode")
            } else {
                (ModelId::Gpt35Turbo, "pro tier baseline")
            }
        }
        Tier::ProByok => {
            if ctx.has_byok_key {
                (ModelId::Byok, "byok tier with stored key")
            } else {
                (ModelId::Gpt35Turbo, "byok tier without key, baseline fallback")
            }
        }
    };

    let mut reasoning = format!(
        "{} task on {} tier -> {} ({})",
        ctx.classification.task_type.as_str(),
        ctx.tier.as_str(),
        model.as_str(),
        why
    );
    if ctx.classification.task_type == TaskType::Realtime {
        reasoning.push_str("; no live data source, answering from model knowledge");
    }

    RoutingDecision::respond(model, reasoning)
}

/// Independently re-derive the hard routing invariants.
///
/// Deliberately does not call [`route`]: a bug that weakens the
/// decision table must not silently reach generation. Callers treat a
/// validation failure as fatal for the request.
pub fn validate_decision(decision: &RoutingDecision, ctx: &RouteContext) -> Result<(), String> {
    if ctx.classification.task_type == TaskType::Unsupported && decision.should_respond {
        return Err("unsupported task type must never respond".to_string());
    }

    if ctx.classification.task_type == TaskType::DocGrounded
        && !ctx.confidence.is_sufficient
        && decision.should_respond
    {
        return Err("doc-grounded query with insufficient retrieval must not respond".to_string());
    }

    if decision.should_respond {
        match decision.model {
            None => return Err("responding decision carries no model".to_string()),
            Some(model) => {
                if !ctx.tier.allowed_models().contains(&model) {
                    return Err(format!(
                        "model {} not allowed for tier {}",
                        model.as_str(),
                        ctx.tier.as_str()
                    ));
                }
            }
        }
    } else {
        if decision.model.is_some() {
            return Err("refusing decision must not carry a model".to_string());
        }
        match &decision.response_message {
            Some(msg) if !msg.is_empty() => {}
            _ => return Err("refusing decision must carry a response message".to_string()),
        }
    }

    Ok(())
}
