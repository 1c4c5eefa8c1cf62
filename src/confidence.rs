//! Retrieval confidence evaluation.
//!
//! A pure numeric gate over ranked similarity scores. It never inspects
//! chunk content, so the router's safety invariants can be re-checked
//! later without re-running retrieval.

use serde::Serialize;

use crate::config::ConfidenceConfig;
use crate::models::SearchHit;

/// Discrete judgment of retrieval evidence strength.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConfidenceLevel {
    None,
    Low,
    Medium,
    High,
}

impl ConfidenceLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConfidenceLevel::None => "none",
            ConfidenceLevel::Low => "low",
            ConfidenceLevel::Medium => "medium",
            ConfidenceLevel::High => "high",
        }
    }
}

/// Numeric breakdown behind a confidence judgment.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct RetrievalScore {
    /// Best similarity among candidates.
    pub top_score: f64,
    /// Candidates at or above the relevance floor.
    pub matched_chunks: usize,
    /// Mean similarity over matched candidates only.
    pub average_score: f64,
    /// All candidates considered.
    pub total_chunks: usize,
}

/// The evaluator's verdict for one retrieval pass.
#[derive(Debug, Clone, Serialize)]
pub struct RetrievalConfidence {
    pub level: ConfidenceLevel,
    /// True only at `medium` or `high`. The router refuses
    /// document-grounded answers when this is false.
    pub is_sufficient: bool,
    pub score: RetrievalScore,
    pub reasoning: String,
}

impl RetrievalConfidence {
    /// Verdict for a query where retrieval never ran.
    pub fn not_retrieved() -> Self {
        Self {
            level: ConfidenceLevel::None,
            is_sufficient: false,
            score: RetrievalScore {
                top_score: 0.0,
                matched_chunks: 0,
                average_score: 0.0,
                total_chunks: 0,
            },
            reasoning: "retrieval not performed for this task type".to_string(),
        }
    }
}

/// Evaluate ranked retrieval hits into a [`RetrievalConfidence`].
///
/// Pure function of the similarity scores: identical inputs always
/// yield the identical verdict. Zero hits always map to
/// `level=none, is_sufficient=false`.
pub fn evaluate(hits: &[SearchHit], cfg: &ConfidenceConfig) -> RetrievalConfidence {
    if hits.is_empty() {
        return RetrievalConfidence {
            level: ConfidenceLevel::None,
            is_sufficient: false,
            score: RetrievalScore {
                top_score: 0.0,
                matched_chunks: 0,
                average_score: 0.0,
                total_chunks: 0,
            },
            reasoning: "no chunks retrieved".to_string(),
        };
    }

    let top_score = hits
        .iter()
        .map(|h| h.relevance)
        .fold(f64::NEG_INFINITY, f64::max);
    let matched: Vec<f64> = hits
        .iter()
        .map(|h| h.relevance)
        .filter(|r| *r >= cfg.relevance_floor)
        .collect();
    let matched_chunks = matched.len();
    let average_score = if matched_chunks > 0 {
        matched.iter().sum::<f64>() / matched_chunks as f64
    } else {
        0.0
    };

    let level = if top_score >= cfg.high {
        ConfidenceLevel::High
    } else if top_score >= cfg.medium {
        ConfidenceLevel::Medium
    } else if top_score >= cfg.relevance_floor {
        ConfidenceLevel::Low
    } else {
        ConfidenceLevel::None
    };
    let is_sufficient = matches!(level, ConfidenceLevel::Medium | ConfidenceLevel::High);

    let reasoning = format!(
        "top score {:.3} over {} chunks ({} above floor {:.2}, avg {:.3}) -> {}",
        top_score,
        hits.len(),
        matched_chunks,
        cfg.relevance_floor,
        average_score,
        level.as_str()
    );

    RetrievalConfidence {
        level,
        is_sufficient,
        score: RetrievalScore {
            top_score,
            matched_chunks,
            average_score,
            total_chunks: hits.len(),
        },
        reasoning,
    }
}
