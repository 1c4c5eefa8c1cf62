//! Task classification for incoming chat queries.
//!
//! The classifier is a policy gate: downstream routing treats the
//! resulting task type as authoritative. The numeric confidence is a
//! calibration signal for logging only and is never consulted when
//! routing.

use serde::Serialize;

/// The kind of request a query represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskType {
    /// Answerable from the user's own documents.
    DocGrounded,
    /// General-knowledge question.
    General,
    /// Needs live or time-sensitive data the pipeline cannot fetch.
    Realtime,
    /// Capability the pipeline does not provide at all.
    Unsupported,
}

impl TaskType {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskType::DocGrounded => "doc_grounded",
            TaskType::General => "general",
            TaskType::Realtime => "realtime",
            TaskType::Unsupported => "unsupported",
        }
    }
}

/// Result of classifying one query. Produced fresh per query; only ever
/// persisted as part of a provenance record.
#[derive(Debug, Clone, Serialize)]
pub struct TaskClassification {
    pub task_type: TaskType,
    pub doc_intent: bool,
    pub realtime_intent: bool,
    /// Calibration signal in `[0, 1]`; telemetry only.
    pub confidence: f64,
}

/// Requests for output modalities the pipeline has no backend for.
const UNSUPPORTED_MARKERS: &[&str] = &[
    "generate an image",
    "generate image",
    "create an image",
    "make an image",
    "draw a picture",
    "draw an image",
    "draw me a picture",
    "make a picture",
    "generate a video",
    "create a video",
    "make a video",
    "generate audio",
    "text to speech",
    "compose a song",
];

/// Phrases referring to the user's own uploaded material.
const DOC_MARKERS: &[&str] = &[
    "my document",
    "my documents",
    "my file",
    "my files",
    "my notes",
    "my upload",
    "the document",
    "the file",
    "the pdf",
    "the report",
    "i uploaded",
    "uploaded file",
    "according to my",
    "summarize my",
    "in my doc",
];

/// Phrases that need live data.
const REALTIME_MARKERS: &[&str] = &[
    "right now",
    "currently",
    "current price",
    "latest news",
    "today's",
    "weather",
    "stock price",
    "live score",
    "breaking news",
    "this morning",
    "as of today",
];

fn count_markers(query: &str, markers: &[&str]) -> usize {
    markers.iter().filter(|m| query.contains(*m)).count()
}

/// Classify a free-form query into a [`TaskClassification`].
///
/// Keyword heuristics over the lowercased query text. Document intent
/// wins over realtime intent when both are present; both flags are
/// still reported so provenance captures the ambiguity.
pub fn classify(query: &str) -> TaskClassification {
    let lowered = query.to_lowercase();

    if count_markers(&lowered, UNSUPPORTED_MARKERS) > 0 {
        return TaskClassification {
            task_type: TaskType::Unsupported,
            doc_intent: false,
            realtime_intent: false,
            confidence: 0.9,
        };
    }

    let doc_hits = count_markers(&lowered, DOC_MARKERS);
    let realtime_hits = count_markers(&lowered, REALTIME_MARKERS);
    let doc_intent = doc_hits > 0;
    let realtime_intent = realtime_hits > 0;

    let task_type = if doc_intent {
        TaskType::DocGrounded
    } else if realtime_intent {
        TaskType::Realtime
    } else {
        TaskType::General
    };

    let hits = doc_hits.max(realtime_hits);
    let confidence = if hits == 0 {
        // Nothing matched: General by elimination, weaker signal.
        0.5
    } else {
        (0.5 + 0.15 * hits as f64).min(0.95)
    };

    TaskClassification {
        task_type,
        doc_intent,
        realtime_intent,
        confidence,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_doc_grounded_query() {
        let c = classify("What does my document say about Q3 revenue?");
        assert_eq!(c.task_type, TaskType::DocGrounded);
        assert!(c.doc_intent);
        assert!(!c.realtime_intent);
        assert!(c.confidence > 0.5);
    }

    #[test]
    fn test_realtime_query() {
        let c = classify("What's the weather in Berlin right now?");
        assert_eq!(c.task_type, TaskType::Realtime);
        assert!(c.realtime_intent);
    }

    #[test]
    fn test_unsupported_query() {
        let c = classify("Please generate an image of a sunset");
        assert_eq!(c.task_type, TaskType::Unsupported);
    }

    #[test]
    fn test_draw_conclusion_is_not_image_generation() {
        let c = classify("Draw a conclusion from my document about Q3");
        assert_eq!(c.task_type, TaskType::DocGrounded);
        assert!(c.doc_intent);

        let c = classify("Can you draw a picture of a sunset?");
        assert_eq!(c.task_type, TaskType::Unsupported);
    }

    #[test]
    fn test_general_fallback() {
        let c = classify("Explain how photosynthesis works");
        assert_eq!(c.task_type, TaskType::General);
        assert!(!c.doc_intent);
        assert!(!c.realtime_intent);
        assert_eq!(c.confidence, 0.5);
    }

    #[test]
    fn test_doc_intent_wins_over_realtime() {
        let c = classify("According to my notes, what is today's agenda right now?");
        assert_eq!(c.task_type, TaskType::DocGrounded);
        assert!(c.doc_intent);
        assert!(c.realtime_intent);
    }

    #[test]
    fn test_classification_is_deterministic() {
        let a = classify("summarize my files please");
        let b = classify("summarize my files please");
        assert_eq!(a.task_type, b.task_type);
        assert_eq!(a.confidence, b.confidence);
    }

    #[test]
    fn test_case_insensitive() {
        let c = classify("SUMMARIZE MY DOCUMENT");
        assert_eq!(c.task_type, TaskType::DocGrounded);
    }
}
