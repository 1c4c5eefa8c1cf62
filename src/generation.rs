//! Generation backend abstraction and OpenAI chat implementation.
//!
//! The pipeline hands the backend a routed model, the retrieved context
//! chunks, recent history, and the user message; the backend returns
//! text plus token counts. No fallback model substitution happens here
//! or anywhere else — a failed call is a failed request.

use anyhow::{bail, Result};
use async_trait::async_trait;
use serde::Serialize;
use std::time::Duration;

use crate::config::GenerationConfig;
use crate::models::{ConversationTurn, SearchHit};
use crate::router::ModelId;

/// One message in the chat-completions wire format.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

/// Input for one generation call.
#[derive(Debug, Clone)]
pub struct GenerationRequest {
    pub model: ModelId,
    /// Retrieved chunks to ground the answer in, best first.
    pub context: Vec<SearchHit>,
    /// Prior turns, oldest first. The backend takes the most recent
    /// `history_turns` of these.
    pub history: Vec<ConversationTurn>,
    pub message: String,
}

/// Output of one generation call.
#[derive(Debug, Clone)]
pub struct GenerationOutput {
    pub text: String,
    pub input_tokens: u32,
    pub output_tokens: u32,
}

/// Trait for generation backends.
#[async_trait]
pub trait GenerationBackend: Send + Sync {
    async fn generate(&self, request: &GenerationRequest) -> Result<GenerationOutput>;
}

/// Compose the chat-completions message list for a request.
///
/// System prompt carries one `From {document_name}:` block per context
/// chunk; history is truncated to the most recent `history_turns`
/// turns, oldest first; the user message goes last.
pub fn build_messages(request: &GenerationRequest, history_turns: usize) -> Vec<ChatMessage> {
    let mut system = String::from(
        "You are a helpful assistant. Answer using the provided document \
         context when it is relevant, and cite the document name.",
    );
    if !request.context.is_empty() {
        system.push_str("\n\nDocument context:\n");
        for hit in &request.context {
            system.push_str(&format!("\nFrom {}:\n{}\n", hit.source, hit.content));
        }
    }

    let mut messages = vec![ChatMessage {
        role: "system".to_string(),
        content: system,
    }];

    let skip = request.history.len().saturating_sub(history_turns);
    for turn in request.history.iter().skip(skip) {
        messages.push(ChatMessage {
            role: turn.role.as_str().to_string(),
            content: turn.content.clone(),
        });
    }

    messages.push(ChatMessage {
        role: "user".to_string(),
        content: request.message.clone(),
    });

    messages
}

/// Generation backend calling the OpenAI chat completions API.
///
/// The `byok` model routes through the same API with the caller's own
/// key and model name instead of the platform defaults.
pub struct OpenAiGenerationBackend {
    config: GenerationConfig,
    /// Key and model used when the router selects `byok`.
    byok: Option<ByokCredentials>,
}

/// A caller-supplied API key and model for BYOK generation.
#[derive(Debug, Clone)]
pub struct ByokCredentials {
    pub api_key: String,
    pub model: String,
}

impl OpenAiGenerationBackend {
    pub fn new(config: GenerationConfig, byok: Option<ByokCredentials>) -> Self {
        Self { config, byok }
    }

    /// Resolve a routed model to wire model name and API key.
    fn resolve(&self, model: ModelId) -> Result<(String, String)> {
        match model {
            ModelId::Byok => match &self.byok {
                Some(creds) => Ok((creds.model.clone(), creds.api_key.clone())),
                None => bail!("byok model routed without stored credentials"),
            },
            other => {
                let api_key = std::env::var("OPENAI_API_KEY")
                    .map_err(|_| anyhow::anyhow!("OPENAI_API_KEY not set"))?;
                Ok((other.as_str().to_string(), api_key))
            }
        }
    }
}

#[async_trait]
impl GenerationBackend for OpenAiGenerationBackend {
    async fn generate(&self, request: &GenerationRequest) -> Result<GenerationOutput> {
        let (model, api_key) = self.resolve(request.model)?;
        let messages = build_messages(request, self.config.history_turns);

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(self.config.timeout_secs))
            .build()?;

        let body = serde_json::json!({
            "model": model,
            "messages": messages,
            "max_tokens": self.config.max_tokens,
            "temperature": self.config.temperature,
        });

        let response = client
            .post("https://api.openai.com/v1/chat/completions")
            .header("Authorization", format!("Bearer {}", api_key))
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body_text = response.text().await.unwrap_or_default();
            bail!("OpenAI API error {}: {}", status, body_text);
        }

        let json: serde_json::Value = response.json().await?;
        parse_completion_response(&json)
    }
}

/// Parse the chat completions response into text plus token counts.
fn parse_completion_response(json: &serde_json::Value) -> Result<GenerationOutput> {
    let text = json
        .get("choices")
        .and_then(|c| c.as_array())
        .and_then(|c| c.first())
        .and_then(|c| c.get("message"))
        .and_then(|m| m.get("content"))
        .and_then(|t| t.as_str())
        .ok_or_else(|| anyhow::anyhow!("Invalid OpenAI response: missing message content"))?
        .to_string();

    let usage = json.get("usage");
    let input_tokens = usage
        .and_then(|u| u.get("prompt_tokens"))
        .and_then(|v| v.as_u64())
        .unwrap_or(0) as u32;
    let output_tokens = usage
        .and_then(|u| u.get("completion_tokens"))
        .and_then(|v| v.as_u64())
        .unwrap_or(0) as u32;

    Ok(GenerationOutput {
        text,
        input_tokens,
        output_tokens,
    })
}
