//! API request and response models.

use serde::{Deserialize, Serialize};

use warden_core::{BreakerSnapshot, GuardrailVerdict};

/// Request body for POST /api/v1/prompt.
#[derive(Debug, Deserialize)]
pub struct PromptRequest {
    /// The prompt text to check and, if safe, forward to the model.
    pub prompt: String,
}

/// Role of a conversation message author.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    User,
    Assistant,
}

/// A single message in the conversation history.
#[derive(Debug, Clone, Deserialize)]
pub struct ChatMessage {
    pub role: MessageRole,
    pub content: String,
}

/// Request body for POST /api/v1/chat.
#[derive(Debug, Deserialize)]
pub struct ChatRequest {
    /// The current user message to check and answer.
    pub message: String,
    /// Prior turns supplied for context only; the guardrail checks the
    /// current message, not the history.
    #[serde(default)]
    pub conversation_history: Vec<ChatMessage>,
    /// Model override; unknown names fall back to the configured model.
    pub model: Option<String>,
}

/// Response body for POST /api/v1/prompt and /api/v1/chat.
///
/// Returned with every status code so clients always see the verdict
/// that produced the outcome.
#[derive(Debug, Serialize)]
pub struct PromptResponse {
    /// Whether a model response was produced.
    pub success: bool,
    /// The model's completion (only present on success).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response: Option<String>,
    /// The guardrail verdict for this prompt.
    pub guardrail: GuardrailVerdict,
    /// Error message (only present on failure).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl PromptResponse {
    pub fn passed(response: String, guardrail: GuardrailVerdict) -> Self {
        Self {
            success: true,
            response: Some(response),
            guardrail,
            error: None,
        }
    }

    pub fn failed(guardrail: GuardrailVerdict, error: impl Into<String>) -> Self {
        Self {
            success: false,
            response: None,
            guardrail,
            error: Some(error.into()),
        }
    }
}

/// Response body for GET /health.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    /// Always "ok" when the process is serving.
    pub status: &'static str,
    /// Current circuit breaker state.
    pub breaker: BreakerSnapshot,
}
