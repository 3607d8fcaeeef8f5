//! Completion backend for prompts that pass the guardrail.
//!
//! Only invoked after a safe verdict; never sees blocked prompts.
//! Logs call duration and outcome, never prompt content.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, warn};

use crate::models::{ChatMessage, MessageRole};

/// Default Gemini API endpoint.
const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com";

/// Models a chat request may select. Anything else falls back to the
/// configured default.
const ALLOWED_MODELS: &[&str] = &[
    "gemini-3-pro-preview",
    "gemini-3-flash-preview",
    "gemini-2.5-pro",
    "gemini-2.5-flash",
    "gemini-2.5-flash-lite",
    "gemini-2.0-flash",
    "gemini-2.0-flash-lite",
    "gemini-flash-latest",
    "gemini-pro-latest",
];

/// Completion call failures.
#[derive(Debug, Error)]
pub enum CompletionError {
    /// The call exceeded its deadline.
    #[error("completion call timed out")]
    Timeout,

    /// Network or connection failure.
    #[error("transport error: {0}")]
    Transport(String),

    /// The API returned an error status.
    #[error("api error: {0}")]
    Api(String),

    /// The API returned no usable text.
    #[error("empty completion")]
    Empty,
}

impl From<reqwest::Error> for CompletionError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            CompletionError::Timeout
        } else {
            CompletionError::Transport(err.to_string())
        }
    }
}

/// Generates a model response for an already-cleared prompt.
#[async_trait]
pub trait CompletionBackend: Send + Sync {
    async fn generate(&self, prompt: &str) -> Result<String, CompletionError>;

    /// Generates a reply to `message` given prior conversation turns.
    async fn chat(
        &self,
        message: &str,
        history: &[ChatMessage],
        model: Option<&str>,
    ) -> Result<String, CompletionError>;
}

/// Completion backend over the Gemini `generateContent` API.
pub struct GeminiCompletion {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    model: String,
    timeout: Duration,
}

impl GeminiCompletion {
    pub fn new(api_key: impl Into<String>, model: impl Into<String>, timeout: Duration) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: DEFAULT_BASE_URL.to_string(),
            api_key: api_key.into(),
            model: model.into(),
            timeout,
        }
    }

    /// Overrides the API base URL (for tests).
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    /// Picks the model for a request; unrecognized names fall back to
    /// the configured default.
    fn resolve_model<'a>(&'a self, requested: Option<&'a str>) -> &'a str {
        match requested {
            Some(name) if ALLOWED_MODELS.contains(&name) => name,
            Some(name) => {
                warn!(model = name, "unknown model requested, using default");
                &self.model
            }
            None => &self.model,
        }
    }

    async fn call_api(&self, model: &str, contents: Vec<Content>) -> Result<String, CompletionError> {
        let url = format!("{}/v1beta/models/{}:generateContent", self.base_url, model);

        let request = GenerateContentRequest {
            contents,
            generation_config: GenerationConfig {
                temperature: 0.7,
                max_output_tokens: 2048,
            },
        };

        let response = self
            .client
            .post(&url)
            .header("x-goog-api-key", &self.api_key)
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(CompletionError::Api(format!("status {}", status.as_u16())));
        }

        let body: GenerateContentResponse = response
            .json()
            .await
            .map_err(|e| CompletionError::Api(format!("response body: {e}")))?;

        let text = body
            .candidates
            .and_then(|mut c| if c.is_empty() { None } else { Some(c.remove(0)) })
            .map(|c| {
                c.content
                    .parts
                    .into_iter()
                    .filter_map(|p| p.text)
                    .collect::<String>()
            })
            .unwrap_or_default();

        if text.is_empty() {
            return Err(CompletionError::Empty);
        }
        Ok(text)
    }
}

#[async_trait]
impl CompletionBackend for GeminiCompletion {
    async fn generate(&self, prompt: &str) -> Result<String, CompletionError> {
        let contents = vec![Content {
            role: "user",
            parts: vec![Part {
                text: prompt.to_string(),
            }],
        }];
        self.timed_call(&self.model, contents).await
    }

    async fn chat(
        &self,
        message: &str,
        history: &[ChatMessage],
        model: Option<&str>,
    ) -> Result<String, CompletionError> {
        let model = self.resolve_model(model);

        // Gemini calls the assistant side "model".
        let mut contents: Vec<Content> = history
            .iter()
            .map(|msg| Content {
                role: match msg.role {
                    MessageRole::User => "user",
                    MessageRole::Assistant => "model",
                },
                parts: vec![Part {
                    text: msg.content.clone(),
                }],
            })
            .collect();
        contents.push(Content {
            role: "user",
            parts: vec![Part {
                text: message.to_string(),
            }],
        });

        self.timed_call(model, contents).await
    }
}

impl GeminiCompletion {
    async fn timed_call(&self, model: &str, contents: Vec<Content>) -> Result<String, CompletionError> {
        let start = Instant::now();
        let result = tokio::time::timeout(self.timeout, self.call_api(model, contents))
            .await
            .unwrap_or(Err(CompletionError::Timeout));
        let duration_ms = start.elapsed().as_millis() as u64;

        match &result {
            Ok(text) => info!(duration_ms, chars = text.len(), "completion call complete"),
            Err(e) => warn!(duration_ms, error = %e, "completion call failed"),
        }

        result
    }
}

// --- Gemini wire types ---

#[derive(Debug, Serialize)]
struct GenerateContentRequest {
    contents: Vec<Content>,
    #[serde(rename = "generationConfig")]
    generation_config: GenerationConfig,
}

#[derive(Debug, Serialize)]
struct Content {
    role: &'static str,
    parts: Vec<Part>,
}

#[derive(Debug, Serialize)]
struct Part {
    text: String,
}

#[derive(Debug, Serialize)]
struct GenerationConfig {
    temperature: f64,
    #[serde(rename = "maxOutputTokens")]
    max_output_tokens: u32,
}

#[derive(Debug, Deserialize)]
struct GenerateContentResponse {
    candidates: Option<Vec<Candidate>>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: CandidateContent,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<ResponsePart>,
}

#[derive(Debug, Deserialize)]
struct ResponsePart {
    text: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn backend_for(server: &MockServer) -> GeminiCompletion {
        GeminiCompletion::new("test-key", "gemini-flash-latest", Duration::from_millis(500))
            .with_base_url(server.uri())
    }

    fn gemini_body(text: &str) -> serde_json::Value {
        json!({
            "candidates": [
                {"content": {"parts": [{"text": text}]}}
            ]
        })
    }

    #[tokio::test]
    async fn returns_completion_text() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(
                "/v1beta/models/gemini-flash-latest:generateContent",
            ))
            .respond_with(ResponseTemplate::new(200).set_body_json(gemini_body("2+2 equals 4.")))
            .mount(&server)
            .await;

        let text = backend_for(&server).generate("what is 2+2?").await.unwrap();
        assert_eq!(text, "2+2 equals 4.");
    }

    #[tokio::test]
    async fn empty_candidates_is_empty_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"candidates": []})))
            .mount(&server)
            .await;

        let err = backend_for(&server).generate("hello").await.unwrap_err();
        assert!(matches!(err, CompletionError::Empty));
    }

    #[tokio::test]
    async fn error_status_is_api_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(429))
            .mount(&server)
            .await;

        let err = backend_for(&server).generate("hello").await.unwrap_err();
        assert!(matches!(err, CompletionError::Api(_)));
    }

    #[tokio::test]
    async fn chat_sends_history_with_mapped_roles() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(
                "/v1beta/models/gemini-flash-latest:generateContent",
            ))
            .and(wiremock::matchers::body_json(json!({
                "contents": [
                    {"role": "user", "parts": [{"text": "hi"}]},
                    {"role": "model", "parts": [{"text": "hello, how can I help?"}]},
                    {"role": "user", "parts": [{"text": "what is 2+2?"}]}
                ],
                "generationConfig": {"temperature": 0.7, "maxOutputTokens": 2048}
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(gemini_body("4")))
            .mount(&server)
            .await;

        let history = vec![
            ChatMessage {
                role: MessageRole::User,
                content: "hi".to_string(),
            },
            ChatMessage {
                role: MessageRole::Assistant,
                content: "hello, how can I help?".to_string(),
            },
        ];
        let text = backend_for(&server)
            .chat("what is 2+2?", &history, None)
            .await
            .unwrap();
        assert_eq!(text, "4");
    }

    #[tokio::test]
    async fn chat_uses_requested_model_when_allowed() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1beta/models/gemini-2.0-flash:generateContent"))
            .respond_with(ResponseTemplate::new(200).set_body_json(gemini_body("ok")))
            .mount(&server)
            .await;

        let text = backend_for(&server)
            .chat("hello", &[], Some("gemini-2.0-flash"))
            .await
            .unwrap();
        assert_eq!(text, "ok");
    }

    #[tokio::test]
    async fn chat_falls_back_on_unknown_model() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(
                "/v1beta/models/gemini-flash-latest:generateContent",
            ))
            .respond_with(ResponseTemplate::new(200).set_body_json(gemini_body("ok")))
            .mount(&server)
            .await;

        let text = backend_for(&server)
            .chat("hello", &[], Some("totally-made-up-model"))
            .await
            .unwrap();
        assert_eq!(text, "ok");
    }

    #[tokio::test]
    async fn slow_backend_times_out() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(gemini_body("late"))
                    .set_delay(Duration::from_secs(5)),
            )
            .mount(&server)
            .await;

        let err = backend_for(&server).generate("hello").await.unwrap_err();
        assert!(matches!(err, CompletionError::Timeout));
    }
}
