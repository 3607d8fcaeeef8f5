//! API route handlers.

use std::time::Instant;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use tracing::{debug, warn};

use warden_core::{Disposition, GuardrailVerdict, Tier};

use crate::error::ApiError;
use crate::llm::CompletionError;
use crate::models::{ChatRequest, HealthResponse, PromptRequest, PromptResponse};
use crate::state::AppState;

/// Error message returned for every content block.
const BLOCKED_MESSAGE: &str = "prompt blocked by security guardrails";

/// POST /api/v1/prompt - Check a prompt and, if safe, generate.
pub async fn check_and_generate(
    State(state): State<AppState>,
    Json(req): Json<PromptRequest>,
) -> Response {
    debug!(prompt_chars = req.prompt.chars().count(), "checking prompt");

    if req.prompt.trim().is_empty() {
        return ApiError::BadRequest("prompt must not be empty".to_string()).into_response();
    }

    let verdict = run_guardrail(&state, &req.prompt).await;
    match verdict.disposition {
        Disposition::Pass => {
            completion_response(state.completion.generate(&req.prompt).await, verdict)
        }
        _ => blocked_response(verdict),
    }
}

/// POST /api/v1/chat - Check the current message and, if safe, answer it
/// with conversation context.
///
/// Only the current message goes through the guardrail; history turns
/// were already checked when they were sent.
pub async fn chat(State(state): State<AppState>, Json(req): Json<ChatRequest>) -> Response {
    debug!(
        message_chars = req.message.chars().count(),
        history_turns = req.conversation_history.len(),
        "checking chat message"
    );

    if req.message.trim().is_empty() {
        return ApiError::BadRequest("message must not be empty".to_string()).into_response();
    }

    let verdict = run_guardrail(&state, &req.message).await;
    match verdict.disposition {
        Disposition::Pass => completion_response(
            state
                .completion
                .chat(&req.message, &req.conversation_history, req.model.as_deref())
                .await,
            verdict,
        ),
        _ => blocked_response(verdict),
    }
}

/// Runs the guardrail under one overall deadline. An elapse is
/// indistinguishable from a judge fault: fail closed.
async fn run_guardrail(state: &AppState, text: &str) -> GuardrailVerdict {
    let start = Instant::now();
    match tokio::time::timeout(state.guardrail_timeout, state.engine.evaluate(text)).await {
        Ok(verdict) => verdict,
        Err(_) => {
            warn!("guardrail stage exceeded its deadline, failing closed");
            GuardrailVerdict {
                safe: false,
                reason: "security check failed".to_string(),
                tier: Tier::Two,
                pattern: None,
                latency_ms: start.elapsed().as_millis() as u64,
                disposition: Disposition::CheckFailed,
            }
        }
    }
}

fn completion_response(
    result: Result<String, CompletionError>,
    verdict: GuardrailVerdict,
) -> Response {
    match result {
        Ok(text) => (StatusCode::OK, Json(PromptResponse::passed(text, verdict))).into_response(),
        Err(CompletionError::Timeout) => (
            StatusCode::GATEWAY_TIMEOUT,
            Json(PromptResponse::failed(verdict, "llm service timeout")),
        )
            .into_response(),
        Err(e) => {
            warn!(error = %e, "completion backend failed");
            (
                StatusCode::BAD_GATEWAY,
                Json(PromptResponse::failed(verdict, "llm service error")),
            )
                .into_response()
        }
    }
}

fn blocked_response(verdict: GuardrailVerdict) -> Response {
    match verdict.disposition {
        Disposition::ServiceUnavailable => (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(PromptResponse::failed(
                verdict,
                "security service unavailable",
            )),
        )
            .into_response(),
        Disposition::CheckFailed => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(PromptResponse::failed(verdict, "security check failed")),
        )
            .into_response(),
        _ => (
            StatusCode::BAD_REQUEST,
            Json(PromptResponse::failed(verdict, BLOCKED_MESSAGE)),
        )
            .into_response(),
    }
}

/// GET /health - Liveness plus breaker state.
pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        breaker: state.engine.breaker().snapshot(),
    })
}
