//! Application state for the API server.

use std::sync::Arc;
use std::time::Duration;

use warden_core::GuardrailEngine;

use crate::llm::CompletionBackend;

/// Default overall deadline for the guardrail stage of a request.
pub const DEFAULT_GUARDRAIL_TIMEOUT: Duration = Duration::from_secs(2);

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    /// The guardrail decision engine.
    pub engine: Arc<GuardrailEngine>,
    /// Completion backend for prompts that pass.
    pub completion: Arc<dyn CompletionBackend>,
    /// Overall deadline for the guardrail stage; elapse fails closed.
    pub guardrail_timeout: Duration,
}

impl AppState {
    /// Creates application state with the default guardrail deadline.
    pub fn new(engine: Arc<GuardrailEngine>, completion: Arc<dyn CompletionBackend>) -> Self {
        Self {
            engine,
            completion,
            guardrail_timeout: DEFAULT_GUARDRAIL_TIMEOUT,
        }
    }

    /// Overrides the guardrail stage deadline.
    pub fn with_guardrail_timeout(mut self, timeout: Duration) -> Self {
        self.guardrail_timeout = timeout;
        self
    }
}
