//! Error types for the guardrail engine.
//!
//! Tier 1 pattern matches and judge-returned-unsafe results are normal
//! outcomes surfaced as verdicts, not errors. Everything here is caught
//! at the orchestrator boundary and converted to a fail-closed verdict.

use thiserror::Error;

/// Errors from the semantic judge client.
///
/// Every variant counts as a failure for circuit-breaker purposes;
/// a well-formed unsafe classification is not an error.
#[derive(Debug, Error)]
pub enum JudgeError {
    /// The judge call did not complete within its deadline.
    #[error("judge call timed out")]
    Timeout,

    /// Transport-level failure talking to the judge.
    #[error("judge transport error: {0}")]
    Transport(String),

    /// The judge API returned an error status.
    #[error("judge api error: {0}")]
    Api(String),

    /// The judge response could not be mapped to a safe/unsafe verdict.
    #[error("judge response parse failure: {0}")]
    Parse(String),
}

impl From<reqwest::Error> for JudgeError {
    fn from(err: reqwest::Error) -> Self {
        JudgeError::Transport(err.to_string())
    }
}

/// Internal engine faults.
#[derive(Debug, Error)]
pub enum GuardrailError {
    /// The Tier 1 stage exceeded its hard budget.
    #[error("tier 1 scan exceeded its time budget")]
    Tier1Budget,

    /// An unexpected internal failure anywhere in the pipeline.
    #[error("internal guardrail fault: {0}")]
    Internal(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn judge_error_display() {
        assert_eq!(JudgeError::Timeout.to_string(), "judge call timed out");
        assert!(JudgeError::Parse("missing field".into())
            .to_string()
            .contains("missing field"));
    }

    #[test]
    fn guardrail_error_display() {
        assert!(GuardrailError::Tier1Budget.to_string().contains("budget"));
    }
}
