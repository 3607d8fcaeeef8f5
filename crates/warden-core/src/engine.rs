//! Guardrail orchestrator.
//!
//! Sequences normalization, the Tier 1 pattern scan, and the
//! breaker-guarded Tier 2 judge call into one verdict per prompt.
//! Fail-closed: any ambiguity, timeout, or internal fault resolves to
//! an unsafe verdict, never a pass.

use std::sync::Arc;
use std::time::Instant;

use tracing::{info, warn};

use crate::breaker::{BreakerDecision, CircuitBreaker};
use crate::config::GuardrailConfig;
use crate::error::{GuardrailError, JudgeError};
use crate::judge::Judge;
use crate::normalizer::{NormalizedText, Normalizer};
use crate::scanner::{PatternCatalog, PatternHit};
use crate::verdict::{Disposition, GuardrailVerdict, Tier};

/// The guardrail decision engine.
///
/// Constructed once at process start and shared across requests. The
/// normalizer and catalog are stateless; the breaker is the only
/// shared mutable resource and serializes its own transitions.
pub struct GuardrailEngine {
    normalizer: Arc<Normalizer>,
    catalog: Arc<PatternCatalog>,
    breaker: Arc<CircuitBreaker>,
    judge: Arc<dyn Judge>,
    config: GuardrailConfig,
}

impl GuardrailEngine {
    pub fn new(
        config: GuardrailConfig,
        judge: Arc<dyn Judge>,
        breaker: Arc<CircuitBreaker>,
    ) -> Self {
        Self {
            normalizer: Arc::new(Normalizer::new()),
            catalog: Arc::new(PatternCatalog::builtin()),
            breaker,
            judge,
            config,
        }
    }

    /// Creates an engine with a breaker built from the config.
    pub fn with_config(config: GuardrailConfig, judge: Arc<dyn Judge>) -> Self {
        let breaker = Arc::new(CircuitBreaker::new(
            config.breaker_failure_threshold,
            config.breaker_cooldown,
        ));
        Self::new(config, judge, breaker)
    }

    /// The shared circuit breaker (for health reporting).
    pub fn breaker(&self) -> &Arc<CircuitBreaker> {
        &self.breaker
    }

    /// Runs the full guardrail check on a prompt.
    pub async fn evaluate(&self, prompt: &str) -> GuardrailVerdict {
        let start = Instant::now();

        // 1. Length validation, before any normalization work.
        if prompt.chars().count() > self.config.max_prompt_chars {
            warn!(chars = prompt.chars().count(), "prompt exceeds maximum length");
            return self.block(
                "length exceeded",
                Tier::One,
                None,
                Disposition::TooLong,
                start,
            );
        }

        // 2. Tier 1: normalize and scan on a blocking task under the
        // hard budget. A timeout or panic fails closed.
        let (text, hit) = match self.run_tier1(prompt).await {
            Ok(pair) => pair,
            Err(e) => {
                warn!(error = %e, "tier 1 stage failed, failing closed");
                return self.block(
                    "security check failed",
                    Tier::One,
                    None,
                    Disposition::CheckFailed,
                    start,
                );
            }
        };

        // 3. Tier 1 match: category-level reason only, never the
        // matched text.
        if let Some(hit) = hit {
            info!(
                pattern = hit.id,
                category = ?hit.category,
                elapsed_ms = start.elapsed().as_millis() as u64,
                "tier 1 guardrail triggered"
            );
            return self.block(
                &format!("detected: {}", hit.category.description()),
                Tier::One,
                Some(hit.id),
                Disposition::PatternBlock,
                start,
            );
        }

        // 4. Tier 2: breaker-guarded judge call. The call runs as a
        // detached task that reports its own outcome to the breaker,
        // so a dropped request cannot leak the half-open trial or hide
        // a timeout from the failure count.
        if self.breaker.preflight() == BreakerDecision::Reject {
            warn!("breaker open, rejecting without judge call");
            return self.block(
                "security service unavailable",
                Tier::Two,
                None,
                Disposition::ServiceUnavailable,
                start,
            );
        }

        let judge = Arc::clone(&self.judge);
        let breaker = Arc::clone(&self.breaker);
        let judge_timeout = self.config.judge_timeout;
        let task = tokio::spawn(async move {
            let outcome = tokio::time::timeout(
                judge_timeout,
                judge.classify(&text.original, &text.normalized),
            )
            .await
            .unwrap_or(Err(JudgeError::Timeout));
            match outcome {
                Ok(verdict) => {
                    // Any well-formed verdict is a breaker success,
                    // even an unsafe one: the breaker tracks
                    // availability.
                    breaker.record_success();
                    Ok(verdict)
                }
                Err(e) => {
                    breaker.record_failure();
                    Err(e)
                }
            }
        });

        match task.await {
            Ok(Ok(verdict)) => {
                if verdict.safe {
                    info!(
                        latency_ms = start.elapsed().as_millis() as u64,
                        "prompt passed all guardrails"
                    );
                    GuardrailVerdict {
                        safe: true,
                        reason: "passed all security checks".to_string(),
                        tier: Tier::All,
                        pattern: None,
                        latency_ms: start.elapsed().as_millis() as u64,
                        disposition: Disposition::Pass,
                    }
                } else {
                    info!("tier 2 guardrail triggered");
                    let reason = if verdict.reason.is_empty() {
                        "flagged by semantic analysis".to_string()
                    } else {
                        verdict.reason
                    };
                    self.block(&reason, Tier::Two, None, Disposition::JudgeBlock, start)
                }
            }
            Ok(Err(e)) => {
                // The task already reported the failure to the breaker.
                warn!(error = %e, "judge call failed, failing closed");
                self.block(
                    "security check failed",
                    Tier::Two,
                    None,
                    Disposition::CheckFailed,
                    start,
                )
            }
            Err(join_err) => {
                // The task died before reporting; release the trial.
                warn!(error = %join_err, "judge task failed, failing closed");
                self.breaker.record_failure();
                self.block(
                    "security check failed",
                    Tier::Two,
                    None,
                    Disposition::CheckFailed,
                    start,
                )
            }
        }
    }

    /// Normalizes and scans on a blocking task under the Tier 1 budget.
    async fn run_tier1(
        &self,
        prompt: &str,
    ) -> Result<(NormalizedText, Option<PatternHit>), GuardrailError> {
        let normalizer = Arc::clone(&self.normalizer);
        let catalog = Arc::clone(&self.catalog);
        let owned = prompt.to_string();

        let tier1 = tokio::time::timeout(
            self.config.tier1_budget,
            tokio::task::spawn_blocking(move || {
                let text = normalizer.normalize(&owned);
                let hit = catalog.scan(&text);
                (text, hit)
            }),
        )
        .await;

        match tier1 {
            Ok(Ok(pair)) => Ok(pair),
            Ok(Err(join_err)) => Err(GuardrailError::Internal(join_err.to_string())),
            Err(_) => Err(GuardrailError::Tier1Budget),
        }
    }

    fn block(
        &self,
        reason: &str,
        tier: Tier,
        pattern: Option<&'static str>,
        disposition: Disposition,
        start: Instant,
    ) -> GuardrailVerdict {
        GuardrailVerdict {
            safe: false,
            reason: reason.to_string(),
            tier,
            pattern,
            latency_ms: start.elapsed().as_millis() as u64,
            disposition,
        }
    }
}
