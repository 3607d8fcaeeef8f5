//! Guardrail configuration.

use std::time::Duration;

/// Default maximum prompt length in characters.
pub const DEFAULT_MAX_PROMPT_CHARS: usize = 10_000;

/// Default hard budget for the Tier 1 normalize-and-scan stage.
pub const DEFAULT_TIER1_BUDGET: Duration = Duration::from_millis(50);

/// Default timeout for a single judge call.
pub const DEFAULT_JUDGE_TIMEOUT: Duration = Duration::from_secs(30);

/// Default consecutive-failure threshold before the breaker opens.
pub const DEFAULT_BREAKER_THRESHOLD: u32 = 3;

/// Default cool-down before an open breaker allows a trial call.
pub const DEFAULT_BREAKER_COOLDOWN: Duration = Duration::from_secs(30);

/// Configuration for the guardrail engine.
///
/// Supplied once at process start and treated as immutable afterwards.
#[derive(Debug, Clone)]
pub struct GuardrailConfig {
    /// Maximum accepted prompt length in characters.
    pub max_prompt_chars: usize,
    /// Hard budget for normalization plus pattern scanning.
    pub tier1_budget: Duration,
    /// Timeout for a single semantic judge call.
    pub judge_timeout: Duration,
    /// Consecutive judge failures before the circuit breaker opens.
    pub breaker_failure_threshold: u32,
    /// How long an open breaker waits before allowing a trial call.
    pub breaker_cooldown: Duration,
}

impl Default for GuardrailConfig {
    fn default() -> Self {
        Self {
            max_prompt_chars: DEFAULT_MAX_PROMPT_CHARS,
            tier1_budget: DEFAULT_TIER1_BUDGET,
            judge_timeout: DEFAULT_JUDGE_TIMEOUT,
            breaker_failure_threshold: DEFAULT_BREAKER_THRESHOLD,
            breaker_cooldown: DEFAULT_BREAKER_COOLDOWN,
        }
    }
}

impl GuardrailConfig {
    /// Sets the maximum prompt length.
    pub fn with_max_prompt_chars(mut self, max: usize) -> Self {
        self.max_prompt_chars = max;
        self
    }

    /// Sets the Tier 1 time budget.
    pub fn with_tier1_budget(mut self, budget: Duration) -> Self {
        self.tier1_budget = budget;
        self
    }

    /// Sets the judge call timeout.
    pub fn with_judge_timeout(mut self, timeout: Duration) -> Self {
        self.judge_timeout = timeout;
        self
    }

    /// Sets the breaker failure threshold.
    pub fn with_breaker_threshold(mut self, threshold: u32) -> Self {
        self.breaker_failure_threshold = threshold.max(1);
        self
    }

    /// Sets the breaker cool-down interval.
    pub fn with_breaker_cooldown(mut self, cooldown: Duration) -> Self {
        self.breaker_cooldown = cooldown;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_values() {
        let config = GuardrailConfig::default();
        assert_eq!(config.max_prompt_chars, 10_000);
        assert_eq!(config.tier1_budget, Duration::from_millis(50));
        assert_eq!(config.judge_timeout, Duration::from_secs(30));
        assert_eq!(config.breaker_failure_threshold, 3);
        assert_eq!(config.breaker_cooldown, Duration::from_secs(30));
    }

    #[test]
    fn builder_setters() {
        let config = GuardrailConfig::default()
            .with_max_prompt_chars(500)
            .with_judge_timeout(Duration::from_secs(5))
            .with_breaker_threshold(5)
            .with_breaker_cooldown(Duration::from_secs(1));
        assert_eq!(config.max_prompt_chars, 500);
        assert_eq!(config.judge_timeout, Duration::from_secs(5));
        assert_eq!(config.breaker_failure_threshold, 5);
        assert_eq!(config.breaker_cooldown, Duration::from_secs(1));
    }

    #[test]
    fn threshold_has_floor_of_one() {
        let config = GuardrailConfig::default().with_breaker_threshold(0);
        assert_eq!(config.breaker_failure_threshold, 1);
    }
}
