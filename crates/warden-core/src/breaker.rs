//! Circuit breaker guarding the semantic judge.
//!
//! Tracks availability, not content verdicts: a well-formed unsafe
//! classification is a success. State is process-wide, constructed
//! once at startup and injected into the engine; every transition
//! happens under a single mutex so racing requests cannot corrupt the
//! failure count or both claim the half-open trial.

use std::sync::Mutex;
use std::time::{Duration, Instant};

use serde::Serialize;
use tracing::{info, warn};

/// Breaker status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BreakerStatus {
    /// Calls pass through.
    Closed,
    /// Calls are rejected without contacting the judge.
    Open,
    /// Exactly one trial call is allowed through.
    HalfOpen,
}

/// Whether a call may proceed to the judge.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BreakerDecision {
    Allow,
    Reject,
}

/// A point-in-time view of breaker state, for logging and the health
/// endpoint.
#[derive(Debug, Clone, Serialize)]
pub struct BreakerSnapshot {
    pub status: BreakerStatus,
    pub consecutive_failures: u32,
}

#[derive(Debug)]
struct BreakerState {
    status: BreakerStatus,
    consecutive_failures: u32,
    opened_at: Option<Instant>,
    /// Set while the single half-open trial call is in flight.
    trial_in_flight: bool,
}

/// Circuit breaker over `{Closed, Open, HalfOpen}`.
#[derive(Debug)]
pub struct CircuitBreaker {
    state: Mutex<BreakerState>,
    failure_threshold: u32,
    cooldown: Duration,
}

impl CircuitBreaker {
    /// Creates a closed breaker with the given threshold and cool-down.
    pub fn new(failure_threshold: u32, cooldown: Duration) -> Self {
        Self {
            state: Mutex::new(BreakerState {
                status: BreakerStatus::Closed,
                consecutive_failures: 0,
                opened_at: None,
                trial_in_flight: false,
            }),
            failure_threshold: failure_threshold.max(1),
            cooldown,
        }
    }

    /// Decides whether a judge call may proceed.
    ///
    /// An open breaker whose cool-down has elapsed transitions to
    /// half-open and admits the caller as the single trial; a
    /// half-open breaker with a trial already in flight rejects.
    pub fn preflight(&self) -> BreakerDecision {
        let mut state = self.state.lock().expect("breaker mutex poisoned");

        match state.status {
            BreakerStatus::Closed => BreakerDecision::Allow,
            BreakerStatus::Open => {
                let elapsed = state
                    .opened_at
                    .map(|t| t.elapsed())
                    .unwrap_or(Duration::ZERO);
                if elapsed >= self.cooldown {
                    info!("breaker cool-down elapsed, admitting half-open trial");
                    state.status = BreakerStatus::HalfOpen;
                    state.trial_in_flight = true;
                    BreakerDecision::Allow
                } else {
                    BreakerDecision::Reject
                }
            }
            BreakerStatus::HalfOpen => {
                if state.trial_in_flight {
                    BreakerDecision::Reject
                } else {
                    state.trial_in_flight = true;
                    BreakerDecision::Allow
                }
            }
        }
    }

    /// Records a successful judge call (any well-formed verdict).
    pub fn record_success(&self) {
        let mut state = self.state.lock().expect("breaker mutex poisoned");
        if state.status == BreakerStatus::HalfOpen {
            info!("half-open trial succeeded, closing breaker");
        }
        state.status = BreakerStatus::Closed;
        state.consecutive_failures = 0;
        state.opened_at = None;
        state.trial_in_flight = false;
    }

    /// Records a failed judge call (timeout, transport, or parse).
    pub fn record_failure(&self) {
        let mut state = self.state.lock().expect("breaker mutex poisoned");

        match state.status {
            BreakerStatus::HalfOpen => {
                warn!("half-open trial failed, reopening breaker");
                state.status = BreakerStatus::Open;
                state.opened_at = Some(Instant::now());
                state.trial_in_flight = false;
            }
            BreakerStatus::Closed => {
                state.consecutive_failures += 1;
                if state.consecutive_failures >= self.failure_threshold {
                    warn!(
                        failures = state.consecutive_failures,
                        "failure threshold reached, opening breaker"
                    );
                    state.status = BreakerStatus::Open;
                    state.opened_at = Some(Instant::now());
                }
            }
            BreakerStatus::Open => {
                // Already open; nothing to count.
            }
        }
    }

    /// Returns the current status.
    pub fn status(&self) -> BreakerStatus {
        self.state.lock().expect("breaker mutex poisoned").status
    }

    /// Returns a snapshot for logging or the health endpoint.
    pub fn snapshot(&self) -> BreakerSnapshot {
        let state = self.state.lock().expect("breaker mutex poisoned");
        BreakerSnapshot {
            status: state.status,
            consecutive_failures: state.consecutive_failures,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn breaker(cooldown_ms: u64) -> CircuitBreaker {
        CircuitBreaker::new(3, Duration::from_millis(cooldown_ms))
    }

    #[test]
    fn starts_closed() {
        let b = breaker(100);
        assert_eq!(b.status(), BreakerStatus::Closed);
        assert_eq!(b.preflight(), BreakerDecision::Allow);
    }

    #[test]
    fn opens_after_threshold_failures() {
        let b = breaker(100);
        b.record_failure();
        b.record_failure();
        assert_eq!(b.status(), BreakerStatus::Closed);
        b.record_failure();
        assert_eq!(b.status(), BreakerStatus::Open);
        assert_eq!(b.preflight(), BreakerDecision::Reject);
    }

    #[test]
    fn success_resets_failure_count() {
        let b = breaker(100);
        b.record_failure();
        b.record_failure();
        b.record_success();
        b.record_failure();
        b.record_failure();
        assert_eq!(b.status(), BreakerStatus::Closed);
    }

    #[test]
    fn half_open_after_cooldown() {
        let b = breaker(10);
        for _ in 0..3 {
            b.record_failure();
        }
        assert_eq!(b.preflight(), BreakerDecision::Reject);

        std::thread::sleep(Duration::from_millis(20));
        assert_eq!(b.preflight(), BreakerDecision::Allow);
        assert_eq!(b.status(), BreakerStatus::HalfOpen);
    }

    #[test]
    fn half_open_admits_exactly_one_trial() {
        let b = breaker(0);
        for _ in 0..3 {
            b.record_failure();
        }
        assert_eq!(b.preflight(), BreakerDecision::Allow);
        assert_eq!(b.preflight(), BreakerDecision::Reject);
        assert_eq!(b.preflight(), BreakerDecision::Reject);
    }

    #[test]
    fn trial_success_closes_breaker() {
        let b = breaker(0);
        for _ in 0..3 {
            b.record_failure();
        }
        assert_eq!(b.preflight(), BreakerDecision::Allow);
        b.record_success();
        assert_eq!(b.status(), BreakerStatus::Closed);
        assert_eq!(b.preflight(), BreakerDecision::Allow);
        assert_eq!(b.snapshot().consecutive_failures, 0);
    }

    #[test]
    fn trial_failure_reopens_breaker() {
        let b = breaker(0);
        for _ in 0..3 {
            b.record_failure();
        }
        assert_eq!(b.preflight(), BreakerDecision::Allow);
        b.record_failure();
        assert_eq!(b.status(), BreakerStatus::Open);
        // New trial is available after another cool-down (zero here).
        assert_eq!(b.preflight(), BreakerDecision::Allow);
    }

    #[test]
    fn concurrent_preflights_admit_a_single_trial() {
        use std::sync::atomic::{AtomicU32, Ordering};
        use std::sync::Arc;

        let b = Arc::new(breaker(0));
        for _ in 0..3 {
            b.record_failure();
        }

        let allowed = Arc::new(AtomicU32::new(0));
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let b = Arc::clone(&b);
                let allowed = Arc::clone(&allowed);
                std::thread::spawn(move || {
                    if b.preflight() == BreakerDecision::Allow {
                        allowed.fetch_add(1, Ordering::SeqCst);
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }

        assert_eq!(allowed.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn snapshot_reports_state() {
        let b = breaker(100);
        b.record_failure();
        let snap = b.snapshot();
        assert_eq!(snap.status, BreakerStatus::Closed);
        assert_eq!(snap.consecutive_failures, 1);
    }
}
