//! Warden Core - Two-tier content-safety decision engine for LLM prompts.
//!
//! The engine normalizes untrusted text to defeat obfuscation, runs a
//! fast deterministic pattern scan (Tier 1), and only then consults a
//! remote semantic judge (Tier 2) behind a circuit breaker. Any
//! failure or ambiguity resolves to an unsafe verdict (fail-closed).
//!
//! ## Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use std::time::Duration;
//! use warden_core::{GeminiJudge, GuardrailConfig, GuardrailEngine};
//!
//! #[tokio::main]
//! async fn main() {
//!     let config = GuardrailConfig::default();
//!     let judge = Arc::new(GeminiJudge::new(
//!         "api-key",
//!         "gemini-flash-latest",
//!         Duration::from_secs(30),
//!     ));
//!     let engine = GuardrailEngine::with_config(config, judge);
//!
//!     let verdict = engine.evaluate("what is 2+2?").await;
//!     println!("safe: {}", verdict.safe);
//! }
//! ```

pub mod breaker;
pub mod config;
pub mod engine;
pub mod error;
pub mod judge;
pub mod normalizer;
pub mod scanner;
pub mod verdict;

pub use breaker::{BreakerDecision, BreakerSnapshot, BreakerStatus, CircuitBreaker};
pub use config::GuardrailConfig;
pub use engine::GuardrailEngine;
pub use error::{GuardrailError, JudgeError};
pub use judge::{GeminiJudge, Judge, JudgeVerdict};
pub use normalizer::{NormalizedText, Normalizer, Transform};
pub use scanner::{Category, PatternCatalog, PatternHit};
pub use verdict::{Disposition, GuardrailVerdict, Tier};
