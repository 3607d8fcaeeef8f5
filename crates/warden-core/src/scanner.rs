//! Tier 1 pattern scanner.
//!
//! Matches normalized text against an ordered, immutable catalog of
//! attack and PII signatures. First match wins; no scoring, no
//! aggregation. Patterns are bounded (no unbounded repetition over
//! arbitrary sub-expressions) so scanning stays well under the Tier 1
//! budget even on maximum-length input.

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::normalizer::NormalizedText;

/// Signature categories, in priority order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    /// Directives attempting to override prior instructions.
    Injection,
    /// Role-override and persona-jailbreak attempts.
    Jailbreak,
    /// Requests to reveal hidden instructions or configuration.
    Leak,
    /// Structured personal identifiers matched by format.
    Pii,
}

impl Category {
    /// Category-level description used in verdict reasons. Never
    /// includes matched text, so attacker payloads are not echoed.
    pub fn description(&self) -> &'static str {
        match self {
            Category::Injection => "prompt injection",
            Category::Jailbreak => "jailbreak attempt",
            Category::Leak => "system prompt leak attempt",
            Category::Pii => "personal data",
        }
    }
}

/// Which text view a pattern scans.
///
/// PII formats are destroyed by leetspeak folding (digits become
/// letters), so they match against the original text; attack phrasing
/// matches against the normalized text to catch obfuscation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ScanTarget {
    Normalized,
    Original,
}

/// A single named signature in the catalog.
struct Pattern {
    id: &'static str,
    category: Category,
    regex: Regex,
    target: ScanTarget,
    /// Structural validator applied to the matched text (e.g. Luhn).
    validate: Option<fn(&str) -> bool>,
}

/// A Tier 1 match.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PatternHit {
    /// Stable identifier of the matched signature.
    pub id: &'static str,
    /// The signature's category.
    pub category: Category,
}

/// Immutable, ordered signature catalog.
///
/// Loaded once at startup and shared read-only across all requests;
/// scanning allocates nothing and is trivially parallel-safe.
pub struct PatternCatalog {
    patterns: Vec<Pattern>,
}

impl PatternCatalog {
    /// Builds the built-in catalog, grouped by category in priority
    /// order `injection > jailbreak > leak > pii`.
    pub fn builtin() -> Self {
        let patterns = vec![
            // --- injection ---
            pattern(
                "ignore_instructions",
                Category::Injection,
                r"(?i)ignore\s+.{0,30}?(previous|all|above|prior)\b.{0,30}?instructions?",
                ScanTarget::Normalized,
                None,
            ),
            pattern(
                "disregard_above",
                Category::Injection,
                r"(?i)disregard\s+(the\s+)?(above|previous|prior|earlier)",
                ScanTarget::Normalized,
                None,
            ),
            // --- jailbreak ---
            pattern(
                "roleplay_jailbreak",
                Category::Jailbreak,
                r"(?i)(you\s+are\s+now|act\s+as|pretend\s+to\s+be)\b.{0,50}?(dan\b|jailbreak|evil|unrestricted|unfiltered|without\s+restrictions)",
                ScanTarget::Normalized,
                None,
            ),
            pattern(
                "dan_mode",
                Category::Jailbreak,
                r"(?i)\b(dan|developer)\s*mode\b",
                ScanTarget::Normalized,
                None,
            ),
            // --- leak ---
            pattern(
                "system_prompt_reveal",
                Category::Leak,
                r"(?i)(system\s+prompt|reveal\s+your\s+(hidden\s+)?instructions?|show\s+me\s+your\s+(prompt|instructions?))",
                ScanTarget::Normalized,
                None,
            ),
            pattern(
                "config_reveal",
                Category::Leak,
                r"(?i)(reveal|show|print|output)\s+(your\s+)?(configuration|config|secrets)\b",
                ScanTarget::Normalized,
                None,
            ),
            // --- pii ---
            pattern(
                "ssn",
                Category::Pii,
                r"\b\d{3}-\d{2}-\d{4}\b",
                ScanTarget::Original,
                Some(valid_ssn),
            ),
            pattern(
                "credit_card",
                Category::Pii,
                r"\b\d{4}[\s-]?\d{4}[\s-]?\d{4}[\s-]?\d{4}\b",
                ScanTarget::Original,
                Some(luhn_valid),
            ),
            pattern(
                "email",
                Category::Pii,
                r"(?i)\b[a-z0-9._%+-]+@[a-z0-9.-]+\.[a-z]{2,}\b",
                ScanTarget::Original,
                None,
            ),
        ];

        Self { patterns }
    }

    /// Scans in catalog order and returns the first matching signature.
    pub fn scan(&self, text: &NormalizedText) -> Option<PatternHit> {
        for p in &self.patterns {
            let haystack = match p.target {
                ScanTarget::Normalized => text.normalized.as_str(),
                ScanTarget::Original => text.original.as_str(),
            };

            let hit = match p.validate {
                None => p.regex.is_match(haystack),
                Some(validate) => p.regex.find_iter(haystack).any(|m| validate(m.as_str())),
            };

            if hit {
                return Some(PatternHit {
                    id: p.id,
                    category: p.category,
                });
            }
        }
        None
    }

    /// Number of signatures in the catalog.
    pub fn len(&self) -> usize {
        self.patterns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }
}

fn pattern(
    id: &'static str,
    category: Category,
    re: &str,
    target: ScanTarget,
    validate: Option<fn(&str) -> bool>,
) -> Pattern {
    Pattern {
        id,
        category,
        regex: Regex::new(re).expect("builtin pattern regex is valid"),
        target,
        validate,
    }
}

/// Rejects SSN-shaped strings with invalid area numbers (000, 666,
/// 900-999) per the SSA allocation rules.
fn valid_ssn(candidate: &str) -> bool {
    let area = &candidate[..3];
    !(area == "000" || area == "666" || area.starts_with('9'))
        && &candidate[4..6] != "00"
        && &candidate[7..] != "0000"
}

/// Luhn checksum over the digits of a card-number candidate.
fn luhn_valid(candidate: &str) -> bool {
    let digits: Vec<u32> = candidate.chars().filter_map(|c| c.to_digit(10)).collect();
    if digits.len() != 16 {
        return false;
    }
    let sum: u32 = digits
        .iter()
        .rev()
        .enumerate()
        .map(|(i, &d)| {
            if i % 2 == 1 {
                let doubled = d * 2;
                if doubled > 9 {
                    doubled - 9
                } else {
                    doubled
                }
            } else {
                d
            }
        })
        .sum();
    sum % 10 == 0
}
