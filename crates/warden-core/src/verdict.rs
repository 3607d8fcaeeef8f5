//! Guardrail verdicts.

use serde::{Serialize, Serializer};

/// Which guardrail stage produced the verdict.
///
/// Serializes as `1`, `2`, or `"all"` on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tier {
    One,
    Two,
    All,
}

impl Serialize for Tier {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match self {
            Tier::One => serializer.serialize_u8(1),
            Tier::Two => serializer.serialize_u8(2),
            Tier::All => serializer.serialize_str("all"),
        }
    }
}

/// How the verdict was reached. Lets the routing layer map a breaker
/// rejection to service-unavailable and an internal fault to a server
/// error without parsing reason strings. Not part of the wire shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    /// Passed every check.
    Pass,
    /// Prompt exceeded the configured maximum length.
    TooLong,
    /// Blocked by a Tier 1 signature.
    PatternBlock,
    /// Blocked by the semantic judge.
    JudgeBlock,
    /// Circuit breaker rejected the judge call.
    ServiceUnavailable,
    /// Judge failure or internal fault; failed closed.
    CheckFailed,
}

/// The final safe/unsafe decision for one prompt.
///
/// Produced fresh per request, never mutated after construction.
/// An unsafe verdict always carries a non-empty reason; a Tier 1
/// verdict always carries its pattern id; a Tier 2 verdict never does.
#[derive(Debug, Clone, Serialize)]
pub struct GuardrailVerdict {
    pub safe: bool,
    pub reason: String,
    pub tier: Tier,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pattern: Option<&'static str>,
    pub latency_ms: u64,
    #[serde(skip)]
    pub disposition: Disposition,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn verdict(tier: Tier) -> GuardrailVerdict {
        GuardrailVerdict {
            safe: false,
            reason: "detected: prompt injection".to_string(),
            tier,
            pattern: Some("ignore_instructions"),
            latency_ms: 3,
            disposition: Disposition::PatternBlock,
        }
    }

    #[test]
    fn tier_one_serializes_as_number() {
        let json = serde_json::to_value(verdict(Tier::One)).unwrap();
        assert_eq!(json["tier"], 1);
        assert_eq!(json["pattern"], "ignore_instructions");
    }

    #[test]
    fn tier_all_serializes_as_string() {
        let json = serde_json::to_value(verdict(Tier::All)).unwrap();
        assert_eq!(json["tier"], "all");
    }

    #[test]
    fn absent_pattern_is_omitted() {
        let mut v = verdict(Tier::Two);
        v.pattern = None;
        let json = serde_json::to_value(v).unwrap();
        assert!(json.get("pattern").is_none());
    }

    #[test]
    fn disposition_is_not_serialized() {
        let json = serde_json::to_value(verdict(Tier::One)).unwrap();
        assert!(json.get("disposition").is_none());
    }
}
