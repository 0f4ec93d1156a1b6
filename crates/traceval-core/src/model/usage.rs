//! Token and cost counters.

use std::ops::{Add, AddAssign};

use serde::{Deserialize, Serialize};

use crate::domain::SpanPayload;

pub(crate) mod keys {
    pub const PROMPT_TOKENS: &str = "llm.token_count.prompt";
    pub const COMPLETION_TOKENS: &str = "llm.token_count.completion";
    pub const TOTAL_TOKENS: &str = "llm.token_count.total";
    pub const COST: &str = "llm.cost";
}

/// Token usage and cost of one or more model calls. Component-wise additive;
/// token counters saturate at `u64::MAX`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct TokenUsage {
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
    pub total_tokens: u64,
    pub cost: f64,
}

impl TokenUsage {
    /// Decode usage from span attributes. Missing counters are zero; a
    /// missing total is the sum of prompt and completion tokens.
    pub fn from_payload(payload: &SpanPayload) -> Self {
        let prompt_tokens = payload.attr_u64(keys::PROMPT_TOKENS).unwrap_or(0);
        let completion_tokens = payload.attr_u64(keys::COMPLETION_TOKENS).unwrap_or(0);
        let total_tokens = payload
            .attr_u64(keys::TOTAL_TOKENS)
            .unwrap_or(prompt_tokens.saturating_add(completion_tokens));
        let cost = payload
            .attr_f64(keys::COST)
            .filter(|c| c.is_finite())
            .unwrap_or(0.0);
        Self {
            prompt_tokens,
            completion_tokens,
            total_tokens,
            cost,
        }
    }

    pub fn is_zero(&self) -> bool {
        *self == Self::default()
    }
}

impl Add for TokenUsage {
    type Output = Self;

    fn add(self, rhs: Self) -> Self {
        Self {
            prompt_tokens: self.prompt_tokens.saturating_add(rhs.prompt_tokens),
            completion_tokens: self.completion_tokens.saturating_add(rhs.completion_tokens),
            total_tokens: self.total_tokens.saturating_add(rhs.total_tokens),
            cost: self.cost + rhs.cost,
        }
    }
}

impl AddAssign for TokenUsage {
    fn add_assign(&mut self, rhs: Self) {
        *self = *self + rhs;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::RawSpan;
    use serde_json::json;

    #[test]
    fn test_total_defaults_to_sum() {
        let span = RawSpan::new("s", None, "llm")
            .with_attribute(keys::PROMPT_TOKENS, json!(10))
            .with_attribute(keys::COMPLETION_TOKENS, json!(5));
        let usage = TokenUsage::from_payload(&span.payload);
        assert_eq!(usage.total_tokens, 15);
    }

    #[test]
    fn test_explicit_total_wins() {
        let span = RawSpan::new("s", None, "llm")
            .with_attribute(keys::PROMPT_TOKENS, json!(10))
            .with_attribute(keys::TOTAL_TOKENS, json!(40))
            .with_attribute(keys::COST, json!(0.25));
        let usage = TokenUsage::from_payload(&span.payload);
        assert_eq!(usage.total_tokens, 40);
        assert_eq!(usage.cost, 0.25);
    }

    #[test]
    fn test_add_is_component_wise() {
        let a = TokenUsage {
            prompt_tokens: 1,
            completion_tokens: 2,
            total_tokens: 3,
            cost: 0.5,
        };
        let mut b = a;
        b += a;
        assert_eq!(b.prompt_tokens, 2);
        assert_eq!(b.completion_tokens, 4);
        assert_eq!(b.total_tokens, 6);
        assert_eq!(b.cost, 1.0);
        assert!(TokenUsage::default().is_zero());
    }

    #[test]
    fn test_counters_saturate_instead_of_overflowing() {
        let span = RawSpan::new("s", None, "embedding")
            .with_attribute(keys::PROMPT_TOKENS, json!(u64::MAX))
            .with_attribute(keys::COMPLETION_TOKENS, json!(1));
        let usage = TokenUsage::from_payload(&span.payload);
        assert_eq!(usage.total_tokens, u64::MAX);

        let half = TokenUsage {
            total_tokens: u64::MAX / 2 + 1,
            ..TokenUsage::default()
        };
        let sum = half + half + usage;
        assert_eq!(sum.total_tokens, u64::MAX);
        assert_eq!(sum.prompt_tokens, u64::MAX);
        assert_eq!(sum.completion_tokens, 1);
    }
}
