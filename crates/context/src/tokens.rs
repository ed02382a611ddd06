//! Token accounting (§4.1): counting, pricing, cost-level classification.
//!
//! Real per-model tokenizers live with each completion provider adapter
//! (they know their own wire format); this module supplies the
//! provider-agnostic fallback estimator and the pricing/classification glue
//! so callers that don't have a provider handy (e.g. the Context Builder,
//! deciding where to stop before a provider is even chosen) can still budget
//! tokens conservatively.

use parley_domain::config::ModelPricing;
use parley_domain::model::CostLevel;
use std::collections::HashMap;

/// Conservative fallback estimator: ~4 characters per token. Used whenever
/// a model's real tokenizer isn't available.
pub fn estimate_tokens(text: &str) -> u32 {
    (text.chars().count() as u32).div_ceil(4)
}

/// Look up per-million-token pricing for a model, if configured.
pub fn price<'a>(model: &str, pricing: &'a HashMap<String, ModelPricing>) -> Option<&'a ModelPricing> {
    pricing.get(model)
}

/// Classify a conversation's accumulated cost against its configured
/// warning threshold. Thin re-export of the domain-level table so callers
/// can reach it through the same module as the rest of token accounting.
pub fn classify(total_cost: f64, threshold: f64) -> CostLevel {
    CostLevel::classify(total_cost, threshold)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn estimate_tokens_rounds_up() {
        assert_eq!(estimate_tokens("abcd"), 1);
        assert_eq!(estimate_tokens("abcde"), 2);
        assert_eq!(estimate_tokens(""), 0);
    }

    #[test]
    fn price_missing_model_is_none() {
        let pricing = HashMap::new();
        assert!(price("gpt-4o", &pricing).is_none());
    }

    #[test]
    fn price_known_model_returns_pricing() {
        let mut pricing = HashMap::new();
        pricing.insert(
            "gpt-4o".to_string(),
            ModelPricing {
                input_per_1m: 2.5,
                output_per_1m: 10.0,
            },
        );
        let p = price("gpt-4o", &pricing).unwrap();
        assert_eq!(p.input_per_1m, 2.5);
    }

    #[test]
    fn classify_matches_domain_table() {
        assert_eq!(classify(0.4, 1.0), CostLevel::None);
        assert_eq!(classify(2.0, 1.0), CostLevel::Critical);
    }
}
