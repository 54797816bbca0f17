//! Token accounting and a rough USD cost estimate per run.

use serde::{Deserialize, Serialize};

/// Per-million-token prices in USD: (model prefix, input, output).
const MODEL_PRICING: &[(&str, f64, f64)] = &[("gpt-4o-mini", 0.15, 0.60)];

/// Token usage for a generation.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq)]
pub struct Usage {
    pub input_tokens: u32,
    pub output_tokens: u32,
    pub total_tokens: u32,
}

/// Estimated cost for a generation.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct Cost {
    pub input_cost: f64,
    pub output_cost: f64,
    pub total_cost: f64,
    pub currency: String,
}

impl Cost {
    /// Compute cost from usage and per-token pricing.
    pub fn from_usage(usage: &Usage, input_price_per_m: f64, output_price_per_m: f64) -> Self {
        let input_cost = (usage.input_tokens as f64 / 1_000_000.0) * input_price_per_m;
        let output_cost = (usage.output_tokens as f64 / 1_000_000.0) * output_price_per_m;
        Self {
            input_cost,
            output_cost,
            total_cost: round_micro(input_cost + output_cost),
            currency: "USD".to_string(),
        }
    }

    /// Estimate cost for a known model; unknown models cost nothing.
    pub fn estimate(model: &str, usage: &Usage) -> Self {
        match pricing_for(model) {
            Some((input, output)) => Self::from_usage(usage, input, output),
            None => Self {
                currency: "USD".to_string(),
                ..Default::default()
            },
        }
    }
}

/// Resolve pricing by model prefix, so dated snapshots share a price.
fn pricing_for(model: &str) -> Option<(f64, f64)> {
    MODEL_PRICING
        .iter()
        .find(|(prefix, _, _)| model.starts_with(prefix))
        .map(|(_, input, output)| (*input, *output))
}

fn round_micro(value: f64) -> f64 {
    (value * 1_000_000.0).round() / 1_000_000.0
}
