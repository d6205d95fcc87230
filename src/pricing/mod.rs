//! Model pricing lookup and per-call cost computation
//!
//! The pricing table is loaded once at startup and shared read-only. Costs
//! are fixed-point decimals with [`COST_SCALE`] fractional digits.

pub mod config;
mod parser;

pub use config::{PricingConfig, UnknownModelPolicy};
pub use parser::{PricingCsvError, PricingEntry, PricingLineError, parse_pricing_csv};

use rust_decimal::{Decimal, RoundingStrategy, prelude::ToPrimitive};
use serde::Serialize;
use std::collections::HashMap;
use thiserror::Error;
use tracing::info;

/// Fractional digits kept on every stored cost
pub const COST_SCALE: u32 = 9;

/// Prices are quoted per this many tokens
const TOKENS_PER_QUOTE: i64 = 1_000_000;

const NANOS_PER_USD: i64 = 1_000_000_000;

static EMBEDDED_PRICING: &str = include_str!("../../data/pricing.csv");

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PricingError {
    #[error("Unknown model: {0}")]
    UnknownModel(String),
    #[error("Invalid pricing table: {0}")]
    InvalidTable(String),
    #[error("Cost out of range for model {0}")]
    Overflow(String),
}

/// Per-token rates for a model, quoted per 1M tokens
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ModelRates {
    pub input_per_million: Decimal,
    pub output_per_million: Decimal,
}

/// Cost of one call. `total_cost` is always the exact sum of the parts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CostBreakdown {
    pub input_cost: Decimal,
    pub output_cost: Decimal,
    pub total_cost: Decimal,
}

impl CostBreakdown {
    pub fn zero() -> Self {
        Self {
            input_cost: Decimal::ZERO,
            output_cost: Decimal::ZERO,
            total_cost: Decimal::ZERO,
        }
    }

    pub fn is_consistent(&self) -> bool {
        self.input_cost + self.output_cost == self.total_cost
    }
}

impl ModelRates {
    /// Cost for the given token counts under these rates
    pub fn cost_for(&self, input_tokens: i64, output_tokens: i64) -> Option<CostBreakdown> {
        let input_cost = token_cost(input_tokens, self.input_per_million)?;
        let output_cost = token_cost(output_tokens, self.output_per_million)?;

        Some(CostBreakdown {
            input_cost,
            output_cost,
            total_cost: input_cost.checked_add(output_cost)?,
        })
    }
}

fn token_cost(tokens: i64, rate_per_million: Decimal) -> Option<Decimal> {
    Decimal::from(tokens)
        .checked_mul(rate_per_million)?
        .checked_div(Decimal::from(TOKENS_PER_QUOTE))
        .map(|cost| {
            cost.round_dp_with_strategy(COST_SCALE, RoundingStrategy::MidpointNearestEven)
                .normalize()
        })
}

/// Convert a cost into integer nano-USD for storage
pub fn cost_to_nanos(cost: Decimal) -> Option<i64> {
    cost.round_dp_with_strategy(COST_SCALE, RoundingStrategy::MidpointNearestEven)
        .checked_mul(Decimal::from(NANOS_PER_USD))?
        .to_i64()
}

/// Convert stored nano-USD back into a decimal cost
pub fn cost_from_nanos(nanos: i64) -> Decimal {
    Decimal::new(nanos, COST_SCALE).normalize()
}

#[derive(Debug, Clone)]
struct PricedModel {
    provider: String,
    rates: ModelRates,
}

/// Immutable model → rates lookup
#[derive(Debug, Clone)]
pub struct PricingTable {
    models: HashMap<String, PricedModel>,
    aliases: HashMap<String, String>,
}

impl PricingTable {
    /// Table compiled into the binary
    pub fn embedded() -> Result<Self, PricingError> {
        Self::from_csv(EMBEDDED_PRICING)
    }

    pub fn from_csv(csv_content: &str) -> Result<Self, PricingError> {
        let entries =
            parse_pricing_csv(csv_content).map_err(|e| PricingError::InvalidTable(e.to_string()))?;
        Ok(Self::from_entries(entries))
    }

    pub fn from_entries(entries: Vec<PricingEntry>) -> Self {
        let mut models = HashMap::with_capacity(entries.len());
        let mut aliases = HashMap::new();

        for entry in entries {
            for alias in entry.aliases {
                aliases.insert(alias, entry.model.clone());
            }
            models.insert(
                entry.model,
                PricedModel {
                    provider: entry.provider,
                    rates: ModelRates {
                        input_per_million: entry.input_per_million,
                        output_per_million: entry.output_per_million,
                    },
                },
            );
        }

        Self { models, aliases }
    }

    /// Load the table named by config, falling back to the embedded one
    pub fn load(config: &PricingConfig) -> Result<Self, PricingError> {
        let table = match &config.table_path {
            Some(path) => {
                let content = std::fs::read_to_string(path).map_err(|e| {
                    PricingError::InvalidTable(format!("failed to read {}: {}", path, e))
                })?;
                Self::from_csv(&content)?
            }
            None => Self::embedded()?,
        };

        info!(
            models = table.models.len(),
            aliases = table.aliases.len(),
            source = config.table_path.as_deref().unwrap_or("embedded"),
            "Pricing table loaded"
        );
        Ok(table)
    }

    /// Rates for a model name.
    ///
    /// Lookup order: exact name, alias, then the longest known model `k` such that
    /// the name is `k` followed by a `-suffix` (dated or versioned variants).
    pub fn resolve(&self, model: &str) -> Result<ModelRates, PricingError> {
        self.canonical_name(model)
            .and_then(|name| self.models.get(name))
            .map(|priced| priced.rates)
            .ok_or_else(|| PricingError::UnknownModel(model.to_string()))
    }

    /// Cost of one call. Pure: identical inputs always give identical outputs.
    pub fn compute_cost(
        &self,
        model: &str,
        input_tokens: i64,
        output_tokens: i64,
    ) -> Result<CostBreakdown, PricingError> {
        self.resolve(model)?
            .cost_for(input_tokens, output_tokens)
            .ok_or_else(|| PricingError::Overflow(model.to_string()))
    }

    /// All priced models as `(model, provider, rates)`, sorted by model name
    pub fn entries(&self) -> Vec<(&str, &str, ModelRates)> {
        let mut entries: Vec<_> = self
            .models
            .iter()
            .map(|(name, priced)| (name.as_str(), priced.provider.as_str(), priced.rates))
            .collect();
        entries.sort_by(|a, b| a.0.cmp(b.0));
        entries
    }

    pub fn len(&self) -> usize {
        self.models.len()
    }

    pub fn is_empty(&self) -> bool {
        self.models.is_empty()
    }

    fn canonical_name<'a>(&'a self, model: &'a str) -> Option<&'a str> {
        if self.models.contains_key(model) {
            return Some(model);
        }
        if let Some(target) = self.aliases.get(model) {
            return Some(target.as_str());
        }

        self.models
            .keys()
            .filter(|known| {
                model
                    .strip_prefix(known.as_str())
                    .is_some_and(|rest| rest.starts_with('-'))
            })
            .max_by_key(|known| known.len())
            .map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    fn dec(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    #[test]
    fn test_embedded_table_loads() {
        let table = PricingTable::embedded().unwrap();
        assert!(!table.is_empty());
        let rates = table.resolve("claude-sonnet-4-20250514").unwrap();
        assert_eq!(rates.input_per_million, dec("3.00"));
        assert_eq!(rates.output_per_million, dec("15.00"));
    }

    #[test]
    fn test_compute_cost_reference_scenario() {
        let table = PricingTable::embedded().unwrap();
        let cost = table
            .compute_cost("claude-sonnet-4-20250514", 1500, 800)
            .unwrap();

        assert_eq!(cost.input_cost, dec("0.0045"));
        assert_eq!(cost.output_cost, dec("0.012"));
        assert_eq!(cost.total_cost, dec("0.0165"));
        assert!(cost.is_consistent());
    }

    #[test]
    fn test_compute_cost_is_deterministic() {
        let table = PricingTable::embedded().unwrap();
        let first = table.compute_cost("gemini-1.5-flash", 12_345, 6_789).unwrap();
        let second = table.compute_cost("gemini-1.5-flash", 12_345, 6_789).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_compute_cost_keeps_sub_micro_precision() {
        let table = PricingTable::embedded().unwrap();
        // 1 token at $0.075 / 1M = $0.000000075
        let cost = table.compute_cost("gemini-1.5-flash", 1, 0).unwrap();
        assert_eq!(cost.input_cost, dec("0.000000075"));
        assert_eq!(cost.total_cost, cost.input_cost);
    }

    #[test]
    fn test_unknown_model_is_an_error() {
        let table = PricingTable::embedded().unwrap();
        assert_eq!(
            table.compute_cost("unknown-model-x", 10, 10),
            Err(PricingError::UnknownModel("unknown-model-x".to_string()))
        );
    }

    #[test]
    fn test_alias_resolution() {
        let table = PricingTable::embedded().unwrap();
        assert_eq!(
            table.resolve("claude-3.5-haiku").unwrap(),
            table.resolve("claude-3-5-haiku-20241022").unwrap()
        );
    }

    #[test]
    fn test_dated_variant_uses_longest_match() {
        let table = PricingTable::embedded().unwrap();
        assert_eq!(
            table.resolve("gpt-4o-mini-2024-07-18").unwrap(),
            table.resolve("gpt-4o-mini").unwrap()
        );
        assert_eq!(
            table.resolve("gpt-4o-2024-08-06").unwrap(),
            table.resolve("gpt-4o").unwrap()
        );
        // A bare prefix without a '-' boundary is not a match
        assert!(table.resolve("o1x").is_err());
        assert!(table.resolve("gpt").is_err());
    }

    #[test]
    fn test_zero_tokens_cost_nothing() {
        let table = PricingTable::embedded().unwrap();
        let cost = table.compute_cost("gpt-4", 0, 0).unwrap();
        assert_eq!(cost, CostBreakdown::zero());
    }

    #[test]
    fn test_nanos_conversion() {
        assert_eq!(cost_to_nanos(dec("0.0165")), Some(16_500_000));
        assert_eq!(cost_from_nanos(16_500_000), dec("0.0165"));
        assert_eq!(cost_to_nanos(dec("0.000000075")), Some(75));
        assert_eq!(cost_to_nanos(Decimal::ZERO), Some(0));
    }

    #[test]
    fn test_custom_table() {
        let csv = "model,provider,input_per_million,output_per_million,aliases\nacme-1,acme,1.00,2.00,acme\n";
        let table = PricingTable::from_csv(csv).unwrap();
        assert_eq!(table.len(), 1);
        let cost = table.compute_cost("acme", 1_000_000, 500_000).unwrap();
        assert_eq!(cost.total_cost, dec("2"));
        assert_eq!(table.entries()[0].1, "acme");
    }
}
