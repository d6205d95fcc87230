use rust_decimal::Decimal;
use serde::Deserialize;
use std::collections::HashSet;
use std::str::FromStr;
use tracing::{debug, warn};

/// One row of the pricing CSV.
///
/// Expected header (column order matters):
/// ```csv
/// model,provider,input_per_million,output_per_million,aliases
/// claude-sonnet-4-20250514,anthropic,3.00,15.00,
/// claude-3-5-haiku-20241022,anthropic,0.80,4.00,claude-3.5-haiku
/// ```
///
/// Prices are USD per 1,000,000 tokens and are read as exact decimals, never
/// through `f64`. `aliases` is optional and `;`-separated.
#[derive(Debug, Deserialize)]
struct PricingRow {
    model: String,
    provider: String,
    input_per_million: String,
    output_per_million: String,
    aliases: Option<String>,
}

/// A validated pricing entry
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PricingEntry {
    pub model: String,
    pub provider: String,
    pub input_per_million: Decimal,
    pub output_per_million: Decimal,
    pub aliases: Vec<String>,
}

/// A single rejected CSV line
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PricingLineError {
    pub line_number: usize,
    pub message: String,
}

/// All failures found while parsing a pricing table
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PricingCsvError {
    pub errors: Vec<PricingLineError>,
}

impl std::fmt::Display for PricingCsvError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.errors.first() {
            Some(first) => write!(
                f,
                "{} invalid pricing line(s), first at line {}: {}",
                self.errors.len(),
                first.line_number,
                first.message
            ),
            None => write!(f, "invalid pricing table"),
        }
    }
}

impl std::error::Error for PricingCsvError {}

/// Parse pricing CSV content, failing if any line is invalid.
///
/// Every line is checked, so the error lists all bad lines instead of just the first.
pub fn parse_pricing_csv(csv_content: &str) -> Result<Vec<PricingEntry>, PricingCsvError> {
    let mut reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_reader(csv_content.as_bytes());

    let mut entries = Vec::new();
    let mut errors = Vec::new();
    let mut seen_names = HashSet::new();

    for (index, result) in reader.deserialize::<PricingRow>().enumerate() {
        // Header is line 1
        let line_number = index + 2;

        let row = match result {
            Ok(row) => row,
            Err(e) => {
                warn!(line = line_number, error = %e, "Failed to parse pricing line");
                errors.push(PricingLineError {
                    line_number,
                    message: e.to_string(),
                });
                continue;
            }
        };

        match validate_row(row) {
            Ok(entry) => {
                let names = std::iter::once(&entry.model).chain(entry.aliases.iter());
                let duplicate = names.clone().find(|name| seen_names.contains(*name)).cloned();
                if let Some(name) = duplicate {
                    errors.push(PricingLineError {
                        line_number,
                        message: format!("model name '{}' is defined more than once", name),
                    });
                    continue;
                }
                seen_names.extend(names.cloned());
                entries.push(entry);
            }
            Err(message) => errors.push(PricingLineError {
                line_number,
                message,
            }),
        }
    }

    if !errors.is_empty() {
        return Err(PricingCsvError { errors });
    }

    debug!(models = entries.len(), "Parsed pricing table");
    Ok(entries)
}

fn validate_row(row: PricingRow) -> Result<PricingEntry, String> {
    if row.model.is_empty() {
        return Err("model name is empty".to_string());
    }

    let input_per_million = parse_rate(&row.input_per_million, "input_per_million")?;
    let output_per_million = parse_rate(&row.output_per_million, "output_per_million")?;

    let aliases = row
        .aliases
        .as_deref()
        .unwrap_or_default()
        .split(';')
        .map(str::trim)
        .filter(|alias| !alias.is_empty())
        .map(str::to_string)
        .collect();

    Ok(PricingEntry {
        model: row.model,
        provider: row.provider,
        input_per_million,
        output_per_million,
        aliases,
    })
}

fn parse_rate(raw: &str, field: &str) -> Result<Decimal, String> {
    let rate = Decimal::from_str(raw).map_err(|e| format!("{} '{}': {}", field, raw, e))?;
    if rate.is_sign_negative() {
        return Err(format!("{} must not be negative, got {}", field, raw));
    }
    Ok(rate)
}
