use serde::{Deserialize, Serialize};

/// What ingestion does with a model that has no pricing entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnknownModelPolicy {
    /// Refuse the event with `UnknownModel`
    #[default]
    Reject,
    /// Store the event with zero cost and `priced = false`
    RecordUnpriced,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PricingConfig {
    #[serde(default)]
    pub unknown_model_policy: UnknownModelPolicy,
    /// Optional CSV file replacing the embedded pricing table
    #[serde(default)]
    pub table_path: Option<String>,
}
