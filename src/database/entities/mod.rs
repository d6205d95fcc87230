pub mod api_keys;
pub mod customers;
pub mod daily_cost_rollups;
pub mod usage_events;

pub use api_keys::Entity as ApiKeys;
pub use customers::Entity as Customers;
pub use daily_cost_rollups::Entity as DailyCostRollups;
pub use usage_events::Entity as UsageEvents;
pub use usage_events::NewUsageEvent;

// Type aliases
pub type CustomerRecord = customers::Model;
pub type ApiKeyRecord = api_keys::Model;
pub type UsageEventRecord = usage_events::Model;
pub type DailyCostRollup = daily_cost_rollups::Model;
