pub mod api_keys;
pub mod customers;
pub mod events;
pub mod rollups;

pub use api_keys::ApiKeysDao;
pub use customers::CustomersDao;
pub use events::{AppendOutcome, EventQuery, EventsDao, StoreError};
pub use rollups::{GroupedTotals, RollupsDao};
