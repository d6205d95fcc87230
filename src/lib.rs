pub mod aggregation;
pub mod auth;
pub mod commands;
pub mod config;
pub mod database;
pub mod error;
pub mod ingestion;
pub mod pricing;
pub mod query;
pub mod routes;
pub mod server;
#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;
pub mod utils;

pub use config::Config;
pub use server::Server;
