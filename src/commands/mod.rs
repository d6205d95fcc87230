pub mod api_keys;
pub mod customers;
pub mod migrate;
pub mod pricing;

use crate::Config;
use clap::Subcommand;

#[derive(Subcommand)]
pub enum Commands {
    /// Start the HTTP server (the default when no command is given)
    Serve,
    /// Run database migrations
    Migrate {
        #[command(subcommand)]
        action: migrate::MigrateAction,
    },
    /// Manage customers
    Customer {
        #[command(subcommand)]
        action: customers::CustomerAction,
    },
    /// Issue and revoke API keys
    ApiKey {
        #[command(subcommand)]
        action: api_keys::ApiKeyAction,
    },
    /// Inspect the pricing table
    Pricing {
        #[command(subcommand)]
        action: pricing::PricingAction,
    },
}

pub async fn handle_command(
    command: Commands,
    config: &Config,
) -> Result<(), Box<dyn std::error::Error>> {
    match command {
        Commands::Serve => {
            let server = crate::Server::new(config.clone()).await?;
            server.run().await?;
            Ok(())
        }
        Commands::Migrate { action } => migrate::handle_migrate_command(action, config).await,
        Commands::Customer { action } => {
            customers::handle_customer_command(action, config).await
        }
        Commands::ApiKey { action } => api_keys::handle_api_key_command(action, config).await,
        Commands::Pricing { action } => pricing::handle_pricing_command(action, config),
    }
}
