use crate::Config;
use crate::auth::ApiKeyValidator;
use crate::database::{DatabaseManager, DatabaseManagerImpl};
use clap::Subcommand;
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

#[derive(Subcommand)]
pub enum ApiKeyAction {
    /// Issue a key for a customer; the key is printed once
    Create {
        #[arg(long)]
        customer: Uuid,
        #[arg(long, default_value = "default")]
        name: String,
    },
    /// Revoke a key permanently
    Revoke {
        #[arg(long)]
        id: Uuid,
    },
    /// List a customer's keys
    List {
        #[arg(long)]
        customer: Uuid,
    },
}

pub async fn handle_api_key_command(
    action: ApiKeyAction,
    config: &Config,
) -> Result<(), Box<dyn std::error::Error>> {
    let database: Arc<dyn DatabaseManager> =
        Arc::new(DatabaseManagerImpl::new_from_config(config).await?);

    match action {
        ApiKeyAction::Create { customer, name } => {
            if database.customers().find_by_id(customer).await?.is_none() {
                return Err(format!("customer {} not found", customer).into());
            }

            let validator = ApiKeyValidator::new(database.clone(), &config.api_keys);
            let issued = validator.issue(customer, &name).await?;
            info!(api_key_id = %issued.record.id, customer_id = %customer, "Issued API key");
            println!("id:  {}", issued.record.id);
            println!("key: {}", issued.key);
        }
        ApiKeyAction::Revoke { id } => {
            let key = database.api_keys().revoke(id).await?;
            info!(api_key_id = %key.id, customer_id = %key.customer_id, "Revoked API key");
        }
        ApiKeyAction::List { customer } => {
            for key in database.api_keys().find_by_customer(customer).await? {
                let status = if key.is_active() { "active" } else { "revoked" };
                let last_used = key
                    .last_used_at
                    .map(|t| t.to_rfc3339())
                    .unwrap_or_else(|| "never".to_string());
                println!(
                    "{}  {}...  {:<8} {}  last used {}",
                    key.id, key.key_prefix, status, key.name, last_used
                );
            }
        }
    }

    Ok(())
}
