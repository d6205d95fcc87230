use crate::Config;
use crate::database::{DatabaseManager, DatabaseManagerImpl};
use clap::Subcommand;
use tracing::info;

#[derive(Subcommand)]
pub enum CustomerAction {
    /// Create a customer account
    Create {
        #[arg(long)]
        email: String,
        #[arg(long, default_value = "starter")]
        plan: String,
    },
}

pub async fn handle_customer_command(
    action: CustomerAction,
    config: &Config,
) -> Result<(), Box<dyn std::error::Error>> {
    let db_manager = DatabaseManagerImpl::new_from_config(config).await?;

    match action {
        CustomerAction::Create { email, plan } => {
            if let Some(existing) = db_manager.customers().find_by_email(&email).await? {
                return Err(format!("customer {} already exists ({})", email, existing.id).into());
            }

            let customer = db_manager.customers().create(&email, &plan).await?;
            info!(customer_id = %customer.id, email = %customer.email, "Created customer");
            println!("{}", customer.id);
        }
    }

    Ok(())
}
