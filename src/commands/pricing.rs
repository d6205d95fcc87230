use crate::Config;
use crate::pricing::PricingTable;
use clap::Subcommand;

#[derive(Subcommand)]
pub enum PricingAction {
    /// Print the active pricing table (USD per 1M tokens)
    Show,
    /// Compute the cost of one call
    Quote {
        model: String,
        input_tokens: i64,
        output_tokens: i64,
    },
}

pub fn handle_pricing_command(
    action: PricingAction,
    config: &Config,
) -> Result<(), Box<dyn std::error::Error>> {
    let table = PricingTable::load(&config.pricing)?;

    match action {
        PricingAction::Show => {
            println!("{:<40} {:<12} {:>12} {:>12}", "model", "provider", "input", "output");
            for (model, provider, rates) in table.entries() {
                println!(
                    "{:<40} {:<12} {:>12} {:>12}",
                    model, provider, rates.input_per_million, rates.output_per_million
                );
            }
        }
        PricingAction::Quote {
            model,
            input_tokens,
            output_tokens,
        } => {
            let cost = table.compute_cost(&model, input_tokens, output_tokens)?;
            println!("input:  {}", cost.input_cost);
            println!("output: {}", cost.output_cost);
            println!("total:  {}", cost.total_cost);
        }
    }

    Ok(())
}
