use clap::{Args, Subcommand};
use serde_json::Value;
use whm_core::{ProductLookup, Source, SyncCoordinator};

use super::OutputFormat;

#[derive(Args)]
pub struct ProductCommand {
    #[command(subcommand)]
    pub command: ProductSubcommand,
}

#[derive(Subcommand)]
pub enum ProductSubcommand {
    /// Look up a product (uses the local cache when the server is unreachable)
    Show {
        /// Product ID or code
        id: String,

        /// Output format
        #[arg(long, short, value_enum, default_value = "text")]
        format: OutputFormat,
    },
}

impl ProductCommand {
    pub async fn run(&self, coordinator: &SyncCoordinator) -> Result<(), Box<dyn std::error::Error>> {
        match &self.command {
            ProductSubcommand::Show { id, format } => {
                let lookup = coordinator.fetch_product(id).await?;
                print_lookup(id, &lookup, format)?;
                Ok(())
            }
        }
    }
}

pub(super) fn print_lookup(
    id: &str,
    lookup: &ProductLookup,
    format: &OutputFormat,
) -> Result<(), serde_json::Error> {
    match format {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(lookup)?);
        }
        OutputFormat::Text => {
            let heading = match lookup.source {
                Source::Live => format!("Product {}", id),
                Source::Cache => format!("Product {} (cached, server unreachable)", id),
            };
            println!("{}", heading);
            println!("{}", "-".repeat(heading.len()));
            print_document(&lookup.document);
        }
    }
    Ok(())
}

fn print_document(document: &Value) {
    match document {
        Value::Object(map) => {
            let width = map.keys().map(|k| k.len()).max().unwrap_or(0);
            for (key, value) in map {
                println!("{:width$}  {}", key, display_value(value), width = width);
            }
        }
        other => println!("{}", display_value(other)),
    }
}

fn display_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => "-".to_string(),
        other => other.to_string(),
    }
}
