use clap::{Args, Subcommand};
use serde_json::Value;
use std::path::PathBuf;
use whm_core::{SubmitOutcome, SyncCoordinator};

use super::OutputFormat;

#[derive(Args)]
pub struct MovementCommand {
    #[command(subcommand)]
    pub command: MovementSubcommand,
}

#[derive(Subcommand)]
pub enum MovementSubcommand {
    /// Queue a stock movement and try to deliver it right away
    Submit {
        /// Movement as inline JSON
        #[arg(long, conflicts_with = "file", required_unless_present = "file")]
        json: Option<String>,

        /// Read the movement JSON from a file
        #[arg(long)]
        file: Option<PathBuf>,
    },

    /// List movements waiting for delivery
    List {
        /// Output format
        #[arg(long, short, value_enum, default_value = "text")]
        format: OutputFormat,
    },

    /// Remove queued movements whose stored data can't be read
    PurgeUnreadable,
}

impl MovementCommand {
    pub async fn run(&self, coordinator: &SyncCoordinator) -> Result<(), Box<dyn std::error::Error>> {
        match &self.command {
            MovementSubcommand::Submit { json, file } => {
                let raw = match (json, file) {
                    (Some(json), _) => json.clone(),
                    (None, Some(path)) => std::fs::read_to_string(path)?,
                    (None, None) => return Err("Pass --json or --file".into()),
                };
                let payload: Value = serde_json::from_str(&raw)
                    .map_err(|e| format!("Invalid movement JSON: {}", e))?;

                match coordinator.submit_stock_movement(&payload).await? {
                    SubmitOutcome::Delivered { id } => {
                        println!("Delivered stock movement #{}", id);
                    }
                    SubmitOutcome::Queued { id, cause } => {
                        let pending = coordinator.pending().await?.len();
                        println!("Queued stock movement #{} ({})", id, cause);
                        println!(
                            "{} movement(s) waiting. Run 'whm sync' to retry.",
                            pending
                        );
                    }
                }
                Ok(())
            }

            MovementSubcommand::List { format } => {
                let pending = coordinator.pending().await?;

                match format {
                    OutputFormat::Json => {
                        println!("{}", serde_json::to_string_pretty(&pending)?);
                    }
                    OutputFormat::Text => {
                        let unreadable = coordinator.store().list_unreadable().await?;
                        if pending.is_empty() {
                            println!("No queued movements");
                        } else {
                            for operation in &pending {
                                println!("  #{:<6} {}", operation.id, operation.payload);
                            }
                            println!("\nTotal: {} queued movement(s)", pending.len());
                        }
                        print_unreadable_note(&unreadable);
                    }
                }
                Ok(())
            }

            MovementSubcommand::PurgeUnreadable => {
                let purged = coordinator.store().purge_unreadable().await?;
                if purged == 0 {
                    println!("No unreadable movements");
                } else {
                    println!("Removed {} unreadable movement(s)", purged);
                }
                Ok(())
            }
        }
    }
}

/// Tells the user about outbox rows that will never be delivered.
pub(crate) fn print_unreadable_note(unreadable: &[i64]) {
    if unreadable.is_empty() {
        return;
    }
    let ids: Vec<String> = unreadable.iter().map(|id| format!("#{}", id)).collect();
    println!(
        "{} unreadable movement(s) can't be delivered: {}",
        unreadable.len(),
        ids.join(", ")
    );
    println!("Run 'whm movement purge-unreadable' to remove them.");
}
