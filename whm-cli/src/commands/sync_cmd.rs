//! Sync CLI commands for delivering queued stock movements.

use clap::{Args, Subcommand};
use whm_core::SyncError;

use super::movement::print_unreadable_note;
use crate::config::Config;
use crate::sync::{credential_store, open_coordinator, ContextError};

/// Deliver queued stock movements to the server
#[derive(Debug, Args)]
pub struct SyncCommand {
    #[command(subcommand)]
    command: Option<SyncSubcommand>,
}

#[derive(Debug, Subcommand)]
enum SyncSubcommand {
    /// Show server, credential and outbox status
    Status,
}

impl SyncCommand {
    pub async fn run(&self, config: &Config) -> Result<(), SyncCommandError> {
        match &self.command {
            None => self.sync(config).await,
            Some(SyncSubcommand::Status) => self.status(config).await,
        }
    }

    async fn sync(&self, config: &Config) -> Result<(), SyncCommandError> {
        let coordinator = open_coordinator(config).await?;

        let queued = coordinator.pending().await?.len();
        let unreadable = coordinator
            .store()
            .list_unreadable()
            .await
            .map_err(SyncError::from)?;
        if queued == 0 {
            if unreadable.is_empty() {
                println!("Outbox is empty, nothing to deliver.");
            } else {
                println!("Nothing to deliver.");
                print_unreadable_note(&unreadable);
            }
            return Ok(());
        }

        println!(
            "Delivering {} queued movement{}...",
            queued,
            if queued == 1 { "" } else { "s" }
        );
        println!();

        match coordinator.flush().await {
            Ok(report) => {
                println!("  ✓ delivered {}", report.delivered);
                println!();
                println!("Sync complete.");
                print_unreadable_note(&unreadable);
                Ok(())
            }
            Err(SyncError::Blocked {
                id,
                delivered,
                source,
            }) => {
                println!("  ✓ delivered {}", delivered);
                println!("  ✗ movement #{} - {}", id, source);
                println!();
                println!("{} movement(s) still queued.", queued.saturating_sub(delivered));
                Err(SyncError::Blocked {
                    id,
                    delivered,
                    source,
                }
                .into())
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn status(&self, config: &Config) -> Result<(), SyncCommandError> {
        println!("Sync Configuration");
        println!("==================");
        println!();

        let Some(server_url) = config.server.base_url.as_deref() else {
            println!("Status: Not configured");
            println!();
            println!("To enable sync, add to your config file:");
            println!();
            println!("  server:");
            println!("    base_url: \"https://openboxes.example.com/openboxes\"");
            println!();
            println!("Or set environment variable:");
            println!("  WHM_SERVER_URL");
            return Ok(());
        };

        println!("Server:    {}", server_url);
        println!("Products:  {}", config.server.product_endpoint);
        println!("Movements: {}", config.server.movement_endpoint);
        println!(
            "Auto-sync: {}",
            if config.server.auto_sync {
                "enabled"
            } else {
                "disabled"
            }
        );

        let auth = match credential_store(config).load() {
            Ok(Some(credential)) => format!("{} ({})", credential.mode(), credential.masked()),
            Ok(None) => "not logged in".to_string(),
            Err(e) => format!("unreadable ({})", e),
        };
        println!("Auth:      {}", auth);

        let coordinator = open_coordinator(config).await?;
        let queued = coordinator.store().queued_count().await.map_err(SyncError::from)?;
        let unreadable = coordinator
            .store()
            .list_unreadable()
            .await
            .map_err(SyncError::from)?;
        if unreadable.is_empty() {
            println!("Queued:    {}", queued);
        } else {
            println!("Queued:    {} ({} unreadable)", queued, unreadable.len());
            println!();
            print_unreadable_note(&unreadable);
        }

        Ok(())
    }
}

/// Errors from sync commands
#[derive(Debug)]
pub enum SyncCommandError {
    ContextError(ContextError),
    SyncError(SyncError),
}

impl std::fmt::Display for SyncCommandError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SyncCommandError::ContextError(e) => write!(f, "{}", e),
            SyncCommandError::SyncError(e) => write!(f, "{}", e),
        }
    }
}

impl std::error::Error for SyncCommandError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            SyncCommandError::ContextError(e) => Some(e),
            SyncCommandError::SyncError(e) => Some(e),
        }
    }
}

impl From<ContextError> for SyncCommandError {
    fn from(e: ContextError) -> Self {
        SyncCommandError::ContextError(e)
    }
}

impl From<SyncError> for SyncCommandError {
    fn from(e: SyncError) -> Self {
        SyncCommandError::SyncError(e)
    }
}
