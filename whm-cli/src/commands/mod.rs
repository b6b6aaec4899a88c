mod auth;
mod config_cmd;
mod movement;
mod product;
mod scan;
mod sync_cmd;

pub use auth::AuthCommand;
pub use config_cmd::ConfigCommand;
pub use movement::{MovementCommand, MovementSubcommand};
pub use product::ProductCommand;
pub use scan::ScanCommand;
pub use sync_cmd::SyncCommand;

use clap::ValueEnum;

#[derive(Clone, ValueEnum, Default)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}
