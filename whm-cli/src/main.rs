use clap::{Parser, Subcommand};
use std::error::Error;
use std::path::PathBuf;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use whm_core::{ApiError, SyncError};

mod commands;
mod config;
mod sync;

use commands::{
    AuthCommand, ConfigCommand, MovementCommand, MovementSubcommand, ProductCommand,
    ScanCommand, SyncCommand,
};
use config::Config;
use sync::{open_coordinator, try_auto_sync};

#[derive(Parser)]
#[command(name = "whm")]
#[command(version)]
#[command(about = "Offline-first warehouse client: product lookup and stock movements", long_about = None)]
struct Cli {
    /// Path to config file
    #[arg(long, short, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Log in to or out of the server
    Auth(AuthCommand),

    /// Scan or enter a barcode and look up the product
    Scan(ScanCommand),

    /// Look up products
    Product(ProductCommand),

    /// Submit and list stock movements
    Movement(MovementCommand),

    /// Deliver queued stock movements
    Sync(SyncCommand),

    /// Manage configuration
    Config(ConfigCommand),
}

#[tokio::main]
async fn main() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "whm=warn,whm_core=warn".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    if let Err(e) = run().await {
        eprintln!("Error: {}", e);
        if let Some(hint) = hint_for(e.as_ref()) {
            eprintln!("{}", hint);
        }
        std::process::exit(1);
    }
}

async fn run() -> Result<(), Box<dyn Error>> {
    let cli = Cli::parse();

    let cli_config_path = cli.config.clone();
    let config = Config::load(cli.config)?;

    // Deliver queued movements BEFORE read commands
    if is_read_command(&cli.command) {
        try_auto_sync(&config).await;
    }

    execute_command(&cli.command, &config, cli_config_path).await
}

async fn execute_command(
    command: &Option<Commands>,
    config: &Config,
    cli_config_path: Option<PathBuf>,
) -> Result<(), Box<dyn Error>> {
    match command {
        Some(Commands::Auth(cmd)) => {
            cmd.run(config)?;
        }
        Some(Commands::Scan(cmd)) => {
            cmd.run(config).await?;
        }
        Some(Commands::Product(cmd)) => {
            let coordinator = open_coordinator(config).await?;
            cmd.run(&coordinator).await?;
        }
        Some(Commands::Movement(cmd)) => {
            let coordinator = open_coordinator(config).await?;
            cmd.run(&coordinator).await?;
        }
        Some(Commands::Sync(cmd)) => {
            cmd.run(config).await?;
        }
        Some(Commands::Config(cmd)) => {
            cmd.run(config, cli_config_path)?;
        }
        None => {
            println!("Use --help to see available commands");
        }
    }

    Ok(())
}

/// Returns true if the command reads server data and should flush the outbox first.
fn is_read_command(cmd: &Option<Commands>) -> bool {
    matches!(cmd, Some(Commands::Product(_)))
        || matches!(cmd, Some(Commands::Scan(s)) if s.looks_up())
        || matches!(
            cmd,
            Some(Commands::Movement(m)) if matches!(m.command, MovementSubcommand::List { .. })
        )
}

const CONNECTIVITY_HINT: &str =
    "Check your connection. Queued movements stay in the outbox; run 'whm sync' to retry.";

/// Suggests a next step for errors the user can act on.
fn hint_for(err: &(dyn Error + 'static)) -> Option<&'static str> {
    let mut current = Some(err);
    while let Some(e) = current {
        let api = e
            .downcast_ref::<SyncError>()
            .and_then(SyncError::api_error)
            .or_else(|| e.downcast_ref::<ApiError>());

        if let Some(api) = api {
            return match api {
                ApiError::Unauthorized => Some("Run 'whm auth login' to sign in again."),
                ApiError::Request(_) => Some(CONNECTIVITY_HINT),
                ApiError::Status { status, .. } if *status >= 500 => Some(CONNECTIVITY_HINT),
                ApiError::Status { .. } => Some(
                    "The server rejected the request. Check the data sent; a rejected movement stays first in the outbox.",
                ),
                ApiError::UnexpectedBody { .. } => Some(
                    "The server did not answer with JSON. Check server.base_url, or run 'whm auth login' if your session expired.",
                ),
                _ => None,
            };
        }
        current = e.source();
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_hint_for_unauthorized() {
        let err = SyncError::Blocked {
            id: 1,
            delivered: 0,
            source: ApiError::Unauthorized,
        };
        assert_eq!(
            hint_for(&err),
            Some("Run 'whm auth login' to sign in again.")
        );
    }

    #[test]
    fn test_hint_for_status_depends_on_class() {
        let server_down = SyncError::Api(ApiError::Status {
            status: 503,
            body: String::new(),
        });
        assert_eq!(hint_for(&server_down), Some(CONNECTIVITY_HINT));

        let rejected = SyncError::Blocked {
            id: 4,
            delivered: 0,
            source: ApiError::Status {
                status: 422,
                body: "quantity must be positive".to_string(),
            },
        };
        let hint = hint_for(&rejected).unwrap();
        assert_ne!(hint, CONNECTIVITY_HINT);
        assert!(hint.contains("rejected"));
    }

    #[test]
    fn test_hint_for_invalid_url_is_none() {
        let err = ApiError::InvalidUrl {
            url: "nope".to_string(),
            reason: "relative URL without a base".to_string(),
        };
        assert_eq!(hint_for(&err), None);
    }

    #[test]
    fn test_read_commands() {
        let cli = Cli::parse_from(["whm", "product", "show", "42"]);
        assert!(is_read_command(&cli.command));

        let cli = Cli::parse_from(["whm", "scan", "--no-lookup", "42"]);
        assert!(!is_read_command(&cli.command));

        let cli = Cli::parse_from(["whm", "movement", "submit", "--json", "{}"]);
        assert!(!is_read_command(&cli.command));

        let cli = Cli::parse_from(["whm", "movement", "purge-unreadable"]);
        assert!(!is_read_command(&cli.command));
    }
}
