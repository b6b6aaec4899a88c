use clap::{Args, Subcommand};
use std::fs;
use std::io::Write;
use std::path::PathBuf;

use super::OutputFormat;
use crate::config::Config;

#[derive(Args)]
pub struct ConfigCommand {
    #[command(subcommand)]
    pub command: ConfigSubcommand,
}

#[derive(Subcommand)]
pub enum ConfigSubcommand {
    /// Show current configuration values
    Show {
        /// Output format
        #[arg(long, short, value_enum, default_value = "text")]
        format: OutputFormat,
    },

    /// Initialize configuration file
    Init,
}

const DEFAULT_CONFIG: &str = r#"# whm configuration

# SQLite database for the product cache and the stock movement outbox
# database_path: ~/.local/share/whm/whm.db

# Preference file holding the active credential
# preferences_path: ~/.config/whm/preferences.yaml

server:
  # base_url: "https://openboxes.example.com/openboxes"
  product_endpoint: /api/products
  movement_endpoint: /api/stockMovements
  # Deliver queued movements before read commands
  auto_sync: false
"#;

impl ConfigCommand {
    pub fn run(
        &self,
        config: &Config,
        cli_config_path: Option<PathBuf>,
    ) -> Result<(), Box<dyn std::error::Error>> {
        match &self.command {
            ConfigSubcommand::Show { format } => {
                match format {
                    OutputFormat::Json => {
                        println!("{}", serde_json::to_string_pretty(config)?);
                    }
                    OutputFormat::Text => {
                        println!("Configuration");
                        println!("=============\n");

                        if let Some(path) = &config.config_file {
                            println!("Config file: {}", path.display());
                        } else {
                            println!(
                                "Config file: {} (not found)",
                                Config::default_config_path().display()
                            );
                        }
                        println!();

                        println!("database_path: {}", config.database_path.value.display());
                        println!("  source: {}", config.database_path.source);
                        println!();

                        println!(
                            "preferences_path: {}",
                            config.preferences_path.value.display()
                        );
                        println!("  source: {}", config.preferences_path.source);
                        println!();

                        println!(
                            "server.base_url: {}",
                            config.server.base_url.as_deref().unwrap_or("(not set)")
                        );
                        println!("server.product_endpoint: {}", config.server.product_endpoint);
                        println!(
                            "server.movement_endpoint: {}",
                            config.server.movement_endpoint
                        );
                        println!("server.auto_sync: {}", config.server.auto_sync);
                    }
                }
                Ok(())
            }

            ConfigSubcommand::Init => {
                let config_path = cli_config_path.unwrap_or_else(Config::default_config_path);

                if config_path.exists() {
                    println!("Config file already exists: {}", config_path.display());
                    println!("Use 'whm config show' to view current configuration.");
                    return Ok(());
                }

                if let Some(parent) = config_path.parent() {
                    fs::create_dir_all(parent)?;
                }

                let mut file = fs::File::create(&config_path)?;
                file.write_all(DEFAULT_CONFIG.as_bytes())?;

                println!("Created config file: {}", config_path.display());
                println!("\nEdit this file to customize your settings.");
                Ok(())
            }
        }
    }
}
