//! Authentication commands.
//!
//! Stores HTTP Basic or API-key credentials in the preference file. Only one
//! credential is kept; logging in with one kind replaces the other.

use clap::{Args, Subcommand};
use std::io::{self, BufRead, Write};
use whm_core::ApiError;

use crate::config::Config;
use crate::sync::{credential_store, open_client, ContextError};

/// Authentication commands
#[derive(Args)]
pub struct AuthCommand {
    #[command(subcommand)]
    command: AuthSubcommand,
}

#[derive(Subcommand)]
enum AuthSubcommand {
    /// Store credentials for the server
    Login {
        /// Username for HTTP Basic authentication
        #[arg(long, short, conflicts_with = "api_key", required_unless_present = "api_key")]
        user: Option<String>,

        /// Password (prompted for when omitted)
        #[arg(long, short, requires = "user")]
        password: Option<String>,

        /// Static API key, sent as X-API-KEY
        #[arg(long)]
        api_key: Option<String>,
    },
    /// Remove stored credentials
    Logout,
    /// Show authentication status
    Status,
}

impl AuthCommand {
    pub fn run(&self, config: &Config) -> Result<(), AuthError> {
        match &self.command {
            AuthSubcommand::Login {
                user,
                password,
                api_key,
            } => login(config, user.as_deref(), password.as_deref(), api_key.as_deref()),
            AuthSubcommand::Logout => logout(config),
            AuthSubcommand::Status => status(config),
        }
    }
}

/// Errors that can occur during authentication
#[derive(Debug)]
pub enum AuthError {
    /// I/O error
    IoError(io::Error),
    /// Client could not be created
    ContextError(ContextError),
    /// Credential could not be stored
    CredentialError(ApiError),
    /// Empty password or key
    EmptySecret,
    /// Neither --user nor --api-key given
    MissingCredential,
}

impl std::fmt::Display for AuthError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AuthError::IoError(e) => write!(f, "I/O error: {}", e),
            AuthError::ContextError(e) => write!(f, "{}", e),
            AuthError::CredentialError(e) => write!(f, "{}", e),
            AuthError::EmptySecret => write!(f, "Password or API key cannot be empty"),
            AuthError::MissingCredential => write!(f, "Pass --user or --api-key"),
        }
    }
}

impl std::error::Error for AuthError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            AuthError::IoError(e) => Some(e),
            AuthError::ContextError(e) => Some(e),
            AuthError::CredentialError(e) => Some(e),
            AuthError::EmptySecret | AuthError::MissingCredential => None,
        }
    }
}

impl From<io::Error> for AuthError {
    fn from(e: io::Error) -> Self {
        AuthError::IoError(e)
    }
}

impl From<ContextError> for AuthError {
    fn from(e: ContextError) -> Self {
        AuthError::ContextError(e)
    }
}

impl From<ApiError> for AuthError {
    fn from(e: ApiError) -> Self {
        AuthError::CredentialError(e)
    }
}

fn login(
    config: &Config,
    user: Option<&str>,
    password: Option<&str>,
    api_key: Option<&str>,
) -> Result<(), AuthError> {
    let client = open_client(config)?;

    match (user, api_key) {
        (_, Some(key)) => {
            if key.trim().is_empty() {
                return Err(AuthError::EmptySecret);
            }
            client.save_api_key(key.trim())?;
            println!("Saved API key for {}", client.base_url());
        }
        (Some(user), None) => {
            let password = match password {
                Some(p) => p.to_string(),
                None => prompt("Password: ")?,
            };
            if password.is_empty() {
                return Err(AuthError::EmptySecret);
            }
            client.save_basic_credential(user, &password)?;
            println!("Saved credentials for {} on {}", user, client.base_url());
        }
        (None, None) => return Err(AuthError::MissingCredential),
    }

    Ok(())
}

fn prompt(label: &str) -> Result<String, io::Error> {
    print!("{}", label);
    io::stdout().flush()?;
    let mut line = String::new();
    io::stdin().lock().read_line(&mut line)?;
    Ok(line.trim_end_matches(['\r', '\n']).to_string())
}

fn logout(config: &Config) -> Result<(), AuthError> {
    let store = credential_store(config);
    let was_logged_in = store.load().map_err(ApiError::from)?.is_some();

    // Clear even when nothing loads, so partial leftovers go too
    store.clear().map_err(ApiError::from)?;

    if was_logged_in {
        println!("Logged out. Stored credentials removed.");
    } else {
        println!("Already logged out.");
    }
    Ok(())
}

fn status(config: &Config) -> Result<(), AuthError> {
    let store = credential_store(config);

    match store.load().map_err(ApiError::from)? {
        Some(credential) => {
            println!(
                "Logged in ({}: {})",
                credential.mode(),
                credential.masked()
            );
        }
        None if config.server.is_configured() => {
            println!("Not logged in. Run 'whm auth login' to authenticate.");
        }
        None => {
            println!("Not configured. Set server.base_url in config first.");
        }
    }
    println!("Preferences: {}", store.path().display());
    Ok(())
}
