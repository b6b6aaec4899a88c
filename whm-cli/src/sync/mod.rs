//! Wiring between the CLI configuration and the core sync components.

pub mod auto_sync;

pub use auto_sync::try_auto_sync;

use whm_core::{ApiClient, ApiError, CredentialStore, LocalStore, StoreError, SyncCoordinator};

use crate::config::Config;

/// Errors that can occur while setting up the client or store.
#[derive(Debug)]
pub enum ContextError {
    /// No server URL configured
    NotConfigured,
    /// Client construction failed
    ClientError(ApiError),
    /// Local store could not be opened
    StoreError(StoreError),
}

impl std::fmt::Display for ContextError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ContextError::NotConfigured => write!(
                f,
                "Server not configured. Set server.base_url in config or WHM_SERVER_URL."
            ),
            ContextError::ClientError(e) => write!(f, "{}", e),
            ContextError::StoreError(e) => write!(f, "{}", e),
        }
    }
}

impl std::error::Error for ContextError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ContextError::NotConfigured => None,
            ContextError::ClientError(e) => Some(e),
            ContextError::StoreError(e) => Some(e),
        }
    }
}

impl From<ApiError> for ContextError {
    fn from(e: ApiError) -> Self {
        ContextError::ClientError(e)
    }
}

impl From<StoreError> for ContextError {
    fn from(e: StoreError) -> Self {
        ContextError::StoreError(e)
    }
}

/// Returns the credential store named by the config.
pub fn credential_store(config: &Config) -> CredentialStore {
    CredentialStore::new(config.preferences_path.value.clone())
}

/// Creates an API client for the configured server.
pub fn open_client(config: &Config) -> Result<ApiClient, ContextError> {
    let base_url = config
        .server
        .base_url
        .as_deref()
        .ok_or(ContextError::NotConfigured)?;

    Ok(ApiClient::new(base_url, credential_store(config))?)
}

/// Opens the local store and builds a coordinator for the configured server.
pub async fn open_coordinator(config: &Config) -> Result<SyncCoordinator, ContextError> {
    let client = open_client(config)?;
    let store = LocalStore::open(&config.database_path.value).await?;
    Ok(SyncCoordinator::new(client, store, config.server.endpoints()))
}
