//! Mobile WHM Core Library
//!
//! Offline-first client for a warehouse-management backend: an authenticated
//! API client, a local SQLite cache and outbox, and the coordinator that
//! delivers queued stock movements in order.

pub mod api;
pub mod credential;
pub mod scan;
pub mod store;
pub mod sync;

#[cfg(test)]
mod test_server;

pub use api::{ApiClient, ApiError, ApiResult, Method, ParsedResponse};
pub use credential::{AuthMode, Credential, CredentialError, CredentialStore};
pub use scan::scan_or_enter_code;
pub use store::{DrainLock, LocalStore, QueuedOperation, StoreError};
pub use sync::{
    Endpoints, FlushReport, ProductLookup, Source, SubmitOutcome, SyncCoordinator, SyncError,
    SyncState,
};

pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert!(!version().is_empty());
    }
}
