//! Offline-first sync between the local store and the backend.
//!
//! ## Writes
//!
//! Stock movements are appended to the outbox, then delivered oldest first.
//! A flush cycle stops at the first failure and leaves that movement and all
//! later ones queued, so the server always sees movements in the order they
//! were made. Only one flush runs at a time.
//!
//! ## Reads
//!
//! Product lookups go to the server first and refresh the cache on success.
//! When the server can't be reached the cached copy is returned instead.

mod coordinator;
mod error;

pub use coordinator::{
    Endpoints, FlushReport, ProductLookup, Source, SubmitOutcome, SyncCoordinator, SyncState,
    DEFAULT_MOVEMENT_ENDPOINT, DEFAULT_PRODUCT_ENDPOINT,
};
pub use error::SyncError;
