//! Sync error types.

use thiserror::Error;

use crate::api::ApiError;
use crate::store::StoreError;

/// Errors surfaced by the [`SyncCoordinator`](super::SyncCoordinator).
#[derive(Error, Debug)]
pub enum SyncError {
    /// Request failed and no cached copy could stand in for it.
    #[error(transparent)]
    Api(#[from] ApiError),

    /// Local store failure.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// A queued movement couldn't be delivered. It and every later movement
    /// are still queued.
    #[error("Delivery of queued movement {id} failed after {delivered} delivered: {source}")]
    Blocked {
        id: i64,
        delivered: usize,
        #[source]
        source: ApiError,
    },
}

impl SyncError {
    /// Whether the failure means the user has to log in again.
    pub fn is_unauthorized(&self) -> bool {
        self.api_error().is_some_and(ApiError::is_unauthorized)
    }

    /// The request failure behind this error, if there was one.
    pub fn api_error(&self) -> Option<&ApiError> {
        match self {
            SyncError::Api(e) | SyncError::Blocked { source: e, .. } => Some(e),
            SyncError::Store(_) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_blocked_unauthorized() {
        let err = SyncError::Blocked {
            id: 2,
            delivered: 1,
            source: ApiError::Unauthorized,
        };
        assert!(err.is_unauthorized());
        assert!(err.to_string().starts_with("Delivery of queued movement 2 failed"));
    }

    #[test]
    fn test_status_is_not_unauthorized() {
        let err = SyncError::Api(ApiError::Status {
            status: 404,
            body: String::new(),
        });
        assert!(!err.is_unauthorized());
        assert!(err.api_error().is_some());
    }
}
