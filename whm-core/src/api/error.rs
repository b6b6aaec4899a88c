//! API client error types.

use thiserror::Error;

use crate::credential::CredentialError;

/// Errors returned by [`ApiClient`](super::ApiClient).
#[derive(Error, Debug)]
pub enum ApiError {
    /// Server answered 401. Stored credentials have been cleared.
    #[error("Unauthorized: the server rejected the stored credentials, log in again")]
    Unauthorized,

    /// Connect, write, read or timeout failure.
    #[error("Request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// Server answered with a non-2xx status other than 401.
    #[error("Server returned status {status}: {body}")]
    Status { status: u16, body: String },

    /// A 2xx response whose body wasn't the JSON object the endpoint serves,
    /// e.g. a login page the server redirected to.
    #[error("Server returned a {kind} body where a JSON object was expected")]
    UnexpectedBody { kind: &'static str },

    /// The configured base URL can't be parsed.
    #[error("Invalid server URL '{url}': {reason}")]
    InvalidUrl { url: String, reason: String },

    /// Reading or writing the credential preference file failed.
    #[error(transparent)]
    Credentials(#[from] CredentialError),
}

impl ApiError {
    /// Whether another attempt at the same request may succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            ApiError::Request(e) => !e.is_builder(),
            ApiError::Status { .. } => true,
            ApiError::Unauthorized
            | ApiError::UnexpectedBody { .. }
            | ApiError::InvalidUrl { .. }
            | ApiError::Credentials(_) => false,
        }
    }

    pub fn is_unauthorized(&self) -> bool {
        matches!(self, ApiError::Unauthorized)
    }
}

/// Result type alias using ApiError.
pub type ApiResult<T> = Result<T, ApiError>;
