//! HTTP client for the warehouse backend.
//!
//! Every request is JSON in, JSON (or text) out, authenticated with whichever
//! credential is active in the [`CredentialStore`](crate::CredentialStore).
//!
//! ## Failure handling
//!
//! - Transport failures and non-2xx responses are retried once (two attempts
//!   in total), then surfaced.
//! - A 401 clears the stored credential and fails with
//!   [`ApiError::Unauthorized`] without retrying.

mod client;
mod error;
mod response;

pub use client::{normalize_base_url, ApiClient, Method, MAX_ATTEMPTS, REQUEST_TIMEOUT};
pub use error::{ApiError, ApiResult};
pub use response::ParsedResponse;
