//! Authenticated JSON client with bounded retry.

use std::sync::{PoisonError, RwLock};
use std::time::Duration;

use reqwest::header::{ACCEPT, AUTHORIZATION};
use reqwest::StatusCode;
use serde_json::{Map, Value};
use tracing::{debug, error, warn};

use super::error::{ApiError, ApiResult};
use super::response::ParsedResponse;
use crate::credential::{Credential, CredentialStore};

/// Total attempts per request, including the first.
pub const MAX_ATTEMPTS: u32 = 2;
/// Connect timeout, and the longest a read may wait for data.
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(15);

const API_KEY_HEADER: &str = "X-API-KEY";

/// HTTP methods used against the backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
    Put,
}

impl Method {
    fn as_reqwest(self) -> reqwest::Method {
        match self {
            Method::Get => reqwest::Method::GET,
            Method::Post => reqwest::Method::POST,
            Method::Put => reqwest::Method::PUT,
        }
    }
}

impl std::fmt::Display for Method {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_reqwest().as_str())
    }
}

/// Strips exactly one trailing `/` from a base URL.
pub fn normalize_base_url(base_url: &str) -> String {
    base_url.strip_suffix('/').unwrap_or(base_url).to_string()
}

/// Client for the warehouse backend API.
///
/// Holds the active credential in memory. It is loaded from the
/// [`CredentialStore`] on construction and reloaded after every save or
/// clear, so the two never drift apart.
#[derive(Debug)]
pub struct ApiClient {
    base_url: String,
    http: reqwest::Client,
    credentials: CredentialStore,
    credential: RwLock<Option<Credential>>,
}

impl ApiClient {
    /// Creates a client for `base_url`, loading the stored credential.
    pub fn new(base_url: &str, credentials: CredentialStore) -> ApiResult<Self> {
        Self::with_timeout(base_url, credentials, REQUEST_TIMEOUT)
    }

    fn with_timeout(
        base_url: &str,
        credentials: CredentialStore,
        timeout: Duration,
    ) -> ApiResult<Self> {
        let base_url = normalize_base_url(base_url);
        reqwest::Url::parse(&base_url).map_err(|e| ApiError::InvalidUrl {
            url: base_url.clone(),
            reason: e.to_string(),
        })?;

        let http = reqwest::Client::builder()
            .connect_timeout(timeout)
            .read_timeout(timeout)
            .build()?;

        let credential = credentials.load()?;

        Ok(Self {
            base_url,
            http,
            credentials,
            credential: RwLock::new(credential),
        })
    }

    /// Returns the normalized base URL.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Returns the active credential, if any.
    pub fn credential(&self) -> Option<Credential> {
        self.credential
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Stores a Basic credential, replacing any API key.
    pub fn save_basic_credential(&self, username: &str, password: &str) -> ApiResult<()> {
        self.credentials
            .save(&Credential::basic(username, password))?;
        self.reload_credential()
    }

    /// Stores an API key, replacing any Basic token.
    pub fn save_api_key(&self, key: &str) -> ApiResult<()> {
        self.credentials.save(&Credential::api_key(key))?;
        self.reload_credential()
    }

    /// Removes every stored credential field.
    pub fn clear_credential(&self) -> ApiResult<()> {
        self.credentials.clear()?;
        self.reload_credential()
    }

    fn reload_credential(&self) -> ApiResult<()> {
        let loaded = self.credentials.load()?;
        *self
            .credential
            .write()
            .unwrap_or_else(PoisonError::into_inner) = loaded;
        Ok(())
    }

    pub async fn get(&self, path: &str) -> ApiResult<ParsedResponse> {
        self.execute(Method::Get, path, None).await
    }

    /// POSTs `body` and returns the response object, if the server sent one.
    pub async fn post(&self, path: &str, body: &Value) -> ApiResult<Option<Map<String, Value>>> {
        Ok(self
            .execute(Method::Post, path, Some(body))
            .await?
            .into_object())
    }

    /// PUTs `body` and returns the response object, if the server sent one.
    pub async fn put(&self, path: &str, body: &Value) -> ApiResult<Option<Map<String, Value>>> {
        Ok(self
            .execute(Method::Put, path, Some(body))
            .await?
            .into_object())
    }

    /// Sends a request to `{base_url}{path}` with retry.
    ///
    /// Retryable failures get one more attempt; the error from the last
    /// attempt is returned. A 401 returns [`ApiError::Unauthorized`]
    /// immediately, after clearing the stored credential.
    pub async fn execute(
        &self,
        method: Method,
        path: &str,
        body: Option<&Value>,
    ) -> ApiResult<ParsedResponse> {
        let url = format!("{}{}", self.base_url, path);
        let mut attempt = 0;

        loop {
            attempt += 1;

            match self.attempt(method, &url, body).await {
                Ok(response) => return Ok(response),
                Err(e) if e.is_retryable() && attempt < MAX_ATTEMPTS => {
                    warn!(
                        method = %method,
                        url = %url,
                        attempt = attempt,
                        error = %e,
                        "Request failed, retrying"
                    );
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// One attempt. The response (and its connection) is dropped when this
    /// returns, whatever the outcome.
    async fn attempt(
        &self,
        method: Method,
        url: &str,
        body: Option<&Value>,
    ) -> ApiResult<ParsedResponse> {
        debug!(method = %method, url = %url, "Sending request");

        let mut request = self
            .http
            .request(method.as_reqwest(), url)
            .header(ACCEPT, "application/json");

        request = match self.credential() {
            Some(Credential::Basic { token }) => {
                request.header(AUTHORIZATION, format!("Basic {}", token))
            }
            Some(Credential::ApiKey { key }) => request.header(API_KEY_HEADER, key),
            None => request,
        };

        if let Some(body) = body {
            // Sets Content-Type: application/json
            request = request.json(body);
        }

        let response = request.send().await?;
        let status = response.status();

        if status == StatusCode::UNAUTHORIZED {
            drop(response);
            self.invalidate_credential();
            return Err(ApiError::Unauthorized);
        }

        let text = response.text().await?;

        if !status.is_success() {
            return Err(ApiError::Status {
                status: status.as_u16(),
                body: text,
            });
        }

        debug!(method = %method, url = %url, status = status.as_u16(), "Request succeeded");
        Ok(ParsedResponse::parse(&text))
    }

    /// Drops the in-memory credential, then the persisted one.
    fn invalidate_credential(&self) {
        *self
            .credential
            .write()
            .unwrap_or_else(PoisonError::into_inner) = None;

        if let Err(e) = self.credentials.clear() {
            error!(error = %e, "Failed to clear stored credentials after 401");
        }
        warn!("Server rejected credentials, stored credentials cleared");
    }
}
