//! Authenticated HTTP session
//!
//! Wraps a reqwest client that attaches the operator-supplied token to every
//! request. The token is never validated locally; the remote site's response
//! is the only signal of whether it is accepted.

use crate::config::SessionConfig;
use crate::{ConfigError, LedgerError};
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, LOCATION};
use reqwest::{redirect::Policy, Client, StatusCode};
use std::time::Duration;

/// Status, redirect target and body of one response
#[derive(Debug, Clone)]
pub struct RawResponse {
    pub status: StatusCode,

    /// `Location` header, present on redirects
    pub location: Option<String>,

    pub body: String,
}

/// HTTP client bound to one session token
pub struct SessionClient {
    client: Client,
}

impl SessionClient {
    /// Builds a client that sends `auth_token` in the configured header
    ///
    /// # Arguments
    ///
    /// * `config` - Session configuration (header name, user agent, timeout)
    /// * `auth_token` - Opaque token captured by the operator
    ///
    /// # Returns
    ///
    /// * `Ok(SessionClient)` - Client ready to fetch
    /// * `Err(LedgerError)` - The token cannot be sent as a header value, or
    ///   the client could not be built
    pub fn new(config: &SessionConfig, auth_token: &str) -> Result<Self, LedgerError> {
        let name = HeaderName::from_bytes(config.auth_header.as_bytes()).map_err(|_| {
            ConfigError::Validation(format!("Invalid auth header name: {}", config.auth_header))
        })?;

        let mut value = HeaderValue::from_str(auth_token.trim()).map_err(|_| {
            LedgerError::InvalidToken("contains characters not allowed in a header".to_string())
        })?;
        value.set_sensitive(true);

        let mut headers = HeaderMap::new();
        headers.insert(name, value);

        let client = Client::builder()
            .user_agent(config.user_agent.as_str())
            .default_headers(headers)
            .timeout(Duration::from_secs(config.timeout_secs))
            .connect_timeout(Duration::from_secs(10))
            .redirect(Policy::none()) // A redirect to the login page is the auth signal
            .gzip(true)
            .brotli(true)
            .build()?;

        Ok(Self { client })
    }

    /// Issues a GET request
    ///
    /// Any HTTP status is a successful return; only network-level failures
    /// (connect, timeout, broken body) are errors.
    pub async fn fetch(&self, url: &str) -> Result<RawResponse, reqwest::Error> {
        tracing::debug!("GET {}", url);

        let response = self.client.get(url).send().await?;
        let status = response.status();
        let location = response
            .headers()
            .get(LOCATION)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let body = response.text().await?;

        Ok(RawResponse {
            status,
            location,
            body,
        })
    }
}

impl std::fmt::Debug for SessionClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionClient").finish_non_exhaustive()
    }
}
