//! Listing page fetcher
//!
//! This module turns `(user, page number)` into a listing URL, issues the
//! request through the session client and classifies the response:
//! - Redirect to a login page, 401, 403 → `AuthFailure`
//! - 404, 410, blank 2xx body → `NotFound`
//! - Network errors, 408, 429, 5xx, anything unexpected → `Transient`
//!
//! Transient outcomes are retried with backoff up to the configured budget.

use crate::config::Config;
use crate::crawler::rate_limit::RateLimiter;
use crate::crawler::session::{RawResponse, SessionClient};
use crate::{ConfigError, LedgerError};
use async_trait::async_trait;
use reqwest::StatusCode;
use url::Url;

/// Result of fetching one listing page
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PageResult {
    /// Page body, ready for parsing
    Ok(String),

    /// The session token was rejected
    AuthFailure,

    /// Past the end of the listing, or the user has no entries
    NotFound,

    /// Retry budget exhausted on a retryable failure
    Transient(String),
}

/// Source of listing pages for the crawl loop
///
/// [`PageFetcher`] is the network implementation.
#[async_trait]
pub trait PageSource: Send {
    /// Fetches page `page_number` (1-based) of `user_id`'s listing
    async fn fetch_page(&mut self, user_id: &str, page_number: u32) -> PageResult;

    /// Base URL that relative entry links resolve against
    fn base_url(&self) -> &Url;
}

/// Classifies a raw response
///
/// # Arguments
///
/// * `response` - Status, `Location` and body of the response
/// * `login_markers` - Substrings of a redirect target that mean "log in again"
pub fn classify(response: &RawResponse, login_markers: &[String]) -> PageResult {
    let status = response.status;

    if status.is_redirection() {
        let target = response.location.as_deref().unwrap_or("");
        let lowered = target.to_ascii_lowercase();
        if login_markers
            .iter()
            .any(|marker| lowered.contains(&marker.to_ascii_lowercase()))
        {
            return PageResult::AuthFailure;
        }
        return PageResult::Transient(format!("unexpected redirect ({}) to {:?}", status, target));
    }

    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => PageResult::AuthFailure,
        StatusCode::NOT_FOUND | StatusCode::GONE => PageResult::NotFound,
        s if s.is_success() => {
            if response.body.trim().is_empty() {
                PageResult::NotFound
            } else {
                PageResult::Ok(response.body.clone())
            }
        }
        s => PageResult::Transient(format!("HTTP {}", s)),
    }
}

fn describe_network_error(error: &reqwest::Error) -> String {
    if error.is_timeout() {
        "request timed out".to_string()
    } else if error.is_connect() {
        "connection failed".to_string()
    } else {
        error.to_string()
    }
}

/// Fetches listing pages over HTTP
#[derive(Debug)]
pub struct PageFetcher {
    session: SessionClient,
    limiter: RateLimiter,
    base_url: Url,
    listing_path: String,
    page_size: u32,
    max_retries: u32,
    login_markers: Vec<String>,
}

impl PageFetcher {
    /// Creates a fetcher for one crawl
    pub fn new(config: &Config, auth_token: &str) -> Result<Self, LedgerError> {
        let base_url = Url::parse(&config.session.base_url)
            .map_err(|e| ConfigError::InvalidUrl(format!("{}: {}", config.session.base_url, e)))?;

        Ok(Self {
            session: SessionClient::new(&config.session, auth_token)?,
            limiter: RateLimiter::new(&config.rate_limit),
            base_url,
            listing_path: config.crawler.listing_path.clone(),
            page_size: config.crawler.page_size,
            max_retries: config.crawler.max_retries,
            login_markers: config.session.login_markers.clone(),
        })
    }

    /// Builds the URL of page `page_number` (1-based)
    ///
    /// Page 1 starts at offset 0; every later page advances by one page size.
    pub fn listing_url(&self, user_id: &str, page_number: u32) -> Result<Url, url::ParseError> {
        let path = self.listing_path.replace("{user}", user_id);
        let mut url = self.base_url.join(&path)?;
        let offset = u64::from(page_number.saturating_sub(1)) * u64::from(self.page_size);
        url.query_pairs_mut()
            .append_pair("start", &offset.to_string());
        Ok(url)
    }

    async fn attempt(&mut self, url: &str) -> PageResult {
        self.limiter.wait_before_next_request().await;
        match self.session.fetch(url).await {
            Ok(response) => classify(&response, &self.login_markers),
            Err(e) => PageResult::Transient(describe_network_error(&e)),
        }
    }
}

#[async_trait]
impl PageSource for PageFetcher {
    async fn fetch_page(&mut self, user_id: &str, page_number: u32) -> PageResult {
        let url = match self.listing_url(user_id, page_number) {
            Ok(url) => url.to_string(),
            // Unreachable for validated user ids; counts as a failed page
            Err(e) => return PageResult::Transient(format!("invalid listing URL: {}", e)),
        };

        let attempts = self.max_retries.saturating_add(1);
        let mut last_error = String::new();

        for attempt in 1..=attempts {
            match self.attempt(&url).await {
                PageResult::Transient(reason) => {
                    self.limiter.record_failure();
                    tracing::warn!(
                        "Page {} attempt {}/{} failed: {}",
                        page_number,
                        attempt,
                        attempts,
                        reason
                    );
                    last_error = reason;
                }
                outcome => {
                    self.limiter.record_success();
                    tracing::debug!("Page {} classified as {:?}", page_number, kind(&outcome));
                    return outcome;
                }
            }
        }

        PageResult::Transient(last_error)
    }

    fn base_url(&self) -> &Url {
        &self.base_url
    }
}

fn kind(result: &PageResult) -> &'static str {
    match result {
        PageResult::Ok(_) => "Ok",
        PageResult::AuthFailure => "AuthFailure",
        PageResult::NotFound => "NotFound",
        PageResult::Transient(_) => "Transient",
    }
}
