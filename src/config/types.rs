use serde::Deserialize;

/// Main configuration structure for Reading-Ledger
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub session: SessionConfig,
    #[serde(default)]
    pub crawler: CrawlerConfig,
    #[serde(rename = "rate-limit", default)]
    pub rate_limit: RateLimitConfig,
    pub output: OutputConfig,
}

/// Remote site and HTTP session configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Scheme and host of the remote site
    #[serde(rename = "base-url")]
    pub base_url: String,

    /// Header that carries the operator-supplied session token
    #[serde(rename = "auth-header")]
    pub auth_header: String,

    /// User agent sent with every request
    #[serde(rename = "user-agent")]
    pub user_agent: String,

    /// Whole-request timeout (seconds)
    #[serde(rename = "timeout-secs")]
    pub timeout_secs: u64,

    /// Redirect targets containing any of these fragments mean the session was rejected
    #[serde(rename = "login-markers")]
    pub login_markers: Vec<String>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            base_url: "https://book.douban.com".to_string(),
            auth_header: "Cookie".to_string(),
            user_agent: "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) \
                         Chrome/120.0 Safari/537.36"
                .to_string(),
            timeout_secs: 30,
            login_markers: vec!["passport".to_string(), "login".to_string()],
        }
    }
}

/// Crawl loop configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CrawlerConfig {
    /// Listing path template; `{user}` is replaced with the user id
    #[serde(rename = "listing-path")]
    pub listing_path: String,

    /// Number of entries the remote site shows per listing page
    #[serde(rename = "page-size")]
    pub page_size: u32,

    /// Retries for a transient failure before the page counts as failed
    #[serde(rename = "max-retries")]
    pub max_retries: u32,

    /// Consecutive failed pages that abort the crawl
    #[serde(rename = "failure-threshold")]
    pub failure_threshold: u32,

    /// Default page ceiling, overridable per crawl
    #[serde(rename = "max-pages")]
    pub max_pages: Option<u32>,
}

impl Default for CrawlerConfig {
    fn default() -> Self {
        Self {
            listing_path: "/people/{user}/collect".to_string(),
            page_size: 15,
            max_retries: 3,
            failure_threshold: 3,
            max_pages: None,
        }
    }
}

/// Request pacing and backoff configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RateLimitConfig {
    /// Baseline delay between consecutive requests (milliseconds)
    #[serde(rename = "request-delay-ms")]
    pub request_delay_ms: u64,

    /// Upper bound for the backoff delay (milliseconds)
    #[serde(rename = "max-delay-ms")]
    pub max_delay_ms: u64,

    /// Consecutive successes after which the delay returns to baseline
    #[serde(rename = "reset-after-successes")]
    pub reset_after_successes: u32,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            request_delay_ms: 1500,
            max_delay_ms: 30_000,
            reset_after_successes: 3,
        }
    }
}

/// Output configuration
#[derive(Debug, Clone, Deserialize)]
pub struct OutputConfig {
    /// Path to the SQLite database file
    #[serde(rename = "database-path")]
    pub database_path: String,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            database_path: "reviews.db".to_string(),
        }
    }
}
