//! Reading-Ledger: an incremental mirror of a user's book-review history
//!
//! This crate crawls a user's review listing on a remote book site with an
//! operator-supplied session token, parses every entry into a [`BookRecord`],
//! and reconciles it into a SQLite store that report and export tools read.

pub mod config;
pub mod crawler;
pub mod output;
pub mod rating;
pub mod state;
pub mod storage;

use thiserror::Error;

/// Main error type for Reading-Ledger operations
#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("HTTP client error: {0}")]
    Reqwest(#[from] reqwest::Error),

    #[error("Invalid auth token: {0}")]
    InvalidToken(String),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Storage error: {0}")]
    Storage(#[from] storage::StorageError),

    #[error("Invalid user id: {0:?}")]
    InvalidUserId(String),

    #[error("Invalid date bound {0:?}, expected YYYY-MM-DD")]
    InvalidDate(String),

    #[error("A crawl is already running")]
    CrawlInProgress,

    #[error("Invalid state transition: {from:?} -> {to:?}")]
    InvalidTransition {
        from: state::CrawlStatus,
        to: state::CrawlStatus,
    },

    #[error("Crawl worker failed: {0}")]
    Worker(String),
}

/// Configuration-specific errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Invalid URL in config: {0}")]
    InvalidUrl(String),
}

/// Result type alias for Reading-Ledger operations
pub type Result<T> = std::result::Result<T, LedgerError>;

/// Result type alias for configuration operations
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

// Re-export commonly used types
pub use config::Config;
pub use crawler::{CrawlEvent, CrawlHandle, CrawlOutcome, CrawlReport, Crawler};
pub use rating::Rating;
pub use state::CrawlStatus;
pub use storage::{BookRecord, ReconcileOutcome, SqliteStorage, Storage};
