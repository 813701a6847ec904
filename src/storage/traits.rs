//! Storage traits and error types
//!
//! This module defines the trait interface for storage backends and
//! associated error types.

use crate::rating::Rating;
use crate::storage::{BookRecord, Candidate, DateRange, PageTally, RatingCount, ReconcileOutcome};
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use thiserror::Error;

/// Errors that can occur during storage operations
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("Storage lock poisoned")]
    LockPoisoned,

    #[error("Corrupt value in column {column}: {value:?}")]
    CorruptValue { column: &'static str, value: String },
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Trait for storage backend implementations
///
/// One writer (the crawl worker) reconciles pages; any number of readers
/// query committed data. Writes for a page are applied atomically.
pub trait Storage {
    // ===== Reconciliation =====

    /// Reconciles a single candidate into the store
    ///
    /// Inserts when `(user_id, canonical_url)` is absent, overwrites the
    /// mutable fields and bumps `last_updated_at` when anything differs, and
    /// writes nothing otherwise.
    fn reconcile(
        &mut self,
        user_id: &str,
        candidate: &Candidate,
        now: DateTime<Utc>,
    ) -> StorageResult<ReconcileOutcome>;

    /// Reconciles every candidate from one page inside a single transaction
    fn reconcile_page(
        &mut self,
        user_id: &str,
        candidates: &[Candidate],
        now: DateTime<Utc>,
    ) -> StorageResult<PageTally>;

    // ===== Record Queries =====

    /// Gets one record by its key
    fn get_record(&self, user_id: &str, canonical_url: &str) -> StorageResult<Option<BookRecord>>;

    /// Gets all records for a user, newest review first (unknown dates last)
    fn get_records(&self, user_id: &str) -> StorageResult<Vec<BookRecord>>;

    /// Gets records whose `review_date` falls within the inclusive range
    ///
    /// A bounded side excludes records with an unknown review date.
    fn get_records_in_date_range(
        &self,
        user_id: &str,
        range: DateRange,
    ) -> StorageResult<Vec<BookRecord>>;

    /// Gets records with the given rating
    fn get_records_by_rating(&self, user_id: &str, rating: Rating)
        -> StorageResult<Vec<BookRecord>>;

    // ===== Statistics =====

    /// Counts records in the range
    fn count_records(&self, user_id: &str, range: DateRange) -> StorageResult<u64>;

    /// Per-rating record and review counts in the range, unrated included
    ///
    /// Computed in one statement, so the counts are mutually consistent
    /// even while a crawl is writing.
    fn rating_breakdown(
        &self,
        user_id: &str,
        range: DateRange,
    ) -> StorageResult<BTreeMap<Rating, RatingCount>>;

    /// Latest `last_updated_at` across the user's records
    fn last_updated_at(&self, user_id: &str) -> StorageResult<Option<DateTime<Utc>>>;
}
