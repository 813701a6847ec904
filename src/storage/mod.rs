//! Storage module for persisting review records
//!
//! This module handles all database operations for the ledger, including:
//! - SQLite database initialization and schema management
//! - Reconciling parsed candidates into stored records (insert / update / no-op)
//! - Read-only queries used by report and export tools

mod reconcile;
mod schema;
mod sqlite;
mod traits;

pub use reconcile::reconcile;
pub use sqlite::SqliteStorage;
pub use traits::{Storage, StorageError, StorageResult};

use crate::rating::Rating;
use crate::LedgerError;
use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;

/// A parsed, not-yet-reconciled entry from one listing page
///
/// Every field is already in canonical form: the rating is from the closed
/// vocabulary and dates are calendar dates or absent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Candidate {
    pub canonical_url: String,
    pub title: String,
    pub author: Option<String>,
    pub publish_date: Option<NaiveDate>,
    pub rating: Rating,
    /// Empty when the user rated without writing a review
    pub review_content: String,
    pub review_date: Option<NaiveDate>,
}

/// One stored review/rating entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BookRecord {
    pub user_id: String,
    pub canonical_url: String,
    pub title: String,
    pub author: Option<String>,
    pub publish_date: Option<NaiveDate>,
    pub rating: Rating,
    pub review_content: String,
    pub review_date: Option<NaiveDate>,
    pub first_seen_at: DateTime<Utc>,
    pub last_updated_at: DateTime<Utc>,
}

impl BookRecord {
    /// True when every mutable field equals the candidate's
    pub fn matches(&self, candidate: &Candidate) -> bool {
        self.title == candidate.title
            && self.author == candidate.author
            && self.publish_date == candidate.publish_date
            && self.rating == candidate.rating
            && self.review_content == candidate.review_content
            && self.review_date == candidate.review_date
    }

    /// True when the user wrote review text
    pub fn has_review(&self) -> bool {
        !self.review_content.trim().is_empty()
    }
}

/// Result of reconciling one candidate
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconcileOutcome {
    Inserted,
    Updated,
    Unchanged,
}

/// Running counts of reconcile outcomes
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PageTally {
    pub inserted: u64,
    pub updated: u64,
    pub unchanged: u64,
}

impl PageTally {
    pub fn record(&mut self, outcome: ReconcileOutcome) {
        match outcome {
            ReconcileOutcome::Inserted => self.inserted += 1,
            ReconcileOutcome::Updated => self.updated += 1,
            ReconcileOutcome::Unchanged => self.unchanged += 1,
        }
    }

    pub fn merge(&mut self, other: PageTally) {
        self.inserted += other.inserted;
        self.updated += other.updated;
        self.unchanged += other.unchanged;
    }

    /// Records confirmed present in the store
    pub fn total(&self) -> u64 {
        self.inserted + self.updated + self.unchanged
    }

    /// Number of rows written
    pub fn mutations(&self) -> u64 {
        self.inserted + self.updated
    }
}

/// Records and reviewed records at one rating level
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RatingCount {
    pub records: u64,

    /// Records carrying review text
    pub reviewed: u64,
}

/// Inclusive bounds on `review_date`; either side may be open
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DateRange {
    pub start: Option<NaiveDate>,
    pub end: Option<NaiveDate>,
}

impl DateRange {
    /// No filtering; records with unknown review dates are included
    pub fn all() -> Self {
        Self::default()
    }

    pub fn between(start: NaiveDate, end: NaiveDate) -> Self {
        Self {
            start: Some(start),
            end: Some(end),
        }
    }

    /// Parses optional `YYYY-MM-DD` bounds
    pub fn parse(start: Option<&str>, end: Option<&str>) -> Result<Self, LedgerError> {
        Ok(Self {
            start: start.map(parse_date_bound).transpose()?,
            end: end.map(parse_date_bound).transpose()?,
        })
    }

    pub fn is_unbounded(&self) -> bool {
        self.start.is_none() && self.end.is_none()
    }
}

fn parse_date_bound(raw: &str) -> Result<NaiveDate, LedgerError> {
    NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d")
        .map_err(|_| LedgerError::InvalidDate(raw.to_string()))
}
