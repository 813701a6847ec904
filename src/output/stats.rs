//! Summary statistics over stored records
//!
//! This module provides the read-only summary that report tools show next
//! to the record list, and a terminal printer for it.

use crate::rating::Rating;
use crate::storage::{BookRecord, DateRange, Storage};
use crate::LedgerError;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;

/// Aggregate view of a user's records within a date range
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LedgerSummary {
    /// Records in the range
    pub total_count: u64,

    /// Records with review text
    pub reviewed_count: u64,

    /// Records without a rating
    pub unrated_count: u64,

    /// Record count per star level; unrated records are not included
    pub rating_histogram: BTreeMap<Rating, u64>,

    /// Most recent change written by any crawl for this user
    pub last_crawl_timestamp: Option<DateTime<Utc>>,
}

impl LedgerSummary {
    /// Summarizes an already loaded record list
    pub fn from_records(
        records: &[BookRecord],
        last_crawl_timestamp: Option<DateTime<Utc>>,
    ) -> Self {
        let mut rating_histogram = BTreeMap::new();
        for record in records.iter().filter(|r| r.rating.is_rated()) {
            *rating_histogram.entry(record.rating).or_insert(0) += 1;
        }

        Self {
            total_count: records.len() as u64,
            reviewed_count: records.iter().filter(|r| r.has_review()).count() as u64,
            unrated_count: records.iter().filter(|r| !r.rating.is_rated()).count() as u64,
            rating_histogram,
            last_crawl_timestamp,
        }
    }

    /// Records at `rating` (zero when absent)
    pub fn count_for(&self, rating: Rating) -> u64 {
        if rating.is_rated() {
            self.rating_histogram.get(&rating).copied().unwrap_or(0)
        } else {
            self.unrated_count
        }
    }
}

/// Loads the summary for `user_id`
///
/// # Arguments
///
/// * `storage` - The storage backend to query
/// * `user_id` - Owner of the records
/// * `range` - Inclusive `review_date` bounds; [`DateRange::all`] for everything
///
/// # Returns
///
/// * `Ok(LedgerSummary)` - Successfully loaded summary
/// * `Err(LedgerError)` - Failed to query the store
pub fn get_summary(
    storage: &dyn Storage,
    user_id: &str,
    range: DateRange,
) -> Result<LedgerSummary, LedgerError> {
    let breakdown = storage.rating_breakdown(user_id, range)?;

    let mut summary = LedgerSummary {
        total_count: 0,
        reviewed_count: 0,
        unrated_count: 0,
        rating_histogram: BTreeMap::new(),
        last_crawl_timestamp: storage.last_updated_at(user_id)?,
    };

    for (rating, count) in breakdown {
        summary.total_count += count.records;
        summary.reviewed_count += count.reviewed;
        if rating.is_rated() {
            summary.rating_histogram.insert(rating, count.records);
        } else {
            summary.unrated_count += count.records;
        }
    }

    Ok(summary)
}

/// Prints a summary to stdout in a formatted manner
pub fn print_summary(user_id: &str, summary: &LedgerSummary) {
    println!("=== Reading Ledger: {} ===\n", user_id);

    println!("Overview:");
    println!("  Books: {}", summary.total_count);
    println!("  With review text: {}", summary.reviewed_count);
    println!("  Unrated: {}", summary.unrated_count);
    match summary.last_crawl_timestamp {
        Some(ts) => println!("  Last change: {}", ts.format("%Y-%m-%d %H:%M:%S UTC")),
        None => println!("  Last change: never"),
    }
    println!();

    println!("Ratings:");
    for rating in Rating::STARS.iter().rev() {
        let count = summary.count_for(*rating);
        let percentage = if summary.total_count > 0 {
            (count as f64 / summary.total_count as f64) * 100.0
        } else {
            0.0
        };
        println!("  {:<5} {:>5} ({:.1}%)", rating.to_string(), count, percentage);
    }
}
