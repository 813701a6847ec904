//! Export projection
//!
//! The single read that report renderers consume: the record list for a
//! date range plus its summary, taken from the same record set.

use crate::output::stats::LedgerSummary;
use crate::storage::{BookRecord, DateRange, Storage};
use crate::LedgerError;
use serde::Serialize;

/// Everything a renderer needs for one user and date range
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExportProjection {
    pub user_id: String,

    /// Newest review first, undated records last
    pub records: Vec<BookRecord>,

    pub summary: LedgerSummary,
}

/// Loads records and summary for `user_id` within `range`
///
/// The summary is computed from the returned records, so both halves agree
/// even if a crawl commits a page in between.
pub fn get_export_projection(
    storage: &dyn Storage,
    user_id: &str,
    range: DateRange,
) -> Result<ExportProjection, LedgerError> {
    let records = if range.is_unbounded() {
        storage.get_records(user_id)?
    } else {
        storage.get_records_in_date_range(user_id, range)?
    };
    let summary = LedgerSummary::from_records(&records, storage.last_updated_at(user_id)?);

    tracing::debug!(
        "Export projection for {}: {} records",
        user_id,
        records.len()
    );

    Ok(ExportProjection {
        user_id: user_id.to_string(),
        records,
        summary,
    })
}
