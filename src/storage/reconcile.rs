//! Record reconciliation
//!
//! Decides insert vs. update vs. no-op for one candidate against the stored
//! record with the same `(user_id, canonical_url)` key. Re-running a crawl
//! over unchanged remote data therefore writes nothing.

use crate::storage::sqlite::find_record;
use crate::storage::traits::StorageResult;
use crate::storage::{Candidate, ReconcileOutcome};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection};

/// Reconciles `candidate` for `user_id` on the given connection (or transaction)
///
/// `first_seen_at` is written once, on insert. An update moves
/// `last_updated_at` to `now`, never earlier than `first_seen_at`.
pub fn reconcile(
    conn: &Connection,
    user_id: &str,
    candidate: &Candidate,
    now: DateTime<Utc>,
) -> StorageResult<ReconcileOutcome> {
    let existing = find_record(conn, user_id, &candidate.canonical_url)?;

    match existing {
        None => {
            conn.execute(
                "INSERT INTO book_records (user_id, canonical_url, title, author, publish_date,
                 rating, review_content, review_date, first_seen_at, last_updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?9)",
                params![
                    user_id,
                    candidate.canonical_url,
                    candidate.title,
                    candidate.author,
                    candidate.publish_date,
                    candidate.rating,
                    candidate.review_content,
                    candidate.review_date,
                    now,
                ],
            )?;
            tracing::debug!("Inserted {} for {}", candidate.canonical_url, user_id);
            Ok(ReconcileOutcome::Inserted)
        }

        Some(record) if record.matches(candidate) => Ok(ReconcileOutcome::Unchanged),

        Some(record) => {
            let stamp = now.max(record.last_updated_at);
            conn.execute(
                "UPDATE book_records SET title = ?3, author = ?4, publish_date = ?5, rating = ?6,
                 review_content = ?7, review_date = ?8, last_updated_at = ?9
                 WHERE user_id = ?1 AND canonical_url = ?2",
                params![
                    user_id,
                    candidate.canonical_url,
                    candidate.title,
                    candidate.author,
                    candidate.publish_date,
                    candidate.rating,
                    candidate.review_content,
                    candidate.review_date,
                    stamp,
                ],
            )?;
            tracing::debug!("Updated {} for {}", candidate.canonical_url, user_id);
            Ok(ReconcileOutcome::Updated)
        }
    }
}
