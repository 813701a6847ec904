//! SQLite storage implementation
//!
//! This module provides a SQLite-based implementation of the Storage trait.

use crate::rating::Rating;
use crate::storage::reconcile::reconcile as reconcile_candidate;
use crate::storage::schema::initialize_schema;
use crate::storage::traits::{Storage, StorageError, StorageResult};
use crate::storage::{
    BookRecord, Candidate, DateRange, PageTally, RatingCount, ReconcileOutcome,
};
use crate::LedgerError;
use chrono::{DateTime, Utc};
use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSql, ToSqlOutput, ValueRef};
use rusqlite::{params, Connection, OpenFlags, OptionalExtension, Row};
use std::collections::BTreeMap;
use std::path::Path;

const RECORD_COLUMNS: &str = "user_id, canonical_url, title, author, publish_date, rating,
     review_content, review_date, first_seen_at, last_updated_at";

/// Newest review first; records without a review date sort after dated ones
const RECORD_ORDER: &str = "ORDER BY review_date IS NULL, review_date DESC, canonical_url";

const RANGE_FILTER: &str =
    "(?2 IS NULL OR review_date >= ?2) AND (?3 IS NULL OR review_date <= ?3)";

/// SQLite storage backend
pub struct SqliteStorage {
    conn: Connection,
}

impl SqliteStorage {
    /// Creates a new SqliteStorage instance
    ///
    /// # Arguments
    ///
    /// * `path` - Path to the SQLite database file
    ///
    /// # Returns
    ///
    /// * `Ok(SqliteStorage)` - Successfully opened/created database
    /// * `Err(LedgerError)` - Failed to open database
    pub fn new(path: &Path) -> Result<Self, LedgerError> {
        let conn = Connection::open(path)?;

        // WAL lets readers see the last committed page while the crawl writes
        conn.execute_batch(
            "
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA temp_store = MEMORY;
            PRAGMA busy_timeout = 5000;
        ",
        )?;

        initialize_schema(&conn)?;

        Ok(Self { conn })
    }

    /// Opens an existing database for queries only
    pub fn open_reader(path: &Path) -> Result<Self, LedgerError> {
        let conn = Connection::open_with_flags(path, OpenFlags::SQLITE_OPEN_READ_ONLY)?;
        conn.busy_timeout(std::time::Duration::from_secs(5))?;
        Ok(Self { conn })
    }

    /// Creates an in-memory database
    pub fn new_in_memory() -> Result<Self, LedgerError> {
        let conn = Connection::open_in_memory()?;
        initialize_schema(&conn)?;
        Ok(Self { conn })
    }

    fn query_records<P: rusqlite::Params>(
        &self,
        filter: &str,
        params: P,
    ) -> StorageResult<Vec<BookRecord>> {
        let sql = format!(
            "SELECT {} FROM book_records WHERE {} {}",
            RECORD_COLUMNS, filter, RECORD_ORDER
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let records = stmt
            .query_map(params, row_to_record)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(records)
    }
}

/// Looks up one record by key on any connection or transaction
pub(crate) fn find_record(
    conn: &Connection,
    user_id: &str,
    canonical_url: &str,
) -> StorageResult<Option<BookRecord>> {
    let sql = format!(
        "SELECT {} FROM book_records WHERE user_id = ?1 AND canonical_url = ?2",
        RECORD_COLUMNS
    );
    let record = conn
        .query_row(&sql, params![user_id, canonical_url], row_to_record)
        .optional()?;
    Ok(record)
}

fn row_to_record(row: &Row<'_>) -> rusqlite::Result<BookRecord> {
    Ok(BookRecord {
        user_id: row.get(0)?,
        canonical_url: row.get(1)?,
        title: row.get(2)?,
        author: row.get(3)?,
        publish_date: row.get(4)?,
        rating: row.get(5)?,
        review_content: row.get(6)?,
        review_date: row.get(7)?,
        first_seen_at: row.get(8)?,
        last_updated_at: row.get(9)?,
    })
}

impl ToSql for Rating {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.to_db_string()))
    }
}

impl FromSql for Rating {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        let raw = value.as_str()?;
        Rating::from_db_string(raw).ok_or_else(|| {
            FromSqlError::Other(Box::new(StorageError::CorruptValue {
                column: "rating",
                value: raw.to_string(),
            }))
        })
    }
}

impl Storage for SqliteStorage {
    // ===== Reconciliation =====

    fn reconcile(
        &mut self,
        user_id: &str,
        candidate: &Candidate,
        now: DateTime<Utc>,
    ) -> StorageResult<ReconcileOutcome> {
        reconcile_candidate(&self.conn, user_id, candidate, now)
    }

    fn reconcile_page(
        &mut self,
        user_id: &str,
        candidates: &[Candidate],
        now: DateTime<Utc>,
    ) -> StorageResult<PageTally> {
        let tx = self.conn.transaction()?;
        let mut tally = PageTally::default();

        for candidate in candidates {
            tally.record(reconcile_candidate(&tx, user_id, candidate, now)?);
        }

        tx.commit()?;
        Ok(tally)
    }

    // ===== Record Queries =====

    fn get_record(&self, user_id: &str, canonical_url: &str) -> StorageResult<Option<BookRecord>> {
        find_record(&self.conn, user_id, canonical_url)
    }

    fn get_records(&self, user_id: &str) -> StorageResult<Vec<BookRecord>> {
        self.query_records("user_id = ?1", params![user_id])
    }

    fn get_records_in_date_range(
        &self,
        user_id: &str,
        range: DateRange,
    ) -> StorageResult<Vec<BookRecord>> {
        let filter = format!("user_id = ?1 AND {}", RANGE_FILTER);
        self.query_records(&filter, params![user_id, range.start, range.end])
    }

    fn get_records_by_rating(
        &self,
        user_id: &str,
        rating: Rating,
    ) -> StorageResult<Vec<BookRecord>> {
        self.query_records("user_id = ?1 AND rating = ?2", params![user_id, rating])
    }

    // ===== Statistics =====

    fn count_records(&self, user_id: &str, range: DateRange) -> StorageResult<u64> {
        let sql = format!(
            "SELECT COUNT(*) FROM book_records WHERE user_id = ?1 AND {}",
            RANGE_FILTER
        );
        let count: i64 = self
            .conn
            .query_row(&sql, params![user_id, range.start, range.end], |row| {
                row.get(0)
            })?;
        Ok(count as u64)
    }

    fn rating_breakdown(
        &self,
        user_id: &str,
        range: DateRange,
    ) -> StorageResult<BTreeMap<Rating, RatingCount>> {
        let sql = format!(
            "SELECT rating, COUNT(*), SUM(length(trim(review_content)) > 0) FROM book_records
             WHERE user_id = ?1 AND {}
             GROUP BY rating",
            RANGE_FILTER
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt
            .query_map(params![user_id, range.start, range.end], |row| {
                Ok((
                    row.get::<_, Rating>(0)?,
                    RatingCount {
                        records: row.get::<_, i64>(1)? as u64,
                        reviewed: row.get::<_, i64>(2)? as u64,
                    },
                ))
            })?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(rows.into_iter().collect())
    }

    fn last_updated_at(&self, user_id: &str) -> StorageResult<Option<DateTime<Utc>>> {
        let latest: Option<DateTime<Utc>> = self.conn.query_row(
            "SELECT MAX(last_updated_at) FROM book_records WHERE user_id = ?1",
            params![user_id],
            |row| row.get(0),
        )?;
        Ok(latest)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDate, TimeZone};
    use tempfile::TempDir;

    fn at(day: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, day, 12, 0, 0).unwrap()
    }

    fn candidate(id: u32, rating: Rating, review_date: Option<NaiveDate>) -> Candidate {
        Candidate {
            canonical_url: format!("https://book.example.com/subject/{}/", id),
            title: format!("Book {}", id),
            author: None,
            publish_date: None,
            rating,
            review_content: String::new(),
            review_date,
        }
    }

    fn date(y: i32, m: u32, d: u32) -> Option<NaiveDate> {
        NaiveDate::from_ymd_opt(y, m, d)
    }

    fn seeded() -> SqliteStorage {
        let mut storage = SqliteStorage::new_in_memory().unwrap();
        let mut reviewed = candidate(3, Rating::FiveStars, date(2023, 3, 1));
        reviewed.review_content = "Wonderful".to_string();
        let page = vec![
            candidate(1, Rating::FourStars, date(2023, 1, 1)),
            candidate(2, Rating::Unrated, date(2023, 2, 1)),
            reviewed,
            candidate(4, Rating::FourStars, None),
        ];
        storage.reconcile_page("reader", &page, at(1)).unwrap();
        storage
    }

    #[test]
    fn test_create_in_memory() {
        let storage = SqliteStorage::new_in_memory();
        assert!(storage.is_ok());
    }

    #[test]
    fn test_reconcile_page_is_idempotent() {
        let mut storage = seeded();
        let page: Vec<Candidate> = storage
            .get_records("reader")
            .unwrap()
            .into_iter()
            .map(|r| Candidate {
                canonical_url: r.canonical_url,
                title: r.title,
                author: r.author,
                publish_date: r.publish_date,
                rating: r.rating,
                review_content: r.review_content,
                review_date: r.review_date,
            })
            .collect();

        let tally = storage.reconcile_page("reader", &page, at(2)).unwrap();
        assert_eq!(tally.unchanged, 4);
        assert_eq!(tally.mutations(), 0);
        assert_eq!(storage.last_updated_at("reader").unwrap(), Some(at(1)));
    }

    #[test]
    fn test_one_record_per_key() {
        let mut storage = seeded();
        let again = candidate(1, Rating::ThreeStars, date(2023, 1, 1));
        assert_eq!(
            storage.reconcile("reader", &again, at(2)).unwrap(),
            ReconcileOutcome::Updated
        );
        assert_eq!(storage.count_records("reader", DateRange::all()).unwrap(), 4);

        let record = storage
            .get_record("reader", &again.canonical_url)
            .unwrap()
            .unwrap();
        assert_eq!(record.rating, Rating::ThreeStars);
        assert_eq!(record.first_seen_at, at(1));
        assert_eq!(record.last_updated_at, at(2));
    }

    #[test]
    fn test_records_ordered_newest_first_unknown_last() {
        let storage = seeded();
        let titles: Vec<String> = storage
            .get_records("reader")
            .unwrap()
            .into_iter()
            .map(|r| r.title)
            .collect();
        assert_eq!(titles, vec!["Book 3", "Book 2", "Book 1", "Book 4"]);
    }

    #[test]
    fn test_date_range_is_inclusive() {
        let storage = seeded();
        let range = DateRange::between(
            NaiveDate::from_ymd_opt(2023, 1, 1).unwrap(),
            NaiveDate::from_ymd_opt(2023, 2, 1).unwrap(),
        );
        let records = storage.get_records_in_date_range("reader", range).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(storage.count_records("reader", range).unwrap(), 2);

        // Open range keeps undated records
        let all = storage
            .get_records_in_date_range("reader", DateRange::all())
            .unwrap();
        assert_eq!(all.len(), 4);

        let from_feb = DateRange::parse(Some("2023-02-01"), None).unwrap();
        assert_eq!(storage.count_records("reader", from_feb).unwrap(), 2);
    }

    #[test]
    fn test_rating_breakdown_matches_counts() {
        let storage = seeded();
        let breakdown = storage.rating_breakdown("reader", DateRange::all()).unwrap();

        assert_eq!(
            breakdown.get(&Rating::FiveStars),
            Some(&RatingCount {
                records: 1,
                reviewed: 1
            })
        );
        assert_eq!(
            breakdown.get(&Rating::FourStars),
            Some(&RatingCount {
                records: 2,
                reviewed: 0
            })
        );
        assert_eq!(breakdown.get(&Rating::Unrated).map(|c| c.records), Some(1));
        assert_eq!(breakdown.get(&Rating::TwoStars), None);
        assert_eq!(
            breakdown.values().map(|c| c.records).sum::<u64>(),
            storage.count_records("reader", DateRange::all()).unwrap()
        );
    }

    #[test]
    fn test_records_by_rating() {
        let storage = seeded();
        let unrated = storage.get_records_by_rating("reader", Rating::Unrated).unwrap();
        assert_eq!(unrated.len(), 1);
        assert_eq!(unrated[0].title, "Book 2");
    }

    #[test]
    fn test_empty_user() {
        let storage = seeded();
        assert_eq!(storage.last_updated_at("nobody").unwrap(), None);
        assert!(storage.get_records("nobody").unwrap().is_empty());
        assert!(storage
            .rating_breakdown("nobody", DateRange::all())
            .unwrap()
            .is_empty());
    }

    #[test]
    fn test_reader_sees_committed_pages() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("ledger.db");

        let mut writer = SqliteStorage::new(&path).unwrap();
        writer
            .reconcile_page(
                "reader",
                &[candidate(9, Rating::TwoStars, date(2022, 5, 5))],
                at(3),
            )
            .unwrap();

        let reader = SqliteStorage::open_reader(&path).unwrap();
        let records = reader.get_records("reader").unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].rating, Rating::TwoStars);
        assert_eq!(records[0].first_seen_at, at(3));
    }

    #[test]
    fn test_schema_rejects_unknown_rating() {
        let storage = SqliteStorage::new_in_memory().unwrap();
        let result = storage.conn.execute(
            "INSERT INTO book_records (user_id, canonical_url, title, rating, first_seen_at, last_updated_at)
             VALUES ('u', 'x', 't', 'six', '2024-01-01', '2024-01-01')",
            [],
        );
        assert!(result.is_err());
    }
}
