//! Database schema definitions
//!
//! The ledger keeps exactly one table. Its primary key enforces that a user
//! never has two records for the same remote item.

/// SQL schema for the database
pub const SCHEMA_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS book_records (
    user_id TEXT NOT NULL,
    canonical_url TEXT NOT NULL,
    title TEXT NOT NULL,
    author TEXT,
    publish_date TEXT,
    rating TEXT NOT NULL CHECK (rating IN ('unrated', '1', '2', '3', '4', '5')),
    review_content TEXT NOT NULL DEFAULT '',
    review_date TEXT,
    first_seen_at TEXT NOT NULL,
    last_updated_at TEXT NOT NULL,
    PRIMARY KEY (user_id, canonical_url)
);

CREATE INDEX IF NOT EXISTS idx_book_records_review_date ON book_records(user_id, review_date);
CREATE INDEX IF NOT EXISTS idx_book_records_rating ON book_records(user_id, rating);
"#;

/// Current schema version, stored in `PRAGMA user_version`
pub const SCHEMA_VERSION: u32 = 1;

/// Initializes the database schema
pub fn initialize_schema(conn: &rusqlite::Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(SCHEMA_SQL)?;
    conn.pragma_update(None, "user_version", SCHEMA_VERSION)?;
    Ok(())
}
