//! Database schema definitions
//!
//! Session state and the target queue live in `kv_blobs` as opaque values; collected
//! reviews go to `reviews`.

/// SQL schema for the database
pub const SCHEMA_SQL: &str = r#"
-- Named state blobs (crawl session, target queue, sync watermarks)
CREATE TABLE IF NOT EXISTS kv_blobs (
    key TEXT PRIMARY KEY,
    value BLOB NOT NULL,
    updated_at TEXT NOT NULL
);

-- Collected reviews
CREATE TABLE IF NOT EXISTS reviews (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    fingerprint TEXT NOT NULL,
    target_id TEXT NOT NULL,
    source TEXT NOT NULL,
    title TEXT NOT NULL,
    body TEXT NOT NULL,
    author TEXT NOT NULL,
    review_date TEXT,
    rating TEXT,
    collected_at TEXT NOT NULL,
    UNIQUE(fingerprint, target_id)
);

CREATE INDEX IF NOT EXISTS idx_reviews_target ON reviews(target_id);
"#;

/// Initializes the database schema
///
/// # Arguments
///
/// * `conn` - The database connection
///
/// # Returns
///
/// * `Ok(())` - Schema initialized successfully
/// * `Err(rusqlite::Error)` - Failed to initialize schema
pub fn initialize_schema(conn: &rusqlite::Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(SCHEMA_SQL)?;
    Ok(())
}
