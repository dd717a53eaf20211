//! SQLite record sink
//!
//! Reviews are written to the `reviews` table of the crawl database. A review is keyed by
//! fingerprint and target, so re-emitting it leaves the table unchanged.

use crate::output::traits::{RecordSink, SinkError, SinkResult};
use crate::records::CollectedRecord;
use crate::storage::initialize_schema;
use async_trait::async_trait;
use rusqlite::{params, Connection};
use std::path::Path;
use std::sync::Mutex;

pub struct SqliteSink {
    conn: Mutex<Connection>,
}

impl SqliteSink {
    /// Opens the sink on the database at `path`
    ///
    /// # Arguments
    ///
    /// * `path` - Path to the SQLite database file
    pub fn new(path: &Path) -> SinkResult<Self> {
        let conn = Connection::open(path)?;
        conn.busy_timeout(std::time::Duration::from_secs(5))?;
        initialize_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Creates a sink backed by an in-memory database
    pub fn new_in_memory() -> SinkResult<Self> {
        let conn = Connection::open_in_memory()?;
        initialize_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn lock(&self) -> SinkResult<std::sync::MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| SinkError::Lock(e.to_string()))
    }

    /// Counts stored reviews, optionally for one target
    pub fn count(&self, target_id: Option<&str>) -> SinkResult<u64> {
        let conn = self.lock()?;
        let count: i64 = match target_id {
            Some(target) => conn.query_row(
                "SELECT COUNT(*) FROM reviews WHERE target_id = ?1",
                params![target],
                |row| row.get(0),
            )?,
            None => conn.query_row("SELECT COUNT(*) FROM reviews", [], |row| row.get(0))?,
        };
        Ok(count as u64)
    }

    /// Review counts per target, largest first
    pub fn count_by_target(&self) -> SinkResult<Vec<(String, u64)>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT target_id, COUNT(*) FROM reviews
             GROUP BY target_id ORDER BY COUNT(*) DESC, target_id",
        )?;
        let rows = stmt
            .query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)? as u64)))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }
}

#[async_trait]
impl RecordSink for SqliteSink {
    async fn emit(&self, records: &[CollectedRecord]) -> SinkResult<()> {
        if records.is_empty() {
            return Ok(());
        }

        let mut conn = self.lock()?;
        let tx = conn.transaction()?;
        {
            let mut stmt = tx.prepare(
                "INSERT OR IGNORE INTO reviews
                 (fingerprint, target_id, source, title, body, author, review_date, rating, collected_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            )?;
            for item in records {
                stmt.execute(params![
                    item.fingerprint.as_str(),
                    item.target_id,
                    item.source,
                    item.record.title,
                    item.record.body,
                    item.record.author,
                    item.record.date,
                    item.record.rating,
                    item.collected_at.to_rfc3339(),
                ])?;
            }
        }
        tx.commit()?;

        tracing::debug!("Stored {} records", records.len());
        Ok(())
    }
}

/// Sink that keeps records in memory, for dry runs and tests
#[derive(Debug, Default)]
pub struct MemorySink {
    records: Mutex<Vec<CollectedRecord>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a copy of everything emitted so far
    pub fn records(&self) -> Vec<CollectedRecord> {
        self.records
            .lock()
            .map(|records| records.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl RecordSink for MemorySink {
    async fn emit(&self, records: &[CollectedRecord]) -> SinkResult<()> {
        let mut stored = self
            .records
            .lock()
            .map_err(|e| SinkError::Lock(e.to_string()))?;
        stored.extend_from_slice(records);
        Ok(())
    }
}
