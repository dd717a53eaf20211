//! Output traits and types
//!
//! Collected records leave the crawler through a [`RecordSink`]; everything else a user
//! might want to watch goes to [`SessionObserver`]s.

use crate::records::CollectedRecord;
use crate::state::{CrawlSession, SessionStatus};
use async_trait::async_trait;
use serde::Serialize;
use std::fmt;
use thiserror::Error;

/// Errors that can occur while emitting records
#[derive(Debug, Error)]
pub enum SinkError {
    #[error("Failed to lock sink: {0}")]
    Lock(String),

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
}

/// Result type for sink operations
pub type SinkResult<T> = Result<T, SinkError>;

/// Destination for collected records
///
/// Emitting the same record twice must be harmless.
#[async_trait]
pub trait RecordSink: Send + Sync {
    async fn emit(&self, records: &[CollectedRecord]) -> SinkResult<()>;
}

/// Severity of an observer log line
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Info,
    Warn,
    Error,
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Info => write!(f, "info"),
            Self::Warn => write!(f, "warn"),
            Self::Error => write!(f, "error"),
        }
    }
}

/// Point-in-time view of a session for observers
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionSnapshot {
    pub target_id: String,
    pub source: String,
    pub status: SessionStatus,
    pub current_page: u32,
    pub total_pages: Option<u32>,
    pub collected_count: u64,
    pub duplicates_dropped: u64,
    pub stale_dropped: u64,
    pub last_error: Option<String>,
}

impl From<&CrawlSession> for SessionSnapshot {
    fn from(session: &CrawlSession) -> Self {
        Self {
            target_id: session.target_id.clone(),
            source: session.source.clone(),
            status: session.status,
            current_page: session.current_page,
            total_pages: session.total_pages,
            collected_count: session.collected_count,
            duplicates_dropped: session.duplicates_dropped,
            stale_dropped: session.stale_dropped,
            last_error: session.last_error.clone(),
        }
    }
}

/// Something that happened during a session
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "lowercase")]
pub enum SessionEvent {
    Progress(SessionSnapshot),
    Log { text: String, level: LogLevel },
    Complete(SessionSnapshot),
}

/// Listener for session events
///
/// Delivery is best-effort; an observer must not block the crawl.
pub trait SessionObserver: Send + Sync {
    fn notify(&self, event: &SessionEvent);
}
