use crate::records::Fingerprint;
use crate::state::{CrawlMode, SessionStatus};
use crate::SweepError;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Durable state of the crawl of one target
///
/// The session is the only state that survives the destruction of an execution context, so
/// everything needed to continue a crawl lives here and is persisted before any wait.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CrawlSession {
    pub target_id: String,

    /// Name of the site profile the target belongs to
    pub source: String,

    pub mode: CrawlMode,

    pub status: SessionStatus,

    /// 1-based page currently being worked on; never decreases
    pub current_page: u32,

    /// Page collection started from; later pages alone do not cover the whole listing
    #[serde(default = "first_listing_page")]
    pub first_page: u32,

    /// Estimated page total, when the listing exposes a review count
    pub total_pages: Option<u32>,

    pub collected_count: u64,

    pub incremental_only: bool,

    /// Records dated before this day are stale in incremental mode
    pub watermark_date: Option<NaiveDate>,

    /// Fingerprints of every record emitted so far; only grows
    pub seen_fingerprints: HashSet<Fingerprint>,

    pub last_processed_url: Option<String>,

    pub last_processed_page: Option<u32>,

    pub queue_name: Option<String>,

    pub started_at: DateTime<Utc>,

    pub updated_at: DateTime<Utc>,

    pub finished_at: Option<DateTime<Utc>>,

    pub duplicates_dropped: u64,

    pub stale_dropped: u64,

    /// The current page reached the watermark; pagination ends after it
    #[serde(default)]
    pub stop_after_page: bool,

    /// Reason for a failure, or the warning attached to an early completion
    pub last_error: Option<String>,
}

fn first_listing_page() -> u32 {
    1
}

impl CrawlSession {
    /// Creates an idle session positioned on the first page
    pub fn new(target_id: impl Into<String>, source: impl Into<String>, mode: CrawlMode) -> Self {
        let now = Utc::now();
        Self {
            target_id: target_id.into(),
            source: source.into(),
            mode,
            status: SessionStatus::Idle,
            current_page: 1,
            first_page: 1,
            total_pages: None,
            collected_count: 0,
            incremental_only: false,
            watermark_date: None,
            seen_fingerprints: HashSet::new(),
            last_processed_url: None,
            last_processed_page: None,
            queue_name: None,
            started_at: now,
            updated_at: now,
            finished_at: None,
            duplicates_dropped: 0,
            stale_dropped: 0,
            stop_after_page: false,
            last_error: None,
        }
    }

    /// Moves the session to `next`
    ///
    /// # Errors
    ///
    /// Returns `SweepError::InvalidTransition` if the move is not allowed from the current
    /// status.
    pub fn transition(&mut self, next: SessionStatus) -> Result<(), SweepError> {
        if !self.status.can_transition_to(next) {
            return Err(SweepError::InvalidTransition {
                from: self.status,
                to: next,
            });
        }

        self.status = next;
        self.touch();
        if next.is_terminal() {
            self.finished_at = Some(self.updated_at);
        }
        Ok(())
    }

    /// Ends the session with `status` and keeps `reason` for later inspection
    pub fn finish(
        &mut self,
        status: SessionStatus,
        reason: Option<String>,
    ) -> Result<(), SweepError> {
        self.transition(status)?;
        if reason.is_some() {
            self.last_error = reason;
        }
        Ok(())
    }

    /// Records a fingerprint; returns false if it was already seen
    pub fn remember(&mut self, fingerprint: Fingerprint) -> bool {
        self.seen_fingerprints.insert(fingerprint)
    }

    pub fn has_seen(&self, fingerprint: &Fingerprint) -> bool {
        self.seen_fingerprints.contains(fingerprint)
    }

    /// Records the page that was just processed and advances the page counter
    pub fn mark_processed(&mut self, url: &str, page: u32) {
        self.last_processed_url = Some(url.to_string());
        self.last_processed_page = Some(page);
        self.current_page = self.current_page.max(page);
        self.touch();
    }

    /// Returns true if a context on (`page`, `location_key`) has moved past the last
    /// processed page
    ///
    /// `last_key` is the last processed URL reduced the same way as `location_key`.
    pub fn is_ahead(&self, page: u32, location_key: &str, last_key: Option<&str>) -> bool {
        match (self.last_processed_page, last_key) {
            (None, _) | (_, None) => true,
            (Some(last_page), Some(last_key)) => page > last_page || location_key != last_key,
        }
    }

    pub fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}
