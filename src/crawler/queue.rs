//! Target queue and batch crawling
//!
//! The queue is a persisted FIFO of target URLs. A batch crawls the entries one at a time,
//! removing each entry only once its session has reached a terminal status.

use crate::crawler::controller::StartRequest;
use crate::crawler::runner::{RunOutcome, SessionRunner};
use crate::state::SessionStatus;
use crate::storage::{load_json, save_json, SharedStore, StorageError, QUEUE_KEY, SESSION_KEY};
use crate::url::{parse_target_url, strip_volatile};
use crate::{CrawlSession, SweepError};
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// A target waiting to be crawled
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueueEntry {
    pub url: String,

    #[serde(default)]
    pub title: Option<String>,

    pub added_at: DateTime<Utc>,

    /// Site profile to use instead of resolving by domain
    #[serde(default)]
    pub source: Option<String>,
}

impl QueueEntry {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            title: None,
            added_at: Utc::now(),
            source: None,
        }
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = Some(source.into());
        self
    }
}

/// Settings applied to every session of a batch
#[derive(Debug, Clone, Default)]
pub struct BatchOptions {
    pub incremental_only: bool,
    pub watermark_date: Option<NaiveDate>,
    pub queue_name: Option<String>,
}

/// Result for one queued target
#[derive(Debug, Clone, PartialEq)]
pub struct TargetReport {
    pub url: String,
    pub target_id: Option<String>,
    pub status: Option<SessionStatus>,
    pub collected: u64,
    pub note: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct BatchReport {
    pub targets: Vec<TargetReport>,

    /// The batch was stopped before the queue drained
    pub stopped: bool,
}

impl BatchReport {
    pub fn collected(&self) -> u64 {
        self.targets.iter().map(|t| t.collected).sum()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum BatchOutcome {
    Finished(BatchReport),
    Rejected(String),
}

/// Persisted target queue and the batch loop over it
pub struct QueueManager {
    store: SharedStore,
    runner: Arc<SessionRunner>,
    running: AtomicBool,
    stop: AtomicBool,
}

/// Clears the running flag when a batch ends, however it ends
struct RunningGuard<'a>(&'a AtomicBool);

impl Drop for RunningGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

impl QueueManager {
    pub fn new(runner: Arc<SessionRunner>) -> Self {
        Self {
            store: runner.store().clone(),
            runner,
            running: AtomicBool::new(false),
            stop: AtomicBool::new(false),
        }
    }

    /// Appends a target to the queue
    ///
    /// # Returns
    ///
    /// * `Ok(usize)` - Queue length after the append
    /// * `Err(SweepError::DuplicateEnqueue)` - An equivalent URL is already queued
    /// * `Err(SweepError::UrlError)` - The URL is not an absolute http(s) URL
    pub fn enqueue(&self, mut entry: QueueEntry) -> Result<usize, SweepError> {
        let url = parse_target_url(&entry.url)?;
        let key = strip_volatile(&url, &[]);
        entry.url = url.to_string();

        let mut guard = self
            .store
            .lock()
            .map_err(|e| StorageError::Lock(e.to_string()))?;
        let mut queue: Vec<QueueEntry> = match guard.get(QUEUE_KEY)? {
            Some(bytes) => serde_json::from_slice(&bytes)?,
            None => Vec::new(),
        };

        let duplicate = queue.iter().any(|queued| {
            parse_target_url(&queued.url).is_ok_and(|queued| strip_volatile(&queued, &[]) == key)
        });
        if duplicate {
            return Err(SweepError::DuplicateEnqueue { url: entry.url });
        }

        tracing::debug!("Queued {}", entry.url);
        queue.push(entry);
        guard.set(QUEUE_KEY, &serde_json::to_vec(&queue)?)?;
        Ok(queue.len())
    }

    /// Returns the queue in crawl order
    pub fn list(&self) -> Result<Vec<QueueEntry>, SweepError> {
        Ok(load_json(&self.store, QUEUE_KEY)?.unwrap_or_default())
    }

    /// Removes the entry equivalent to `url`; returns false if none was queued
    pub fn remove(&self, url: &str) -> Result<bool, SweepError> {
        let key = strip_volatile(&parse_target_url(url)?, &[]);
        let mut queue = self.list()?;
        let before = queue.len();
        queue.retain(|queued| {
            !parse_target_url(&queued.url).is_ok_and(|queued| strip_volatile(&queued, &[]) == key)
        });

        if queue.len() == before {
            return Ok(false);
        }
        save_json(&self.store, QUEUE_KEY, &queue)?;
        Ok(true)
    }

    /// Empties the queue and returns how many entries were dropped
    pub fn clear(&self) -> Result<usize, SweepError> {
        let dropped = self.list()?.len();
        save_json(&self.store, QUEUE_KEY, &Vec::<QueueEntry>::new())?;
        Ok(dropped)
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Stops the batch after the current target and stops that target's session
    pub fn stop_batch(&self) -> Result<bool, SweepError> {
        self.stop.store(true, Ordering::SeqCst);
        self.runner.context().stop_session(None)
    }

    /// Crawls every queued target in order
    ///
    /// A target that fails or is stopped is still dequeued and the batch moves on; only an
    /// explicit `stop_batch` ends it early, leaving the remaining entries queued.
    pub async fn start_batch(&self, options: BatchOptions) -> Result<BatchOutcome, SweepError> {
        if self.running.swap(true, Ordering::SeqCst) {
            return Ok(BatchOutcome::Rejected("a batch is already running".to_string()));
        }
        let _guard = RunningGuard(&self.running);
        self.stop.store(false, Ordering::SeqCst);

        if self.list()?.is_empty() {
            return Ok(BatchOutcome::Rejected("the queue is empty".to_string()));
        }

        let live: Option<CrawlSession> = load_json(&self.store, SESSION_KEY)?;
        if let Some(live) = live.filter(|s| s.status.is_live()) {
            return Ok(BatchOutcome::Rejected(format!(
                "a session for {} is still {}; resume or stop it first",
                live.target_id, live.status
            )));
        }

        let mut report = BatchReport::default();
        while let Some(entry) = self.list()?.into_iter().next() {
            if self.stop.load(Ordering::SeqCst) {
                report.stopped = true;
                break;
            }
            tracing::info!("Batch: crawling {}", entry.url);

            let target = self.run_entry(&entry, &options).await?;
            self.dequeue(&entry)?;
            if target.status == Some(SessionStatus::Stopped) && self.stop.load(Ordering::SeqCst) {
                report.stopped = true;
                report.targets.push(target);
                break;
            }
            report.targets.push(target);
        }

        tracing::info!(
            "Batch finished: {} targets, {} reviews",
            report.targets.len(),
            report.collected()
        );
        Ok(BatchOutcome::Finished(report))
    }

    async fn run_entry(
        &self,
        entry: &QueueEntry,
        options: &BatchOptions,
    ) -> Result<TargetReport, SweepError> {
        let mut report = TargetReport {
            url: entry.url.clone(),
            target_id: None,
            status: None,
            collected: 0,
            note: None,
        };

        let location = match parse_target_url(&entry.url) {
            Ok(location) => location,
            Err(e) => {
                tracing::warn!("Skipping {}: {}", entry.url, e);
                report.note = Some(e.to_string());
                return Ok(report);
            }
        };

        let mut request = StartRequest::new(location);
        request.source = entry.source.clone();
        request.incremental_only = options.incremental_only;
        request.watermark_date = options.watermark_date;
        request.queue_name = options.queue_name.clone();

        match self.runner.run(request).await {
            Ok(RunOutcome::Rejected(reason)) => {
                tracing::warn!("Skipping {}: {}", entry.url, reason);
                report.note = Some(reason);
            }
            Ok(RunOutcome::Finished {
                status,
                collected,
                note,
            }) => {
                report.status = Some(status);
                report.collected = collected;
                report.note = note;
                report.target_id = self.runner.context().session()?.map(|s| s.target_id);
            }
            Err(e) if e.is_fatal() => {
                report.status = Some(SessionStatus::Failed);
                report.note = Some(e.to_string());
            }
            Err(e) => return Err(e),
        }

        Ok(report)
    }

    fn dequeue(&self, entry: &QueueEntry) -> Result<(), SweepError> {
        let mut queue = self.list()?;
        if let Some(position) = queue.iter().position(|queued| queued.url == entry.url) {
            queue.remove(position);
            save_json(&self.store, QUEUE_KEY, &queue)?;
        }
        Ok(())
    }
}
