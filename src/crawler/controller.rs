//! Crawl session controller
//!
//! The controller owns the state machine of a crawl session. It holds no session state of
//! its own: every step loads the session from the store and persists it again before any
//! suspension point, so a controller in a brand-new execution context can pick up where a
//! destroyed one left off.

use crate::config::{Config, SiteConfig};
use crate::crawler::traversal::{
    strategy_for, PageContent, PageLoader, PageSnapshot, TraversalStrategy,
};
use crate::crawler::Throttle;
use crate::output::{LogLevel, ObserverSet, RecordSink};
use crate::records::{partition_unseen, CollectedRecord, IncrementalFilter};
use crate::state::{CrawlMode, CrawlSession, SessionStatus};
use crate::storage::{
    load_json, load_watermark, save_watermark, SharedStore, StorageError, SESSION_KEY,
};
use crate::url::{find_site, strip_volatile};
use crate::SweepError;
use chrono::{NaiveDate, Utc};
use std::sync::Arc;
use url::Url;

/// What the driver of a session has to do next
#[derive(Debug, Clone, PartialEq)]
pub enum NextStep {
    /// Load `url` in a fresh execution context and call `resume_if_pending` there
    Navigate { url: Url, page: u32 },

    /// Call `fetch_step` to retrieve `page` in-process
    Fetch(u32),

    /// The session ended
    Finished(SessionStatus),
}

#[derive(Debug, Clone, PartialEq)]
pub enum StartOutcome {
    Accepted(NextStep),
    Rejected(String),
}

#[derive(Debug, Clone, PartialEq)]
pub enum ResumeOutcome {
    Resumed(NextStep),
    /// Nothing to resume, or the context has not moved past the last processed page
    Noop,
}

/// Parameters of a new session
#[derive(Debug, Clone)]
pub struct StartRequest {
    /// Where the execution context currently is: the target's parent page or a listing page
    pub location: Url,

    /// Site profile name; resolved from the location's domain when absent
    pub source: Option<String>,

    pub incremental_only: bool,

    /// Defaults to the target's last completion date
    pub watermark_date: Option<NaiveDate>,

    pub queue_name: Option<String>,

    /// Stop a live session instead of rejecting the request
    pub force: bool,
}

impl StartRequest {
    pub fn new(location: Url) -> Self {
        Self {
            location,
            source: None,
            incremental_only: false,
            watermark_date: None,
            queue_name: None,
            force: false,
        }
    }
}

/// Drives one crawl session through its states
#[derive(Clone)]
pub struct SessionController {
    config: Arc<Config>,
    store: SharedStore,
    loader: Arc<dyn PageLoader>,
    sink: Arc<dyn RecordSink>,
    observers: ObserverSet,
    throttle: Throttle,
}

impl SessionController {
    /// Creates a controller
    ///
    /// # Arguments
    ///
    /// * `config` - Site profiles and pacing
    /// * `store` - Where the session blob lives
    /// * `loader` - Transport used in fetch mode
    /// * `sink` - Destination of collected records
    /// * `observers` - Progress and log listeners
    pub fn new(
        config: Arc<Config>,
        store: SharedStore,
        loader: Arc<dyn PageLoader>,
        sink: Arc<dyn RecordSink>,
        observers: ObserverSet,
    ) -> Self {
        let throttle = Throttle::from_config(&config.crawler);
        Self {
            config,
            store,
            loader,
            sink,
            observers,
            throttle,
        }
    }

    /// Returns the persisted session, if any
    pub fn session(&self) -> Result<Option<CrawlSession>, SweepError> {
        load_json(&self.store, SESSION_KEY)
    }

    fn site(&self, name: &str) -> Result<&SiteConfig, SweepError> {
        self.config
            .site(name)
            .ok_or_else(|| SweepError::UnknownSite(name.to_string()))
    }

    fn strategy(&self, site: &SiteConfig) -> Result<Box<dyn TraversalStrategy>, SweepError> {
        Ok(strategy_for(site, self.loader.clone())?)
    }

    /// Starts a session for the target at `request.location`
    ///
    /// In navigation mode a location outside the listing sends the context to the first
    /// listing page (`Redirecting`); a listing location is collected from directly. Fetch
    /// mode always collects in-process.
    pub fn start_session(&self, request: StartRequest) -> Result<StartOutcome, SweepError> {
        let Some(site) = find_site(&request.location, &self.config, request.source.as_deref())
        else {
            let reason = SweepError::UnknownSite(request.location.to_string());
            return Ok(StartOutcome::Rejected(reason.to_string()));
        };
        let Some(target_id) = site.target_id(&request.location) else {
            let reason = SweepError::UnknownTarget(request.location.to_string());
            return Ok(StartOutcome::Rejected(reason.to_string()));
        };

        if let Some(mut live) = self.session()?.filter(|s| s.status.is_live()) {
            if !request.force {
                return Ok(StartOutcome::Rejected(format!(
                    "a session for {} is already {}",
                    live.target_id, live.status
                )));
            }

            live.finish(
                SessionStatus::Stopped,
                Some(format!("preempted by a session for {}", target_id)),
            )?;
            self.commit(&live)?;
            self.observers.log(
                format!("[{}] stopped to make room for {}", live.target_id, target_id),
                LogLevel::Warn,
            );
            self.observers.complete(&live);
        }

        let mut session = CrawlSession::new(target_id, site.name.as_str(), site.mode);
        session.incremental_only = request.incremental_only;
        session.queue_name = request.queue_name;
        if request.incremental_only {
            session.watermark_date = match request.watermark_date {
                Some(date) => Some(date),
                None => load_watermark(&self.store, &session.target_id)?,
            };
            if session.watermark_date.is_none() {
                self.observers.log(
                    format!(
                        "[{}] no previous sync found, collecting all reviews",
                        session.target_id
                    ),
                    LogLevel::Warn,
                );
            }
        }

        let on_listing = site.is_listing(&request.location, &session.target_id);
        let first_page = if on_listing {
            site.page_number(&request.location)
        } else {
            1
        };
        session.current_page = first_page;
        session.first_page = first_page;

        let next = match site.mode {
            CrawlMode::Navigation if !on_listing => {
                session.transition(SessionStatus::Redirecting)?;
                NextStep::Navigate {
                    url: site.listing_location(&session.target_id, 1)?,
                    page: 1,
                }
            }
            CrawlMode::Navigation => {
                session.transition(SessionStatus::Collecting)?;
                NextStep::Navigate {
                    url: request.location.clone(),
                    page: first_page,
                }
            }
            CrawlMode::Fetch => {
                session.transition(SessionStatus::Collecting)?;
                NextStep::Fetch(first_page)
            }
        };

        if !self.install(&session)? {
            return Ok(StartOutcome::Rejected(format!(
                "another session started for {} meanwhile",
                session.target_id
            )));
        }
        tracing::info!(
            "Started {} session for {} on {} (page {})",
            session.mode,
            session.target_id,
            session.source,
            first_page
        );
        self.observers.progress(&session);

        Ok(StartOutcome::Accepted(next))
    }

    /// Stops the current session
    ///
    /// With `target_id` set, only a session for that target is stopped. Returns true if a
    /// session was stopped.
    pub fn stop_session(&self, target_id: Option<&str>) -> Result<bool, SweepError> {
        let session = {
            let mut guard = self
                .store
                .lock()
                .map_err(|e| StorageError::Lock(e.to_string()))?;
            let Some(bytes) = guard.get(SESSION_KEY)? else {
                return Ok(false);
            };
            let mut session: CrawlSession = serde_json::from_slice(&bytes)?;

            let other_target = target_id.is_some_and(|t| t != session.target_id);
            if other_target || session.status.is_terminal() {
                return Ok(false);
            }

            session.finish(SessionStatus::Stopped, None)?;
            guard.set(SESSION_KEY, &serde_json::to_vec(&session)?)?;
            session
        };

        tracing::info!(
            "Stopped session for {} at page {}",
            session.target_id,
            session.current_page
        );
        self.observers.complete(&session);
        Ok(true)
    }

    /// Picks up a pending session in a new execution context
    ///
    /// `content` is what the new context shows. The session resumes only when the context
    /// sits on a listing page of the session's target that lies past the last processed
    /// page; otherwise this is a no-op.
    pub async fn resume_if_pending(
        &self,
        content: PageContent,
    ) -> Result<ResumeOutcome, SweepError> {
        let Some(mut session) = self.session()?.filter(|s| s.status.is_live()) else {
            return Ok(ResumeOutcome::Noop);
        };
        let site = self.site(&session.source)?;
        let strategy = self.strategy(site)?;

        // A verification page can replace the listing at any URL
        if let Err(e) = strategy.check_challenge(&content, session.current_page) {
            return Ok(ResumeOutcome::Resumed(self.fail(session, e)?));
        }

        if !site.is_listing(&content.url, &session.target_id) {
            tracing::debug!(
                "Context at {} is not a listing page of {}",
                content.url,
                session.target_id
            );
            return Ok(ResumeOutcome::Noop);
        }

        let page = site.page_number(&content.url);
        let extra = [site.page_param.as_str()];
        let location_key = strip_volatile(&content.url, &extra);
        let last_key = session
            .last_processed_url
            .as_deref()
            .and_then(|raw| Url::parse(raw).ok())
            .map(|url| strip_volatile(&url, &extra));

        if !session.is_ahead(page, &location_key, last_key.as_deref()) {
            tracing::debug!("{}", SweepError::StaleResume { page });
            return Ok(ResumeOutcome::Noop);
        }

        if session.status != SessionStatus::Collecting {
            session.transition(SessionStatus::Collecting)?;
        }
        tracing::debug!("Resuming {} at page {}", session.target_id, page);

        let read = strategy.read(&content, page);
        let next = self.process(session, strategy.as_ref(), read).await?;
        Ok(ResumeOutcome::Resumed(next))
    }

    /// Retrieves and processes the current page of a fetch-mode session
    pub async fn fetch_step(&self) -> Result<NextStep, SweepError> {
        let Some(session) = self.session()? else {
            return Err(SweepError::Unsupported("no session to fetch for".to_string()));
        };
        if session.status.is_terminal() {
            return Ok(NextStep::Finished(session.status));
        }
        if session.mode != CrawlMode::Fetch || session.status != SessionStatus::Collecting {
            return Err(SweepError::Unsupported(format!(
                "cannot fetch for a {} session that is {}",
                session.mode, session.status
            )));
        }

        let site = self.site(&session.source)?;
        let strategy = self.strategy(site)?;
        let read = strategy
            .fetch_next(session.current_page, &session.target_id)
            .await;
        self.process(session, strategy.as_ref(), read).await
    }

    /// Where a pending session continues, for a driver that restarts after a crash
    ///
    /// Returns None when no session is live.
    pub fn pending_step(&self) -> Result<Option<NextStep>, SweepError> {
        let Some(mut session) = self.session()?.filter(|s| s.status.is_live()) else {
            return Ok(None);
        };
        let site = self.site(&session.source)?;

        if session.status == SessionStatus::Redirecting {
            return Ok(Some(NextStep::Navigate {
                url: site.listing_location(&session.target_id, 1)?,
                page: 1,
            }));
        }

        let page = session
            .last_processed_page
            .map_or(session.current_page, |last| session.current_page.max(last + 1));

        match session.mode {
            CrawlMode::Navigation => Ok(Some(NextStep::Navigate {
                url: site.listing_location(&session.target_id, page)?,
                page,
            })),
            CrawlMode::Fetch => {
                if session.status == SessionStatus::Paginating {
                    session.transition(SessionStatus::Collecting)?;
                }
                session.current_page = page;
                self.commit(&session)?;
                Ok(Some(NextStep::Fetch(page)))
            }
        }
    }

    /// Ends the live session as failed because of `error`
    pub fn fail_pending(&self, error: SweepError) -> Result<NextStep, SweepError> {
        match self.session()?.filter(|s| s.status.is_live()) {
            Some(session) => self.fail(session, error),
            None => Err(error),
        }
    }

    async fn process(
        &self,
        mut session: CrawlSession,
        strategy: &dyn TraversalStrategy,
        read: Result<PageSnapshot, SweepError>,
    ) -> Result<NextStep, SweepError> {
        if self.stop_requested(&session)? {
            tracing::info!(
                "Discarding results for {}: session was stopped or replaced",
                session.target_id
            );
            return Ok(NextStep::Finished(SessionStatus::Stopped));
        }

        let snapshot = match read {
            Ok(snapshot) => snapshot,
            Err(e) if e.is_fatal() => return self.fail(session, e),
            Err(e) => return Err(e),
        };
        let page = snapshot.page;
        let has_next = strategy.has_next(&snapshot);
        let total_pages = snapshot.pagination.total_pages;
        tracing::debug!(
            "Page {} of {}: {} records",
            page,
            session.target_id,
            snapshot.records.len()
        );

        if snapshot.records.is_empty() {
            session.mark_processed(snapshot.url.as_str(), page);
            let warning = SweepError::ExtractionEmpty { page }.to_string();
            return self.complete(session, Completion::Cut(warning));
        }

        let (fresh, duplicates) = partition_unseen(snapshot.records, &session.seen_fingerprints);
        session.duplicates_dropped += duplicates as u64;

        let (fresh, stale) = match (session.incremental_only, session.watermark_date) {
            (true, Some(watermark)) => IncrementalFilter::new(watermark).apply(fresh),
            _ => (fresh, 0),
        };
        session.stale_dropped += stale as u64;
        if duplicates > 0 || stale > 0 {
            tracing::trace!(
                "Page {}: dropped {} duplicates and {} stale records",
                page,
                duplicates,
                stale
            );
        }

        let mut collected = Vec::with_capacity(fresh.len());
        for item in fresh {
            session.remember(item.fingerprint.clone());
            collected.push(CollectedRecord::new(
                item,
                &session.target_id,
                &session.source,
            ));
        }

        session.collected_count += collected.len() as u64;
        session.mark_processed(snapshot.url.as_str(), page);
        if let Some(total) = total_pages {
            session.total_pages = Some(total.max(session.current_page));
        }
        if stale > 0 {
            session.stop_after_page = true;
        }

        if !self.commit(&session)? {
            return Ok(NextStep::Finished(SessionStatus::Stopped));
        }

        if !collected.is_empty() {
            if let Err(e) = self.sink.emit(&collected).await {
                self.observers.log(
                    format!(
                        "[{}] records from page {} not stored: {}",
                        session.target_id, page, e
                    ),
                    LogLevel::Warn,
                );
            }
        }
        self.observers.progress(&session);

        if session.stop_after_page {
            let note = if collected.is_empty() {
                format!("caught up: page {} only had reviews older than the watermark", page)
            } else {
                format!("caught up: reached the watermark on page {}", page)
            };
            return self.complete(session, Completion::CaughtUp(Some(note)));
        }

        if !has_next {
            return self.complete(session, Completion::CaughtUp(None));
        }

        let max_pages = self.config.crawler.max_pages;
        if page >= max_pages {
            let note = format!("stopped at the page limit ({})", max_pages);
            return self.complete(session, Completion::Cut(note));
        }

        session.transition(SessionStatus::Paginating)?;
        if !self.commit(&session)? {
            return Ok(NextStep::Finished(SessionStatus::Stopped));
        }

        self.throttle.wait().await;

        if self.stop_requested(&session)? {
            return Ok(NextStep::Finished(SessionStatus::Stopped));
        }

        let next_page = page + 1;
        session.transition(SessionStatus::Collecting)?;
        session.current_page = session.current_page.max(next_page);
        if !self.commit(&session)? {
            return Ok(NextStep::Finished(SessionStatus::Stopped));
        }

        Ok(match strategy.mode() {
            CrawlMode::Navigation => NextStep::Navigate {
                url: strategy.next_location(&session.target_id, next_page)?,
                page: next_page,
            },
            CrawlMode::Fetch => NextStep::Fetch(next_page),
        })
    }

    fn complete(
        &self,
        mut session: CrawlSession,
        completion: Completion,
    ) -> Result<NextStep, SweepError> {
        let (note, level, caught_up) = match completion {
            Completion::CaughtUp(note) => (note, LogLevel::Info, true),
            Completion::Cut(note) => (Some(note), LogLevel::Warn, false),
        };

        session.finish(SessionStatus::Completed, note.clone())?;
        if !self.commit(&session)? {
            return Ok(NextStep::Finished(SessionStatus::Stopped));
        }

        // Only a crawl that covered the listing from its first page vouches for the gap
        if caught_up && session.first_page == 1 {
            save_watermark(&self.store, &session.target_id, Utc::now().date_naive())?;
        } else {
            tracing::debug!("Keeping the sync watermark of {}", session.target_id);
        }

        if let Some(note) = note {
            self.observers
                .log(format!("[{}] {}", session.target_id, note), level);
        }
        tracing::debug!(
            "Completed {} after page {}: {} records",
            session.target_id,
            session.current_page,
            session.collected_count
        );
        self.observers.complete(&session);
        Ok(NextStep::Finished(SessionStatus::Completed))
    }

    fn fail(&self, mut session: CrawlSession, error: SweepError) -> Result<NextStep, SweepError> {
        let reason = error.to_string();
        session.finish(SessionStatus::Failed, Some(reason.clone()))?;
        if !self.commit(&session)? {
            return Ok(NextStep::Finished(SessionStatus::Stopped));
        }

        self.observers
            .log(format!("[{}] {}", session.target_id, reason), LogLevel::Error);
        self.observers.complete(&session);
        Ok(NextStep::Finished(SessionStatus::Failed))
    }

    /// True if `session` was stopped or another session took its place in the store
    fn stop_requested(&self, session: &CrawlSession) -> Result<bool, SweepError> {
        Ok(self
            .session()?
            .is_some_and(|stored| superseded(&stored, session)))
    }

    /// Persists `session` unless it was stopped or replaced meanwhile
    ///
    /// Returns false in that case; the stored copy is then left alone.
    fn commit(&self, session: &CrawlSession) -> Result<bool, SweepError> {
        self.write_unless(session, |stored| superseded(stored, session))
    }

    /// Persists a new session unless a live one is stored
    fn install(&self, session: &CrawlSession) -> Result<bool, SweepError> {
        self.write_unless(session, |stored| stored.status.is_live())
    }

    fn write_unless(
        &self,
        session: &CrawlSession,
        refuse: impl FnOnce(&CrawlSession) -> bool,
    ) -> Result<bool, SweepError> {
        let bytes = serde_json::to_vec(session)?;
        let mut guard = self
            .store
            .lock()
            .map_err(|e| StorageError::Lock(e.to_string()))?;

        if let Some(stored) = guard.get(SESSION_KEY)? {
            let stored: CrawlSession = serde_json::from_slice(&stored)?;
            if refuse(&stored) {
                return Ok(false);
            }
        }

        guard.set(SESSION_KEY, &bytes)?;
        Ok(true)
    }
}

/// How a completed session ended
enum Completion {
    /// The listing ran out or reached the watermark
    CaughtUp(Option<String>),

    /// Collection ended before the end of the listing
    Cut(String),
}

fn same_session(a: &CrawlSession, b: &CrawlSession) -> bool {
    a.target_id == b.target_id && a.started_at == b.started_at
}

/// True if the stored session no longer belongs to the holder of `session`
fn superseded(stored: &CrawlSession, session: &CrawlSession) -> bool {
    !same_session(stored, session) || stored.status == SessionStatus::Stopped
}
