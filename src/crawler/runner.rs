//! Session runner - drives a session from start to a terminal status
//!
//! The runner plays the part of the execution context. Every navigation builds a new
//! controller from the shared store, so nothing but the persisted session carries over
//! from one page to the next.

use crate::config::Config;
use crate::crawler::controller::{
    NextStep, ResumeOutcome, SessionController, StartOutcome, StartRequest,
};
use crate::crawler::traversal::PageLoader;
use crate::output::{ObserverSet, RecordSink};
use crate::state::SessionStatus;
use crate::storage::SharedStore;
use crate::SweepError;
use std::sync::Arc;

/// How a run ended
#[derive(Debug, Clone, PartialEq)]
pub enum RunOutcome {
    /// The session was never started
    Rejected(String),

    Finished {
        status: SessionStatus,
        collected: u64,
        /// Failure reason or completion warning
        note: Option<String>,
    },
}

/// Runs crawl sessions against a loader, a store and a sink
pub struct SessionRunner {
    config: Arc<Config>,
    store: SharedStore,
    loader: Arc<dyn PageLoader>,
    sink: Arc<dyn RecordSink>,
    observers: ObserverSet,
}

impl SessionRunner {
    pub fn new(
        config: Arc<Config>,
        store: SharedStore,
        loader: Arc<dyn PageLoader>,
        sink: Arc<dyn RecordSink>,
        observers: ObserverSet,
    ) -> Self {
        Self {
            config,
            store,
            loader,
            sink,
            observers,
        }
    }

    pub fn store(&self) -> &SharedStore {
        &self.store
    }

    /// Builds a controller for a new execution context
    pub fn context(&self) -> SessionController {
        SessionController::new(
            self.config.clone(),
            self.store.clone(),
            self.loader.clone(),
            self.sink.clone(),
            self.observers.clone(),
        )
    }

    /// Starts a session for `request` and drives it to the end
    pub async fn run(&self, request: StartRequest) -> Result<RunOutcome, SweepError> {
        match self.context().start_session(request)? {
            StartOutcome::Rejected(reason) => {
                tracing::warn!("Session not started: {}", reason);
                Ok(RunOutcome::Rejected(reason))
            }
            StartOutcome::Accepted(step) => self.drive(step).await,
        }
    }

    /// Continues a live session left behind by an interrupted run
    ///
    /// Returns None when there is nothing to resume.
    pub async fn resume(&self) -> Result<Option<RunOutcome>, SweepError> {
        match self.context().pending_step()? {
            Some(step) => {
                tracing::info!("Resuming interrupted session");
                Ok(Some(self.drive(step).await?))
            }
            None => Ok(None),
        }
    }

    async fn drive(&self, mut step: NextStep) -> Result<RunOutcome, SweepError> {
        loop {
            step = match step {
                NextStep::Finished(_) => return self.outcome(),
                NextStep::Fetch(page) => {
                    tracing::debug!("Fetching page {}", page);
                    self.context().fetch_step().await?
                }
                NextStep::Navigate { url, page } => {
                    tracing::debug!("Navigating to page {}: {}", page, url);
                    let content = match self.loader.load(&url, page).await {
                        Ok(content) => content,
                        Err(e) if e.is_fatal() => {
                            self.context().fail_pending(e)?;
                            return self.outcome();
                        }
                        Err(e) => return Err(e),
                    };

                    match self.context().resume_if_pending(content).await? {
                        ResumeOutcome::Resumed(next) => next,
                        ResumeOutcome::Noop => {
                            // The destination did not move the session forward
                            let context = self.context();
                            if context.session()?.is_some_and(|s| s.status.is_live()) {
                                tracing::warn!(
                                    "Page {} did not advance the session ({})",
                                    page,
                                    url
                                );
                                context.stop_session(None)?;
                            }
                            return self.outcome();
                        }
                    }
                }
            };
        }
    }

    fn outcome(&self) -> Result<RunOutcome, SweepError> {
        let Some(session) = self.context().session()? else {
            return Err(SweepError::Unsupported(
                "session disappeared from the store".to_string(),
            ));
        };
        Ok(RunOutcome::Finished {
            status: session.status,
            collected: session.collected_count,
            note: session.last_error,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crawler::traversal::tests::{listing_html, StaticLoader};
    use crate::crawler::traversal::PageContent;
    use crate::output::MemorySink;
    use crate::storage::{shared, MemoryStore};
    use crate::url::tests::create_test_config;
    use async_trait::async_trait;
    use url::Url;

    const NAV_LISTING: &str = "https://shop.example/product-reviews/B00TEST123?pageNumber=";

    fn runner(pages: Vec<(String, u16, String)>) -> (SessionRunner, Arc<MemorySink>) {
        let sink = Arc::new(MemorySink::new());
        let runner = SessionRunner::new(
            Arc::new(create_test_config()),
            shared(MemoryStore::new()),
            Arc::new(StaticLoader::new(pages)),
            sink.clone(),
            ObserverSet::new(),
        );
        (runner, sink)
    }

    fn request(raw: &str) -> StartRequest {
        StartRequest::new(Url::parse(raw).unwrap())
    }

    #[tokio::test]
    async fn test_run_navigation_session() {
        let (runner, sink) = runner(vec![
            (
                format!("{}1", NAV_LISTING),
                200,
                listing_html(&[("Great", "Ana", "June 1, 2024")], true),
            ),
            (
                format!("{}2", NAV_LISTING),
                200,
                listing_html(&[("Fine", "Ben", "May 3, 2024")], false),
            ),
        ]);

        let outcome = runner
            .run(request("https://www.shop.example/dp/B00TEST123"))
            .await
            .unwrap();
        assert_eq!(
            outcome,
            RunOutcome::Finished {
                status: SessionStatus::Completed,
                collected: 2,
                note: None,
            }
        );
        assert_eq!(sink.records().len(), 2);
    }

    #[tokio::test]
    async fn test_navigation_transport_failure() {
        let (runner, _sink) = runner(vec![]);

        let outcome = runner
            .run(request("https://www.shop.example/dp/B00TEST123"))
            .await
            .unwrap();
        assert!(matches!(
            outcome,
            RunOutcome::Finished {
                status: SessionStatus::Failed,
                collected: 0,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn test_run_rejected_for_unknown_site() {
        let (runner, _sink) = runner(vec![]);

        let outcome = runner
            .run(request("https://other.example/dp/B00TEST123"))
            .await
            .unwrap();
        assert!(matches!(outcome, RunOutcome::Rejected(_)));
    }

    /// Loader whose site sends every request to its verification page
    struct CaptchaRedirectLoader;

    #[async_trait]
    impl PageLoader for CaptchaRedirectLoader {
        async fn load(&self, _url: &Url, _page: u32) -> Result<PageContent, SweepError> {
            Ok(PageContent {
                url: Url::parse("https://www.shop.example/errors/validateCaptcha")?,
                status: 200,
                body: "<html><head><title>Shop</title></head><body>\
                       <form action='/errors/validateCaptcha'><input name='field-keywords'>\
                       </form></body></html>"
                    .to_string(),
            })
        }
    }

    #[tokio::test]
    async fn test_redirect_to_challenge_fails_session() {
        let runner = SessionRunner::new(
            Arc::new(create_test_config()),
            shared(MemoryStore::new()),
            Arc::new(CaptchaRedirectLoader),
            Arc::new(MemorySink::new()),
            ObserverSet::new(),
        );

        let outcome = runner
            .run(request("https://www.shop.example/dp/B00TEST123"))
            .await
            .unwrap();
        let RunOutcome::Finished {
            status,
            collected,
            note,
        } = outcome
        else {
            panic!("session was not started");
        };
        assert_eq!(status, SessionStatus::Failed);
        assert_eq!(collected, 0);
        assert!(note.unwrap().contains("challenge"));
    }

    #[tokio::test]
    async fn test_resume_after_interruption() {
        let (runner, sink) = runner(vec![(
            format!("{}2", NAV_LISTING),
            200,
            listing_html(&[("Fine", "Ben", "May 3, 2024")], false),
        )]);
        assert_eq!(runner.resume().await.unwrap(), None);

        // Page 1 was processed before the previous run died
        let context = runner.context();
        context
            .start_session(request("https://www.shop.example/dp/B00TEST123"))
            .unwrap();
        let page_one = PageContent {
            url: Url::parse(&format!("{}1", NAV_LISTING)).unwrap(),
            status: 200,
            body: listing_html(&[("Great", "Ana", "June 1, 2024")], true),
        };
        context.resume_if_pending(page_one).await.unwrap();

        let outcome = runner.resume().await.unwrap().unwrap();
        assert_eq!(
            outcome,
            RunOutcome::Finished {
                status: SessionStatus::Completed,
                collected: 2,
                note: None,
            }
        );
        assert_eq!(sink.records().len(), 2);
    }
}
