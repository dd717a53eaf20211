//! Crawler module: the session state machine and everything that feeds it
//!
//! This module contains the core crawling logic, including:
//! - HTTP fetching with rate-limit retries
//! - Reading listing pages and deciding how to reach the next one
//! - Pacing and challenge detection
//! - The session controller, its driver, and the target queue

mod challenge;
mod controller;
mod fetcher;
mod queue;
mod runner;
mod throttle;
mod traversal;

pub use challenge::{ChallengeDetector, BUILTIN_CHALLENGE_MARKERS};
pub use controller::{NextStep, ResumeOutcome, SessionController, StartOutcome, StartRequest};
pub use fetcher::{build_http_client, fetch_url, FetchResult, HttpLoader};
pub use queue::{BatchOptions, BatchOutcome, BatchReport, QueueEntry, QueueManager, TargetReport};
pub use runner::{RunOutcome, SessionRunner};
pub use throttle::{RetryBackoff, Throttle};
pub use traversal::{
    strategy_for, FetchStrategy, ListingReader, NavigationStrategy, PageContent, PageLoader,
    PageSnapshot, Pagination, TraversalStrategy,
};
