//! State module for tracking crawl progress
//!
//! # Components
//!
//! - `SessionStatus`: Lifecycle of a crawl session and its allowed transitions
//! - `CrawlMode`: Whether pages are reached by navigation or fetched in-process
//! - `CrawlSession`: The persisted state of one target's crawl

mod session;
mod session_status;

pub use session::CrawlSession;
pub use session_status::{CrawlMode, SessionStatus};
