//! Review-Sweep: a resumable review crawler
//!
//! This crate collects reviews from paginated listing pages. Crawl progress lives in a
//! persisted session so a crawl survives the destruction of the context that drove it,
//! never emits the same review twice, and can re-sync incrementally against a watermark.

pub mod config;
pub mod crawler;
pub mod output;
pub mod records;
pub mod state;
pub mod storage;
pub mod url;

use thiserror::Error;

/// Main error type for Review-Sweep operations
#[derive(Debug, Error)]
pub enum SweepError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Transport error on page {page} ({url}): {message}")]
    Transport {
        url: String,
        page: u32,
        message: String,
    },

    #[error(
        "Verification challenge detected on page {page} ({url}); \
         open the site in a browser, solve the check, then resume"
    )]
    ChallengeDetected { url: String, page: u32 },

    #[error("No records found on page {page}")]
    ExtractionEmpty { page: u32 },

    #[error("Resume ignored: location page {page} is not ahead of the last processed page")]
    StaleResume { page: u32 },

    #[error("Already queued: {url}")]
    DuplicateEnqueue { url: String },

    #[error("Invalid state transition: {from:?} -> {to:?}")]
    InvalidTransition {
        from: state::SessionStatus,
        to: state::SessionStatus,
    },

    #[error("No site profile matches {0}")]
    UnknownSite(String),

    #[error("Could not derive a target id from {0}")]
    UnknownTarget(String),

    #[error("Operation not supported: {0}")]
    Unsupported(String),

    #[error("Storage error: {0}")]
    Storage(#[from] storage::StorageError),

    #[error("Sink error: {0}")]
    Sink(#[from] output::SinkError),

    #[error("Session blob error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("URL error: {0}")]
    UrlError(#[from] UrlError),

    #[error("URL parse error: {0}")]
    UrlParse(#[from] ::url::ParseError),

    #[error("HTTP client error: {0}")]
    Reqwest(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl SweepError {
    /// Returns true for errors that end a session as `Failed`
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::Transport { .. } | Self::ChallengeDetected { .. } | Self::Reqwest(_)
        )
    }
}

/// Configuration-specific errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Invalid URL in config: {0}")]
    InvalidUrl(String),

    #[error("Invalid domain pattern: {0}")]
    InvalidPattern(String),

    #[error("Invalid selector for site '{site}': {selector}")]
    InvalidSelector { site: String, selector: String },
}

/// URL-specific errors
#[derive(Debug, Error)]
pub enum UrlError {
    #[error("Failed to parse URL: {0}")]
    Parse(String),

    #[error("Invalid URL scheme: {0}")]
    InvalidScheme(String),

    #[error("Missing domain in URL")]
    MissingDomain,
}

/// Result type alias for Review-Sweep operations
pub type Result<T> = std::result::Result<T, SweepError>;

/// Result type alias for configuration operations
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

/// Result type alias for URL operations
pub type UrlResult<T> = std::result::Result<T, UrlError>;

// Re-export commonly used types
pub use config::Config;
pub use records::{CollectedRecord, Record};
pub use state::{CrawlMode, CrawlSession, SessionStatus};
pub use url::{parse_target_url, resolve_site, strip_volatile, SiteMatch};
