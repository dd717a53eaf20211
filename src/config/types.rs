use crate::state::CrawlMode;
use serde::Deserialize;

/// Main configuration structure for Review-Sweep
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub crawler: CrawlerConfig,
    #[serde(rename = "user-agent")]
    pub user_agent: UserAgentConfig,
    pub storage: StorageConfig,
    #[serde(default, rename = "site")]
    pub sites: Vec<SiteConfig>,
}

impl Config {
    /// Looks up a site profile by name
    pub fn site(&self, name: &str) -> Option<&SiteConfig> {
        self.sites.iter().find(|site| site.name == name)
    }
}

/// Crawler pacing and limits
#[derive(Debug, Clone, Deserialize)]
pub struct CrawlerConfig {
    /// Lower bound of the randomized delay between pages (milliseconds)
    #[serde(rename = "min-delay-ms")]
    pub min_delay_ms: u64,

    /// Upper bound of the randomized delay between pages (milliseconds)
    #[serde(rename = "max-delay-ms")]
    pub max_delay_ms: u64,

    /// Timeout for a single page load
    #[serde(rename = "request-timeout-secs", default = "default_request_timeout")]
    pub request_timeout_secs: u64,

    /// Hard cap on pages per session
    #[serde(rename = "max-pages", default = "default_max_pages")]
    pub max_pages: u32,

    /// How many times an HTTP 429 is retried before the page counts as a transport failure
    #[serde(rename = "rate-limit-retries", default = "default_rate_limit_retries")]
    pub rate_limit_retries: u32,

    #[serde(rename = "backoff-base-ms", default = "default_backoff_base")]
    pub backoff_base_ms: u64,

    #[serde(rename = "backoff-max-ms", default = "default_backoff_max")]
    pub backoff_max_ms: u64,
}

fn default_request_timeout() -> u64 {
    30
}

fn default_max_pages() -> u32 {
    500
}

fn default_rate_limit_retries() -> u32 {
    3
}

fn default_backoff_base() -> u64 {
    5_000
}

fn default_backoff_max() -> u64 {
    60_000
}

/// User agent identification configuration
#[derive(Debug, Clone, Deserialize)]
pub struct UserAgentConfig {
    /// Name of the crawler
    #[serde(rename = "crawler-name")]
    pub crawler_name: String,

    /// Version of the crawler
    #[serde(rename = "crawler-version")]
    pub crawler_version: String,

    /// URL with information about the crawler
    #[serde(rename = "contact-url")]
    pub contact_url: String,

    /// Email address for crawler-related contact
    #[serde(rename = "contact-email")]
    pub contact_email: String,
}

impl UserAgentConfig {
    /// Formats the User-Agent header value
    pub fn header_value(&self) -> String {
        format!(
            "{}/{} (+{}; {})",
            self.crawler_name, self.crawler_version, self.contact_url, self.contact_email
        )
    }
}

/// Where session state, the queue and collected reviews are kept
#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    /// Path to the SQLite database file
    #[serde(rename = "database-path")]
    pub database_path: String,
}

/// A site (or regional variant of a site) that reviews can be collected from
#[derive(Debug, Clone, Deserialize)]
pub struct SiteConfig {
    /// Unique profile name, stored as the session `source`
    pub name: String,

    /// Domain pattern (e.g., "example.com" or "*.example.com")
    pub domain: String,

    /// How successive listing pages are reached
    pub mode: CrawlMode,

    /// Regex with one capture group that yields the target id from a URL
    #[serde(rename = "target-pattern")]
    pub target_pattern: String,

    /// Listing page template containing `{target}` and `{page}`
    #[serde(rename = "listing-url")]
    pub listing_url: String,

    /// Query parameter carrying the 1-based page number
    #[serde(rename = "page-param", default = "default_page_param")]
    pub page_param: String,

    /// Extra case-insensitive text markers that identify a verification page
    ///
    /// Matched against the page title, form attributes and text outside review containers.
    #[serde(rename = "challenge-markers", default)]
    pub challenge_markers: Vec<String>,

    pub selectors: SelectorConfig,
}

fn default_page_param() -> String {
    "page".to_string()
}

/// CSS selectors used to read reviews and pagination markers from a listing page
#[derive(Debug, Clone, Deserialize)]
pub struct SelectorConfig {
    /// One element per review
    pub review: String,

    pub title: String,

    pub body: String,

    pub author: String,

    #[serde(default)]
    pub date: Option<String>,

    #[serde(default)]
    pub rating: Option<String>,

    /// Matches only while a further page exists
    #[serde(rename = "next-page", default)]
    pub next_page: Option<String>,

    /// Element whose text contains the total review count
    #[serde(rename = "total-count", default)]
    pub total_count: Option<String>,

    /// Reviews per listing page, used with `total-count` to estimate the page total
    #[serde(rename = "page-size", default)]
    pub page_size: Option<u32>,
}
