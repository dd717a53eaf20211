//! Page traversal strategies
//!
//! A listing is walked either by sending the execution context to each page in turn
//! ([`NavigationStrategy`]) or by retrieving pages in-process ([`FetchStrategy`]). Both read
//! a page the same way through [`ListingReader`].

use crate::config::SiteConfig;
use crate::crawler::challenge::ChallengeDetector;
use crate::records::{element_text, Record, RecordExtractor, SelectorExtractor};
use crate::state::CrawlMode;
use crate::{ConfigError, SweepError};
use async_trait::async_trait;
use scraper::{Html, Selector};
use std::sync::Arc;
use url::Url;

/// A loaded page as handed to the controller
#[derive(Debug, Clone)]
pub struct PageContent {
    /// Location the content was served from
    pub url: Url,
    pub status: u16,
    pub body: String,
}

/// Transport that turns a location into page content
///
/// Implementations return content for any HTTP status so verification pages can be
/// inspected; only a failure to get a response at all is an error.
#[async_trait]
pub trait PageLoader: Send + Sync {
    async fn load(&self, url: &Url, page: u32) -> Result<PageContent, SweepError>;
}

/// What a page says about the pages after it
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Pagination {
    pub has_next: bool,
    /// Estimated from the review count when the page shows one
    pub total_pages: Option<u32>,
}

/// The records and pagination markers read from one listing page
#[derive(Debug, Clone)]
pub struct PageSnapshot {
    pub page: u32,
    pub url: Url,
    pub records: Vec<Record>,
    pub pagination: Pagination,
}

/// Reads listing pages of one site
pub struct ListingReader {
    extractor: Arc<dyn RecordExtractor>,
    next_page: Option<Selector>,
    total_count: Option<Selector>,
    page_size: Option<u32>,
    challenge: ChallengeDetector,
}

impl ListingReader {
    /// Builds a reader using the site's own CSS selectors
    pub fn for_site(site: &SiteConfig) -> Result<Self, ConfigError> {
        let extractor = SelectorExtractor::new(&site.name, &site.selectors)?;
        Self::new(site, Arc::new(extractor))
    }

    /// Builds a reader around a custom extractor
    pub fn new(
        site: &SiteConfig,
        extractor: Arc<dyn RecordExtractor>,
    ) -> Result<Self, ConfigError> {
        let compile = |selector: &Option<String>| -> Result<Option<Selector>, ConfigError> {
            selector
                .as_deref()
                .map(|s| {
                    Selector::parse(s).map_err(|_| ConfigError::InvalidSelector {
                        site: site.name.clone(),
                        selector: s.to_string(),
                    })
                })
                .transpose()
        };

        Ok(Self {
            extractor,
            next_page: compile(&site.selectors.next_page)?,
            total_count: compile(&site.selectors.total_count)?,
            page_size: site.selectors.page_size,
            challenge: ChallengeDetector::for_site(site)?,
        })
    }

    /// Turns loaded content into a snapshot of page `page`
    ///
    /// # Errors
    ///
    /// * `ChallengeDetected` - the content is a verification page
    /// * `Transport` - the server answered with a non-success status
    pub fn read(&self, content: &PageContent, page: u32) -> Result<PageSnapshot, SweepError> {
        let document = Html::parse_document(&content.body);
        self.reject_challenge(&document, content, page)?;

        if !(200..300).contains(&content.status) {
            return Err(SweepError::Transport {
                url: content.url.to_string(),
                page,
                message: format!("HTTP {}", content.status),
            });
        }

        Ok(PageSnapshot {
            page,
            url: content.url.clone(),
            records: self.extractor.extract(&content.body),
            pagination: self.pagination(&document, page),
        })
    }

    /// Fails with `ChallengeDetected` if `content` is a verification page
    ///
    /// `page` is the page the content was expected to show.
    pub fn check_challenge(&self, content: &PageContent, page: u32) -> Result<(), SweepError> {
        self.reject_challenge(&Html::parse_document(&content.body), content, page)
    }

    fn reject_challenge(
        &self,
        document: &Html,
        content: &PageContent,
        page: u32,
    ) -> Result<(), SweepError> {
        if self.challenge.is_challenge(document) {
            return Err(SweepError::ChallengeDetected {
                url: content.url.to_string(),
                page,
            });
        }
        Ok(())
    }

    fn pagination(&self, document: &Html, page: u32) -> Pagination {
        let total_pages = match (&self.total_count, self.page_size) {
            (Some(selector), Some(size)) if size > 0 => document
                .select(selector)
                .next()
                .and_then(|element| parse_count(&element_text(element)))
                .map(|count| count.div_ceil(u64::from(size)).max(1))
                .map(|pages| u32::try_from(pages).unwrap_or(u32::MAX)),
            _ => None,
        };

        let has_next = match &self.next_page {
            Some(selector) => document.select(selector).next().is_some(),
            None => total_pages.is_some_and(|total| page < total),
        };

        Pagination {
            has_next,
            total_pages,
        }
    }
}

/// Reads the first number in `text`, ignoring thousands separators
///
/// "1,234 global ratings" and "1.234 Bewertungen" both give 1234.
fn parse_count(text: &str) -> Option<u64> {
    let start = text.find(|c: char| c.is_ascii_digit())?;
    let digits: String = text[start..]
        .chars()
        .take_while(|c| c.is_ascii_digit() || matches!(c, ',' | '.' | '\u{a0}' | '\u{202f}'))
        .filter(char::is_ascii_digit)
        .collect();
    digits.parse().ok()
}

/// How the pages of a listing are obtained
#[async_trait]
pub trait TraversalStrategy: Send + Sync {
    fn mode(&self) -> CrawlMode;

    /// Reads content that was loaded for page `page`
    fn read(&self, content: &PageContent, page: u32) -> Result<PageSnapshot, SweepError>;

    /// Fails with `ChallengeDetected` if `content` is a verification page
    fn check_challenge(&self, content: &PageContent, page: u32) -> Result<(), SweepError>;

    /// Returns true if the listing continues after `snapshot`
    fn has_next(&self, snapshot: &PageSnapshot) -> bool {
        snapshot.pagination.has_next
    }

    /// Location of listing page `page` for `target_id`
    fn next_location(&self, target_id: &str, page: u32) -> Result<Url, SweepError>;

    /// Retrieves and reads page `page` in-process
    async fn fetch_next(&self, page: u32, target_id: &str) -> Result<PageSnapshot, SweepError>;
}

/// Pages are reached by moving the execution context, which destroys it
pub struct NavigationStrategy {
    site: SiteConfig,
    reader: ListingReader,
}

impl NavigationStrategy {
    pub fn new(site: SiteConfig, reader: ListingReader) -> Self {
        Self { site, reader }
    }
}

#[async_trait]
impl TraversalStrategy for NavigationStrategy {
    fn mode(&self) -> CrawlMode {
        CrawlMode::Navigation
    }

    fn read(&self, content: &PageContent, page: u32) -> Result<PageSnapshot, SweepError> {
        self.reader.read(content, page)
    }

    fn check_challenge(&self, content: &PageContent, page: u32) -> Result<(), SweepError> {
        self.reader.check_challenge(content, page)
    }

    fn next_location(&self, target_id: &str, page: u32) -> Result<Url, SweepError> {
        Ok(self.site.listing_location(target_id, page)?)
    }

    async fn fetch_next(&self, page: u32, _target_id: &str) -> Result<PageSnapshot, SweepError> {
        Err(SweepError::Unsupported(format!(
            "site '{}' reaches page {} by navigation, not by fetching",
            self.site.name, page
        )))
    }
}

/// Pages are retrieved in-process through a [`PageLoader`]
pub struct FetchStrategy {
    site: SiteConfig,
    reader: ListingReader,
    loader: Arc<dyn PageLoader>,
}

impl FetchStrategy {
    pub fn new(site: SiteConfig, reader: ListingReader, loader: Arc<dyn PageLoader>) -> Self {
        Self {
            site,
            reader,
            loader,
        }
    }
}

#[async_trait]
impl TraversalStrategy for FetchStrategy {
    fn mode(&self) -> CrawlMode {
        CrawlMode::Fetch
    }

    fn read(&self, content: &PageContent, page: u32) -> Result<PageSnapshot, SweepError> {
        self.reader.read(content, page)
    }

    fn check_challenge(&self, content: &PageContent, page: u32) -> Result<(), SweepError> {
        self.reader.check_challenge(content, page)
    }

    fn next_location(&self, target_id: &str, page: u32) -> Result<Url, SweepError> {
        Ok(self.site.listing_location(target_id, page)?)
    }

    async fn fetch_next(&self, page: u32, target_id: &str) -> Result<PageSnapshot, SweepError> {
        let location = self.next_location(target_id, page)?;
        tracing::debug!("Fetching page {} of {} from {}", page, target_id, location);
        let content = self.loader.load(&location, page).await?;
        self.reader.read(&content, page)
    }
}

/// Builds the strategy matching the site's crawl mode
pub fn strategy_for(
    site: &SiteConfig,
    loader: Arc<dyn PageLoader>,
) -> Result<Box<dyn TraversalStrategy>, ConfigError> {
    let reader = ListingReader::for_site(site)?;
    Ok(match site.mode {
        CrawlMode::Navigation => Box::new(NavigationStrategy::new(site.clone(), reader)),
        CrawlMode::Fetch => Box::new(FetchStrategy::new(site.clone(), reader, loader)),
    })
}
