//! Review extraction from listing page HTML

use crate::config::SelectorConfig;
use crate::records::Record;
use crate::ConfigError;
use scraper::{ElementRef, Html, Selector};

/// Reads records out of a page
///
/// Extraction is pure and never fails; a page it cannot make sense of yields no records.
pub trait RecordExtractor: Send + Sync {
    fn extract(&self, html: &str) -> Vec<Record>;
}

/// Extractor driven by a site's CSS selectors
#[derive(Debug)]
pub struct SelectorExtractor {
    review: Selector,
    title: Selector,
    body: Selector,
    author: Selector,
    date: Option<Selector>,
    rating: Option<Selector>,
}

fn compile(site: &str, selector: &str) -> Result<Selector, ConfigError> {
    Selector::parse(selector).map_err(|_| ConfigError::InvalidSelector {
        site: site.to_string(),
        selector: selector.to_string(),
    })
}

fn compile_optional(
    site: &str,
    selector: &Option<String>,
) -> Result<Option<Selector>, ConfigError> {
    selector.as_deref().map(|s| compile(site, s)).transpose()
}

impl SelectorExtractor {
    /// Compiles the selectors of the site named `site`
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidSelector` for the first selector that does not parse.
    pub fn new(site: &str, selectors: &SelectorConfig) -> Result<Self, ConfigError> {
        Ok(Self {
            review: compile(site, &selectors.review)?,
            title: compile(site, &selectors.title)?,
            body: compile(site, &selectors.body)?,
            author: compile(site, &selectors.author)?,
            date: compile_optional(site, &selectors.date)?,
            rating: compile_optional(site, &selectors.rating)?,
        })
    }

    fn read_review(&self, element: ElementRef<'_>) -> Option<Record> {
        let body = first_text(element, &self.body).unwrap_or_default();
        let title = first_text(element, &self.title).unwrap_or_default();
        if body.is_empty() && title.is_empty() {
            return None;
        }

        Some(Record {
            title,
            body,
            author: first_text(element, &self.author).unwrap_or_default(),
            date: self.date.as_ref().and_then(|s| first_text(element, s)),
            rating: self.rating.as_ref().and_then(|s| rating_text(element, s)),
        })
    }
}

impl RecordExtractor for SelectorExtractor {
    fn extract(&self, html: &str) -> Vec<Record> {
        let document = Html::parse_document(html);

        document
            .select(&self.review)
            .filter_map(|element| self.read_review(element))
            .collect()
    }
}

/// Whitespace-collapsed text of an element
pub(crate) fn element_text(element: ElementRef<'_>) -> String {
    element
        .text()
        .flat_map(str::split_whitespace)
        .collect::<Vec<_>>()
        .join(" ")
}

fn first_text(element: ElementRef<'_>, selector: &Selector) -> Option<String> {
    element
        .select(selector)
        .next()
        .map(element_text)
        .filter(|text| !text.is_empty())
}

/// Star ratings are often drawn with CSS and only described in an attribute
fn rating_text(element: ElementRef<'_>, selector: &Selector) -> Option<String> {
    let found = element.select(selector).next()?;
    let text = element_text(found);
    if !text.is_empty() {
        return Some(text);
    }

    ["aria-label", "title", "data-rating"]
        .iter()
        .find_map(|attr| found.value().attr(attr))
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::CrawlMode;
    use crate::url::tests::create_test_site;

    const PAGE: &str = r#"
        <html><body>
          <div class="review">
            <a class="review-title"> Works   great </a>
            <span class="profile-name">Ana</span>
            <span class="review-date">Reviewed on June 10, 2024</span>
            <i class="review-rating" aria-label="5.0 out of 5 stars"></i>
            <span class="review-body">Boils fast.
              Quiet too.</span>
          </div>
          <div class="review">
            <a class="review-title">Meh</a>
            <span class="profile-name">Bo</span>
            <span class="review-body">Lid broke.</span>
          </div>
          <div class="review"><span class="profile-name">Empty</span></div>
        </body></html>
    "#;

    fn extractor() -> SelectorExtractor {
        let site = create_test_site("shop", "shop.example", CrawlMode::Fetch);
        SelectorExtractor::new(&site.name, &site.selectors).unwrap()
    }

    #[test]
    fn test_extracts_reviews_in_page_order() {
        let records = extractor().extract(PAGE);

        assert_eq!(records.len(), 2);
        assert_eq!(records[0].title, "Works great");
        assert_eq!(records[0].body, "Boils fast. Quiet too.");
        assert_eq!(records[0].author, "Ana");
        assert_eq!(records[0].date.as_deref(), Some("Reviewed on June 10, 2024"));
        assert_eq!(records[0].rating.as_deref(), Some("5.0 out of 5 stars"));

        assert_eq!(records[1].title, "Meh");
        assert_eq!(records[1].date, None);
        assert_eq!(records[1].rating, None);
    }

    #[test]
    fn test_no_reviews_yields_empty() {
        assert!(extractor().extract("<html><body><p>Nothing</p></body></html>").is_empty());
        assert!(extractor().extract("").is_empty());
    }

    #[test]
    fn test_invalid_selector_rejected() {
        let mut site = create_test_site("shop", "shop.example", CrawlMode::Fetch);
        site.selectors.body = "p[[".to_string();

        let err = SelectorExtractor::new(&site.name, &site.selectors).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidSelector { .. }));
    }
}
