//! URL helpers bound to a site profile

use crate::config::SiteConfig;
use crate::url::strip_volatile;
use regex::Regex;
use std::collections::HashMap;
use std::sync::{LazyLock, Mutex, PoisonError};
use url::Url;

/// Compiled target patterns, keyed by their source text
static TARGET_PATTERNS: LazyLock<Mutex<HashMap<String, Regex>>> =
    LazyLock::new(|| Mutex::new(HashMap::new()));

/// Returns the compiled form of `pattern`, compiling it on first use
fn target_regex(pattern: &str) -> Option<Regex> {
    let mut cache = TARGET_PATTERNS
        .lock()
        .unwrap_or_else(PoisonError::into_inner);
    if let Some(regex) = cache.get(pattern) {
        return Some(regex.clone());
    }

    let regex = Regex::new(pattern).ok()?;
    cache.insert(pattern.to_string(), regex.clone());
    Some(regex)
}

impl SiteConfig {
    /// Builds the listing URL for `page` of `target_id`
    pub fn listing_location(&self, target_id: &str, page: u32) -> Result<Url, url::ParseError> {
        let raw = self
            .listing_url
            .replace("{target}", target_id)
            .replace("{page}", &page.to_string());
        Url::parse(&raw)
    }

    /// Reads the 1-based page number from the page query parameter
    ///
    /// A listing URL without the parameter is the first page.
    pub fn page_number(&self, url: &Url) -> u32 {
        url.query_pairs()
            .find(|(name, _)| name == self.page_param.as_str())
            .and_then(|(_, value)| value.parse::<u32>().ok())
            .filter(|page| *page > 0)
            .unwrap_or(1)
    }

    /// Extracts the target id using the profile's target pattern
    pub fn target_id(&self, url: &Url) -> Option<String> {
        target_regex(&self.target_pattern)?
            .captures(url.as_str())
            .and_then(|captures| captures.get(1))
            .map(|found| found.as_str().to_string())
    }

    /// Returns true when `url` shows the review listing of `target_id`
    ///
    /// Any other location for the target (a product page, say) is the listing's parent.
    pub fn is_listing(&self, url: &Url, target_id: &str) -> bool {
        let Ok(first_page) = self.listing_location(target_id, 1) else {
            return false;
        };
        let extra = [self.page_param.as_str()];
        strip_volatile(url, &extra) == strip_volatile(&first_page, &extra)
    }
}

#[cfg(test)]
mod tests {
    use super::TARGET_PATTERNS;
    use crate::state::CrawlMode;
    use crate::url::tests::create_test_site;
    use url::Url;

    #[test]
    fn test_listing_location() {
        let site = create_test_site("shop", "*.shop.example", CrawlMode::Navigation);
        let url = site.listing_location("B00TEST123", 3).unwrap();
        assert_eq!(
            url.as_str(),
            "https://shop.example/product-reviews/B00TEST123?pageNumber=3"
        );
    }

    #[test]
    fn test_page_number() {
        let site = create_test_site("shop", "*.shop.example", CrawlMode::Navigation);

        let url =
            Url::parse("https://shop.example/product-reviews/B00TEST123?pageNumber=7").unwrap();
        assert_eq!(site.page_number(&url), 7);

        let url = Url::parse("https://shop.example/product-reviews/B00TEST123").unwrap();
        assert_eq!(site.page_number(&url), 1);

        let url =
            Url::parse("https://shop.example/product-reviews/B00TEST123?pageNumber=x").unwrap();
        assert_eq!(site.page_number(&url), 1);
    }

    #[test]
    fn test_target_id() {
        let site = create_test_site("shop", "*.shop.example", CrawlMode::Navigation);

        let url = Url::parse("https://www.shop.example/Some-Item/dp/B00TEST123/ref=sr_1").unwrap();
        assert_eq!(site.target_id(&url).as_deref(), Some("B00TEST123"));

        let url = Url::parse("https://www.shop.example/gp/help").unwrap();
        assert_eq!(site.target_id(&url), None);
    }

    #[test]
    fn test_target_pattern_compiled_once() {
        let mut site = create_test_site("shop", "*.shop.example", CrawlMode::Navigation);
        site.target_pattern = r"/cached/([A-Z0-9]{10})".to_string();
        let url = Url::parse("https://www.shop.example/cached/B00TEST123").unwrap();

        assert_eq!(site.target_id(&url).as_deref(), Some("B00TEST123"));
        assert_eq!(site.target_id(&url).as_deref(), Some("B00TEST123"));

        let cache = TARGET_PATTERNS.lock().unwrap();
        assert!(cache.contains_key(&site.target_pattern));
    }

    #[test]
    fn test_invalid_target_pattern_yields_no_id() {
        let mut site = create_test_site("shop", "*.shop.example", CrawlMode::Navigation);
        site.target_pattern = "(unclosed".to_string();
        let url = Url::parse("https://www.shop.example/dp/B00TEST123").unwrap();
        assert_eq!(site.target_id(&url), None);
    }

    #[test]
    fn test_is_listing() {
        let site = create_test_site("shop", "*.shop.example", CrawlMode::Navigation);

        let listing =
            Url::parse("https://www.shop.example/product-reviews/B00TEST123/?pageNumber=4&ref=x")
                .unwrap();
        assert!(site.is_listing(&listing, "B00TEST123"));
        assert!(!site.is_listing(&listing, "B00OTHER99"));

        let product = Url::parse("https://www.shop.example/dp/B00TEST123").unwrap();
        assert!(!site.is_listing(&product, "B00TEST123"));
    }
}
