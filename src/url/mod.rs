//! URL handling module for Review-Sweep
//!
//! This module maps URLs onto configured site profiles, derives target ids and page
//! numbers, and strips volatile query parameters so two loads of the same listing page
//! compare equal.

mod normalize;
mod site;

use crate::config::{Config, SiteConfig};
use crate::{UrlError, UrlResult};
use url::Url;

pub use normalize::{strip_volatile, VOLATILE_PARAMS};

/// A URL resolved to the site profile that handles it and the target it names
#[derive(Debug, Clone)]
pub struct SiteMatch<'a> {
    pub site: &'a SiteConfig,
    pub target_id: String,
}

/// Parses a user-supplied target URL
///
/// Only absolute http(s) URLs with a host are accepted.
pub fn parse_target_url(raw: &str) -> UrlResult<Url> {
    let raw = raw.trim();
    let url = Url::parse(raw).map_err(|e| UrlError::Parse(format!("{}: {}", raw, e)))?;

    match url.scheme() {
        "http" | "https" => {}
        other => return Err(UrlError::InvalidScheme(other.to_string())),
    }

    if url.host_str().map_or(true, str::is_empty) {
        return Err(UrlError::MissingDomain);
    }

    Ok(url)
}

/// Checks if a domain matches a wildcard pattern
///
/// "example.com" matches only itself; "*.example.com" matches the bare domain and any
/// subdomain.
///
/// ```
/// use review_sweep::url::matches_wildcard;
///
/// assert!(matches_wildcard("*.example.com", "example.com"));
/// assert!(matches_wildcard("*.example.com", "www.example.com"));
/// assert!(!matches_wildcard("*.example.com", "example.org"));
/// ```
pub fn matches_wildcard(pattern: &str, candidate: &str) -> bool {
    if let Some(base) = pattern.strip_prefix("*.") {
        candidate == base || candidate.ends_with(&format!(".{}", base))
    } else {
        candidate == pattern
    }
}

/// Finds the site profile responsible for a URL
///
/// When `source` names a profile it is used directly (if its domain still matches);
/// otherwise the first profile whose domain pattern matches the URL host wins.
pub fn find_site<'a>(
    url: &Url,
    config: &'a Config,
    source: Option<&str>,
) -> Option<&'a SiteConfig> {
    let host = url.host_str()?.to_lowercase();

    if let Some(name) = source.filter(|name| !name.is_empty()) {
        return config
            .site(name)
            .filter(|site| matches_wildcard(&site.domain, &host));
    }

    config
        .sites
        .iter()
        .find(|site| matches_wildcard(&site.domain, &host))
}

/// Resolves a URL to its site profile and target id
///
/// # Examples
///
/// ```no_run
/// use review_sweep::config::Config;
/// use review_sweep::url::resolve_site;
/// use url::Url;
///
/// # fn example(config: &Config) {
/// let url = Url::parse("https://www.shop.example/dp/B000TEST01").unwrap();
/// if let Some(found) = resolve_site(&url, config, None) {
///     println!("{} on {}", found.target_id, found.site.name);
/// }
/// # }
/// ```
pub fn resolve_site<'a>(
    url: &Url,
    config: &'a Config,
    source: Option<&str>,
) -> Option<SiteMatch<'a>> {
    let site = find_site(url, config, source)?;
    let target_id = site.target_id(url)?;
    Some(SiteMatch { site, target_id })
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::config::{CrawlerConfig, SelectorConfig, StorageConfig, UserAgentConfig};
    use crate::state::CrawlMode;

    pub(crate) fn create_test_site(name: &str, domain: &str, mode: CrawlMode) -> SiteConfig {
        SiteConfig {
            name: name.to_string(),
            domain: domain.to_string(),
            mode,
            target_pattern: r"/(?:dp|product-reviews)/([A-Z0-9]{10})".to_string(),
            listing_url: format!(
                "https://{}/product-reviews/{{target}}?pageNumber={{page}}",
                domain.trim_start_matches("*.")
            ),
            page_param: "pageNumber".to_string(),
            challenge_markers: vec!["Robot Check".to_string()],
            selectors: SelectorConfig {
                review: "div.review".to_string(),
                title: ".review-title".to_string(),
                body: ".review-body".to_string(),
                author: ".profile-name".to_string(),
                date: Some(".review-date".to_string()),
                rating: Some(".review-rating".to_string()),
                next_page: Some("li.next:not(.disabled) a".to_string()),
                total_count: Some(".total-count".to_string()),
                page_size: Some(10),
            },
        }
    }

    pub(crate) fn create_test_config() -> Config {
        Config {
            crawler: CrawlerConfig {
                min_delay_ms: 0,
                max_delay_ms: 0,
                request_timeout_secs: 5,
                max_pages: 20,
                rate_limit_retries: 1,
                backoff_base_ms: 1,
                backoff_max_ms: 2,
            },
            user_agent: UserAgentConfig {
                crawler_name: "TestCrawler".to_string(),
                crawler_version: "1.0".to_string(),
                contact_url: "https://example.com/about".to_string(),
                contact_email: "admin@example.com".to_string(),
            },
            storage: StorageConfig {
                database_path: ":memory:".to_string(),
            },
            sites: vec![
                create_test_site("shop-us", "*.shop.example", CrawlMode::Navigation),
                create_test_site("shop-de", "*.shop.example.de", CrawlMode::Fetch),
            ],
        }
    }

    #[test]
    fn test_parse_target_url() {
        assert!(parse_target_url(" https://www.shop.example/dp/B00TEST123 ").is_ok());
        assert!(matches!(
            parse_target_url("ftp://shop.example/dp/B00TEST123"),
            Err(UrlError::InvalidScheme(_))
        ));
        assert!(matches!(
            parse_target_url("not a url"),
            Err(UrlError::Parse(_))
        ));
    }

    #[test]
    fn test_wildcard_matching() {
        assert!(matches_wildcard("shop.example", "shop.example"));
        assert!(!matches_wildcard("shop.example", "www.shop.example"));
        assert!(matches_wildcard("*.shop.example", "deep.www.shop.example"));
        assert!(!matches_wildcard("*.shop.example", "myshop.example"));
    }

    #[test]
    fn test_resolve_by_domain() {
        let config = create_test_config();
        let url = Url::parse("https://www.shop.example.de/dp/B00TEST123?th=1").unwrap();

        let found = resolve_site(&url, &config, None).unwrap();
        assert_eq!(found.site.name, "shop-de");
        assert_eq!(found.target_id, "B00TEST123");
    }

    #[test]
    fn test_resolve_with_explicit_source() {
        let config = create_test_config();
        let url = Url::parse("https://www.shop.example/dp/B00TEST123").unwrap();

        assert!(resolve_site(&url, &config, Some("shop-us")).is_some());
        // A named profile must still own the domain
        assert!(resolve_site(&url, &config, Some("shop-de")).is_none());
        // Empty source falls back to domain matching
        assert!(resolve_site(&url, &config, Some("")).is_some());
    }

    #[test]
    fn test_resolve_unknown_domain() {
        let config = create_test_config();
        let url = Url::parse("https://other.example/dp/B00TEST123").unwrap();
        assert!(resolve_site(&url, &config, None).is_none());
    }

    #[test]
    fn test_resolve_without_target() {
        let config = create_test_config();
        let url = Url::parse("https://www.shop.example/help").unwrap();
        assert!(find_site(&url, &config, None).is_some());
        assert!(resolve_site(&url, &config, None).is_none());
    }
}
