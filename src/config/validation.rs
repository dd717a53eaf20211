use crate::config::types::{Config, CrawlerConfig, SiteConfig, StorageConfig, UserAgentConfig};
use crate::ConfigError;
use regex::Regex;
use scraper::Selector;
use std::collections::HashSet;
use url::Url;

/// Validates the entire configuration
pub fn validate(config: &Config) -> Result<(), ConfigError> {
    validate_crawler_config(&config.crawler)?;
    validate_user_agent_config(&config.user_agent)?;
    validate_storage_config(&config.storage)?;
    validate_sites(&config.sites)?;
    Ok(())
}

/// Validates crawler pacing configuration
fn validate_crawler_config(config: &CrawlerConfig) -> Result<(), ConfigError> {
    if config.max_delay_ms < config.min_delay_ms {
        return Err(ConfigError::Validation(format!(
            "max_delay_ms ({}) must be >= min_delay_ms ({})",
            config.max_delay_ms, config.min_delay_ms
        )));
    }

    if config.request_timeout_secs == 0 {
        return Err(ConfigError::Validation(
            "request_timeout_secs must be >= 1".to_string(),
        ));
    }

    if config.max_pages < 1 {
        return Err(ConfigError::Validation(format!(
            "max_pages must be >= 1, got {}",
            config.max_pages
        )));
    }

    if config.backoff_max_ms < config.backoff_base_ms {
        return Err(ConfigError::Validation(format!(
            "backoff_max_ms ({}) must be >= backoff_base_ms ({})",
            config.backoff_max_ms, config.backoff_base_ms
        )));
    }

    Ok(())
}

/// Validates user agent configuration
fn validate_user_agent_config(config: &UserAgentConfig) -> Result<(), ConfigError> {
    // Validate crawler name: non-empty, alphanumeric + hyphens only
    if config.crawler_name.is_empty() {
        return Err(ConfigError::Validation(
            "crawler_name cannot be empty".to_string(),
        ));
    }

    if !config
        .crawler_name
        .chars()
        .all(|c| c.is_alphanumeric() || c == '-')
    {
        return Err(ConfigError::Validation(format!(
            "crawler_name must contain only alphanumeric characters and hyphens, got '{}'",
            config.crawler_name
        )));
    }

    Url::parse(&config.contact_url)
        .map_err(|e| ConfigError::InvalidUrl(format!("Invalid contact_url: {}", e)))?;

    validate_email(&config.contact_email)?;

    Ok(())
}

fn validate_storage_config(config: &StorageConfig) -> Result<(), ConfigError> {
    if config.database_path.is_empty() {
        return Err(ConfigError::Validation(
            "database_path cannot be empty".to_string(),
        ));
    }

    Ok(())
}

/// Validates every site profile and rejects duplicate names
fn validate_sites(sites: &[SiteConfig]) -> Result<(), ConfigError> {
    let mut names = HashSet::new();

    for site in sites {
        if site.name.is_empty() {
            return Err(ConfigError::Validation(
                "site name cannot be empty".to_string(),
            ));
        }

        if !names.insert(site.name.as_str()) {
            return Err(ConfigError::Validation(format!(
                "Duplicate site name '{}'",
                site.name
            )));
        }

        validate_site(site)?;
    }

    Ok(())
}

/// Validates a single site profile
fn validate_site(site: &SiteConfig) -> Result<(), ConfigError> {
    validate_domain_pattern(&site.domain)?;

    let pattern = Regex::new(&site.target_pattern).map_err(|e| {
        ConfigError::Validation(format!(
            "Site '{}' has an invalid target-pattern: {}",
            site.name, e
        ))
    })?;

    if pattern.captures_len() < 2 {
        return Err(ConfigError::Validation(format!(
            "Site '{}' target-pattern needs a capture group for the target id",
            site.name
        )));
    }

    for placeholder in ["{target}", "{page}"] {
        if !site.listing_url.contains(placeholder) {
            return Err(ConfigError::Validation(format!(
                "Site '{}' listing-url must contain {}",
                site.name, placeholder
            )));
        }
    }

    let sample = site
        .listing_url
        .replace("{target}", "TARGET")
        .replace("{page}", "2");
    let sample = Url::parse(&sample).map_err(|e| {
        ConfigError::InvalidUrl(format!(
            "Site '{}' listing-url is not a valid URL: {}",
            site.name, e
        ))
    })?;

    let carries_page = sample
        .query_pairs()
        .any(|(key, value)| key == site.page_param.as_str() && value == "2");
    if !carries_page {
        return Err(ConfigError::Validation(format!(
            "Site '{}' listing-url must pass {{page}} in the '{}' query parameter",
            site.name, site.page_param
        )));
    }

    let selectors = &site.selectors;
    let required = [
        &selectors.review,
        &selectors.title,
        &selectors.body,
        &selectors.author,
    ];
    let optional = [
        &selectors.date,
        &selectors.rating,
        &selectors.next_page,
        &selectors.total_count,
    ];

    for selector in required
        .into_iter()
        .chain(optional.into_iter().flatten())
    {
        if Selector::parse(selector).is_err() {
            return Err(ConfigError::InvalidSelector {
                site: site.name.clone(),
                selector: selector.clone(),
            });
        }
    }

    if selectors.page_size == Some(0) {
        return Err(ConfigError::Validation(format!(
            "Site '{}' page-size must be >= 1",
            site.name
        )));
    }

    Ok(())
}

/// Validates a domain pattern (supports wildcards)
fn validate_domain_pattern(pattern: &str) -> Result<(), ConfigError> {
    if pattern.is_empty() {
        return Err(ConfigError::InvalidPattern(
            "Domain pattern cannot be empty".to_string(),
        ));
    }

    match pattern.strip_prefix("*.") {
        Some(domain) => validate_domain_string(domain),
        None => validate_domain_string(pattern),
    }
}

/// Validates a domain string (without wildcard prefix)
fn validate_domain_string(domain: &str) -> Result<(), ConfigError> {
    if domain.is_empty() {
        return Err(ConfigError::InvalidPattern(
            "Domain cannot be empty".to_string(),
        ));
    }

    if !domain
        .chars()
        .all(|c| c.is_alphanumeric() || c == '.' || c == '-')
    {
        return Err(ConfigError::InvalidPattern(format!(
            "Domain '{}' contains invalid characters",
            domain
        )));
    }

    if domain.starts_with('.')
        || domain.ends_with('.')
        || domain.starts_with('-')
        || domain.ends_with('-')
    {
        return Err(ConfigError::InvalidPattern(format!(
            "Domain '{}' cannot start or end with '.' or '-'",
            domain
        )));
    }

    if domain.contains("..") {
        return Err(ConfigError::InvalidPattern(format!(
            "Domain '{}' cannot contain consecutive dots",
            domain
        )));
    }

    Ok(())
}

/// Basic email validation
fn validate_email(email: &str) -> Result<(), ConfigError> {
    if email.is_empty() {
        return Err(ConfigError::Validation(
            "contact_email cannot be empty".to_string(),
        ));
    }

    let parts: Vec<&str> = email.split('@').collect();
    if parts.len() != 2 || parts[0].is_empty() || parts[1].is_empty() {
        return Err(ConfigError::Validation(format!(
            "Invalid email format: '{}'",
            email
        )));
    }

    if !parts[1].contains('.') {
        return Err(ConfigError::Validation(format!(
            "Invalid email domain: '{}'",
            email
        )));
    }

    Ok(())
}
