//! HTTP fetcher implementation
//!
//! This module handles all HTTP requests for the crawler, including:
//! - Building HTTP clients with proper user agent strings
//! - GET requests for listing pages
//! - Backoff and retry for rate-limited responses
//! - Error classification

use crate::config::{CrawlerConfig, UserAgentConfig};
use crate::crawler::throttle::RetryBackoff;
use crate::crawler::traversal::{PageContent, PageLoader};
use crate::SweepError;
use async_trait::async_trait;
use reqwest::{header::RETRY_AFTER, redirect::Policy, Client, StatusCode};
use std::time::Duration;
use url::Url;

/// Result of a single fetch attempt
#[derive(Debug)]
pub enum FetchResult {
    /// The server answered; the status may still be an error
    Success {
        /// Final URL after redirects
        final_url: String,
        /// HTTP status code
        status_code: u16,
        /// Page body content
        body: String,
    },

    /// HTTP 429
    RateLimited {
        /// Delay requested by the server, if any
        retry_after: Option<Duration>,
    },

    /// Network error (connection refused, timeout, etc.)
    NetworkError {
        /// Error description
        error: String,
    },
}

/// Builds an HTTP client with proper configuration
///
/// # Arguments
///
/// * `config` - The user agent configuration
/// * `timeout_secs` - Timeout for a whole request
///
/// # Returns
///
/// * `Ok(Client)` - Successfully built HTTP client
/// * `Err(reqwest::Error)` - Failed to build client
///
/// # Example
///
/// ```no_run
/// use review_sweep::config::UserAgentConfig;
/// use review_sweep::crawler::build_http_client;
///
/// let config = UserAgentConfig {
///     crawler_name: "ReviewSweep".to_string(),
///     crawler_version: "1.0".to_string(),
///     contact_url: "https://example.com/about".to_string(),
///     contact_email: "admin@example.com".to_string(),
/// };
///
/// let client = build_http_client(&config, 30).unwrap();
/// ```
pub fn build_http_client(
    config: &UserAgentConfig,
    timeout_secs: u64,
) -> Result<Client, reqwest::Error> {
    Client::builder()
        .user_agent(config.header_value())
        .timeout(Duration::from_secs(timeout_secs))
        .connect_timeout(Duration::from_secs(10))
        .redirect(Policy::limited(10))
        .gzip(true)
        .brotli(true)
        .build()
}

/// Fetches a URL once
///
/// | Condition | Result |
/// |-----------|--------|
/// | Any response except 429 | Success (status kept) |
/// | HTTP 429 | RateLimited |
/// | Timeout, refused connection, body read failure | NetworkError |
pub async fn fetch_url(client: &Client, url: &str) -> FetchResult {
    let response = match client.get(url).send().await {
        Ok(response) => response,
        Err(e) => {
            let error = if e.is_timeout() {
                "Request timeout".to_string()
            } else if e.is_connect() {
                format!("Connection failed: {}", e)
            } else {
                e.to_string()
            };
            return FetchResult::NetworkError { error };
        }
    };

    let status = response.status();
    if status == StatusCode::TOO_MANY_REQUESTS {
        let retry_after = response
            .headers()
            .get(RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.trim().parse::<u64>().ok())
            .map(Duration::from_secs);
        return FetchResult::RateLimited { retry_after };
    }

    let final_url = response.url().to_string();
    match response.text().await {
        Ok(body) => FetchResult::Success {
            final_url,
            status_code: status.as_u16(),
            body,
        },
        Err(e) => FetchResult::NetworkError {
            error: format!("Failed to read body: {}", e),
        },
    }
}

/// Page loader backed by reqwest
pub struct HttpLoader {
    client: Client,
    backoff: RetryBackoff,
    max_retries: u32,
    max_wait: Duration,
}

impl HttpLoader {
    pub fn new(client: Client, config: &CrawlerConfig) -> Self {
        Self {
            client,
            backoff: RetryBackoff::from_config(config),
            max_retries: config.rate_limit_retries,
            max_wait: Duration::from_millis(config.backoff_max_ms),
        }
    }

    /// Builds the client from configuration and wraps it
    pub fn from_config(
        user_agent: &UserAgentConfig,
        crawler: &CrawlerConfig,
    ) -> Result<Self, SweepError> {
        let client = build_http_client(user_agent, crawler.request_timeout_secs)?;
        Ok(Self::new(client, crawler))
    }
}

#[async_trait]
impl PageLoader for HttpLoader {
    async fn load(&self, url: &Url, page: u32) -> Result<PageContent, SweepError> {
        let mut attempt = 0;

        loop {
            match fetch_url(&self.client, url.as_str()).await {
                FetchResult::Success {
                    final_url,
                    status_code,
                    body,
                } => {
                    let url = Url::parse(&final_url).unwrap_or_else(|_| url.clone());
                    return Ok(PageContent {
                        url,
                        status: status_code,
                        body,
                    });
                }
                FetchResult::RateLimited { retry_after } => {
                    if attempt >= self.max_retries {
                        return Err(SweepError::Transport {
                            url: url.to_string(),
                            page,
                            message: format!(
                                "rate limited (HTTP 429) after {} retries",
                                self.max_retries
                            ),
                        });
                    }

                    let delay = retry_after
                        .map(|d| d.min(self.max_wait))
                        .unwrap_or_else(|| self.backoff.delay(attempt));
                    tracing::warn!(
                        "Rate limited on page {} ({}), retrying in {}ms",
                        page,
                        url,
                        delay.as_millis()
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                FetchResult::NetworkError { error } => {
                    return Err(SweepError::Transport {
                        url: url.to_string(),
                        page,
                        message: error,
                    });
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn create_test_config() -> UserAgentConfig {
        UserAgentConfig {
            crawler_name: "TestCrawler".to_string(),
            crawler_version: "1.0".to_string(),
            contact_url: "https://example.com/about".to_string(),
            contact_email: "admin@example.com".to_string(),
        }
    }

    #[test]
    fn test_build_http_client() {
        let config = create_test_config();
        assert!(build_http_client(&config, 5).is_ok());
    }

    #[test]
    fn test_user_agent_format() {
        assert_eq!(
            create_test_config().header_value(),
            "TestCrawler/1.0 (+https://example.com/about; admin@example.com)"
        );
    }

    #[tokio::test]
    async fn test_network_error_is_transport() {
        let crawler = CrawlerConfig {
            min_delay_ms: 0,
            max_delay_ms: 0,
            request_timeout_secs: 1,
            max_pages: 1,
            rate_limit_retries: 0,
            backoff_base_ms: 1,
            backoff_max_ms: 1,
        };
        let loader = HttpLoader::from_config(&create_test_config(), &crawler).unwrap();
        // Port 9 (discard) is closed on test machines
        let url = Url::parse("http://127.0.0.1:9/reviews?page=4").unwrap();

        let err = loader.load(&url, 4).await.unwrap_err();
        assert!(matches!(err, SweepError::Transport { page: 4, .. }));
        assert!(err.is_fatal());
    }
}
