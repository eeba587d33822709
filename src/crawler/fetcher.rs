//! HTTP fetcher implementation
//!
//! This module handles all HTTP requests made by workers:
//! - Building the HTTP client with the configured user agent
//! - GET requests with retries for transient failures
//! - Classifying responses so the worker can mark a path visited or failed

use crate::config::UserAgentConfig;
use reqwest::{redirect::Policy, Client};
use std::time::Duration;

/// Attempts made for 5xx responses and timeouts
pub const DEFAULT_FETCH_ATTEMPTS: u32 = 3;

/// Pause between attempts
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_secs(2);

/// Result of a fetch operation
#[derive(Debug)]
pub enum FetchResult {
    /// Successfully fetched an HTML page
    Success {
        /// Final URL after redirects
        final_url: String,
        status_code: u16,
        content_type: String,
        body: String,
    },

    /// Page is not HTML; nothing to parse
    ContentMismatch { content_type: String },

    /// Non-success status after any retries
    HttpError { status_code: u16 },

    /// Connection refused, timeout, body read failure
    NetworkError { error: String },
}

impl FetchResult {
    /// Whether the page was fetched (HTML or not)
    pub fn is_reachable(&self) -> bool {
        matches!(self, Self::Success { .. } | Self::ContentMismatch { .. })
    }

    fn is_transient(&self) -> bool {
        match self {
            Self::HttpError { status_code } => *status_code >= 500,
            Self::NetworkError { error } => error == TIMEOUT,
            _ => false,
        }
    }
}

const TIMEOUT: &str = "Request timeout";

/// Builds an HTTP client with proper configuration
///
/// # Example
///
/// ```no_run
/// use baton_crawl::config::UserAgentConfig;
/// use baton_crawl::crawler::build_http_client;
///
/// let config = UserAgentConfig {
///     crawler_name: "BatonCrawl".to_string(),
///     crawler_version: "1.0".to_string(),
///     contact_url: "https://example.com/about".to_string(),
///     contact_email: "admin@example.com".to_string(),
/// };
///
/// let client = build_http_client(&config).unwrap();
/// ```
pub fn build_http_client(config: &UserAgentConfig) -> Result<Client, reqwest::Error> {
    // Format: CrawlerName/Version (+ContactURL; ContactEmail)
    let user_agent = format!(
        "{}/{} (+{}; {})",
        config.crawler_name, config.crawler_version, config.contact_url, config.contact_email
    );

    Client::builder()
        .user_agent(user_agent)
        .timeout(Duration::from_secs(30))
        .connect_timeout(Duration::from_secs(10))
        .redirect(Policy::limited(10))
        .gzip(true)
        .brotli(true)
        .build()
}

/// Fetches a URL, retrying 5xx responses and timeouts
///
/// | Condition | Action |
/// |-----------|--------|
/// | HTTP 2xx, text/html | Success |
/// | HTTP 2xx, other type | ContentMismatch |
/// | HTTP 4xx | Immediate HttpError |
/// | HTTP 5xx | Retry, then HttpError |
/// | Timeout | Retry, then NetworkError |
/// | Connection refused | Immediate NetworkError |
pub async fn fetch_url(client: &Client, url: &str) -> FetchResult {
    fetch_with_retries(client, url, DEFAULT_FETCH_ATTEMPTS, DEFAULT_RETRY_DELAY).await
}

/// [`fetch_url`] with explicit retry settings
pub async fn fetch_with_retries(
    client: &Client,
    url: &str,
    attempts: u32,
    delay: Duration,
) -> FetchResult {
    let attempts = attempts.max(1);
    let mut attempt = 1;

    loop {
        let result = fetch_once(client, url).await;
        if !result.is_transient() || attempt >= attempts {
            return result;
        }

        tracing::debug!(
            "Transient failure fetching {} (attempt {}/{}): {:?}",
            url,
            attempt,
            attempts,
            result
        );
        attempt += 1;
        tokio::time::sleep(delay).await;
    }
}

async fn fetch_once(client: &Client, url: &str) -> FetchResult {
    let response = match client.get(url).send().await {
        Ok(response) => response,
        Err(e) => {
            let error = if e.is_timeout() {
                TIMEOUT.to_string()
            } else if e.is_connect() {
                "Connection refused".to_string()
            } else {
                e.to_string()
            };
            return FetchResult::NetworkError { error };
        }
    };

    let status = response.status();
    let final_url = response.url().to_string();

    if !status.is_success() {
        return FetchResult::HttpError {
            status_code: status.as_u16(),
        };
    }

    let content_type = response
        .headers()
        .get("content-type")
        .and_then(|v| v.to_str().ok())
        .unwrap_or("")
        .to_string();

    if !content_type.contains("text/html") {
        return FetchResult::ContentMismatch { content_type };
    }

    match response.text().await {
        Ok(body) => FetchResult::Success {
            final_url,
            status_code: status.as_u16(),
            content_type,
            body,
        },
        Err(e) => FetchResult::NetworkError {
            error: e.to_string(),
        },
    }
}
