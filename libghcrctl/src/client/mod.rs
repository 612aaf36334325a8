//! HTTP plumbing shared by the control-plane and registry clients.
//!
//! Both planes run on one `reqwest::Client` so they share a keep-alive pool.
//! This module builds it and holds the helpers both clients use: URL
//! normalization, error translation, `Link` pagination and rate-limit delays.

use crate::error::{GhcrError, Result};
use chrono::{DateTime, Utc};
use reqwest::Client as ReqwestClient;
use reqwest::Url;
use reqwest::header::HeaderMap;
use std::time::Duration;


/// Upper bound on any rate-limit wait.
pub const MAX_RATE_LIMIT_DELAY: Duration = Duration::from_secs(60);

/// Wait used when a rate-limited response carries no hint.
pub const DEFAULT_RATE_LIMIT_DELAY: Duration = Duration::from_secs(1);

/// Configuration for the shared HTTP client.
///
/// # Examples
///
/// ```
/// use libghcrctl::client::ClientConfig;
///
/// let config = ClientConfig::new()
///     .with_timeout(60)
///     .with_max_idle_per_host(20);
/// assert_eq!(config.timeout_seconds, 60);
/// ```
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Request timeout in seconds (default: 30)
    pub timeout_seconds: u64,
    /// Maximum idle connections per host (default: 10)
    pub max_idle_per_host: usize,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            timeout_seconds: 30,
            max_idle_per_host: 10,
        }
    }
}

impl ClientConfig {
    /// Creates a new configuration with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the request timeout in seconds.
    pub fn with_timeout(mut self, seconds: u64) -> Self {
        self.timeout_seconds = seconds;
        self
    }

    /// Sets the maximum idle connections per host.
    pub fn with_max_idle_per_host(mut self, max: usize) -> Self {
        self.max_idle_per_host = max;
        self
    }

    /// Builds the reqwest client.
    pub fn build(&self) -> Result<ReqwestClient> {
        ReqwestClient::builder()
            .timeout(Duration::from_secs(self.timeout_seconds))
            .pool_max_idle_per_host(self.max_idle_per_host)
            .user_agent(user_agent())
            .build()
            .map_err(|e| GhcrError::transient_with_source("Failed to create HTTP client", e))
    }
}

/// `ghcrctl/<version>`.
pub fn user_agent() -> String {
    format!("ghcrctl/{}", env!("CARGO_PKG_VERSION"))
}

/// Normalizes a base URL by ensuring it has a scheme and removing trailing slashes.
///
/// Scheme-less hosts default to `https://`.
pub fn normalize_url(url: &str) -> Result<String> {
    let url = url.trim();

    if url.is_empty() {
        return Err(GhcrError::validation("URL cannot be empty"));
    }

    let url = if !url.starts_with("http://") && !url.starts_with("https://") {
        format!("https://{}", url)
    } else {
        url.to_string()
    };

    Ok(url.trim_end_matches('/').to_string())
}

/// Translates a reqwest error into a transient error naming the endpoint.
pub fn translate_reqwest_error(error: reqwest::Error, url: &str) -> GhcrError {
    if error.is_timeout() {
        GhcrError::transient_with_source(format!("Request to {} timed out", url), error)
    } else if error.is_connect() {
        GhcrError::transient_with_source(format!("Failed to connect to {}", url), error)
    } else if error.is_request() {
        GhcrError::transient_with_source(format!("Failed to send request to {}", url), error)
    } else {
        GhcrError::transient_with_source(
            format!("Network error communicating with {}", url),
            error,
        )
    }
}

/// Extracts the `rel="next"` target from a `Link` header.
///
/// The target is returned as written: absolute URL or path.
pub fn extract_next_link(headers: &HeaderMap) -> Option<String> {
    let link_str = headers.get(reqwest::header::LINK)?.to_str().ok()?;

    for link_part in link_str.split(',') {
        let link_part = link_part.trim();
        if (link_part.contains("rel=\"next\"") || link_part.contains("rel='next'"))
            && let Some(start) = link_part.find('<')
            && let Some(end) = link_part.find('>')
            && start < end
        {
            return Some(link_part[start + 1..end].to_string());
        }
    }

    None
}

/// Joins a pagination target onto `base` when it is a path.
///
/// A target starting with `/` replaces the whole path of `base`; any other
/// relative target is appended to it.
pub fn resolve_link(base: &str, target: &str) -> String {
    if target.starts_with("http://") || target.starts_with("https://") {
        target.to_string()
    } else if target.starts_with('/') {
        match Url::parse(base).and_then(|url| url.join(target)) {
            Ok(joined) => joined.to_string(),
            Err(_) => format!("{}{}", base, target),
        }
    } else {
        format!("{}/{}", base.trim_end_matches('/'), target)
    }
}

/// Seconds named by a `Retry-After` header (delta-seconds or HTTP-date).
pub fn retry_after_seconds(headers: &HeaderMap, now: DateTime<Utc>) -> Option<u64> {
    let value = headers
        .get(reqwest::header::RETRY_AFTER)?
        .to_str()
        .ok()?
        .trim();

    if let Ok(seconds) = value.parse::<u64>() {
        return Some(seconds);
    }

    let date = DateTime::parse_from_rfc2822(value).ok()?;
    let delta = date.with_timezone(&Utc).signed_duration_since(now);
    Some(delta.num_seconds().max(0) as u64)
}

/// Delay before retrying a rate-limited request.
///
/// `Retry-After` wins, then `X-RateLimit-Reset` (epoch seconds), then
/// [`DEFAULT_RATE_LIMIT_DELAY`]. Always capped at [`MAX_RATE_LIMIT_DELAY`].
pub fn rate_limit_delay(headers: &HeaderMap, now: DateTime<Utc>) -> Duration {
    let delay = if let Some(seconds) = retry_after_seconds(headers, now) {
        Duration::from_secs(seconds)
    } else if let Some(reset) = headers
        .get("x-ratelimit-reset")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse::<i64>().ok())
    {
        Duration::from_secs((reset - now.timestamp()).max(0) as u64)
    } else {
        DEFAULT_RATE_LIMIT_DELAY
    };
    delay.min(MAX_RATE_LIMIT_DELAY)
}

/// Reads a response body for an error message, never failing.
pub async fn error_body(response: reqwest::Response) -> String {
    response
        .text()
        .await
        .unwrap_or_else(|_| String::from("(unable to read response body)"))
}
