//! Blocking HTTP media downloads.
//!
//! Platform client implementations delegate [`PlatformClient::fetch_bytes`]
//! here. Status codes are mapped onto [`PlatformError`] classes and bodies are
//! read through a size cap so an oversized payload is never fully buffered.
//!
//! [`PlatformClient::fetch_bytes`]: super::PlatformClient::fetch_bytes

use super::{PlatformError, PlatformResult};
use crate::hashing::DEFAULT_MAX_MEDIA_BYTES;
use reqwest::StatusCode;
use std::io::Read;
use std::time::Duration;

/// User agent sent with media downloads.
pub const DEFAULT_USER_AGENT: &str = concat!("reposentry/", env!("CARGO_PKG_VERSION"));

/// Returns true if `source` names an HTTP(S) resource rather than a local file.
#[must_use]
pub fn is_remote(source: &str) -> bool {
    let lower = source.trim_start().to_ascii_lowercase();
    lower.starts_with("http://") || lower.starts_with("https://")
}

/// Timeouts and limits for media downloads.
#[derive(Debug, Clone, Copy)]
pub struct HttpFetchConfig {
    /// Request timeout in milliseconds (0 to disable).
    pub timeout_ms: u64,
    /// Connect timeout in milliseconds (0 to disable).
    pub connect_timeout_ms: u64,
    /// Largest body accepted, in bytes.
    pub max_bytes: usize,
}

impl Default for HttpFetchConfig {
    fn default() -> Self {
        Self {
            timeout_ms: 30_000,
            connect_timeout_ms: 5_000,
            max_bytes: DEFAULT_MAX_MEDIA_BYTES,
        }
    }
}

impl HttpFetchConfig {
    /// Applies `REPOSENTRY_FETCH_TIMEOUT_MS` and
    /// `REPOSENTRY_FETCH_CONNECT_TIMEOUT_MS` overrides.
    #[must_use]
    pub fn with_env_overrides(mut self) -> Self {
        if let Some(timeout_ms) = env_u64("REPOSENTRY_FETCH_TIMEOUT_MS") {
            self.timeout_ms = timeout_ms;
        }
        if let Some(connect_timeout_ms) = env_u64("REPOSENTRY_FETCH_CONNECT_TIMEOUT_MS") {
            self.connect_timeout_ms = connect_timeout_ms;
        }
        self
    }
}

fn env_u64(key: &str) -> Option<u64> {
    std::env::var(key).ok().and_then(|v| v.parse().ok())
}

/// Downloads media over HTTP.
#[derive(Debug, Clone)]
pub struct HttpMediaFetcher {
    client: reqwest::blocking::Client,
    max_bytes: usize,
}

impl HttpMediaFetcher {
    /// Creates a fetcher with the given user agent and settings.
    ///
    /// # Errors
    ///
    /// Returns [`PlatformError::Other`] if the HTTP client cannot be built.
    pub fn new(user_agent: &str, config: HttpFetchConfig) -> PlatformResult<Self> {
        let mut builder = reqwest::blocking::Client::builder().user_agent(user_agent);
        if config.timeout_ms > 0 {
            builder = builder.timeout(Duration::from_millis(config.timeout_ms));
        }
        if config.connect_timeout_ms > 0 {
            builder = builder.connect_timeout(Duration::from_millis(config.connect_timeout_ms));
        }
        let client = builder
            .build()
            .map_err(|e| PlatformError::Other(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            max_bytes: config.max_bytes,
        })
    }

    /// Returns the body size cap.
    #[must_use]
    pub const fn max_bytes(&self) -> usize {
        self.max_bytes
    }

    /// Fetches `url` and returns its body.
    ///
    /// # Errors
    ///
    /// Maps 404 to `NotFound`, 403 to `Forbidden`, 429 to `RateLimited`, 5xx to
    /// `ServerError`, and transport failures or oversized bodies to `Other`.
    #[tracing::instrument(skip(self))]
    pub fn fetch(&self, url: &str) -> PlatformResult<Vec<u8>> {
        let response = self.client.get(url).send().map_err(|e| {
            let error_kind = if e.is_timeout() {
                "timeout"
            } else if e.is_connect() {
                "connect"
            } else {
                "request"
            };
            tracing::debug!(url, error = %e, error_kind, "Media request failed");
            PlatformError::Other(format!("{error_kind} error fetching {url}: {e}"))
        })?;

        let status = response.status();
        if !status.is_success() {
            let retry_after_secs = response
                .headers()
                .get(reqwest::header::RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.parse().ok());
            return Err(classify_status(status, url, retry_after_secs));
        }

        if let Some(length) = response.content_length()
            && usize::try_from(length).map_or(true, |len| len > self.max_bytes)
        {
            return Err(oversized(url, self.max_bytes));
        }

        // Read one byte past the cap so an oversized body is detected without
        // buffering it.
        let limit = u64::try_from(self.max_bytes).unwrap_or(u64::MAX).saturating_add(1);
        let mut body = Vec::new();
        response
            .take(limit)
            .read_to_end(&mut body)
            .map_err(|e| PlatformError::Other(format!("failed to read body of {url}: {e}")))?;

        if body.len() > self.max_bytes {
            return Err(oversized(url, self.max_bytes));
        }
        Ok(body)
    }
}

fn oversized(url: &str, limit: usize) -> PlatformError {
    PlatformError::Other(format!("media at {url} exceeds {limit} bytes"))
}

/// Maps a non-success status onto an error class.
fn classify_status(status: StatusCode, url: &str, retry_after_secs: Option<u64>) -> PlatformError {
    match status {
        StatusCode::NOT_FOUND | StatusCode::GONE => PlatformError::NotFound(url.to_string()),
        StatusCode::FORBIDDEN | StatusCode::UNAUTHORIZED => {
            PlatformError::Forbidden(url.to_string())
        },
        StatusCode::TOO_MANY_REQUESTS => PlatformError::RateLimited { retry_after_secs },
        s if s.is_server_error() => PlatformError::ServerError(format!("{s} from {url}")),
        s => PlatformError::Other(format!("{s} from {url}")),
    }
}
