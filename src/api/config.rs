//! Remote API client configuration

use std::fmt;
use std::time::Duration;

use crate::concurrency::config::{
    DEFAULT_BACKOFF_INTERVAL, DEFAULT_REMOTE_CONCURRENCY, MAX_RETRIES, RETRY_DELAY,
};
use crate::concurrency::RetryMode;

/// Default API root
pub const DEFAULT_BASE_URL: &str = "https://coda.io/apis/v1";

/// Settings for [`super::CodaClient`]
#[derive(Clone)]
pub struct ClientConfig {
    /// Bearer token
    pub api_token: String,
    /// API root without trailing slash
    pub base_url: String,
    /// Retries per call after the first attempt
    pub max_retries: u32,
    /// Delay between retries
    pub retry_delay: Duration,
    /// Which failures are retried
    pub retry_mode: RetryMode,
    /// Maximum remote calls in flight
    pub concurrency: usize,
    /// Rate-limit backoff window
    pub backoff_interval: Duration,
}

impl ClientConfig {
    /// Defaults for everything but the token
    pub fn new(api_token: impl Into<String>) -> Self {
        Self {
            api_token: api_token.into(),
            base_url: DEFAULT_BASE_URL.to_string(),
            max_retries: MAX_RETRIES,
            retry_delay: RETRY_DELAY,
            retry_mode: RetryMode::default(),
            concurrency: DEFAULT_REMOTE_CONCURRENCY,
            backoff_interval: DEFAULT_BACKOFF_INTERVAL,
        }
    }

    /// Override the API root
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    /// Override the retry count
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Override the retry delay
    pub fn with_retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = delay;
        self
    }

    /// Override the retry mode
    pub fn with_retry_mode(mut self, mode: RetryMode) -> Self {
        self.retry_mode = mode;
        self
    }

    /// Override the remote concurrency limit
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency;
        self
    }

    /// Override the backoff window
    pub fn with_backoff_interval(mut self, interval: Duration) -> Self {
        self.backoff_interval = interval;
        self
    }
}

// The token never reaches logs.
impl fmt::Debug for ClientConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientConfig")
            .field("api_token", &"<redacted>")
            .field("base_url", &self.base_url)
            .field("max_retries", &self.max_retries)
            .field("retry_delay", &self.retry_delay)
            .field("retry_mode", &self.retry_mode)
            .field("concurrency", &self.concurrency)
            .field("backoff_interval", &self.backoff_interval)
            .finish()
    }
}
