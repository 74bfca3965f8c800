//! Shared resources for all API clients
//!
//! Process-wide HTTP client and rate limiter. The remote service limits requests per
//! token, so every client built in this process observes the same backoff window.

use once_cell::sync::OnceCell;
use reqwest::Client;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

use crate::concurrency::RateLimiter;
use crate::error::{Error, Result};

/// HTTP connect timeout (seconds) - time to establish TCP connection
const HTTP_CONNECT_TIMEOUT_SECS: u64 = 10;
/// HTTP request timeout (seconds) - overall time for the entire request
const HTTP_REQUEST_TIMEOUT_SECS: u64 = 30;

static GLOBAL_HTTP_CLIENT: OnceCell<Arc<Client>> = OnceCell::new();
static GLOBAL_RATE_LIMITER: OnceCell<Arc<RateLimiter>> = OnceCell::new();

/// Build an HTTP client with the standard timeouts
pub fn build_http_client() -> Result<Client> {
    Client::builder()
        .connect_timeout(Duration::from_secs(HTTP_CONNECT_TIMEOUT_SECS))
        .timeout(Duration::from_secs(HTTP_REQUEST_TIMEOUT_SECS))
        .build()
        .map_err(|e| Error::Internal(format!("Failed to build HTTP client: {e}")))
}

/// Get the global HTTP client, building it on first use
pub fn global_http_client() -> Result<Arc<Client>> {
    GLOBAL_HTTP_CLIENT
        .get_or_try_init(|| build_http_client().map(Arc::new))
        .cloned()
}

/// Get the global rate limiter
///
/// The first caller fixes the backoff interval; later callers get the same limiter
/// whatever interval they ask for.
pub fn global_rate_limiter(backoff_interval: Duration) -> Arc<RateLimiter> {
    GLOBAL_RATE_LIMITER
        .get_or_init(|| {
            debug!(?backoff_interval, "Creating global rate limiter");
            Arc::new(RateLimiter::new(backoff_interval))
        })
        .clone()
}
