//! Bounded retry with a fixed delay between attempts

use std::future::Future;
use std::str::FromStr;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::warn;

use super::config::{MAX_RETRIES, RETRY_DELAY};
use super::pause;
use crate::error::{Error, FailureClass, Result};
use crate::metrics;

/// Which failures are worth another attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RetryMode {
    /// Retry everything except fatal failures (schema mismatch, cancellation)
    #[default]
    AllButFatal,
    /// Retry only transient remote and IO failures
    TransientOnly,
}

impl RetryMode {
    /// Whether `error` should be retried under this mode
    pub fn should_retry(&self, error: &Error) -> bool {
        match (self, error.class()) {
            (_, FailureClass::Fatal) => false,
            (RetryMode::AllButFatal, _) => true,
            (RetryMode::TransientOnly, class) => class == FailureClass::Transient,
        }
    }
}

impl FromStr for RetryMode {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "all" | "all-but-fatal" => Ok(RetryMode::AllButFatal),
            "transient" | "transient-only" => Ok(RetryMode::TransientOnly),
            _ => Err(format!(
                "Invalid retry mode: {s}. Valid options: all, transient"
            )),
        }
    }
}

/// Retries a failing operation up to `max_retries` times
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    max_retries: u32,
    delay: Duration,
    mode: RetryMode,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(MAX_RETRIES)
    }
}

impl RetryPolicy {
    /// Policy with the default one-second delay and [`RetryMode::AllButFatal`]
    pub fn new(max_retries: u32) -> Self {
        Self {
            max_retries,
            delay: RETRY_DELAY,
            mode: RetryMode::default(),
        }
    }

    /// Override the delay between attempts
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Override which failures are retried
    pub fn with_mode(mut self, mode: RetryMode) -> Self {
        self.mode = mode;
        self
    }

    /// Run `op` until it succeeds, fails with a non-retryable error, or the attempts
    /// are used up. The last failure is returned unchanged.
    pub async fn run<T, F, Fut>(&self, cancel: &CancellationToken, mut op: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut attempt: u32 = 0;
        loop {
            match op().await {
                Ok(value) => return Ok(value),
                Err(e) if attempt < self.max_retries && self.mode.should_retry(&e) => {
                    attempt += 1;
                    let remaining = self.max_retries - attempt + 1;
                    metrics::record_retry();
                    warn!(
                        remaining_attempts = remaining,
                        error = %e,
                        "Encountered error. Retrying ({} remaining attempts)...",
                        remaining
                    );
                    pause(cancel, self.delay).await?;
                }
                Err(e) => return Err(e),
            }
        }
    }
}
