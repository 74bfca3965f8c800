//! Concurrency control for calls to the remote API
//!
//! Every remote call goes through three layers, composed explicitly by
//! [`CallStack::call`]:
//!
//! ```text
//! gate.run(|| retry.run(|| rate_limiter.run(raw_call)))
//! ```
//!
//! - [`gate::ConcurrencyGate`] bounds the number of calls in flight. The permit is held
//!   for the whole call, including every retry delay and backoff wait below it. With a
//!   small capacity and a long backoff window, waiting calls can occupy every slot.
//! - [`retry::RetryPolicy`] retries failures with a fixed delay.
//! - [`rate_limit::RateLimiter`] absorbs rate-limit failures behind a shared backoff
//!   window, so the retry layer never sees them.
//!
//! [`gather`] provides the two fan-out strategies used by the pipeline.
//!
//! Every layer takes a [`CancellationToken`] and checks it at each wait.

pub mod config;
pub mod gate;
pub mod gather;
pub mod rate_limit;
pub mod retry;

pub use gate::{ConcurrencyGate, Permit};
pub use gather::{cancel_on_first_error, complete_then_raise_first};
pub use rate_limit::{Phase, RateLimiter, RateLimiterConfig};
pub use retry::{RetryMode, RetryPolicy};

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use crate::error::{Error, Result};

/// Sleep for `duration` unless `cancel` fires first.
pub async fn pause(cancel: &CancellationToken, duration: Duration) -> Result<()> {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(Error::Cancelled),
        _ = tokio::time::sleep(duration) => Ok(()),
    }
}

/// The middleware stack wrapped around every raw remote call
#[derive(Debug, Clone)]
pub struct CallStack {
    gate: ConcurrencyGate,
    retry: RetryPolicy,
    limiter: Arc<RateLimiter>,
}

impl CallStack {
    /// Compose a stack from its layers. `limiter` is usually shared process-wide.
    pub fn new(gate: ConcurrencyGate, retry: RetryPolicy, limiter: Arc<RateLimiter>) -> Self {
        Self {
            gate,
            retry,
            limiter,
        }
    }

    /// Remote-call gate
    pub fn gate(&self) -> &ConcurrencyGate {
        &self.gate
    }

    /// Invoke `op` through gate, retry and rate limiter, in that order.
    pub async fn call<T, F, Fut>(&self, cancel: &CancellationToken, op: F) -> Result<T>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let (gate, retry, limiter) = (&self.gate, &self.retry, &*self.limiter);
        let op = &op;
        gate.run(cancel, move || {
            retry.run(cancel, move || limiter.run(cancel, op))
        })
        .await
    }
}
