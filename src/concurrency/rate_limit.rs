//! Adaptive rate limiting around the remote "too many requests" failure
//!
//! Callers run concurrently while the limiter is [`Phase::Normal`]. The first
//! rate-limit failure moves the shared state to [`Phase::Backoff`]; every caller then
//! waits for the backoff window to end. Once it has, exactly one caller (the probe)
//! moves the state to [`Phase::Recovering`] and tries the real call:
//!
//! ```text
//! Normal     --rate limited-->          Backoff (until = now + interval)
//! Backoff    --window elapsed-->        Recovering (one probe)
//! Recovering --probe ok-->              Normal
//! Recovering --probe rate limited-->    Backoff (until extended)
//! Recovering --probe other error-->     Backoff (until unchanged), error returned to the probe
//! ```
//!
//! Rate-limit failures are never returned to callers; they are retried here for as
//! long as the service keeps refusing. There is deliberately no upper bound on the
//! total wait, the cancellation token is the only way out.

use std::future::Future;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::config::{
    DEFAULT_BACKOFF_INTERVAL, PROBE_ERROR_PAUSE, PROBE_HANDOFF_DELAY, RECOVERY_POLL_INTERVAL,
};
use super::pause;
use crate::error::Result;
use crate::metrics;

/// Shared limiter state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Calls go straight through
    Normal,
    /// Everybody waits for the backoff window to end
    Backoff,
    /// One probe is testing whether the service has recovered
    Recovering,
}

/// Timing knobs of a [`RateLimiter`]
#[derive(Debug, Clone)]
pub struct RateLimiterConfig {
    /// Length of a backoff window
    pub backoff_interval: Duration,
    /// Poll interval of callers parked behind a probe
    pub recovery_poll_interval: Duration,
    /// Pause of a probe that failed for an unrelated reason
    pub probe_error_pause: Duration,
    /// Delay after such a probe handed recovery back
    pub probe_handoff_delay: Duration,
}

impl Default for RateLimiterConfig {
    fn default() -> Self {
        Self {
            backoff_interval: DEFAULT_BACKOFF_INTERVAL,
            recovery_poll_interval: RECOVERY_POLL_INTERVAL,
            probe_error_pause: PROBE_ERROR_PAUSE,
            probe_handoff_delay: PROBE_HANDOFF_DELAY,
        }
    }
}

#[derive(Debug)]
struct State {
    phase: Phase,
    backoff_until: Instant,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Role {
    Regular,
    Probe,
}

/// Process-wide adaptive backoff gate
#[derive(Debug)]
pub struct RateLimiter {
    config: RateLimiterConfig,
    state: Mutex<State>,
}

impl RateLimiter {
    /// Create a limiter with the given backoff window and default poll/handoff timing.
    pub fn new(backoff_interval: Duration) -> Self {
        Self::with_config(RateLimiterConfig {
            backoff_interval,
            ..RateLimiterConfig::default()
        })
    }

    /// Create a limiter with full control over its timing.
    pub fn with_config(config: RateLimiterConfig) -> Self {
        Self {
            config,
            state: Mutex::new(State {
                phase: Phase::Normal,
                backoff_until: Instant::now(),
            }),
        }
    }

    /// Backoff window length
    pub fn backoff_interval(&self) -> Duration {
        self.config.backoff_interval
    }

    /// Current phase
    pub fn phase(&self) -> Phase {
        self.lock().phase
    }

    /// End of the current backoff window, `None` while the limiter is `Normal`.
    pub fn backoff_until(&self) -> Option<Instant> {
        let state = self.lock();
        (state.phase != Phase::Normal).then_some(state.backoff_until)
    }

    // Critical sections never panic, so a poisoned lock still holds consistent state.
    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Run `op`, absorbing rate-limit failures.
    ///
    /// `op` may be invoked several times: once per admission, until it either
    /// succeeds or fails with something other than a rate-limit error.
    pub async fn run<T, F, Fut>(&self, cancel: &CancellationToken, mut op: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        loop {
            match self.admit(cancel).await? {
                Role::Regular => match op().await {
                    Err(e) if e.is_rate_limited() => {
                        self.on_rate_limited();
                        continue;
                    }
                    other => return other,
                },
                Role::Probe => {
                    let probe = ProbeGuard::new(self);
                    match op().await {
                        Ok(value) => {
                            probe.recovered();
                            return Ok(value);
                        }
                        Err(e) if e.is_rate_limited() => {
                            probe.still_limited();
                            continue;
                        }
                        Err(e) => {
                            warn!(error = %e, "Recovery probe failed with an unrelated error");
                            // The guard keeps the state in Recovering during the pause and
                            // restores Backoff if we are cancelled meanwhile.
                            pause(cancel, self.config.probe_error_pause).await?;
                            probe.hand_back();
                            pause(cancel, self.config.probe_handoff_delay).await?;
                            return Err(e);
                        }
                    }
                }
            }
        }
    }

    /// Wait until this caller may run the operation, and decide in which role.
    async fn admit(&self, cancel: &CancellationToken) -> Result<Role> {
        loop {
            let wait = {
                let mut state = self.lock();
                match state.phase {
                    Phase::Normal => return Ok(Role::Regular),
                    Phase::Backoff => {
                        let now = Instant::now();
                        if now >= state.backoff_until {
                            state.phase = Phase::Recovering;
                            metrics::record_recovery_probe();
                            debug!("Backoff window elapsed, probing remote service");
                            return Ok(Role::Probe);
                        }
                        state.backoff_until - now
                    }
                    Phase::Recovering => self.config.recovery_poll_interval,
                }
            };
            pause(cancel, wait).await?;
        }
    }

    /// A non-probe call was rate limited.
    fn on_rate_limited(&self) {
        let mut state = self.lock();
        let until = Instant::now() + self.config.backoff_interval;
        match state.phase {
            Phase::Normal => {
                state.phase = Phase::Backoff;
                state.backoff_until = state.backoff_until.max(until);
                metrics::record_rate_limit_backoff();
                warn!(
                    backoff_secs = self.config.backoff_interval.as_secs_f64(),
                    "Rate limit exceeded. Backing off."
                );
            }
            Phase::Backoff => {
                state.backoff_until = state.backoff_until.max(until);
            }
            // Only the probe drives the state machine while recovering.
            Phase::Recovering => {}
        }
    }
}

/// Holds the Recovering role; returns the limiter to Backoff if dropped unresolved.
struct ProbeGuard<'a> {
    limiter: &'a RateLimiter,
    armed: bool,
}

impl<'a> ProbeGuard<'a> {
    fn new(limiter: &'a RateLimiter) -> Self {
        Self {
            limiter,
            armed: true,
        }
    }

    fn recovered(mut self) {
        self.armed = false;
        self.limiter.lock().phase = Phase::Normal;
        info!("Remote service recovered from rate limiting");
    }

    fn still_limited(mut self) {
        self.armed = false;
        let mut state = self.limiter.lock();
        let until = Instant::now() + self.limiter.config.backoff_interval;
        state.phase = Phase::Backoff;
        state.backoff_until = state.backoff_until.max(until);
        metrics::record_rate_limit_backoff();
        warn!("Recovery probe was rate limited. Extending backoff.");
    }

    fn hand_back(mut self) {
        self.armed = false;
        self.limiter.lock().phase = Phase::Backoff;
    }
}

impl Drop for ProbeGuard<'_> {
    fn drop(&mut self) {
        if self.armed {
            self.limiter.lock().phase = Phase::Backoff;
        }
    }
}
