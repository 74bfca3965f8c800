//! Concurrency and timing constants

use std::time::Duration;

/// Backoff window applied after the remote service answers with a rate-limit error.
/// coda.io resets its per-token quota within a few seconds; 10 seconds leaves margin.
pub const DEFAULT_BACKOFF_INTERVAL: Duration = Duration::from_secs(10);

/// How often callers parked behind a recovery probe re-check the limiter state.
pub const RECOVERY_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Pause taken by a probe whose call failed for an unrelated reason.
pub const PROBE_ERROR_PAUSE: Duration = Duration::from_secs(1);

/// Delay after handing recovery back, so another waiter becomes the next probe.
/// Must stay longer than [`RECOVERY_POLL_INTERVAL`].
pub const PROBE_HANDOFF_DELAY: Duration = Duration::from_secs(2);

/// Maximum number of retries per remote call (6 attempts in total).
pub const MAX_RETRIES: u32 = 5;

/// Fixed delay between retry attempts.
pub const RETRY_DELAY: Duration = Duration::from_secs(1);

/// Default number of remote calls allowed in flight at once.
pub const DEFAULT_REMOTE_CONCURRENCY: usize = 16;

/// Default number of files open at once during export/reimport.
pub const DEFAULT_FILE_CONCURRENCY: usize = 512;

/// Interval between two mutation status polls.
pub const MUTATION_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Page size requested from list endpoints (API maximum).
pub const PAGE_SIZE: usize = 200;

/// Rows per insert/delete request.
pub const ROW_BATCH_SIZE: usize = 100;

/// Backoff interval from a CLI value in seconds, falling back to the default for 0.
pub fn backoff_interval_from_secs(secs: u64) -> Duration {
    if secs == 0 {
        DEFAULT_BACKOFF_INTERVAL
    } else {
        Duration::from_secs(secs)
    }
}
