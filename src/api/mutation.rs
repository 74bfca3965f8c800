//! Waiting for asynchronous row mutations to be applied

use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use super::model::MutationHandle;
use super::RemoteApi;
use crate::concurrency::config::MUTATION_POLL_INTERVAL;
use crate::concurrency::pause;
use crate::error::Result;

/// Polls the mutation status endpoint until a mutation reports completion
///
/// There is no overall timeout; cancel the token to give up.
#[derive(Debug, Clone)]
pub struct MutationWaiter {
    interval: Duration,
}

impl Default for MutationWaiter {
    fn default() -> Self {
        Self::new(MUTATION_POLL_INTERVAL)
    }
}

impl MutationWaiter {
    /// Waiter polling every `interval`
    pub fn new(interval: Duration) -> Self {
        Self { interval }
    }

    /// Suspend until `handle` is reported complete. Each status request goes through
    /// the client's own call stack, so polling failures are retried and rate limits
    /// are absorbed there.
    pub async fn wait(
        &self,
        api: &dyn RemoteApi,
        cancel: &CancellationToken,
        handle: &MutationHandle,
    ) -> Result<()> {
        let mut polls: u32 = 0;
        loop {
            polls += 1;
            if api.mutation_completed(cancel, handle).await? {
                debug!(request_id = %handle.request_id, polls, "Mutation completed");
                return Ok(());
            }
            pause(cancel, self.interval).await?;
        }
    }
}
