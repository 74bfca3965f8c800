//! Fan-out/fan-in over sets of concurrently running operations
//!
//! Two strategies with deliberately different failure contracts:
//!
//! - [`cancel_on_first_error`]: the first failure cancels the remaining tasks and is
//!   returned right away, without waiting for the cancelled tasks to unwind.
//! - [`complete_then_raise_first`]: every task runs to completion, every failure is
//!   logged, and the failure with the lowest submission index is returned.

use futures_util::future::join_all;
use futures_util::stream::{FuturesUnordered, StreamExt};
use std::future::Future;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error};

use crate::error::{Error, Result};

/// Launch every task concurrently; on the first failure cancel the rest and return it.
///
/// Each task receives a child token of `cancel`, which is cancelled as soon as any
/// sibling fails. Cancelled tasks keep unwinding in the background and release what
/// they hold on their own. On success the results come back in submission order.
pub async fn cancel_on_first_error<T, I, F, Fut>(
    cancel: &CancellationToken,
    tasks: I,
) -> Result<Vec<T>>
where
    I: IntoIterator<Item = F>,
    F: FnOnce(CancellationToken) -> Fut,
    Fut: Future<Output = Result<T>> + Send + 'static,
    T: Send + 'static,
{
    let group = cancel.child_token();
    let mut running: FuturesUnordered<_> = tasks
        .into_iter()
        .enumerate()
        .map(|(index, task)| {
            let handle = tokio::spawn(task(group.clone()));
            async move { (index, handle.await) }
        })
        .collect();

    let mut results: Vec<Option<T>> = (0..running.len()).map(|_| None).collect();
    while let Some((index, joined)) = running.next().await {
        match joined.map_err(Error::from).and_then(|result| result) {
            Ok(value) => results[index] = Some(value),
            Err(e) => {
                debug!(index, error = %e, "Task failed, cancelling its siblings");
                group.cancel();
                return Err(e);
            }
        }
    }

    results
        .into_iter()
        .enumerate()
        .map(|(index, value)| {
            value.ok_or_else(|| Error::Internal(format!("task {index} produced no result")))
        })
        .collect()
}

/// Run every task to completion, log all failures, then return the first one by
/// submission index. Otherwise return every result in submission order.
pub async fn complete_then_raise_first<T, I, Fut>(tasks: I) -> Result<Vec<T>>
where
    I: IntoIterator<Item = Fut>,
    Fut: Future<Output = Result<T>>,
{
    let outcomes = join_all(tasks).await;

    let mut first_error = None;
    let mut values = Vec::with_capacity(outcomes.len());
    for (index, outcome) in outcomes.into_iter().enumerate() {
        match outcome {
            Ok(value) => values.push(value),
            Err(e) => {
                error!(index, error = %e, "Task failed");
                first_error.get_or_insert(e);
            }
        }
    }

    match first_error {
        Some(e) => Err(e),
        None => Ok(values),
    }
}
