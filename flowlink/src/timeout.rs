//! Deadline racing for async operations.
//!
//! [`race_against_timeout`] resolves with whichever of an operation or
//! a timer finishes first. A losing operation is never abandoned
//! silently: it is detached onto the runtime and runs to completion in
//! the background, its result discarded.

use futures::stream::{FuturesUnordered, StreamExt};
use std::future::Future;
use std::time::Duration;
use tracing::{debug, warn};

use crate::errors::{FlowError, FlowResult};

/// Races `op` against a timer.
///
/// Returns the operation's result if it resolves within `timeout`,
/// otherwise [`FlowError::Timeout`]. Ties break in favor of the timer
/// so behavior is deterministic under test. On timeout the in-flight
/// operation keeps running detached; its eventual result (success or
/// failure) never surfaces to the caller.
pub async fn race_against_timeout<T, F>(op: F, timeout: Duration) -> FlowResult<T>
where
    F: Future<Output = FlowResult<T>> + Send + 'static,
    T: Send + 'static,
{
    let mut handle = tokio::spawn(op);

    tokio::select! {
        biased;
        () = tokio::time::sleep(timeout) => {
            warn!(timeout_ms = timeout.as_millis() as u64, "operation timed out; detaching straggler");
            Err(FlowError::timeout(format!(
                "deadline of {}ms elapsed",
                timeout.as_millis()
            )))
        }
        joined = &mut handle => match joined {
            Ok(result) => result,
            Err(join_error) => Err(FlowError::operation_failed(format!(
                "operation task failed: {join_error}"
            ))),
        },
    }
}

/// Races several operations against one shared timer.
///
/// Returns the first success immediately. If the timer fires first,
/// returns [`FlowError::Timeout`] and detaches the stragglers. If every
/// operation fails before the deadline, returns
/// [`FlowError::Aggregate`] with the failures in submission order,
/// regardless of completion order.
pub async fn race_many<T, F>(ops: Vec<F>, timeout: Duration) -> FlowResult<T>
where
    F: Future<Output = FlowResult<T>> + Send + 'static,
    T: Send + 'static,
{
    if ops.is_empty() {
        return Err(FlowError::operation_failed("race_many requires at least one operation"));
    }

    let mut pending: FuturesUnordered<_> = ops
        .into_iter()
        .enumerate()
        .map(|(index, op)| {
            let handle = tokio::spawn(op);
            async move { (index, handle.await) }
        })
        .collect();

    let timer = tokio::time::sleep(timeout);
    tokio::pin!(timer);

    let mut failures: Vec<(usize, FlowError)> = Vec::new();

    loop {
        tokio::select! {
            biased;
            () = &mut timer => {
                warn!(remaining = pending.len(), "race_many timed out; detaching stragglers");
                return Err(FlowError::timeout(format!(
                    "deadline of {}ms elapsed",
                    timeout.as_millis()
                )));
            }
            next = pending.next() => match next {
                Some((_, Ok(Ok(value)))) => return Ok(value),
                Some((index, Ok(Err(error)))) => {
                    debug!(index, %error, "race_many candidate failed");
                    failures.push((index, error));
                }
                Some((index, Err(join_error))) => {
                    failures.push((
                        index,
                        FlowError::operation_failed(format!("operation task failed: {join_error}")),
                    ));
                }
                None => {
                    failures.sort_by_key(|(index, _)| *index);
                    return Err(FlowError::aggregate(
                        failures.into_iter().map(|(_, error)| error).collect(),
                    ));
                }
            },
        }
    }
}

/// Resolves with `value` after `delay`.
pub async fn delay_result<T>(value: T, delay: Duration) -> T {
    tokio::time::sleep(delay).await;
    value
}

/// Awaits every operation and collects the successes in submission order.
///
/// All operations are awaited to completion even when some fail - no
/// outcome is left unobserved. A single failure is returned unchanged;
/// two or more are aggregated in submission order.
pub async fn gather<T, F>(ops: Vec<F>) -> FlowResult<Vec<T>>
where
    F: Future<Output = FlowResult<T>>,
{
    let outcomes = futures::future::join_all(ops).await;

    let mut values = Vec::with_capacity(outcomes.len());
    let mut failures = Vec::new();
    for outcome in outcomes {
        match outcome {
            Ok(value) => values.push(value),
            Err(error) => failures.push(error),
        }
    }

    match failures.len() {
        0 => Ok(values),
        1 => Err(failures.swap_remove(0)),
        _ => Err(FlowError::aggregate(failures)),
    }
}
