//! Data-parallel helpers: partitioned reduction, parallel for-each,
//! and parallel invocation.
//!
//! Work is partitioned into contiguous chunks, each folded on its own
//! task with a private accumulator, so the inner loops run lock-free.
//! A partition's local result is merged into the shared result with a
//! single briefly-held lock at partition end.

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tracing::debug;

use crate::cancellation::CancellationToken;
use crate::errors::{FlowError, FlowResult};
use crate::progress::ProgressSink;

/// Shared loop control for [`for_each`], letting the action stop the
/// loop early from inside.
#[derive(Debug, Default)]
pub struct LoopState {
    stopped: AtomicBool,
}

impl LoopState {
    /// Requests that all partitions stop as soon as practical.
    pub fn stop(&self) {
        self.stopped.store(true, Ordering::SeqCst);
    }

    /// Whether a stop was requested.
    #[must_use]
    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::SeqCst)
    }
}

/// Result of a [`for_each`] run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ForEachOutcome {
    /// `false` when the loop was stopped from inside.
    pub completed: bool,
    /// Items the action ran to completion on.
    pub processed: u64,
}

/// Splits `items` into at most `partition_count` contiguous chunks of
/// roughly equal size.
fn partition<T>(mut items: Vec<T>, partition_count: usize) -> Vec<Vec<T>> {
    let partition_count = partition_count.max(1);
    let chunk_size = items.len().div_ceil(partition_count).max(1);
    let mut chunks = Vec::with_capacity(partition_count);
    while !items.is_empty() {
        let tail = items.split_off(chunk_size.min(items.len()));
        chunks.push(std::mem::replace(&mut items, tail));
    }
    chunks
}

/// Folds `items` across `partition_count` partitions and combines the
/// per-partition accumulators into one result.
///
/// `combine` must be associative; the order in which partitions are
/// combined is unspecified. Every item is folded exactly once. The
/// cancellation signal is checked between items; once observed, the
/// whole call fails with [`FlowError::Cancelled`] and partial work is
/// discarded.
pub async fn reduce<T, A, S, F, C>(
    items: Vec<T>,
    partition_count: usize,
    seed: S,
    fold: F,
    combine: C,
    cancel: Option<Arc<CancellationToken>>,
) -> FlowResult<A>
where
    T: Send + 'static,
    A: Send + 'static,
    S: Fn() -> A + Send + Sync + 'static,
    F: Fn(A, T) -> A + Send + Sync + 'static,
    C: Fn(A, A) -> A + Send + Sync + 'static,
{
    if items.is_empty() {
        return Ok(seed());
    }

    let seed = Arc::new(seed);
    let fold = Arc::new(fold);
    let combine = Arc::new(combine);
    let shared: Arc<Mutex<Option<A>>> = Arc::new(Mutex::new(None));

    let chunks = partition(items, partition_count);
    debug!(partitions = chunks.len(), "starting parallel reduce");

    let mut handles = Vec::with_capacity(chunks.len());
    for chunk in chunks {
        let seed = Arc::clone(&seed);
        let fold = Arc::clone(&fold);
        let combine = Arc::clone(&combine);
        let shared = Arc::clone(&shared);
        let cancel = cancel.clone();

        handles.push(tokio::spawn(async move {
            let mut acc = seed();
            for item in chunk {
                if let Some(token) = &cancel {
                    if token.is_cancelled() {
                        return Err(FlowError::cancelled_by(token));
                    }
                }
                acc = fold(acc, item);
            }
            // Single synchronized merge per partition; the lock is
            // never held across a fold.
            let mut slot = shared.lock();
            *slot = Some(match slot.take() {
                Some(existing) => combine(existing, acc),
                None => acc,
            });
            Ok(())
        }));
    }

    for handle in handles {
        match handle.await {
            Ok(Ok(())) => {}
            Ok(Err(error)) => return Err(error),
            Err(join_error) => {
                return Err(FlowError::operation_failed(format!(
                    "reduce partition failed: {join_error}"
                )))
            }
        }
    }

    let combined = shared.lock().take();
    match combined {
        Some(value) => Ok(value),
        None => Ok(seed()),
    }
}

/// Runs `action` over `items` across `parallelism` partitions.
///
/// The action may stop the loop early through [`LoopState::stop`];
/// the outcome then reports `completed = false` with the processed
/// count retained. External cancellation fails the call with
/// [`FlowError::Cancelled`]. An optional progress sink receives the
/// running processed count after each item.
pub async fn for_each<T, F>(
    items: Vec<T>,
    parallelism: usize,
    cancel: Option<Arc<CancellationToken>>,
    progress: Option<Arc<dyn ProgressSink<u64>>>,
    action: F,
) -> FlowResult<ForEachOutcome>
where
    T: Send + 'static,
    F: Fn(T, &LoopState) + Send + Sync + 'static,
{
    let action = Arc::new(action);
    let state = Arc::new(LoopState::default());
    let processed = Arc::new(AtomicU64::new(0));

    let chunks = partition(items, parallelism);
    let mut handles = Vec::with_capacity(chunks.len());
    for chunk in chunks {
        let action = Arc::clone(&action);
        let state = Arc::clone(&state);
        let processed = Arc::clone(&processed);
        let cancel = cancel.clone();
        let progress = progress.clone();

        handles.push(tokio::spawn(async move {
            for item in chunk {
                if let Some(token) = &cancel {
                    if token.is_cancelled() {
                        return Err(FlowError::cancelled_by(token));
                    }
                }
                if state.is_stopped() {
                    return Ok(());
                }
                action(item, &state);
                if state.is_stopped() {
                    return Ok(());
                }
                let count = processed.fetch_add(1, Ordering::SeqCst) + 1;
                if let Some(sink) = &progress {
                    sink.report(count);
                }
            }
            Ok(())
        }));
    }

    for handle in handles {
        match handle.await {
            Ok(Ok(())) => {}
            Ok(Err(error)) => return Err(error),
            Err(join_error) => {
                return Err(FlowError::operation_failed(format!(
                    "for_each partition failed: {join_error}"
                )))
            }
        }
    }

    Ok(ForEachOutcome {
        completed: !state.is_stopped(),
        processed: processed.load(Ordering::SeqCst),
    })
}

/// Runs a set of closures concurrently.
///
/// Each closure observes the cancellation signal before it starts; a
/// closure skipped because of cancellation fails the whole call with
/// [`FlowError::Cancelled`] after the remaining closures finish.
pub async fn invoke<F>(
    actions: Vec<F>,
    cancel: Option<Arc<CancellationToken>>,
) -> FlowResult<()>
where
    F: FnOnce() + Send + 'static,
{
    let mut handles = Vec::with_capacity(actions.len());
    for action in actions {
        let cancel = cancel.clone();
        handles.push(tokio::spawn(async move {
            if let Some(token) = &cancel {
                if token.is_cancelled() {
                    return Err(FlowError::cancelled_by(token));
                }
            }
            action();
            Ok(())
        }));
    }

    let mut first_error = None;
    for handle in handles {
        match handle.await {
            Ok(Ok(())) => {}
            Ok(Err(error)) => {
                if first_error.is_none() {
                    first_error = Some(error);
                }
            }
            Err(join_error) => {
                if first_error.is_none() {
                    first_error = Some(FlowError::operation_failed(format!(
                        "invoked action failed: {join_error}"
                    )));
                }
            }
        }
    }

    match first_error {
        Some(error) => Err(error),
        None => Ok(()),
    }
}
