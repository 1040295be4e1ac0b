//! Worker trait and closure adapters.
//!
//! Workers are the fundamental units of per-item work in a flowlink
//! stage.

use async_trait::async_trait;
use std::fmt::Debug;
use std::future::Future;
use std::sync::Arc;

use crate::errors::FlowResult;

/// Trait for per-item stage workers.
///
/// A worker transforms one input item into one output item (or `()`
/// for terminal stages). Returning an error faults the owning stage.
#[async_trait]
pub trait Worker<T, U>: Send + Sync {
    /// Processes a single item.
    async fn process(&self, item: T) -> FlowResult<U>;
}

/// A simple function-based worker.
pub struct FnWorker<F> {
    func: F,
}

impl<F> Debug for FnWorker<F> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FnWorker").finish()
    }
}

#[async_trait]
impl<T, U, F> Worker<T, U> for FnWorker<F>
where
    T: Send + 'static,
    U: Send + 'static,
    F: Fn(T) -> FlowResult<U> + Send + Sync,
{
    async fn process(&self, item: T) -> FlowResult<U> {
        (self.func)(item)
    }
}

/// An async function-based worker.
pub struct AsyncFnWorker<F> {
    func: F,
}

impl<F> Debug for AsyncFnWorker<F> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AsyncFnWorker").finish()
    }
}

#[async_trait]
impl<T, U, F, Fut> Worker<T, U> for AsyncFnWorker<F>
where
    T: Send + 'static,
    U: Send + 'static,
    F: Fn(T) -> Fut + Send + Sync,
    Fut: Future<Output = FlowResult<U>> + Send,
{
    async fn process(&self, item: T) -> FlowResult<U> {
        (self.func)(item).await
    }
}

/// Wraps a synchronous closure as a [`Worker`].
pub fn worker_fn<T, U, F>(func: F) -> Arc<dyn Worker<T, U>>
where
    T: Send + 'static,
    U: Send + 'static,
    F: Fn(T) -> FlowResult<U> + Send + Sync + 'static,
{
    Arc::new(FnWorker { func })
}

/// Wraps an async closure as a [`Worker`].
pub fn async_worker_fn<T, U, F, Fut>(func: F) -> Arc<dyn Worker<T, U>>
where
    T: Send + 'static,
    U: Send + 'static,
    F: Fn(T) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = FlowResult<U>> + Send + 'static,
{
    Arc::new(AsyncFnWorker { func })
}
