//! Stages: queued units of concurrent processing.
//!
//! A stage owns a bounded input queue, a [`Worker`] function, and a
//! completion lifecycle. Stages are composed into pipelines by linking
//! them; bounded queue capacity is what provides backpressure through
//! a linked graph.

mod link;
mod metrics;
mod worker;

pub use link::{LinkHandle, LinkOptions, LinkPredicate, StageInput, TryAccept};
pub use metrics::StageMetrics;
pub use worker::{async_worker_fn, worker_fn, AsyncFnWorker, FnWorker, Worker};

use futures::stream::{FuturesUnordered, StreamExt};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::cancellation::CancellationToken;
use crate::errors::{FlowError, FlowResult};
use link::{LinkEntry, LinkId};

/// Identity of a stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StageId(Uuid);

impl StageId {
    fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for StageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Lifecycle state of a stage.
///
/// `Completed` and `Faulted` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StageState {
    /// Accepting and processing items.
    Running,
    /// No longer accepting; draining the queue.
    Completing,
    /// Drained and finished normally.
    Completed,
    /// Terminated by a worker fault, upstream fault, or cancellation.
    Faulted,
}

impl StageState {
    /// Whether this state is terminal.
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Faulted)
    }
}

/// Configuration for a stage.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageConfig {
    /// Display name used in logs.
    pub name: String,
    /// Input queue capacity; `0` means unbounded.
    pub capacity: usize,
    /// Maximum items processed concurrently. Minimum 1.
    pub concurrency: usize,
    /// Cooperative cancellation signal for this stage.
    #[serde(skip)]
    pub cancel: Option<Arc<CancellationToken>>,
}

impl Default for StageConfig {
    fn default() -> Self {
        Self {
            name: "stage".to_string(),
            capacity: 0,
            concurrency: 1,
            cancel: None,
        }
    }
}

impl StageConfig {
    /// Creates a new stage configuration with defaults.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    /// Sets the queue capacity (`0` = unbounded).
    #[must_use]
    pub fn with_capacity(mut self, capacity: usize) -> Self {
        self.capacity = capacity;
        self
    }

    /// Sets the bounded concurrency degree.
    #[must_use]
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency;
        self
    }

    /// Attaches a cancellation token.
    #[must_use]
    pub fn with_cancellation(mut self, token: Arc<CancellationToken>) -> Self {
        self.cancel = Some(token);
        self
    }
}

/// Intake side of a stage's queue.
enum IntakeSender<T> {
    Bounded(mpsc::Sender<T>),
    Unbounded(mpsc::UnboundedSender<T>),
}

impl<T> Clone for IntakeSender<T> {
    fn clone(&self) -> Self {
        match self {
            Self::Bounded(tx) => Self::Bounded(tx.clone()),
            Self::Unbounded(tx) => Self::Unbounded(tx.clone()),
        }
    }
}

enum IntakeReceiver<T> {
    Bounded(mpsc::Receiver<T>),
    Unbounded(mpsc::UnboundedReceiver<T>),
}

impl<T: Send> IntakeSender<T> {
    fn channel(capacity: usize) -> (Self, IntakeReceiver<T>) {
        if capacity == 0 {
            let (tx, rx) = mpsc::unbounded_channel();
            (Self::Unbounded(tx), IntakeReceiver::Unbounded(rx))
        } else {
            let (tx, rx) = mpsc::channel(capacity);
            (Self::Bounded(tx), IntakeReceiver::Bounded(rx))
        }
    }

    /// Sends, suspending while a bounded queue is full. Hands the item
    /// back if the channel is closed.
    async fn send(&self, item: T) -> Result<(), T> {
        match self {
            Self::Bounded(tx) => tx.send(item).await.map_err(|e| e.0),
            Self::Unbounded(tx) => tx.send(item).map_err(|e| e.0),
        }
    }

    fn try_send(&self, item: T) -> TryAccept<T> {
        match self {
            Self::Bounded(tx) => match tx.try_send(item) {
                Ok(()) => TryAccept::Accepted,
                Err(mpsc::error::TrySendError::Full(item)) => TryAccept::Full(item),
                Err(mpsc::error::TrySendError::Closed(item)) => TryAccept::Rejected(item),
            },
            Self::Unbounded(tx) => match tx.send(item) {
                Ok(()) => TryAccept::Accepted,
                Err(error) => TryAccept::Rejected(error.0),
            },
        }
    }
}

impl<T> IntakeReceiver<T> {
    async fn recv(&mut self) -> Option<T> {
        match self {
            Self::Bounded(rx) => rx.recv().await,
            Self::Unbounded(rx) => rx.recv().await,
        }
    }
}

/// A queued unit of concurrent processing.
///
/// Created with [`Stage::spawn`], which starts the worker loop
/// immediately. Items enter through [`Stage::post`], flow through the
/// worker function, and route across outbound links to downstream
/// stages. [`Stage::complete`] closes the intake and lets the queue
/// drain; [`Stage::await_completion`] resolves when the stage reaches
/// a terminal state.
pub struct Stage<T, U> {
    id: StageId,
    name: String,
    intake: RwLock<Option<IntakeSender<T>>>,
    links: Arc<RwLock<Vec<LinkEntry<U>>>>,
    state_tx: watch::Sender<StageState>,
    state_rx: watch::Receiver<StageState>,
    fault: RwLock<Option<FlowError>>,
    metrics: Arc<StageMetrics>,
    cancel: Option<Arc<CancellationToken>>,
}

impl<T, U> Stage<T, U>
where
    T: Send + 'static,
    U: Send + 'static,
{
    /// Creates a stage and spawns its worker loop.
    #[must_use]
    pub fn spawn(config: StageConfig, worker: Arc<dyn Worker<T, U>>) -> Arc<Self> {
        let (intake_tx, intake_rx) = IntakeSender::channel(config.capacity);
        let (state_tx, state_rx) = watch::channel(StageState::Running);
        let concurrency = config.concurrency.max(1);

        let stage = Arc::new(Self {
            id: StageId::new(),
            name: config.name,
            intake: RwLock::new(Some(intake_tx)),
            links: Arc::new(RwLock::new(Vec::new())),
            state_tx,
            state_rx,
            fault: RwLock::new(None),
            metrics: Arc::new(StageMetrics::default()),
            cancel: config.cancel,
        });

        let loop_stage = Arc::clone(&stage);
        tokio::spawn(async move {
            loop_stage.worker_loop(intake_rx, worker, concurrency).await;
        });

        stage
    }

    /// Returns the stage's identity.
    #[must_use]
    pub fn id(&self) -> StageId {
        self.id
    }

    /// Returns the stage's display name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the current lifecycle state.
    #[must_use]
    pub fn state(&self) -> StageState {
        *self.state_rx.borrow()
    }

    /// Returns the stage's metrics.
    #[must_use]
    pub fn metrics(&self) -> &StageMetrics {
        &self.metrics
    }

    /// Returns the recorded first fault, if the stage has faulted.
    #[must_use]
    pub fn recorded_fault(&self) -> Option<FlowError> {
        self.fault.read().clone()
    }

    /// Enqueues an item, suspending while a bounded queue is at
    /// capacity.
    ///
    /// Returns `false` without side effect if the stage is already
    /// `Completing`, `Completed`, or `Faulted`, or its cancellation
    /// token has fired.
    pub async fn post(&self, item: T) -> bool {
        if let Some(token) = &self.cancel {
            if token.is_cancelled() {
                self.metrics.record_rejected();
                return false;
            }
        }
        match self.accept_inner(item).await {
            Ok(()) => true,
            Err(_rejected) => false,
        }
    }

    /// Transitions to `Completing`; no further `post` is accepted.
    ///
    /// Once the queue drains and in-flight work finishes, the stage
    /// transitions to `Completed` and its completion signal resolves.
    pub fn complete(&self) {
        let changed = self.state_tx.send_if_modified(|state| {
            if *state == StageState::Running {
                *state = StageState::Completing;
                true
            } else {
                false
            }
        });
        if changed {
            // Closing the intake lets the worker loop drain naturally.
            *self.intake.write() = None;
        }
    }

    /// Faults the stage with `error`.
    ///
    /// The first fault wins; the queue is discarded and the completion
    /// signal resolves with the recorded fault.
    pub fn fault(&self, error: FlowError) {
        self.transition_faulted(error);
    }

    /// Resolves when the stage reaches a terminal state.
    ///
    /// Returns `Ok(())` on normal completion or the recorded first
    /// fault on `Faulted`. May be awaited by multiple callers.
    pub async fn await_completion(&self) -> FlowResult<()> {
        let mut rx = self.state_rx.clone();
        loop {
            let state = *rx.borrow_and_update();
            match state {
                StageState::Completed => return Ok(()),
                StageState::Faulted => {
                    return Err(self.recorded_fault().unwrap_or_else(|| {
                        FlowError::operation_failed("stage faulted without a recorded error")
                    }));
                }
                StageState::Running | StageState::Completing => {
                    if rx.changed().await.is_err() {
                        return Err(FlowError::operation_failed(
                            "stage dropped before completion",
                        ));
                    }
                }
            }
        }
    }

    /// Links this stage's output to `target`.
    ///
    /// Every successful worker output is offered to outbound links in
    /// linkage order; the first accepting link receives the item. If
    /// the source is already terminal, completion/fault propagation
    /// (when requested) happens immediately and no link is registered.
    pub fn link_to(&self, target: Arc<dyn StageInput<U>>, options: LinkOptions<U>) -> LinkHandle<U> {
        // The link set lock spans the state check and the insert so a
        // concurrent terminal transition cannot slip between them.
        let mut links = self.links.write();
        match self.state() {
            StageState::Completed => {
                if options.propagate_completion {
                    target.complete();
                }
                return LinkHandle::detached();
            }
            StageState::Faulted => {
                if options.propagate_completion {
                    if let Some(error) = self.recorded_fault() {
                        target.fault(error);
                    }
                }
                return LinkHandle::detached();
            }
            StageState::Running | StageState::Completing => {}
        }

        let entry = LinkEntry {
            id: LinkId::new(),
            target,
            propagate_completion: options.propagate_completion,
            predicate: options.predicate,
        };
        let id = entry.id;
        links.push(entry);
        drop(links);

        LinkHandle::new(id, &self.links)
    }

    async fn accept_inner(&self, item: T) -> Result<(), T> {
        let sender = {
            let intake = self.intake.read();
            match (intake.as_ref(), self.state()) {
                (Some(tx), StageState::Running) => tx.clone(),
                _ => {
                    self.metrics.record_rejected();
                    return Err(item);
                }
            }
        };
        match sender.send(item).await {
            Ok(()) => {
                self.metrics.record_accepted();
                Ok(())
            }
            Err(item) => {
                self.metrics.record_rejected();
                Err(item)
            }
        }
    }

    fn try_accept_inner(&self, item: T) -> TryAccept<T> {
        let intake = self.intake.read();
        match (intake.as_ref(), self.state()) {
            (Some(tx), StageState::Running) => match tx.try_send(item) {
                TryAccept::Accepted => {
                    self.metrics.record_accepted();
                    TryAccept::Accepted
                }
                other => other,
            },
            _ => TryAccept::Rejected(item),
        }
    }

    async fn worker_loop(
        self: Arc<Self>,
        rx: IntakeReceiver<T>,
        worker: Arc<dyn Worker<T, U>>,
        concurrency: usize,
    ) {
        if concurrency <= 1 {
            self.serial_loop(rx, worker).await;
        } else {
            self.concurrent_loop(rx, worker, concurrency).await;
        }
    }

    async fn serial_loop(&self, mut rx: IntakeReceiver<T>, worker: Arc<dyn Worker<T, U>>) {
        loop {
            let item = tokio::select! {
                biased;
                () = cancellation_signal(self.cancel.as_deref()) => {
                    self.observe_cancellation();
                    return;
                }
                maybe_item = rx.recv() => match maybe_item {
                    Some(item) => item,
                    None => break,
                },
            };
            // Returning drops rx, which discards anything still queued.
            if self.state() == StageState::Faulted {
                return;
            }
            match worker.process(item).await {
                Ok(output) => {
                    self.metrics.record_processed();
                    self.route(output).await;
                }
                Err(error) => {
                    self.transition_faulted(error);
                    return;
                }
            }
        }
        self.transition_completed();
    }

    async fn concurrent_loop(
        &self,
        mut rx: IntakeReceiver<T>,
        worker: Arc<dyn Worker<T, U>>,
        concurrency: usize,
    ) {
        let mut in_flight: FuturesUnordered<
            Pin<Box<dyn Future<Output = FlowResult<U>> + Send>>,
        > = FuturesUnordered::new();
        let mut intake_open = true;

        loop {
            if self.state() == StageState::Faulted {
                return;
            }
            if !intake_open && in_flight.is_empty() {
                break;
            }
            tokio::select! {
                biased;
                () = cancellation_signal(self.cancel.as_deref()) => {
                    self.observe_cancellation();
                    return;
                }
                Some(result) = in_flight.next(), if !in_flight.is_empty() => {
                    match result {
                        Ok(output) => {
                            self.metrics.record_processed();
                            self.route(output).await;
                        }
                        Err(error) => {
                            self.transition_faulted(error);
                            return;
                        }
                    }
                }
                maybe_item = rx.recv(), if intake_open && in_flight.len() < concurrency => {
                    match maybe_item {
                        Some(item) => {
                            let worker = Arc::clone(&worker);
                            in_flight.push(Box::pin(async move {
                                worker.process(item).await
                            }));
                        }
                        None => intake_open = false,
                    }
                }
            }
        }
        self.transition_completed();
    }

    /// Faults the stage if its cancellation token has fired.
    fn observe_cancellation(&self) -> bool {
        if let Some(token) = &self.cancel {
            if token.is_cancelled() {
                self.transition_faulted(FlowError::cancelled_by(token));
                return true;
            }
        }
        false
    }

    /// Offers `output` to outbound links in linkage order.
    ///
    /// Delivery is to exactly one accepting link. A non-blocking sweep
    /// runs first; if every eligible target is full, the loop suspends
    /// on the first full link, which is what throttles this stage when
    /// downstream capacity is bounded. With no links registered the
    /// stage acts as a terminal consumer and the output is discarded.
    async fn route(&self, output: U) {
        let entries: Vec<LinkEntry<U>> = self.links.read().iter().cloned().collect();
        if entries.is_empty() {
            return;
        }

        let mut item = output;
        let mut full: Vec<&LinkEntry<U>> = Vec::new();
        for entry in &entries {
            if let Some(predicate) = &entry.predicate {
                if !predicate(&item) {
                    continue;
                }
            }
            match entry.target.try_accept(item) {
                TryAccept::Accepted => return,
                TryAccept::Full(returned) => {
                    item = returned;
                    full.push(entry);
                }
                TryAccept::Rejected(returned) => {
                    item = returned;
                }
            }
        }

        for entry in full {
            match entry.target.accept(item).await {
                Ok(()) => return,
                Err(returned) => item = returned,
            }
        }

        self.metrics.record_dropped();
        debug!(stage = %self.name, "no link accepted output; dropping item");
    }

    fn transition_completed(&self) {
        let changed = self.state_tx.send_if_modified(|state| match *state {
            StageState::Running | StageState::Completing => {
                *state = StageState::Completed;
                true
            }
            StageState::Completed | StageState::Faulted => false,
        });
        if !changed {
            return;
        }
        *self.intake.write() = None;

        let targets: Vec<LinkEntry<U>> = {
            let links = self.links.read();
            links
                .iter()
                .filter(|entry| entry.propagate_completion)
                .cloned()
                .collect()
        };
        for entry in targets {
            entry.target.complete();
        }
    }

    fn transition_faulted(&self, error: FlowError) {
        // The fault slot lock is held across the state flip so
        // awaiters woken by the watch always observe the recorded
        // error. It is released before propagation to keep fault
        // cycles in linked graphs from deadlocking.
        let mut slot = self.fault.write();
        let changed = self.state_tx.send_if_modified(|state| match *state {
            StageState::Running | StageState::Completing => {
                *state = StageState::Faulted;
                true
            }
            StageState::Completed | StageState::Faulted => false,
        });
        if !changed {
            return;
        }
        *slot = Some(error.clone());
        drop(slot);

        self.metrics.record_faulted();
        warn!(stage = %self.name, %error, "stage faulted");
        *self.intake.write() = None;

        let targets: Vec<LinkEntry<U>> = {
            let links = self.links.read();
            links
                .iter()
                .filter(|entry| entry.propagate_completion)
                .cloned()
                .collect()
        };
        for entry in targets {
            entry.target.fault(error.clone());
        }
    }
}

/// Resolves when `cancel` fires; pends forever without a token.
async fn cancellation_signal(cancel: Option<&CancellationToken>) {
    match cancel {
        Some(token) => token.cancelled().await,
        None => std::future::pending().await,
    }
}

#[async_trait::async_trait]
impl<T, U> StageInput<T> for Stage<T, U>
where
    T: Send + 'static,
    U: Send + 'static,
{
    fn try_accept(&self, item: T) -> TryAccept<T> {
        self.try_accept_inner(item)
    }

    async fn accept(&self, item: T) -> Result<(), T> {
        self.accept_inner(item).await
    }

    fn complete(&self) {
        Stage::complete(self);
    }

    fn fault(&self, error: FlowError) {
        self.transition_faulted(error);
    }
}

impl<T, U> fmt::Debug for Stage<T, U> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Stage")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("state", &*self.state_rx.borrow())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::FlowErrorKind;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    fn doubling_stage(name: &str) -> Arc<Stage<i32, i32>> {
        Stage::spawn(StageConfig::new(name), worker_fn(|i: i32| Ok(i * 2)))
    }

    #[tokio::test]
    async fn test_post_then_complete_processes_all_items() {
        let seen = Arc::new(AtomicUsize::new(0));
        let counter = seen.clone();
        let stage: Arc<Stage<i32, ()>> = Stage::spawn(
            StageConfig::new("counter"),
            worker_fn(move |_i: i32| {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }),
        );

        for i in 0..100 {
            assert!(stage.post(i).await);
        }
        stage.complete();

        assert_eq!(stage.await_completion().await, Ok(()));
        // No duplication, no loss.
        assert_eq!(seen.load(Ordering::SeqCst), 100);
        assert_eq!(stage.metrics().accepted(), 100);
        assert_eq!(stage.metrics().processed(), 100);
    }

    #[tokio::test]
    async fn test_post_rejected_after_complete() {
        let stage = doubling_stage("doubler");
        stage.complete();

        assert!(!stage.post(1).await);
        assert_eq!(stage.await_completion().await, Ok(()));
        assert_eq!(stage.state(), StageState::Completed);
        assert_eq!(stage.metrics().rejected(), 1);
    }

    #[tokio::test]
    async fn test_worker_fault_is_terminal_and_discards_queue() {
        let processed = Arc::new(AtomicUsize::new(0));
        let counter = processed.clone();
        let stage: Arc<Stage<i32, i32>> = Stage::spawn(
            StageConfig::new("faulty"),
            worker_fn(move |i: i32| {
                if i == 1 {
                    Err(FlowError::operation_failed("blech"))
                } else {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Ok(i * 2)
                }
            }),
        );

        assert!(stage.post(1).await);
        // Item 2 either queues behind the fault and is discarded, or
        // is rejected if the fault already landed.
        let _ = stage.post(2).await;

        let error = stage.await_completion().await.unwrap_err();
        assert_eq!(error, FlowError::operation_failed("blech"));
        assert_eq!(stage.state(), StageState::Faulted);
        assert_eq!(processed.load(Ordering::SeqCst), 0);

        // Further posts are rejected.
        assert!(!stage.post(3).await);
    }

    #[tokio::test]
    async fn test_await_completion_multiple_awaiters() {
        let stage = doubling_stage("shared");
        let first = {
            let stage = stage.clone();
            tokio::spawn(async move { stage.await_completion().await })
        };
        let second = {
            let stage = stage.clone();
            tokio::spawn(async move { stage.await_completion().await })
        };

        stage.complete();

        assert_eq!(first.await.expect("task"), Ok(()));
        assert_eq!(second.await.expect("task"), Ok(()));
    }

    #[tokio::test]
    async fn test_external_fault_resolves_completion() {
        let stage = doubling_stage("faulted-externally");
        stage.fault(FlowError::timeout("upstream deadline"));

        let error = stage.await_completion().await.unwrap_err();
        assert_eq!(error.kind(), FlowErrorKind::Timeout);
        // First fault wins.
        stage.fault(FlowError::operation_failed("second"));
        assert_eq!(
            stage.recorded_fault(),
            Some(FlowError::timeout("upstream deadline"))
        );
    }

    #[tokio::test]
    async fn test_cancellation_faults_stage() {
        let token = Arc::new(CancellationToken::new());
        let stage: Arc<Stage<i32, i32>> = Stage::spawn(
            StageConfig::new("cancellable").with_cancellation(token.clone()),
            worker_fn(|i: i32| Ok(i)),
        );

        token.cancel("operator stop");
        // Posts after cancellation are rejected outright.
        assert!(!stage.post(1).await);

        let error = tokio::time::timeout(Duration::from_secs(1), stage.await_completion())
            .await
            .expect("stage should fault promptly")
            .unwrap_err();
        assert_eq!(error.kind(), FlowErrorKind::Cancelled);
    }

    #[tokio::test]
    async fn test_bounded_capacity_backpressure() {
        // A slow consumer with capacity 1: the third post must suspend
        // until the consumer dequeues.
        let gate = Arc::new(tokio::sync::Semaphore::new(0));
        let permits = gate.clone();
        let stage: Arc<Stage<i32, ()>> = Stage::spawn(
            StageConfig::new("slow").with_capacity(1),
            async_worker_fn(move |_i: i32| {
                let permits = permits.clone();
                async move {
                    let _permit = permits.acquire().await.map_err(|e| {
                        FlowError::operation_failed(format!("gate closed: {e}"))
                    })?;
                    Ok(())
                }
            }),
        );

        // First item goes straight to the worker, second fills the queue.
        assert!(stage.post(1).await);
        assert!(stage.post(2).await);

        let blocked = {
            let stage = stage.clone();
            tokio::spawn(async move { stage.post(3).await })
        };
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!blocked.is_finished(), "post should suspend while the queue is full");

        // Releasing the worker drains the queue and unblocks the post.
        gate.add_permits(10);
        assert!(blocked.await.expect("task"));

        stage.complete();
        assert_eq!(stage.await_completion().await, Ok(()));
    }

    #[tokio::test]
    async fn test_concurrent_stage_processes_all_items() {
        let seen = Arc::new(AtomicUsize::new(0));
        let counter = seen.clone();
        let stage: Arc<Stage<i32, ()>> = Stage::spawn(
            StageConfig::new("wide").with_concurrency(4),
            async_worker_fn(move |_i: i32| {
                let counter = counter.clone();
                async move {
                    tokio::time::sleep(Duration::from_millis(1)).await;
                    counter.fetch_add(1, Ordering::SeqCst);
                    Ok(())
                }
            }),
        );

        for i in 0..50 {
            assert!(stage.post(i).await);
        }
        stage.complete();

        assert_eq!(stage.await_completion().await, Ok(()));
        assert_eq!(seen.load(Ordering::SeqCst), 50);
    }

    #[tokio::test]
    async fn test_stage_config_serde_roundtrip() {
        let config = StageConfig::new("serialized")
            .with_capacity(8)
            .with_concurrency(2);
        let json = serde_json::to_string(&config).expect("serialize");
        let back: StageConfig = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(back.name, "serialized");
        assert_eq!(back.capacity, 8);
        assert_eq!(back.concurrency, 2);
        assert!(back.cancel.is_none());
    }
}
