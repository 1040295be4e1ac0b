//! Mock collaborators for testing.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use crate::errors::{FlowError, FlowResult};
use crate::fetch::Fetcher;
use crate::stage::Worker;

#[derive(Clone, Default)]
struct MockResponse {
    body: Option<Vec<u8>>,
    delay: Option<Duration>,
    failures_remaining: usize,
}

/// A scriptable [`Fetcher`] that records calls.
///
/// Each URL can be configured to fail a number of times before
/// returning a canned body, optionally after a simulated delay.
#[derive(Default)]
pub struct MockFetcher {
    responses: Mutex<HashMap<String, MockResponse>>,
    calls: Mutex<HashMap<String, usize>>,
}

impl MockFetcher {
    /// Creates a mock with no scripted responses.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Scripts a successful response for `url`.
    pub fn respond(&self, url: impl Into<String>, body: Vec<u8>) {
        let mut responses = self.responses.lock();
        responses.entry(url.into()).or_default().body = Some(body);
    }

    /// Scripts a successful response delivered after `delay`.
    pub fn respond_after(&self, url: impl Into<String>, body: Vec<u8>, delay: Duration) {
        let mut responses = self.responses.lock();
        let entry = responses.entry(url.into()).or_default();
        entry.body = Some(body);
        entry.delay = Some(delay);
    }

    /// Scripts the next `count` calls for `url` to fail.
    pub fn fail_times(&self, url: impl Into<String>, count: usize) {
        let mut responses = self.responses.lock();
        responses.entry(url.into()).or_default().failures_remaining = count;
    }

    /// Returns how many times `url` was fetched.
    #[must_use]
    pub fn call_count(&self, url: &str) -> usize {
        self.calls.lock().get(url).copied().unwrap_or(0)
    }
}

#[async_trait]
impl Fetcher for MockFetcher {
    async fn fetch(&self, url: &str) -> FlowResult<Vec<u8>> {
        *self.calls.lock().entry(url.to_string()).or_insert(0) += 1;

        let (delay, outcome) = {
            let mut responses = self.responses.lock();
            let Some(entry) = responses.get_mut(url) else {
                return Err(FlowError::operation_failed(format!(
                    "no scripted response for {url}"
                )));
            };
            if entry.failures_remaining > 0 {
                entry.failures_remaining = entry.failures_remaining.saturating_sub(1);
                (None, Err(FlowError::operation_failed(format!("scripted failure for {url}"))))
            } else {
                match &entry.body {
                    Some(body) => (entry.delay, Ok(body.clone())),
                    None => (
                        None,
                        Err(FlowError::operation_failed(format!(
                            "no scripted body for {url}"
                        ))),
                    ),
                }
            }
        };

        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        outcome
    }
}

/// A [`Worker`] that records every item it processes.
pub struct RecordingWorker<T> {
    items: Arc<Mutex<Vec<T>>>,
}

impl<T> Default for RecordingWorker<T> {
    fn default() -> Self {
        Self {
            items: Arc::new(Mutex::new(Vec::new())),
        }
    }
}

impl<T> RecordingWorker<T> {
    /// Creates a new recording worker.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the items processed so far.
    #[must_use]
    pub fn recorded(&self) -> Vec<T>
    where
        T: Clone,
    {
        self.items.lock().clone()
    }

    /// Returns the number of items processed so far.
    #[must_use]
    pub fn count(&self) -> usize {
        self.items.lock().len()
    }

    /// Returns a handle that shares this worker's record.
    #[must_use]
    pub fn handle(&self) -> Arc<Mutex<Vec<T>>> {
        Arc::clone(&self.items)
    }
}

#[async_trait]
impl<T> Worker<T, T> for RecordingWorker<T>
where
    T: Clone + Send + Sync + 'static,
{
    async fn process(&self, item: T) -> FlowResult<T> {
        self.items.lock().push(item.clone());
        Ok(item)
    }
}
