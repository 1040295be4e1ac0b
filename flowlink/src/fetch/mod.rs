//! Abstract fetching and fetch orchestration helpers.
//!
//! [`Fetcher`] stands in for network I/O; the helpers here compose it
//! with the retry and timeout machinery. A concrete reqwest-backed
//! implementation is available behind the `http` feature.

#[cfg(feature = "http")]
mod http;

#[cfg(feature = "http")]
pub use http::HttpFetcher;

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

use crate::errors::FlowResult;
use crate::retry::{run_with_retry, RetryPolicy};
use crate::timeout::{gather, race_against_timeout};

/// Capability for fetching remote content by URL.
#[async_trait]
pub trait Fetcher: Send + Sync {
    /// Fetches the content at `url`.
    async fn fetch(&self, url: &str) -> FlowResult<Vec<u8>>;
}

/// Fetches `url`, retrying transient failures under `policy`.
///
/// The final attempt's error is surfaced unchanged.
pub async fn fetch_with_retries(
    fetcher: &dyn Fetcher,
    url: &str,
    policy: &RetryPolicy,
) -> FlowResult<Vec<u8>> {
    run_with_retry(policy, None, || fetcher.fetch(url)).await
}

/// Fetches `url`, failing with a timeout if `timeout` elapses first.
///
/// A fetch that outlives the deadline finishes detached in the
/// background; its result is discarded.
pub async fn fetch_with_timeout(
    fetcher: Arc<dyn Fetcher>,
    url: impl Into<String>,
    timeout: Duration,
) -> FlowResult<Vec<u8>> {
    let url = url.into();
    race_against_timeout(async move { fetcher.fetch(&url).await }, timeout).await
}

/// Fetches every URL concurrently with a per-URL timeout.
///
/// Successes come back in submission order. All fetches are awaited
/// even when some fail; a single failure is surfaced unchanged and
/// multiple failures are aggregated in submission order.
pub async fn fetch_all_with_timeout(
    fetcher: Arc<dyn Fetcher>,
    urls: Vec<String>,
    timeout: Duration,
) -> FlowResult<Vec<Vec<u8>>> {
    let ops: Vec<_> = urls
        .into_iter()
        .map(|url| {
            let fetcher = Arc::clone(&fetcher);
            async move { fetch_with_timeout(fetcher, url, timeout).await }
        })
        .collect();
    gather(ops).await
}
