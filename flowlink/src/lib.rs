//! # Flowlink
//!
//! Linked-stage processing pipelines with backpressure, completion
//! propagation, and error aggregation, plus async orchestration
//! helpers:
//!
//! - **Stages**: queued processing units wired into fan-out/fan-in
//!   graphs by links; bounded queues throttle the whole graph
//! - **Completion propagation**: completing or faulting a stage
//!   automatically completes or faults its linked downstreams
//! - **Retry and timeout**: exponential backoff with cooperative
//!   cancellation, and deadline racing that never leaks the loser
//! - **Data parallelism**: partitioned folds combined into a single
//!   result, parallel for-each, and parallel invocation
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use flowlink::prelude::*;
//!
//! let multiply = Stage::spawn(StageConfig::new("multiply"), worker_fn(|i: i32| Ok(i * 2)));
//! let subtract = Stage::spawn(StageConfig::new("subtract"), worker_fn(|i: i32| Ok(i - 2)));
//!
//! multiply.link_to(subtract.clone(), LinkOptions::new().with_propagate_completion(true));
//!
//! multiply.post(21).await;
//! multiply.complete();
//! subtract.await_completion().await?;
//! ```

#![forbid(unsafe_code)]
#![warn(
    clippy::all,
    clippy::pedantic,
    missing_docs,
    rust_2018_idioms
)]
#![allow(
    clippy::module_name_repetitions,
    clippy::must_use_candidate,
    clippy::missing_errors_doc,
    clippy::missing_panics_doc
)]

pub mod cancellation;
pub mod errors;
pub mod fetch;
pub mod observability;
pub mod parallel;
pub mod progress;
pub mod retry;
pub mod stage;
pub mod testing;
pub mod timeout;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::cancellation::CancellationToken;
    pub use crate::errors::{FlowError, FlowErrorKind, FlowResult};
    pub use crate::fetch::{
        fetch_all_with_timeout, fetch_with_retries, fetch_with_timeout, Fetcher,
    };
    pub use crate::parallel::{ForEachOutcome, LoopState};
    pub use crate::progress::{
        CollectingProgressSink, LoggingProgressSink, NoOpProgressSink, ProgressSink,
    };
    pub use crate::retry::{run_with_retry, RetryPolicy};
    pub use crate::stage::{
        async_worker_fn, worker_fn, LinkHandle, LinkOptions, Stage, StageConfig, StageId,
        StageInput, StageMetrics, StageState, Worker,
    };
    pub use crate::timeout::{delay_result, gather, race_against_timeout, race_many};

    #[cfg(feature = "http")]
    pub use crate::fetch::HttpFetcher;
}
