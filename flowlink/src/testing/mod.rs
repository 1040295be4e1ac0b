//! Testing utilities for flowlink pipelines.
//!
//! This module provides hand-rolled mocks for the external
//! collaborators the crate is specified against.

mod mocks;

pub use mocks::{MockFetcher, RecordingWorker};
