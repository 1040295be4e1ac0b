//! Cooperative cancellation primitives.

mod token;

pub use token::{CancelCallback, CancellationToken};
