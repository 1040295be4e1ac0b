//! Error types for flowlink pipelines and orchestration helpers.
//!
//! Every outcome that crosses a stage or helper boundary is a
//! [`FlowResult`], and every failure is a [`FlowError`]. Faults are
//! propagated verbatim across links, so `FlowError` is cheap to clone.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result alias used throughout the crate.
pub type FlowResult<T> = Result<T, FlowError>;

/// The failure taxonomy for flowlink operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FlowError {
    /// A worker function or wrapped operation failed.
    #[error("operation failed: {0}")]
    OperationFailed(String),

    /// A deadline elapsed before the operation resolved.
    #[error("operation timed out: {0}")]
    Timeout(String),

    /// A cooperative cancellation signal was observed.
    #[error("operation cancelled: {0}")]
    Cancelled(String),

    /// Several independent failures collected in submission order.
    ///
    /// Invariant: the child list is never empty.
    #[error("{} operations failed", .children.len())]
    Aggregate {
        /// The child failures, in submission order.
        children: Vec<FlowError>,
    },
}

/// Discriminant of a [`FlowError`], convenient for assertions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FlowErrorKind {
    /// A worker or operation failure.
    OperationFailed,
    /// A deadline elapsed.
    Timeout,
    /// A cancellation signal was observed.
    Cancelled,
    /// Multiple collected failures.
    Aggregate,
}

impl FlowError {
    /// Creates an operation failure with a message.
    #[must_use]
    pub fn operation_failed(message: impl Into<String>) -> Self {
        Self::OperationFailed(message.into())
    }

    /// Creates a timeout failure with a message.
    #[must_use]
    pub fn timeout(message: impl Into<String>) -> Self {
        Self::Timeout(message.into())
    }

    /// Creates a cancellation failure with a message.
    #[must_use]
    pub fn cancelled(message: impl Into<String>) -> Self {
        Self::Cancelled(message.into())
    }

    /// Creates a cancellation failure carrying a token's recorded reason.
    #[must_use]
    pub fn cancelled_by(token: &crate::cancellation::CancellationToken) -> Self {
        Self::Cancelled(
            token
                .reason()
                .unwrap_or_else(|| "cancellation requested".to_string()),
        )
    }

    /// Creates an aggregate failure from child failures.
    ///
    /// The child list must be non-empty and is kept in submission order.
    #[must_use]
    pub fn aggregate(children: Vec<FlowError>) -> Self {
        debug_assert!(!children.is_empty(), "aggregate requires child failures");
        Self::Aggregate { children }
    }

    /// Returns the kind of this error.
    #[must_use]
    pub fn kind(&self) -> FlowErrorKind {
        match self {
            Self::OperationFailed(_) => FlowErrorKind::OperationFailed,
            Self::Timeout(_) => FlowErrorKind::Timeout,
            Self::Cancelled(_) => FlowErrorKind::Cancelled,
            Self::Aggregate { .. } => FlowErrorKind::Aggregate,
        }
    }

    /// Returns the child failures (empty for non-aggregate kinds).
    #[must_use]
    pub fn children(&self) -> &[FlowError] {
        match self {
            Self::Aggregate { children } => children,
            _ => &[],
        }
    }

    /// Returns the first non-aggregate failure in depth-first order.
    ///
    /// For leaf kinds this is the error itself.
    #[must_use]
    pub fn first_leaf(&self) -> &FlowError {
        match self {
            Self::Aggregate { children } => children
                .first()
                .map_or(self, FlowError::first_leaf),
            _ => self,
        }
    }

    /// Whether this error (or its first leaf) is a cancellation.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled(_))
    }

    /// Whether this error is a timeout.
    #[must_use]
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout(_))
    }
}
