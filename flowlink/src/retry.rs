//! Retry execution with exponential backoff and cooperative cancellation.
//!
//! [`run_with_retry`] wraps a fallible async operation and re-runs it
//! until it succeeds or the attempt budget is exhausted. The final
//! attempt's error is returned unchanged, never wrapped.

use rand::Rng;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::time::Duration;
use tracing::debug;

use crate::cancellation::CancellationToken;
use crate::errors::{FlowError, FlowResult};

/// Configuration for retry behavior.
///
/// `max_attempts` counts total invocations, including the first, so
/// the invocation count is exact: a policy with `max_attempts = 3`
/// runs the operation at most three times.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Maximum attempts, including the initial one. Minimum 1.
    pub max_attempts: usize,
    /// Delay before the first retry in milliseconds.
    pub initial_delay_ms: u64,
    /// Cap applied to the growing delay in milliseconds.
    pub max_delay_ms: u64,
    /// Multiplier applied to the delay after each failed attempt. Minimum 1.0.
    pub backoff_factor: f64,
    /// Whether to randomize each delay between zero and its nominal value.
    pub jitter: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay_ms: 1000,
            max_delay_ms: 30000,
            backoff_factor: 2.0,
            jitter: false,
        }
    }
}

impl RetryPolicy {
    /// Creates a new retry policy with default settings.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the maximum attempts.
    #[must_use]
    pub fn with_max_attempts(mut self, attempts: usize) -> Self {
        self.max_attempts = attempts;
        self
    }

    /// Sets the initial delay.
    #[must_use]
    pub fn with_initial_delay_ms(mut self, delay: u64) -> Self {
        self.initial_delay_ms = delay;
        self
    }

    /// Sets the maximum delay cap.
    #[must_use]
    pub fn with_max_delay_ms(mut self, delay: u64) -> Self {
        self.max_delay_ms = delay;
        self
    }

    /// Sets the backoff factor.
    #[must_use]
    pub fn with_backoff_factor(mut self, factor: f64) -> Self {
        self.backoff_factor = factor;
        self
    }

    /// Enables or disables jitter.
    #[must_use]
    pub fn with_jitter(mut self, jitter: bool) -> Self {
        self.jitter = jitter;
        self
    }

    /// Returns the nominal delay before the retry following `failed_attempts`
    /// failures, before jitter.
    #[must_use]
    pub fn delay_for(&self, failed_attempts: usize) -> Duration {
        let factor = self.backoff_factor.max(1.0);
        let exponent = failed_attempts.saturating_sub(1) as i32;
        let scaled = (self.initial_delay_ms as f64) * factor.powi(exponent);
        let capped = scaled.min(self.max_delay_ms as f64);
        Duration::from_millis(capped as u64)
    }

    /// Applies jitter to a nominal delay, if enabled.
    #[must_use]
    pub fn apply_jitter(&self, delay: Duration) -> Duration {
        if !self.jitter || delay.is_zero() {
            return delay;
        }
        let millis = delay.as_millis() as u64;
        Duration::from_millis(rand::thread_rng().gen_range(0..=millis))
    }
}

/// Runs `op` under `policy`, retrying failed attempts with backoff.
///
/// On `Ok` the value is returned immediately. After `max_attempts`
/// failures the last error is returned unchanged. Cancellation is
/// observed before each attempt and during backoff sleeps, surfacing
/// as [`FlowError::Cancelled`]; this function never originates
/// cancellation itself.
pub async fn run_with_retry<T, F, Fut>(
    policy: &RetryPolicy,
    cancel: Option<&CancellationToken>,
    mut op: F,
) -> FlowResult<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = FlowResult<T>>,
{
    let attempts = policy.max_attempts.max(1);
    let mut last_err: Option<FlowError> = None;

    for attempt in 1..=attempts {
        if let Some(token) = cancel {
            if token.is_cancelled() {
                return Err(FlowError::cancelled_by(token));
            }
        }

        match op().await {
            Ok(value) => return Ok(value),
            Err(error) => {
                debug!(attempt, max_attempts = attempts, %error, "retry attempt failed");
                last_err = Some(error);
            }
        }

        if attempt < attempts {
            let delay = policy.apply_jitter(policy.delay_for(attempt));
            match cancel {
                Some(token) => {
                    tokio::select! {
                        () = token.cancelled() => return Err(FlowError::cancelled_by(token)),
                        () = tokio::time::sleep(delay) => {}
                    }
                }
                None => tokio::time::sleep(delay).await,
            }
        }
    }

    Err(last_err.unwrap_or_else(|| FlowError::operation_failed("retry budget exhausted")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::FlowErrorKind;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[test]
    fn test_policy_builders() {
        let policy = RetryPolicy::new()
            .with_max_attempts(5)
            .with_initial_delay_ms(100)
            .with_max_delay_ms(400)
            .with_backoff_factor(2.0)
            .with_jitter(false);

        assert_eq!(policy.max_attempts, 5);
        assert_eq!(policy.delay_for(1), Duration::from_millis(100));
        assert_eq!(policy.delay_for(2), Duration::from_millis(200));
        assert_eq!(policy.delay_for(3), Duration::from_millis(400));
        // Capped at max_delay_ms
        assert_eq!(policy.delay_for(4), Duration::from_millis(400));
    }

    #[tokio::test(start_paused = true)]
    async fn test_succeeds_after_two_failures() {
        let policy = RetryPolicy::new().with_max_attempts(3).with_initial_delay_ms(10);
        let invocations = Arc::new(AtomicUsize::new(0));
        let counter = invocations.clone();

        let result = run_with_retry(&policy, None, move || {
            let counter = counter.clone();
            async move {
                let n = counter.fetch_add(1, Ordering::SeqCst) + 1;
                if n < 3 {
                    Err(FlowError::operation_failed(format!("attempt {n}")))
                } else {
                    Ok(n)
                }
            }
        })
        .await;

        assert_eq!(result, Ok(3));
        assert_eq!(invocations.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhausted_attempts_return_last_error_unchanged() {
        // max_attempts counts total invocations, no extras.
        let policy = RetryPolicy::new().with_max_attempts(4).with_initial_delay_ms(10);
        let invocations = Arc::new(AtomicUsize::new(0));
        let counter = invocations.clone();

        let result: FlowResult<()> = run_with_retry(&policy, None, move || {
            let counter = counter.clone();
            async move {
                let n = counter.fetch_add(1, Ordering::SeqCst) + 1;
                Err(FlowError::operation_failed(format!("attempt {n}")))
            }
        })
        .await;

        assert_eq!(result, Err(FlowError::operation_failed("attempt 4")));
        assert_eq!(invocations.load(Ordering::SeqCst), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancellation_before_attempt() {
        let policy = RetryPolicy::new().with_max_attempts(3);
        let token = CancellationToken::new();
        token.cancel("shutting down");

        let invocations = Arc::new(AtomicUsize::new(0));
        let counter = invocations.clone();

        let result: FlowResult<()> = run_with_retry(&policy, Some(&token), move || {
            let counter = counter.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Err(FlowError::operation_failed("never returned"))
            }
        })
        .await;

        assert_eq!(result.unwrap_err().kind(), FlowErrorKind::Cancelled);
        assert_eq!(invocations.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_cancellation_interrupts_backoff_sleep() {
        let policy = RetryPolicy::new()
            .with_max_attempts(2)
            .with_initial_delay_ms(60_000);
        let token = Arc::new(CancellationToken::new());

        {
            let token = token.clone();
            tokio::spawn(async move {
                tokio::time::sleep(Duration::from_millis(20)).await;
                token.cancel("impatient");
            });
        }

        let started = std::time::Instant::now();
        let result: FlowResult<()> = run_with_retry(&policy, Some(token.as_ref()), || async {
            Err(FlowError::operation_failed("always"))
        })
        .await;

        assert_eq!(result.unwrap_err().kind(), FlowErrorKind::Cancelled);
        assert!(started.elapsed() < Duration::from_secs(5));
    }
}
