//! Fixed-delay retry policy for transport failures (spec §4.11, §7).
//!
//! Adapted from the teacher's `resilience::backoff::ExponentialBackoff`:
//! same attempt-counting shape, but §7 calls for a constant 3-second delay
//! rather than exponential growth, so there is no multiplier or max-delay
//! clamp here — just an attempt cap.

use std::time::Duration;

#[derive(Debug, Clone, Copy)]
pub struct RetryConfig {
    pub max_attempts: usize,
    pub delay: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 10,
            delay: Duration::from_secs(3),
        }
    }
}

/// Tracks attempt count for one failing operation; `next_delay` returns
/// `None` once `max_attempts` is exhausted, at which point the caller
/// should give up and surface the underlying error.
pub struct FixedBackoff {
    config: RetryConfig,
    attempt: usize,
}

impl FixedBackoff {
    pub fn new() -> Self {
        Self::with_config(RetryConfig::default())
    }

    pub fn with_config(config: RetryConfig) -> Self {
        Self { config, attempt: 0 }
    }

    /// Returns the delay before the next attempt, advancing internal state,
    /// or `None` if `max_attempts` has been reached.
    pub fn next_delay(&mut self) -> Option<Duration> {
        if self.attempt >= self.config.max_attempts {
            return None;
        }
        self.attempt += 1;
        Some(self.config.delay)
    }

    pub fn attempt_number(&self) -> usize {
        self.attempt
    }

    pub fn can_retry(&self) -> bool {
        self.attempt < self.config.max_attempts
    }

    pub fn reset(&mut self) {
        self.attempt = 0;
    }
}

impl Default for FixedBackoff {
    fn default() -> Self {
        Self::new()
    }
}

/// Whether a reconciler error kind should ever be retried, per §7 policy:
/// transport failures retry, rejected orders never do.
pub fn is_retryable(kind: &crate::error::ReconcilerErrorKind) -> bool {
    use crate::error::ReconcilerErrorKind::*;
    match kind {
        JsonError(_) | CheckForFillsError(_) | UpdateFailed(_) | NullResponse => true,
        UpdateRejected | OrderError(_) | OrderAlreadyFilled | PendingOrderNotReturned
        | UnknownIdResolution(_) | ContingentOrderError(_) | ContingentOrderFailed(_)
        | OneOrderPerSymbol | RefreshSession | UnknownOrderId(_) => false,
    }
}

/// Executes `op` with the fixed-delay policy above, sleeping between
/// attempts with `tokio::time::sleep`. Returns the last error if every
/// attempt failed and the error was never retryable to begin with (a
/// non-retryable error short-circuits on its first occurrence).
pub async fn retry_async<F, Fut, T, E>(config: RetryConfig, mut op: F) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<T, E>>,
{
    let mut backoff = FixedBackoff::with_config(config);
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(err) => match backoff.next_delay() {
                Some(delay) => tokio::time::sleep(delay).await,
                None => return Err(err),
            },
        }
    }
}
