//! Retry scheduling for transient tool failures.
//!
//! [`RetryPolicy::run`] re-invokes an action until it succeeds or the attempt
//! budget is spent, waiting `attempt * step` between attempts. The wrapper
//! keeps no state about the action, so actions must be safe to re-run.
//! Errors for which [`is_retryable`](crate::error::AcquireError::is_retryable)
//! is false end the loop at once.
//!
//! With the `retry` feature disabled every action runs exactly once; callers
//! see the same signature either way.

use crate::error::Result;
use std::time::Duration;

/// Default number of attempts, including the first.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 4;

/// Default step of the linear backoff schedule.
pub const DEFAULT_BACKOFF_STEP: Duration = Duration::from_secs(1);

/// A bounded, linear retry schedule.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    max_attempts: u32,
    step: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::linear(DEFAULT_MAX_ATTEMPTS, DEFAULT_BACKOFF_STEP)
    }
}

impl RetryPolicy {
    /// A policy making at most `max_attempts` attempts, waiting `n * step`
    /// after the `n`th failure. A budget of zero is treated as one attempt.
    #[must_use]
    pub const fn linear(max_attempts: u32, step: Duration) -> Self {
        Self {
            max_attempts: if max_attempts == 0 { 1 } else { max_attempts },
            step,
        }
    }

    /// Total attempts allowed, including the first.
    #[must_use]
    pub const fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Delay after the given (one-based) failed attempt.
    #[must_use]
    pub fn delay_after(&self, failed_attempt: u32) -> Duration {
        self.step.saturating_mul(failed_attempt)
    }

    /// Run `action` under this policy, naming it `what` in retry logs.
    ///
    /// # Errors
    ///
    /// Returns the error from the last attempt, unchanged, once the attempt
    /// budget is exhausted, or the first error that is not retryable.
    #[cfg(feature = "retry")]
    pub fn run<T, F>(&self, what: &str, mut action: F) -> Result<T>
    where
        F: FnMut() -> Result<T>,
    {
        let schedule = LinearBackoff {
            policy: *self,
            failures: 0,
        };
        let op = || {
            action().map_err(|err| {
                if err.is_retryable() {
                    backoff::Error::transient(err)
                } else {
                    backoff::Error::permanent(err)
                }
            })
        };
        let notify = |err: crate::error::AcquireError, delay: Duration| {
            log::warn!("failed to {what}: {err}. Retrying in {delay:?}.");
        };
        backoff::retry_notify(schedule, op, notify).map_err(|err| match err {
            backoff::Error::Permanent(err) | backoff::Error::Transient { err, .. } => err,
        })
    }

    /// Run `action` once; retries need the `retry` feature.
    ///
    /// # Errors
    ///
    /// Returns the action's error unchanged.
    #[cfg(not(feature = "retry"))]
    pub fn run<T, F>(&self, what: &str, mut action: F) -> Result<T>
    where
        F: FnMut() -> Result<T>,
    {
        log::trace!("running {what} without retries");
        action()
    }
}

#[cfg(feature = "retry")]
struct LinearBackoff {
    policy: RetryPolicy,
    failures: u32,
}

#[cfg(feature = "retry")]
impl backoff::backoff::Backoff for LinearBackoff {
    fn reset(&mut self) {
        self.failures = 0;
    }

    fn next_backoff(&mut self) -> Option<Duration> {
        self.failures = self.failures.saturating_add(1);
        (self.failures < self.policy.max_attempts).then(|| self.policy.delay_after(self.failures))
    }
}
