//! Bounded retry policies for the device flow and API-key refresh.
//!
//! Two loop shapes are needed:
//! - [`RetryPolicy::poll`]: an operation that may report "not yet" (`Ok(None)`)
//!   is re-run after `interval`; any error aborts at once.
//! - [`RetryPolicy::retry`]: any error is retried until attempts run out.
//!
//! Sleeps go through `tokio::time`, so a paused test runtime drives them.

use copilink_types::{CopilinkError, traits::Result};
use std::{future::Future, time::Duration};

/// Maximum attempts plus the fixed pause between them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub interval: Duration,
}

impl RetryPolicy {
    #[must_use]
    pub const fn new(max_attempts: u32, interval: Duration) -> Self {
        Self {
            max_attempts,
            interval,
        }
    }

    /// Attempts actually made; a zero budget still runs once.
    fn attempts(self) -> u32 {
        self.max_attempts.max(1)
    }

    /// Runs `op` until it yields a value, sleeping `interval` after every
    /// pending result.
    ///
    /// # Errors
    ///
    /// Returns the first error `op` produces, or [`CopilinkError::Auth`] when
    /// every attempt came back pending.
    pub async fn poll<T, F, Fut>(self, what: &str, mut op: F) -> Result<T>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<Option<T>>>,
    {
        let attempts = self.attempts();
        for attempt in 1..=attempts {
            if let Some(value) = op(attempt).await? {
                return Ok(value);
            }
            tracing::debug!(what, attempt, "still pending");
            if attempt < attempts {
                tokio::time::sleep(self.interval).await;
            }
        }
        Err(CopilinkError::Auth(format!(
            "{what} timed out after {attempts} polls"
        )))
    }

    /// Runs `op` until it succeeds, sleeping `interval` between failures.
    ///
    /// # Errors
    ///
    /// Returns [`CopilinkError::Auth`] carrying the last failure once all
    /// attempts are spent.
    pub async fn retry<T, F, Fut>(self, what: &str, mut op: F) -> Result<T>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let attempts = self.attempts();
        let mut last = None;
        for attempt in 1..=attempts {
            match op(attempt).await {
                Ok(value) => return Ok(value),
                Err(e) => {
                    tracing::warn!(what, attempt, max_attempts = attempts, error = %e, "attempt failed");
                    last = Some(e);
                }
            }
            if attempt < attempts && !self.interval.is_zero() {
                tokio::time::sleep(self.interval).await;
            }
        }
        let reason = last.map_or_else(|| "no attempts made".to_string(), |e| e.to_string());
        Err(CopilinkError::Auth(format!(
            "{what} failed after {attempts} attempts: {reason}"
        )))
    }
}
