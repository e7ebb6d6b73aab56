//! Fixed-delay retry for transient upstream failures.
//!
//! Only errors for which [`Error::is_transient`] holds are retried. Anything
//! else (bad credentials, malformed replies, missing models) is returned on
//! the first attempt.

use std::future::Future;
use std::time::Duration;

use tracing::{debug, warn};

use crate::{Error, Result};

/// How many times to try an operation and how long to wait in between.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first one. Never less than 1.
    pub max_attempts: u32,
    /// Pause between consecutive attempts. Not applied after the last one.
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: crate::defaults::MODEL_RETRIES,
            delay: Duration::from_millis(crate::defaults::MODEL_RETRY_DELAY_MS),
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            delay,
        }
    }

    /// Run `op` until it succeeds, fails permanently, or attempts run out.
    pub async fn run<T, F, Fut>(&self, label: &str, op: F) -> Result<T>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        self.run_unless(label, || false, op).await
    }

    /// Like [`run`](Self::run), but gives up with [`Error::Cancelled`] when
    /// `cancelled` returns true before an attempt.
    pub async fn run_unless<T, F, Fut, C>(&self, label: &str, cancelled: C, mut op: F) -> Result<T>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T>>,
        C: Fn() -> bool,
    {
        let attempts = self.max_attempts.max(1);
        let mut attempt = 1;
        loop {
            if cancelled() {
                return Err(Error::Cancelled);
            }
            match op(attempt).await {
                Ok(value) => {
                    if attempt > 1 {
                        debug!(op = label, attempt, "Succeeded after retry");
                    }
                    return Ok(value);
                }
                Err(e) if e.is_transient() && attempt < attempts => {
                    warn!(
                        op = label,
                        attempt,
                        max_attempts = attempts,
                        error = %e,
                        "Transient failure, retrying"
                    );
                    tokio::time::sleep(self.delay).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}
