// ABOUTME: Fixed insertion-latency pause between batches and tables
// ABOUTME: A constant delay that gives way to cancellation

use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Fixed post-batch delay.
///
/// Not adaptive: every pause is the same length regardless of observed
/// latency. A zero delay never sleeps.
#[derive(Debug, Clone, Copy, Default)]
pub struct RateLimiter {
    delay: Duration,
}

impl RateLimiter {
    pub fn new(delay: Duration) -> Self {
        Self { delay }
    }

    /// Sleep for the configured delay.
    ///
    /// Returns `false` when `cancel` fired before or during the pause.
    pub async fn pause(&self, cancel: &CancellationToken) -> bool {
        if cancel.is_cancelled() {
            return false;
        }
        if self.delay.is_zero() {
            return true;
        }

        tokio::select! {
            _ = cancel.cancelled() => false,
            _ = tokio::time::sleep(self.delay) => true,
        }
    }
}
