//! Minimum-interval request throttle.
//!
//! goodinfo.tw blocks clients that fire requests back to back, so every
//! request waits until at least `interval` has passed since the previous one.

use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::debug;

/// Spaces out requests by a fixed minimum interval.
#[derive(Debug)]
pub struct RequestInterval {
    interval: Duration,
    last: Mutex<Option<Instant>>,
    name: String,
}

impl RequestInterval {
    /// Create a throttle.
    ///
    /// # Arguments
    /// * `name` - Name for logging purposes
    /// * `interval` - Minimum gap between two requests
    pub fn new(name: impl Into<String>, interval: Duration) -> Self {
        Self {
            interval,
            last: Mutex::new(None),
            name: name.into(),
        }
    }

    /// Create a throttle from a millisecond interval.
    pub fn from_millis(name: impl Into<String>, millis: u64) -> Self {
        Self::new(name, Duration::from_millis(millis))
    }

    /// The configured interval.
    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Wait until a request may be sent, then record it.
    ///
    /// The lock is held across the sleep so concurrent callers queue up.
    pub async fn acquire(&self) {
        let mut last = self.last.lock().await;

        if let Some(previous) = *last {
            let elapsed = previous.elapsed();
            if elapsed < self.interval {
                let wait = self.interval - elapsed;
                debug!(
                    limiter = %self.name,
                    wait_ms = wait.as_millis() as u64,
                    "Throttling request"
                );
                tokio::time::sleep(wait).await;
            }
        }

        *last = Some(Instant::now());
    }
}
