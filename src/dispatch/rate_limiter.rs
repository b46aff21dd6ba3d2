use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// Global send pacing: at most `R` sends per second across every caller.
///
/// The lock is held from the interval check through the pacing sleep and the
/// `last_sent_at` update, so concurrent callers pass the gate strictly one at
/// a time, each at least `1/R` seconds after the previous one.
#[derive(Debug)]
pub struct RateLimiter {
    interval: Duration,
    last_sent_at: Mutex<Option<Instant>>,
}

impl RateLimiter {
    pub fn new(sends_per_second: u32) -> Self {
        let per_second = sends_per_second.max(1);
        Self {
            interval: Duration::from_secs(1) / per_second,
            last_sent_at: Mutex::new(None),
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Wait until the next send slot and claim it, returning the slot time.
    ///
    /// Returns `None` without claiming a slot if `cancel` fires first.
    pub async fn acquire(&self, cancel: &CancellationToken) -> Option<Instant> {
        let mut last_sent_at = tokio::select! {
            guard = self.last_sent_at.lock() => guard,
            _ = cancel.cancelled() => return None,
        };

        if let Some(last) = *last_sent_at {
            let elapsed = last.elapsed();
            if elapsed < self.interval {
                let wait = self.interval - elapsed;
                log::trace!("rate limiter: pacing for {:?}", wait);
                tokio::select! {
                    _ = tokio::time::sleep(wait) => {}
                    _ = cancel.cancelled() => return None,
                }
            }
        }

        let slot = Instant::now();
        *last_sent_at = Some(slot);
        Some(slot)
    }
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new(5)
    }
}
