//! Request pacing.
//!
//! A single [`RateLimiter`] is shared by every outbound request in a run,
//! including browser navigations, so the site never sees two requests closer
//! together than the configured delay.

use std::time::Duration;

use rand::Rng;
use tokio::sync::Mutex;
use tokio::time::Instant;

#[derive(Debug)]
pub struct RateLimiter {
    min_delay: Duration,
    jitter: Duration,
    last: Mutex<Option<Instant>>,
}

impl RateLimiter {
    pub fn new(min_delay: Duration) -> Self {
        Self {
            min_delay,
            jitter: Duration::ZERO,
            last: Mutex::new(None),
        }
    }

    /// Limiter that never sleeps.
    pub fn disabled() -> Self {
        Self::new(Duration::ZERO)
    }

    /// Add up to `jitter` of uniformly random extra delay per request.
    pub fn with_jitter(mut self, jitter: Duration) -> Self {
        self.jitter = jitter;
        self
    }

    pub fn min_delay(&self) -> Duration {
        self.min_delay
    }

    pub fn jitter(&self) -> Duration {
        self.jitter
    }

    /// Block until the next request may go out, then claim the slot.
    ///
    /// The lock is held across the sleep so concurrent callers queue up
    /// behind each other. Returns how long this call slept.
    pub async fn wait(&self) -> Duration {
        let mut last = self.last.lock().await;

        let spacing = self.min_delay + self.sample_jitter();
        let slept = match *last {
            Some(previous) => {
                let ready_at = previous + spacing;
                let now = Instant::now();
                if ready_at > now {
                    tokio::time::sleep_until(ready_at).await;
                    ready_at - now
                } else {
                    Duration::ZERO
                }
            }
            None => Duration::ZERO,
        };

        if !slept.is_zero() {
            log::debug!("rate limiter slept {:.2}s", slept.as_secs_f64());
        }
        *last = Some(Instant::now());
        slept
    }

    /// Forget the previous request; the next `wait` returns immediately.
    pub async fn reset(&self) {
        *self.last.lock().await = None;
    }

    fn sample_jitter(&self) -> Duration {
        if self.jitter.is_zero() {
            return Duration::ZERO;
        }
        let max = self.jitter.as_secs_f64();
        Duration::from_secs_f64(rand::thread_rng().gen_range(0.0..=max))
    }
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new(Duration::from_secs(3))
    }
}
