//! Minimum-interval rate limiter for recognition calls.
//!
//! The limiter remembers when the previous call *started*. A caller asking
//! for a slot before the interval has elapsed waits out the remainder. It is
//! an owned value mutated through `&mut self`; sharing one across concurrent
//! pages would need external serialisation.

use std::time::Duration;
use tokio::time::{sleep, Instant};
use tracing::debug;

#[derive(Debug)]
pub struct RateLimiter {
    min_interval: Duration,
    last_call: Option<Instant>,
}

impl RateLimiter {
    pub fn new(min_interval: Duration) -> Self {
        Self {
            min_interval,
            last_call: None,
        }
    }

    pub fn from_millis(ms: u64) -> Self {
        Self::new(Duration::from_millis(ms))
    }

    /// Time left before the next call may start.
    pub fn remaining(&self) -> Duration {
        match self.last_call {
            Some(last) => self.min_interval.saturating_sub(last.elapsed()),
            None => Duration::ZERO,
        }
    }

    /// Wait until a call may start, then mark the call as started.
    pub async fn acquire(&mut self) {
        let wait = self.remaining();
        if !wait.is_zero() {
            debug!("Rate limiting: waiting {}ms before next API call", wait.as_millis());
            sleep(wait).await;
        }
        self.last_call = Some(Instant::now());
    }

    pub fn interval(&self) -> Duration {
        self.min_interval
    }

    pub fn set_interval(&mut self, interval: Duration) {
        self.min_interval = interval;
    }
}
