//! Client-side sliding-window rate limiter

use parking_lot::Mutex;
use std::collections::VecDeque;
use std::time::Duration;
use tokio::time::Instant;
use tracing::debug;

pub const DEFAULT_MAX_REQUESTS: usize = 50;
pub const DEFAULT_WINDOW: Duration = Duration::from_secs(60);

/// Allows at most `max_requests` acquisitions in any `window`.
#[derive(Debug)]
pub struct RateLimiter {
    max_requests: usize,
    window: Duration,
    requests: Mutex<VecDeque<Instant>>,
}

impl RateLimiter {
    pub fn new(max_requests: usize, window: Duration) -> Self {
        Self {
            max_requests: max_requests.max(1),
            window,
            requests: Mutex::new(VecDeque::new()),
        }
    }

    /// Take a slot if one is free, otherwise report how long until one frees up.
    pub fn try_acquire(&self) -> Result<(), Duration> {
        let now = Instant::now();
        let mut requests = self.requests.lock();
        while requests
            .front()
            .is_some_and(|at| now.duration_since(*at) >= self.window)
        {
            requests.pop_front();
        }

        if requests.len() < self.max_requests {
            requests.push_back(now);
            return Ok(());
        }
        let oldest = requests.front().copied().unwrap_or(now);
        Err(self.window.saturating_sub(now.duration_since(oldest)))
    }

    /// Wait until a slot is free, then take it.
    pub async fn acquire(&self) {
        loop {
            match self.try_acquire() {
                Ok(()) => return,
                Err(wait) => {
                    debug!(wait_ms = wait.as_millis() as u64, "Rate limit reached, waiting");
                    tokio::time::sleep(wait).await;
                }
            }
        }
    }
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_REQUESTS, DEFAULT_WINDOW)
    }
}
