//! Retry classification and exponential backoff

use rand::Rng;
use std::future::Future;
use std::time::Duration;
use tracing::{debug, warn};

/// Errors that know whether another attempt may succeed
pub trait Retryable {
    fn is_retryable(&self) -> bool;
}

/// Exponential backoff with jitter: `base * 2^attempt * (0.5..1.5)`, capped at `max`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Backoff {
    pub base: Duration,
    pub max: Duration,
}

impl Backoff {
    pub const fn new(base: Duration, max: Duration) -> Self {
        Self { base, max }
    }

    /// Delay before the retry that follows failed attempt number `attempt` (0-based)
    pub fn delay(&self, attempt: u32) -> Duration {
        let jitter = rand::thread_rng().gen_range(0.5..1.5);
        self.delay_with_jitter(attempt, jitter)
    }

    fn delay_with_jitter(&self, attempt: u32, jitter: f64) -> Duration {
        let exp = 2f64.powi(attempt.min(30) as i32);
        let millis = self.base.as_millis() as f64 * exp * jitter;
        Duration::from_millis(millis as u64).min(self.max)
    }
}

impl Default for Backoff {
    fn default() -> Self {
        Self::new(Duration::from_secs(1), Duration::from_secs(10))
    }
}

/// Decides whether a failed job attempt goes back to pending.
///
/// Shared by the processor and the queue so both sides agree on the outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub backoff: Backoff,
}

impl RetryPolicy {
    pub fn new(max_retries: u32, backoff: Backoff) -> Self {
        Self {
            max_retries,
            backoff,
        }
    }

    pub fn should_retry(&self, err: &impl Retryable, retry_count: u32) -> bool {
        err.is_retryable() && retry_count < self.max_retries
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(2, Backoff::default())
    }
}

/// Run `op` up to `attempts` times, sleeping with backoff between retryable failures.
pub async fn retry_with_backoff<T, E, F, Fut>(
    label: &str,
    attempts: u32,
    backoff: Backoff,
    mut op: F,
) -> Result<T, E>
where
    E: Retryable + std::fmt::Display,
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    let attempts = attempts.max(1);
    let mut attempt = 0;
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(err) if err.is_retryable() && attempt + 1 < attempts => {
                let delay = backoff.delay(attempt);
                warn!(
                    operation = label,
                    attempt = attempt + 1,
                    delay_ms = delay.as_millis() as u64,
                    error = %err,
                    "Retrying after failure"
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(err) => {
                debug!(operation = label, attempt = attempt + 1, error = %err, "Giving up");
                return Err(err);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    #[derive(Debug)]
    struct Flaky(bool);

    impl Retryable for Flaky {
        fn is_retryable(&self) -> bool {
            self.0
        }
    }

    impl std::fmt::Display for Flaky {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            write!(f, "flaky(retryable={})", self.0)
        }
    }

    #[test]
    fn delay_grows_exponentially() {
        let backoff = Backoff::new(Duration::from_millis(100), Duration::from_secs(10));
        assert_eq!(backoff.delay_with_jitter(0, 1.0), Duration::from_millis(100));
        assert_eq!(backoff.delay_with_jitter(1, 1.0), Duration::from_millis(200));
        assert_eq!(backoff.delay_with_jitter(3, 1.0), Duration::from_millis(800));
    }

    #[test]
    fn delay_is_capped() {
        let backoff = Backoff::default();
        assert_eq!(backoff.delay_with_jitter(10, 1.4), Duration::from_secs(10));
        for attempt in 0..40 {
            assert!(backoff.delay(attempt) <= Duration::from_secs(10));
        }
    }

    #[test]
    fn jitter_stays_in_range() {
        let backoff = Backoff::new(Duration::from_millis(1000), Duration::from_secs(60));
        for _ in 0..100 {
            let d = backoff.delay(0);
            assert!(d >= Duration::from_millis(500));
            assert!(d < Duration::from_millis(1500));
        }
    }

    #[test]
    fn policy_respects_budget_and_classification() {
        let policy = RetryPolicy::default();
        assert!(policy.should_retry(&Flaky(true), 0));
        assert!(policy.should_retry(&Flaky(true), 1));
        assert!(!policy.should_retry(&Flaky(true), 2));
        assert!(!policy.should_retry(&Flaky(false), 0));
    }

    #[tokio::test(start_paused = true)]
    async fn retries_transient_until_success() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();
        let result: Result<u32, Flaky> = retry_with_backoff("op", 3, Backoff::default(), || {
            let counter = counter.clone();
            async move {
                let n = counter.fetch_add(1, Ordering::SeqCst);
                if n < 2 {
                    Err(Flaky(true))
                } else {
                    Ok(n)
                }
            }
        })
        .await;
        assert_eq!(result.unwrap(), 2);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn stops_on_permanent_error() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();
        let result: Result<(), Flaky> = retry_with_backoff("op", 3, Backoff::default(), || {
            let counter = counter.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Err(Flaky(false))
            }
        })
        .await;
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn gives_up_after_attempt_budget() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();
        let result: Result<(), Flaky> = retry_with_backoff("op", 3, Backoff::default(), || {
            let counter = counter.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Err(Flaky(true))
            }
        })
        .await;
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }
}
