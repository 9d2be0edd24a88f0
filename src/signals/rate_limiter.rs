// Minimum-spacing rate limiter for remote calls.
//
// The profanity service throttles clients that call it in bursts. A caller
// holds the lock while it waits for its turn, so concurrent callers queue
// in order. Only a granted request moves `last_request`; a caller that is
// cancelled mid-wait leaves nothing behind for later callers to wait out.

use std::sync::Arc;
use tokio::sync::Mutex;
use tokio::time::{Duration, Instant};

/// Enforces a minimum interval between consecutive requests.
#[derive(Clone)]
pub struct RateLimiter {
    inner: Arc<Mutex<RateLimiterInner>>,
}

struct RateLimiterInner {
    /// Minimum time between requests
    interval: Duration,
    /// When the last request was allowed through
    last_request: Option<Instant>,
}

impl RateLimiter {
    pub fn new(interval: Duration) -> Self {
        Self {
            inner: Arc::new(Mutex::new(RateLimiterInner {
                interval,
                last_request: None,
            })),
        }
    }

    /// Wait until a request is allowed, then return.
    pub async fn acquire(&self) {
        let mut inner = self.inner.lock().await;
        if let Some(last) = inner.last_request {
            tokio::time::sleep_until(last + inner.interval).await;
        }
        inner.last_request = Some(Instant::now());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_rate_limiter_allows_first_request_immediately() {
        let limiter = RateLimiter::new(Duration::from_millis(500));
        let start = Instant::now();
        limiter.acquire().await;
        assert!(start.elapsed() < Duration::from_millis(50));
    }

    #[tokio::test]
    async fn test_rate_limiter_delays_second_request() {
        let limiter = RateLimiter::new(Duration::from_millis(500));
        limiter.acquire().await;
        let start = Instant::now();
        limiter.acquire().await;
        let elapsed = start.elapsed();
        assert!(
            elapsed >= Duration::from_millis(400),
            "Expected ~500ms delay, got {:?}",
            elapsed
        );
    }

    #[tokio::test]
    async fn test_concurrent_callers_are_spaced() {
        let limiter = RateLimiter::new(Duration::from_millis(100));
        let start = Instant::now();
        let a = limiter.clone();
        let b = limiter.clone();
        let c = limiter.clone();
        tokio::join!(a.acquire(), b.acquire(), c.acquire());
        // Third caller waits for two intervals
        assert!(start.elapsed() >= Duration::from_millis(180));
    }

    #[tokio::test]
    async fn test_cancelled_waiters_do_not_delay_later_callers() {
        let limiter = RateLimiter::new(Duration::from_millis(100));

        let waiters: Vec<_> = (0..20)
            .map(|_| {
                let limiter = limiter.clone();
                tokio::spawn(async move {
                    tokio::time::timeout(Duration::from_millis(250), limiter.acquire())
                        .await
                        .is_ok()
                })
            })
            .collect();
        let mut granted = 0;
        for waiter in waiters {
            if waiter.await.unwrap() {
                granted += 1;
            }
        }
        assert!((2..=4).contains(&granted), "granted {granted}");

        // Idle long enough for the last granted request to age out
        tokio::time::sleep(Duration::from_millis(300)).await;
        let start = Instant::now();
        limiter.acquire().await;
        assert!(
            start.elapsed() < Duration::from_millis(50),
            "fresh caller waited {:?}",
            start.elapsed()
        );
    }
}
