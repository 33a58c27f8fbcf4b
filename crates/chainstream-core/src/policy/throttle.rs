//! Token bucket request throttle.
//!
//! Tokens accrue at `per_second` up to `burst`. Every request takes one
//! token; [`RequestThrottle::acquire`] sleeps until one is available.

use std::sync::Mutex;
use std::time::{Duration, Instant};

use crate::sync::lock;

/// Throttle configuration.
#[derive(Debug, Clone)]
pub struct ThrottleConfig {
    /// Maximum tokens held at once.
    pub burst: f64,
    /// Refill rate in tokens per second.
    pub per_second: f64,
}

impl Default for ThrottleConfig {
    fn default() -> Self {
        // Etherscan free tier: 5 calls/s.
        Self {
            burst: 5.0,
            per_second: 5.0,
        }
    }
}

struct Bucket {
    tokens: f64,
    last_refill: Instant,
}

/// Shared request throttle; one instance per upstream API key.
pub struct RequestThrottle {
    config: ThrottleConfig,
    bucket: Mutex<Bucket>,
}

impl RequestThrottle {
    pub fn new(config: ThrottleConfig) -> Self {
        Self {
            bucket: Mutex::new(Bucket {
                tokens: config.burst,
                last_refill: Instant::now(),
            }),
            config,
        }
    }

    /// Wait for a token and take it.
    pub async fn acquire(&self) {
        while let Some(wait) = self.take() {
            tracing::trace!(wait_ms = wait.as_millis() as u64, "throttled");
            tokio::time::sleep(wait).await;
        }
    }

    // `None` when a token was taken, else how long until one accrues.
    fn take(&self) -> Option<Duration> {
        let mut bucket = lock(&self.bucket);
        self.refill(&mut bucket);
        if bucket.tokens >= 1.0 {
            bucket.tokens -= 1.0;
            return None;
        }
        let deficit = 1.0 - bucket.tokens;
        Some(Duration::from_secs_f64(deficit / self.config.per_second.max(f64::EPSILON)))
    }

    fn refill(&self, bucket: &mut Bucket) {
        let now = Instant::now();
        let elapsed = now.duration_since(bucket.last_refill).as_secs_f64();
        bucket.tokens = (bucket.tokens + elapsed * self.config.per_second).min(self.config.burst);
        bucket.last_refill = now;
    }
}

impl std::fmt::Debug for RequestThrottle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestThrottle")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn burst_then_empty() {
        let throttle = RequestThrottle::new(ThrottleConfig {
            burst: 3.0,
            per_second: 0.001,
        });
        assert_eq!(throttle.take(), None);
        assert_eq!(throttle.take(), None);
        assert_eq!(throttle.take(), None);
        assert!(throttle.take().is_some(), "bucket should be empty");
    }

    #[tokio::test]
    async fn acquire_waits_for_refill() {
        let throttle = RequestThrottle::new(ThrottleConfig {
            burst: 1.0,
            per_second: 20.0,
        });
        throttle.acquire().await;

        let started = Instant::now();
        throttle.acquire().await;
        let waited = started.elapsed();
        // One token at 20/s is ~50ms.
        assert!(waited >= Duration::from_millis(30), "waited {waited:?}");
    }
}
