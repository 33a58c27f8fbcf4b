//! Exponential backoff for transient request failures.

use std::future::Future;
use std::time::Duration;

use crate::error::StreamError;

/// Configuration for the retry policy.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Maximum number of retries (not counting the first try).
    pub max_retries: u32,
    /// Delay before the first retry.
    pub initial_backoff: Duration,
    /// Upper bound for any single delay.
    pub max_backoff: Duration,
    /// Multiplier applied to the delay on each retry.
    pub multiplier: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 2,
            initial_backoff: Duration::from_millis(250),
            max_backoff: Duration::from_secs(5),
            multiplier: 2.0,
        }
    }
}

impl RetryConfig {
    /// A config that never retries.
    pub fn none() -> Self {
        Self {
            max_retries: 0,
            ..Self::default()
        }
    }
}

/// Retries operations whose errors are [`StreamError::is_retryable`].
#[derive(Debug, Clone, Default)]
pub struct RetryPolicy {
    pub config: RetryConfig,
}

impl RetryPolicy {
    pub fn new(config: RetryConfig) -> Self {
        Self { config }
    }

    /// Delay before the `retry`-th retry (1-based), or `None` once exhausted.
    pub fn backoff(&self, retry: u32) -> Option<Duration> {
        if retry == 0 || retry > self.config.max_retries {
            return None;
        }
        let base_ms = self.config.initial_backoff.as_millis() as f64
            * self.config.multiplier.powi(retry as i32 - 1);
        Some(Duration::from_millis(base_ms.round() as u64).min(self.config.max_backoff))
    }

    /// Run `op` until it succeeds, fails permanently or retries run out.
    pub async fn run<T, F, Fut>(&self, label: &str, mut op: F) -> Result<T, StreamError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, StreamError>>,
    {
        let mut retry = 0;
        loop {
            let err = match op().await {
                Ok(value) => return Ok(value),
                Err(e) if !e.is_retryable() => return Err(e),
                Err(e) => e,
            };

            retry += 1;
            match self.backoff(retry) {
                Some(delay) => {
                    tracing::warn!(
                        op = label,
                        retry,
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "retrying request"
                    );
                    tokio::time::sleep(delay).await;
                }
                None => {
                    if self.config.max_retries > 0 {
                        tracing::error!(op = label, error = %err, "retries exhausted");
                    }
                    return Err(err);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn fast(max_retries: u32) -> RetryPolicy {
        RetryPolicy::new(RetryConfig {
            max_retries,
            initial_backoff: Duration::from_millis(1),
            max_backoff: Duration::from_millis(4),
            multiplier: 2.0,
        })
    }

    #[test]
    fn backoff_grows_and_caps() {
        let policy = RetryPolicy::new(RetryConfig {
            max_retries: 4,
            initial_backoff: Duration::from_millis(100),
            max_backoff: Duration::from_millis(300),
            multiplier: 2.0,
        });
        assert_eq!(policy.backoff(1), Some(Duration::from_millis(100)));
        assert_eq!(policy.backoff(2), Some(Duration::from_millis(200)));
        assert_eq!(policy.backoff(3), Some(Duration::from_millis(300)));
        assert_eq!(policy.backoff(5), None);
        assert_eq!(policy.backoff(0), None);
    }

    #[tokio::test]
    async fn transient_errors_are_retried() {
        let calls = AtomicU32::new(0);
        let out = fast(3)
            .run("test", || {
                let n = calls.fetch_add(1, Ordering::SeqCst);
                async move {
                    if n < 2 {
                        Err(StreamError::Http("502".into()))
                    } else {
                        Ok(n)
                    }
                }
            })
            .await
            .unwrap();
        assert_eq!(out, 2);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn permanent_errors_are_not_retried() {
        let calls = AtomicU32::new(0);
        let err = fast(3)
            .run("test", || {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err::<(), _>(StreamError::Config("bad key".into())) }
            })
            .await
            .unwrap_err();
        assert!(matches!(err, StreamError::Config(_)));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn gives_up_after_max_retries() {
        let calls = AtomicU32::new(0);
        let err = fast(2)
            .run("test", || {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err::<(), _>(StreamError::Timeout { ms: 10 }) }
            })
            .await
            .unwrap_err();
        assert_eq!(err, StreamError::Timeout { ms: 10 });
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }
}
