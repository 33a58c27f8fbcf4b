//! HTTP request client backed by `reqwest`.
//!
//! Features:
//! - Request throttle (token bucket) shared by every caller of one client
//! - Automatic retry with exponential backoff for transient errors
//! - Per-request timeout

use async_trait::async_trait;
use serde_json::Value;
use std::time::Duration;

use chainstream_core::error::StreamError;
use chainstream_core::policy::{RequestThrottle, RetryConfig, RetryPolicy, ThrottleConfig};

/// A fully encoded GET request: endpoint and query parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpRequest {
    pub url: String,
    pub params: Vec<(String, String)>,
}

impl HttpRequest {
    pub fn get(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            params: Vec::new(),
        }
    }

    /// Append a query parameter.
    pub fn param(mut self, key: impl Into<String>, value: impl ToString) -> Self {
        self.params.push((key.into(), value.to_string()));
        self
    }

    /// Value of the first query parameter named `key`.
    pub fn param_value(&self, key: &str) -> Option<&str> {
        self.params
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }
}

/// Executes encoded requests and returns the decoded JSON body.
///
/// # Object Safety
/// The trait is object-safe and is stored as `Arc<dyn RequestTransport>`.
#[async_trait]
pub trait RequestTransport: Send + Sync + 'static {
    async fn execute(&self, req: &HttpRequest) -> Result<Value, StreamError>;
}

/// Configuration for [`HttpClient`].
#[derive(Debug, Clone)]
pub struct HttpClientConfig {
    pub retry: RetryConfig,
    /// `None` disables throttling.
    pub throttle: Option<ThrottleConfig>,
    pub request_timeout: Duration,
}

impl Default for HttpClientConfig {
    fn default() -> Self {
        Self {
            retry: RetryConfig::default(),
            throttle: Some(ThrottleConfig::default()),
            request_timeout: Duration::from_secs(30),
        }
    }
}

/// HTTP client with built-in throttle and retry.
pub struct HttpClient {
    http: reqwest::Client,
    retry: RetryPolicy,
    throttle: Option<RequestThrottle>,
    request_timeout: Duration,
}

impl HttpClient {
    pub fn new(config: HttpClientConfig) -> Result<Self, StreamError> {
        let http = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| StreamError::Http(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            http,
            retry: RetryPolicy::new(config.retry),
            throttle: config.throttle.map(RequestThrottle::new),
            request_timeout: config.request_timeout,
        })
    }

    /// Create with default configuration.
    pub fn with_defaults() -> Result<Self, StreamError> {
        Self::new(HttpClientConfig::default())
    }

    async fn execute_once(&self, req: &HttpRequest) -> Result<Value, StreamError> {
        if let Some(throttle) = &self.throttle {
            throttle.acquire().await;
        }

        let resp = self
            .http
            .get(&req.url)
            .query(&req.params)
            .send()
            .await
            .map_err(|e| self.map_reqwest(e))?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            let message = format!("HTTP {}: {body}", status.as_u16());
            // Client errors other than rate limiting will not improve on retry.
            return Err(if status.is_client_error() && status.as_u16() != 429 {
                StreamError::Other(message)
            } else {
                StreamError::Http(message)
            });
        }

        resp.json::<Value>()
            .await
            .map_err(|e| StreamError::Deserialization(e.to_string()))
    }

    fn map_reqwest(&self, e: reqwest::Error) -> StreamError {
        if e.is_timeout() {
            StreamError::Timeout {
                ms: self.request_timeout.as_millis() as u64,
            }
        } else {
            StreamError::Http(e.to_string())
        }
    }
}

#[async_trait]
impl RequestTransport for HttpClient {
    async fn execute(&self, req: &HttpRequest) -> Result<Value, StreamError> {
        tracing::debug!(url = %req.url, params = req.params.len(), "http request");
        self.retry.run(&req.url, move || self.execute_once(req)).await
    }
}

impl std::fmt::Debug for HttpClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpClient")
            .field("retry", &self.retry)
            .field("throttle", &self.throttle)
            .field("request_timeout", &self.request_timeout)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_builder_keeps_param_order() {
        let req = HttpRequest::get("https://api.etherscan.io/api")
            .param("module", "account")
            .param("action", "txlist")
            .param("startblock", 0);

        assert_eq!(
            req.params,
            vec![
                ("module".to_string(), "account".to_string()),
                ("action".to_string(), "txlist".to_string()),
                ("startblock".to_string(), "0".to_string()),
            ]
        );
        assert_eq!(req.param_value("action"), Some("txlist"));
        assert_eq!(req.param_value("missing"), None);
    }

    #[tokio::test]
    async fn unreachable_host_is_http_error() {
        let client = HttpClient::new(HttpClientConfig {
            retry: RetryConfig::none(),
            throttle: None,
            request_timeout: Duration::from_secs(2),
        })
        .unwrap();

        // Port 9 (discard) on localhost is closed in test environments.
        let err = client
            .execute(&HttpRequest::get("http://127.0.0.1:9/api"))
            .await
            .unwrap_err();
        assert!(err.is_retryable(), "unexpected error: {err:?}");
    }
}
