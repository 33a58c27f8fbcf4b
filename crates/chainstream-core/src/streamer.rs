//! `Streamer` — the entry point over a set of providers.

use std::sync::Arc;

use serde_json::Value;

use crate::context::Subscription;
use crate::error::StreamError;
use crate::multi::MultiProvider;
use crate::provider::Provider;
use crate::request::StreamRequest;

/// Owns one unit of work (a [`MultiProvider`]) and hands out one stream at
/// a time.
#[derive(Debug, Clone)]
pub struct Streamer {
    unit_of_work: MultiProvider,
}

impl Streamer {
    pub fn new(providers: Vec<Arc<dyn Provider>>) -> Self {
        Self {
            unit_of_work: MultiProvider::new("streamer", providers),
        }
    }

    pub fn providers(&self) -> &[Arc<dyn Provider>] {
        self.unit_of_work.children()
    }

    /// Set `key` on every provider. Rejected while streaming.
    pub fn configure(&self, key: &str, value: impl Into<Value>) -> Result<(), StreamError> {
        self.unit_of_work.configure(key, value.into())
    }

    /// Start streaming `request` from every provider.
    pub async fn stream(&self, request: StreamRequest) -> Result<Subscription, StreamError> {
        if self.stream_in_use() {
            return Err(StreamError::StreamInUse);
        }
        tracing::debug!(subject = %request.subject, providers = self.unit_of_work.len(), "stream");
        self.unit_of_work.listen(request).await
    }

    pub async fn close(&self) -> Result<(), StreamError> {
        self.unit_of_work.close().await
    }

    /// `true` while any provider holds a live context.
    pub fn stream_in_use(&self) -> bool {
        self.unit_of_work.has_context()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::tests::idle;
    use serde_json::json;

    fn streamer() -> Streamer {
        Streamer::new(vec![Arc::new(idle("http")), Arc::new(idle("ws"))])
    }

    #[tokio::test]
    async fn second_stream_is_in_use() {
        let streamer = streamer();
        let _sub = streamer.stream(StreamRequest::new("0xabc")).await.unwrap();
        assert!(streamer.stream_in_use());

        let err = streamer.stream(StreamRequest::new("0xabc")).await.unwrap_err();
        assert_eq!(err, StreamError::StreamInUse);
    }

    #[tokio::test]
    async fn close_frees_the_streamer() {
        let streamer = streamer();
        let sub = streamer.stream(StreamRequest::new("0xabc")).await.unwrap();
        streamer.close().await.unwrap();

        assert!(!streamer.stream_in_use());
        assert!(sub.wait_all().await.unwrap().is_empty());
        streamer.stream(StreamRequest::new("0xabc")).await.unwrap();
    }

    #[tokio::test]
    async fn configure_before_and_during_stream() {
        let streamer = streamer();
        streamer.configure("apiKey", "X").unwrap();
        assert_eq!(streamer.providers().len(), 2);

        let _sub = streamer.stream(StreamRequest::new("0xabc")).await.unwrap();
        assert_eq!(
            streamer.configure("apiKey", json!("Y")).unwrap_err(),
            StreamError::ContextAlreadySet
        );
    }
}
