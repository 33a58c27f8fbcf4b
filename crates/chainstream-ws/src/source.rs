//! Push source: a provider source that holds a long-lived connection.

use async_trait::async_trait;

use chainstream_core::error::StreamError;
use chainstream_core::middleware::{ContextHook, Middleware};
use chainstream_core::provider::StreamProvider;
use chainstream_core::request::StreamRequest;
use chainstream_core::settings::Settings;
use chainstream_core::source::Source;

use crate::connection::Connection;

/// [`Source`] whose `start` opens a [`Connection`] that keeps pushing
/// until the provider closes.
pub struct PushSource {
    name: String,
    connection: Connection,
    hook: Option<ContextHook>,
}

impl PushSource {
    pub fn new(name: impl Into<String>, connection: Connection) -> Self {
        Self {
            name: name.into(),
            connection,
            hook: None,
        }
    }

    /// Run `hook` on every new context to register middleware.
    pub fn with_context_hook(mut self, hook: ContextHook) -> Self {
        self.hook = Some(hook);
        self
    }

    pub fn connection(&self) -> &Connection {
        &self.connection
    }
}

#[async_trait]
impl Source for PushSource {
    fn name(&self) -> &str {
        &self.name
    }

    async fn start(&self, provider: &StreamProvider, request: &StreamRequest) -> Result<(), StreamError> {
        tracing::debug!(
            source = %self.name,
            connection = self.connection.kind(),
            subject = %request.subject,
            "open connection"
        );
        self.connection.connect(provider, &request.subject).await
    }

    fn on_context(&self, settings: &Settings, middleware: &mut Middleware) -> Result<(), StreamError> {
        match &self.hook {
            Some(hook) => hook(settings, middleware),
            None => Ok(()),
        }
    }

    async fn close(&self) -> Result<(), StreamError> {
        self.connection.close();
        Ok(())
    }
}

impl std::fmt::Debug for PushSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PushSource")
            .field("name", &self.name)
            .field("connection", &self.connection)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::ConnectionState;
    use crate::polling::PollingConnection;
    use chainstream_core::provider::Provider;
    use serde_json::json;
    use std::sync::Arc;
    use std::time::Duration;

    struct Batch;

    #[async_trait]
    impl Source for Batch {
        fn name(&self) -> &str {
            "batch"
        }

        async fn start(&self, provider: &StreamProvider, _: &StreamRequest) -> Result<(), StreamError> {
            provider.push(vec![json!({"blockNumber": "7"})]).await?;
            provider.close().await
        }
    }

    #[tokio::test]
    async fn provider_close_closes_connection() {
        let polling = PollingConnection::new(
            Duration::from_secs(3600),
            Arc::new(Batch),
            Arc::new(|item: &serde_json::Value| chainstream_core::item_position(item, "blockNumber")),
        );
        let source = Arc::new(PushSource::new("push", Connection::Polling(polling)));
        let provider = StreamProvider::new("push", source.clone(), Settings::new()).unwrap();

        let sub = provider.listen(StreamRequest::new("0xabc")).await.unwrap();
        // Let the spawned start open the connection.
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(source.connection().state(), ConnectionState::Connected);

        provider.close().await.unwrap();
        assert_eq!(source.connection().state(), ConnectionState::Disconnected);
        assert!(sub.wait_all().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn native_connect_failure_errors_stream() {
        let conn = crate::native::NativeConnection::new("ws://127.0.0.1:1", Duration::from_secs(20));
        let source = Arc::new(PushSource::new("push", Connection::Native(conn)));
        let provider = StreamProvider::new("push", source, Settings::new()).unwrap();

        let err = provider
            .listen(StreamRequest::new("0xabc"))
            .await
            .unwrap()
            .wait_all()
            .await
            .unwrap_err();
        assert!(matches!(err, StreamError::WebSocket(_)), "{err:?}");
        assert!(!provider.has_context());
    }

    async fn stream_error(connection: Connection) -> (StreamError, bool) {
        let provider = StreamProvider::new("push", Arc::new(PushSource::new("push", connection)), Settings::new()).unwrap();
        let err = provider
            .listen(StreamRequest::new("0xabc"))
            .await
            .unwrap()
            .wait_all()
            .await
            .unwrap_err();
        (err, provider.has_context())
    }

    #[tokio::test]
    async fn zero_ping_interval_errors_stream() {
        let conn = crate::native::NativeConnection::new("ws://127.0.0.1:1", Duration::ZERO);
        let (err, live) = stream_error(Connection::Native(conn)).await;
        assert_eq!(err, StreamError::Config("pingInterval must be positive".into()));
        assert!(!live);
    }

    #[tokio::test]
    async fn zero_polling_interval_errors_stream() {
        let polling = PollingConnection::new(
            Duration::ZERO,
            Arc::new(Batch),
            Arc::new(|item: &serde_json::Value| chainstream_core::item_position(item, "blockNumber")),
        );
        let (err, live) = stream_error(Connection::Polling(polling)).await;
        assert_eq!(err, StreamError::Config("pollingInterval must be positive".into()));
        assert!(!live);
    }

    #[tokio::test]
    async fn resolver_without_endpoint_errors_native_stream() {
        let conn = crate::native::NativeConnection::new("ws://127.0.0.1:1", Duration::from_secs(20));
        let connection = Connection::Native(conn).with_resolver(Arc::new(|_: &Settings| -> Result<_, StreamError> {
            Ok(crate::connection::ConnectionConfig::default())
        }));
        let (err, live) = stream_error(connection).await;
        assert_eq!(
            err,
            StreamError::Config("no push endpoint for the configured network".into())
        );
        assert!(!live);
    }
}
