//! One-shot request source: a single bounded request, pushed then closed.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use chainstream_core::error::StreamError;
use chainstream_core::middleware::{ContextHook, Middleware};
use chainstream_core::provider::{Provider, StreamProvider};
use chainstream_core::request::{Item, StreamRequest};
use chainstream_core::settings::Settings;
use chainstream_core::source::Source;

use crate::client::{HttpRequest, RequestTransport};

/// Maps stream requests to HTTP requests and response bodies to items.
pub trait RequestEncoder: Send + Sync + 'static {
    fn encode(&self, request: &StreamRequest, settings: &Settings) -> Result<HttpRequest, StreamError>;

    /// Extract items from a response body. The default treats the whole body
    /// as one item.
    fn transform(&self, body: Value) -> Result<Vec<Item>, StreamError> {
        Ok(vec![body])
    }
}

/// [`Source`] that issues one request per `start`, pushes the result and
/// closes its provider.
pub struct HttpSource {
    name: String,
    encoder: Arc<dyn RequestEncoder>,
    transport: Arc<dyn RequestTransport>,
    hook: Option<ContextHook>,
}

impl HttpSource {
    pub fn new(
        name: impl Into<String>,
        encoder: Arc<dyn RequestEncoder>,
        transport: Arc<dyn RequestTransport>,
    ) -> Self {
        Self {
            name: name.into(),
            encoder,
            transport,
            hook: None,
        }
    }

    /// Run `hook` on every new context to register middleware.
    pub fn with_context_hook(mut self, hook: ContextHook) -> Self {
        self.hook = Some(hook);
        self
    }
}

#[async_trait]
impl Source for HttpSource {
    fn name(&self) -> &str {
        &self.name
    }

    async fn start(&self, provider: &StreamProvider, request: &StreamRequest) -> Result<(), StreamError> {
        let req = self.encoder.encode(request, &provider.settings())?;
        let body = self.transport.execute(&req).await?;
        let items = self.encoder.transform(body)?;

        tracing::debug!(source = %self.name, items = items.len(), "request complete");

        match provider.push(items).await {
            Ok(()) => {}
            // Closed while the request was in flight.
            Err(StreamError::MissingContext) => {
                tracing::debug!(source = %self.name, "context gone, dropping response");
                return Ok(());
            }
            Err(e) => return Err(e),
        }
        provider.close().await
    }

    fn on_context(&self, settings: &Settings, middleware: &mut Middleware) -> Result<(), StreamError> {
        match &self.hook {
            Some(hook) => hook(settings, middleware),
            None => Ok(()),
        }
    }
}
