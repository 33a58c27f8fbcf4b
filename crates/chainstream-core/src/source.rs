//! The `Source` trait — what a provider plugs in to produce items.

use async_trait::async_trait;

use crate::error::StreamError;
use crate::middleware::Middleware;
use crate::provider::StreamProvider;
use crate::request::StreamRequest;
use crate::settings::Settings;

/// Pluggable item producer behind a [`StreamProvider`].
///
/// A source either performs one request and pushes its result (request
/// sources) or opens a connection that keeps pushing until closed (push
/// sources).
///
/// # Object Safety
/// The trait is object-safe and is stored as `Arc<dyn Source>`.
#[async_trait]
pub trait Source: Send + Sync + 'static {
    /// Identifier used in logs.
    fn name(&self) -> &str;

    /// Populate `provider`'s stream for `request`.
    async fn start(
        &self,
        provider: &StreamProvider,
        request: &StreamRequest,
    ) -> Result<(), StreamError> {
        let _ = (provider, request);
        Err(StreamError::NotImplemented("Source::start"))
    }

    /// Called once right after a context is created, before start runs.
    ///
    /// Register middleware actions that depend on settings here.
    fn on_context(&self, settings: &Settings, middleware: &mut Middleware) -> Result<(), StreamError> {
        let _ = (settings, middleware);
        Ok(())
    }

    /// Release whatever `start` opened.
    async fn close(&self) -> Result<(), StreamError> {
        Ok(())
    }
}
