//! Stream-level error types.

use thiserror::Error;

/// Errors that can occur while driving a provider stream.
///
/// `Clone` so that one failure can be delivered to every subscriber of a
/// stream context.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StreamError {
    /// A stream was requested while a previous one is still live.
    #[error("Stream already in use. Close it before reuse")]
    StreamInUse,

    /// `listen` or `configure` was called while the provider context is live.
    #[error("Provider context already set")]
    ContextAlreadySet,

    /// `push` was called without a live provider context.
    #[error("Missing provider context")]
    MissingContext,

    /// A transport operation was attempted before the connection opened.
    #[error("Transport not connected")]
    NotConnected,

    /// A middleware registration was rejected.
    #[error("Invalid middleware action: {0}")]
    InvalidAction(String),

    /// An abstract operation was invoked on a source that does not provide it.
    #[error("Operation not implemented: {0}")]
    NotImplemented(&'static str),

    /// Configuration could not be applied or decoded.
    #[error("Configuration error: {0}")]
    Config(String),

    /// HTTP request failed (connection refused, bad status, remote rejection).
    #[error("HTTP error: {0}")]
    Http(String),

    /// WebSocket connection/send/receive error.
    #[error("WebSocket error: {0}")]
    WebSocket(String),

    /// Request timed out after the configured duration.
    #[error("Request timed out after {ms}ms")]
    Timeout { ms: u64 },

    /// Payload could not be (de)serialized.
    #[error("Deserialization error: {0}")]
    Deserialization(String),

    /// A middleware action failed for an item.
    #[error("Middleware action failed: {0}")]
    Action(String),

    /// An unexpected error.
    #[error("{0}")]
    Other(String),
}

impl StreamError {
    /// Returns `true` if this error is transient and the request may be retried.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Http(_) | Self::WebSocket(_) | Self::Timeout { .. }
        )
    }

    /// Returns `true` if the error reports misuse of the provider state machine.
    pub fn is_misuse(&self) -> bool {
        matches!(
            self,
            Self::StreamInUse
                | Self::ContextAlreadySet
                | Self::MissingContext
                | Self::NotConnected
                | Self::InvalidAction(_)
                | Self::NotImplemented(_)
        )
    }
}

impl From<serde_json::Error> for StreamError {
    fn from(e: serde_json::Error) -> Self {
        Self::Deserialization(e.to_string())
    }
}
