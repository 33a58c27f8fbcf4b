//! Chooses the connection a push provider is built with.

use std::sync::Arc;

use chainstream_core::source::Source;

use crate::connection::{Connection, ConnectionConfig};
use crate::native::NativeConnection;
use crate::polling::{PollingConnection, PositionFn};

/// What the runtime can offer a push provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransportCapabilities {
    /// A usable WebSocket client is available.
    pub native_push: bool,
}

impl TransportCapabilities {
    pub fn polling_only() -> Self {
        Self { native_push: false }
    }
}

impl Default for TransportCapabilities {
    fn default() -> Self {
        Self { native_push: true }
    }
}

/// Native push iff `config` has an endpoint and `capabilities` allow it;
/// polling over `poll_source` otherwise.
pub fn create_connection(
    config: &ConnectionConfig,
    capabilities: TransportCapabilities,
    poll_source: Arc<dyn Source>,
    position: PositionFn,
) -> Connection {
    match (&config.url, capabilities.native_push) {
        (Some(url), true) => Connection::Native(NativeConnection::new(url.clone(), config.ping_interval)),
        _ => {
            tracing::debug!(has_url = config.url.is_some(), "using polling connection");
            Connection::Polling(PollingConnection::new(config.polling_interval, poll_source, position))
        }
    }
}
