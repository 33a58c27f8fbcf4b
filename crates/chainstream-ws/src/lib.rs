//! chainstream-ws — long-lived connections behind push providers.
//!
//! # Features
//! - Native push over WebSocket with keep-alive pings
//! - Polling fallback over a bounded request source, cursor tracked per poll
//! - Factory choosing between the two from declared capabilities

pub mod connection;
pub mod factory;
pub mod native;
pub mod polling;
pub mod protocol;
pub mod source;

pub use connection::{ConfigResolver, Connection, ConnectionConfig, ConnectionState};
pub use factory::{create_connection, TransportCapabilities};
pub use native::NativeConnection;
pub use polling::{PollingConnection, PositionFn, INITIAL_CURSOR, OPEN_END_POSITION};
pub use protocol::{InboundMessage, OutboundMessage};
pub use source::PushSource;
