//! The connection a push provider holds while listening.

use std::sync::Arc;
use std::time::Duration;

use chainstream_core::error::StreamError;
use chainstream_core::provider::StreamProvider;
use chainstream_core::settings::Settings;

use crate::native::NativeConnection;
use crate::polling::PollingConnection;

/// Lifecycle of a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionState {
    #[default]
    Disconnected,
    Connecting,
    Connected,
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Disconnected => write!(f, "disconnected"),
            Self::Connecting => write!(f, "connecting"),
            Self::Connected => write!(f, "connected"),
        }
    }
}

/// Timing and endpoint for a connection.
#[derive(Debug, Clone)]
pub struct ConnectionConfig {
    /// Push endpoint; `None` forces polling.
    pub url: Option<String>,
    /// Keep-alive period on a native connection.
    pub ping_interval: Duration,
    /// Poll period on a polling connection.
    pub polling_interval: Duration,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            url: None,
            ping_interval: Duration::from_secs(20),
            polling_interval: Duration::from_secs(2),
        }
    }
}

/// Derives a connection's endpoint and timing from its provider's settings.
///
/// Called on every connect, so `configure` between streams takes effect.
pub type ConfigResolver = Arc<dyn Fn(&Settings) -> Result<ConnectionConfig, StreamError> + Send + Sync>;

/// A timer period; zero is rejected.
pub(crate) fn require_period(key: &str, period: Duration) -> Result<Duration, StreamError> {
    if period.is_zero() {
        return Err(StreamError::Config(format!("{key} must be positive")));
    }
    Ok(period)
}

/// Either a native push transport or the polling fallback.
#[derive(Debug)]
pub enum Connection {
    Native(NativeConnection),
    Polling(PollingConnection),
}

impl Connection {
    /// Resolve endpoint and timing from the provider's settings on connect.
    pub fn with_resolver(self, resolver: ConfigResolver) -> Self {
        match self {
            Self::Native(conn) => Self::Native(conn.with_resolver(resolver)),
            Self::Polling(conn) => Self::Polling(conn.with_resolver(resolver)),
        }
    }

    /// Start delivering items for `subject` into `provider`.
    pub async fn connect(&self, provider: &StreamProvider, subject: &str) -> Result<(), StreamError> {
        match self {
            Self::Native(conn) => conn.connect(provider, subject).await,
            Self::Polling(conn) => conn.connect(provider, subject),
        }
    }

    /// Stop delivering. Idempotent.
    pub fn close(&self) {
        match self {
            Self::Native(conn) => conn.close(),
            Self::Polling(conn) => conn.close(),
        }
    }

    pub fn state(&self) -> ConnectionState {
        match self {
            Self::Native(conn) => conn.state(),
            Self::Polling(conn) => conn.state(),
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::Native(_) => "native",
            Self::Polling(_) => "polling",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_period_is_a_config_error() {
        assert_eq!(
            require_period("pingInterval", Duration::ZERO),
            Err(StreamError::Config("pingInterval must be positive".into()))
        );
        assert_eq!(
            require_period("pollingInterval", Duration::from_millis(1)),
            Ok(Duration::from_millis(1))
        );
    }
}
