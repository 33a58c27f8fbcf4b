//! Native push connection over WebSocket.
//!
//! ```text
//! connect() ──► handshake ──► {"event":"txlist","address":…}
//!                               │
//!              session task ◄───┘
//!               ├─ every ping_interval ─► {"event":"ping"}
//!               ├─ text frame with result[] ─► provider.push
//!               └─ remote close/error ─► provider.close
//! ```
//!
//! No reconnect: a session that ends on the remote side ends the stream.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::time::{self, Instant, MissedTickBehavior};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

use chainstream_core::error::StreamError;
use chainstream_core::provider::{Provider, StreamProvider};
use chainstream_core::sync::lock;

use crate::connection::{require_period, ConfigResolver, ConnectionState};
use crate::protocol::{InboundMessage, OutboundMessage};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Command sent from the connection handle to its session task.
enum WsCommand {
    Send(OutboundMessage),
    Close,
}

/// Shared between the handle, in-flight handshakes and the session task.
///
/// Every connect and every close bumps `generation`; a handshake or session
/// only touches the link while its own generation is current.
#[derive(Default)]
struct Link {
    state: ConnectionState,
    generation: u64,
    commands: Option<mpsc::UnboundedSender<WsCommand>>,
}

/// WebSocket connection owned by one push provider.
pub struct NativeConnection {
    url: String,
    ping_interval: Duration,
    resolver: Option<ConfigResolver>,
    link: Arc<Mutex<Link>>,
}

impl NativeConnection {
    pub fn new(url: impl Into<String>, ping_interval: Duration) -> Self {
        Self {
            url: url.into(),
            ping_interval,
            resolver: None,
            link: Arc::new(Mutex::new(Link::default())),
        }
    }

    /// Take endpoint and ping period from the provider's settings on each
    /// connect instead of the values given to [`new`](Self::new).
    pub fn with_resolver(mut self, resolver: ConfigResolver) -> Self {
        self.resolver = Some(resolver);
        self
    }

    /// Endpoint given at construction.
    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn state(&self) -> ConnectionState {
        lock(&self.link).state
    }

    /// Open the socket, subscribe to `subject` and start the session task.
    ///
    /// A failure before the socket opens is delivered to `provider`'s
    /// subscribers, closes the provider and is returned.
    pub async fn connect(&self, provider: &StreamProvider, subject: &str) -> Result<(), StreamError> {
        let ping = OutboundMessage::Ping.to_text()?;
        let context = provider.context_id().ok_or(StreamError::MissingContext)?;
        let generation = {
            let mut link = lock(&self.link);
            if link.state != ConnectionState::Disconnected {
                tracing::debug!(url = %self.url, state = %link.state, "already connected");
                return Ok(());
            }
            link.state = ConnectionState::Connecting;
            link.generation += 1;
            link.generation
        };

        let opened = match self.endpoint(provider) {
            Ok((url, ping_interval)) => {
                tracing::info!(url = %url, "connecting via WebSocket");
                match self.open(&url, subject).await {
                    Ok(ws) => Ok((ws, url, ping_interval)),
                    Err(e) => Err(e),
                }
            }
            Err(e) => Err(e),
        };

        let (mut ws, url, ping_interval) = match opened {
            Ok(opened) => opened,
            Err(e) => {
                tracing::warn!(error = %e, "WebSocket connect failed");
                {
                    let mut link = lock(&self.link);
                    if link.generation == generation {
                        link.state = ConnectionState::Disconnected;
                    }
                }
                provider.fail_context(context, e.clone()).await;
                return Err(e);
            }
        };

        let (tx, rx) = mpsc::unbounded_channel();
        let current = {
            let mut link = lock(&self.link);
            if link.generation == generation && link.state == ConnectionState::Connecting {
                link.state = ConnectionState::Connected;
                link.commands = Some(tx);
                true
            } else {
                false
            }
        };
        // Closed, and possibly reconnected, while the handshake was in flight.
        if !current {
            tracing::debug!(url = %url, "superseded handshake dropped");
            let _ = ws.close(None).await;
            return Ok(());
        }

        tracing::info!(url = %url, subject, "WebSocket connected");

        tokio::spawn(run_session(Session {
            ws,
            commands: rx,
            provider: provider.clone(),
            context,
            link: Arc::clone(&self.link),
            generation,
            ping,
            ping_interval,
        }));
        Ok(())
    }

    /// Queue a raw protocol message on the open socket.
    pub fn send(&self, message: OutboundMessage) -> Result<(), StreamError> {
        let link = lock(&self.link);
        if link.state != ConnectionState::Connected {
            return Err(StreamError::NotConnected);
        }
        link.commands
            .as_ref()
            .ok_or(StreamError::NotConnected)?
            .send(WsCommand::Send(message))
            .map_err(|_| StreamError::NotConnected)
    }

    /// Stop the keep-alive and close the socket. Idempotent.
    pub fn close(&self) {
        let commands = {
            let mut link = lock(&self.link);
            link.generation += 1;
            link.state = ConnectionState::Disconnected;
            link.commands.take()
        };
        if let Some(tx) = commands {
            tracing::info!(url = %self.url, "closing WebSocket");
            let _ = tx.send(WsCommand::Close);
        }
    }

    fn endpoint(&self, provider: &StreamProvider) -> Result<(String, Duration), StreamError> {
        let (url, ping_interval) = match &self.resolver {
            Some(resolve) => {
                let config = resolve(&provider.settings())?;
                let url = config.url.ok_or_else(|| {
                    StreamError::Config("no push endpoint for the configured network".into())
                })?;
                (url, config.ping_interval)
            }
            None => (self.url.clone(), self.ping_interval),
        };
        Ok((url, require_period("pingInterval", ping_interval)?))
    }

    async fn open(&self, url: &str, subject: &str) -> Result<WsStream, StreamError> {
        let (mut ws, _) = tokio_tungstenite::connect_async(url)
            .await
            .map_err(|e| StreamError::WebSocket(e.to_string()))?;

        let subscribe = OutboundMessage::Subscribe {
            address: subject.to_owned(),
        }
        .to_text()?;
        ws.send(Message::Text(subscribe))
            .await
            .map_err(|e| StreamError::WebSocket(e.to_string()))?;
        Ok(ws)
    }
}

impl std::fmt::Debug for NativeConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NativeConnection")
            .field("url", &self.url)
            .field("ping_interval", &self.ping_interval)
            .field("resolved", &self.resolver.is_some())
            .field("state", &self.state())
            .finish()
    }
}

struct Session {
    ws: WsStream,
    commands: mpsc::UnboundedReceiver<WsCommand>,
    provider: StreamProvider,
    context: u64,
    link: Arc<Mutex<Link>>,
    generation: u64,
    ping: String,
    ping_interval: Duration,
}

/// Background task that owns the socket for one provider context.
async fn run_session(session: Session) {
    let Session {
        ws,
        mut commands,
        provider,
        context,
        link,
        generation,
        ping,
        ping_interval,
    } = session;
    let (mut sink, mut stream) = ws.split();

    let mut keep_alive = time::interval_at(Instant::now() + ping_interval, ping_interval);
    keep_alive.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = keep_alive.tick() => {
                tracing::trace!("ping");
                if let Err(e) = sink.send(Message::Text(ping.clone())).await {
                    tracing::warn!(error = %e, "WebSocket ping failed");
                    break;
                }
            }
            cmd = commands.recv() => {
                match cmd {
                    None | Some(WsCommand::Close) => {
                        let _ = sink.send(Message::Close(None)).await;
                        return;
                    }
                    Some(WsCommand::Send(message)) => {
                        let text = match message.to_text() {
                            Ok(text) => text,
                            Err(e) => {
                                tracing::warn!(error = %e, "dropping unencodable message");
                                continue;
                            }
                        };
                        if let Err(e) = sink.send(Message::Text(text)).await {
                            tracing::warn!(error = %e, "WebSocket send failed");
                            break;
                        }
                    }
                }
            }
            msg = stream.next() => {
                match msg {
                    None => break,
                    Some(Err(e)) => {
                        tracing::warn!(error = %e, "WebSocket receive error");
                        break;
                    }
                    Some(Ok(Message::Text(text))) => receive(&provider, context, &text).await,
                    Some(Ok(Message::Close(_))) => break,
                    _ => {}
                }
            }
        }
    }

    tracing::info!(provider = %provider.name(), context, "WebSocket closed by remote");
    {
        let mut link = lock(&link);
        if link.generation == generation {
            link.state = ConnectionState::Disconnected;
            link.commands = None;
        }
    }
    if let Err(e) = provider.close_if_current(context).await {
        tracing::warn!(error = %e, "close after disconnect");
    }
}

async fn receive(provider: &StreamProvider, context: u64, text: &str) {
    tracing::trace!(frame = text, "recv");

    let message = match InboundMessage::parse(text) {
        Ok(message) => message,
        Err(e) => {
            tracing::debug!(error = %e, "ignoring non-JSON frame");
            return;
        }
    };
    let Some(items) = message.into_items() else {
        return;
    };

    match provider.push(items).await {
        Ok(()) => {}
        Err(StreamError::MissingContext) => {
            tracing::debug!(provider = %provider.name(), "frame after close, dropped");
        }
        Err(e) => {
            tracing::warn!(provider = %provider.name(), error = %e, "push failed");
            provider.fail_context(context, e).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn send_before_open_is_not_connected() {
        let conn = NativeConnection::new("ws://127.0.0.1:1", Duration::from_secs(20));
        assert_eq!(conn.state(), ConnectionState::Disconnected);
        assert_eq!(
            conn.send(OutboundMessage::Ping).unwrap_err(),
            StreamError::NotConnected
        );
    }

    #[test]
    fn close_without_connect_is_noop() {
        let conn = NativeConnection::new("ws://127.0.0.1:1", Duration::from_secs(20));
        conn.close();
        conn.close();
        assert_eq!(conn.state(), ConnectionState::Disconnected);
    }
}
