//! Polling fallback: periodic bounded requests standing in for push.
//!
//! Each tick requests `[cursor, OPEN_END_POSITION]` through a throwaway
//! request-only provider, then moves the cursor past the highest position
//! seen. The first non-empty window after the cursor starts over is history
//! the caller did not ask for, so it only positions the cursor and is not
//! forwarded.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::oneshot;
use tokio::time::{self, Instant, MissedTickBehavior};

use chainstream_core::error::StreamError;
use chainstream_core::provider::{Provider, StreamProvider};
use chainstream_core::request::{Item, StreamRequest};
use chainstream_core::settings::Settings;
use chainstream_core::source::Source;
use chainstream_core::sync::lock;

use crate::connection::{require_period, ConfigResolver, ConnectionState};

/// Cursor value before the first window has been seen.
pub const INITIAL_CURSOR: u64 = 0;

/// Upper bound of every polling window.
pub const OPEN_END_POSITION: u64 = 99_999_999_999_999;

/// Reads an item's position (block number).
pub type PositionFn = Arc<dyn Fn(&Item) -> Option<u64> + Send + Sync>;

struct Poller {
    interval: Duration,
    source: Arc<dyn Source>,
    position: PositionFn,
    state: Mutex<ConnectionState>,
    cursor: Mutex<u64>,
}

/// Connection that polls a request source on a timer.
pub struct PollingConnection {
    inner: Arc<Poller>,
    resolver: Option<ConfigResolver>,
    shutdown: Mutex<Option<oneshot::Sender<()>>>,
}

impl PollingConnection {
    pub fn new(interval: Duration, source: Arc<dyn Source>, position: PositionFn) -> Self {
        Self {
            inner: Arc::new(Poller {
                interval,
                source,
                position,
                state: Mutex::new(ConnectionState::Disconnected),
                cursor: Mutex::new(INITIAL_CURSOR),
            }),
            resolver: None,
            shutdown: Mutex::new(None),
        }
    }

    /// Take the poll period from the provider's settings on each connect
    /// instead of the interval given to [`new`](Self::new).
    pub fn with_resolver(mut self, resolver: ConfigResolver) -> Self {
        self.resolver = Some(resolver);
        self
    }

    /// Poll period given at construction.
    pub fn interval(&self) -> Duration {
        self.inner.interval
    }

    pub fn cursor(&self) -> u64 {
        *lock(&self.inner.cursor)
    }

    pub fn state(&self) -> ConnectionState {
        *lock(&self.inner.state)
    }

    /// Start the poll timer for `subject`. A no-op while already polling.
    pub fn connect(&self, provider: &StreamProvider, subject: &str) -> Result<(), StreamError> {
        let mut shutdown = lock(&self.shutdown);
        if shutdown.is_some() {
            tracing::debug!(subject, "already polling");
            return Ok(());
        }
        let interval = match &self.resolver {
            Some(resolve) => resolve(&provider.settings())?.polling_interval,
            None => self.inner.interval,
        };
        let interval = require_period("pollingInterval", interval)?;

        let (tx, mut rx) = oneshot::channel();
        *shutdown = Some(tx);
        *lock(&self.inner.state) = ConnectionState::Connected;

        tracing::info!(
            subject,
            interval_ms = interval.as_millis() as u64,
            "polling started"
        );

        let poller = Arc::clone(&self.inner);
        let provider = provider.clone();
        let subject = subject.to_owned();
        tokio::spawn(async move {
            let mut ticker = time::interval_at(Instant::now() + interval, interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = &mut rx => break,
                    _ = ticker.tick() => poller.tick(&provider, &subject).await,
                }
            }
            tracing::debug!(subject = %subject, "polling stopped");
        });
        Ok(())
    }

    /// Stop the timer and reset the cursor. Idempotent.
    pub fn close(&self) {
        if let Some(tx) = lock(&self.shutdown).take() {
            let _ = tx.send(());
        }
        let mut state = lock(&self.inner.state);
        *state = ConnectionState::Disconnected;
        *lock(&self.inner.cursor) = INITIAL_CURSOR;
    }
}

impl Poller {
    async fn tick(&self, provider: &StreamProvider, subject: &str) {
        let cursor = *lock(&self.cursor);
        let request = StreamRequest::new(subject).range(cursor, OPEN_END_POSITION);

        let mut items = match self.fetch(provider.settings(), request).await {
            Ok(items) => items,
            Err(e) => {
                tracing::warn!(subject, cursor, error = %e, "poll failed");
                return;
            }
        };
        if items.is_empty() {
            tracing::trace!(subject, cursor, "poll: no new items");
            return;
        }

        items.sort_by_key(|item| (self.position)(item));
        let Some(highest) = items.iter().filter_map(|item| (self.position)(item)).max() else {
            tracing::warn!(subject, items = items.len(), "poll: items carry no position");
            return;
        };

        let previous = {
            let state = lock(&self.state);
            // Closed while the request was in flight.
            if *state != ConnectionState::Connected {
                return;
            }
            let mut cursor = lock(&self.cursor);
            std::mem::replace(&mut *cursor, highest + 1)
        };

        if previous == INITIAL_CURSOR {
            tracing::debug!(subject, cursor = highest + 1, withheld = items.len(), "poll: initial window");
            return;
        }

        match provider.push(items).await {
            Ok(()) => {}
            Err(StreamError::MissingContext) => {
                tracing::debug!(subject, "poll result after close, dropped");
            }
            Err(e) => {
                tracing::warn!(subject, error = %e, "push failed");
                provider.fail(e).await;
            }
        }
    }

    // Never touches the caller's context: the request runs on its own provider.
    async fn fetch(&self, settings: Settings, request: StreamRequest) -> Result<Vec<Item>, StreamError> {
        let tick = StreamProvider::new("polling-tick", Arc::clone(&self.source), settings)?;
        tick.listen(request).await?.wait_all().await
    }
}

impl std::fmt::Debug for PollingConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PollingConnection")
            .field("interval", &self.inner.interval)
            .field("source", &self.inner.source.name())
            .field("state", &self.state())
            .field("cursor", &self.cursor())
            .finish()
    }
}
