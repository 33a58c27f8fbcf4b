//! Stream contexts and the subscriptions that observe them.
//!
//! A context exists between `listen` and `close`. Every subscriber gets its
//! own unbounded channel; emitting fans an event out to all of them, and
//! completing the context drops the senders so each subscriber sees the end
//! of its stream.

use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use futures::channel::mpsc::{self, UnboundedReceiver, UnboundedSender};
use futures::stream::{self, BoxStream, Stream, StreamExt};
use tokio::task::JoinHandle;

use crate::error::StreamError;
use crate::provider::Provider;
use crate::request::{Item, StreamRequest};

/// One event observed by a subscriber. Completion is the end of the stream.
#[derive(Debug, Clone, PartialEq)]
pub enum StreamEvent {
    Item(Item),
    Error(StreamError),
}

/// Live state of a listening provider.
pub(crate) struct StreamContext {
    id: u64,
    subscribers: Vec<UnboundedSender<StreamEvent>>,
    pending: Vec<StreamRequest>,
}

impl StreamContext {
    pub(crate) fn new(id: u64) -> Self {
        Self {
            id,
            subscribers: Vec::new(),
            pending: Vec::new(),
        }
    }

    pub(crate) fn id(&self) -> u64 {
        self.id
    }

    /// Add a subscriber; it sees every event emitted from now on.
    pub(crate) fn attach(&mut self) -> UnboundedReceiver<StreamEvent> {
        let (tx, rx) = mpsc::unbounded();
        self.subscribers.push(tx);
        rx
    }

    pub(crate) fn emit(&mut self, items: Vec<Item>) {
        for item in items {
            self.broadcast(StreamEvent::Item(item));
        }
    }

    pub(crate) fn fail(&mut self, error: StreamError) {
        self.broadcast(StreamEvent::Error(error));
    }

    /// Queue a start request to run once the context is filled.
    pub(crate) fn defer(&mut self, request: StreamRequest) {
        self.pending.push(request);
    }

    pub(crate) fn take_pending(&mut self) -> Vec<StreamRequest> {
        std::mem::take(&mut self.pending)
    }

    /// End every subscriber's stream.
    pub(crate) fn complete(self) {
        for tx in &self.subscribers {
            tx.close_channel();
        }
    }

    // Dropped subscribers are pruned as their channels reject sends.
    fn broadcast(&mut self, event: StreamEvent) {
        self.subscribers
            .retain(|tx| tx.unbounded_send(event.clone()).is_ok());
    }
}

/// Handle to a provider's output stream.
///
/// Yields [`StreamEvent`]s until the owning provider closes. Dropping a
/// subscription does not close the provider; call [`Subscription::close`].
pub struct Subscription {
    events: BoxStream<'static, StreamEvent>,
    owner: Option<Arc<dyn Provider>>,
}

impl Subscription {
    pub(crate) fn new(rx: UnboundedReceiver<StreamEvent>, owner: Arc<dyn Provider>) -> Self {
        Self {
            events: rx.boxed(),
            owner: Some(owner),
        }
    }

    /// Merge several subscriptions into one.
    ///
    /// Events are yielded as soon as any input produces them; the merged
    /// stream ends once every input has ended.
    pub fn merge(subscriptions: Vec<Subscription>, owner: Option<Arc<dyn Provider>>) -> Self {
        let inputs = subscriptions.into_iter().map(|s| s.events);
        Self {
            events: stream::select_all(inputs).boxed(),
            owner,
        }
    }

    /// Name of the provider behind this subscription.
    pub fn provider_name(&self) -> Option<&str> {
        self.owner.as_deref().map(|p| p.name())
    }

    /// Collect every item until the stream completes.
    ///
    /// Never resolves on an open push stream until the provider is closed
    /// elsewhere. Returns the first error event, if any.
    pub async fn wait_all(mut self) -> Result<Vec<Item>, StreamError> {
        let mut items = Vec::new();
        while let Some(event) = self.events.next().await {
            match event {
                StreamEvent::Item(item) => items.push(item),
                StreamEvent::Error(e) => return Err(e),
            }
        }
        Ok(items)
    }

    /// Drive the subscription on a background task with callbacks.
    ///
    /// An error event ends the observation without calling `on_complete`.
    pub fn observe<I, E, C>(mut self, mut on_item: I, mut on_error: E, on_complete: C) -> JoinHandle<()>
    where
        I: FnMut(Item) + Send + 'static,
        E: FnMut(StreamError) + Send + 'static,
        C: FnOnce() + Send + 'static,
    {
        tokio::spawn(async move {
            while let Some(event) = self.events.next().await {
                match event {
                    StreamEvent::Item(item) => on_item(item),
                    StreamEvent::Error(e) => {
                        on_error(e);
                        return;
                    }
                }
            }
            on_complete();
        })
    }

    /// Close the provider that produced this subscription.
    pub async fn close(&self) -> Result<(), StreamError> {
        match &self.owner {
            Some(provider) => provider.close().await,
            None => Ok(()),
        }
    }
}

impl Stream for Subscription {
    type Item = StreamEvent;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.events.poll_next_unpin(cx)
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("provider", &self.provider_name())
            .finish_non_exhaustive()
    }
}
