//! Providers — the listen/push/close lifecycle around a [`Source`].
//!
//! ```text
//!          listen()                close()
//!   Idle ───────────► Listening ───────────► Idle
//!                       │  ▲
//!              start()  │  │ push(items) → middleware → subscribers
//!                       ▼  │
//!                      Source
//! ```
//!
//! `listen` while listening is rejected, never queued. Any failure while
//! listening (start, pipeline, transport) is delivered to subscribers as an
//! error event and then closes the provider.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::Value;

use crate::context::{StreamContext, Subscription};
use crate::error::StreamError;
use crate::middleware::{Action, ActionContext, Middleware};
use crate::request::{Item, StreamRequest};
use crate::settings::{Settings, CONCURRENCY_KEY};
use crate::source::Source;
use crate::sync::lock;

/// A stream producer with a single-context lifecycle.
///
/// # Object Safety
/// The trait is object-safe and is stored as `Arc<dyn Provider>`.
#[async_trait]
pub trait Provider: Send + Sync + 'static {
    /// Identifier used in logs.
    fn name(&self) -> &str;

    /// Create a stream context and start producing items for `request`.
    async fn listen(&self, request: StreamRequest) -> Result<Subscription, StreamError>;

    /// Populate the live context for `request`.
    async fn start(&self, request: StreamRequest) -> Result<(), StreamError>;

    /// Run `items` through the middleware and emit them in order.
    async fn push(&self, items: Vec<Item>) -> Result<(), StreamError>;

    /// Attach another observer to the live context.
    fn subscribe(&self) -> Result<Subscription, StreamError>;

    /// Complete the stream and release the source. Idempotent.
    async fn close(&self) -> Result<(), StreamError>;

    /// Set a configuration key. Rejected while a context is live.
    fn configure(&self, key: &str, value: Value) -> Result<(), StreamError>;

    fn has_context(&self) -> bool;
}

struct State {
    context: Option<StreamContext>,
    middleware: Middleware,
}

struct Inner {
    name: String,
    source: Arc<dyn Source>,
    settings: Mutex<Settings>,
    state: Mutex<State>,
    next_context: AtomicU64,
}

/// The leaf [`Provider`]: a [`Source`] plus settings and a middleware pipeline.
///
/// Cloning is cheap and yields a handle to the same provider.
#[derive(Clone)]
pub struct StreamProvider {
    inner: Arc<Inner>,
}

impl StreamProvider {
    /// Build a provider; the `concurrency` setting sizes its pipeline.
    pub fn new(
        name: impl Into<String>,
        source: Arc<dyn Source>,
        settings: Settings,
    ) -> Result<Self, StreamError> {
        let middleware = match settings.concurrency()? {
            Some(n) => Middleware::with_concurrency(n)?,
            None => Middleware::new(),
        };

        Ok(Self {
            inner: Arc::new(Inner {
                name: name.into(),
                source,
                settings: Mutex::new(settings),
                state: Mutex::new(State {
                    context: None,
                    middleware,
                }),
                next_context: AtomicU64::new(1),
            }),
        })
    }

    /// Copy of the current settings.
    pub fn settings(&self) -> Settings {
        lock(&self.inner.settings).clone()
    }

    /// Append an action to the pipeline of the current (or next) context.
    ///
    /// Actions are dropped on `close`; register settings-dependent actions
    /// from [`Source::on_context`] instead.
    pub fn register(&self, action: Arc<dyn Action>) {
        lock(&self.inner.state).middleware.register(action);
    }

    pub fn middleware_len(&self) -> usize {
        lock(&self.inner.state).middleware.len()
    }

    /// Id of the live context, if any.
    ///
    /// Long-lived sources capture it when they start so that late events
    /// only ever reach the context they were started for.
    pub fn context_id(&self) -> Option<u64> {
        lock(&self.inner.state).context.as_ref().map(StreamContext::id)
    }

    /// Deliver `error` to the subscribers of the live context, then close.
    pub async fn fail(&self, error: StreamError) {
        if let Some(id) = self.context_id() {
            self.fail_context(id, error).await;
        }
    }

    /// Like [`fail`](Self::fail), but a no-op unless context `id` is live.
    pub async fn fail_context(&self, id: u64, error: StreamError) {
        let failed = {
            let mut state = lock(&self.inner.state);
            match state.context.as_mut() {
                Some(ctx) if ctx.id() == id => {
                    ctx.fail(error);
                    true
                }
                _ => false,
            }
        };
        if failed {
            if let Err(e) = self.close_context(Some(id)).await {
                tracing::warn!(provider = %self.inner.name, error = %e, "close after failure");
            }
        }
    }

    /// Close context `id`; a no-op once a newer context has replaced it.
    pub async fn close_if_current(&self, id: u64) -> Result<(), StreamError> {
        self.close_context(Some(id)).await
    }

    /// Close the live context, or only context `expected` when given.
    async fn close_context(&self, expected: Option<u64>) -> Result<(), StreamError> {
        let taken = {
            let mut state = lock(&self.inner.state);
            match (expected, state.context.as_ref()) {
                (_, None) => return Ok(()),
                (Some(id), Some(ctx)) if ctx.id() != id => return Ok(()),
                _ => {}
            }
            state.middleware.clear();
            state.context.take()
        };

        match taken {
            Some(ctx) => {
                tracing::debug!(provider = %self.inner.name, context = ctx.id(), "close");
                ctx.complete();
                self.inner.source.close().await
            }
            None => Ok(()),
        }
    }

    fn fill_context(&self) -> Result<(), StreamError> {
        let settings = self.settings();
        let mut state = lock(&self.inner.state);
        self.inner.source.on_context(&settings, &mut state.middleware)
    }

    fn spawn_pending(&self, id: u64) {
        let pending = {
            let mut state = lock(&self.inner.state);
            match state.context.as_mut() {
                Some(ctx) if ctx.id() == id => ctx.take_pending(),
                _ => return,
            }
        };

        let provider = self.clone();
        tokio::spawn(async move {
            for request in pending {
                if let Err(e) = provider.start(request).await {
                    tracing::warn!(
                        provider = %provider.inner.name,
                        error = %e,
                        "start failed"
                    );
                    provider.fail_context(id, e).await;
                    break;
                }
            }
        });
    }
}

#[async_trait]
impl Provider for StreamProvider {
    fn name(&self) -> &str {
        &self.inner.name
    }

    async fn listen(&self, request: StreamRequest) -> Result<Subscription, StreamError> {
        let (id, rx) = {
            let mut state = lock(&self.inner.state);
            if state.context.is_some() {
                return Err(StreamError::ContextAlreadySet);
            }
            let id = self.inner.next_context.fetch_add(1, Ordering::Relaxed);
            let mut ctx = StreamContext::new(id);
            ctx.defer(request);
            let rx = ctx.attach();
            state.context = Some(ctx);
            (id, rx)
        };

        tracing::debug!(
            provider = %self.inner.name,
            source = self.inner.source.name(),
            context = id,
            "listen"
        );

        if let Err(e) = self.fill_context() {
            self.close_context(Some(id)).await?;
            return Err(e);
        }

        self.spawn_pending(id);
        Ok(Subscription::new(rx, Arc::new(self.clone())))
    }

    async fn start(&self, request: StreamRequest) -> Result<(), StreamError> {
        self.inner.source.start(self, &request).await
    }

    async fn push(&self, items: Vec<Item>) -> Result<(), StreamError> {
        let (id, middleware) = {
            let state = lock(&self.inner.state);
            let ctx = state.context.as_ref().ok_or(StreamError::MissingContext)?;
            (ctx.id(), state.middleware.clone())
        };

        tracing::debug!(provider = %self.inner.name, items = items.len(), "push items");

        let action_ctx = ActionContext::new(&self.inner.name, self.settings());
        let items = middleware.dispatch(&action_ctx, items).await?;

        let mut state = lock(&self.inner.state);
        match state.context.as_mut() {
            Some(ctx) if ctx.id() == id => {
                ctx.emit(items);
                Ok(())
            }
            _ => Err(StreamError::MissingContext),
        }
    }

    fn subscribe(&self) -> Result<Subscription, StreamError> {
        let rx = lock(&self.inner.state)
            .context
            .as_mut()
            .map(StreamContext::attach)
            .ok_or(StreamError::MissingContext)?;
        Ok(Subscription::new(rx, Arc::new(self.clone())))
    }

    async fn close(&self) -> Result<(), StreamError> {
        self.close_context(None).await
    }

    fn configure(&self, key: &str, value: Value) -> Result<(), StreamError> {
        let mut state = lock(&self.inner.state);
        if state.context.is_some() {
            return Err(StreamError::ContextAlreadySet);
        }
        if key == CONCURRENCY_KEY {
            let n = value.as_u64().ok_or_else(|| {
                StreamError::Config(format!("{CONCURRENCY_KEY} must be an integer, got {value}"))
            })?;
            state.middleware.set_concurrency(n as usize)?;
        }
        lock(&self.inner.settings).set(key, value);
        Ok(())
    }

    fn has_context(&self) -> bool {
        lock(&self.inner.state).context.is_some()
    }
}

impl std::fmt::Debug for StreamProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamProvider")
            .field("name", &self.inner.name)
            .field("source", &self.inner.source.name())
            .field("listening", &self.has_context())
            .finish()
    }
}
