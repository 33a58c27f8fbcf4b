//! Middleware pipeline — ordered, bounded-concurrency item transforms.
//!
//! ```text
//! push(items) → [action 1] → [action 2] → … → emit (input order)
//!                 ↑ at most `concurrency` items in flight
//! ```
//!
//! Each item runs through every registered action in registration order.
//! Items are processed on their own Tokio task, so a failing item does not
//! cancel the transforms already running for its siblings.

use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use futures::stream::{self, StreamExt, TryStreamExt};

use crate::error::StreamError;
use crate::request::Item;
use crate::settings::Settings;

/// Default number of items transformed concurrently.
pub const DEFAULT_CONCURRENCY: usize = 10;

/// What an action sees about the provider that dispatched the item.
#[derive(Debug, Clone)]
pub struct ActionContext {
    provider: Arc<str>,
    settings: Arc<Settings>,
}

impl ActionContext {
    pub fn new(provider: &str, settings: Settings) -> Self {
        Self {
            provider: Arc::from(provider),
            settings: Arc::new(settings),
        }
    }

    /// Name of the dispatching provider.
    pub fn provider(&self) -> &str {
        &self.provider
    }

    /// Snapshot of the provider settings at dispatch time.
    pub fn settings(&self) -> &Settings {
        &self.settings
    }
}

/// A single item transform.
#[async_trait]
pub trait Action: Send + Sync + 'static {
    async fn apply(&self, item: Item, ctx: ActionContext) -> Result<Item, StreamError>;

    /// Name used in logs.
    fn name(&self) -> &str {
        "action"
    }
}

/// Adapter turning an async closure into an [`Action`].
pub struct FnAction<F> {
    name: String,
    f: F,
}

/// Wrap `f` as a named [`Action`].
pub fn action_fn<F, Fut>(name: impl Into<String>, f: F) -> FnAction<F>
where
    F: Fn(Item, ActionContext) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Item, StreamError>> + Send + 'static,
{
    FnAction {
        name: name.into(),
        f,
    }
}

#[async_trait]
impl<F, Fut> Action for FnAction<F>
where
    F: Fn(Item, ActionContext) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Item, StreamError>> + Send + 'static,
{
    async fn apply(&self, item: Item, ctx: ActionContext) -> Result<Item, StreamError> {
        (self.f)(item, ctx).await
    }

    fn name(&self) -> &str {
        &self.name
    }
}

/// Hook run on context creation; registers actions based on settings.
pub type ContextHook =
    Arc<dyn Fn(&Settings, &mut Middleware) -> Result<(), StreamError> + Send + Sync>;

/// Ordered chain of actions applied to every pushed item.
#[derive(Clone)]
pub struct Middleware {
    actions: Vec<Arc<dyn Action>>,
    concurrency: usize,
}

impl Middleware {
    /// Empty pipeline with [`DEFAULT_CONCURRENCY`].
    pub fn new() -> Self {
        Self {
            actions: Vec::new(),
            concurrency: DEFAULT_CONCURRENCY,
        }
    }

    /// Empty pipeline bounded to `concurrency` items in flight.
    pub fn with_concurrency(concurrency: usize) -> Result<Self, StreamError> {
        let mut middleware = Self::new();
        middleware.set_concurrency(concurrency)?;
        Ok(middleware)
    }

    pub fn set_concurrency(&mut self, concurrency: usize) -> Result<(), StreamError> {
        if concurrency == 0 {
            return Err(StreamError::InvalidAction(
                "middleware concurrency must be positive".into(),
            ));
        }
        self.concurrency = concurrency;
        Ok(())
    }

    /// Append an action to the chain.
    pub fn register(&mut self, action: Arc<dyn Action>) -> &mut Self {
        tracing::trace!(action = action.name(), "register middleware action");
        self.actions.push(action);
        self
    }

    /// Append an async closure to the chain.
    pub fn register_fn<F, Fut>(&mut self, name: impl Into<String>, f: F) -> &mut Self
    where
        F: Fn(Item, ActionContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Item, StreamError>> + Send + 'static,
    {
        self.register(Arc::new(action_fn(name, f)))
    }

    /// Drop every registered action, keeping the concurrency bound.
    pub fn clear(&mut self) {
        self.actions.clear();
    }

    pub fn concurrency(&self) -> usize {
        self.concurrency
    }

    pub fn len(&self) -> usize {
        self.actions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }

    /// Run every item through the chain, returning results in input order.
    ///
    /// The first failing item aborts the batch with its error.
    pub async fn dispatch(
        &self,
        ctx: &ActionContext,
        items: Vec<Item>,
    ) -> Result<Vec<Item>, StreamError> {
        if self.actions.is_empty() || items.is_empty() {
            return Ok(items);
        }

        tracing::debug!(
            provider = %ctx.provider(),
            items = items.len(),
            actions = self.actions.len(),
            concurrency = self.concurrency,
            "dispatch items"
        );

        let actions: Arc<[Arc<dyn Action>]> = self.actions.clone().into();

        stream::iter(items)
            .map(|item| {
                let actions = Arc::clone(&actions);
                let ctx = ctx.clone();
                tokio::spawn(async move { apply_chain(&actions, item, ctx).await })
            })
            .buffered(self.concurrency)
            .map(|joined| match joined {
                Ok(result) => result,
                Err(e) => Err(StreamError::Action(format!("action task failed: {e}"))),
            })
            .try_collect()
            .await
    }
}

impl Default for Middleware {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Middleware {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Middleware")
            .field("actions", &self.actions.iter().map(|a| a.name()).collect::<Vec<_>>())
            .field("concurrency", &self.concurrency)
            .finish()
    }
}

async fn apply_chain(
    actions: &[Arc<dyn Action>],
    mut item: Item,
    ctx: ActionContext,
) -> Result<Item, StreamError> {
    for action in actions {
        tracing::trace!(action = action.name(), "apply");
        item = action.apply(item, ctx.clone()).await?;
    }
    Ok(item)
}
