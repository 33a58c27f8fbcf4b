//! Composite provider fanning operations out to several children.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use crate::context::Subscription;
use crate::error::StreamError;
use crate::provider::Provider;
use crate::request::{Item, StreamRequest};

/// Ordered set of child providers driven as one.
///
/// Operations visit children sequentially and stop at the first failure.
/// The output stream is the merge of every child's stream: no ordering
/// across children, completing once all of them complete.
#[derive(Clone)]
pub struct MultiProvider {
    name: String,
    children: Arc<Vec<Arc<dyn Provider>>>,
}

impl MultiProvider {
    pub fn new(name: impl Into<String>, children: Vec<Arc<dyn Provider>>) -> Self {
        Self {
            name: name.into(),
            children: Arc::new(children),
        }
    }

    pub fn children(&self) -> &[Arc<dyn Provider>] {
        &self.children
    }

    /// Number of children in the set.
    pub fn len(&self) -> usize {
        self.children.len()
    }

    pub fn is_empty(&self) -> bool {
        self.children.is_empty()
    }

    fn merged(&self, subscriptions: Vec<Subscription>) -> Subscription {
        Subscription::merge(subscriptions, Some(Arc::new(self.clone())))
    }
}

#[async_trait]
impl Provider for MultiProvider {
    fn name(&self) -> &str {
        &self.name
    }

    async fn listen(&self, request: StreamRequest) -> Result<Subscription, StreamError> {
        let mut subscriptions = Vec::with_capacity(self.children.len());
        for child in self.children.iter() {
            subscriptions.push(child.listen(request.clone()).await?);
        }
        tracing::debug!(provider = %self.name, children = subscriptions.len(), "listen");
        Ok(self.merged(subscriptions))
    }

    async fn start(&self, request: StreamRequest) -> Result<(), StreamError> {
        for child in self.children.iter() {
            child.start(request.clone()).await?;
        }
        Ok(())
    }

    async fn push(&self, items: Vec<Item>) -> Result<(), StreamError> {
        for child in self.children.iter() {
            child.push(items.clone()).await?;
        }
        Ok(())
    }

    /// Merge the streams of every child that is currently listening.
    fn subscribe(&self) -> Result<Subscription, StreamError> {
        let subscriptions = self
            .children
            .iter()
            .filter(|child| child.has_context())
            .map(|child| child.subscribe())
            .collect::<Result<Vec<_>, _>>()?;
        if subscriptions.is_empty() {
            return Err(StreamError::MissingContext);
        }
        Ok(self.merged(subscriptions))
    }

    async fn close(&self) -> Result<(), StreamError> {
        for child in self.children.iter() {
            child.close().await?;
        }
        Ok(())
    }

    fn configure(&self, key: &str, value: Value) -> Result<(), StreamError> {
        for child in self.children.iter() {
            child.configure(key, value.clone())?;
        }
        Ok(())
    }

    fn has_context(&self) -> bool {
        self.children.iter().any(|child| child.has_context())
    }
}

impl std::fmt::Debug for MultiProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MultiProvider")
            .field("name", &self.name)
            .field(
                "children",
                &self.children.iter().map(|c| c.name()).collect::<Vec<_>>(),
            )
            .finish()
    }
}
