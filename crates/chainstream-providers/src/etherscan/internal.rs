//! Internal-transaction enrichment.
//!
//! When `includeInternal` is set, every item pushed by an Etherscan provider
//! gets an `internal` array holding the `txlistinternal` result for its hash.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use chainstream_core::error::StreamError;
use chainstream_core::middleware::{Action, ActionContext, ContextHook, Middleware};
use chainstream_core::request::Item;
use chainstream_core::settings::Settings;
use chainstream_http::RequestTransport;

use super::config::EtherscanConfig;
use super::encoder::{internal_tx_request, parse_result};

pub const INTERNAL_FIELD: &str = "internal";

/// Middleware action that looks up internal transactions per item.
pub struct InternalTxEnricher {
    transport: Arc<dyn RequestTransport>,
}

impl InternalTxEnricher {
    pub fn new(transport: Arc<dyn RequestTransport>) -> Self {
        Self { transport }
    }
}

#[async_trait]
impl Action for InternalTxEnricher {
    async fn apply(&self, mut item: Item, ctx: ActionContext) -> Result<Item, StreamError> {
        // Items without a hash pass through untouched.
        let Some(hash) = item.get("hash").and_then(Value::as_str).map(str::to_owned) else {
            return Ok(item);
        };

        let config = EtherscanConfig::from_settings(ctx.settings())?;
        let body = self.transport.execute(&internal_tx_request(&config, &hash)).await?;
        let internal = parse_result(body)?;

        tracing::trace!(
            provider = ctx.provider(),
            hash = %hash,
            count = internal.len(),
            "attached internal transactions"
        );

        if let Some(fields) = item.as_object_mut() {
            fields.insert(INTERNAL_FIELD.to_string(), Value::Array(internal));
        }
        Ok(item)
    }

    fn name(&self) -> &str {
        "include-internal"
    }
}

impl std::fmt::Debug for InternalTxEnricher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InternalTxEnricher").finish_non_exhaustive()
    }
}

/// Context hook registering [`InternalTxEnricher`] when the provider's
/// settings ask for internal transactions.
pub fn include_internal_hook(transport: Arc<dyn RequestTransport>) -> ContextHook {
    Arc::new(move |settings: &Settings, middleware: &mut Middleware| -> Result<(), StreamError> {
        let config = EtherscanConfig::from_settings(settings)?;
        if config.include_internal {
            middleware.register(Arc::new(InternalTxEnricher::new(transport.clone())));
        }
        Ok(())
    })
}
