//! Etherscan provider profiles.
//!
//! | Kind   | Providers                          | Delivery                         |
//! |--------|------------------------------------|----------------------------------|
//! | `http` | `etherscan-http`                   | one `txlist` call, then complete |
//! | `ws`   | `etherscan-ws`                     | push (mainnet) or polling        |
//! | `all`  | `etherscan-http`, `etherscan-ws`   | history followed by live updates |
//!
//! Every provider built here shares one [`RequestTransport`], so the free
//! tier's 5 calls/s budget is spent by a single throttle.

pub mod config;
pub mod encoder;
pub mod internal;

use std::str::FromStr;
use std::sync::Arc;

use chainstream_core::error::StreamError;
use chainstream_core::provider::{Provider, StreamProvider};
use chainstream_core::request::{item_position, Item};
use chainstream_core::settings::Settings;
use chainstream_http::{HttpClient, HttpClientConfig, HttpSource, RequestTransport};
use chainstream_ws::{create_connection, ConnectionConfig, PushSource, TransportCapabilities};

pub use config::{EtherscanConfig, Network, SortOrder, DEFAULT_API_KEY, MAINNET_WS_URL};
pub use encoder::{TxListEncoder, DEFAULT_END_BLOCK, DEFAULT_START_BLOCK};
pub use internal::{include_internal_hook, InternalTxEnricher};

pub const HTTP_PROVIDER: &str = "etherscan-http";
pub const WS_PROVIDER: &str = "etherscan-ws";
const POLL_SOURCE: &str = "etherscan-poll";

/// Field carrying a transaction's block.
pub const BLOCK_FIELD: &str = "blockNumber";

/// Block number of a `txlist` item.
pub fn block_position(item: &Item) -> Option<u64> {
    item_position(item, BLOCK_FIELD)
}

/// HTTP client throttled to the free tier.
pub fn shared_client() -> Result<Arc<HttpClient>, StreamError> {
    HttpClient::new(HttpClientConfig::default()).map(Arc::new)
}

/// One-shot history provider.
pub fn http_provider(
    config: &EtherscanConfig,
    transport: Arc<dyn RequestTransport>,
) -> Result<StreamProvider, StreamError> {
    let source = HttpSource::new(HTTP_PROVIDER, Arc::new(TxListEncoder), transport.clone())
        .with_context_hook(include_internal_hook(transport));
    StreamProvider::new(HTTP_PROVIDER, Arc::new(source), config.to_settings()?)
}

/// Live provider; native push when available.
pub fn ws_provider(
    config: &EtherscanConfig,
    transport: Arc<dyn RequestTransport>,
) -> Result<StreamProvider, StreamError> {
    ws_provider_with_capabilities(config, transport, TransportCapabilities::default())
}

/// Live provider for a runtime with the given `capabilities`.
///
/// The connection kind (push or polling) is chosen here and kept for the
/// provider's lifetime. Endpoint and timer periods are re-read from the
/// provider's settings on every `listen`; a push provider reconfigured to a
/// network without a push endpoint fails its next stream with
/// [`StreamError::Config`].
pub fn ws_provider_with_capabilities(
    config: &EtherscanConfig,
    transport: Arc<dyn RequestTransport>,
    capabilities: TransportCapabilities,
) -> Result<StreamProvider, StreamError> {
    // Polled windows are pushed through the ws provider's own middleware,
    // so the poll source carries no hook.
    let poll_source = Arc::new(HttpSource::new(POLL_SOURCE, Arc::new(TxListEncoder), transport.clone()));
    let connection = create_connection(
        &config.connection_config(),
        capabilities,
        poll_source,
        Arc::new(block_position),
    )
    .with_resolver(Arc::new(|settings: &Settings| -> Result<ConnectionConfig, StreamError> {
        Ok(EtherscanConfig::from_settings(settings)?.connection_config())
    }));
    tracing::debug!(
        network = %config.network,
        connection = connection.kind(),
        "built etherscan ws provider"
    );

    let source = PushSource::new(WS_PROVIDER, connection).with_context_hook(include_internal_hook(transport));
    StreamProvider::new(WS_PROVIDER, Arc::new(source), config.to_settings()?)
}

/// Which providers a streamer is built from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ProviderKind {
    Http,
    Ws,
    #[default]
    All,
}

impl ProviderKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Http => "http",
            Self::Ws => "ws",
            Self::All => "all",
        }
    }
}

impl std::fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProviderKind {
    type Err = StreamError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "http" | "etherscan-http" => Ok(Self::Http),
            "ws" | "websocket" | "etherscan-ws" => Ok(Self::Ws),
            "all" | "etherscan" => Ok(Self::All),
            other => Err(StreamError::Config(format!("unknown provider kind: {other}"))),
        }
    }
}

/// Providers for `kind`, in the order a streamer should run them.
pub fn build(
    kind: ProviderKind,
    config: &EtherscanConfig,
    transport: Arc<dyn RequestTransport>,
) -> Result<Vec<Arc<dyn Provider>>, StreamError> {
    let mut providers: Vec<Arc<dyn Provider>> = Vec::with_capacity(2);
    if matches!(kind, ProviderKind::Http | ProviderKind::All) {
        providers.push(Arc::new(http_provider(config, transport.clone())?));
    }
    if matches!(kind, ProviderKind::Ws | ProviderKind::All) {
        providers.push(Arc::new(ws_provider(config, transport)?));
    }
    Ok(providers)
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use chainstream_core::request::StreamRequest;
    use chainstream_core::streamer::Streamer;
    use chainstream_http::HttpRequest;
    use serde_json::{json, Value};
    use std::sync::Mutex;
    use std::time::Duration;

    /// Answers `txlist` from a fixed set filtered by `startblock` and
    /// `txlistinternal` with one record per hash.
    struct FakeEtherscan {
        txs: Vec<Value>,
        seen: Mutex<Vec<HttpRequest>>,
    }

    impl FakeEtherscan {
        fn new(txs: Vec<Value>) -> Arc<Self> {
            Arc::new(Self {
                txs,
                seen: Mutex::new(Vec::new()),
            })
        }

        fn actions(&self) -> Vec<String> {
            self.seen
                .lock()
                .unwrap()
                .iter()
                .map(|r| r.param_value("action").unwrap_or_default().to_string())
                .collect()
        }
    }

    #[async_trait]
    impl RequestTransport for FakeEtherscan {
        async fn execute(&self, req: &HttpRequest) -> Result<Value, StreamError> {
            self.seen.lock().unwrap().push(req.clone());
            match req.param_value("action") {
                Some("txlist") => {
                    let start: u64 = req.param_value("startblock").unwrap_or("0").parse().unwrap();
                    let page: Vec<Value> = self
                        .txs
                        .iter()
                        .filter(|tx| block_position(tx).is_some_and(|b| b >= start))
                        .cloned()
                        .collect();
                    Ok(json!({"status": "1", "message": "OK", "result": page}))
                }
                Some("txlistinternal") => Ok(json!({
                    "status": "1",
                    "message": "OK",
                    "result": [{"parent": req.param_value("txhash")}],
                })),
                other => Err(StreamError::Other(format!("unexpected action {other:?}"))),
            }
        }
    }

    fn tx(block: u64) -> Value {
        json!({"blockNumber": block.to_string(), "hash": format!("0x{block:x}")})
    }

    #[test]
    fn provider_kind_parse() {
        assert_eq!("HTTP".parse::<ProviderKind>().unwrap(), ProviderKind::Http);
        assert_eq!("websocket".parse::<ProviderKind>().unwrap(), ProviderKind::Ws);
        assert_eq!("etherscan".parse::<ProviderKind>().unwrap(), ProviderKind::All);
        assert!("ipc".parse::<ProviderKind>().is_err());
    }

    #[test]
    fn build_orders_history_before_live() {
        let transport = FakeEtherscan::new(vec![]);
        let names = |kind| {
            build(kind, &EtherscanConfig::default(), transport.clone())
                .unwrap()
                .iter()
                .map(|p| p.name().to_string())
                .collect::<Vec<_>>()
        };
        assert_eq!(names(ProviderKind::Http), vec![HTTP_PROVIDER]);
        assert_eq!(names(ProviderKind::Ws), vec![WS_PROVIDER]);
        assert_eq!(names(ProviderKind::All), vec![HTTP_PROVIDER, WS_PROVIDER]);
    }

    #[test]
    fn block_position_reads_block_number() {
        assert_eq!(block_position(&tx(42)), Some(42));
        assert_eq!(block_position(&json!({"hash": "0x1"})), None);
    }

    #[tokio::test]
    async fn http_provider_streams_history() {
        let transport = FakeEtherscan::new(vec![tx(3), tx(2)]);
        let provider = http_provider(&EtherscanConfig::new(Network::Goerli, "KEY"), transport.clone()).unwrap();

        let items = provider
            .listen(StreamRequest::new("0xabc"))
            .await
            .unwrap()
            .wait_all()
            .await
            .unwrap();

        assert_eq!(items, vec![tx(3), tx(2)]);
        assert!(!provider.has_context());

        let seen = transport.seen.lock().unwrap();
        assert_eq!(seen[0].url, "https://api-goerli.etherscan.io/api");
        assert_eq!(seen[0].param_value("apikey"), Some("KEY"));
    }

    #[tokio::test]
    async fn include_internal_enriches_items() {
        let transport = FakeEtherscan::new(vec![tx(5)]);
        let provider = http_provider(&EtherscanConfig::default(), transport.clone()).unwrap();
        provider.configure("includeInternal", json!(true)).unwrap();

        let items = provider
            .listen(StreamRequest::new("0xabc"))
            .await
            .unwrap()
            .wait_all()
            .await
            .unwrap();

        assert_eq!(items.len(), 1);
        assert_eq!(items[0]["internal"], json!([{"parent": "0x5"}]));
        assert_eq!(transport.actions(), vec!["txlist", "txlistinternal"]);
    }

    #[tokio::test]
    async fn configured_key_reaches_requests() {
        let transport = FakeEtherscan::new(vec![]);
        let provider = http_provider(&EtherscanConfig::default(), transport.clone()).unwrap();
        provider.configure("apiKey", json!("ROTATED")).unwrap();

        provider
            .listen(StreamRequest::new("0xabc"))
            .await
            .unwrap()
            .wait_all()
            .await
            .unwrap();

        let seen = transport.seen.lock().unwrap();
        assert_eq!(seen[0].param_value("apikey"), Some("ROTATED"));
    }

    #[tokio::test]
    async fn polling_ws_provider_forwards_new_blocks_only() {
        // The first window only seeds the cursor; nothing newer ever arrives.
        let transport = FakeEtherscan::new(vec![tx(8), tx(7)]);
        let config = EtherscanConfig {
            network: Network::Sepolia,
            polling_interval: 30,
            ..EtherscanConfig::default()
        };
        let provider = ws_provider(&config, transport.clone()).unwrap();

        let sub = provider.listen(StreamRequest::new("0xabc")).await.unwrap();
        let collector = tokio::spawn(sub.wait_all());

        tokio::time::sleep(Duration::from_millis(200)).await;
        provider.close().await.unwrap();

        let items = collector.await.unwrap().unwrap();
        assert!(items.is_empty(), "seed window must be withheld: {items:?}");

        let seen = transport.seen.lock().unwrap();
        assert!(seen.len() >= 2);
        assert_eq!(seen[0].param_value("startblock"), Some("0"));
        assert_eq!(seen[1].param_value("startblock"), Some("9"));
    }

    #[tokio::test]
    async fn streamer_runs_history_then_live() {
        let transport = FakeEtherscan::new(vec![tx(1)]);
        let config = EtherscanConfig {
            network: Network::Goerli,
            polling_interval: 3_600_000,
            ..EtherscanConfig::default()
        };
        let streamer = Streamer::new(build(ProviderKind::All, &config, transport).unwrap());

        let sub = streamer.stream(StreamRequest::new("0xabc")).await.unwrap();
        assert!(streamer.stream_in_use());

        let collector = tokio::spawn(sub.wait_all());
        tokio::time::sleep(Duration::from_millis(50)).await;
        streamer.close().await.unwrap();

        assert_eq!(collector.await.unwrap().unwrap(), vec![tx(1)]);
        assert!(!streamer.stream_in_use());
    }

    #[tokio::test]
    async fn reconfigured_polling_interval_applies_on_listen() {
        let transport = FakeEtherscan::new(vec![tx(4)]);
        let config = EtherscanConfig {
            network: Network::Sepolia,
            polling_interval: 3_600_000,
            ..EtherscanConfig::default()
        };
        let provider = ws_provider(&config, transport.clone()).unwrap();
        provider.configure("pollingInterval", json!(20)).unwrap();

        let _sub = provider.listen(StreamRequest::new("0xabc")).await.unwrap();
        tokio::time::sleep(Duration::from_millis(300)).await;
        provider.close().await.unwrap();

        assert!(!transport.seen.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn push_provider_moved_to_network_without_endpoint_fails() {
        let provider = ws_provider(&EtherscanConfig::default(), FakeEtherscan::new(vec![])).unwrap();
        provider.configure("network", json!("goerli")).unwrap();

        let err = provider
            .listen(StreamRequest::new("0xabc"))
            .await
            .unwrap()
            .wait_all()
            .await
            .unwrap_err();
        assert_eq!(
            err,
            StreamError::Config("no push endpoint for the configured network".into())
        );
        assert!(!provider.has_context());
    }

    #[tokio::test]
    async fn zero_polling_interval_fails_stream() {
        let transport = FakeEtherscan::new(vec![tx(1)]);
        let config = EtherscanConfig {
            network: Network::Sepolia,
            polling_interval: 0,
            ..EtherscanConfig::default()
        };
        let provider = ws_provider(&config, transport.clone()).unwrap();

        let result = tokio::time::timeout(
            Duration::from_secs(2),
            provider.listen(StreamRequest::new("0xabc")).await.unwrap().wait_all(),
        )
        .await
        .expect("stream must end");

        assert!(matches!(result, Err(StreamError::Config(_))), "{result:?}");
        assert!(!provider.has_context());
        assert!(transport.seen.lock().unwrap().is_empty());
    }
}
