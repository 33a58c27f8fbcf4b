//! Etherscan configuration.
//!
//! Free tier: 5 calls/s per API key.
//! <https://docs.etherscan.io/support/rate-limits>

use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use chainstream_core::error::StreamError;
use chainstream_core::settings::Settings;
use chainstream_ws::ConnectionConfig;

/// Placeholder key Etherscan accepts at a reduced rate.
pub const DEFAULT_API_KEY: &str = "YourApiKeyToken";
pub const DEFAULT_PING_INTERVAL_MS: u64 = 20_000;
pub const DEFAULT_POLLING_INTERVAL_MS: u64 = 2_000;
/// Push endpoint; only served for mainnet.
pub const MAINNET_WS_URL: &str = "wss://socket.etherscan.io/wshandler";

/// Networks with an Etherscan API deployment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Network {
    #[default]
    Mainnet,
    Ropsten,
    Rinkeby,
    Goerli,
    Sepolia,
}

impl Network {
    pub const ALL: [Network; 5] = [
        Network::Mainnet,
        Network::Ropsten,
        Network::Rinkeby,
        Network::Goerli,
        Network::Sepolia,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Mainnet => "mainnet",
            Self::Ropsten => "ropsten",
            Self::Rinkeby => "rinkeby",
            Self::Goerli => "goerli",
            Self::Sepolia => "sepolia",
        }
    }

    /// `api` for mainnet, `api-<network>` otherwise.
    fn api_host(&self) -> String {
        match self {
            Self::Mainnet => "api".to_string(),
            other => format!("api-{}", other.as_str()),
        }
    }
}

impl std::fmt::Display for Network {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Network {
    type Err = StreamError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|n| n.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| StreamError::Config(format!("unknown network: {s}")))
    }
}

/// Result ordering requested from `txlist`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    Asc,
    #[default]
    Desc,
}

impl SortOrder {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Asc => "asc",
            Self::Desc => "desc",
        }
    }
}

/// Settings understood by the Etherscan providers.
///
/// Serialized in camelCase, so `configure("apiKey", …)` on a provider maps
/// straight onto [`EtherscanConfig::api_key`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct EtherscanConfig {
    pub network: Network,
    pub api_key: String,
    /// Attach internal transactions to every item.
    pub include_internal: bool,
    /// Keep-alive period on the push connection, in milliseconds.
    pub ping_interval: u64,
    /// Poll period when push is unavailable, in milliseconds.
    pub polling_interval: u64,
    pub sort: SortOrder,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ws_url: Option<String>,
}

impl Default for EtherscanConfig {
    fn default() -> Self {
        Self {
            network: Network::default(),
            api_key: DEFAULT_API_KEY.to_string(),
            include_internal: false,
            ping_interval: DEFAULT_PING_INTERVAL_MS,
            polling_interval: DEFAULT_POLLING_INTERVAL_MS,
            sort: SortOrder::default(),
            base_url: None,
            ws_url: None,
        }
    }
}

impl EtherscanConfig {
    pub fn new(network: Network, api_key: impl Into<String>) -> Self {
        Self {
            network,
            api_key: api_key.into(),
            ..Self::default()
        }
    }

    /// REST endpoint for the configured network.
    pub fn api_base_url(&self) -> String {
        match &self.base_url {
            Some(url) => url.clone(),
            None => format!("https://{}.etherscan.io/api", self.network.api_host()),
        }
    }

    /// Push endpoint, if the configured network has one.
    pub fn push_url(&self) -> Option<String> {
        match (&self.ws_url, self.network) {
            (Some(url), _) => Some(url.clone()),
            (None, Network::Mainnet) => Some(MAINNET_WS_URL.to_string()),
            (None, _) => None,
        }
    }

    pub fn connection_config(&self) -> ConnectionConfig {
        ConnectionConfig {
            url: self.push_url(),
            ping_interval: Duration::from_millis(self.ping_interval),
            polling_interval: Duration::from_millis(self.polling_interval),
        }
    }

    pub fn from_settings(settings: &Settings) -> Result<Self, StreamError> {
        settings.decode()
    }

    pub fn to_settings(&self) -> Result<Settings, StreamError> {
        Settings::from_config(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn api_url_per_network() {
        let url = |n| EtherscanConfig::new(n, "k").api_base_url();
        assert_eq!(url(Network::Mainnet), "https://api.etherscan.io/api");
        assert_eq!(url(Network::Ropsten), "https://api-ropsten.etherscan.io/api");
        assert_eq!(url(Network::Sepolia), "https://api-sepolia.etherscan.io/api");
    }

    #[test]
    fn push_url_mainnet_only() {
        assert_eq!(
            EtherscanConfig::default().push_url().as_deref(),
            Some(MAINNET_WS_URL)
        );
        assert_eq!(EtherscanConfig::new(Network::Rinkeby, "k").push_url(), None);

        let overridden = EtherscanConfig {
            network: Network::Goerli,
            ws_url: Some("ws://localhost:9000".into()),
            ..EtherscanConfig::default()
        };
        assert_eq!(overridden.push_url().as_deref(), Some("ws://localhost:9000"));
    }

    #[test]
    fn defaults() {
        let config = EtherscanConfig::default();
        assert_eq!(config.network, Network::Mainnet);
        assert_eq!(config.api_key, DEFAULT_API_KEY);
        assert!(!config.include_internal);
        assert_eq!(config.sort, SortOrder::Desc);

        let conn = config.connection_config();
        assert_eq!(conn.ping_interval, Duration::from_secs(20));
        assert_eq!(conn.polling_interval, Duration::from_secs(2));
    }

    #[test]
    fn settings_use_camel_case_keys() {
        let mut settings = EtherscanConfig::default().to_settings().unwrap();
        assert_eq!(settings.get("apiKey").and_then(|v| v.as_str()), Some(DEFAULT_API_KEY));

        settings.set("apiKey", "X");
        settings.set("network", "goerli");
        settings.set("includeInternal", true);
        settings.set("concurrency", 4);

        let config = EtherscanConfig::from_settings(&settings).unwrap();
        assert_eq!(config.api_key, "X");
        assert_eq!(config.network, Network::Goerli);
        assert!(config.include_internal);
    }

    #[test]
    fn network_parse() {
        assert_eq!("Rinkeby".parse::<Network>().unwrap(), Network::Rinkeby);
        assert!(matches!("kovan".parse::<Network>(), Err(StreamError::Config(_))));
    }
}
