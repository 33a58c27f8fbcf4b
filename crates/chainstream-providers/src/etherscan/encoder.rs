//! `account` module requests and their response envelope.
//!
//! <https://docs.etherscan.io/api-endpoints/accounts>

use serde_json::Value;

use chainstream_core::error::StreamError;
use chainstream_core::request::{Item, StreamRequest};
use chainstream_core::settings::Settings;
use chainstream_http::{HttpRequest, RequestEncoder};

use super::config::EtherscanConfig;

pub const DEFAULT_START_BLOCK: u64 = 0;
pub const DEFAULT_END_BLOCK: u64 = 99_999_999_999_999;

/// `action=txlist` for the requested address and block range.
pub fn tx_list_request(config: &EtherscanConfig, address: &str, start_block: u64, end_block: u64) -> HttpRequest {
    HttpRequest::get(config.api_base_url())
        .param("module", "account")
        .param("action", "txlist")
        .param("address", address)
        .param("startblock", start_block)
        .param("endblock", end_block)
        .param("sort", config.sort.as_str())
        .param("apikey", &config.api_key)
}

/// `action=txlistinternal` for one transaction hash.
pub fn internal_tx_request(config: &EtherscanConfig, tx_hash: &str) -> HttpRequest {
    HttpRequest::get(config.api_base_url())
        .param("module", "account")
        .param("action", "txlistinternal")
        .param("txhash", tx_hash)
        .param("apikey", &config.api_key)
}

/// Unwrap `{"status", "message", "result"}`.
///
/// An array `result` is the item list (empty when nothing was found). A
/// non-array `result` with status `"0"` is Etherscan reporting an error
/// such as an invalid key or an exceeded rate limit.
pub fn parse_result(body: Value) -> Result<Vec<Item>, StreamError> {
    let Value::Object(mut envelope) = body else {
        return Err(StreamError::Deserialization(format!(
            "expected response object, got {body}"
        )));
    };

    match envelope.remove("result") {
        Some(Value::Array(items)) => Ok(items),
        None | Some(Value::Null) => Ok(Vec::new()),
        Some(other) => {
            let status = envelope.get("status").and_then(Value::as_str).unwrap_or_default();
            let message = envelope.get("message").and_then(Value::as_str).unwrap_or_default();
            if status == "0" {
                Err(StreamError::Other(format!("Etherscan error ({message}): {other}")))
            } else {
                Err(StreamError::Deserialization(format!("unexpected result: {other}")))
            }
        }
    }
}

/// Encodes stream requests as `txlist` calls.
#[derive(Debug, Clone, Copy, Default)]
pub struct TxListEncoder;

impl RequestEncoder for TxListEncoder {
    fn encode(&self, request: &StreamRequest, settings: &Settings) -> Result<HttpRequest, StreamError> {
        let config = EtherscanConfig::from_settings(settings)?;
        Ok(tx_list_request(
            &config,
            &request.subject,
            request.from_position.unwrap_or(DEFAULT_START_BLOCK),
            request.to_position.unwrap_or(DEFAULT_END_BLOCK),
        ))
    }

    fn transform(&self, body: Value) -> Result<Vec<Item>, StreamError> {
        parse_result(body)
    }
}
