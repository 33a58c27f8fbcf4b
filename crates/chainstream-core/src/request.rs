//! Stream items and the request that starts a stream.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A single stream item (a transaction object as returned by the indexer).
pub type Item = Value;

/// Arguments bound to a provider's deferred start action.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamRequest {
    /// The subject being watched (an account address).
    pub subject: String,
    /// First position of the requested range (inclusive).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from_position: Option<u64>,
    /// Last position of the requested range (inclusive).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub to_position: Option<u64>,
}

impl StreamRequest {
    /// Request everything known for `subject`.
    pub fn new(subject: impl Into<String>) -> Self {
        Self {
            subject: subject.into(),
            from_position: None,
            to_position: None,
        }
    }

    /// Bound the request to `[from, to]`.
    pub fn range(mut self, from: u64, to: u64) -> Self {
        self.from_position = Some(from);
        self.to_position = Some(to);
        self
    }
}

/// Read the numeric position stored under `field` in `item`.
///
/// Indexers report positions as JSON numbers, decimal strings or `0x` hex
/// strings; all three are accepted.
pub fn item_position(item: &Item, field: &str) -> Option<u64> {
    match item.get(field)? {
        Value::Number(n) => n.as_u64(),
        Value::String(s) => {
            let s = s.trim();
            match s.strip_prefix("0x") {
                Some(hex) => u64::from_str_radix(hex, 16).ok(),
                None => s.parse().ok(),
            }
        }
        _ => None,
    }
}
