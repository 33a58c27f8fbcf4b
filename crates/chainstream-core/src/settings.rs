//! Provider settings — the opaque parameter bag behind `configure`.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::StreamError;

/// Key that sizes a provider's middleware pipeline.
pub const CONCURRENCY_KEY: &str = "concurrency";

/// Key/value configuration owned by a single provider.
///
/// Providers copy their settings at construction; typed views are decoded
/// with serde when a source needs them.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Settings(Map<String, Value>);

impl Settings {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build settings from any serializable config struct.
    pub fn from_config<T: Serialize>(config: &T) -> Result<Self, StreamError> {
        match serde_json::to_value(config)? {
            Value::Object(map) => Ok(Self(map)),
            other => Err(StreamError::Config(format!(
                "settings must be an object, got {other}"
            ))),
        }
    }

    /// Decode a typed view of the settings.
    pub fn decode<T: DeserializeOwned>(&self) -> Result<T, StreamError> {
        serde_json::from_value(Value::Object(self.0.clone()))
            .map_err(|e| StreamError::Config(e.to_string()))
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.0.insert(key.into(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    /// Middleware concurrency requested by these settings, if any.
    pub fn concurrency(&self) -> Result<Option<usize>, StreamError> {
        match self.get(CONCURRENCY_KEY) {
            None | Some(Value::Null) => Ok(None),
            Some(value) => value
                .as_u64()
                .map(|n| Some(n as usize))
                .ok_or_else(|| {
                    StreamError::Config(format!("{CONCURRENCY_KEY} must be an integer, got {value}"))
                }),
        }
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[derive(Debug, Serialize, Deserialize, PartialEq)]
    #[serde(rename_all = "camelCase")]
    struct Sample {
        api_key: String,
        #[serde(default)]
        ping_interval: u64,
    }

    #[test]
    fn round_trip_typed_config() {
        let mut settings = Settings::from_config(&Sample {
            api_key: "key".into(),
            ping_interval: 20_000,
        })
        .unwrap();
        settings.set("apiKey", "X");

        let decoded: Sample = settings.decode().unwrap();
        assert_eq!(decoded.api_key, "X");
        assert_eq!(decoded.ping_interval, 20_000);
    }

    #[test]
    fn decode_reports_config_error() {
        let mut settings = Settings::new();
        settings.set("apiKey", 5);
        let err = settings.decode::<Sample>().unwrap_err();
        assert!(matches!(err, StreamError::Config(_)));
    }

    #[test]
    fn concurrency_setting() {
        let mut settings = Settings::new();
        assert_eq!(settings.concurrency().unwrap(), None);
        settings.set(CONCURRENCY_KEY, 4);
        assert_eq!(settings.concurrency().unwrap(), Some(4));
        settings.set(CONCURRENCY_KEY, json!("four"));
        assert!(settings.concurrency().is_err());
    }
}
