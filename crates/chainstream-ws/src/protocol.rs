//! Push transport subprotocol — one JSON object per text frame.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use chainstream_core::error::StreamError;
use chainstream_core::request::Item;

/// Client → server messages.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "lowercase")]
pub enum OutboundMessage {
    /// Keep-alive, `{"event":"ping"}`.
    Ping,
    /// Watch an address, `{"event":"txlist","address":…}`.
    #[serde(rename = "txlist")]
    Subscribe { address: String },
}

impl OutboundMessage {
    pub fn to_text(&self) -> Result<String, StreamError> {
        Ok(serde_json::to_string(self)?)
    }
}

/// Server → client message. Only `result` matters; welcome, subscribe
/// acknowledgements and pongs carry none.
///
/// The other fields are kept as raw JSON: the server is loose with their
/// types and a frame must never be dropped over them.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct InboundMessage {
    #[serde(default)]
    pub event: Option<Value>,
    #[serde(default)]
    pub status: Option<Value>,
    #[serde(default)]
    pub message: Option<Value>,
    #[serde(default)]
    pub result: Option<Value>,
}

impl InboundMessage {
    pub fn parse(text: &str) -> Result<Self, StreamError> {
        Ok(serde_json::from_str(text)?)
    }

    /// `event` when it is a string.
    pub fn event(&self) -> Option<&str> {
        self.event.as_ref().and_then(Value::as_str)
    }

    /// The item batch carried by this message, if it has a non-empty
    /// `result` array.
    pub fn into_items(self) -> Option<Vec<Item>> {
        match self.result {
            Some(Value::Array(items)) if !items.is_empty() => Some(items),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn outbound_wire_format() {
        let ping: Value = serde_json::from_str(&OutboundMessage::Ping.to_text().unwrap()).unwrap();
        assert_eq!(ping, json!({"event": "ping"}));

        let sub = OutboundMessage::Subscribe {
            address: "0xabc".into(),
        };
        let sub: Value = serde_json::from_str(&sub.to_text().unwrap()).unwrap();
        assert_eq!(sub, json!({"event": "txlist", "address": "0xabc"}));
    }

    #[test]
    fn result_batch_becomes_items() {
        let msg = InboundMessage::parse(
            r#"{"event":"txlist","address":"0xabc","result":[{"hash":"0x1"},{"hash":"0x2"}]}"#,
        )
        .unwrap();
        assert_eq!(msg.event(), Some("txlist"));
        assert_eq!(
            msg.into_items(),
            Some(vec![json!({"hash": "0x1"}), json!({"hash": "0x2"})])
        );
    }

    #[test]
    fn loosely_typed_fields_keep_the_batch() {
        let msg = InboundMessage::parse(
            r#"{"event":"txlist","status":1,"message":null,"result":[{"hash":"0x1"}]}"#,
        )
        .unwrap();
        assert_eq!(msg.status, Some(json!(1)));
        assert_eq!(msg.into_items(), Some(vec![json!({"hash": "0x1"})]));

        let msg = InboundMessage::parse(r#"{"event":{"name":"txlist"},"result":[{"hash":"0x2"}]}"#).unwrap();
        assert_eq!(msg.event(), None);
        assert_eq!(msg.into_items(), Some(vec![json!({"hash": "0x2"})]));
    }

    #[test]
    fn control_messages_carry_no_items() {
        for text in [
            r#"{"event":"welcome"}"#,
            r#"{"event":"subscribe-txlist","status":"1","message":"OK, 0xabc"}"#,
            r#"{"event":"pong"}"#,
            r#"{"event":"txlist","result":[]}"#,
            r#"{"event":"txlist","result":"nope"}"#,
        ] {
            assert_eq!(InboundMessage::parse(text).unwrap().into_items(), None, "{text}");
        }
    }

    #[test]
    fn garbage_is_an_error() {
        assert!(matches!(
            InboundMessage::parse("not json"),
            Err(StreamError::Deserialization(_))
        ));
    }
}
