//! Push-notification envelope parsing.
//!
//! The body may arrive as a JSON object, as a JSON string holding the
//! object, or as raw bytes of either. Anything that does not end up as a
//! JSON object is malformed.

use crate::error::{GatewayError, Result};
use serde_json::{Map, Value};
use std::fmt;

/// Header carrying the message kind.
pub const MESSAGE_TYPE_HEADER: &str = "x-amz-sns-message-type";

/// Header carrying the topic identifier.
pub const TOPIC_HEADER: &str = "x-amz-sns-topic-arn";

/// Envelope keys that may hold the confirmation URL.
const CONFIRMATION_URL_KEYS: &[&str] = &["SubscribeURL", "SubscribeUrl", "subscribeURL", "subscribe_url"];

/// Kind discriminator of an envelope.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MessageKind {
    SubscriptionConfirmation,
    Notification,
    UnsubscribeConfirmation,
    Unrecognized(String),
}

impl MessageKind {
    pub fn parse(raw: &str) -> Self {
        match raw.trim() {
            "SubscriptionConfirmation" => MessageKind::SubscriptionConfirmation,
            "Notification" => MessageKind::Notification,
            "UnsubscribeConfirmation" => MessageKind::UnsubscribeConfirmation,
            other => MessageKind::Unrecognized(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            MessageKind::SubscriptionConfirmation => "SubscriptionConfirmation",
            MessageKind::Notification => "Notification",
            MessageKind::UnsubscribeConfirmation => "UnsubscribeConfirmation",
            MessageKind::Unrecognized(raw) => raw,
        }
    }
}

impl fmt::Display for MessageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Parsed envelope.
#[derive(Debug, Clone)]
pub struct Envelope {
    fields: Map<String, Value>,
}

impl Envelope {
    /// Parse a raw delivery body.
    pub fn parse(body: &[u8]) -> Result<Self> {
        let value: Value = serde_json::from_slice(body)
            .map_err(|e| GatewayError::MalformedEnvelope(format!("body is not JSON: {}", e)))?;

        let value = match value {
            Value::String(inner) => serde_json::from_str(&inner).map_err(|e| {
                GatewayError::MalformedEnvelope(format!("string body is not JSON: {}", e))
            })?,
            other => other,
        };

        match value {
            Value::Object(fields) => Ok(Self { fields }),
            other => Err(GatewayError::MalformedEnvelope(format!(
                "expected an object, got {}",
                json_type(&other)
            ))),
        }
    }

    pub fn from_fields(fields: Map<String, Value>) -> Self {
        Self { fields }
    }

    /// Kind from the header, falling back to the `Type` field.
    pub fn kind(&self, header: Option<&str>) -> MessageKind {
        let raw = header
            .filter(|h| !h.trim().is_empty())
            .or_else(|| self.str_field("Type"))
            .unwrap_or("");
        MessageKind::parse(raw)
    }

    /// Topic from the header, falling back to the `TopicArn` field.
    pub fn topic<'a>(&'a self, header: Option<&'a str>) -> Option<&'a str> {
        header
            .filter(|h| !h.trim().is_empty())
            .or_else(|| self.str_field("TopicArn"))
    }

    pub fn message_id(&self) -> Option<&str> {
        self.str_field("MessageId")
    }

    pub fn subject(&self) -> Option<&str> {
        self.str_field("Subject")
    }

    pub fn confirmation_url(&self) -> Option<&str> {
        CONFIRMATION_URL_KEYS
            .iter()
            .find_map(|key| self.str_field(key))
            .filter(|url| !url.trim().is_empty())
    }

    /// Inner message: JSON-decoded when the `Message` string is JSON,
    /// otherwise the raw string. A non-string `Message` is used as is.
    pub fn message(&self) -> Value {
        match self.fields.get("Message") {
            Some(Value::String(s)) => {
                serde_json::from_str(s).unwrap_or_else(|_| Value::String(s.clone()))
            }
            Some(other) => other.clone(),
            None => Value::Null,
        }
    }

    /// Top-level keys, for diagnostics.
    pub fn keys(&self) -> Vec<&str> {
        self.fields.keys().map(String::as_str).collect()
    }

    fn str_field(&self, key: &str) -> Option<&str> {
        self.fields.get(key).and_then(Value::as_str)
    }
}

fn json_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_object_body() {
        let body = br#"{"Type":"Notification","MessageId":"m-1","Subject":"Fire Alert"}"#;
        let env = Envelope::parse(body).unwrap();
        assert_eq!(env.kind(None), MessageKind::Notification);
        assert_eq!(env.message_id(), Some("m-1"));
        assert_eq!(env.subject(), Some("Fire Alert"));
    }

    #[test]
    fn test_parse_string_body() {
        let inner = json!({"Type": "Notification", "MessageId": "m-2"}).to_string();
        let body = serde_json::to_vec(&Value::String(inner)).unwrap();
        let env = Envelope::parse(&body).unwrap();
        assert_eq!(env.message_id(), Some("m-2"));
    }

    #[test]
    fn test_parse_rejects_malformed() {
        assert!(Envelope::parse(b"not json").is_err());
        assert!(Envelope::parse(b"").is_err());
        assert!(Envelope::parse(b"[1,2]").is_err());
        assert!(Envelope::parse(br#""still not json""#).is_err());
    }

    #[test]
    fn test_header_wins_over_type_field() {
        let env = Envelope::parse(br#"{"Type":"Notification"}"#).unwrap();
        assert_eq!(
            env.kind(Some("SubscriptionConfirmation")),
            MessageKind::SubscriptionConfirmation
        );
        assert_eq!(env.kind(Some("  ")), MessageKind::Notification);
    }

    #[test]
    fn test_unrecognized_kind() {
        let env = Envelope::parse(br#"{"Type":"Mystery"}"#).unwrap();
        assert_eq!(env.kind(None), MessageKind::Unrecognized("Mystery".to_string()));
        let env = Envelope::parse(br#"{}"#).unwrap();
        assert_eq!(env.kind(None), MessageKind::Unrecognized(String::new()));
    }

    #[test]
    fn test_confirmation_url_synonyms() {
        for key in CONFIRMATION_URL_KEYS {
            let mut fields = Map::new();
            fields.insert(key.to_string(), json!("https://example.test/confirm"));
            let env = Envelope::from_fields(fields);
            assert_eq!(env.confirmation_url(), Some("https://example.test/confirm"));
        }
        let env = Envelope::parse(br#"{"Token":"abc"}"#).unwrap();
        assert_eq!(env.confirmation_url(), None);
    }

    #[test]
    fn test_message_decoding() {
        let env = Envelope::parse(
            json!({"Message": "{\"device\":\"Node-1\"}"}).to_string().as_bytes(),
        )
        .unwrap();
        assert_eq!(env.message()["device"], "Node-1");

        let env = Envelope::parse(br#"{"Message":"plain text"}"#).unwrap();
        assert_eq!(env.message(), Value::String("plain text".to_string()));

        let env = Envelope::parse(br#"{"Message":{"device":"Node-2"}}"#).unwrap();
        assert_eq!(env.message()["device"], "Node-2");
    }

    #[test]
    fn test_topic_fallback() {
        let env = Envelope::parse(br#"{"TopicArn":"arn:topic"}"#).unwrap();
        assert_eq!(env.topic(None), Some("arn:topic"));
        assert_eq!(env.topic(Some("arn:header")), Some("arn:header"));
    }
}
