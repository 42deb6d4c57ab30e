//! Frame Module
//!
//! The JSON text frame exchanged in both directions over the connection.

use std::fmt;

use serde::{Deserialize, Deserializer, Serialize};

use crate::error::{ClientError, Result};
use crate::protocol::CorrelationId;

// == Action ==
/// Frame action tag.
///
/// Unknown tags are preserved in `Other` so that any non-`EXPIRED` frame can
/// still be routed as a correlated response.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Action {
    Set,
    Batch,
    Get,
    Purge,
    Delete,
    Keys,
    Increment,
    Decrement,
    Response,
    Expired,
    Other(String),
}

impl Action {
    /// Returns the wire tag.
    pub fn as_str(&self) -> &str {
        match self {
            Action::Set => "SET",
            Action::Batch => "BATCH",
            Action::Get => "GET",
            Action::Purge => "PURGE",
            Action::Delete => "DELETE",
            Action::Keys => "KEYS",
            Action::Increment => "INCREMENT",
            Action::Decrement => "DECREMENT",
            Action::Response => "RESPONSE",
            Action::Expired => "EXPIRED",
            Action::Other(tag) => tag,
        }
    }
}

impl From<String> for Action {
    fn from(tag: String) -> Self {
        match tag.as_str() {
            "SET" => Action::Set,
            "BATCH" => Action::Batch,
            "GET" => Action::Get,
            "PURGE" => Action::Purge,
            "DELETE" => Action::Delete,
            "KEYS" => Action::Keys,
            "INCREMENT" => Action::Increment,
            "DECREMENT" => Action::Decrement,
            "RESPONSE" => Action::Response,
            "EXPIRED" => Action::Expired,
            _ => Action::Other(tag),
        }
    }
}

impl From<Action> for String {
    fn from(action: Action) -> Self {
        match action {
            Action::Other(tag) => tag,
            known => known.as_str().to_string(),
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// == Frame ==
/// Wire unit for requests, responses and expiration notices.
///
/// `id` is present on requests and correlated responses and absent on
/// expiration notices. `expire` is an absolute epoch-millisecond timestamp.
/// `regexp` turns a GET into a pattern lookup over all keys.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Frame {
    pub action: Action,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<CorrelationId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub regexp: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<String>,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "deserialize_timestamp"
    )]
    pub expire: Option<u64>,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "deserialize_error"
    )]
    pub error: Option<String>,
}

impl Frame {
    fn new(action: Action) -> Self {
        Self {
            action,
            id: None,
            key: None,
            regexp: None,
            data: None,
            expire: None,
            error: None,
        }
    }

    fn with_id(mut self, id: CorrelationId) -> Self {
        self.id = Some(id);
        self
    }

    fn with_key(mut self, key: &str) -> Self {
        self.key = Some(key.to_string());
        self
    }

    // == Request Builders ==
    /// `{action: "SET", key, data, expire, id}`
    pub fn set(id: CorrelationId, key: &str, data: String, expire: u64) -> Self {
        let mut frame = Self::new(Action::Set).with_id(id).with_key(key);
        frame.data = Some(data);
        frame.expire = Some(expire);
        frame
    }

    /// `{action: "BATCH", key, data, expire, id}`
    pub fn batch(id: CorrelationId, key: &str, data: String, expire: u64) -> Self {
        let mut frame = Self::set(id, key, data, expire);
        frame.action = Action::Batch;
        frame
    }

    /// `{action: "GET", key, id}`
    pub fn get(id: CorrelationId, key: &str) -> Self {
        Self::new(Action::Get).with_id(id).with_key(key)
    }

    /// `{action: "GET", regexp, id}`
    pub fn get_matching(id: CorrelationId, pattern: &str) -> Self {
        let mut frame = Self::new(Action::Get).with_id(id);
        frame.regexp = Some(pattern.to_string());
        frame
    }

    /// `{action: "PURGE", id}`
    pub fn purge(id: CorrelationId) -> Self {
        Self::new(Action::Purge).with_id(id)
    }

    /// `{action: "DELETE", key, id}`
    pub fn delete(id: CorrelationId, key: &str) -> Self {
        Self::new(Action::Delete).with_id(id).with_key(key)
    }

    /// `{action: "KEYS", id}`
    pub fn keys(id: CorrelationId) -> Self {
        Self::new(Action::Keys).with_id(id)
    }

    /// `{action: "INCREMENT" | "DECREMENT", key, data: "<by>", id}`
    pub fn counter(id: CorrelationId, action: Action, key: &str, by: i64) -> Self {
        let mut frame = Self::new(action).with_id(id).with_key(key);
        frame.data = Some(by.to_string());
        frame
    }

    // == Inbound Builders ==
    /// `{action: "RESPONSE", id, data?, error?}`
    pub fn response(id: CorrelationId, data: Option<String>, error: Option<String>) -> Self {
        let mut frame = Self::new(Action::Response).with_id(id);
        frame.data = data;
        frame.error = error;
        frame
    }

    /// `{action: "EXPIRED", key, data?, expire}`
    pub fn expired(key: &str, data: Option<String>, expire: u64) -> Self {
        let mut frame = Self::new(Action::Expired).with_key(key);
        frame.data = data;
        frame.expire = Some(expire);
        frame
    }

    // == Codec ==
    /// Serializes the frame to its JSON text form.
    pub fn to_text(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// Parses a JSON text frame.
    pub fn parse(text: &str) -> Result<Self> {
        serde_json::from_str(text).map_err(|e| ClientError::Protocol(e.to_string()))
    }

    /// Returns true for unsolicited expiration notices.
    pub fn is_expiration(&self) -> bool {
        self.action == Action::Expired
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawTimestamp {
    Millis(u64),
    Text(String),
}

/// Accepts epoch milliseconds or an RFC 3339 string.
fn deserialize_timestamp<'de, D>(deserializer: D) -> std::result::Result<Option<u64>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<RawTimestamp>::deserialize(deserializer)?;
    let millis = match raw {
        None => return Ok(None),
        Some(RawTimestamp::Millis(ms)) => ms,
        Some(RawTimestamp::Text(text)) => match text.parse::<u64>() {
            Ok(ms) => ms,
            Err(_) => {
                let parsed = chrono::DateTime::parse_from_rfc3339(&text)
                    .map_err(serde::de::Error::custom)?;
                u64::try_from(parsed.timestamp_millis()).map_err(serde::de::Error::custom)?
            }
        },
    };
    Ok(Some(millis))
}

/// Treats `"error": ""` the same as an absent error.
fn deserialize_error<'de, D>(deserializer: D) -> std::result::Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<String>::deserialize(deserializer)?;
    Ok(raw.filter(|message| !message.is_empty()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Value};

    #[test]
    fn test_set_frame_wire_shape() {
        let frame = Frame::set("id-1".into(), "a", r#"{"value":1}"#.to_string(), 42);
        let value: Value = serde_json::from_str(&frame.to_text().unwrap()).unwrap();
        assert_eq!(
            value,
            json!({"action": "SET", "id": "id-1", "key": "a", "data": "{\"value\":1}", "expire": 42})
        );
    }

    #[test]
    fn test_purge_frame_carries_only_id() {
        let value: Value = serde_json::from_str(&Frame::purge("p".into()).to_text().unwrap()).unwrap();
        assert_eq!(value, json!({"action": "PURGE", "id": "p"}));
    }

    #[test]
    fn test_pattern_get_frame_has_no_key() {
        let frame = Frame::get_matching("g".into(), "^user:");
        let value: Value = serde_json::from_str(&frame.to_text().unwrap()).unwrap();
        assert_eq!(value, json!({"action": "GET", "id": "g", "regexp": "^user:"}));
    }

    #[test]
    fn test_batch_frame_mirrors_set() {
        let frame = Frame::batch("b".into(), "log", "{\"value\":1}".to_string(), 7);
        assert_eq!(frame.action, Action::Batch);
        assert_eq!(frame.key.as_deref(), Some("log"));
        assert_eq!(frame.expire, Some(7));
        assert_eq!(Frame::parse(&frame.to_text().unwrap()).unwrap(), frame);
    }

    #[test]
    fn test_counter_frame_data_is_plain_integer() {
        let frame = Frame::counter("c".into(), Action::Decrement, "hits", -3);
        assert_eq!(frame.action.as_str(), "DECREMENT");
        assert_eq!(frame.data.as_deref(), Some("-3"));
    }

    #[test]
    fn test_parse_response() {
        let frame = Frame::parse(r#"{"action":"RESPONSE","id":"x","data":"{\"value\":2}"}"#).unwrap();
        assert_eq!(frame.action, Action::Response);
        assert_eq!(frame.id, Some(CorrelationId::from("x")));
        assert!(frame.error.is_none());
        assert!(!frame.is_expiration());
    }

    #[test]
    fn test_parse_empty_error_is_absent() {
        let frame = Frame::parse(r#"{"action":"RESPONSE","id":"x","error":""}"#).unwrap();
        assert!(frame.error.is_none());
    }

    #[test]
    fn test_parse_unknown_action_is_preserved() {
        let frame = Frame::parse(r#"{"action":"RESET","id":"x"}"#).unwrap();
        assert_eq!(frame.action, Action::Other("RESET".to_string()));
        assert_eq!(String::from(frame.action), "RESET");
    }

    #[test]
    fn test_parse_expiration_with_rfc3339_expire() {
        let frame =
            Frame::parse(r#"{"action":"EXPIRED","key":"a","expire":"1970-01-01T00:00:01Z"}"#).unwrap();
        assert!(frame.is_expiration());
        assert!(frame.id.is_none());
        assert_eq!(frame.expire, Some(1000));
    }

    #[test]
    fn test_parse_expire_numeric_forms() {
        let frame = Frame::parse(r#"{"action":"EXPIRED","key":"a","expire":1500}"#).unwrap();
        assert_eq!(frame.expire, Some(1500));

        let frame = Frame::parse(r#"{"action":"EXPIRED","key":"a","expire":"1500"}"#).unwrap();
        assert_eq!(frame.expire, Some(1500));

        let frame = Frame::parse(r#"{"action":"EXPIRED","key":"a","expire":null}"#).unwrap();
        assert_eq!(frame.expire, None);
    }

    #[test]
    fn test_parse_rejects_bad_input() {
        assert!(matches!(Frame::parse("{"), Err(ClientError::Protocol(_))));
        assert!(matches!(Frame::parse(r#"{"id":"x"}"#), Err(ClientError::Protocol(_))));
        assert!(matches!(
            Frame::parse(r#"{"action":"EXPIRED","expire":"yesterday"}"#),
            Err(ClientError::Protocol(_))
        ));
    }
}
