//! JSON-RPC 2.0 message envelope.
//!
//! A single [`Message`] struct covers all three wire shapes. A request
//! carries `id` + `method`, a notification carries `method` alone, and a
//! response carries `id` + (`result` | `error`). Servers echo request ids
//! back in whatever JSON encoding they like (`2`, `2.0`, `"2"`), so
//! [`MessageId`] keeps the original form and normalizes it for matching.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use thiserror::Error;

/// Protocol marker stamped on every outgoing message.
pub const JSONRPC_VERSION: &str = "2.0";

/// Longest payload slice carried inside a [`ParseError`].
const PAYLOAD_SNIPPET_MAX: usize = 256;

/// Standard JSON-RPC 2.0 error codes, as negotiated by MCP servers.
pub mod error_code {
    pub const PARSE_ERROR: i64 = -32700;
    pub const INVALID_REQUEST: i64 = -32600;
    pub const METHOD_NOT_FOUND: i64 = -32601;
    pub const INVALID_PARAMS: i64 = -32602;
    pub const INTERNAL_ERROR: i64 = -32603;
}

/// Failure to decode wire text into a [`Message`], or a result payload
/// into its typed shape.
///
/// Carries a bounded slice of the offending payload so logs stay useful
/// without replaying megabytes of garbage.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("malformed message ({reason}): {payload}")]
pub struct ParseError {
    pub reason: String,
    pub payload: String,
}

impl ParseError {
    pub fn new(reason: impl Into<String>, payload: &str) -> Self {
        Self {
            reason: reason.into(),
            payload: payload_snippet(payload),
        }
    }
}

/// Truncate a payload for error reporting without splitting a UTF-8
/// character.
fn payload_snippet(raw: &str) -> String {
    if raw.len() <= PAYLOAD_SNIPPET_MAX {
        return raw.to_string();
    }
    let mut end = PAYLOAD_SNIPPET_MAX;
    while end > 0 && !raw.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}...", &raw[..end])
}

/// A request id in whatever encoding the peer chose.
///
/// JSON-RPC does not pin the id type, and real servers answer a request
/// sent with `"id": 2` using `2`, `2.0`, or `"2"` depending on their JSON
/// stack. All three must match the pending request, so equality and
/// [`MessageId::as_u64`] compare the numeric value, not the encoding.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MessageId {
    Number(u64),
    Float(f64),
    String(String),
}

impl MessageId {
    /// Canonical numeric value, if this id has one.
    ///
    /// Floats qualify only when they are whole and non-negative; strings
    /// only when they parse as an unsigned integer.
    pub fn as_u64(&self) -> Option<u64> {
        match self {
            Self::Number(n) => Some(*n),
            Self::Float(f) if f.fract() == 0.0 && *f >= 0.0 && *f <= u64::MAX as f64 => {
                Some(*f as u64)
            }
            Self::Float(_) => None,
            Self::String(s) => s.parse().ok(),
        }
    }
}

impl PartialEq for MessageId {
    fn eq(&self, other: &Self) -> bool {
        match (self.as_u64(), other.as_u64()) {
            (Some(a), Some(b)) => a == b,
            _ => match (self, other) {
                (Self::String(a), Self::String(b)) => a == b,
                (Self::Float(a), Self::Float(b)) => a.to_bits() == b.to_bits(),
                _ => false,
            },
        }
    }
}

impl Eq for MessageId {}

impl From<u64> for MessageId {
    fn from(n: u64) -> Self {
        Self::Number(n)
    }
}

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Number(n) => write!(f, "{n}"),
            Self::Float(x) => write!(f, "{x}"),
            Self::String(s) => write!(f, "{s:?}"),
        }
    }
}

/// Error object of a JSON-RPC response.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RpcError {
    pub code: i64,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

/// A JSON-RPC 2.0 message.
///
/// Field presence determines the shape; see the module docs. `params`,
/// `result`, and `error` stay as raw [`Value`]s here — typed decoding
/// happens at the edge via [`decode_result`].
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Message {
    #[serde(default = "default_version")]
    pub jsonrpc: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<MessageId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub method: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<RpcError>,
}

fn default_version() -> String {
    JSONRPC_VERSION.to_string()
}

impl Message {
    /// Build a request with a numeric id.
    pub fn request(id: u64, method: impl Into<String>, params: Option<Value>) -> Self {
        Self {
            jsonrpc: default_version(),
            id: Some(MessageId::Number(id)),
            method: Some(method.into()),
            params,
            result: None,
            error: None,
        }
    }

    /// Build a notification (no id, no reply expected).
    pub fn notification(method: impl Into<String>, params: Option<Value>) -> Self {
        Self {
            jsonrpc: default_version(),
            id: None,
            method: Some(method.into()),
            params,
            result: None,
            error: None,
        }
    }

    /// Build a success response. Used by in-process test servers.
    pub fn response(id: impl Into<MessageId>, result: Value) -> Self {
        Self {
            jsonrpc: default_version(),
            id: Some(id.into()),
            method: None,
            params: None,
            result: Some(result),
            error: None,
        }
    }

    /// Build an error response.
    pub fn error_response(id: impl Into<MessageId>, code: i64, message: impl Into<String>) -> Self {
        Self {
            jsonrpc: default_version(),
            id: Some(id.into()),
            method: None,
            params: None,
            result: None,
            error: Some(RpcError {
                code,
                message: message.into(),
                data: None,
            }),
        }
    }

    /// A server-initiated message that expects no reply.
    pub fn is_notification(&self) -> bool {
        self.method.is_some() && self.id.is_none()
    }

    /// A reply to one of our requests.
    pub fn is_response(&self) -> bool {
        self.method.is_none() && self.id.is_some()
    }

    /// Serialize to a single line of wire text (no trailing newline).
    pub fn encode(&self) -> Result<String, ParseError> {
        serde_json::to_string(self)
            .map_err(|e| ParseError::new(format!("encode failed: {e}"), ""))
    }

    /// Parse wire text into a message.
    pub fn decode(raw: &str) -> Result<Self, ParseError> {
        serde_json::from_str(raw).map_err(|e| ParseError::new(e.to_string(), raw))
    }
}

/// Decode a raw result payload into its typed shape.
pub fn decode_result<T: DeserializeOwned>(value: &Value) -> Result<T, ParseError> {
    T::deserialize(value).map_err(|e| ParseError::new(e.to_string(), &value.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn request_encodes_without_empty_fields() {
        let msg = Message::request(1, "tools/list", None);
        let wire = msg.encode().unwrap();
        assert_eq!(wire, r#"{"jsonrpc":"2.0","id":1,"method":"tools/list"}"#);
    }

    #[test]
    fn notification_has_no_id() {
        let msg = Message::notification("notifications/initialized", None);
        let wire = msg.encode().unwrap();
        assert!(!wire.contains("\"id\""));
        assert!(msg.is_notification());
        assert!(!msg.is_response());
    }

    #[test]
    fn request_with_params_round_trips() {
        let msg = Message::request(7, "tools/call", Some(json!({"name": "echo"})));
        let back = Message::decode(&msg.encode().unwrap()).unwrap();
        assert_eq!(back, msg);
        assert_eq!(back.id.unwrap().as_u64(), Some(7));
    }

    #[test]
    fn decodes_success_response() {
        let msg = Message::decode(r#"{"jsonrpc":"2.0","id":3,"result":{"tools":[]}}"#).unwrap();
        assert!(msg.is_response());
        assert!(msg.error.is_none());
        assert_eq!(msg.result, Some(json!({"tools": []})));
    }

    #[test]
    fn decodes_error_response() {
        let msg = Message::decode(
            r#"{"jsonrpc":"2.0","id":4,"error":{"code":-32601,"message":"method not found"}}"#,
        )
        .unwrap();
        let err = msg.error.unwrap();
        assert_eq!(err.code, error_code::METHOD_NOT_FOUND);
        assert_eq!(err.message, "method not found");
    }

    #[test]
    fn id_encodings_compare_equal() {
        let number: MessageId = serde_json::from_str("2").unwrap();
        let float: MessageId = serde_json::from_str("2.0").unwrap();
        let string: MessageId = serde_json::from_str("\"2\"").unwrap();

        assert!(matches!(number, MessageId::Number(2)));
        assert!(matches!(float, MessageId::Float(_)));
        assert!(matches!(string, MessageId::String(_)));

        assert_eq!(number, float);
        assert_eq!(number, string);
        assert_eq!(float, string);
        assert_eq!(number.as_u64(), Some(2));
        assert_eq!(float.as_u64(), Some(2));
        assert_eq!(string.as_u64(), Some(2));
    }

    #[test]
    fn non_numeric_ids_do_not_match_numbers() {
        let string = MessageId::String("abc".into());
        assert_eq!(string.as_u64(), None);
        assert_ne!(string, MessageId::Number(2));
        assert_eq!(string, MessageId::String("abc".into()));

        let fractional = MessageId::Float(2.5);
        assert_eq!(fractional.as_u64(), None);
        assert_ne!(fractional, MessageId::Number(2));
    }

    #[test]
    fn decode_rejects_garbage_with_bounded_payload() {
        let garbage = format!("{{\"jsonrpc\": {}", "x".repeat(4096));
        let err = Message::decode(&garbage).unwrap_err();
        assert!(err.payload.len() <= PAYLOAD_SNIPPET_MAX + 3);
        assert!(err.payload.ends_with("..."));
    }

    #[test]
    fn decode_rejects_wrong_shape() {
        let err = Message::decode(r#"[1, 2, 3]"#).unwrap_err();
        assert_eq!(err.payload, "[1, 2, 3]");
    }

    #[test]
    fn payload_snippet_respects_char_boundaries() {
        let raw = "é".repeat(PAYLOAD_SNIPPET_MAX);
        let snippet = payload_snippet(&raw);
        assert!(snippet.ends_with("..."));
        assert!(snippet.chars().all(|c| c == 'é' || c == '.'));
    }

    #[test]
    fn decode_result_reports_missing_fields() {
        #[derive(Debug, serde::Deserialize)]
        struct Expect {
            #[allow(dead_code)]
            tools: Vec<String>,
        }
        let value = json!({"resources": []});
        let err = decode_result::<Expect>(&value).unwrap_err();
        assert!(err.reason.contains("tools"), "reason: {}", err.reason);
        assert!(err.payload.contains("resources"));
    }

    #[test]
    fn decode_result_returns_typed_payload() {
        #[derive(Debug, serde::Deserialize, PartialEq)]
        struct Expect {
            value: u32,
        }
        let got: Expect = decode_result(&json!({"value": 9})).unwrap();
        assert_eq!(got, Expect { value: 9 });
    }

    #[test]
    fn message_without_version_defaults_to_2_0() {
        let msg = Message::decode(r#"{"id":1,"result":{}}"#).unwrap();
        assert_eq!(msg.jsonrpc, JSONRPC_VERSION);
    }
}
