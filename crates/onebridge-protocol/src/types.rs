//! Core wire types for the OneBot protocol.
//!
//! Everything in this module travels "on the wire": RPC call frames,
//! reply frames, and the segments that make up a message body.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::cqcode;

// ---------------------------------------------------------------------------
// Segment: one typed unit of message content
// ---------------------------------------------------------------------------

/// A typed, attribute-bearing unit of wire message content.
///
/// On the wire this is `{"type": "at", "data": {"qq": "123"}}`. Text
/// segments keep their characters under the reserved `text` key; every
/// other tag carries arbitrary attributes. Values are usually strings
/// but may be any JSON (a forward `node` carries a segment list in
/// `content`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Segment {
    /// The segment tag: `text`, `at`, `image`, `reply`, `node`, ...
    #[serde(rename = "type")]
    pub kind: String,

    /// Tag-specific attributes.
    #[serde(default)]
    pub data: Map<String, Value>,
}

impl Segment {
    /// The reserved attribute that holds a text segment's characters.
    pub const TEXT_KEY: &'static str = "text";

    /// Creates a segment with no attributes.
    pub fn new(kind: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            data: Map::new(),
        }
    }

    /// Creates a literal text segment.
    pub fn text(content: impl Into<String>) -> Self {
        let content: String = content.into();
        Self::new("text").with(Self::TEXT_KEY, content)
    }

    /// Builder-style attribute setter.
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.data.insert(key.into(), value.into());
        self
    }

    /// Returns `true` for literal text segments.
    pub fn is_text(&self) -> bool {
        self.kind == "text"
    }

    /// Returns an attribute if it is a JSON string.
    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.data.get(key).and_then(Value::as_str)
    }

    /// Returns an attribute rendered as a string, whatever its JSON type.
    ///
    /// Numbers become their decimal form; `null` and missing keys give
    /// `None`.
    pub fn get_string(&self, key: &str) -> Option<String> {
        match self.data.get(key)? {
            Value::Null => None,
            value => Some(cqcode::value_to_string(value)),
        }
    }

    /// The characters of a text segment (empty for other tags).
    pub fn text_content(&self) -> &str {
        self.get_str(Self::TEXT_KEY).unwrap_or_default()
    }
}

// ---------------------------------------------------------------------------
// MessageBody: string or array message format
// ---------------------------------------------------------------------------

/// A message body as it appears in events: OneBot implementations send
/// either a CQ-code string or an already-structured segment array.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MessageBody {
    /// CQ-code markup, e.g. `"[CQ:at,qq=1]hi"`.
    Text(String),
    /// Array format.
    Segments(Vec<Segment>),
}

impl MessageBody {
    /// Decodes the body into an ordered segment sequence.
    pub fn segments(&self) -> Vec<Segment> {
        match self {
            Self::Text(source) => cqcode::parse_all(source),
            Self::Segments(list) => cqcode::parse_segments(list),
        }
    }
}

impl Default for MessageBody {
    fn default() -> Self {
        Self::Text(String::new())
    }
}

// ---------------------------------------------------------------------------
// RPC frames
// ---------------------------------------------------------------------------

/// An RPC call frame: `{"action": ..., "params": {...}, "echo": 1}`.
///
/// `echo` is the correlation id; the reply carries the same value back.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApiRequest {
    pub action: String,
    pub params: Value,
    pub echo: u64,
}

/// An RPC reply frame.
///
/// `status` is `"ok"`, `"async"` or `"failed"`; `retcode` 0 means
/// success. Some implementations echo the correlation id back as a
/// string, so `echo` is kept as raw JSON and read through
/// [`echo_id`](Self::echo_id).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApiResponse {
    pub status: String,
    pub retcode: i64,
    #[serde(default)]
    pub data: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub echo: Option<Value>,
    /// go-cqhttp's human-readable error message.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub wording: Option<String>,
}

impl ApiResponse {
    /// `true` unless the remote reported failure.
    pub fn is_success(&self) -> bool {
        self.status != "failed" && self.retcode == 0
    }

    /// The correlation id, accepting both `7` and `"7"`.
    pub fn echo_id(&self) -> Option<u64> {
        match self.echo.as_ref()? {
            Value::Number(n) => n.as_u64(),
            Value::String(s) => s.parse().ok(),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_segment_serializes_as_type_and_data() {
        let seg = Segment::new("at").with("qq", "123");
        assert_eq!(
            serde_json::to_value(&seg).unwrap(),
            json!({"type": "at", "data": {"qq": "123"}})
        );
    }

    #[test]
    fn test_segment_missing_data_defaults_to_empty() {
        let seg: Segment = serde_json::from_value(json!({"type": "shake"})).unwrap();
        assert_eq!(seg.kind, "shake");
        assert!(seg.data.is_empty());
    }

    #[test]
    fn test_segment_get_string_renders_numbers() {
        let seg = Segment::new("reply").with("id", 42);
        assert_eq!(seg.get_string("id").as_deref(), Some("42"));
        assert_eq!(seg.get_str("id"), None);
    }

    #[test]
    fn test_message_body_accepts_both_formats() {
        let text: MessageBody = serde_json::from_value(json!("[CQ:face,id=1]")).unwrap();
        let array: MessageBody = serde_json::from_value(json!([
            {"type": "face", "data": {"id": "1"}}
        ]))
        .unwrap();
        assert_eq!(text.segments(), array.segments());
    }

    #[test]
    fn test_api_response_failed_status_is_not_success() {
        let reply: ApiResponse = serde_json::from_value(json!({
            "status": "failed", "retcode": 0, "data": null
        }))
        .unwrap();
        assert!(!reply.is_success());
    }

    #[test]
    fn test_api_response_nonzero_retcode_is_not_success() {
        let reply: ApiResponse = serde_json::from_value(json!({
            "status": "ok", "retcode": 100, "data": null, "echo": 3
        }))
        .unwrap();
        assert!(!reply.is_success());
        assert_eq!(reply.echo_id(), Some(3));
    }
}
