//! Protocol message types for the specialist wire protocol
//!
//! Requests are small JSON objects; replies are parsed leniently (unknown fields
//! are kept in `extra`) because the specialist side is opaque to this crate.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Control messages that carry no content
///
/// # Examples
/// ```
/// use specialist_router::protocol::ControlMessage;
///
/// let line = serde_json::to_string(&ControlMessage::Ping).unwrap();
/// assert_eq!(line, r#"{"type":"ping"}"#);
/// ```
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ControlMessage {
    Ping,
}

/// Content request sent to a specialist
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MessageRequest {
    /// Message text
    pub content: String,
    /// Ask the specialist for a chunked reply
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stream: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    /// Free-form context forwarded verbatim
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context: Option<Value>,
    /// Correlation id for streamed requests
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
}

impl MessageRequest {
    pub fn new(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            stream: None,
            temperature: None,
            max_tokens: None,
            context: None,
            request_id: None,
        }
    }
}

/// Single-shot reply envelope
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct ResponseEnvelope {
    /// Optional message type (`"error"` marks a failed request)
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    /// Reply text; older specialists send it as `response`
    #[serde(default, alias = "response", skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    /// Error text carried by `{"type": "error"}` replies
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl ResponseEnvelope {
    pub fn is_error(&self) -> bool {
        self.kind.as_deref() == Some("error")
    }

    /// Error text of an error reply, falling back to a generic description
    pub fn error_message(&self) -> String {
        self.message
            .clone()
            .or_else(|| {
                self.extra
                    .get("error")
                    .and_then(Value::as_str)
                    .map(str::to_string)
            })
            .unwrap_or_else(|| "unknown error".to_string())
    }
}

/// Metadata attached to a stream chunk, normally only on the final one
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct ChunkMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_tokens: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// One line of a streaming reply as it appears on the wire
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct StreamLine {
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub is_final: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<ChunkMetadata>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// One unit of a streaming reply
#[derive(Debug, Clone, PartialEq)]
pub struct Chunk {
    pub content: String,
    pub is_final: bool,
    pub metadata: Option<ChunkMetadata>,
}

impl From<StreamLine> for Chunk {
    fn from(line: StreamLine) -> Self {
        Self {
            content: line.content,
            is_final: line.is_final,
            metadata: line.metadata,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_ping_serialization() {
        let value = serde_json::to_value(ControlMessage::Ping).unwrap();
        assert_eq!(value, json!({"type": "ping"}));
    }

    #[test]
    fn test_message_request_skips_unset_options() {
        let request = MessageRequest::new("hello");
        let value = serde_json::to_value(&request).unwrap();
        assert_eq!(value, json!({"content": "hello"}));
    }

    #[test]
    fn test_message_request_with_options() {
        let mut request = MessageRequest::new("hello");
        request.stream = Some(true);
        request.max_tokens = Some(256);
        request.temperature = Some(0.5);

        let value = serde_json::to_value(&request).unwrap();
        assert_eq!(value["stream"], json!(true));
        assert_eq!(value["max_tokens"], json!(256));
        assert_eq!(value["temperature"], json!(0.5));
    }

    #[test]
    fn test_response_envelope_accepts_response_alias() {
        let envelope: ResponseEnvelope =
            serde_json::from_value(json!({"response": "hi", "ai_id": "athena-ai"})).unwrap();
        assert_eq!(envelope.content.as_deref(), Some("hi"));
        assert_eq!(envelope.extra["ai_id"], json!("athena-ai"));
        assert!(!envelope.is_error());
    }

    #[test]
    fn test_error_envelope_message() {
        let envelope: ResponseEnvelope =
            serde_json::from_value(json!({"type": "error", "message": "model offline"})).unwrap();
        assert!(envelope.is_error());
        assert_eq!(envelope.error_message(), "model offline");

        let bare: ResponseEnvelope = serde_json::from_value(json!({"type": "error"})).unwrap();
        assert_eq!(bare.error_message(), "unknown error");
    }

    #[test]
    fn test_stream_line_defaults() {
        let line: StreamLine = serde_json::from_value(json!({"content": "par"})).unwrap();
        assert!(!line.is_final);

        let last: StreamLine = serde_json::from_value(json!({
            "content": "",
            "is_final": true,
            "metadata": {"model": "llama3.3:70b", "total_tokens": 42}
        }))
        .unwrap();
        let chunk = Chunk::from(last);
        assert!(chunk.is_final);
        let metadata = chunk.metadata.unwrap();
        assert_eq!(metadata.model.as_deref(), Some("llama3.3:70b"));
        assert_eq!(metadata.total_tokens, Some(42));
    }
}
