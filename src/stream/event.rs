//! Classification of decoded event records
//!
//! Each complete record body is JSON with a required `type` discriminator.
//! Losing one frame must never abort the rest of the stream: malformed
//! records are logged and skipped.

use serde::Deserialize;
use serde_json::Value;

use crate::conversation::Clarification;

/// One interpreted server event.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StreamEvent {
    /// A fragment of answer text, possibly carrying interact spans.
    Token {
        #[serde(default)]
        content: String,
    },
    /// The server's normalized rewrite of the user's question.
    ProcessedQuery {
        #[serde(default)]
        content: String,
    },
    /// Out-of-band enrichment: clarifications, retrieved context, the
    /// optimized query. Every field is independently optional.
    Metadata {
        #[serde(default)]
        response_full: Option<ResponseFull>,
        #[serde(default)]
        retrieved_context: Option<Value>,
        #[serde(default)]
        metadata: Option<MetadataInner>,
        #[serde(default)]
        optimized_query: Option<String>,
    },
    /// Informational side channel; logged, never applied to state.
    SecurityAssessment {
        #[serde(default)]
        content: Value,
    },
    /// Terminal server-side failure for this request.
    Error {
        #[serde(default)]
        message: Value,
    },
    /// End-of-stream sentinel some gateways emit as a literal `[DONE]`.
    #[serde(skip)]
    Done,
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ResponseFull {
    #[serde(default)]
    pub clarification: Option<Vec<Clarification>>,
    #[serde(default)]
    pub response: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct MetadataInner {
    #[serde(default)]
    pub retrieved_context: Option<Value>,
}

/// Parse one record body. `None` means the record was unusable and the
/// stream should simply continue.
pub fn parse_record(record: &str) -> Option<StreamEvent> {
    let trimmed = record.trim();
    if trimmed == "[DONE]" {
        return Some(StreamEvent::Done);
    }
    match serde_json::from_str::<StreamEvent>(trimmed) {
        Ok(event) => Some(event),
        Err(err) => {
            tracing::warn!(error = %err, "skipping malformed event record");
            None
        }
    }
}

/// Render an `error` event's message, which the server may send as either a
/// plain string or a structured payload.
pub fn error_text(message: &Value) -> String {
    match message {
        Value::String(text) if !text.is_empty() => text.clone(),
        Value::Null => "An error occurred while processing your request.".to_string(),
        other => serde_json::to_string(other)
            .unwrap_or_else(|_| "An error occurred while processing your request.".to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn token_record_parses() {
        let event = parse_record(r#"{"type":"token","content":"Hi"}"#).unwrap();
        assert!(matches!(event, StreamEvent::Token { content } if content == "Hi"));
    }

    #[test]
    fn metadata_fields_are_independently_optional() {
        let event = parse_record(r#"{"type":"metadata","optimized_query":"flights to goa"}"#);
        match event.unwrap() {
            StreamEvent::Metadata {
                response_full,
                retrieved_context,
                optimized_query,
                ..
            } => {
                assert!(response_full.is_none());
                assert!(retrieved_context.is_none());
                assert_eq!(optimized_query.as_deref(), Some("flights to goa"));
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[test]
    fn unknown_type_is_tolerated() {
        let event = parse_record(r#"{"type":"heartbeat"}"#).unwrap();
        assert!(matches!(event, StreamEvent::Unknown));
    }

    #[test]
    fn malformed_json_is_skipped() {
        assert!(parse_record("{not json").is_none());
    }

    #[test]
    fn done_sentinel_is_recognized() {
        assert!(matches!(parse_record("[DONE]").unwrap(), StreamEvent::Done));
    }

    #[test]
    fn error_text_accepts_string_or_structure() {
        assert_eq!(error_text(&Value::String("boom".into())), "boom");
        assert_eq!(
            error_text(&serde_json::json!({"code": 429, "detail": "rate limited"})),
            r#"{"code":429,"detail":"rate limited"}"#
        );
        assert!(error_text(&Value::Null).contains("error occurred"));
    }
}
