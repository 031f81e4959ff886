//! Reconciliation of interpreted events into the open bot message
//!
//! One `Reconciler` exists per in-flight request. It owns the interact
//! scanner and the lists built up so far, and mutates the single open bot
//! message of the conversation. Every method leaves the message in a fully
//! render-safe state: display text is always the cleaned projection of the
//! raw accumulator.
//!
//! Merge rules:
//! - clarifications are first-writer-wins (a parsed interact block is never
//!   replaced by a later metadata fallback),
//! - retrieved context from metadata only fills an empty list,
//! - the optimized query is last-writer-wins.

use serde_json::Value;

use crate::conversation::{Clarification, ContextItem, Conversation, Message};

use super::event::{error_text, MetadataInner, ResponseFull, StreamEvent};
use super::interact::{clean_response, InteractScanner};

#[derive(Debug, Default)]
pub struct Reconciler {
    scanner: InteractScanner,
    clarifications: Vec<Clarification>,
    context: Vec<ContextItem>,
    terminal: bool,
    finished: bool,
}

impl Reconciler {
    /// Open a fresh bot message on the transcript and return the reconciler
    /// that will fill it.
    pub fn begin(conversation: &mut Conversation) -> Self {
        conversation.push(Message::bot_open());
        Self::default()
    }

    /// The stream hit a terminal condition (`error` event or transport
    /// failure); no further events will be applied.
    pub fn is_terminal(&self) -> bool {
        self.terminal
    }

    /// Dispatch one event. Returns new prose ready for incremental display,
    /// when the event produced any.
    pub fn apply(&mut self, conversation: &mut Conversation, event: &StreamEvent) -> Option<String> {
        if self.terminal || self.finished {
            tracing::debug!("ignoring event after stream end");
            return None;
        }
        match event {
            StreamEvent::Token { content } => Some(self.apply_token(conversation, content)),
            StreamEvent::ProcessedQuery { content } => {
                self.apply_processed_query(conversation, content);
                None
            }
            StreamEvent::Metadata {
                response_full,
                retrieved_context,
                metadata,
                optimized_query,
            } => {
                self.apply_metadata(
                    conversation,
                    response_full.as_ref(),
                    retrieved_context.as_ref(),
                    metadata.as_ref(),
                    optimized_query.as_deref(),
                );
                None
            }
            StreamEvent::Error { message } => {
                self.apply_error(conversation, message);
                None
            }
            StreamEvent::SecurityAssessment { content } => {
                tracing::info!(assessment = %content, "security assessment");
                None
            }
            StreamEvent::Done => Some(self.finish(conversation)),
            StreamEvent::Unknown => {
                tracing::debug!("unrecognized event type");
                None
            }
        }
    }

    /// Append token text: route through the interact scanner, grow the raw
    /// accumulator, recompute display text, attach clarifications from any
    /// block that just closed.
    pub fn apply_token(&mut self, conversation: &mut Conversation, content: &str) -> String {
        let outcome = self.scanner.feed(content);

        if let Some(open) = conversation.open_message_mut() {
            open.raw.push_str(content);
            open.display = clean_response(&open.raw);

            if !outcome.clarifications.is_empty() && self.clarifications.is_empty() {
                self.clarifications = outcome.clarifications;
                open.clarifications = self.clarifications.clone();
            }
        }

        outcome.prose
    }

    /// Merge a metadata event; each field is applied independently.
    pub fn apply_metadata(
        &mut self,
        conversation: &mut Conversation,
        response_full: Option<&ResponseFull>,
        retrieved_context: Option<&Value>,
        metadata: Option<&MetadataInner>,
        optimized_query: Option<&str>,
    ) {
        let Some(open) = conversation.open_message_mut() else {
            return;
        };

        if let Some(full) = response_full {
            if let Some(clarifications) = &full.clarification {
                let valid: Vec<Clarification> = clarifications
                    .iter()
                    .filter(|c| !c.question.is_empty() && !c.options.is_empty())
                    .cloned()
                    .collect();
                if self.clarifications.is_empty() && !valid.is_empty() {
                    self.clarifications = valid;
                    open.clarifications = self.clarifications.clone();
                }
            }
        }

        let context_value = retrieved_context.or_else(|| {
            metadata.and_then(|inner| inner.retrieved_context.as_ref())
        });
        if let Some(value) = context_value {
            let items = normalize_context(value);
            if open.retrieved_context.is_empty() && !items.is_empty() {
                self.context = items;
                open.retrieved_context = self.context.clone();
            }
        }

        if let Some(query) = optimized_query {
            open.optimized_query = Some(query.to_string());
        }
    }

    /// The server echoed a normalized question: rewrite the user message
    /// that triggered this stream.
    pub fn apply_processed_query(&mut self, conversation: &mut Conversation, content: &str) {
        if let Some(user) = conversation.preceding_user_mut() {
            user.raw = content.to_string();
            user.display = content.to_string();
        }
    }

    /// Terminal server failure: the open message shows only the formatted
    /// error from here on, and all later events are ignored.
    pub fn apply_error(&mut self, conversation: &mut Conversation, message: &Value) {
        if let Some(open) = conversation.open_message_mut() {
            open.display = format!("❌ **Error**: {}", error_text(message));
        }
        self.terminal = true;
    }

    /// End of stream: flush scanner holdback and settle the display text.
    /// Returns leftover prose that was held back as a possible tag prefix.
    pub fn finish(&mut self, conversation: &mut Conversation) -> String {
        if self.terminal || self.finished {
            return String::new();
        }
        self.finished = true;
        let leftover = self.scanner.finish();
        if let Some(open) = conversation.open_message_mut() {
            open.display = clean_response(&open.raw);
        }
        leftover
    }
}

/// Normalize a retrieved-context payload to its plain item list.
///
/// The service sometimes wraps the list in a two-element array
/// `[something, [items...]]`; unwrapping is mandatory and idempotent;
/// already-unwrapped data passes through untouched. Items that do not
/// deserialize are dropped.
pub fn normalize_context(value: &Value) -> Vec<ContextItem> {
    let items = match value.as_array() {
        Some(array) => match array.get(1).and_then(Value::as_array) {
            Some(inner) => inner,
            None => array,
        },
        None => return Vec::new(),
    };

    items
        .iter()
        .filter_map(|item| serde_json::from_value(item.clone()).ok())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stream::event::parse_record;
    use serde_json::json;

    fn conversation_with_open() -> (Conversation, Reconciler) {
        let mut conversation = Conversation::new();
        conversation.push_user("hello there");
        let reconciler = Reconciler::begin(&mut conversation);
        (conversation, reconciler)
    }

    fn open_message(conversation: &Conversation) -> &Message {
        conversation.messages().last().unwrap()
    }

    #[test]
    fn token_stream_with_interact_block_yields_clean_text_and_clarification() {
        let (mut conversation, mut reconciler) = conversation_with_open();

        reconciler.apply_token(&mut conversation, "Hello ");
        reconciler.apply_token(
            &mut conversation,
            "<interact>questions:\n- text: Pick one\n  options:\n  - Yes\n  - No\n</interact>",
        );
        reconciler.apply_token(&mut conversation, "world");
        reconciler.finish(&mut conversation);

        let open = open_message(&conversation);
        assert_eq!(open.display, "Hello world");
        assert_eq!(
            open.clarifications,
            vec![Clarification {
                question: "Pick one".into(),
                options: vec!["Yes".into(), "No".into()],
            }]
        );
    }

    #[test]
    fn display_never_contains_partial_markup_mid_stream() {
        let (mut conversation, mut reconciler) = conversation_with_open();

        reconciler.apply_token(&mut conversation, "Sure. <inter");
        assert_eq!(open_message(&conversation).display, "Sure.");

        reconciler.apply_token(&mut conversation, "act>questions:\n- text: Q\n");
        assert_eq!(open_message(&conversation).display, "Sure.");
    }

    #[test]
    fn clarifications_are_first_writer_wins() {
        let (mut conversation, mut reconciler) = conversation_with_open();

        reconciler.apply_token(
            &mut conversation,
            "<interact>- text: From tokens?\n  options:\n  - A\n</interact>",
        );

        let metadata = parse_record(
            r#"{"type":"metadata","response_full":{"clarification":[{"question":"From metadata?","options":["B"]}]}}"#,
        )
        .unwrap();
        reconciler.apply(&mut conversation, &metadata);

        let open = open_message(&conversation);
        assert_eq!(open.clarifications.len(), 1);
        assert_eq!(open.clarifications[0].question, "From tokens?");
    }

    #[test]
    fn metadata_clarifications_fill_when_none_set() {
        let (mut conversation, mut reconciler) = conversation_with_open();

        let metadata = parse_record(
            r#"{"type":"metadata","response_full":{"clarification":[{"question":"Which city?","options":["Delhi","Goa"]}]}}"#,
        )
        .unwrap();
        reconciler.apply(&mut conversation, &metadata);

        let open = open_message(&conversation);
        assert_eq!(open.clarifications[0].question, "Which city?");
    }

    #[test]
    fn wrapped_context_is_unwrapped_and_unwrap_is_idempotent() {
        let wrapped = json!([
            "query-echo",
            [
                {"id": 1, "doc_id": "d1", "doc_name": "FAQ", "text": "snippet", "score": 0.92},
                {"id": 2, "doc_id": "d2", "doc_name": "Guide", "text": "more", "score": 0.55}
            ]
        ]);
        let once = normalize_context(&wrapped);
        assert_eq!(once.len(), 2);
        assert_eq!(once[0].doc_name, "FAQ");

        // Re-serializing the normalized list and normalizing again must not
        // change it.
        let reserialized = serde_json::to_value(&once).unwrap();
        let twice = normalize_context(&reserialized);
        assert_eq!(once, twice);
    }

    #[test]
    fn context_from_metadata_does_not_overwrite_existing() {
        let (mut conversation, mut reconciler) = conversation_with_open();

        let first = parse_record(
            r#"{"type":"metadata","retrieved_context":[{"doc_id":"a","doc_name":"First","text":"t","score":1.0}]}"#,
        )
        .unwrap();
        reconciler.apply(&mut conversation, &first);

        let second = parse_record(
            r#"{"type":"metadata","retrieved_context":[{"doc_id":"b","doc_name":"Second","text":"t","score":0.1}]}"#,
        )
        .unwrap();
        reconciler.apply(&mut conversation, &second);

        let open = open_message(&conversation);
        assert_eq!(open.retrieved_context.len(), 1);
        assert_eq!(open.retrieved_context[0].doc_name, "First");
    }

    #[test]
    fn nested_metadata_context_location_is_accepted() {
        let (mut conversation, mut reconciler) = conversation_with_open();

        let event = parse_record(
            r#"{"type":"metadata","metadata":{"retrieved_context":[{"doc_id":"n","doc_name":"Nested","text":"t","score":0.7}]}}"#,
        )
        .unwrap();
        reconciler.apply(&mut conversation, &event);

        assert_eq!(
            open_message(&conversation).retrieved_context[0].doc_name,
            "Nested"
        );
    }

    #[test]
    fn optimized_query_is_last_writer_wins() {
        let (mut conversation, mut reconciler) = conversation_with_open();

        for query in ["first version", "second version"] {
            let event =
                parse_record(&format!(r#"{{"type":"metadata","optimized_query":"{query}"}}"#))
                    .unwrap();
            reconciler.apply(&mut conversation, &event);
        }

        assert_eq!(
            open_message(&conversation).optimized_query.as_deref(),
            Some("second version")
        );
    }

    #[test]
    fn processed_query_rewrites_preceding_user_message() {
        let (mut conversation, mut reconciler) = conversation_with_open();

        let event =
            parse_record(r#"{"type":"processed_query","content":"flights from delhi"}"#).unwrap();
        reconciler.apply(&mut conversation, &event);

        let messages = conversation.messages();
        assert_eq!(messages[0].display, "flights from delhi");
    }

    #[test]
    fn error_event_is_terminal_and_later_events_are_ignored() {
        let (mut conversation, mut reconciler) = conversation_with_open();

        reconciler.apply_token(&mut conversation, "partial ");
        reconciler.apply_token(
            &mut conversation,
            "<interact>- text: Q\n  options:\n  - A\n</interact>",
        );

        let error = parse_record(r#"{"type":"error","message":"backend unavailable"}"#).unwrap();
        reconciler.apply(&mut conversation, &error);
        assert!(reconciler.is_terminal());
        assert_eq!(
            open_message(&conversation).display,
            "❌ **Error**: backend unavailable"
        );

        // Stray post-terminal events are no-ops, not panics.
        let stray = parse_record(r#"{"type":"token","content":"late"}"#).unwrap();
        assert!(reconciler.apply(&mut conversation, &stray).is_none());
        assert_eq!(
            open_message(&conversation).display,
            "❌ **Error**: backend unavailable"
        );
    }

    #[test]
    fn structured_error_payload_is_rendered() {
        let (mut conversation, mut reconciler) = conversation_with_open();

        let error =
            parse_record(r#"{"type":"error","message":{"code":500,"detail":"boom"}}"#).unwrap();
        reconciler.apply(&mut conversation, &error);

        let display = &open_message(&conversation).display;
        assert!(display.starts_with("❌ **Error**: "));
        assert!(display.contains("boom"));
    }

    #[test]
    fn security_assessment_mutates_nothing() {
        let (mut conversation, mut reconciler) = conversation_with_open();
        let before = open_message(&conversation).clone();

        let event =
            parse_record(r#"{"type":"security_assessment","content":"benign"}"#).unwrap();
        reconciler.apply(&mut conversation, &event);

        let after = open_message(&conversation);
        assert_eq!(after.display, before.display);
        assert_eq!(after.clarifications, before.clarifications);
    }
}
