//! Conversation types and transcript state

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Bot,
}

/// A clarification question with its selectable follow-up options.
///
/// Produced by the interact-block extractor, or as a fallback from a
/// `metadata` event. Options are non-empty by construction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Clarification {
    pub question: String,
    pub options: Vec<String>,
}

/// A supporting source-document snippet returned alongside an answer.
///
/// The service omits fields freely, so everything is defaulted.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ContextItem {
    #[serde(default)]
    pub id: i64,
    #[serde(default)]
    pub doc_id: String,
    #[serde(default)]
    pub doc_name: String,
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub score: f64,
    #[serde(default)]
    pub metadata: Option<ContextMetadata>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContextMetadata {
    #[serde(default)]
    pub combined_docs: Option<String>,
}

/// One transcript entry.
///
/// `raw` is the growing pre-cleanup accumulator for a streaming bot message;
/// `display` is always the fully-cleaned, render-ready projection of it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub id: Uuid,
    pub role: Role,
    pub raw: String,
    pub display: String,
    #[serde(default)]
    pub clarifications: Vec<Clarification>,
    #[serde(default)]
    pub retrieved_context: Vec<ContextItem>,
    #[serde(default)]
    pub optimized_query: Option<String>,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub playing: bool,
}

impl Message {
    pub fn user(text: &str) -> Self {
        Self::new(Role::User, text)
    }

    pub fn bot(text: &str) -> Self {
        Self::new(Role::Bot, text)
    }

    /// An empty bot message about to be filled by an incoming stream.
    pub fn bot_open() -> Self {
        Self::new(Role::Bot, "")
    }

    fn new(role: Role, text: &str) -> Self {
        Self {
            id: Uuid::new_v4(),
            role,
            raw: text.to_string(),
            display: text.to_string(),
            clarifications: Vec::new(),
            retrieved_context: Vec::new(),
            optimized_query: None,
            timestamp: Utc::now(),
            playing: false,
        }
    }
}

/// An append-only transcript tied to one conversation session.
///
/// The session id is shared by every request for the lifetime of the
/// conversation and regenerated on reset. Only the most recently appended
/// bot message is ever mutated, and only while its stream is open.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Conversation {
    pub id: Uuid,
    messages: Vec<Message>,
}

impl Conversation {
    pub fn new() -> Self {
        Self {
            id: Uuid::new_v4(),
            messages: Vec::new(),
        }
    }

    /// Start over: fresh session id, empty transcript.
    pub fn reset(&mut self) {
        self.id = Uuid::new_v4();
        self.messages.clear();
    }

    pub fn push(&mut self, message: Message) {
        self.messages.push(message);
    }

    pub fn push_user(&mut self, text: &str) -> Uuid {
        let message = Message::user(text);
        let id = message.id;
        self.messages.push(message);
        id
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn get(&self, index: usize) -> Option<&Message> {
        self.messages.get(index)
    }

    pub fn get_mut(&mut self, index: usize) -> Option<&mut Message> {
        self.messages.get_mut(index)
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// The open bot message, i.e. the last entry if it is bot-authored.
    pub fn open_message_mut(&mut self) -> Option<&mut Message> {
        match self.messages.last_mut() {
            Some(m) if m.role == Role::Bot => Some(m),
            _ => None,
        }
    }

    /// The nearest user message preceding the open bot message.
    ///
    /// The server may echo a normalized version of what the user asked
    /// (`processed_query`); it lands here.
    pub fn preceding_user_mut(&mut self) -> Option<&mut Message> {
        let len = self.messages.len();
        if len < 2 {
            return None;
        }
        self.messages[..len - 1]
            .iter_mut()
            .rev()
            .find(|m| m.role == Role::User)
    }
}

impl Default for Conversation {
    fn default() -> Self {
        Self::new()
    }
}
