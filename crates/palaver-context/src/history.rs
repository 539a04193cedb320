//! Conversation history types

use chrono::Utc;
use palaver_runtime::{ChatMessage, Role};
use serde::{Deserialize, Serialize};

use crate::error::ContextResult;

/// Message in a conversation transcript
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
    /// Epoch milliseconds at which the message entered the history.
    pub timestamp: i64,
}

impl Message {
    pub fn new(role: Role, content: impl Into<String>, timestamp: i64) -> Self {
        Self {
            role,
            content: content.into(),
            timestamp,
        }
    }

    /// Drop the timestamp, keeping what a provider needs.
    pub fn to_chat_message(&self) -> ChatMessage {
        ChatMessage::new(self.role, self.content.clone())
    }
}

fn now_millis() -> i64 {
    Utc::now().timestamp_millis()
}

/// Ordered transcript of one conversation; persisted as a JSON array.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConversationHistory {
    messages: Vec<Message>,
}

impl ConversationHistory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a fresh history from caller-supplied entries, stamping every
    /// entry with the current time and keeping their order.
    pub fn replaced(entries: &[ChatMessage]) -> Self {
        let now = now_millis();
        Self {
            messages: entries
                .iter()
                .map(|entry| Message::new(entry.role, entry.content.clone(), now))
                .collect(),
        }
    }

    /// Append a message stamped with the current time. Timestamps never go
    /// backwards within one history, even if the wall clock does.
    pub fn push(&mut self, role: Role, content: impl Into<String>) -> &Message {
        let floor = self.messages.last().map_or(i64::MIN, |m| m.timestamp);
        let timestamp = now_millis().max(floor);
        self.messages.push(Message::new(role, content, timestamp));
        &self.messages[self.messages.len() - 1]
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn into_messages(self) -> Vec<Message> {
        self.messages
    }

    /// The last `count` messages, oldest first.
    pub fn recent(&self, count: usize) -> &[Message] {
        let start = self.messages.len().saturating_sub(count);
        &self.messages[start..]
    }

    pub fn decode(bytes: &[u8]) -> ContextResult<Self> {
        Ok(serde_json::from_slice(bytes)?)
    }

    pub fn encode(&self) -> ContextResult<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }
}

impl From<Vec<Message>> for ConversationHistory {
    fn from(messages: Vec<Message>) -> Self {
        Self { messages }
    }
}
