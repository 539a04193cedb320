//! Prompt window assembly

use palaver_runtime::{ChatMessage, Role};

use crate::history::ConversationHistory;

/// Number of history entries included after the system instruction.
pub const DEFAULT_WINDOW_SIZE: usize = 15;

/// The role-tagged messages sent to a provider for one turn: a leading
/// system instruction followed by at most `size` recent history entries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromptWindow {
    messages: Vec<ChatMessage>,
}

impl PromptWindow {
    pub fn build(system_prompt: &str, history: &ConversationHistory, size: usize) -> Self {
        let recent = history.recent(size);
        let mut messages = Vec::with_capacity(recent.len() + 1);
        messages.push(ChatMessage::new(Role::System, system_prompt));
        messages.extend(recent.iter().map(|m| m.to_chat_message()));
        Self { messages }
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }

    /// Whitespace-separated word count, a rough stand-in for tokens.
    pub fn estimated_words(&self) -> usize {
        self.messages
            .iter()
            .map(|m| m.content.split_whitespace().count())
            .sum()
    }

    pub fn into_messages(self) -> Vec<ChatMessage> {
        self.messages
    }
}
