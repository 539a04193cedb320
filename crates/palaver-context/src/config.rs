//! Conversation tuning knobs

use std::time::Duration;

use crate::window::DEFAULT_WINDOW_SIZE;

pub const DEFAULT_SYSTEM_PROMPT: &str = "You are a highly intelligent AI assistant with expertise in various fields. You provide clear, helpful, and engaging responses. You can assist with coding, research, creative tasks, and general inquiries. Always be truthful and direct.";

/// Assistant text recorded when the provider succeeds but returns nothing.
pub const EMPTY_REPLY_FALLBACK: &str =
    "I apologize, but I couldn't generate a response right now.";

/// Settings shared by every conversation actor of a hub.
#[derive(Debug, Clone, PartialEq)]
pub struct ConversationConfig {
    /// Instruction placed at the head of every prompt window.
    pub system_prompt: String,
    /// History entries sent per turn, not counting the system instruction.
    pub window_size: usize,
    pub temperature: f32,
    pub max_tokens: u32,
    /// Model override; `None` uses the provider's default model.
    pub model: Option<String>,
    /// Upper bound on a single provider call.
    pub provider_timeout: Duration,
    /// Pending operations buffered per conversation before callers wait.
    pub mailbox_capacity: usize,
}

impl Default for ConversationConfig {
    fn default() -> Self {
        Self {
            system_prompt: DEFAULT_SYSTEM_PROMPT.to_string(),
            window_size: DEFAULT_WINDOW_SIZE,
            temperature: 0.8,
            max_tokens: 1000,
            model: None,
            provider_timeout: Duration::from_secs(60),
            mailbox_capacity: 32,
        }
    }
}

impl ConversationConfig {
    pub fn with_provider_timeout(mut self, timeout: Duration) -> Self {
        self.provider_timeout = timeout;
        self
    }

    pub fn with_window_size(mut self, window_size: usize) -> Self {
        self.window_size = window_size;
        self
    }
}
