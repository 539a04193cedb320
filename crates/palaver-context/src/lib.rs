//! Palaver Conversations - per-conversation actors over persisted history
//!
//! This crate provides:
//! - Conversation history and prompt windowing
//! - Key-value persistence (in-memory and file-backed)
//! - One actor per conversation id, serializing all access to its history

pub mod actor;
pub mod config;
pub mod error;
pub mod history;
pub mod manager;
pub mod store;
pub mod window;

pub use actor::{ChatReply, ChatTurn};
pub use config::ConversationConfig;
pub use error::{ContextError, ContextResult, StoreError};
pub use history::{ConversationHistory, Message};
pub use manager::ConversationHub;
pub use store::{ConversationStore, FileStore, MemoryStore};
pub use window::PromptWindow;

/// Prelude for common imports
pub mod prelude {
    pub use crate::actor::{ChatReply, ChatTurn};
    pub use crate::config::ConversationConfig;
    pub use crate::error::{ContextError, ContextResult};
    pub use crate::history::{ConversationHistory, Message};
    pub use crate::manager::ConversationHub;
    pub use crate::store::ConversationStore;
}
