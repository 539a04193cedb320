//! Error types for conversation handling

use std::path::PathBuf;

use palaver_runtime::{ProviderError, ProviderErrorKind};
use thiserror::Error;

/// Failure reported by a [`ConversationStore`](crate::store::ConversationStore).
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Storage backend error: {0}")]
    Backend(String),
}

impl StoreError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

/// Conversation error type
#[derive(Error, Debug)]
pub enum ContextError {
    #[error("Invalid message: {0}")]
    InvalidMessage(String),

    #[error("Invalid conversation id: {0:?}")]
    InvalidConversationId(String),

    /// The provider call failed; displays the user-facing message for `kind`.
    #[error("{}", .kind.user_message())]
    Provider {
        kind: ProviderErrorKind,
        #[source]
        source: ProviderError,
    },

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("Conversation actor unavailable: {0}")]
    ActorUnavailable(String),
}

impl ContextError {
    pub fn provider(source: ProviderError) -> Self {
        Self::Provider {
            kind: source.kind(),
            source,
        }
    }

    /// True for failures caused by the caller's input.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            Self::InvalidMessage(_) | Self::InvalidConversationId(_)
        )
    }
}

/// Result type for conversation operations
pub type ContextResult<T> = Result<T, ContextError>;
