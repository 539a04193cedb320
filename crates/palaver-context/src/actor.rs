//! Per-conversation actor.
//!
//! Each conversation id is owned by exactly one actor task that drains a
//! mailbox in arrival order, so history read-modify-write never races.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Instant;

use palaver_runtime::{AIProvider, ChatMessage, GenerateRequest, ProviderError, Role};
use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, oneshot, RwLock};
use tracing::{debug, error, info, warn};

use crate::config::{ConversationConfig, EMPTY_REPLY_FALLBACK};
use crate::error::{ContextError, ContextResult};
use crate::history::ConversationHistory;
use crate::store::ConversationStore;
use crate::window::PromptWindow;

const LOG_PREVIEW_CHARS: usize = 100;

/// One user turn, optionally preceded by a full replacement transcript.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatTurn {
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub replace_history: Option<Vec<ChatMessage>>,
}

impl ChatTurn {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            replace_history: None,
        }
    }

    pub fn with_replace_history(mut self, entries: Vec<ChatMessage>) -> Self {
        self.replace_history = Some(entries);
        self
    }

    /// Reject turns that must never reach the store or the provider.
    pub fn validate(&self) -> ContextResult<()> {
        if self.message.is_empty() {
            return Err(ContextError::InvalidMessage(
                "message must not be empty".to_string(),
            ));
        }
        let has_system = self
            .replace_history
            .iter()
            .flatten()
            .any(|entry| entry.role == Role::System);
        if has_system {
            return Err(ContextError::InvalidMessage(
                "replaceHistory may only contain user and assistant messages".to_string(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatReply {
    pub response: String,
    pub conversation_id: String,
}

/// Live actors keyed by conversation id, shared by the hub and its actors.
pub(crate) type ActorRegistry = Arc<RwLock<HashMap<String, ActorHandle>>>;

pub(crate) enum Command {
    Chat {
        turn: ChatTurn,
        reply: oneshot::Sender<ContextResult<ChatReply>>,
    },
    History {
        reply: oneshot::Sender<ContextResult<ConversationHistory>>,
    },
    Clear {
        reply: oneshot::Sender<ContextResult<()>>,
    },
    /// Nudge sent when an abandoned claim leaves the actor with no work.
    Retire,
}

/// Sending side of an actor's mailbox.
///
/// `pending` counts claims whose command has not finished running yet. It is
/// only incremented under the registry lock, and the actor only retires while
/// holding the write lock with `pending == 0`.
#[derive(Clone)]
pub(crate) struct ActorHandle {
    tx: mpsc::Sender<Command>,
    pending: Arc<AtomicUsize>,
}

impl ActorHandle {
    /// Reserve the actor for one command. Call with the registry lock held.
    pub(crate) fn claim(&self) -> Claim {
        self.pending.fetch_add(1, Ordering::AcqRel);
        Claim {
            handle: self.clone(),
            sent: false,
        }
    }

    pub(crate) fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }

    pub(crate) fn same_actor(&self, other: &Self) -> bool {
        self.tx.same_channel(&other.tx)
    }

    fn tracks(&self, pending: &Arc<AtomicUsize>) -> bool {
        Arc::ptr_eq(&self.pending, pending)
    }
}

/// One dispatcher's reservation on an actor.
///
/// Once sent, the actor releases it after running the command. A claim
/// dropped before sending releases itself.
pub(crate) struct Claim {
    handle: ActorHandle,
    sent: bool,
}

impl Claim {
    pub(crate) fn handle(&self) -> &ActorHandle {
        &self.handle
    }

    pub(crate) async fn send(mut self, command: Command) -> Result<(), Command> {
        self.handle.tx.send(command).await.map_err(|e| e.0)?;
        self.sent = true;
        Ok(())
    }
}

impl Drop for Claim {
    fn drop(&mut self) {
        if !self.sent && self.handle.pending.fetch_sub(1, Ordering::AcqRel) == 1 {
            let _ = self.handle.tx.try_send(Command::Retire);
        }
    }
}

pub(crate) struct ConversationActor {
    id: String,
    store: Arc<dyn ConversationStore>,
    provider: Arc<dyn AIProvider>,
    config: Arc<ConversationConfig>,
    registry: ActorRegistry,
}

impl ConversationActor {
    pub(crate) fn new(
        id: String,
        store: Arc<dyn ConversationStore>,
        provider: Arc<dyn AIProvider>,
        config: Arc<ConversationConfig>,
        registry: ActorRegistry,
    ) -> Self {
        Self {
            id,
            store,
            provider,
            config,
            registry,
        }
    }

    /// Start the actor task and return its mailbox.
    pub(crate) fn spawn(self) -> ActorHandle {
        let (tx, rx) = mpsc::channel(self.config.mailbox_capacity.max(1));
        let pending = Arc::new(AtomicUsize::new(0));
        tokio::spawn(self.run(rx, Arc::clone(&pending)));
        ActorHandle { tx, pending }
    }

    /// Drain the mailbox until no claim is outstanding, then retire.
    async fn run(self, mut rx: mpsc::Receiver<Command>, pending: Arc<AtomicUsize>) {
        debug!(conversation_id = %self.id, "conversation actor started");
        // A dropped reply receiver does not cancel the operation.
        while let Some(command) = rx.recv().await {
            let retired = match command {
                Command::Chat { turn, reply } => {
                    let result = self.chat(turn).await;
                    self.complete(&pending, reply, result).await
                }
                Command::History { reply } => {
                    let result = self.history().await;
                    self.complete(&pending, reply, result).await
                }
                Command::Clear { reply } => {
                    let result = self.clear().await;
                    self.complete(&pending, reply, result).await
                }
                Command::Retire => self.retire_if_idle(&pending).await,
            };
            if retired {
                break;
            }
        }
        debug!(conversation_id = %self.id, "conversation actor stopped");
    }

    /// Release the command's claim, then reply. Retirement happens first so a
    /// caller that sees the reply also sees the registry without this actor.
    async fn complete<T>(
        &self,
        pending: &Arc<AtomicUsize>,
        reply: oneshot::Sender<T>,
        result: T,
    ) -> bool {
        let retired = pending.fetch_sub(1, Ordering::AcqRel) == 1
            && self.retire_if_idle(pending).await;
        let _ = reply.send(result);
        retired
    }

    async fn retire_if_idle(&self, pending: &Arc<AtomicUsize>) -> bool {
        let mut actors = self.registry.write().await;
        if pending.load(Ordering::Acquire) > 0 {
            return false;
        }
        if actors
            .get(&self.id)
            .is_some_and(|current| current.tracks(pending))
        {
            actors.remove(&self.id);
        }
        debug!(conversation_id = %self.id, "conversation actor idle, retiring");
        true
    }

    async fn load(&self) -> ContextResult<ConversationHistory> {
        match self.store.get(&self.id).await? {
            Some(bytes) => ConversationHistory::decode(&bytes),
            None => Ok(ConversationHistory::new()),
        }
    }

    async fn history(&self) -> ContextResult<ConversationHistory> {
        let history = self.load().await?;
        debug!(conversation_id = %self.id, history_len = history.len(), "fetched history");
        Ok(history)
    }

    async fn clear(&self) -> ContextResult<()> {
        self.store.delete(&self.id).await?;
        info!(conversation_id = %self.id, "cleared history");
        Ok(())
    }

    async fn chat(&self, turn: ChatTurn) -> ContextResult<ChatReply> {
        turn.validate()?;
        let ChatTurn {
            message,
            replace_history,
        } = turn;

        debug!(
            conversation_id = %self.id,
            message = %preview(&message),
            "processing chat turn"
        );

        let mut history = match replace_history {
            Some(entries) => {
                info!(
                    conversation_id = %self.id,
                    replaced_len = entries.len(),
                    "replacing history"
                );
                ConversationHistory::replaced(&entries)
            }
            None => {
                let history = self.load().await?;
                debug!(conversation_id = %self.id, history_len = history.len(), "loaded history");
                history
            }
        };

        history.push(Role::User, message);

        let window = PromptWindow::build(
            &self.config.system_prompt,
            &history,
            self.config.window_size,
        );
        debug!(
            conversation_id = %self.id,
            window_len = window.len(),
            estimated_words = window.estimated_words(),
            "built prompt window"
        );

        let request = GenerateRequest {
            messages: window.into_messages(),
            model: self.config.model.clone(),
            max_tokens: Some(self.config.max_tokens),
            temperature: Some(self.config.temperature),
        };

        let started = Instant::now();
        let outcome =
            match tokio::time::timeout(self.config.provider_timeout, self.provider.generate(request))
                .await
            {
                Ok(outcome) => outcome,
                Err(_) => Err(ProviderError::Timeout(self.config.provider_timeout)),
            };
        let elapsed_ms = started.elapsed().as_millis() as u64;

        let response = match outcome {
            Ok(response) => response,
            Err(source) => {
                let kind = source.kind();
                error!(
                    conversation_id = %self.id,
                    provider = self.provider.name(),
                    kind = kind.as_str(),
                    elapsed_ms,
                    error = %source,
                    "provider call failed"
                );
                return Err(ContextError::Provider { kind, source });
            }
        };

        info!(
            conversation_id = %self.id,
            provider = self.provider.name(),
            elapsed_ms,
            response_len = response.content.len(),
            "provider call completed"
        );

        let text = if response.content.is_empty() {
            warn!(conversation_id = %self.id, "provider returned empty text");
            EMPTY_REPLY_FALLBACK.to_string()
        } else {
            response.content
        };

        history.push(Role::Assistant, text.clone());
        self.store.put(&self.id, history.encode()?).await?;
        info!(conversation_id = %self.id, history_len = history.len(), "saved history");

        Ok(ChatReply {
            response: text,
            conversation_id: self.id.clone(),
        })
    }
}

fn preview(message: &str) -> String {
    let mut chars = message.chars();
    let head: String = chars.by_ref().take(LOG_PREVIEW_CHARS).collect();
    if chars.next().is_some() {
        format!("{head}...")
    } else {
        head
    }
}
