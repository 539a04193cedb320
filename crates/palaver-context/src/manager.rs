//! Conversation hub: routes each conversation id to its single actor.

use std::collections::HashMap;
use std::sync::Arc;

use palaver_runtime::AIProvider;
use tokio::sync::{oneshot, RwLock};
use tracing::{debug, warn};

use crate::actor::{
    ActorHandle, ActorRegistry, ChatReply, ChatTurn, Claim, Command, ConversationActor,
};
use crate::config::ConversationConfig;
use crate::error::{ContextError, ContextResult};
use crate::history::ConversationHistory;
use crate::store::ConversationStore;

/// Entry point for conversation operations.
///
/// Actors are spawned lazily on first use of an id and retire once no
/// operation for that id is queued or running, so the registry only holds
/// busy conversations. Operations on one id run strictly one after another;
/// different ids proceed in parallel.
pub struct ConversationHub {
    actors: ActorRegistry,
    store: Arc<dyn ConversationStore>,
    provider: Arc<dyn AIProvider>,
    config: Arc<ConversationConfig>,
}

impl ConversationHub {
    pub fn new(
        store: Arc<dyn ConversationStore>,
        provider: Arc<dyn AIProvider>,
        config: ConversationConfig,
    ) -> Self {
        Self {
            actors: Arc::new(RwLock::new(HashMap::new())),
            store,
            provider,
            config: Arc::new(config),
        }
    }

    pub fn config(&self) -> &ConversationConfig {
        &self.config
    }

    /// Run one chat turn against `conversation_id`.
    pub async fn chat(&self, conversation_id: &str, turn: ChatTurn) -> ContextResult<ChatReply> {
        validate_id(conversation_id)?;
        turn.validate()?;
        self.dispatch(conversation_id, |reply| Command::Chat { turn, reply })
            .await
    }

    /// Full persisted transcript, empty for unknown ids.
    pub async fn history(&self, conversation_id: &str) -> ContextResult<ConversationHistory> {
        validate_id(conversation_id)?;
        self.dispatch(conversation_id, |reply| Command::History { reply })
            .await
    }

    /// Delete the persisted transcript. Succeeds for unknown ids.
    pub async fn clear(&self, conversation_id: &str) -> ContextResult<()> {
        validate_id(conversation_id)?;
        self.dispatch(conversation_id, |reply| Command::Clear { reply })
            .await
    }

    /// Number of conversations with an operation queued or in flight.
    pub async fn active_conversations(&self) -> usize {
        self.actors
            .read()
            .await
            .values()
            .filter(|handle| !handle.is_closed())
            .count()
    }

    async fn dispatch<T>(
        &self,
        conversation_id: &str,
        make: impl FnOnce(oneshot::Sender<ContextResult<T>>) -> Command,
    ) -> ContextResult<T> {
        let (tx, rx) = oneshot::channel();
        let mut command = make(tx);

        // A closed mailbox means the actor task died; respawn once.
        for _ in 0..2 {
            let claim = self.claim(conversation_id).await;
            let handle = claim.handle().clone();
            match claim.send(command).await {
                Ok(()) => {
                    return rx.await.unwrap_or_else(|_| {
                        Err(ContextError::ActorUnavailable(conversation_id.to_string()))
                    });
                }
                Err(returned) => {
                    warn!(conversation_id, "conversation actor mailbox closed, respawning");
                    self.evict(conversation_id, &handle).await;
                    command = returned;
                }
            }
        }

        Err(ContextError::ActorUnavailable(conversation_id.to_string()))
    }

    /// Claim the live actor for `conversation_id`, spawning one if needed.
    /// Claims are taken under the registry lock so an actor cannot retire
    /// between lookup and send.
    async fn claim(&self, conversation_id: &str) -> Claim {
        if let Some(handle) = self.actors.read().await.get(conversation_id) {
            if !handle.is_closed() {
                return handle.claim();
            }
        }

        let mut actors = self.actors.write().await;
        if let Some(handle) = actors.get(conversation_id) {
            if !handle.is_closed() {
                return handle.claim();
            }
        }

        debug!(conversation_id, "spawning conversation actor");
        let handle = ConversationActor::new(
            conversation_id.to_string(),
            Arc::clone(&self.store),
            Arc::clone(&self.provider),
            Arc::clone(&self.config),
            Arc::clone(&self.actors),
        )
        .spawn();
        let claim = handle.claim();
        actors.insert(conversation_id.to_string(), handle);
        claim
    }

    async fn evict(&self, conversation_id: &str, stale: &ActorHandle) {
        let mut actors = self.actors.write().await;
        if actors
            .get(conversation_id)
            .is_some_and(|current| current.same_actor(stale))
        {
            actors.remove(conversation_id);
        }
    }
}

fn validate_id(conversation_id: &str) -> ContextResult<()> {
    if conversation_id.is_empty() {
        return Err(ContextError::InvalidConversationId(
            conversation_id.to_string(),
        ));
    }
    Ok(())
}
