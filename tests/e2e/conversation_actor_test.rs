//! Behavioural tests for conversation actors driven through the hub.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use palaver_context::{
    ChatTurn, ContextError, ConversationConfig, ConversationHub, ConversationStore, FileStore,
    MemoryStore, StoreError,
};
use palaver_runtime::{
    AIProvider, ChatMessage, GenerateRequest, GenerateResponse, MockProvider, ProviderError,
    ProviderErrorKind, Role,
};

/// Replies with the last user message, after a short content-dependent delay.
struct EchoProvider;

#[async_trait]
impl AIProvider for EchoProvider {
    fn name(&self) -> &'static str {
        "echo"
    }

    async fn generate(&self, req: GenerateRequest) -> Result<GenerateResponse, ProviderError> {
        let last = req
            .messages
            .iter()
            .rev()
            .find(|m| m.role == Role::User)
            .map(|m| m.content.clone())
            .unwrap_or_default();
        tokio::time::sleep(Duration::from_millis((last.len() % 7) as u64)).await;
        Ok(GenerateResponse {
            content: format!("echo: {last}"),
            model: None,
        })
    }
}

/// Never answers within any reasonable timeout.
struct StalledProvider;

#[async_trait]
impl AIProvider for StalledProvider {
    fn name(&self) -> &'static str {
        "stalled"
    }

    async fn generate(&self, _req: GenerateRequest) -> Result<GenerateResponse, ProviderError> {
        tokio::time::sleep(Duration::from_secs(30)).await;
        Err(ProviderError::Message("unreachable".to_string()))
    }
}

/// Store whose every operation fails.
struct BrokenStore;

#[async_trait]
impl ConversationStore for BrokenStore {
    async fn get(&self, _key: &str) -> Result<Option<Vec<u8>>, StoreError> {
        Err(StoreError::Backend("disk on fire".to_string()))
    }

    async fn put(&self, _key: &str, _value: Vec<u8>) -> Result<(), StoreError> {
        Err(StoreError::Backend("disk on fire".to_string()))
    }

    async fn delete(&self, _key: &str) -> Result<(), StoreError> {
        Err(StoreError::Backend("disk on fire".to_string()))
    }
}

fn mock_hub() -> (ConversationHub, Arc<MockProvider>) {
    let provider = Arc::new(MockProvider::new());
    let hub = ConversationHub::new(
        Arc::new(MemoryStore::new()),
        Arc::clone(&provider) as Arc<dyn AIProvider>,
        ConversationConfig::default(),
    );
    (hub, provider)
}

fn echo_hub() -> ConversationHub {
    ConversationHub::new(
        Arc::new(MemoryStore::new()),
        Arc::new(EchoProvider),
        ConversationConfig::default(),
    )
}

#[tokio::test]
async fn unknown_conversation_has_empty_history_and_clears() {
    let (hub, provider) = mock_hub();

    assert!(hub.history("never-written").await.unwrap().is_empty());
    hub.clear("never-written").await.unwrap();
    assert!(provider.requests().is_empty());
}

#[tokio::test]
async fn first_turn_records_user_then_assistant() {
    let (hub, provider) = mock_hub();
    provider.enqueue_reply("hello!");

    let reply = hub.chat("c1", ChatTurn::new("hi")).await.unwrap();
    assert_eq!(reply.response, "hello!");

    let history = hub.history("c1").await.unwrap();
    let messages = history.messages();
    assert_eq!(messages.len(), 2);
    assert_eq!((messages[0].role, messages[0].content.as_str()), (Role::User, "hi"));
    assert_eq!(
        (messages[1].role, messages[1].content.as_str()),
        (Role::Assistant, "hello!")
    );
    assert!(messages[0].timestamp <= messages[1].timestamp);
}

#[tokio::test]
async fn request_carries_system_prompt_and_sampling() {
    let (hub, provider) = mock_hub();
    provider.enqueue_reply("ok");

    hub.chat("c1", ChatTurn::new("hi")).await.unwrap();

    let requests = provider.requests();
    assert_eq!(requests.len(), 1);
    let request = &requests[0];
    assert_eq!(request.messages[0].role, Role::System);
    assert_eq!(request.messages[0].content, hub.config().system_prompt);
    assert_eq!(request.messages[1], ChatMessage::new(Role::User, "hi"));
    assert_eq!(request.temperature, Some(0.8));
    assert_eq!(request.max_tokens, Some(1000));
}

#[tokio::test]
async fn replace_history_discards_prior_transcript() {
    let (hub, provider) = mock_hub();
    provider.enqueue_reply("first reply");
    provider.enqueue_reply("second reply");

    hub.chat("c1", ChatTurn::new("old question")).await.unwrap();

    let replacement = vec![
        ChatMessage::new(Role::User, "q1"),
        ChatMessage::new(Role::Assistant, "a1"),
        ChatMessage::new(Role::User, "q2"),
    ];
    hub.chat(
        "c1",
        ChatTurn::new("q3").with_replace_history(replacement.clone()),
    )
    .await
    .unwrap();

    let history = hub.history("c1").await.unwrap();
    assert_eq!(history.len(), replacement.len() + 2);
    for (stored, supplied) in history.messages().iter().zip(&replacement) {
        assert_eq!(stored.role, supplied.role);
        assert_eq!(stored.content, supplied.content);
    }
    assert!(history
        .messages()
        .iter()
        .all(|m| m.content != "old question"));
}

#[tokio::test]
async fn prompt_window_caps_at_sixteen_messages() {
    let (hub, provider) = mock_hub();

    for turn in 0..100 {
        provider.enqueue_reply(format!("reply {turn}"));
        hub.chat("long", ChatTurn::new(format!("turn {turn}")))
            .await
            .unwrap();
    }

    let requests = provider.requests();
    assert!(requests.iter().all(|r| r.messages.len() <= 16));
    let last = requests.last().unwrap();
    assert_eq!(last.messages.len(), 16);
    assert_eq!(last.messages[15].content, "turn 99");
    assert_eq!(hub.history("long").await.unwrap().len(), 200);
}

#[tokio::test]
async fn clear_then_history_is_empty() {
    let (hub, provider) = mock_hub();
    provider.enqueue_reply("ok");

    hub.chat("c1", ChatTurn::new("hi")).await.unwrap();
    hub.clear("c1").await.unwrap();

    assert!(hub.history("c1").await.unwrap().is_empty());
}

#[tokio::test]
async fn rate_limited_failure_leaves_history_untouched() {
    let (hub, provider) = mock_hub();
    provider.enqueue_reply("fine");
    provider.enqueue_generate(Err(ProviderError::HttpStatus {
        status: 429,
        body: "Too Many Requests".to_string(),
    }));

    hub.chat("c1", ChatTurn::new("hi")).await.unwrap();
    let before = hub.history("c1").await.unwrap();

    let err = hub.chat("c1", ChatTurn::new("again")).await.unwrap_err();
    match &err {
        ContextError::Provider { kind, .. } => assert_eq!(*kind, ProviderErrorKind::RateLimited),
        other => panic!("expected provider error, got {other:?}"),
    }
    assert_eq!(
        err.to_string(),
        "Rate limit exceeded. Please wait a moment before trying again."
    );

    assert_eq!(hub.history("c1").await.unwrap(), before);
}

#[tokio::test]
async fn failed_replacement_is_not_persisted() {
    let (hub, provider) = mock_hub();
    provider.enqueue_reply("kept");
    provider.enqueue_generate(Err(ProviderError::Message("5007: model gone".to_string())));

    hub.chat("c1", ChatTurn::new("hi")).await.unwrap();
    let before = hub.history("c1").await.unwrap();

    let err = hub
        .chat(
            "c1",
            ChatTurn::new("new").with_replace_history(vec![ChatMessage::new(Role::User, "x")]),
        )
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        ContextError::Provider {
            kind: ProviderErrorKind::ModelUnavailable,
            ..
        }
    ));
    assert_eq!(hub.history("c1").await.unwrap(), before);
}

#[tokio::test]
async fn empty_provider_text_uses_fallback_reply() {
    let (hub, provider) = mock_hub();
    provider.enqueue_reply("");

    let reply = hub.chat("c1", ChatTurn::new("hi")).await.unwrap();

    assert_eq!(
        reply.response,
        "I apologize, but I couldn't generate a response right now."
    );
    assert_eq!(hub.history("c1").await.unwrap().len(), 2);
}

#[tokio::test]
async fn provider_timeout_is_a_provider_error() {
    let hub = ConversationHub::new(
        Arc::new(MemoryStore::new()),
        Arc::new(StalledProvider),
        ConversationConfig::default().with_provider_timeout(Duration::from_millis(50)),
    );

    let err = hub.chat("slow", ChatTurn::new("hi")).await.unwrap_err();

    match err {
        ContextError::Provider { kind, source } => {
            assert_eq!(kind, ProviderErrorKind::Unknown);
            assert_eq!(source, ProviderError::Timeout(Duration::from_millis(50)));
        }
        other => panic!("expected timeout, got {other:?}"),
    }
    assert!(hub.history("slow").await.unwrap().is_empty());
}

#[tokio::test]
async fn invalid_input_fails_before_touching_store() {
    let hub = ConversationHub::new(
        Arc::new(BrokenStore),
        Arc::new(MockProvider::new()),
        ConversationConfig::default(),
    );

    let err = hub.chat("c1", ChatTurn::new("  ")).await.unwrap_err();

    assert!(matches!(err, ContextError::InvalidMessage(_)));
}

#[tokio::test]
async fn store_failures_propagate() {
    let hub = ConversationHub::new(
        Arc::new(BrokenStore),
        Arc::new(MockProvider::new()),
        ConversationConfig::default(),
    );

    assert!(matches!(
        hub.history("c1").await,
        Err(ContextError::Store(StoreError::Backend(_)))
    ));
    assert!(matches!(
        hub.clear("c1").await,
        Err(ContextError::Store(StoreError::Backend(_)))
    ));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_turns_on_one_id_never_interleave() {
    let hub = Arc::new(echo_hub());

    let tasks: Vec<_> = (0..20)
        .map(|i| {
            let hub = Arc::clone(&hub);
            tokio::spawn(async move {
                hub.chat("shared", ChatTurn::new(format!("message {i}")))
                    .await
                    .unwrap()
            })
        })
        .collect();
    for task in tasks {
        task.await.unwrap();
    }

    let history = hub.history("shared").await.unwrap();
    assert_eq!(history.len(), 40);
    for pair in history.messages().chunks(2) {
        assert_eq!(pair[0].role, Role::User);
        assert_eq!(pair[1].role, Role::Assistant);
        assert_eq!(pair[1].content, format!("echo: {}", pair[0].content));
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn different_ids_do_not_share_history() {
    let hub = Arc::new(echo_hub());

    let tasks: Vec<_> = ["alpha", "beta", "gamma"]
        .into_iter()
        .flat_map(|id| (0..5).map(move |i| (id, i)))
        .map(|(id, i)| {
            let hub = Arc::clone(&hub);
            tokio::spawn(async move {
                hub.chat(id, ChatTurn::new(format!("{id}-{i}")))
                    .await
                    .unwrap()
            })
        })
        .collect();
    for task in tasks {
        task.await.unwrap();
    }

    for id in ["alpha", "beta", "gamma"] {
        let history = hub.history(id).await.unwrap();
        assert_eq!(history.len(), 10);
        assert!(history
            .messages()
            .iter()
            .all(|m| m.content.contains(&format!("{id}-"))));
    }
    assert_eq!(hub.active_conversations().await, 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn reads_of_unknown_ids_leave_no_actors_behind() {
    let hub = Arc::new(echo_hub());

    let tasks: Vec<_> = (0..200)
        .map(|i| {
            let hub = Arc::clone(&hub);
            tokio::spawn(async move {
                let id = format!("visitor-{i}");
                assert!(hub.history(&id).await.unwrap().is_empty());
                hub.clear(&id).await.unwrap();
            })
        })
        .collect();
    for task in tasks {
        task.await.unwrap();
    }

    assert_eq!(hub.active_conversations().await, 0);
}

#[tokio::test]
async fn file_store_history_survives_new_hub() {
    let dir = tempfile::tempdir().unwrap();

    let provider = Arc::new(MockProvider::new());
    provider.enqueue_reply("persisted");
    let hub = ConversationHub::new(
        Arc::new(FileStore::open(dir.path()).await.unwrap()),
        Arc::clone(&provider) as Arc<dyn AIProvider>,
        ConversationConfig::default(),
    );
    hub.chat("durable", ChatTurn::new("remember me")).await.unwrap();
    drop(hub);

    let reopened = ConversationHub::new(
        Arc::new(FileStore::open(dir.path()).await.unwrap()),
        provider,
        ConversationConfig::default(),
    );
    let history = reopened.history("durable").await.unwrap();
    assert_eq!(history.len(), 2);
    assert_eq!(history.messages()[1].content, "persisted");
}
