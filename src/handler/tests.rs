use super::*;
use crate::agent::AiAgent;
use crate::bus::Platform;
use crate::providers::{AiProvider, AiResponse, GenerationRequest};
use crate::store::SqliteStore;
use async_trait::async_trait;
use std::sync::Mutex;

struct EchoProvider {
    fail: bool,
    turns: Mutex<Vec<usize>>,
}

#[async_trait]
impl AiProvider for EchoProvider {
    fn name(&self) -> &str {
        "Echo"
    }

    fn default_model(&self) -> &str {
        "echo"
    }

    async fn generate(&self, req: GenerationRequest) -> anyhow::Result<AiResponse> {
        self.turns.lock().unwrap().push(req.messages.len());
        if self.fail {
            anyhow::bail!("vendor unreachable");
        }
        let last = req.messages.last().map(|m| m.content.clone()).unwrap_or_default();
        Ok(AiResponse {
            content: format!("echo: {last}"),
            tokens_used: 3,
            model: "echo".into(),
        })
    }
}

fn setup(fail: bool) -> (MessageHandler, Arc<SqliteStore>, Arc<EchoProvider>) {
    let store = Arc::new(SqliteStore::open_in_memory().unwrap());
    let provider = Arc::new(EchoProvider {
        fail,
        turns: Mutex::new(Vec::new()),
    });
    let agent = Arc::new(AiAgent::new(provider.clone()));
    (
        MessageHandler::new(store.clone(), agent),
        store,
        provider,
    )
}

async fn conversation_len(store: &SqliteStore, platform: Platform, user_id: &str) -> usize {
    let user = store.upsert_user(platform, user_id, "x").await.unwrap();
    let conv = store.active_conversation(&user.id).await.unwrap();
    store.message_count(&conv.id).await.unwrap()
}

#[tokio::test]
async fn test_handle_text_message_persists_exchange() {
    let (handler, store, _) = setup(false);
    let mut msg = Message::text(Platform::Telegram, "c1", "u1", "Hola buenos días");
    msg.message_id = Some("m-1".into());

    let reply = handler.handle(&msg).await;
    assert_eq!(reply, "echo: Hola buenos días");
    assert_eq!(conversation_len(&store, Platform::Telegram, "u1").await, 2);

    let user = store.upsert_user(Platform::Telegram, "u1", "x").await.unwrap();
    let conv = store.active_conversation(&user.id).await.unwrap();
    let rows = store.recent_messages(&conv.id, 10).await.unwrap();
    let ids: Vec<&str> = rows.iter().map(|m| m.message_id.as_str()).collect();
    assert!(ids.contains(&"m-1"));
    assert!(ids.contains(&"m-1-ai"));
}

#[tokio::test]
async fn test_history_grows_between_messages() {
    let (handler, _store, provider) = setup(false);
    for text in ["hola", "necesito ayuda con precios", "gracias"] {
        handler
            .handle(&Message::text(Platform::WhatsApp, "c", "u", text))
            .await;
    }
    // system + history + current: 2, 4, 6
    assert_eq!(*provider.turns.lock().unwrap(), vec![2, 4, 6]);
}

#[tokio::test]
async fn test_vendor_failure_still_replies_and_persists() {
    let (handler, store, _) = setup(true);
    let reply = handler
        .handle(&Message::text(Platform::WhatsApp, "c", "u2", "Hola buenos días"))
        .await;
    assert!(!reply.is_empty());
    assert_ne!(reply, TECHNICAL_DIFFICULTIES_REPLY);
    assert_eq!(conversation_len(&store, Platform::WhatsApp, "u2").await, 2);
}

#[tokio::test]
async fn test_empty_and_non_text_messages_get_text_only_reply() {
    let (handler, store, provider) = setup(false);
    let blank = Message::text(Platform::Telegram, "c", "u3", "   ");
    assert_eq!(handler.handle(&blank).await, TEXT_ONLY_REPLY);

    let mut photo = Message::text(Platform::Telegram, "c", "u3", "[Photo: 3 sizes]");
    photo.kind = MessageKind::Photo;
    assert_eq!(handler.handle(&photo).await, TEXT_ONLY_REPLY);

    assert!(provider.turns.lock().unwrap().is_empty());
    assert_eq!(conversation_len(&store, Platform::Telegram, "u3").await, 0);
}

#[tokio::test]
async fn test_callback_data_is_processed_as_text() {
    let (handler, _, _) = setup(false);
    let mut msg = Message::text(Platform::Telegram, "c", "u4", "precios");
    msg.kind = MessageKind::Callback;
    assert_eq!(handler.handle(&msg).await, "echo: precios");
}

struct UnavailableStore;

fn down<T>() -> BizbotResult<T> {
    Err(crate::errors::BizbotError::Store("database is locked".into()))
}

#[async_trait]
impl ConversationStore for UnavailableStore {
    async fn upsert_user(
        &self,
        _platform: Platform,
        _platform_user_id: &str,
        _name: &str,
    ) -> BizbotResult<crate::store::UnifiedUser> {
        down()
    }

    async fn get_user(&self, _id: &str) -> BizbotResult<Option<crate::store::UnifiedUser>> {
        down()
    }

    async fn update_user(
        &self,
        _id: &str,
        _update: crate::store::UserUpdate,
    ) -> BizbotResult<crate::store::UnifiedUser> {
        down()
    }

    async fn active_conversation(&self, _user_id: &str) -> BizbotResult<crate::store::Conversation> {
        down()
    }

    async fn close_conversation(&self, _conversation_id: &str) -> BizbotResult<()> {
        down()
    }

    async fn conversations_for_user(
        &self,
        _user_id: &str,
    ) -> BizbotResult<Vec<crate::store::Conversation>> {
        down()
    }

    async fn recent_messages(
        &self,
        _conversation_id: &str,
        _limit: usize,
    ) -> BizbotResult<Vec<crate::store::StoredMessage>> {
        down()
    }

    async fn save_exchange(
        &self,
        _conversation_id: &str,
        _inbound: NewMessage,
        _outbound: NewMessage,
    ) -> BizbotResult<()> {
        down()
    }

    async fn message_count(&self, _conversation_id: &str) -> BizbotResult<usize> {
        down()
    }
}

#[tokio::test]
async fn test_store_failure_returns_apology() {
    let provider = Arc::new(EchoProvider {
        fail: false,
        turns: Mutex::new(Vec::new()),
    });
    let handler = MessageHandler::new(
        Arc::new(UnavailableStore),
        Arc::new(AiAgent::new(provider.clone())),
    );
    let reply = handler
        .handle(&Message::text(Platform::Telegram, "c", "u5", "hola"))
        .await;
    assert_eq!(reply, TECHNICAL_DIFFICULTIES_REPLY);
    assert!(provider.turns.lock().unwrap().is_empty());
}
