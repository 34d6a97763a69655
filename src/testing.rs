//! Shared doubles for unit tests.

use async_trait::async_trait;
use serde_json::Value;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::bus::{Message, Platform};
use crate::channels::{HandlerSet, MessageCallback, MessagingProvider, ProviderRegistry};
use crate::providers::{AiProvider, AiResponse, GenerationRequest};
use crate::store::{Bot, BotConfig, NewBot};

pub const CANNED_REPLY: &str = "¡Hola desde la tienda!";

pub struct CannedAi;

#[async_trait]
impl AiProvider for CannedAi {
    fn name(&self) -> &str {
        "Canned"
    }

    fn default_model(&self) -> &str {
        "canned"
    }

    async fn generate(&self, _req: GenerationRequest) -> anyhow::Result<AiResponse> {
        Ok(AiResponse {
            content: CANNED_REPLY.into(),
            tokens_used: 5,
            model: "canned".into(),
        })
    }
}

#[derive(Default)]
pub struct MockState {
    pub built: AtomicUsize,
    pub initialized: AtomicUsize,
    pub stopped: AtomicUsize,
    pub sent: Mutex<Vec<(String, String)>>,
    pub payloads: Mutex<Vec<(Platform, Value)>>,
}

/// Provider double. Tokens `bad` fail `initialize`, `sticky` fail `stop`.
/// Webhook payloads `{"text": ...}` are dispatched as a text message from
/// `user-1` in `chat-1`.
pub struct MockProvider {
    platform: Platform,
    state: Arc<MockState>,
    handlers: HandlerSet,
    fail_init: bool,
    fail_stop: bool,
}

#[async_trait]
impl MessagingProvider for MockProvider {
    fn platform(&self) -> Platform {
        self.platform
    }

    async fn initialize(&self) -> anyhow::Result<()> {
        tokio::time::sleep(Duration::from_millis(20)).await;
        self.state.initialized.fetch_add(1, Ordering::SeqCst);
        if self.fail_init {
            anyhow::bail!("invalid token");
        }
        Ok(())
    }

    async fn stop(&self) -> anyhow::Result<()> {
        self.state.stopped.fetch_add(1, Ordering::SeqCst);
        if self.fail_stop {
            anyhow::bail!("socket already closed");
        }
        Ok(())
    }

    async fn send_message(&self, chat_id: &str, text: &str) -> bool {
        self.state
            .sent
            .lock()
            .unwrap()
            .push((chat_id.to_string(), text.to_string()));
        true
    }

    fn on_message(&self, handler: MessageCallback) {
        self.handlers.push(handler);
    }

    fn account_name(&self) -> Option<String> {
        Some("shop_bot".into())
    }

    async fn handle_webhook_payload(&self, payload: Value) -> anyhow::Result<()> {
        self.state
            .payloads
            .lock()
            .unwrap()
            .push((self.platform, payload.clone()));
        if let Some(text) = payload.get("text").and_then(Value::as_str) {
            self.handlers
                .dispatch(Message::text(self.platform, "chat-1", "user-1", text))
                .await;
        }
        Ok(())
    }
}

pub fn mock_registry(state: &Arc<MockState>) -> ProviderRegistry {
    let mut registry = ProviderRegistry::empty();
    for platform in Platform::ALL {
        let state = state.clone();
        registry.register(
            platform,
            Box::new(move |bot: &Bot| {
                state.built.fetch_add(1, Ordering::SeqCst);
                Ok(Arc::new(MockProvider {
                    platform,
                    state: state.clone(),
                    handlers: HandlerSet::new(),
                    fail_init: bot.bot_token == "bad",
                    fail_stop: bot.bot_token == "sticky",
                }) as Arc<dyn MessagingProvider>)
            }),
        );
    }
    registry
}

pub fn new_bot(platform: Platform, token: &str) -> NewBot {
    NewBot {
        business_id: None,
        platform,
        bot_token: token.into(),
        username: None,
        config: BotConfig::default(),
    }
}
