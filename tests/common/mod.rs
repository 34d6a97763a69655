// Shared test helpers; not all items used by every test binary.
#![allow(unused)]

use async_trait::async_trait;
use bizbot::agent::AiAgent;
use bizbot::bus::{Message, Platform};
use bizbot::channels::{
    BotManager, HandlerSet, MessageCallback, MessagingProvider, ProviderRegistry,
};
use bizbot::handler::MessageHandler;
use bizbot::providers::{AiProvider, AiResponse, GenerationRequest};
use bizbot::store::{Bot, BotConfig, BotRepository, NewBot, SqliteStore};
use serde_json::Value;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;

/// AI double that replays queued answers, then a default one.
/// `fail_next` makes the next call error out.
pub struct ScriptedAi {
    replies: Mutex<VecDeque<String>>,
    failures: AtomicUsize,
    pub calls: Mutex<Vec<GenerationRequest>>,
}

impl ScriptedAi {
    pub fn new() -> Self {
        Self {
            replies: Mutex::new(VecDeque::new()),
            failures: AtomicUsize::new(0),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn with_replies(replies: &[&str]) -> Self {
        let ai = Self::new();
        ai.replies
            .lock()
            .unwrap()
            .extend(replies.iter().map(|r| (*r).to_string()));
        ai
    }

    pub fn fail_next(&self, n: usize) {
        self.failures.store(n, Ordering::SeqCst);
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

#[async_trait]
impl AiProvider for ScriptedAi {
    fn name(&self) -> &str {
        "Scripted"
    }

    fn default_model(&self) -> &str {
        "scripted-1"
    }

    async fn generate(&self, req: GenerationRequest) -> anyhow::Result<AiResponse> {
        self.calls.lock().unwrap().push(req);
        if self
            .failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
        {
            anyhow::bail!("upstream returned 503");
        }
        let content = self
            .replies
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| "Respuesta de prueba".to_string());
        Ok(AiResponse {
            content,
            tokens_used: 12,
            model: "scripted-1".into(),
        })
    }
}

#[derive(Default)]
pub struct ProviderLog {
    pub built: AtomicUsize,
    pub live: AtomicUsize,
    pub sent: Mutex<Vec<(String, String)>>,
}

/// In-memory messaging provider. Token `broken` fails to initialize.
pub struct FakeMessenger {
    platform: Platform,
    log: Arc<ProviderLog>,
    handlers: HandlerSet,
    broken: bool,
}

#[async_trait]
impl MessagingProvider for FakeMessenger {
    fn platform(&self) -> Platform {
        self.platform
    }

    async fn initialize(&self) -> anyhow::Result<()> {
        tokio::time::sleep(Duration::from_millis(10)).await;
        if self.broken {
            anyhow::bail!("401 Unauthorized");
        }
        self.log.live.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn stop(&self) -> anyhow::Result<()> {
        if !self.broken {
            self.log.live.fetch_sub(1, Ordering::SeqCst);
        }
        self.handlers.clear();
        Ok(())
    }

    async fn send_message(&self, chat_id: &str, text: &str) -> bool {
        self.log
            .sent
            .lock()
            .unwrap()
            .push((chat_id.to_string(), text.to_string()));
        true
    }

    fn on_message(&self, handler: MessageCallback) {
        self.handlers.push(handler);
    }

    async fn handle_webhook_payload(&self, payload: Value) -> anyhow::Result<()> {
        let chat = payload["chat"].as_str().unwrap_or("chat-1");
        let user = payload["user"].as_str().unwrap_or("user-1");
        let text = payload["text"].as_str().unwrap_or_default();
        self.handlers
            .dispatch(Message::text(self.platform, chat, user, text))
            .await;
        Ok(())
    }
}

pub fn fake_registry(log: &Arc<ProviderLog>) -> ProviderRegistry {
    let mut registry = ProviderRegistry::empty();
    for platform in Platform::ALL {
        let log = log.clone();
        registry.register(
            platform,
            Box::new(move |bot: &Bot| {
                log.built.fetch_add(1, Ordering::SeqCst);
                Ok(Arc::new(FakeMessenger {
                    platform,
                    log: log.clone(),
                    handlers: HandlerSet::new(),
                    broken: bot.bot_token == "broken",
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
        config: BotConfig {
            polling: false,
            ..BotConfig::default()
        },
    }
}

/// On-disk store plus the services wired the way `bizbot serve` wires them.
pub struct Harness {
    pub _dir: TempDir,
    pub store: Arc<SqliteStore>,
    pub ai: Arc<ScriptedAi>,
    pub handler: Arc<MessageHandler>,
    pub manager: Arc<BotManager>,
    pub log: Arc<ProviderLog>,
}

impl Harness {
    pub fn new(ai: ScriptedAi) -> Self {
        let dir = TempDir::new().expect("create temp dir");
        let store = Arc::new(SqliteStore::open(dir.path().join("bizbot.db")).expect("open db"));
        let ai = Arc::new(ai);
        let agent = Arc::new(AiAgent::new(ai.clone()));
        let handler = Arc::new(MessageHandler::new(store.clone(), agent));
        let log = Arc::new(ProviderLog::default());
        let manager = Arc::new(
            BotManager::new(store.clone(), fake_registry(&log), handler.clone())
                .with_restart_delay(Duration::ZERO),
        );
        Self {
            _dir: dir,
            store,
            ai,
            handler,
            manager,
            log,
        }
    }

    pub async fn create_bot(&self, platform: Platform, token: &str) -> Bot {
        self.store
            .create_bot(new_bot(platform, token))
            .await
            .expect("create bot")
    }
}

pub async fn eventually(mut cond: impl FnMut() -> bool) {
    for _ in 0..200 {
        if cond() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("condition not reached in time");
}
