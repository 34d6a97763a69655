use async_trait::async_trait;
use futures_util::future::BoxFuture;
use std::future::Future;
use std::sync::{Arc, PoisonError, RwLock};
use tracing::{error, warn};

use crate::bus::{Message, Platform};

/// Inbound message callback registered on a provider.
pub type MessageCallback =
    Arc<dyn Fn(Message) -> BoxFuture<'static, anyhow::Result<()>> + Send + Sync>;

/// Wrap an async closure as a [`MessageCallback`].
pub fn message_callback<F, Fut>(f: F) -> MessageCallback
where
    F: Fn(Message) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
{
    Arc::new(move |msg: Message| -> BoxFuture<'static, anyhow::Result<()>> { Box::pin(f(msg)) })
}

/// Registered callbacks, shared between a provider's poll loop and its
/// webhook entry point.
#[derive(Clone, Default)]
pub struct HandlerSet {
    handlers: Arc<RwLock<Vec<MessageCallback>>>,
}

impl HandlerSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, handler: MessageCallback) {
        self.handlers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(handler);
    }

    pub fn len(&self) -> usize {
        self.handlers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        self.handlers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }

    /// Run every handler in registration order. A failing handler is logged
    /// and does not stop the rest. Returns how many handlers failed.
    pub async fn dispatch(&self, message: Message) -> usize {
        let handlers: Vec<MessageCallback> = self
            .handlers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        if handlers.is_empty() {
            warn!(
                "no handler registered for {} message from {}",
                message.platform,
                message.user_key()
            );
            return 0;
        }

        let mut failures = 0;
        for (idx, handler) in handlers.iter().enumerate() {
            if let Err(e) = handler(message.clone()).await {
                error!("{} message handler #{} failed: {:#}", message.platform, idx, e);
                failures += 1;
            }
        }
        failures
    }
}

/// One live connection to a messaging platform for a single bot.
#[async_trait]
pub trait MessagingProvider: Send + Sync {
    fn platform(&self) -> Platform;

    /// Verify credentials and begin receiving. Fails fast on bad config.
    async fn initialize(&self) -> anyhow::Result<()>;

    /// Stop receiving. Idempotent and safe to call before `initialize`.
    async fn stop(&self) -> anyhow::Result<()>;

    /// Deliver a text reply. Failures are logged and reported as `false`.
    async fn send_message(&self, chat_id: &str, text: &str) -> bool;

    fn on_message(&self, handler: MessageCallback);

    /// Account name reported by the platform once initialized.
    fn account_name(&self) -> Option<String> {
        None
    }

    /// Process a raw platform push payload.
    async fn handle_webhook_payload(&self, _payload: serde_json::Value) -> anyhow::Result<()> {
        warn!("{} provider does not accept webhook payloads", self.platform());
        Ok(())
    }

    async fn answer_callback_query(&self, _callback_query_id: &str) -> anyhow::Result<()> {
        Ok(())
    }
}

/// Split a message into chunks of at most `limit` bytes, preferring
/// paragraph then line boundaries and never cutting inside a UTF-8 char.
pub fn split_message(text: &str, limit: usize) -> Vec<String> {
    if text.len() <= limit {
        return vec![text.to_string()];
    }

    let mut chunks = Vec::new();
    let mut rest = text;

    while rest.len() > limit {
        let mut cut = limit;
        while cut > 0 && !rest.is_char_boundary(cut) {
            cut -= 1;
        }
        if cut == 0 {
            cut = rest.char_indices().nth(1).map_or(rest.len(), |(i, _)| i);
        }

        let window = &rest[..cut];
        let (head, tail) = if let Some(idx) = window.rfind("\n\n") {
            (&rest[..idx], &rest[idx + 2..])
        } else if let Some(idx) = window.rfind('\n') {
            (&rest[..idx], &rest[idx + 1..])
        } else {
            (window, &rest[cut..])
        };
        chunks.push(head.trim().to_string());
        rest = tail;
    }

    if !rest.is_empty() {
        chunks.push(rest.trim().to_string());
    }

    chunks.retain(|c| !c.is_empty());
    chunks
}
