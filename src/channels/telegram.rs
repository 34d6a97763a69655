//! Telegram Bot API provider over plain HTTPS.
//!
//! Updates arrive either through a `getUpdates` long-poll task or through
//! `handle_webhook_payload` when a webhook URL is registered. Both paths feed
//! the same [`HandlerSet`].

use anyhow::Context;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, PoisonError, RwLock};
use std::time::Duration;
use tokio::task::{JoinHandle, JoinSet};
use tracing::{debug, error, info, warn};

use crate::bus::{Message, MessageKind, Platform, UserInfo};
use crate::channels::base::{HandlerSet, MessageCallback, MessagingProvider, split_message};
use crate::errors::{BizbotError, BizbotResult};
use crate::store::BotConfig;
use crate::utils::http::{default_http_client, long_poll_http_client};

/// Telegram rejects messages longer than this many bytes.
pub const TELEGRAM_MAX_MESSAGE_LEN: usize = 4096;
const LONG_POLL_TIMEOUT_SECS: u64 = 30;
const POLL_ERROR_BACKOFF: Duration = Duration::from_secs(5);
const WEBHOOK_MAX_CONNECTIONS: u32 = 100;
const ALLOWED_UPDATES: [&str; 2] = ["message", "callback_query"];

#[derive(Debug, Deserialize)]
struct TgResponse<T> {
    ok: bool,
    result: Option<T>,
    description: Option<String>,
    error_code: Option<u16>,
    parameters: Option<TgResponseParameters>,
}

#[derive(Debug, Deserialize)]
struct TgResponseParameters {
    retry_after: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TgUser {
    pub id: i64,
    #[serde(default)]
    pub is_bot: bool,
    #[serde(default)]
    pub first_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language_code: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TgChat {
    pub id: i64,
    #[serde(rename = "type", default)]
    pub kind: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TgDocument {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_name: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TgMedia {
    #[serde(default)]
    pub duration: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TgMessage {
    pub message_id: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from: Option<TgUser>,
    pub chat: TgChat,
    #[serde(default)]
    pub date: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub photo: Option<Vec<Value>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub document: Option<TgDocument>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub audio: Option<TgMedia>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub video: Option<TgMedia>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reply_to_message: Option<Box<TgMessage>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TgCallbackQuery {
    pub id: String,
    pub from: TgUser,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<TgMessage>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TgUpdate {
    pub update_id: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<TgMessage>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub callback_query: Option<TgCallbackQuery>,
}

fn user_info(user: &TgUser) -> UserInfo {
    UserInfo {
        username: user.username.clone(),
        first_name: Some(user.first_name.clone()).filter(|s| !s.is_empty()),
        last_name: user.last_name.clone(),
        language_code: user.language_code.clone(),
    }
}

/// Convert a Telegram message. Media become placeholders; anything else
/// without text is skipped.
pub fn convert_message(msg: &TgMessage) -> Option<Message> {
    let (text, kind) = if let Some(text) = &msg.text {
        (text.clone(), MessageKind::Text)
    } else if let Some(photo) = msg.photo.as_ref().filter(|p| !p.is_empty()) {
        (format!("[Photo: {} sizes]", photo.len()), MessageKind::Photo)
    } else if let Some(doc) = &msg.document {
        (
            format!(
                "[Document: {}]",
                doc.file_name.as_deref().unwrap_or("unnamed")
            ),
            MessageKind::Document,
        )
    } else if let Some(audio) = &msg.audio {
        (format!("[Audio: {}s]", audio.duration), MessageKind::Audio)
    } else if let Some(video) = &msg.video {
        (format!("[Video: {}s]", video.duration), MessageKind::Video)
    } else {
        return None;
    };

    let mut metadata = HashMap::new();
    metadata.insert("telegramMessageId".to_string(), json!(msg.message_id));
    metadata.insert("chatType".to_string(), json!(msg.chat.kind));
    if let Some(reply) = &msg.reply_to_message {
        metadata.insert("replyToMessage".to_string(), json!(reply.message_id));
    }

    Some(Message {
        chat_id: msg.chat.id.to_string(),
        text,
        user_id: msg
            .from
            .as_ref()
            .map(|u| u.id.to_string())
            .unwrap_or_default(),
        user_info: msg.from.as_ref().map(user_info),
        platform: Platform::Telegram,
        message_id: Some(msg.message_id.to_string()),
        timestamp: DateTime::from_timestamp(msg.date, 0).unwrap_or_else(Utc::now),
        kind,
        metadata,
    })
}

/// Button press as a `Callback` message carrying the button data.
pub fn convert_callback(query: &TgCallbackQuery) -> Message {
    let mut metadata = HashMap::new();
    metadata.insert("callbackQueryId".to_string(), json!(query.id));
    Message {
        chat_id: query
            .message
            .as_ref()
            .map(|m| m.chat.id.to_string())
            .unwrap_or_default(),
        text: query.data.clone().unwrap_or_default(),
        user_id: query.from.id.to_string(),
        user_info: Some(user_info(&query.from)),
        platform: Platform::Telegram,
        message_id: None,
        timestamp: Utc::now(),
        kind: MessageKind::Callback,
        metadata,
    }
}

/// Thin Bot API client. Cloned into the poll task.
#[derive(Clone)]
struct TelegramApi {
    client: Client,
    poll_client: Client,
    base_url: String,
}

impl TelegramApi {
    fn new(api_base: &str, token: &str) -> Self {
        Self {
            client: default_http_client(),
            poll_client: long_poll_http_client(LONG_POLL_TIMEOUT_SECS),
            base_url: format!("{}/bot{}", api_base.trim_end_matches('/'), token),
        }
    }

    async fn call<T: DeserializeOwned>(
        &self,
        client: &Client,
        method: &str,
        body: Value,
    ) -> BizbotResult<T> {
        let resp = client
            .post(format!("{}/{}", self.base_url, method))
            .json(&body)
            .send()
            .await
            // the URL carries the bot token
            .map_err(|e| BizbotError::channel("telegram", e.without_url().to_string()))?;
        let status = resp.status();
        let parsed: TgResponse<T> = resp.json().await.map_err(|e| {
            BizbotError::channel(
                "telegram",
                format!("{} returned unreadable body ({}): {}", method, status, e.without_url()),
            )
        })?;

        if parsed.ok {
            return parsed.result.ok_or_else(|| {
                BizbotError::channel("telegram", format!("{} returned no result", method))
            });
        }

        let description = parsed
            .description
            .unwrap_or_else(|| format!("HTTP {}", status));
        let code = parsed.error_code.unwrap_or(status.as_u16());
        Err(match code {
            429 => BizbotError::RateLimit {
                retry_after: parsed.parameters.and_then(|p| p.retry_after),
            },
            401 | 404 => BizbotError::Auth(format!("telegram {}: {}", method, description)),
            _ => BizbotError::channel("telegram", format!("{}: {}", method, description)),
        })
    }

    async fn get_me(&self) -> BizbotResult<TgUser> {
        self.call(&self.client, "getMe", json!({})).await
    }

    async fn get_updates(&self, offset: i64) -> BizbotResult<Vec<TgUpdate>> {
        self.call(
            &self.poll_client,
            "getUpdates",
            json!({
                "offset": offset,
                "timeout": LONG_POLL_TIMEOUT_SECS,
                "allowed_updates": ALLOWED_UPDATES,
            }),
        )
        .await
    }

    async fn send_text(&self, chat_id: &str, text: &str) -> BizbotResult<()> {
        let _: Value = self
            .call(
                &self.client,
                "sendMessage",
                json!({ "chat_id": chat_id, "text": text }),
            )
            .await?;
        Ok(())
    }

    async fn set_webhook(&self, url: &str) -> BizbotResult<()> {
        let _: bool = self
            .call(
                &self.client,
                "setWebhook",
                json!({
                    "url": url,
                    "max_connections": WEBHOOK_MAX_CONNECTIONS,
                    "allowed_updates": ALLOWED_UPDATES,
                }),
            )
            .await?;
        Ok(())
    }

    async fn delete_webhook(&self) -> BizbotResult<()> {
        let _: bool = self.call(&self.client, "deleteWebhook", json!({})).await?;
        Ok(())
    }

    async fn answer_callback_query(&self, id: &str) -> BizbotResult<()> {
        let _: bool = self
            .call(
                &self.client,
                "answerCallbackQuery",
                json!({ "callback_query_id": id }),
            )
            .await?;
        Ok(())
    }
}

async fn process_update(api: &TelegramApi, handlers: &HandlerSet, update: TgUpdate) {
    if let Some(msg) = update.message {
        match convert_message(&msg) {
            Some(message) => {
                handlers.dispatch(message).await;
            }
            None => debug!("skipping unsupported telegram message {}", msg.message_id),
        }
    } else if let Some(query) = update.callback_query {
        handlers.dispatch(convert_callback(&query)).await;
        if let Err(e) = api.answer_callback_query(&query.id).await {
            warn!("failed to answer telegram callback query {}: {}", query.id, e);
        }
    } else {
        debug!("ignoring telegram update {}", update.update_id);
    }
}

/// Updates are processed concurrently in a `JoinSet` owned by this future.
/// Aborting the poll task drops the set and cancels in-flight updates.
async fn poll_loop(api: TelegramApi, handlers: HandlerSet, idle_delay: Duration) {
    let mut offset: i64 = 0;
    let mut in_flight = JoinSet::new();
    loop {
        while let Some(done) = in_flight.try_join_next() {
            if let Err(e) = done
                && e.is_panic()
            {
                error!("telegram update task panicked: {}", e);
            }
        }
        match api.get_updates(offset).await {
            Ok(updates) => {
                if updates.is_empty() {
                    tokio::time::sleep(idle_delay).await;
                    continue;
                }
                for update in updates {
                    offset = offset.max(update.update_id + 1);
                    let api = api.clone();
                    let handlers = handlers.clone();
                    in_flight.spawn(async move {
                        process_update(&api, &handlers, update).await;
                    });
                }
            }
            Err(BizbotError::RateLimit { retry_after }) => {
                let wait = retry_after.map_or(POLL_ERROR_BACKOFF, Duration::from_secs);
                warn!("telegram rate limited, retrying in {}s", wait.as_secs());
                tokio::time::sleep(wait).await;
            }
            Err(e) => {
                error!("telegram polling error: {}", e);
                tokio::time::sleep(POLL_ERROR_BACKOFF).await;
            }
        }
    }
}

/// Best-effort `getMe` for a token, used when a bot is registered.
pub async fn lookup_username(api_base: &str, token: &str) -> Option<String> {
    match TelegramApi::new(api_base, token).get_me().await {
        Ok(me) => me.username,
        Err(e) => {
            warn!("could not fetch telegram bot username: {}", e);
            None
        }
    }
}

pub struct TelegramProvider {
    api: TelegramApi,
    config: BotConfig,
    handlers: HandlerSet,
    poll_task: Mutex<Option<JoinHandle<()>>>,
    webhook_active: AtomicBool,
    bot_user: RwLock<Option<TgUser>>,
}

impl TelegramProvider {
    pub fn new(token: &str, config: BotConfig, api_base: &str) -> Self {
        Self {
            api: TelegramApi::new(api_base, token),
            config,
            handlers: HandlerSet::new(),
            poll_task: Mutex::new(None),
            webhook_active: AtomicBool::new(false),
            bot_user: RwLock::new(None),
        }
    }

    /// `@username` of the bot, known after `initialize`.
    pub fn username(&self) -> Option<String> {
        self.bot_user
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .and_then(|u| u.username.clone())
    }

    pub fn is_polling(&self) -> bool {
        self.poll_task
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .is_some_and(|t| !t.is_finished())
    }

    pub fn handler_count(&self) -> usize {
        self.handlers.len()
    }

    fn start_polling(&self) {
        let mut slot = self.poll_task.lock().unwrap_or_else(PoisonError::into_inner);
        if slot.as_ref().is_some_and(|t| !t.is_finished()) {
            debug!("telegram poll task already running");
            return;
        }
        let idle = Duration::from_millis(self.config.polling_interval);
        *slot = Some(tokio::spawn(poll_loop(
            self.api.clone(),
            self.handlers.clone(),
            idle,
        )));
    }
}

#[async_trait]
impl MessagingProvider for TelegramProvider {
    fn platform(&self) -> Platform {
        Platform::Telegram
    }

    async fn initialize(&self) -> anyhow::Result<()> {
        let me = self
            .api
            .get_me()
            .await
            .context("telegram getMe failed, check the bot token")?;
        info!(
            "telegram bot initialized: @{} ({})",
            me.username.as_deref().unwrap_or("?"),
            me.first_name
        );
        *self.bot_user.write().unwrap_or_else(PoisonError::into_inner) = Some(me);

        if let Some(url) = self.config.webhook_url.as_deref().filter(|u| !u.is_empty()) {
            self.api
                .set_webhook(url)
                .await
                .context("telegram setWebhook failed")?;
            self.webhook_active.store(true, Ordering::SeqCst);
            info!("telegram webhook configured: {}", url);
        } else if self.config.polling {
            self.start_polling();
            info!("telegram long polling started");
        } else {
            info!("telegram polling disabled, updates arrive through the gateway only");
        }
        Ok(())
    }

    async fn stop(&self) -> anyhow::Result<()> {
        let task = self
            .poll_task
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(task) = task {
            task.abort();
            debug!("telegram poll task aborted");
        }
        if self.webhook_active.swap(false, Ordering::SeqCst) {
            self.api
                .delete_webhook()
                .await
                .context("telegram deleteWebhook failed")?;
        }
        self.handlers.clear();
        Ok(())
    }

    async fn send_message(&self, chat_id: &str, text: &str) -> bool {
        for chunk in split_message(text, TELEGRAM_MAX_MESSAGE_LEN) {
            if let Err(e) = self.api.send_text(chat_id, &chunk).await {
                error!("failed to send telegram message to {}: {}", chat_id, e);
                return false;
            }
        }
        debug!("telegram message sent to {}", chat_id);
        true
    }

    fn on_message(&self, handler: MessageCallback) {
        self.handlers.push(handler);
    }

    fn account_name(&self) -> Option<String> {
        self.username()
    }

    async fn handle_webhook_payload(&self, payload: Value) -> anyhow::Result<()> {
        let update: TgUpdate =
            serde_json::from_value(payload).context("payload is not a Telegram update")?;
        process_update(&self.api, &self.handlers, update).await;
        Ok(())
    }

    async fn answer_callback_query(&self, callback_query_id: &str) -> anyhow::Result<()> {
        self.api.answer_callback_query(callback_query_id).await?;
        Ok(())
    }
}

impl Drop for TelegramProvider {
    fn drop(&mut self) {
        if let Some(task) = self
            .poll_task
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
        {
            task.abort();
        }
    }
}

#[cfg(test)]
mod tests;
