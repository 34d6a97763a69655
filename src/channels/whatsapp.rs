//! WhatsApp Cloud API provider. Push-only: inbound traffic arrives through
//! the gateway webhook and is handed to `handle_webhook_payload`.

use anyhow::Context;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use tracing::{debug, error, info};

use crate::bus::{Message, MessageKind, Platform, UserInfo};
use crate::channels::base::{HandlerSet, MessageCallback, MessagingProvider, split_message};
use crate::errors::BizbotError;
use crate::utils::http::default_http_client;

pub const WHATSAPP_MAX_MESSAGE_LEN: usize = 4096;
/// `object` field carried by every WhatsApp Business webhook body.
pub const WHATSAPP_WEBHOOK_OBJECT: &str = "whatsapp_business_account";

#[derive(Debug, Deserialize)]
struct WebhookPayload {
    #[serde(default)]
    entry: Vec<WebhookEntry>,
}

#[derive(Debug, Deserialize)]
struct WebhookEntry {
    #[serde(default)]
    changes: Vec<WebhookChange>,
}

#[derive(Debug, Deserialize)]
struct WebhookChange {
    value: WebhookValue,
}

#[derive(Debug, Deserialize)]
struct WebhookValue {
    #[serde(default)]
    contacts: Vec<WebhookContact>,
    #[serde(default)]
    messages: Vec<Value>,
}

#[derive(Debug, Deserialize)]
struct WebhookContact {
    profile: Option<ContactProfile>,
}

#[derive(Debug, Deserialize)]
struct ContactProfile {
    name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct WebhookMessage {
    from: String,
    id: String,
    #[serde(default)]
    timestamp: String,
    #[serde(rename = "type", default)]
    kind: String,
    text: Option<TextBody>,
    interactive: Option<Interactive>,
    button: Option<ButtonReply>,
}

#[derive(Debug, Deserialize)]
struct TextBody {
    body: String,
}

#[derive(Debug, Deserialize)]
struct Interactive {
    button_reply: Option<ButtonReply>,
    list_reply: Option<ButtonReply>,
}

#[derive(Debug, Deserialize)]
struct ButtonReply {
    #[serde(alias = "text")]
    title: String,
}

#[derive(Debug, Serialize)]
struct SendMessageRequest<'a> {
    messaging_product: &'static str,
    to: &'a str,
    #[serde(rename = "type")]
    message_type: &'static str,
    text: SendTextBody<'a>,
}

#[derive(Debug, Serialize)]
struct SendTextBody<'a> {
    body: &'a str,
}

fn message_kind(kind: &str) -> MessageKind {
    match kind {
        "text" => MessageKind::Text,
        "image" => MessageKind::Photo,
        "document" => MessageKind::Document,
        "audio" | "voice" => MessageKind::Audio,
        "video" => MessageKind::Video,
        "interactive" | "button" => MessageKind::Callback,
        other => MessageKind::Other(other.to_string()),
    }
}

/// First message of the first change of the first entry, if any.
pub fn parse_webhook(payload: &Value) -> anyhow::Result<Option<Message>> {
    let parsed: WebhookPayload =
        serde_json::from_value(payload.clone()).context("malformed WhatsApp webhook body")?;
    let Some(value) = parsed
        .entry
        .into_iter()
        .next()
        .and_then(|e| e.changes.into_iter().next())
        .map(|c| c.value)
    else {
        return Ok(None);
    };
    let Some(raw) = value.messages.into_iter().next() else {
        return Ok(None);
    };
    let msg: WebhookMessage =
        serde_json::from_value(raw.clone()).context("malformed WhatsApp message")?;

    let text = match (&msg.text, &msg.interactive, &msg.button) {
        (Some(t), _, _) => t.body.clone(),
        (_, Some(i), _) => i
            .button_reply
            .as_ref()
            .or(i.list_reply.as_ref())
            .map(|r| r.title.clone())
            .unwrap_or_default(),
        (_, _, Some(b)) => b.title.clone(),
        _ => String::new(),
    };
    let username = value
        .contacts
        .into_iter()
        .next()
        .and_then(|c| c.profile)
        .and_then(|p| p.name);
    let timestamp = msg
        .timestamp
        .parse::<i64>()
        .ok()
        .and_then(|secs| DateTime::from_timestamp(secs, 0))
        .unwrap_or_else(Utc::now);

    let mut metadata = HashMap::new();
    metadata.insert("whatsappMessage".to_string(), raw);

    Ok(Some(Message {
        chat_id: msg.from.clone(),
        text,
        user_id: msg.from,
        user_info: Some(UserInfo {
            username,
            ..UserInfo::default()
        }),
        platform: Platform::WhatsApp,
        message_id: Some(msg.id),
        timestamp,
        kind: message_kind(&msg.kind),
        metadata,
    }))
}

pub struct WhatsAppProvider {
    client: Client,
    access_token: String,
    phone_number_id: String,
    api_base: String,
    handlers: HandlerSet,
}

impl WhatsAppProvider {
    pub fn new(access_token: &str, phone_number_id: &str, api_base: &str) -> Self {
        Self {
            client: default_http_client(),
            access_token: access_token.to_string(),
            phone_number_id: phone_number_id.to_string(),
            api_base: api_base.trim_end_matches('/').to_string(),
            handlers: HandlerSet::new(),
        }
    }

    pub fn phone_number_id(&self) -> &str {
        &self.phone_number_id
    }

    fn endpoint(&self, suffix: &str) -> String {
        format!("{}/{}{}", self.api_base, self.phone_number_id, suffix)
    }

    async fn post_text(&self, to: &str, body: &str) -> anyhow::Result<()> {
        let resp = self
            .client
            .post(self.endpoint("/messages"))
            .bearer_auth(&self.access_token)
            .json(&SendMessageRequest {
                messaging_product: "whatsapp",
                to,
                message_type: "text",
                text: SendTextBody { body },
            })
            .send()
            .await?;
        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            anyhow::bail!("HTTP {}: {}", status, text);
        }
        Ok(())
    }
}

#[async_trait]
impl MessagingProvider for WhatsAppProvider {
    fn platform(&self) -> Platform {
        Platform::WhatsApp
    }

    async fn initialize(&self) -> anyhow::Result<()> {
        if self.access_token.trim().is_empty() {
            return Err(BizbotError::Config("WhatsApp access token is empty".into()).into());
        }
        if self.phone_number_id.trim().is_empty() {
            return Err(BizbotError::Config("WhatsApp phone number id is not set".into()).into());
        }

        let resp = self
            .client
            .get(self.endpoint(""))
            .bearer_auth(&self.access_token)
            .send()
            .await
            .context("WhatsApp credential check failed")?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(BizbotError::Auth(format!(
                "WhatsApp rejected phone number {} (HTTP {}): {}",
                self.phone_number_id, status, body
            ))
            .into());
        }
        info!("whatsapp provider initialized for {}", self.phone_number_id);
        Ok(())
    }

    async fn stop(&self) -> anyhow::Result<()> {
        self.handlers.clear();
        debug!("whatsapp provider stopped");
        Ok(())
    }

    async fn send_message(&self, chat_id: &str, text: &str) -> bool {
        for chunk in split_message(text, WHATSAPP_MAX_MESSAGE_LEN) {
            if let Err(e) = self.post_text(chat_id, &chunk).await {
                error!("failed to send whatsapp message to {}: {}", chat_id, e);
                return false;
            }
        }
        debug!("whatsapp message sent to {}", chat_id);
        true
    }

    fn on_message(&self, handler: MessageCallback) {
        self.handlers.push(handler);
    }

    async fn handle_webhook_payload(&self, payload: Value) -> anyhow::Result<()> {
        match parse_webhook(&payload)? {
            Some(message) => {
                self.handlers.dispatch(message).await;
            }
            None => debug!("whatsapp webhook without messages (status update?)"),
        }
        Ok(())
    }
}
