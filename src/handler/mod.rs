use chrono::Utc;
use std::sync::Arc;
use tracing::{debug, error, info};

use crate::agent::AiAgent;
use crate::bus::{Message, MessageKind};
use crate::errors::BizbotResult;
use crate::store::{ConversationStore, HISTORY_PAGE_SIZE, NewMessage};
use crate::utils::truncate_chars;

pub const TEXT_ONLY_REPLY: &str = "I can only process text messages at the moment.";
pub const TECHNICAL_DIFFICULTIES_REPLY: &str =
    "I seem to be having some technical difficulties. Please try again in a moment.";

/// Inbound pipeline: persist the sender and conversation, detect intent,
/// generate a reply and store both sides of the exchange.
pub struct MessageHandler {
    store: Arc<dyn ConversationStore>,
    agent: Arc<AiAgent>,
}

impl MessageHandler {
    pub fn new(store: Arc<dyn ConversationStore>, agent: Arc<AiAgent>) -> Self {
        Self { store, agent }
    }

    pub fn agent(&self) -> &Arc<AiAgent> {
        &self.agent
    }

    /// Always returns a non-empty reply.
    pub async fn handle(&self, message: &Message) -> String {
        let textual = matches!(message.kind, MessageKind::Text | MessageKind::Callback);
        if !textual || message.text.trim().is_empty() {
            debug!(
                "non-text message from {} ({:?})",
                message.user_key(),
                message.kind
            );
            return TEXT_ONLY_REPLY.to_string();
        }

        match self.process(message).await {
            Ok(reply) => reply,
            Err(e) => {
                error!("failed to process message from {}: {}", message.user_key(), e);
                TECHNICAL_DIFFICULTIES_REPLY.to_string()
            }
        }
    }

    async fn process(&self, message: &Message) -> BizbotResult<String> {
        info!(
            "processing {} message from {}: {}",
            message.platform,
            message.user_key(),
            truncate_chars(&message.text, 80)
        );

        let user = self
            .store
            .upsert_user(message.platform, &message.user_id, &message.display_name())
            .await?;
        let conversation = self.store.active_conversation(&user.id).await?;

        let mut recent = self
            .store
            .recent_messages(&conversation.id, HISTORY_PAGE_SIZE)
            .await?;
        recent.reverse();
        let history: Vec<String> = recent.into_iter().map(|m| m.content).collect();

        let intent = self.agent.detect_intent(&message.text).await;
        debug!(
            "intent {} ({:.2}) for {}",
            intent.intent,
            intent.confidence,
            message.user_key()
        );

        let reply = self
            .agent
            .generate_response(&message.text, &intent, &history)
            .await;

        let inbound_id = message
            .message_id
            .clone()
            .unwrap_or_else(|| Utc::now().timestamp_millis().to_string());
        let outbound_id = format!("{}-ai", inbound_id);
        self.store
            .save_exchange(
                &conversation.id,
                NewMessage::inbound(inbound_id, message.text.clone()),
                NewMessage::outbound(outbound_id, reply.content.clone()),
            )
            .await?;

        debug!(
            "replied via {} in {}ms ({} tokens)",
            reply.provider, reply.processing_time_ms, reply.tokens_used
        );
        Ok(reply.content)
    }
}

#[cfg(test)]
mod tests;
