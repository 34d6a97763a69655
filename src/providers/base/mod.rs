use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::warn;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system".to_string(),
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: "assistant".to_string(),
            content: content.into(),
        }
    }
}

/// One completion call.
#[derive(Debug, Clone)]
pub struct GenerationRequest {
    pub messages: Vec<ChatMessage>,
    pub model: Option<String>,
    pub max_tokens: u32,
    pub temperature: f32,
}

impl GenerationRequest {
    pub const DEFAULT_MAX_TOKENS: u32 = 1024;
    pub const DEFAULT_TEMPERATURE: f32 = 0.7;

    pub fn new(messages: Vec<ChatMessage>) -> Self {
        Self {
            messages,
            model: None,
            max_tokens: Self::DEFAULT_MAX_TOKENS,
            temperature: Self::DEFAULT_TEMPERATURE,
        }
    }

    /// System prompt followed by `user_turns` as user messages.
    pub fn from_prompt(system_prompt: &str, user_turns: &[String]) -> Self {
        let mut messages = Vec::with_capacity(user_turns.len() + 1);
        messages.push(ChatMessage::system(system_prompt));
        messages.extend(user_turns.iter().map(ChatMessage::user));
        Self::new(messages)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AiResponse {
    pub content: String,
    pub tokens_used: u64,
    pub model: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderMetrics {
    pub request_count: u64,
    pub token_count: u64,
    pub error_count: u64,
}

#[async_trait]
pub trait AiProvider: Send + Sync {
    /// Display name, e.g. "OpenAI".
    fn name(&self) -> &str;

    fn default_model(&self) -> &str;

    async fn generate(&self, req: GenerationRequest) -> Result<AiResponse>;

    /// Whether the vendor is configured and reachable.
    async fn is_available(&self) -> bool {
        warn!("is_available not implemented for {}", self.name());
        true
    }

    fn metrics(&self) -> ProviderMetrics {
        ProviderMetrics::default()
    }
}
