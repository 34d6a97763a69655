use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::warn;

use crate::bus::Platform;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum BotStatus {
    Offline,
    Starting,
    Online,
    Stopping,
    Error,
}

impl BotStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            BotStatus::Offline => "OFFLINE",
            BotStatus::Starting => "STARTING",
            BotStatus::Online => "ONLINE",
            BotStatus::Stopping => "STOPPING",
            BotStatus::Error => "ERROR",
        }
    }
}

impl std::str::FromStr for BotStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "OFFLINE" => Ok(BotStatus::Offline),
            "STARTING" => Ok(BotStatus::Starting),
            "ONLINE" => Ok(BotStatus::Online),
            "STOPPING" => Ok(BotStatus::Stopping),
            "ERROR" => Ok(BotStatus::Error),
            _ => Err(format!("Unknown bot status: {}", s)),
        }
    }
}

impl std::fmt::Display for BotStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

fn default_true() -> bool {
    true
}

fn default_polling_interval() -> u64 {
    1000
}

/// Per-bot platform settings, stored as a JSON blob.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BotConfig {
    #[serde(default = "default_true")]
    pub polling: bool,
    /// Pause after a long-poll batch that returned no updates, in milliseconds.
    #[serde(default = "default_polling_interval")]
    pub polling_interval: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub webhook_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone_number_id: Option<String>,
    /// Keys this service does not interpret, kept so a round trip is lossless.
    #[serde(flatten)]
    pub extra: serde_json::Map<String, Value>,
}

impl Default for BotConfig {
    fn default() -> Self {
        Self {
            polling: true,
            polling_interval: default_polling_interval(),
            webhook_url: None,
            phone_number_id: None,
            extra: serde_json::Map::new(),
        }
    }
}

impl BotConfig {
    /// Parse a stored config blob, falling back to defaults when malformed.
    pub fn from_json_lenient(raw: &str) -> Self {
        if raw.trim().is_empty() {
            return Self::default();
        }
        serde_json::from_str(raw).unwrap_or_else(|e| {
            warn!("malformed bot config, using defaults: {}", e);
            Self::default()
        })
    }
}

#[derive(Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Bot {
    pub id: String,
    pub business_id: Option<String>,
    pub platform: Platform,
    #[serde(skip_serializing)]
    pub bot_token: String,
    pub username: Option<String>,
    pub status: BotStatus,
    pub config: BotConfig,
    pub error_log: Option<String>,
    pub last_active: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl std::fmt::Debug for Bot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Bot")
            .field("id", &self.id)
            .field("platform", &self.platform)
            .field(
                "bot_token",
                &if self.bot_token.is_empty() {
                    "[empty]"
                } else {
                    "[REDACTED]"
                },
            )
            .field("username", &self.username)
            .field("status", &self.status)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewBot {
    #[serde(default)]
    pub business_id: Option<String>,
    pub platform: Platform,
    pub bot_token: String,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub config: BotConfig,
}

/// Partial update; `None` leaves the field untouched.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BotUpdate {
    pub business_id: Option<String>,
    pub bot_token: Option<String>,
    pub username: Option<String>,
    pub config: Option<BotConfig>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UnifiedUser {
    pub id: String,
    pub name: String,
    pub platform: Platform,
    pub platform_user_id: String,
    pub phone: Option<String>,
    pub last_location: Option<Value>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default)]
pub struct UserUpdate {
    pub name: Option<String>,
    pub phone: Option<String>,
    pub last_location: Option<Value>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ConversationStatus {
    Active,
    Closed,
}

impl ConversationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConversationStatus::Active => "ACTIVE",
            ConversationStatus::Closed => "CLOSED",
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Conversation {
    pub id: String,
    pub user_id: String,
    pub status: ConversationStatus,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Direction {
    Inbound,
    Outbound,
}

impl Direction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Direction::Inbound => "INBOUND",
            Direction::Outbound => "OUTBOUND",
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredMessage {
    pub id: i64,
    pub conversation_id: String,
    pub message_id: String,
    pub content: String,
    pub direction: Direction,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewMessage {
    pub message_id: String,
    pub content: String,
    pub direction: Direction,
    pub timestamp: DateTime<Utc>,
}

impl NewMessage {
    pub fn inbound(message_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            message_id: message_id.into(),
            content: content.into(),
            direction: Direction::Inbound,
            timestamp: Utc::now(),
        }
    }

    pub fn outbound(message_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            message_id: message_id.into(),
            content: content.into(),
            direction: Direction::Outbound,
            timestamp: Utc::now(),
        }
    }
}
