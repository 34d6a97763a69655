use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use super::Platform;

/// Sender profile details a platform may attach to an inbound message.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserInfo {
    pub username: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub language_code: Option<String>,
}

impl UserInfo {
    /// Best display name: first name, then username, then "Unknown".
    pub fn display_name(&self) -> String {
        self.first_name
            .as_deref()
            .filter(|s| !s.is_empty())
            .or_else(|| self.username.as_deref().filter(|s| !s.is_empty()))
            .unwrap_or("Unknown")
            .to_string()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageKind {
    Text,
    Photo,
    Document,
    Audio,
    Video,
    Callback,
    Other(String),
}

/// Canonical inbound message, normalized from a platform-specific event.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub chat_id: String,
    pub text: String,
    pub user_id: String,
    pub user_info: Option<UserInfo>,
    pub platform: Platform,
    pub message_id: Option<String>,
    pub timestamp: DateTime<Utc>,
    pub kind: MessageKind,
    #[serde(default)]
    pub metadata: HashMap<String, serde_json::Value>,
}

impl Message {
    pub fn text(
        platform: Platform,
        chat_id: impl Into<String>,
        user_id: impl Into<String>,
        text: impl Into<String>,
    ) -> Self {
        Self {
            chat_id: chat_id.into(),
            text: text.into(),
            user_id: user_id.into(),
            user_info: None,
            platform,
            message_id: None,
            timestamp: Utc::now(),
            kind: MessageKind::Text,
            metadata: HashMap::new(),
        }
    }

    /// Natural key of the sender: `platform:user_id`.
    pub fn user_key(&self) -> String {
        format!("{}:{}", self.platform, self.user_id)
    }

    pub fn display_name(&self) -> String {
        self.user_info
            .as_ref()
            .map_or_else(|| "Unknown".to_string(), UserInfo::display_name)
    }
}
