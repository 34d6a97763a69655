use serde::{Deserialize, Serialize};
use tracing::warn;

/// Messaging platforms a bot can run on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    #[serde(alias = "TELEGRAM")]
    Telegram,
    #[serde(alias = "WHATSAPP")]
    WhatsApp,
}

impl Platform {
    pub const ALL: [Platform; 2] = [Platform::Telegram, Platform::WhatsApp];

    pub fn as_str(&self) -> &'static str {
        match self {
            Platform::Telegram => "telegram",
            Platform::WhatsApp => "whatsapp",
        }
    }

    /// Lenient parse used when reading persisted bot records. Unknown tags
    /// resolve to WhatsApp so a bad record still gets a provider.
    pub fn parse_or_default(s: &str) -> Self {
        s.parse().unwrap_or_else(|_| {
            warn!("unknown platform '{}', falling back to whatsapp", s);
            Platform::WhatsApp
        })
    }
}

impl std::str::FromStr for Platform {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "telegram" => Ok(Platform::Telegram),
            "whatsapp" => Ok(Platform::WhatsApp),
            _ => Err(format!("Unknown platform: {}", s)),
        }
    }
}

impl From<Platform> for String {
    fn from(platform: Platform) -> Self {
        platform.as_str().to_string()
    }
}

impl std::fmt::Display for Platform {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
