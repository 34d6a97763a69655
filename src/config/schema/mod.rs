use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::errors::BizbotError;

/// Generate a `Debug` impl that prints `[REDACTED]` for secret fields.
///
/// Fields wrapped in `redact(...)` are shown as `[empty]` or `[REDACTED]`;
/// bare fields use their own `Debug`.
macro_rules! redact_debug {
    (@field $builder:ident, $self:ident, redact($field:ident)) => {
        $builder.field(
            stringify!($field),
            &if $self.$field.is_empty() {
                "[empty]"
            } else {
                "[REDACTED]"
            },
        );
    };
    (@field $builder:ident, $self:ident, $field:ident) => {
        $builder.field(stringify!($field), &$self.$field);
    };

    (@fields $builder:ident, $self:ident,) => {};
    (@fields $builder:ident, $self:ident, redact($field:ident), $($rest:tt)*) => {
        redact_debug!(@field $builder, $self, redact($field));
        redact_debug!(@fields $builder, $self, $($rest)*);
    };
    (@fields $builder:ident, $self:ident, $field:ident, $($rest:tt)*) => {
        redact_debug!(@field $builder, $self, $field);
        redact_debug!(@fields $builder, $self, $($rest)*);
    };

    ($struct_name:ident, $($fields:tt)*) => {
        impl std::fmt::Debug for $struct_name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                let mut builder = f.debug_struct(stringify!($struct_name));
                redact_debug!(@fields builder, self, $($fields)*);
                builder.finish()
            }
        }
    };
}

pub const DEFAULT_TELEGRAM_API_BASE: &str = "https://api.telegram.org";
pub const DEFAULT_WHATSAPP_API_BASE: &str = "https://graph.facebook.com/v18.0";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub ai: AiConfig,
    #[serde(default)]
    pub whatsapp: WhatsAppConfig,
    #[serde(default)]
    pub telegram: TelegramConfig,
}

// ---------------------------------------------------------------------------
// Server
// ---------------------------------------------------------------------------

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    3000
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

// ---------------------------------------------------------------------------
// Database
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// SQLite file path. Empty means `$BIZBOT_HOME/bizbot.db`.
    #[serde(default)]
    pub path: String,
}

// ---------------------------------------------------------------------------
// AI providers
// ---------------------------------------------------------------------------

fn default_ai_provider() -> String {
    "openai".to_string()
}

fn default_request_timeout_secs() -> u64 {
    30
}

#[derive(Clone, Default, Serialize, Deserialize)]
pub struct ProviderConfig {
    #[serde(default, rename = "apiKey")]
    pub api_key: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default, rename = "apiBase")]
    pub api_base: Option<String>,
}

redact_debug!(ProviderConfig, redact(api_key), model, api_base,);

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AiConfig {
    /// Active vendor tag (`openai` or `groq`).
    #[serde(default = "default_ai_provider")]
    pub provider: String,
    #[serde(
        default = "default_request_timeout_secs",
        rename = "requestTimeoutSecs"
    )]
    pub request_timeout_secs: u64,
    /// Consult the vendor when keyword patterns are not confident.
    #[serde(default, rename = "intentClassifier")]
    pub intent_classifier: bool,
    /// JSON prompt table replacing the built-in prompts.
    #[serde(default, rename = "promptsFile")]
    pub prompts_file: Option<String>,
    #[serde(default)]
    pub openai: ProviderConfig,
    #[serde(default)]
    pub groq: ProviderConfig,
}

impl Default for AiConfig {
    fn default() -> Self {
        Self {
            provider: default_ai_provider(),
            request_timeout_secs: default_request_timeout_secs(),
            intent_classifier: false,
            prompts_file: None,
            openai: ProviderConfig::default(),
            groq: ProviderConfig::default(),
        }
    }
}

impl AiConfig {
    pub fn provider_config(&self, kind: &str) -> Option<&ProviderConfig> {
        match kind {
            "openai" => Some(&self.openai),
            "groq" => Some(&self.groq),
            _ => None,
        }
    }
}

// ---------------------------------------------------------------------------
// Platforms
// ---------------------------------------------------------------------------

fn default_whatsapp_api_base() -> String {
    DEFAULT_WHATSAPP_API_BASE.to_string()
}

fn default_telegram_api_base() -> String {
    DEFAULT_TELEGRAM_API_BASE.to_string()
}

#[derive(Clone, Serialize, Deserialize)]
pub struct WhatsAppConfig {
    /// Token echoed back by Meta during webhook verification.
    #[serde(default, rename = "verifyToken")]
    pub verify_token: String,
    /// App secret for `X-Hub-Signature-256`. Empty disables the check.
    #[serde(default, rename = "appSecret")]
    pub app_secret: String,
    /// Fallback phone number id for bots whose config omits one.
    #[serde(default, rename = "phoneNumberId")]
    pub phone_number_id: String,
    #[serde(default = "default_whatsapp_api_base", rename = "apiBase")]
    pub api_base: String,
}

redact_debug!(
    WhatsAppConfig,
    redact(verify_token),
    redact(app_secret),
    phone_number_id,
    api_base,
);

impl Default for WhatsAppConfig {
    fn default() -> Self {
        Self {
            verify_token: String::new(),
            app_secret: String::new(),
            phone_number_id: String::new(),
            api_base: default_whatsapp_api_base(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelegramConfig {
    #[serde(default = "default_telegram_api_base", rename = "apiBase")]
    pub api_base: String,
}

impl Default for TelegramConfig {
    fn default() -> Self {
        Self {
            api_base: default_telegram_api_base(),
        }
    }
}

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

impl Config {
    pub fn validate(&self) -> Result<(), BizbotError> {
        self.validate_server()?;
        self.validate_ai()?;
        self.validate_platforms()?;
        Ok(())
    }

    fn validate_server(&self) -> Result<(), BizbotError> {
        if self.server.port == 0 {
            return Err(BizbotError::Config("server.port must be > 0".into()));
        }
        if self.server.host.trim().is_empty() {
            return Err(BizbotError::Config("server.host must not be empty".into()));
        }
        Ok(())
    }

    fn validate_ai(&self) -> Result<(), BizbotError> {
        let secs = self.ai.request_timeout_secs;
        if secs == 0 || secs > 600 {
            return Err(BizbotError::Config(
                "ai.requestTimeoutSecs must be between 1 and 600".into(),
            ));
        }
        for (name, cfg) in [("openai", &self.ai.openai), ("groq", &self.ai.groq)] {
            if let Some(base) = &cfg.api_base
                && !is_http_url(base)
            {
                return Err(BizbotError::Config(format!(
                    "ai.{name}.apiBase must be an http(s) URL"
                )));
            }
        }
        Ok(())
    }

    fn validate_platforms(&self) -> Result<(), BizbotError> {
        if !is_http_url(&self.whatsapp.api_base) {
            return Err(BizbotError::Config(
                "whatsapp.apiBase must be an http(s) URL".into(),
            ));
        }
        if !is_http_url(&self.telegram.api_base) {
            return Err(BizbotError::Config(
                "telegram.apiBase must be an http(s) URL".into(),
            ));
        }
        Ok(())
    }

    /// Resolved SQLite path.
    pub fn database_path(&self) -> anyhow::Result<PathBuf> {
        if self.database.path.is_empty() {
            Ok(crate::utils::get_bizbot_home()?.join("bizbot.db"))
        } else {
            Ok(PathBuf::from(&self.database.path))
        }
    }
}

fn is_http_url(s: &str) -> bool {
    s.starts_with("http://") || s.starts_with("https://")
}
