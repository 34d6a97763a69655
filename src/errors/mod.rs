use thiserror::Error;

/// Typed error hierarchy for bizbot.
///
/// Use at module boundaries (bot lifecycle, provider calls, persistence, config validation).
/// Leaf functions can keep using `anyhow::Result`; the `Internal` variant converts
/// through the `?` operator.
#[derive(Debug, Error)]
pub enum BizbotError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Unsupported platform: {0}")]
    UnsupportedPlatform(String),

    #[error("Provider error: {message}")]
    Provider { message: String, retryable: bool },

    #[error("Rate limit exceeded")]
    RateLimit { retry_after: Option<u64> },

    #[error("Authentication failed: {0}")]
    Auth(String),

    #[error("Channel error: {platform}: {message}")]
    Channel { platform: String, message: String },

    #[error("Store error: {0}")]
    Store(String),

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

/// Convenience alias for results using `BizbotError`.
pub type BizbotResult<T> = std::result::Result<T, BizbotError>;

impl BizbotError {
    /// Whether this error is transient and the operation should be retried.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Provider { retryable, .. } => *retryable,
            Self::RateLimit { .. } => true,
            Self::Config(_)
            | Self::NotFound(_)
            | Self::UnsupportedPlatform(_)
            | Self::Auth(_)
            | Self::Channel { .. }
            | Self::Store(_)
            | Self::Internal(_) => false,
        }
    }

    pub fn channel(platform: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Channel {
            platform: platform.into(),
            message: message.into(),
        }
    }
}

impl From<rusqlite::Error> for BizbotError {
    fn from(err: rusqlite::Error) -> Self {
        Self::Store(err.to_string())
    }
}
