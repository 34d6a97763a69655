use crate::errors::BizbotError;
use serde_json::Value;
use tracing::{error, warn};

/// Maps vendor HTTP failures onto typed errors.
pub struct ProviderErrorHandler;

impl ProviderErrorHandler {
    /// Parse an API error body into a typed error.
    pub fn parse_api_error(status: u16, error_text: &str) -> BizbotError {
        let retryable = matches!(status, 500 | 502 | 503 | 504);
        if let Ok(error_json) = serde_json::from_str::<Value>(error_text)
            && let Some(err) = error_json.get("error")
        {
            let error_type = err
                .get("type")
                .and_then(|v| v.as_str())
                .unwrap_or("unknown");
            let error_msg = err
                .get("message")
                .and_then(|v| v.as_str())
                .unwrap_or("Unknown error");
            return BizbotError::Provider {
                message: format!("API error ({}): {}", error_type, error_msg),
                retryable,
            };
        }

        BizbotError::Provider {
            message: format!("API error ({}): {}", status, error_text),
            retryable,
        }
    }

    /// Return the response unchanged on success, otherwise consume the body
    /// and return a typed error (429 rate limit, 401/403 auth, other API error).
    pub async fn check_http_status(
        resp: reqwest::Response,
        provider: &str,
    ) -> Result<reqwest::Response, anyhow::Error> {
        if resp.status().is_success() {
            return Ok(resp);
        }

        let status = resp.status().as_u16();
        let retry_after = resp
            .headers()
            .get("retry-after")
            .and_then(|h| h.to_str().ok())
            .and_then(|s| s.parse::<u64>().ok());
        let error_text = resp
            .text()
            .await
            .unwrap_or_else(|_| "unknown error".to_string());

        let err = match status {
            429 => {
                warn!("{} rate limited (retry after {:?}s)", provider, retry_after);
                BizbotError::RateLimit { retry_after }
            }
            401 | 403 => {
                warn!("{} authentication error ({}): {}", provider, status, error_text);
                BizbotError::Auth(format!(
                    "Authentication failed. Check the API key. Error: {}",
                    error_text
                ))
            }
            _ => {
                error!("{} API error ({}): {}", provider, status, error_text);
                Self::parse_api_error(status, &error_text)
            }
        };
        Err(err.into())
    }
}
