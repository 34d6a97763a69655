use crate::providers::base::{AiProvider, AiResponse, GenerationRequest, ProviderMetrics};
use crate::providers::errors::ProviderErrorHandler;
use crate::providers::provider_http_client;
use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde_json::{Value, json};
use std::sync::Mutex;
use tracing::{debug, warn};

pub const OPENAI_API_URL: &str = "https://api.openai.com/v1/chat/completions";
pub const GROQ_API_URL: &str = "https://api.groq.com/openai/v1/chat/completions";
pub const OPENAI_DEFAULT_MODEL: &str = "gpt-4o-mini";
pub const GROQ_DEFAULT_MODEL: &str = "llama-3.1-8b-instant";

/// Chat-completions client for any OpenAI-compatible vendor.
pub struct OpenAiCompatProvider {
    api_key: String,
    default_model: String,
    base_url: String,
    provider_name: String,
    client: Client,
    metrics: Mutex<ProviderMetrics>,
}

impl OpenAiCompatProvider {
    pub fn openai(api_key: String, model: Option<String>) -> Self {
        Self::with_config(
            api_key,
            model.unwrap_or_else(|| OPENAI_DEFAULT_MODEL.to_string()),
            OPENAI_API_URL.to_string(),
            "OpenAI".to_string(),
        )
    }

    pub fn groq(api_key: String, model: Option<String>) -> Self {
        Self::with_config(
            api_key,
            model.unwrap_or_else(|| GROQ_DEFAULT_MODEL.to_string()),
            GROQ_API_URL.to_string(),
            "Groq".to_string(),
        )
    }

    pub fn with_config(
        api_key: String,
        default_model: String,
        base_url: String,
        provider_name: String,
    ) -> Self {
        Self {
            api_key,
            default_model,
            base_url,
            provider_name,
            client: provider_http_client(),
            metrics: Mutex::new(ProviderMetrics::default()),
        }
    }

    fn parse_response(json: &Value, fallback_model: &str) -> Result<AiResponse> {
        let choice = json["choices"]
            .as_array()
            .and_then(|arr| arr.first())
            .context("No choices in chat completion response")?;

        let content = choice["message"]["content"]
            .as_str()
            .unwrap_or_default()
            .to_string();
        let tokens_used = json["usage"]["total_tokens"].as_u64().unwrap_or(0);
        let model = json["model"]
            .as_str()
            .unwrap_or(fallback_model)
            .to_string();

        Ok(AiResponse {
            content,
            tokens_used,
            model,
        })
    }

    fn record_error(&self) {
        if let Ok(mut m) = self.metrics.lock() {
            m.error_count += 1;
        }
    }

    async fn complete(&self, req: GenerationRequest) -> Result<AiResponse> {
        let model = req.model.as_deref().unwrap_or(&self.default_model);
        let payload = json!({
            "model": model,
            "messages": req.messages,
            "max_tokens": req.max_tokens,
            "temperature": req.temperature,
        });

        debug!(
            "{} request: model={} messages={}",
            self.provider_name,
            model,
            req.messages.len()
        );

        let resp = self
            .client
            .post(&self.base_url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&payload)
            .send()
            .await
            .with_context(|| format!("Failed to send request to {} API", self.provider_name))?;

        let resp = ProviderErrorHandler::check_http_status(resp, &self.provider_name).await?;
        let json: Value = resp.json().await.with_context(|| {
            format!("Failed to parse {} API response", self.provider_name)
        })?;

        if let Some(error_val) = json.get("error") {
            return Err(ProviderErrorHandler::parse_api_error(200, &error_val.to_string()).into());
        }

        Self::parse_response(&json, model)
    }
}

#[async_trait]
impl AiProvider for OpenAiCompatProvider {
    fn name(&self) -> &str {
        &self.provider_name
    }

    fn default_model(&self) -> &str {
        &self.default_model
    }

    async fn generate(&self, req: GenerationRequest) -> Result<AiResponse> {
        match self.complete(req).await {
            Ok(resp) => {
                if let Ok(mut m) = self.metrics.lock() {
                    m.request_count += 1;
                    m.token_count += resp.tokens_used;
                }
                Ok(resp)
            }
            Err(e) => {
                self.record_error();
                Err(e)
            }
        }
    }

    async fn is_available(&self) -> bool {
        if self.api_key.is_empty() {
            warn!("{} API key is not configured", self.provider_name);
            return false;
        }
        let mut ping = GenerationRequest::from_prompt("ping", &["test".to_string()]);
        ping.max_tokens = 2;
        match self.complete(ping).await {
            Ok(_) => true,
            Err(e) => {
                warn!("{} availability check failed: {}", self.provider_name, e);
                false
            }
        }
    }

    fn metrics(&self) -> ProviderMetrics {
        self.metrics
            .lock()
            .map(|m| m.clone())
            .unwrap_or_default()
    }
}
