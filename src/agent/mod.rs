//! Response orchestration: intent detection, prompt assembly and the vendor
//! call with a deterministic fallback.

pub mod intent;
pub mod prompts;

pub use intent::{IntentCategory, IntentDetector, IntentResult};
pub use prompts::{PromptConfig, PromptManager, PromptUpdate};

use serde::Serialize;
use std::path::Path;
use std::sync::{Arc, PoisonError, RwLock};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

use crate::config::AiConfig;
use crate::errors::{BizbotError, BizbotResult};
use crate::providers::{AiProvider, GenerationRequest, ProviderFactory, ProviderMetrics};
use intent::ProviderIntentClassifier;

pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
/// Prior turns sent to the vendor along with the current message.
pub const HISTORY_CONTEXT_TURNS: usize = 5;
pub const FALLBACK_PROVIDER: &str = "Fallback";

/// The active vendor. Swapped in place by [`AiAgent::switch_provider`]; every
/// holder of the slot sees the swap.
pub type SharedProvider = Arc<RwLock<Arc<dyn AiProvider>>>;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentReply {
    pub content: String,
    pub tokens_used: u64,
    pub processing_time_ms: u64,
    pub provider: String,
    pub model: String,
}

impl AgentReply {
    pub fn is_fallback(&self) -> bool {
        self.provider == FALLBACK_PROVIDER
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderStatus {
    pub provider: String,
    pub model: String,
    pub available: bool,
    pub metrics: ProviderMetrics,
}

pub struct AiAgent {
    provider: SharedProvider,
    factory: Option<Arc<ProviderFactory>>,
    detector: IntentDetector,
    prompts: PromptManager,
    timeout: Duration,
}

impl AiAgent {
    pub fn new(provider: Arc<dyn AiProvider>) -> Self {
        Self {
            provider: Arc::new(RwLock::new(provider)),
            factory: None,
            detector: IntentDetector::new(),
            prompts: PromptManager::new(),
            timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }

    /// Wire vendor, prompts and detector from the `ai` config section.
    pub fn from_config(ai: &AiConfig) -> BizbotResult<Self> {
        let factory = Arc::new(ProviderFactory::new(ai.clone()));
        let provider = factory.create_default();
        info!(
            "AI provider: {} (model {})",
            provider.name(),
            provider.default_model()
        );

        let prompts = match ai.prompts_file.as_deref().filter(|p| !p.is_empty()) {
            Some(path) => PromptManager::load_from_file(Path::new(path))?,
            None => PromptManager::new(),
        };

        let agent = Self::new(provider)
            .with_factory(factory)
            .with_prompts(prompts)
            .with_timeout(Duration::from_secs(ai.request_timeout_secs));
        Ok(if ai.intent_classifier {
            agent.with_provider_classifier()
        } else {
            agent
        })
    }

    /// Add the vendor-backed classifier tier to the current detector. It
    /// classifies with whichever provider is active at call time.
    #[must_use]
    pub fn with_provider_classifier(mut self) -> Self {
        let classifier = ProviderIntentClassifier::shared(self.provider.clone());
        self.detector = self.detector.with_classifier(Arc::new(classifier));
        self
    }

    #[must_use]
    pub fn with_factory(mut self, factory: Arc<ProviderFactory>) -> Self {
        self.factory = Some(factory);
        self
    }

    #[must_use]
    pub fn with_detector(mut self, detector: IntentDetector) -> Self {
        self.detector = detector;
        self
    }

    #[must_use]
    pub fn with_prompts(mut self, prompts: PromptManager) -> Self {
        self.prompts = prompts;
        self
    }

    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn prompts(&self) -> &PromptManager {
        &self.prompts
    }

    pub fn detector(&self) -> &IntentDetector {
        &self.detector
    }

    pub fn current_provider(&self) -> Arc<dyn AiProvider> {
        self.provider
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub async fn detect_intent(&self, text: &str) -> IntentResult {
        self.detector.detect(text).await
    }

    /// Generate a reply for `text`. `history` is chronological (oldest first);
    /// only the last few turns are forwarded. Never fails: vendor errors,
    /// timeouts and empty completions all produce the fallback reply.
    pub async fn generate_response(
        &self,
        text: &str,
        intent: &IntentResult,
        history: &[String],
    ) -> AgentReply {
        let start = Instant::now();
        let provider = self.current_provider();

        let system_prompt = self.prompts.build_system_prompt(intent.intent, None);
        let skip = history.len().saturating_sub(HISTORY_CONTEXT_TURNS);
        let mut turns: Vec<String> = history[skip..].to_vec();
        turns.push(text.to_string());
        let req = GenerationRequest::from_prompt(&system_prompt, &turns);

        let outcome = tokio::time::timeout(self.timeout, provider.generate(req)).await;
        let elapsed = elapsed_ms(start);
        match outcome {
            Ok(Ok(resp)) if !resp.content.trim().is_empty() => {
                debug!(
                    "{} replied in {}ms ({} tokens)",
                    provider.name(),
                    elapsed,
                    resp.tokens_used
                );
                AgentReply {
                    content: resp.content,
                    tokens_used: resp.tokens_used,
                    processing_time_ms: elapsed,
                    provider: provider.name().to_string(),
                    model: resp.model,
                }
            }
            Ok(Ok(_)) => {
                warn!("{} returned an empty completion, using fallback", provider.name());
                self.fallback(intent, start)
            }
            Ok(Err(e)) => {
                warn!("{} generation failed: {:#}", provider.name(), e);
                self.fallback(intent, start)
            }
            Err(_) => {
                warn!(
                    "{} timed out after {}s, using fallback",
                    provider.name(),
                    self.timeout.as_secs()
                );
                self.fallback(intent, start)
            }
        }
    }

    fn fallback(&self, intent: &IntentResult, start: Instant) -> AgentReply {
        let content = format!(
            "{}\n\n{}",
            self.prompts.fallback_prompt(prompts::FALLBACK_AI_UNAVAILABLE),
            self.prompts.intent_prompt(intent.intent)
        );
        AgentReply {
            content,
            tokens_used: 0,
            processing_time_ms: elapsed_ms(start),
            provider: FALLBACK_PROVIDER.to_string(),
            model: "none".to_string(),
        }
    }

    /// Swap the vendor at runtime. Returns the new provider's display name.
    pub fn switch_provider(&self, kind: &str) -> BizbotResult<String> {
        let factory = self.factory.as_ref().ok_or_else(|| {
            BizbotError::Config("provider switching requires a provider factory".into())
        })?;
        let next = factory.create(kind);
        let name = next.name().to_string();
        let previous = std::mem::replace(
            &mut *self.provider.write().unwrap_or_else(PoisonError::into_inner),
            next,
        );
        info!("switched AI provider {} -> {}", previous.name(), name);
        Ok(name)
    }

    pub async fn provider_status(&self) -> ProviderStatus {
        let provider = self.current_provider();
        let available = provider.is_available().await;
        ProviderStatus {
            provider: provider.name().to_string(),
            model: provider.default_model().to_string(),
            available,
            metrics: provider.metrics(),
        }
    }
}

fn elapsed_ms(start: Instant) -> u64 {
    u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX)
}
