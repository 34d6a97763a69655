use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::warn;

use crate::config::{AiConfig, ProviderConfig};
use crate::providers::base::AiProvider;
use crate::providers::openai::{
    GROQ_API_URL, GROQ_DEFAULT_MODEL, OPENAI_API_URL, OPENAI_DEFAULT_MODEL, OpenAiCompatProvider,
};

pub type ProviderConstructor = Box<dyn Fn(&ProviderConfig) -> Arc<dyn AiProvider> + Send + Sync>;

const FALLBACK_KIND: &str = "openai";

/// Builds AI vendor clients by kind tag (`openai`, `groq`, ...).
pub struct ProviderFactory {
    ai: AiConfig,
    constructors: BTreeMap<String, ProviderConstructor>,
}

fn compat_constructor(
    name: &'static str,
    default_url: &'static str,
    default_model: &'static str,
) -> ProviderConstructor {
    Box::new(move |cfg: &ProviderConfig| {
        let url = cfg.api_base.as_deref().map_or_else(
            || default_url.to_string(),
            |base| format!("{}/chat/completions", base.trim_end_matches('/')),
        );
        let model = cfg
            .model
            .clone()
            .unwrap_or_else(|| default_model.to_string());
        Arc::new(OpenAiCompatProvider::with_config(
            cfg.api_key.clone(),
            model,
            url,
            name.to_string(),
        )) as Arc<dyn AiProvider>
    })
}

impl ProviderFactory {
    pub fn new(ai: AiConfig) -> Self {
        let mut factory = Self {
            ai,
            constructors: BTreeMap::new(),
        };
        factory.register(
            "openai",
            compat_constructor("OpenAI", OPENAI_API_URL, OPENAI_DEFAULT_MODEL),
        );
        factory.register(
            "groq",
            compat_constructor("Groq", GROQ_API_URL, GROQ_DEFAULT_MODEL),
        );
        factory
    }

    pub fn register(&mut self, kind: &str, constructor: ProviderConstructor) {
        self.constructors
            .insert(kind.to_ascii_lowercase(), constructor);
    }

    pub fn kinds(&self) -> Vec<&str> {
        self.constructors.keys().map(String::as_str).collect()
    }

    pub fn configured_kind(&self) -> &str {
        &self.ai.provider
    }

    /// Build a provider for `kind`; unknown kinds fall back to OpenAI.
    pub fn create(&self, kind: &str) -> Arc<dyn AiProvider> {
        let kind = kind.trim().to_ascii_lowercase();
        if let Some(ctor) = self.constructors.get(&kind) {
            return ctor(&self.provider_config(&kind));
        }
        warn!("unknown AI provider '{}', falling back to {}", kind, FALLBACK_KIND);
        let cfg = self.provider_config(FALLBACK_KIND);
        match self.constructors.get(FALLBACK_KIND) {
            Some(ctor) => ctor(&cfg),
            None => compat_constructor("OpenAI", OPENAI_API_URL, OPENAI_DEFAULT_MODEL)(&cfg),
        }
    }

    fn provider_config(&self, kind: &str) -> ProviderConfig {
        let cfg = self.ai.provider_config(kind).cloned().unwrap_or_default();
        if cfg.api_key.is_empty() {
            warn!("no API key configured for AI provider '{}'", kind);
        }
        cfg
    }

    /// Provider named by `ai.provider` in config.
    pub fn create_default(&self) -> Arc<dyn AiProvider> {
        self.create(&self.ai.provider)
    }
}
