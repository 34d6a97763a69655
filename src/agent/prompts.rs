use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::{PoisonError, RwLock};
use tracing::info;

use super::intent::IntentCategory;
use crate::errors::{BizbotError, BizbotResult};

const MIN_SYSTEM_PROMPT_CHARS: usize = 50;

pub const FALLBACK_AI_UNAVAILABLE: &str = "aiUnavailable";
pub const FALLBACK_UNCLEAR_INTENT: &str = "unclearIntent";

const DEFAULT_SYSTEM_PROMPT: &str = "Eres un asistente virtual para pequeños negocios. \
Responde en el idioma del usuario, con tono cercano y profesional, en menos de 200 palabras. \
Da consejos prácticos de marketing y ventas. No hagas ventas agresivas ni pidas datos sensibles.";

const DEFAULT_FALLBACK: &str = "Puedo ayudarte con redes sociales, publicidad, ventas, \
contenido y marca. ¿Sobre qué te gustaría hablar?";

/// Full prompt table. Serialized as the import/export format.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PromptConfig {
    pub system_prompt: String,
    #[serde(default)]
    pub intent_prompts: BTreeMap<String, String>,
    #[serde(default)]
    pub contextual_prompts: BTreeMap<String, String>,
    #[serde(default)]
    pub fallback_prompts: BTreeMap<String, String>,
}

impl Default for PromptConfig {
    fn default() -> Self {
        let intent_prompts = [
            (IntentCategory::Greeting, "El usuario saluda. Sé amable y pregunta en qué puedes ayudar con su negocio."),
            (IntentCategory::MarketingHelp, "El usuario pide ayuda de marketing. Da pasos concretos y de bajo costo."),
            (IntentCategory::SalesProblem, "El usuario tiene problemas de ventas. Identifica causas comunes y propone soluciones."),
            (IntentCategory::SocialMedia, "El usuario pregunta por redes sociales. Sugiere contenido, horarios y formas de interactuar."),
            (IntentCategory::Advertising, "El usuario pregunta por publicidad pagada. Explica opciones de bajo presupuesto y segmentación."),
            (IntentCategory::ContentIdeas, "El usuario busca ideas de contenido. Propón ejemplos específicos y fáciles de producir."),
            (IntentCategory::CustomerService, "El usuario quiere mejorar la atención al cliente. Comparte buenas prácticas."),
            (IntentCategory::Pricing, "El usuario pregunta por precios. Ayúdale a equilibrar margen y competitividad."),
            (IntentCategory::Competition, "El usuario quiere analizar a su competencia. Sugiere cómo diferenciarse."),
            (IntentCategory::Branding, "El usuario quiere trabajar su marca. Guíale hacia una identidad clara y coherente."),
            (IntentCategory::Ecommerce, "El usuario pregunta por ventas en línea. Cubre plataforma, logística y experiencia de compra."),
            (IntentCategory::LocationHelp, "El usuario pregunta por ubicación física. Considera tráfico, zona y costos del local."),
            (IntentCategory::Gratitude, "El usuario agradece. Responde breve y cálido, y ofrece seguir ayudando."),
            (IntentCategory::Farewell, "El usuario se despide. Sé cortés y deja la puerta abierta."),
        ]
        .into_iter()
        .map(|(intent, prompt)| (intent.as_str().to_string(), prompt.to_string()))
        .collect();

        let contextual_prompts = [
            ("newBusiness", "El usuario está empezando su negocio. Prioriza fundamentos."),
            ("budgetConscious", "El usuario tiene poco presupuesto. Prioriza estrategias gratuitas."),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();

        let fallback_prompts = [
            (
                FALLBACK_AI_UNAVAILABLE,
                "Lo siento, estoy teniendo problemas técnicos en este momento. Mientras tanto, esto puede servirte:",
            ),
            (
                FALLBACK_UNCLEAR_INTENT,
                "No entendí del todo tu consulta. Puedo ayudarte con:",
            ),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();

        Self {
            system_prompt: DEFAULT_SYSTEM_PROMPT.to_string(),
            intent_prompts,
            contextual_prompts,
            fallback_prompts,
        }
    }
}

impl PromptConfig {
    /// Problems that make this table unusable. Empty means valid.
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();
        if self.system_prompt.trim().chars().count() < MIN_SYSTEM_PROMPT_CHARS {
            errors.push(format!(
                "system prompt shorter than {} characters",
                MIN_SYSTEM_PROMPT_CHARS
            ));
        }
        if self.intent_prompts.is_empty() {
            errors.push("no intent prompts defined".to_string());
        }
        for key in self.intent_prompts.keys() {
            if key.parse::<IntentCategory>().is_err() {
                errors.push(format!("unknown intent '{}'", key));
            }
        }
        errors
    }
}

/// Partial update for [`PromptManager::update`]. Maps are merged key by key.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PromptUpdate {
    pub system_prompt: Option<String>,
    #[serde(default)]
    pub intent_prompts: BTreeMap<String, String>,
    #[serde(default)]
    pub contextual_prompts: BTreeMap<String, String>,
    #[serde(default)]
    pub fallback_prompts: BTreeMap<String, String>,
}

/// Runtime-replaceable prompt table.
#[derive(Debug, Default)]
pub struct PromptManager {
    config: RwLock<PromptConfig>,
}

impl PromptManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(config: PromptConfig) -> BizbotResult<Self> {
        let manager = Self::new();
        manager.import(config)?;
        Ok(manager)
    }

    pub fn load_from_file(path: &Path) -> BizbotResult<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read prompts from {}", path.display()))?;
        let config: PromptConfig = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse prompts JSON from {}", path.display()))?;
        let manager = Self::with_config(config)?;
        info!("loaded prompt table from {}", path.display());
        Ok(manager)
    }

    fn read<T>(&self, f: impl FnOnce(&PromptConfig) -> T) -> T {
        let guard = self.config.read().unwrap_or_else(PoisonError::into_inner);
        f(&guard)
    }

    pub fn system_prompt(&self) -> String {
        self.read(|c| c.system_prompt.clone())
    }

    /// Intent guidance, or an empty string when none is defined.
    pub fn intent_prompt(&self, intent: IntentCategory) -> String {
        self.read(|c| {
            c.intent_prompts
                .get(intent.as_str())
                .cloned()
                .unwrap_or_default()
        })
    }

    /// Fallback text for a failure scenario, or a generic offer of help.
    pub fn fallback_prompt(&self, scenario: &str) -> String {
        self.read(|c| {
            c.fallback_prompts
                .get(scenario)
                .cloned()
                .unwrap_or_else(|| DEFAULT_FALLBACK.to_string())
        })
    }

    /// System prompt, then intent guidance, then extra context, blank-line separated.
    pub fn build_system_prompt(
        &self,
        intent: IntentCategory,
        additional_context: Option<&str>,
    ) -> String {
        let mut prompt = self.system_prompt();
        let intent_prompt = self.intent_prompt(intent);
        if !intent_prompt.is_empty() {
            prompt.push_str("\n\n");
            prompt.push_str(&intent_prompt);
        }
        if let Some(extra) = additional_context.filter(|s| !s.is_empty()) {
            prompt.push_str("\n\nContexto adicional: ");
            prompt.push_str(extra);
        }
        prompt
    }

    pub fn update(&self, update: PromptUpdate) -> BizbotResult<()> {
        let mut next = self.export();
        if let Some(system) = update.system_prompt {
            next.system_prompt = system;
        }
        next.intent_prompts.extend(update.intent_prompts);
        next.contextual_prompts.extend(update.contextual_prompts);
        next.fallback_prompts.extend(update.fallback_prompts);
        self.import(next)
    }

    pub fn validate(&self) -> Vec<String> {
        self.read(PromptConfig::validate)
    }

    pub fn export(&self) -> PromptConfig {
        self.read(Clone::clone)
    }

    /// Replace the whole table; rejected tables leave the current one in place.
    pub fn import(&self, config: PromptConfig) -> BizbotResult<()> {
        let errors = config.validate();
        if !errors.is_empty() {
            return Err(BizbotError::Config(format!(
                "Invalid prompt configuration: {}",
                errors.join(", ")
            )));
        }
        *self.config.write().unwrap_or_else(PoisonError::into_inner) = config;
        Ok(())
    }
}
