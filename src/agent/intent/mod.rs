//! Three-tier intent classification.
//!
//! 1. **Pattern tier**: keyword/phrase scoring over a priority-sorted table.
//!    Wins at confidence >= 0.7.
//! 2. **Classifier tier**: optional vendor-backed [`IntentClassifier`].
//!    Wins at >= 0.6; errors fall through.
//! 3. **Heuristic tier**: question and short-message shapes. Wins at >= 0.5.
//!
//! When no tier clears its bar the pattern result is returned as-is
//! (`OTHER` at 0.3 when nothing matched).

mod patterns;

pub use patterns::{IntentPattern, default_patterns};

use anyhow::{Context, Result};
use async_trait::async_trait;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, LazyLock, PoisonError, RwLock};
use std::time::Instant;
use tracing::debug;

use crate::agent::SharedProvider;
use crate::providers::{AiProvider, GenerationRequest};

const PATTERN_THRESHOLD: f64 = 0.7;
const CLASSIFIER_THRESHOLD: f64 = 0.6;
const HEURISTIC_THRESHOLD: f64 = 0.5;
const MIN_PATTERN_SCORE: f64 = 0.3;
const KEYWORD_WEIGHT: f64 = 0.3;
const PHRASE_WEIGHT: f64 = 0.5;
const PHRASE_BONUS: f64 = 0.2;
const DEFAULT_CONFIDENCE: f64 = 0.3;
const SHORT_MESSAGE_CHARS: usize = 10;

static PUNCTUATION_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[^\w\s]").unwrap());
static WHITESPACE_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s+").unwrap());

const INTERROGATIVES: &[&str] = &["cómo", "qué", "cuál", "cuánto", "dónde", "cuándo"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum IntentCategory {
    Greeting,
    MarketingHelp,
    SalesProblem,
    SocialMedia,
    Advertising,
    ContentIdeas,
    CustomerService,
    Pricing,
    Competition,
    Branding,
    Ecommerce,
    LocationHelp,
    Gratitude,
    Farewell,
    Other,
}

impl IntentCategory {
    pub const ALL: [IntentCategory; 15] = [
        IntentCategory::Greeting,
        IntentCategory::MarketingHelp,
        IntentCategory::SalesProblem,
        IntentCategory::SocialMedia,
        IntentCategory::Advertising,
        IntentCategory::ContentIdeas,
        IntentCategory::CustomerService,
        IntentCategory::Pricing,
        IntentCategory::Competition,
        IntentCategory::Branding,
        IntentCategory::Ecommerce,
        IntentCategory::LocationHelp,
        IntentCategory::Gratitude,
        IntentCategory::Farewell,
        IntentCategory::Other,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            IntentCategory::Greeting => "GREETING",
            IntentCategory::MarketingHelp => "MARKETING_HELP",
            IntentCategory::SalesProblem => "SALES_PROBLEM",
            IntentCategory::SocialMedia => "SOCIAL_MEDIA",
            IntentCategory::Advertising => "ADVERTISING",
            IntentCategory::ContentIdeas => "CONTENT_IDEAS",
            IntentCategory::CustomerService => "CUSTOMER_SERVICE",
            IntentCategory::Pricing => "PRICING",
            IntentCategory::Competition => "COMPETITION",
            IntentCategory::Branding => "BRANDING",
            IntentCategory::Ecommerce => "ECOMMERCE",
            IntentCategory::LocationHelp => "LOCATION_HELP",
            IntentCategory::Gratitude => "GRATITUDE",
            IntentCategory::Farewell => "FAREWELL",
            IntentCategory::Other => "OTHER",
        }
    }
}

impl std::str::FromStr for IntentCategory {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let upper = s.trim().to_ascii_uppercase();
        IntentCategory::ALL
            .into_iter()
            .find(|c| c.as_str() == upper)
            .ok_or_else(|| format!("Unknown intent: {}", s))
    }
}

impl std::fmt::Display for IntentCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IntentResult {
    pub intent: IntentCategory,
    pub confidence: f64,
    pub keywords: Vec<String>,
    pub context: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response_time_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tokens_used: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provider: Option<String>,
}

impl IntentResult {
    fn new(intent: IntentCategory, confidence: f64, context: impl Into<String>) -> Self {
        Self {
            intent,
            confidence,
            keywords: Vec::new(),
            context: context.into(),
            response_time_ms: None,
            tokens_used: None,
            provider: None,
        }
    }

    fn with_keywords(mut self, keywords: Vec<String>) -> Self {
        self.keywords = keywords;
        self
    }
}

/// Optional vendor-assisted classification tier.
#[async_trait]
pub trait IntentClassifier: Send + Sync {
    async fn classify(&self, normalized: &str) -> Result<IntentResult>;
}

/// Lower-case, strip punctuation (letters with diacritics survive) and
/// collapse whitespace.
pub fn normalize(text: &str) -> String {
    let lowered = text.to_lowercase();
    let stripped = PUNCTUATION_RE.replace_all(&lowered, " ");
    WHITESPACE_RE.replace_all(stripped.trim(), " ").into_owned()
}

/// Whole-word containment on an already-normalized message.
fn contains_term(padded: &str, term: &str) -> bool {
    padded.contains(&format!(" {} ", term))
}

struct PatternScore {
    score: f64,
    keywords: Vec<String>,
    phrases: usize,
}

fn score_pattern(padded: &str, pattern: &IntentPattern) -> PatternScore {
    let keywords: Vec<String> = pattern
        .keywords
        .iter()
        .filter(|k| contains_term(padded, k))
        .map(|k| (*k).to_string())
        .collect();
    let phrases = pattern
        .phrases
        .iter()
        .filter(|p| contains_term(padded, p))
        .count();
    let score = keywords.len() as f64 * KEYWORD_WEIGHT + phrases as f64 * PHRASE_WEIGHT;
    PatternScore {
        score,
        keywords,
        phrases,
    }
}

pub struct IntentDetector {
    patterns: Vec<IntentPattern>,
    classifier: Option<Arc<dyn IntentClassifier>>,
}

impl Default for IntentDetector {
    fn default() -> Self {
        Self::new()
    }
}

impl IntentDetector {
    pub fn new() -> Self {
        Self::with_patterns(default_patterns())
    }

    pub fn with_patterns(mut patterns: Vec<IntentPattern>) -> Self {
        // Stable: equal priorities keep table order
        patterns.sort_by(|a, b| b.priority.cmp(&a.priority));
        Self {
            patterns,
            classifier: None,
        }
    }

    #[must_use]
    pub fn with_classifier(mut self, classifier: Arc<dyn IntentClassifier>) -> Self {
        self.classifier = Some(classifier);
        self
    }

    pub fn patterns(&self) -> &[IntentPattern] {
        &self.patterns
    }

    /// Run the tiers in order and return the first confident result.
    pub async fn detect(&self, text: &str) -> IntentResult {
        let start = Instant::now();
        let normalized = normalize(text);

        let pattern_result = self.detect_by_patterns(&normalized);
        if pattern_result.confidence >= PATTERN_THRESHOLD {
            return finish(pattern_result, start);
        }

        if let Some(classifier) = &self.classifier {
            match classifier.classify(&normalized).await {
                Ok(result) if result.confidence >= CLASSIFIER_THRESHOLD => {
                    return finish(result, start);
                }
                Ok(result) => debug!(
                    "classifier result {} ({:.2}) below threshold",
                    result.intent, result.confidence
                ),
                Err(e) => debug!("intent classifier failed: {}", e),
            }
        }

        let heuristic = detect_by_context(text, &normalized);
        if heuristic.confidence >= HEURISTIC_THRESHOLD {
            return finish(heuristic, start);
        }

        finish(pattern_result, start)
    }

    /// Pattern tier on a normalized message.
    pub fn detect_by_patterns(&self, normalized: &str) -> IntentResult {
        let padded = format!(" {} ", normalized);
        let mut best: Option<IntentResult> = None;

        for pattern in &self.patterns {
            let PatternScore {
                mut score,
                keywords,
                phrases,
            } = score_pattern(&padded, pattern);
            if phrases > 0 {
                score += PHRASE_BONUS;
            }
            score *= 1.0 + f64::from(pattern.priority) * 0.1;
            if score < MIN_PATTERN_SCORE {
                continue;
            }
            let confidence = score.min(pattern.confidence);
            // Strictly greater: ties keep the earlier (higher priority) pattern
            if best.as_ref().is_none_or(|b| confidence > b.confidence) {
                best = Some(
                    IntentResult::new(
                        pattern.category,
                        confidence,
                        format!("Detected by pattern: {}", pattern.category),
                    )
                    .with_keywords(keywords),
                );
            }
        }

        best.unwrap_or_else(|| {
            IntentResult::new(
                IntentCategory::Other,
                DEFAULT_CONFIDENCE,
                "No clear intent detected",
            )
        })
    }

    /// Every pattern with a positive raw score, best first. For diagnostics.
    pub fn all_possible_intents(&self, text: &str) -> Vec<IntentResult> {
        let padded = format!(" {} ", normalize(text));
        let mut results: Vec<IntentResult> = self
            .patterns
            .iter()
            .filter_map(|pattern| {
                let scored = score_pattern(&padded, pattern);
                (scored.score > 0.0).then(|| {
                    IntentResult::new(
                        pattern.category,
                        scored.score.min(pattern.confidence),
                        format!("Pattern match: {}", pattern.category),
                    )
                    .with_keywords(scored.keywords)
                })
            })
            .collect();
        results.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));
        results
    }
}

fn finish(mut result: IntentResult, start: Instant) -> IntentResult {
    result.response_time_ms = Some(start.elapsed().as_millis() as u64);
    result
}

/// Heuristic tier. Sees the raw text so question marks survive.
pub fn detect_by_context(raw: &str, normalized: &str) -> IntentResult {
    if normalized.chars().count() < SHORT_MESSAGE_CHARS && !normalized.contains(' ') {
        return IntentResult::new(IntentCategory::Other, 0.2, "Very short message");
    }

    let padded = format!(" {} ", normalized);
    let matched: Vec<String> = INTERROGATIVES
        .iter()
        .filter(|w| contains_term(&padded, w))
        .map(|w| (*w).to_string())
        .collect();
    if raw.contains('?') || raw.contains('¿') || !matched.is_empty() {
        return IntentResult::new(IntentCategory::MarketingHelp, 0.6, "Question detected")
            .with_keywords(matched);
    }

    IntentResult::new(IntentCategory::Other, DEFAULT_CONFIDENCE, "Context analysis")
}

/// Classifier tier backed by a chat-completion vendor. Expects a JSON reply
/// like `{"intent": "PRICING", "confidence": 0.8}`.
pub struct ProviderIntentClassifier {
    provider: SharedProvider,
}

#[derive(Deserialize)]
struct ClassifierReply {
    intent: String,
    confidence: f64,
}

impl ProviderIntentClassifier {
    pub fn new(provider: Arc<dyn AiProvider>) -> Self {
        Self::shared(Arc::new(RwLock::new(provider)))
    }

    pub fn shared(provider: SharedProvider) -> Self {
        Self { provider }
    }

    fn system_prompt() -> String {
        let labels: Vec<&str> = IntentCategory::ALL.iter().map(IntentCategory::as_str).collect();
        format!(
            "Classify the user's message into exactly one of: {}. \
             Reply only with JSON: {{\"intent\": \"<LABEL>\", \"confidence\": <0..1>}}",
            labels.join(", ")
        )
    }

    fn parse_reply(content: &str) -> Result<(IntentCategory, f64)> {
        let start = content.find('{').context("classifier reply has no JSON object")?;
        let end = content.rfind('}').context("classifier reply has no JSON object")?;
        let reply: ClassifierReply = serde_json::from_str(&content[start..=end])
            .context("classifier reply is not valid JSON")?;
        let intent = reply.intent.parse().unwrap_or(IntentCategory::Other);
        Ok((intent, reply.confidence.clamp(0.0, 1.0)))
    }
}

#[async_trait]
impl IntentClassifier for ProviderIntentClassifier {
    async fn classify(&self, normalized: &str) -> Result<IntentResult> {
        let mut req = GenerationRequest::from_prompt(&Self::system_prompt(), &[normalized.to_string()]);
        req.max_tokens = 50;
        req.temperature = 0.0;
        let provider = self
            .provider
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        let resp = provider.generate(req).await?;
        let (intent, confidence) = Self::parse_reply(&resp.content)?;
        let mut result = IntentResult::new(intent, confidence, "Detected by AI classifier");
        result.tokens_used = Some(resp.tokens_used);
        result.provider = Some(provider.name().to_string());
        Ok(result)
    }
}

#[cfg(test)]
mod tests;
