use super::*;
use crate::providers::AiResponse;
use proptest::prelude::*;
use std::sync::atomic::{AtomicUsize, Ordering};

struct FixedClassifier {
    result: IntentResult,
    calls: AtomicUsize,
}

#[async_trait]
impl IntentClassifier for FixedClassifier {
    async fn classify(&self, _normalized: &str) -> Result<IntentResult> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.result.clone())
    }
}

struct FailingClassifier;

#[async_trait]
impl IntentClassifier for FailingClassifier {
    async fn classify(&self, _normalized: &str) -> Result<IntentResult> {
        anyhow::bail!("vendor down")
    }
}

struct CannedProvider(String);

#[async_trait]
impl AiProvider for CannedProvider {
    fn name(&self) -> &str {
        "Canned"
    }

    fn default_model(&self) -> &str {
        "canned"
    }

    async fn generate(&self, _req: GenerationRequest) -> Result<AiResponse> {
        Ok(AiResponse {
            content: self.0.clone(),
            tokens_used: 12,
            model: "canned".into(),
        })
    }
}

#[test]
fn test_normalize_strips_punctuation_keeps_accents() {
    assert_eq!(normalize("  ¡Hola,   ¿Cómo ESTÁS?  "), "hola cómo estás");
    assert_eq!(normalize("precio!!!"), "precio");
    assert_eq!(normalize(""), "");
}

#[tokio::test]
async fn test_greeting_detected_with_high_confidence() {
    let detector = IntentDetector::new();
    let result = detector.detect("Hola buenos días").await;
    assert_eq!(result.intent, IntentCategory::Greeting);
    assert!(result.confidence >= 0.7);
    assert!(result.keywords.contains(&"hola".to_string()));
    assert!(result.response_time_ms.is_some());
}

#[tokio::test]
async fn test_empty_message_is_low_confidence() {
    let detector = IntentDetector::new();
    let result = detector.detect("").await;
    assert_eq!(result.intent, IntentCategory::Other);
    assert!(result.confidence <= 0.3);
}

#[tokio::test]
async fn test_sales_phrase_scores_high() {
    let detector = IntentDetector::new();
    let result = detector.detect("Necesito aumentar ventas en mi tienda").await;
    assert_eq!(result.intent, IntentCategory::SalesProblem);
    assert!((result.confidence - 0.8).abs() < 1e-9);
}

#[tokio::test]
async fn test_keywords_match_whole_words_only() {
    let detector = IntentDetector::new();
    // "hi" must not match inside "hilo"
    let result = detector.detect_by_patterns(&normalize("hilo"));
    assert_eq!(result.intent, IntentCategory::Other);
}

#[tokio::test]
async fn test_question_falls_to_heuristic_tier() {
    let detector = IntentDetector::new();
    let result = detector.detect("me puedes orientar con esto?").await;
    assert_eq!(result.intent, IntentCategory::MarketingHelp);
    assert!((result.confidence - 0.6).abs() < 1e-9);
    assert_eq!(result.context, "Question detected");
}

#[tokio::test]
async fn test_interrogative_word_without_question_mark() {
    let detector = IntentDetector::new();
    let result = detector.detect("no sé cómo empezar con mi negocio").await;
    assert_eq!(result.intent, IntentCategory::MarketingHelp);
    assert_eq!(result.keywords, vec!["cómo".to_string()]);
}

#[tokio::test]
async fn test_low_pattern_score_returned_when_nothing_else_wins() {
    let detector = IntentDetector::new();
    // one pricing keyword: 0.3 * 1.6 = 0.48, capped at 0.6 -> 0.48
    let result = detector.detect("el valor del producto").await;
    assert_eq!(result.intent, IntentCategory::Pricing);
    assert!(result.confidence < 0.7);
}

#[tokio::test]
async fn test_short_single_token_is_other() {
    let result = detect_by_context("ok", "ok");
    assert_eq!(result.intent, IntentCategory::Other);
    assert!((result.confidence - 0.2).abs() < 1e-9);
}

#[tokio::test]
async fn test_classifier_wins_above_threshold() {
    let classifier = Arc::new(FixedClassifier {
        result: IntentResult::new(IntentCategory::Branding, 0.75, "Detected by AI classifier"),
        calls: AtomicUsize::new(0),
    });
    let detector = IntentDetector::new().with_classifier(classifier.clone());
    let result = detector.detect("quiero que la gente me recuerde").await;
    assert_eq!(result.intent, IntentCategory::Branding);
    assert_eq!(classifier.calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_classifier_skipped_when_patterns_confident() {
    let classifier = Arc::new(FixedClassifier {
        result: IntentResult::new(IntentCategory::Branding, 0.99, "x"),
        calls: AtomicUsize::new(0),
    });
    let detector = IntentDetector::new().with_classifier(classifier.clone());
    let result = detector.detect("hola buenas tardes").await;
    assert_eq!(result.intent, IntentCategory::Greeting);
    assert_eq!(classifier.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_classifier_below_threshold_or_failing_is_ignored() {
    let weak = Arc::new(FixedClassifier {
        result: IntentResult::new(IntentCategory::Branding, 0.5, "x"),
        calls: AtomicUsize::new(0),
    });
    let detector = IntentDetector::new().with_classifier(weak);
    let result = detector.detect("¿me ayudas?").await;
    assert_eq!(result.intent, IntentCategory::MarketingHelp);

    let detector = IntentDetector::new().with_classifier(Arc::new(FailingClassifier));
    let result = detector.detect("¿me ayudas?").await;
    assert_eq!(result.intent, IntentCategory::MarketingHelp);
}

#[test]
fn test_patterns_sorted_by_priority_stably() {
    let detector = IntentDetector::new();
    let priorities: Vec<u8> = detector.patterns().iter().map(|p| p.priority).collect();
    assert!(priorities.windows(2).all(|w| w[0] >= w[1]));
    // Greeting precedes Farewell at equal priority
    assert_eq!(detector.patterns()[0].category, IntentCategory::Greeting);
    assert_eq!(detector.patterns()[1].category, IntentCategory::Farewell);
}

#[test]
fn test_ties_go_to_earlier_pattern() {
    let detector = IntentDetector::with_patterns(vec![
        IntentPattern {
            category: IntentCategory::Pricing,
            keywords: &["oferta"],
            phrases: &[],
            priority: 5,
            confidence: 0.9,
        },
        IntentPattern {
            category: IntentCategory::Advertising,
            keywords: &["oferta"],
            phrases: &[],
            priority: 5,
            confidence: 0.9,
        },
    ]);
    let result = detector.detect_by_patterns("oferta");
    assert_eq!(result.intent, IntentCategory::Pricing);
}

#[test]
fn test_all_possible_intents_lists_overlaps() {
    let detector = IntentDetector::new();
    let all = detector.all_possible_intents("publicidad para mi marca en instagram");
    let intents: Vec<IntentCategory> = all.iter().map(|r| r.intent).collect();
    assert!(intents.contains(&IntentCategory::MarketingHelp));
    assert!(intents.contains(&IntentCategory::Advertising));
    assert!(intents.contains(&IntentCategory::Branding));
    assert!(intents.contains(&IntentCategory::SocialMedia));
    assert!(all.windows(2).all(|w| w[0].confidence >= w[1].confidence));
}

#[test]
fn test_category_parse_roundtrip() {
    for c in IntentCategory::ALL {
        assert_eq!(c.as_str().parse::<IntentCategory>().unwrap(), c);
    }
    assert_eq!(
        "marketing_help".parse::<IntentCategory>().unwrap(),
        IntentCategory::MarketingHelp
    );
    assert!("SHOPPING".parse::<IntentCategory>().is_err());
}

#[tokio::test]
async fn test_provider_classifier_parses_json_reply() {
    let provider = Arc::new(CannedProvider(
        "Claro: {\"intent\": \"PRICING\", \"confidence\": 0.82}".into(),
    ));
    let classifier = ProviderIntentClassifier::new(provider);
    let result = classifier.classify("cuanto cobro").await.unwrap();
    assert_eq!(result.intent, IntentCategory::Pricing);
    assert!((result.confidence - 0.82).abs() < 1e-9);
    assert_eq!(result.provider.as_deref(), Some("Canned"));
    assert_eq!(result.tokens_used, Some(12));
}

#[tokio::test]
async fn test_provider_classifier_rejects_garbage() {
    let classifier = ProviderIntentClassifier::new(Arc::new(CannedProvider("no idea".into())));
    assert!(classifier.classify("x").await.is_err());

    let classifier = ProviderIntentClassifier::new(Arc::new(CannedProvider(
        "{\"intent\": \"WEATHER\", \"confidence\": 3.0}".into(),
    )));
    let result = classifier.classify("x").await.unwrap();
    assert_eq!(result.intent, IntentCategory::Other);
    assert!((result.confidence - 1.0).abs() < 1e-9);
}

proptest! {
    #[test]
    fn pattern_tier_confidence_in_range(s in "\\PC{0,200}") {
        let detector = IntentDetector::new();
        let result = detector.detect_by_patterns(&normalize(&s));
        prop_assert!((0.0..=1.0).contains(&result.confidence));
    }

    #[test]
    fn normalize_is_idempotent(s in "\\PC{0,200}") {
        let once = normalize(&s);
        prop_assert_eq!(normalize(&once), once.clone());
        prop_assert!(!once.contains("  "));
    }
}
