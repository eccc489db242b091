//! Intent classification
//!
//! Maps a free-text user message (plus a trimmed slice of history) to one
//! of a fixed, closed set of intent labels with a confidence score. The
//! engine's responsibility is shaping the provider call's input and
//! validating its output: unknown labels and unparseable replies fall back
//! to `Intent::General` with confidence 0 rather than failing the turn.

use crate::llm::{find_json_object, ChatMessage, LLMProvider};
use async_trait::async_trait;
use sdk::errors::PipelineError;
use sdk::types::ConversationMessage;
use std::fmt;
use std::sync::Arc;

/// The closed set of intent labels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Intent {
    Brainstorming,
    Deciding,
    Modifying,
    Exploring,
    Parking,
    Reviewing,
    DocumentResearch,
    ReferenceIntegration,
    General,
}

impl Intent {
    pub const ALL: [Intent; 9] = [
        Intent::Brainstorming,
        Intent::Deciding,
        Intent::Modifying,
        Intent::Exploring,
        Intent::Parking,
        Intent::Reviewing,
        Intent::DocumentResearch,
        Intent::ReferenceIntegration,
        Intent::General,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Intent::Brainstorming => "brainstorming",
            Intent::Deciding => "deciding",
            Intent::Modifying => "modifying",
            Intent::Exploring => "exploring",
            Intent::Parking => "parking",
            Intent::Reviewing => "reviewing",
            Intent::DocumentResearch => "document_research",
            Intent::ReferenceIntegration => "reference_integration",
            Intent::General => "general",
        }
    }

    /// Parse a label, case-insensitively. Unknown labels return None; the
    /// classifier turns that into the General fallback.
    pub fn from_label(label: &str) -> Option<Self> {
        match label.trim().to_lowercase().as_str() {
            "brainstorming" => Some(Intent::Brainstorming),
            "deciding" => Some(Intent::Deciding),
            "modifying" => Some(Intent::Modifying),
            "exploring" => Some(Intent::Exploring),
            "parking" => Some(Intent::Parking),
            "reviewing" => Some(Intent::Reviewing),
            "document_research" => Some(Intent::DocumentResearch),
            "reference_integration" => Some(Intent::ReferenceIntegration),
            "general" => Some(Intent::General),
            _ => None,
        }
    }
}

impl fmt::Display for Intent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A classified message
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Classification {
    pub intent: Intent,

    /// Confidence 0-100
    pub confidence: u8,
}

impl Classification {
    /// The safe fallback when classification output is unusable
    pub fn fallback() -> Self {
        Self {
            intent: Intent::General,
            confidence: 0,
        }
    }
}

/// The classification boundary; implemented by the LLM-backed classifier
/// and by test doubles.
#[async_trait]
pub trait IntentClassify: Send + Sync {
    async fn classify(
        &self,
        message: &str,
        history: &[ConversationMessage],
    ) -> Result<Classification, PipelineError>;
}

/// LLM-backed intent classifier
pub struct LlmIntentClassifier {
    provider: Arc<dyn LLMProvider>,

    /// How many trailing history messages the provider sees
    window: usize,
}

impl LlmIntentClassifier {
    pub fn new(provider: Arc<dyn LLMProvider>, window: usize) -> Self {
        Self { provider, window }
    }

    fn system_prompt() -> String {
        let labels: Vec<&str> = Intent::ALL.iter().map(|i| i.as_str()).collect();
        format!(
            "Classify the user's latest message into exactly one intent label.\n\
             Labels: {}\n\
             Output ONLY a JSON object: {{\"intent\": \"<label>\", \"confidence\": 0-100}}.\n\
             No markdown, no explanation.",
            labels.join(", ")
        )
    }

    /// Validate and clamp raw provider output into the closed label set
    fn parse(content: &str) -> Classification {
        let Some(value) = find_json_object(content) else {
            tracing::debug!("classifier output had no JSON, falling back to general");
            return Classification::fallback();
        };

        let Some(intent) = value
            .get("intent")
            .and_then(|v| v.as_str())
            .and_then(Intent::from_label)
        else {
            tracing::debug!("classifier output label unknown, falling back to general");
            return Classification::fallback();
        };

        let confidence = value
            .get("confidence")
            .and_then(|v| v.as_i64())
            .unwrap_or(0)
            .clamp(0, 100) as u8;

        Classification { intent, confidence }
    }
}

#[async_trait]
impl IntentClassify for LlmIntentClassifier {
    async fn classify(
        &self,
        message: &str,
        history: &[ConversationMessage],
    ) -> Result<Classification, PipelineError> {
        let mut messages = vec![ChatMessage::system(Self::system_prompt())];

        let start = history.len().saturating_sub(self.window);
        if start < history.len() {
            let mut context = String::from("Recent conversation:\n");
            for msg in &history[start..] {
                context.push_str(&format!("{}: {}\n", msg.role, msg.content));
            }
            messages.push(ChatMessage::user(context));
        }

        messages.push(ChatMessage::user(format!("Latest message: {}", message)));

        let content = self
            .provider
            .generate(&messages)
            .await
            .map_err(|e| PipelineError::Classification(e.to_string()))?;

        let classification = Self::parse(&content);
        tracing::debug!(
            intent = classification.intent.as_str(),
            confidence = classification.confidence,
            "message classified"
        );
        Ok(classification)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::LLMError;

    struct CannedProvider {
        reply: String,
    }

    #[async_trait]
    impl LLMProvider for CannedProvider {
        fn name(&self) -> &str {
            "canned"
        }

        async fn generate(&self, _messages: &[ChatMessage]) -> crate::llm::Result<String> {
            Ok(self.reply.clone())
        }
    }

    #[test]
    fn test_label_roundtrip() {
        for intent in Intent::ALL {
            assert_eq!(Intent::from_label(intent.as_str()), Some(intent));
        }
        assert_eq!(Intent::from_label("not_a_real_intent"), None);
        assert_eq!(Intent::from_label("DECIDING"), Some(Intent::Deciding));
    }

    #[test]
    fn test_parse_valid() {
        let c = LlmIntentClassifier::parse(r#"{"intent": "deciding", "confidence": 87}"#);
        assert_eq!(c.intent, Intent::Deciding);
        assert_eq!(c.confidence, 87);
    }

    #[test]
    fn test_parse_clamps_confidence() {
        let c = LlmIntentClassifier::parse(r#"{"intent": "parking", "confidence": 250}"#);
        assert_eq!(c.intent, Intent::Parking);
        assert_eq!(c.confidence, 100);

        let c = LlmIntentClassifier::parse(r#"{"intent": "parking", "confidence": -5}"#);
        assert_eq!(c.confidence, 0);
    }

    #[test]
    fn test_parse_unknown_label_falls_back() {
        let c = LlmIntentClassifier::parse(r#"{"intent": "philosophizing", "confidence": 99}"#);
        assert_eq!(c.intent, Intent::General);
        assert_eq!(c.confidence, 0);
    }

    #[test]
    fn test_parse_garbage_falls_back() {
        let c = LlmIntentClassifier::parse("I think this is probably a decision?");
        assert_eq!(c, Classification::fallback());
    }

    #[test]
    fn test_parse_fenced_output() {
        let c = LlmIntentClassifier::parse(
            "```json\n{\"intent\": \"reviewing\", \"confidence\": 60}\n```",
        );
        assert_eq!(c.intent, Intent::Reviewing);
        assert_eq!(c.confidence, 60);
    }

    #[tokio::test]
    async fn test_classify_trims_history() {
        // Window of 2: only the last two history messages make it into the
        // prompt. The canned provider ignores input, so this test exercises
        // the call path end to end and the output parsing.
        let classifier = LlmIntentClassifier::new(
            Arc::new(CannedProvider {
                reply: r#"{"intent": "exploring", "confidence": 70}"#.to_string(),
            }),
            2,
        );

        let history: Vec<ConversationMessage> = (0..10)
            .map(|i| ConversationMessage::user(format!("message {}", i)))
            .collect();

        let c = classifier.classify("what about Redis?", &history).await.unwrap();
        assert_eq!(c.intent, Intent::Exploring);
        assert_eq!(c.confidence, 70);
    }

    #[tokio::test]
    async fn test_classify_provider_failure_is_error() {
        struct FailingProvider;

        #[async_trait]
        impl LLMProvider for FailingProvider {
            fn name(&self) -> &str {
                "failing"
            }

            async fn generate(&self, _messages: &[ChatMessage]) -> crate::llm::Result<String> {
                Err(LLMError::Timeout)
            }
        }

        let classifier = LlmIntentClassifier::new(Arc::new(FailingProvider), 5);
        let err = classifier.classify("hello", &[]).await.unwrap_err();
        assert!(matches!(err, PipelineError::Classification(_)));
    }
}
