//! Core data model
//!
//! Conversation messages, project items, and the agent response envelope
//! that the pipeline passes between steps. All wire shapes use camelCase
//! field names so that LLM-produced JSON and the persisted JSON column
//! deserialize directly into these types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// Role of a conversation message sender
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    /// User message
    User,

    /// Assistant message
    Assistant,
}

impl fmt::Display for MessageRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MessageRole::User => write!(f, "user"),
            MessageRole::Assistant => write!(f, "assistant"),
        }
    }
}

/// A single message in a project's conversation history
///
/// Immutable once persisted. The canonical conversation is the append-only
/// sequence of these per project, ordered by creation time.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ConversationMessage {
    pub id: String,

    pub role: MessageRole,

    pub content: String,

    pub created_at: DateTime<Utc>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<serde_json::Value>,
}

impl ConversationMessage {
    /// Create a new user message with a fresh id
    pub fn user(content: impl Into<String>) -> Self {
        Self::new(MessageRole::User, content)
    }

    /// Create a new assistant message with a fresh id
    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(MessageRole::Assistant, content)
    }

    fn new(role: MessageRole, content: impl Into<String>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            role,
            content: content.into(),
            created_at: Utc::now(),
            metadata: None,
        }
    }

    /// Attach arbitrary metadata (e.g. the id of an item this message produced)
    pub fn with_metadata(mut self, metadata: serde_json::Value) -> Self {
        self.metadata = Some(metadata);
        self
    }
}

/// Lifecycle state of a project item
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum ItemState {
    /// A committed decision, backed by a citation
    Decided,

    /// An option still under discussion
    Exploring,

    /// Deferred for later
    Parked,
}

impl ItemState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ItemState::Decided => "decided",
            ItemState::Exploring => "exploring",
            ItemState::Parked => "parked",
        }
    }

    /// Parse a state label, case-insensitively
    pub fn from_label(label: &str) -> Option<Self> {
        match label.to_lowercase().as_str() {
            "decided" => Some(ItemState::Decided),
            "exploring" => Some(ItemState::Exploring),
            "parked" => Some(ItemState::Parked),
            _ => None,
        }
    }
}

impl fmt::Display for ItemState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Provenance record attached to a project item
///
/// `user_quote` is the exact user wording that substantiates the item. Every
/// decided item must carry a non-empty quote traceable to an actual user
/// message.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Citation {
    pub user_quote: String,

    pub timestamp: DateTime<Utc>,

    /// Confidence 0-100
    pub confidence: u8,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
}

/// A durable project item in one of three states
///
/// Created only by the reconciler. Identity is generated at creation and
/// never reused; state changes happen by re-appending, never in place.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ProjectItem {
    pub id: String,

    pub text: String,

    pub state: ItemState,

    pub created_at: DateTime<Utc>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub citation: Option<Citation>,
}

impl ProjectItem {
    /// Create a new item with a fresh id and the current timestamp
    pub fn new(text: impl Into<String>, state: ItemState, citation: Option<Citation>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            text: text.into(),
            state,
            created_at: Utc::now(),
            citation,
        }
    }
}

/// Derived partition of a project's items into the three state buckets
///
/// Recomputed on read from the full item list, never cached across a
/// reconciliation.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProjectState {
    pub decided: Vec<ProjectItem>,
    pub exploring: Vec<ProjectItem>,
    pub parked: Vec<ProjectItem>,
}

impl ProjectState {
    /// Partition an item list into state buckets, preserving list order
    pub fn from_items(items: &[ProjectItem]) -> Self {
        let mut state = Self::default();
        for item in items {
            match item.state {
                ItemState::Decided => state.decided.push(item.clone()),
                ItemState::Exploring => state.exploring.push(item.clone()),
                ItemState::Parked => state.parked.push(item.clone()),
            }
        }
        state
    }

    pub fn total(&self) -> usize {
        self.decided.len() + self.exploring.len() + self.parked.len()
    }

    pub fn is_empty(&self) -> bool {
        self.total() == 0
    }

    /// Format this state into a system prompt injection string
    pub fn format_for_prompt(&self) -> String {
        let mut out = String::new();
        let mut section = |title: &str, items: &[ProjectItem]| {
            if items.is_empty() {
                return;
            }
            out.push_str(title);
            out.push('\n');
            for item in items {
                out.push_str("- ");
                out.push_str(&item.text);
                out.push('\n');
            }
        };
        section("Decided:", &self.decided);
        section("Exploring:", &self.exploring);
        section("Parked:", &self.parked);

        if out.is_empty() {
            out.push_str("No items recorded yet.");
        }
        out
    }
}

/// One element of the batch recording form
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RecordInstruction {
    pub item: String,

    pub state: ItemState,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_quote: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence: Option<u8>,
}

/// Structured instructions attached to an agent response
///
/// This is the sole channel through which a step communicates recording
/// instructions to the reconciler. Two mutually exclusive shapes are
/// understood: the batch form (`items_to_record`) and the single form
/// (`should_record` + `item`). A response carrying neither is a no-op for
/// reconciliation.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ResponseMetadata {
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub should_record: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub item: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state: Option<ItemState>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub items_to_record: Option<Vec<RecordInstruction>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence: Option<u8>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_quote: Option<String>,

    /// Set when the step failed and this response is a placeholder
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub error: bool,

    #[serde(flatten)]
    pub extra: HashMap<String, serde_json::Value>,
}

impl ResponseMetadata {
    /// True if this metadata carries the batch recording form
    pub fn has_batch(&self) -> bool {
        self.items_to_record
            .as_ref()
            .map(|items| !items.is_empty())
            .unwrap_or(false)
    }

    /// True if this metadata carries the single recording form
    pub fn has_single(&self) -> bool {
        self.should_record && self.item.is_some()
    }
}

/// Output of one plan step
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AgentResponse {
    /// Name of the agent that produced this response
    pub agent: String,

    pub message: String,

    pub show_to_user: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<ResponseMetadata>,
}

impl AgentResponse {
    pub fn new(agent: impl Into<String>, message: impl Into<String>, show_to_user: bool) -> Self {
        Self {
            agent: agent.into(),
            message: message.into(),
            show_to_user,
            metadata: None,
        }
    }

    pub fn with_metadata(mut self, metadata: ResponseMetadata) -> Self {
        self.metadata = Some(metadata);
        self
    }

    /// Build an error-tagged response for a failed step
    ///
    /// Used when a parallel-batch member throws or times out: the batch
    /// continues, and this placeholder keeps the output slot instead of
    /// silently dropping it.
    pub fn step_error(agent: impl Into<String>, error: impl fmt::Display) -> Self {
        Self {
            agent: agent.into(),
            message: format!("step failed: {}", error),
            show_to_user: false,
            metadata: Some(ResponseMetadata {
                error: true,
                ..ResponseMetadata::default()
            }),
        }
    }

    /// True if this response was error-tagged by the executor
    pub fn is_error(&self) -> bool {
        self.metadata.as_ref().map(|m| m.error).unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_creation() {
        let user = ConversationMessage::user("Hello");
        assert_eq!(user.role, MessageRole::User);
        assert_eq!(user.content, "Hello");
        assert!(user.metadata.is_none());

        let assistant = ConversationMessage::assistant("Hi there");
        assert_eq!(assistant.role, MessageRole::Assistant);
        assert_ne!(user.id, assistant.id);
    }

    #[test]
    fn test_item_state_labels() {
        assert_eq!(ItemState::from_label("decided"), Some(ItemState::Decided));
        assert_eq!(ItemState::from_label("Exploring"), Some(ItemState::Exploring));
        assert_eq!(ItemState::from_label("PARKED"), Some(ItemState::Parked));
        assert_eq!(ItemState::from_label("done"), None);
        assert_eq!(ItemState::Decided.as_str(), "decided");
    }

    #[test]
    fn test_project_state_partition() {
        let items = vec![
            ProjectItem::new("a", ItemState::Decided, None),
            ProjectItem::new("b", ItemState::Exploring, None),
            ProjectItem::new("c", ItemState::Decided, None),
            ProjectItem::new("d", ItemState::Parked, None),
        ];
        let state = ProjectState::from_items(&items);
        assert_eq!(state.decided.len(), 2);
        assert_eq!(state.exploring.len(), 1);
        assert_eq!(state.parked.len(), 1);
        assert_eq!(state.total(), 4);
        // Order within a bucket follows list order
        assert_eq!(state.decided[0].text, "a");
        assert_eq!(state.decided[1].text, "c");
    }

    #[test]
    fn test_format_for_prompt() {
        let empty = ProjectState::default();
        assert_eq!(empty.format_for_prompt(), "No items recorded yet.");

        let items = vec![
            ProjectItem::new("Use PostgreSQL", ItemState::Decided, None),
            ProjectItem::new("Redis caching", ItemState::Exploring, None),
        ];
        let rendered = ProjectState::from_items(&items).format_for_prompt();
        assert!(rendered.contains("Decided:\n- Use PostgreSQL"));
        assert!(rendered.contains("Exploring:\n- Redis caching"));
        assert!(!rendered.contains("Parked:"));
    }

    #[test]
    fn test_metadata_shape_detection() {
        let empty = ResponseMetadata::default();
        assert!(!empty.has_batch());
        assert!(!empty.has_single());

        let single = ResponseMetadata {
            should_record: true,
            item: Some("Use PostgreSQL".to_string()),
            ..ResponseMetadata::default()
        };
        assert!(single.has_single());
        assert!(!single.has_batch());

        // should_record without an item is not the single form
        let dangling = ResponseMetadata {
            should_record: true,
            ..ResponseMetadata::default()
        };
        assert!(!dangling.has_single());

        let batch = ResponseMetadata {
            items_to_record: Some(vec![RecordInstruction {
                item: "A".to_string(),
                state: ItemState::Decided,
                user_quote: None,
                confidence: None,
            }]),
            ..ResponseMetadata::default()
        };
        assert!(batch.has_batch());

        // An empty batch array is treated as absent
        let empty_batch = ResponseMetadata {
            items_to_record: Some(vec![]),
            ..ResponseMetadata::default()
        };
        assert!(!empty_batch.has_batch());
    }

    #[test]
    fn test_metadata_wire_format() {
        let json = r#"{
            "shouldRecord": true,
            "item": "Use PostgreSQL",
            "state": "decided",
            "confidence": 95
        }"#;
        let meta: ResponseMetadata = serde_json::from_str(json).unwrap();
        assert!(meta.has_single());
        assert_eq!(meta.state, Some(ItemState::Decided));
        assert_eq!(meta.confidence, Some(95));

        let batch_json = r#"{
            "itemsToRecord": [
                {"item": "A", "state": "decided"},
                {"item": "B", "state": "exploring", "userQuote": "maybe B"}
            ]
        }"#;
        let meta: ResponseMetadata = serde_json::from_str(batch_json).unwrap();
        assert!(meta.has_batch());
        let items = meta.items_to_record.unwrap();
        assert_eq!(items[1].user_quote.as_deref(), Some("maybe B"));
    }

    #[test]
    fn test_metadata_extra_fields_preserved() {
        let json = r#"{"shouldRecord": false, "analysisDepth": 3}"#;
        let meta: ResponseMetadata = serde_json::from_str(json).unwrap();
        assert_eq!(
            meta.extra.get("analysisDepth"),
            Some(&serde_json::json!(3))
        );
    }

    #[test]
    fn test_error_tagged_response() {
        let resp = AgentResponse::step_error("review", "boom");
        assert!(resp.is_error());
        assert!(!resp.show_to_user);
        assert!(resp.message.contains("boom"));

        let ok = AgentResponse::new("conversation", "hi", true);
        assert!(!ok.is_error());
    }

    #[test]
    fn test_message_roundtrip() {
        let msg = ConversationMessage::user("test").with_metadata(serde_json::json!({
            "recordedItemId": "abc"
        }));
        let json = serde_json::to_string(&msg).unwrap();
        assert!(json.contains("createdAt"));
        let back: ConversationMessage = serde_json::from_str(&json).unwrap();
        assert_eq!(msg, back);
    }

    #[test]
    fn test_item_roundtrip() {
        let item = ProjectItem::new(
            "Use PostgreSQL",
            ItemState::Decided,
            Some(Citation {
                user_quote: "Let's use PostgreSQL".to_string(),
                timestamp: Utc::now(),
                confidence: 95,
                source: Some("recorder".to_string()),
            }),
        );
        let json = serde_json::to_string(&item).unwrap();
        assert!(json.contains("userQuote"));
        assert!(json.contains(r#""state":"decided""#));
        let back: ProjectItem = serde_json::from_str(&json).unwrap();
        assert_eq!(item, back);
    }
}
