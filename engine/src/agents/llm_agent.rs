//! LLM-backed agent invoker
//!
//! One `LlmAgent` instance serves one agent kind. It assembles the prompt
//! from the kind's instructions, the current project state, and the pruned
//! history, then extracts the structured recording metadata (if any) from
//! the model's reply. A reply whose JSON does not parse is still a valid
//! response — it just carries no metadata, which the reconciler treats as
//! a no-op.

use super::{AgentInvoker, AgentKind, AgentRequest};
use crate::llm::{find_json_object, ChatMessage, LLMProvider};
use async_trait::async_trait;
use sdk::errors::PipelineError;
use sdk::types::{AgentResponse, MessageRole, ResponseMetadata};
use std::sync::Arc;

pub struct LlmAgent {
    kind: AgentKind,
    provider: Arc<dyn LLMProvider>,
}

impl LlmAgent {
    pub fn new(kind: AgentKind, provider: Arc<dyn LLMProvider>) -> Self {
        Self { kind, provider }
    }

    fn instructions(&self) -> &'static str {
        match self.kind {
            AgentKind::Conversation => {
                "You are a project-tracking assistant. Reply to the user naturally and \
                 helpfully. Never invent decisions the user did not state."
            }
            AgentKind::Recorder => {
                "You extract durable decisions from the user's latest message. If the \
                 message states a decision, output a JSON object: \
                 {\"shouldRecord\": true, \"item\": \"<the decision>\", \"state\": \
                 \"decided\", \"userQuote\": \"<exact user wording>\", \"confidence\": 0-100}. \
                 If nothing should be recorded, output {\"shouldRecord\": false}. \
                 Only record what the user actually said."
            }
            AgentKind::GapAnalysis => {
                "You find missing information in the project. List open questions the \
                 user has not answered yet. For each genuinely open question worth \
                 tracking, include it in a JSON object: {\"itemsToRecord\": [{\"item\": \
                 \"<question>\", \"state\": \"exploring\"}]}. Output {} if nothing is missing."
            }
            AgentKind::Review => {
                "You review the recent conversation for decisions and explorations that \
                 were never recorded. Output a JSON object: {\"itemsToRecord\": [{\"item\": \
                 \"<text>\", \"state\": \"decided\"|\"exploring\"|\"parked\", \"userQuote\": \
                 \"<exact user wording if available>\"}]}. Output {} when nothing is missing."
            }
            AgentKind::Research => {
                "You investigate the topic of the user's message in depth and summarize \
                 what the project record should capture about it."
            }
            AgentKind::Reference => {
                "You connect the user's message to material referenced earlier in the \
                 conversation and summarize the relevant connections."
            }
        }
    }

    fn build_messages(&self, request: &AgentRequest) -> Vec<ChatMessage> {
        let mut system = String::new();
        system.push_str(self.instructions());
        system.push_str("\n\nCurrent action: ");
        system.push_str(&request.action);
        system.push_str("\n\n--- Project State ---\n");
        system.push_str(&request.project_state.format_for_prompt());

        if !request.extra_context.is_empty() {
            system.push_str("\n\n--- Additional Context ---\n");
            for ctx in &request.extra_context {
                system.push_str(ctx);
                system.push('\n');
            }
        }

        let mut messages = vec![ChatMessage::system(system)];

        for msg in &request.history {
            messages.push(match msg.role {
                MessageRole::User => ChatMessage::user(&msg.content),
                MessageRole::Assistant => ChatMessage::assistant(&msg.content),
            });
        }

        messages.push(ChatMessage::user(&request.message));
        messages
    }

    /// Pull a `ResponseMetadata` out of the model reply, if it embedded one
    fn parse_metadata(content: &str) -> Option<ResponseMetadata> {
        let value = find_json_object(content)?;
        match serde_json::from_value::<ResponseMetadata>(value) {
            Ok(metadata) => Some(metadata),
            Err(e) => {
                tracing::debug!("agent metadata did not parse: {}", e);
                None
            }
        }
    }
}

#[async_trait]
impl AgentInvoker for LlmAgent {
    async fn invoke(&self, request: AgentRequest) -> Result<AgentResponse, PipelineError> {
        let messages = self.build_messages(&request);

        let content = self
            .provider
            .generate(&messages)
            .await
            .map_err(|e| PipelineError::Agent {
                agent: self.kind.name().to_string(),
                reason: e.to_string(),
            })?;

        let metadata = Self::parse_metadata(&content);
        let show_to_user = self.kind == AgentKind::Conversation;

        let mut response = AgentResponse::new(self.kind.name(), content, show_to_user);
        if let Some(metadata) = metadata {
            response = response.with_metadata(metadata);
        }
        Ok(response)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::{ChatRole, LLMError};
    use sdk::types::{ConversationMessage, ItemState, ProjectState};

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

    struct FailingProvider;

    #[async_trait]
    impl LLMProvider for FailingProvider {
        fn name(&self) -> &str {
            "failing"
        }

        async fn generate(&self, _messages: &[ChatMessage]) -> crate::llm::Result<String> {
            Err(LLMError::NetworkError("connection refused".to_string()))
        }
    }

    fn request(kind: AgentKind) -> AgentRequest {
        AgentRequest {
            kind,
            action: "respond".to_string(),
            message: "Let's use PostgreSQL".to_string(),
            history: vec![ConversationMessage::user("earlier message")],
            project_state: ProjectState::default(),
            extra_context: vec![],
        }
    }

    #[tokio::test]
    async fn test_conversation_reply_shown_to_user() {
        let agent = LlmAgent::new(
            AgentKind::Conversation,
            Arc::new(CannedProvider {
                reply: "Sounds good, PostgreSQL it is.".to_string(),
            }),
        );
        let response = agent.invoke(request(AgentKind::Conversation)).await.unwrap();
        assert!(response.show_to_user);
        assert!(response.metadata.is_none());
    }

    #[tokio::test]
    async fn test_recorder_metadata_extracted() {
        let agent = LlmAgent::new(
            AgentKind::Recorder,
            Arc::new(CannedProvider {
                reply: r#"{"shouldRecord": true, "item": "Use PostgreSQL", "state": "decided", "userQuote": "Let's use PostgreSQL", "confidence": 95}"#.to_string(),
            }),
        );
        let response = agent.invoke(request(AgentKind::Recorder)).await.unwrap();
        assert!(!response.show_to_user);

        let metadata = response.metadata.unwrap();
        assert!(metadata.has_single());
        assert_eq!(metadata.state, Some(ItemState::Decided));
        assert_eq!(metadata.confidence, Some(95));
    }

    #[tokio::test]
    async fn test_unparseable_metadata_is_none() {
        let agent = LlmAgent::new(
            AgentKind::Review,
            Arc::new(CannedProvider {
                reply: "Nothing structured here, just prose.".to_string(),
            }),
        );
        let response = agent.invoke(request(AgentKind::Review)).await.unwrap();
        assert!(response.metadata.is_none());
    }

    #[tokio::test]
    async fn test_provider_failure_maps_to_agent_error() {
        let agent = LlmAgent::new(AgentKind::Recorder, Arc::new(FailingProvider));
        let err = agent.invoke(request(AgentKind::Recorder)).await.unwrap_err();
        match err {
            PipelineError::Agent { agent, reason } => {
                assert_eq!(agent, "recorder");
                assert!(reason.contains("connection refused"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_prompt_assembly_order() {
        let agent = LlmAgent::new(
            AgentKind::Conversation,
            Arc::new(CannedProvider {
                reply: String::new(),
            }),
        );
        let mut req = request(AgentKind::Conversation);
        req.extra_context.push("reference doc summary".to_string());

        let messages = agent.build_messages(&req);
        assert_eq!(messages[0].role, ChatRole::System);
        assert!(messages[0].content.contains("Project State"));
        assert!(messages[0].content.contains("reference doc summary"));
        // History in the middle, triggering message last
        assert_eq!(messages[1].content, "earlier message");
        assert_eq!(messages.last().unwrap().content, "Let's use PostgreSQL");
    }
}
