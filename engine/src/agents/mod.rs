//! Agent registry and invocation
//!
//! Agents are the specialized workers a workflow plan is made of: a
//! conversation agent that produces the user-visible reply, a recorder that
//! extracts durable decisions, and the background analysts. The set is a
//! closed enum — a plan cannot name an agent that does not exist — and the
//! registry mapping each kind to its invoker is built explicitly at
//! startup and passed in, so executors are testable without process-wide
//! state. Unknown or duplicate registrations are rejected when the
//! registry is built, not when a step runs.

use async_trait::async_trait;
use sdk::errors::PipelineError;
use sdk::types::{AgentResponse, ConversationMessage, ProjectState};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

pub mod llm_agent;

pub use llm_agent::LlmAgent;

use crate::workflow::plan::PlanLibrary;

/// The closed set of agent kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AgentKind {
    /// Produces the immediate user-visible reply
    Conversation,

    /// Extracts a single durable decision from the current message
    Recorder,

    /// Detects missing information and open questions
    GapAnalysis,

    /// Reviews the conversation for multiple recordable items
    Review,

    /// Investigates a topic in depth
    Research,

    /// Connects the discussion to referenced material
    Reference,
}

impl AgentKind {
    /// Wire name; also the consumer name used by the pruning rule table
    pub fn name(&self) -> &'static str {
        match self {
            AgentKind::Conversation => "conversation",
            AgentKind::Recorder => "recorder",
            AgentKind::GapAnalysis => "gap_analysis",
            AgentKind::Review => "review",
            AgentKind::Research => "research",
            AgentKind::Reference => "reference",
        }
    }
}

impl fmt::Display for AgentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Everything an agent invocation needs
///
/// `history` is already pruned for this agent; the executor never hands an
/// agent the full conversation.
#[derive(Debug, Clone)]
pub struct AgentRequest {
    pub kind: AgentKind,

    /// Plan-declared action verb (e.g. "respond", "record_decision")
    pub action: String,

    /// The triggering user message
    pub message: String,

    /// Pruned conversation history
    pub history: Vec<ConversationMessage>,

    /// Current derived project state
    pub project_state: ProjectState,

    /// Extra context strings supplied by the caller
    pub extra_context: Vec<String>,
}

/// The agent invocation boundary
///
/// Implementations may be backed by an LLM call, a rule engine, or a test
/// double; the pipeline only sees this trait.
#[async_trait]
pub trait AgentInvoker: Send + Sync {
    async fn invoke(&self, request: AgentRequest) -> Result<AgentResponse, PipelineError>;
}

/// Explicitly constructed agent registry
///
/// Built once at startup and shared by reference. No global singleton: a
/// `PlanExecutor` gets its registry passed in.
#[derive(Default)]
pub struct AgentRegistry {
    agents: HashMap<AgentKind, Arc<dyn AgentInvoker>>,
}

impl AgentRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an invoker for a kind. Duplicate registration is a
    /// configuration error.
    pub fn register(
        &mut self,
        kind: AgentKind,
        invoker: Arc<dyn AgentInvoker>,
    ) -> Result<(), PipelineError> {
        if self.agents.contains_key(&kind) {
            return Err(PipelineError::DuplicateAgent(kind.name().to_string()));
        }
        self.agents.insert(kind, invoker);
        Ok(())
    }

    /// Resolve the invoker for a kind
    pub fn resolve(&self, kind: AgentKind) -> Result<Arc<dyn AgentInvoker>, PipelineError> {
        self.agents
            .get(&kind)
            .cloned()
            .ok_or_else(|| PipelineError::AgentNotRegistered(kind.name().to_string()))
    }

    /// Verify that every agent named by any plan in the library is
    /// registered. Run at startup so missing agents fail fast instead of
    /// at call time.
    pub fn validate(&self, library: &PlanLibrary) -> Result<(), PipelineError> {
        for plan in library.plans() {
            for step in &plan.steps {
                if !self.agents.contains_key(&step.agent) {
                    return Err(PipelineError::AgentNotRegistered(
                        step.agent.name().to_string(),
                    ));
                }
            }
        }
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.agents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.agents.is_empty()
    }
}
