//! Workflow plans
//!
//! A plan is an ordered list of steps selected for one classified intent.
//! Steps are pure declarations: which agent, which action verb, whether the
//! step belongs to a parallel group, and an optional condition. Plans are
//! constructed fresh per request from a static table; nothing here is
//! persisted or versioned at runtime.

use crate::agents::AgentKind;
use crate::classifier::Intent;
use sdk::errors::PipelineError;
use sdk::types::{AgentResponse, ProjectState};
use std::collections::HashMap;

/// Closed set of step predicates
///
/// Evaluated against the execution snapshot: the derived project state and
/// the outputs collected so far in this run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepCondition {
    /// The project has at least one exploring item
    HasExploringItems,

    /// The project has at least one decided item
    HasDecidedItems,

    /// Some earlier step in this run produced recordable metadata
    RecordableOutputSeen,
}

impl StepCondition {
    pub fn evaluate(&self, state: &ProjectState, outputs: &[AgentResponse]) -> bool {
        match self {
            StepCondition::HasExploringItems => !state.exploring.is_empty(),
            StepCondition::HasDecidedItems => !state.decided.is_empty(),
            StepCondition::RecordableOutputSeen => outputs.iter().any(|r| {
                r.metadata
                    .as_ref()
                    .map(|m| m.has_single() || m.has_batch())
                    .unwrap_or(false)
            }),
        }
    }
}

/// One declared step of a workflow plan
///
/// `parallel == true` marks membership in a maximal run of adjacent
/// parallel steps; a sequential step both closes any open parallel group
/// and runs after all of that group's members have settled.
#[derive(Debug, Clone, PartialEq)]
pub struct WorkflowStep {
    pub agent: AgentKind,

    /// Action verb handed to the agent (e.g. "record_decision")
    pub action: String,

    pub parallel: bool,

    pub condition: Option<StepCondition>,
}

impl WorkflowStep {
    pub fn sequential(agent: AgentKind, action: impl Into<String>) -> Self {
        Self {
            agent,
            action: action.into(),
            parallel: false,
            condition: None,
        }
    }

    pub fn parallel(agent: AgentKind, action: impl Into<String>) -> Self {
        Self {
            agent,
            action: action.into(),
            parallel: true,
            condition: None,
        }
    }

    pub fn when(mut self, condition: StepCondition) -> Self {
        self.condition = Some(condition);
        self
    }
}

/// An ordered list of steps selected for one intent
#[derive(Debug, Clone, PartialEq)]
pub struct WorkflowPlan {
    pub intent: Intent,
    pub steps: Vec<WorkflowStep>,
}

impl WorkflowPlan {
    pub fn new(intent: Intent, steps: Vec<WorkflowStep>) -> Self {
        Self { intent, steps }
    }

    /// The designated immediate step: the first Conversation step.
    ///
    /// The coordinator runs exactly one conversation step synchronously
    /// regardless of the plan; plans without one get a synthesized default.
    pub fn immediate_step(&self) -> Option<&WorkflowStep> {
        self.steps
            .iter()
            .find(|s| s.agent == AgentKind::Conversation)
    }

    /// Every step except the designated immediate one, in declared order
    pub fn background_steps(&self) -> Vec<WorkflowStep> {
        let immediate = self
            .steps
            .iter()
            .position(|s| s.agent == AgentKind::Conversation);
        self.steps
            .iter()
            .enumerate()
            .filter(|(i, _)| Some(*i) != immediate)
            .map(|(_, s)| s.clone())
            .collect()
    }
}

/// Static intent -> plan table
///
/// Hand-authored; no dynamic plan synthesis. Selecting an intent with no
/// mapping is a configuration error, surfaced synchronously before
/// anything executes.
pub struct PlanLibrary {
    plans: HashMap<Intent, WorkflowPlan>,
}

impl PlanLibrary {
    /// Build a library from explicit plans (used by tests and deployments
    /// that override the defaults)
    pub fn with_plans(plans: Vec<WorkflowPlan>) -> Self {
        Self {
            plans: plans.into_iter().map(|p| (p.intent, p)).collect(),
        }
    }

    /// Select the plan for an intent, failing fast when no mapping exists
    pub fn select(&self, intent: Intent) -> Result<&WorkflowPlan, PipelineError> {
        self.plans
            .get(&intent)
            .ok_or_else(|| PipelineError::MissingPlan(intent.as_str().to_string()))
    }

    pub fn plans(&self) -> impl Iterator<Item = &WorkflowPlan> {
        self.plans.values()
    }
}

impl Default for PlanLibrary {
    fn default() -> Self {
        use AgentKind::*;

        let plans = vec![
            WorkflowPlan::new(
                Intent::Brainstorming,
                vec![
                    WorkflowStep::sequential(Conversation, "respond"),
                    WorkflowStep::parallel(Research, "explore_options"),
                    WorkflowStep::parallel(GapAnalysis, "find_gaps"),
                    WorkflowStep::sequential(Review, "capture_explorations"),
                ],
            ),
            WorkflowPlan::new(
                Intent::Deciding,
                vec![
                    WorkflowStep::sequential(Conversation, "respond"),
                    WorkflowStep::sequential(Recorder, "record_decision"),
                ],
            ),
            WorkflowPlan::new(
                Intent::Modifying,
                vec![
                    WorkflowStep::sequential(Conversation, "respond"),
                    WorkflowStep::sequential(Recorder, "record_state_change"),
                ],
            ),
            WorkflowPlan::new(
                Intent::Exploring,
                vec![
                    WorkflowStep::sequential(Conversation, "respond"),
                    WorkflowStep::parallel(Research, "explore_topic"),
                    WorkflowStep::parallel(GapAnalysis, "find_gaps"),
                    WorkflowStep::sequential(Recorder, "capture_exploration"),
                ],
            ),
            WorkflowPlan::new(
                Intent::Parking,
                vec![
                    WorkflowStep::sequential(Conversation, "respond"),
                    WorkflowStep::sequential(Recorder, "park_item"),
                ],
            ),
            WorkflowPlan::new(
                Intent::Reviewing,
                vec![
                    WorkflowStep::sequential(Conversation, "respond"),
                    WorkflowStep::sequential(Review, "sweep_conversation"),
                    WorkflowStep::sequential(GapAnalysis, "find_gaps")
                        .when(StepCondition::HasExploringItems),
                ],
            ),
            WorkflowPlan::new(
                Intent::DocumentResearch,
                vec![
                    WorkflowStep::sequential(Conversation, "respond"),
                    WorkflowStep::sequential(Research, "document_research"),
                    WorkflowStep::sequential(Recorder, "capture_findings"),
                ],
            ),
            WorkflowPlan::new(
                Intent::ReferenceIntegration,
                vec![
                    WorkflowStep::sequential(Conversation, "respond"),
                    WorkflowStep::sequential(Reference, "integrate_reference"),
                    WorkflowStep::sequential(Recorder, "capture_reference")
                        .when(StepCondition::RecordableOutputSeen),
                ],
            ),
            WorkflowPlan::new(
                Intent::General,
                vec![
                    WorkflowStep::sequential(Conversation, "respond"),
                    WorkflowStep::sequential(GapAnalysis, "find_gaps")
                        .when(StepCondition::HasExploringItems),
                ],
            ),
        ];

        Self::with_plans(plans)
    }
}
