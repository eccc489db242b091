//! Coordination facade
//!
//! The per-message entry point. Each turn moves through the same states:
//! classify intent, select the plan, run the single designated
//! conversation step synchronously, return the reply — then execute the
//! remaining plan steps and reconciliation in a background task. The
//! reply path never waits on background analysis, and nothing that
//! happens after the reply can surface an error to the caller: background
//! failures are caught, logged, and reported only through the activity
//! trail and the optional background handle.

use crate::agents::AgentKind;
use crate::classifier::IntentClassify;
use crate::store::{ActivityLog, ProjectStore};
use crate::workflow::executor::PlanExecutor;
use crate::workflow::plan::{PlanLibrary, WorkflowStep};
use crate::workflow::reconciler::{ReconcileSummary, Reconciler};
use sdk::errors::PipelineError;
use sdk::types::{AgentResponse, ConversationMessage, ProjectState};
use std::sync::Arc;
use tokio::task::JoinHandle;

/// Per-message input
#[derive(Debug, Clone)]
pub struct TurnRequest {
    pub project_id: String,
    pub user_id: String,
    pub message: String,
}

/// What the caller gets back synchronously
///
/// `updates` reflects only what was reconciled before the call returned —
/// always empty here, since reconciliation is backgrounded. Callers that
/// need the final state poll the store or await the background handle.
#[derive(Debug)]
pub struct TurnResult {
    /// Foreground step outputs (the conversation reply)
    pub responses: Vec<AgentResponse>,

    pub updates: ReconcileSummary,

    /// Label of the selected workflow (the classified intent)
    pub workflow: String,

    pub background: BackgroundHandle,
}

/// Structured completion report of the background phase
#[derive(Debug, Clone, Default)]
pub struct BackgroundReport {
    /// Background step outputs, in declaration order
    pub responses: Vec<AgentResponse>,

    pub updates: ReconcileSummary,

    /// Set when any background stage failed; the failure was logged and
    /// swallowed, never propagated
    pub error: Option<String>,
}

/// Handle on the background phase of a turn
///
/// Production callers drop it (the task keeps running); tests and the CLI
/// `--wait` path await it to observe the reconciled outcome.
#[derive(Debug)]
pub struct BackgroundHandle {
    handle: Option<JoinHandle<BackgroundReport>>,
}

impl BackgroundHandle {
    fn new(handle: JoinHandle<BackgroundReport>) -> Self {
        Self {
            handle: Some(handle),
        }
    }

    /// Wait for the background phase to finish
    pub async fn join(mut self) -> BackgroundReport {
        match self.handle.take() {
            Some(handle) => match handle.await {
                Ok(report) => report,
                Err(e) => BackgroundReport {
                    error: Some(format!("background task panicked: {}", e)),
                    ..BackgroundReport::default()
                },
            },
            None => BackgroundReport::default(),
        }
    }

    /// Explicitly let the background phase run unobserved
    pub fn detach(mut self) {
        self.handle.take();
    }
}

pub struct Coordinator {
    classifier: Arc<dyn IntentClassify>,
    plans: Arc<PlanLibrary>,
    executor: Arc<PlanExecutor>,
    reconciler: Arc<Reconciler>,
    store: Arc<dyn ProjectStore>,
    activity: Arc<dyn ActivityLog>,

    /// How many trailing messages each turn fetches
    history_limit: usize,
}

impl Coordinator {
    pub fn new(
        classifier: Arc<dyn IntentClassify>,
        plans: Arc<PlanLibrary>,
        executor: Arc<PlanExecutor>,
        reconciler: Arc<Reconciler>,
        store: Arc<dyn ProjectStore>,
        activity: Arc<dyn ActivityLog>,
    ) -> Self {
        Self {
            classifier,
            plans,
            executor,
            reconciler,
            store,
            activity,
            history_limit: 50,
        }
    }

    pub fn with_history_limit(mut self, limit: usize) -> Self {
        self.history_limit = limit;
        self
    }

    /// Process one user message.
    ///
    /// Errors returned here are the only failures the caller ever sees:
    /// classification and plan selection happen before the reply exists.
    pub async fn handle_message(&self, request: TurnRequest) -> Result<TurnResult, PipelineError> {
        let TurnRequest {
            project_id,
            user_id,
            message,
        } = request;

        // Current state and history, fetched before this turn's messages land
        let history = self
            .store
            .recent_messages(&project_id, self.history_limit)
            .await?;
        let items = self.store.get_items(&project_id).await?;
        let project_state = ProjectState::from_items(&items);

        let classification = self.classifier.classify(&message, &history).await?;
        let plan = self.plans.select(classification.intent)?;

        tracing::info!(
            %project_id,
            %user_id,
            intent = classification.intent.as_str(),
            confidence = classification.confidence,
            steps = plan.steps.len(),
            "workflow selected"
        );

        self.store
            .append_message(&project_id, ConversationMessage::user(&message))
            .await?;

        // Exactly one designated conversation step runs in the foreground,
        // regardless of the selected plan
        let immediate = plan
            .immediate_step()
            .cloned()
            .unwrap_or_else(|| WorkflowStep::sequential(AgentKind::Conversation, "respond"));

        let foreground = self
            .executor
            .execute(&[immediate], &message, &project_state, &history, &[])
            .await;

        if let Some(reply) = foreground
            .responses
            .iter()
            .find(|r| r.show_to_user && !r.is_error())
        {
            self.store
                .append_message(&project_id, ConversationMessage::assistant(&reply.message))
                .await?;
        }

        let background = self.spawn_background(
            project_id,
            message,
            classification.intent.as_str().to_string(),
            plan.background_steps(),
            project_state,
            history,
            foreground.responses.clone(),
        );

        Ok(TurnResult {
            responses: foreground.responses,
            updates: ReconcileSummary::default(),
            workflow: classification.intent.as_str().to_string(),
            background,
        })
    }

    /// Fire the background phase: remaining plan steps, then
    /// reconciliation, then the activity record. Every failure is caught
    /// here — the caller already has its reply.
    #[allow(clippy::too_many_arguments)]
    fn spawn_background(
        &self,
        project_id: String,
        message: String,
        workflow: String,
        steps: Vec<WorkflowStep>,
        project_state: ProjectState,
        history: Vec<ConversationMessage>,
        foreground_responses: Vec<AgentResponse>,
    ) -> BackgroundHandle {
        let executor = Arc::clone(&self.executor);
        let reconciler = Arc::clone(&self.reconciler);
        let activity = Arc::clone(&self.activity);

        let handle = tokio::spawn(async move {
            let mut report = BackgroundReport::default();

            let outcome = executor
                .execute(&steps, &message, &project_state, &history, &[])
                .await;
            if outcome.aborted {
                tracing::warn!(%project_id, "background plan aborted after a step failure");
            }
            report.responses = outcome.responses;

            // Reconcile everything this turn produced, foreground included
            let mut all_responses = foreground_responses;
            all_responses.extend(report.responses.iter().cloned());

            match reconciler
                .reconcile(&project_id, &all_responses, &message)
                .await
            {
                Ok(updates) => {
                    report.updates = updates;
                    let details = serde_json::to_string(&updates).unwrap_or_default();
                    activity
                        .record(&project_id, "coordinator", &format!("workflow:{}", workflow), &details)
                        .await;
                }
                Err(e) => {
                    // Logged and swallowed; the reply has already been
                    // delivered
                    tracing::error!(%project_id, "background reconciliation failed: {}", e);
                    report.error = Some(e.to_string());
                    activity
                        .record(
                            &project_id,
                            "coordinator",
                            &format!("workflow_error:{}", workflow),
                            &e.to_string(),
                        )
                        .await;
                }
            }

            report
        });

        BackgroundHandle::new(handle)
    }
}
