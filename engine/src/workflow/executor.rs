//! Plan execution
//!
//! Walks a workflow plan in declared order, grouping maximal runs of
//! adjacent parallel steps into concurrent batches with barrier semantics:
//! a sequential step never starts before every member of the preceding
//! batch has settled. Outputs are concatenated in step-declaration order,
//! never completion order, so downstream consumers see a deterministic
//! sequence regardless of which parallel member finished first.
//!
//! "Parallel" here means concurrent tokio tasks multiplexed on the
//! runtime — the only blocking work is the external agent calls.

use crate::agents::{AgentRegistry, AgentRequest};
use crate::workflow::plan::{WorkflowPlan, WorkflowStep};
use crate::workflow::pruner::ContextPruner;
use futures::future::join_all;
use sdk::errors::PipelineError;
use sdk::types::{AgentResponse, ConversationMessage, ProjectState};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::time::timeout;

/// Result of executing a plan (or a slice of one)
#[derive(Debug, Clone)]
pub struct ExecutionOutcome {
    /// Step outputs in declaration order. Skipped steps emit nothing;
    /// failed steps emit an error-tagged response.
    pub responses: Vec<AgentResponse>,

    /// True when a sequential step failed and the remainder of the plan
    /// was not run. The collected outputs are still complete up to that
    /// point.
    pub aborted: bool,
}

pub struct PlanExecutor {
    registry: Arc<AgentRegistry>,
    pruner: Arc<ContextPruner>,
    step_timeout: Duration,
}

impl PlanExecutor {
    pub fn new(
        registry: Arc<AgentRegistry>,
        pruner: Arc<ContextPruner>,
        step_timeout: Duration,
    ) -> Self {
        Self {
            registry,
            pruner,
            step_timeout,
        }
    }

    /// Execute a whole plan
    pub async fn execute_plan(
        &self,
        plan: &WorkflowPlan,
        message: &str,
        project_state: &ProjectState,
        history: &[ConversationMessage],
        extra_context: &[String],
    ) -> ExecutionOutcome {
        self.execute(&plan.steps, message, project_state, history, extra_context)
            .await
    }

    /// Execute an ordered list of steps
    pub async fn execute(
        &self,
        steps: &[WorkflowStep],
        message: &str,
        project_state: &ProjectState,
        history: &[ConversationMessage],
        extra_context: &[String],
    ) -> ExecutionOutcome {
        let mut responses: Vec<AgentResponse> = Vec::new();
        let mut aborted = false;

        let mut i = 0;
        while i < steps.len() {
            if steps[i].parallel {
                // Maximal run of adjacent parallel steps
                let mut j = i;
                while j < steps.len() && steps[j].parallel {
                    j += 1;
                }
                let batch = &steps[i..j];

                // Conditions resolve against the snapshot before the batch
                let runnable: Vec<&WorkflowStep> = batch
                    .iter()
                    .filter(|step| self.condition_holds(step, project_state, &responses))
                    .collect();

                tracing::debug!(
                    batch_size = batch.len(),
                    runnable = runnable.len(),
                    "executing parallel batch"
                );

                // Barrier: wait for every member to settle before moving on.
                // join_all yields results in input order, which is the
                // declaration order of the batch.
                let settled = join_all(runnable.iter().map(|step| {
                    self.run_step(step, message, project_state, history, extra_context)
                }))
                .await;

                for (response, _ok) in settled {
                    responses.push(response);
                }

                i = j;
            } else {
                let step = &steps[i];
                i += 1;

                if !self.condition_holds(step, project_state, &responses) {
                    tracing::debug!(agent = step.agent.name(), "condition false, step skipped");
                    continue;
                }

                let (response, ok) = self
                    .run_step(step, message, project_state, history, extra_context)
                    .await;
                responses.push(response);

                if !ok {
                    // A failed sequential step aborts the remainder of the
                    // plan; outputs collected so far are preserved.
                    tracing::warn!(
                        agent = step.agent.name(),
                        "sequential step failed, aborting remaining steps"
                    );
                    aborted = true;
                    break;
                }
            }
        }

        ExecutionOutcome { responses, aborted }
    }

    fn condition_holds(
        &self,
        step: &WorkflowStep,
        project_state: &ProjectState,
        outputs: &[AgentResponse],
    ) -> bool {
        step.condition
            .map(|c| c.evaluate(project_state, outputs))
            .unwrap_or(true)
    }

    /// Run one step: prune its context, invoke its agent, bound the call
    /// with the per-step timeout. Failures and timeouts degrade to an
    /// error-tagged response; the bool reports whether the step succeeded.
    async fn run_step(
        &self,
        step: &WorkflowStep,
        message: &str,
        project_state: &ProjectState,
        history: &[ConversationMessage],
        extra_context: &[String],
    ) -> (AgentResponse, bool) {
        let start = Instant::now();
        let agent_name = step.agent.name();

        let invoker = match self.registry.resolve(step.agent) {
            Ok(invoker) => invoker,
            Err(e) => return (AgentResponse::step_error(agent_name, &e), false),
        };

        let pruned = self.pruner.prune(agent_name, history, project_state);

        let request = AgentRequest {
            kind: step.agent,
            action: step.action.clone(),
            message: message.to_string(),
            history: pruned.history,
            project_state: project_state.clone(),
            extra_context: extra_context.to_vec(),
        };

        match timeout(self.step_timeout, invoker.invoke(request)).await {
            Ok(Ok(response)) => {
                tracing::debug!(
                    agent = agent_name,
                    elapsed_ms = start.elapsed().as_millis() as u64,
                    "step completed"
                );
                (response, true)
            }
            Ok(Err(e)) => {
                tracing::warn!(agent = agent_name, "step failed: {}", e);
                (AgentResponse::step_error(agent_name, &e), false)
            }
            Err(_) => {
                let e = PipelineError::StepTimeout {
                    agent: agent_name.to_string(),
                    seconds: self.step_timeout.as_secs(),
                };
                tracing::warn!(agent = agent_name, "step timed out");
                (AgentResponse::step_error(agent_name, &e), false)
            }
        }
    }
}
