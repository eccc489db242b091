//! Workflow Orchestration
//!
//! Turns a classified user message into executed agent work: plan
//! selection, per-consumer context pruning, step execution with
//! parallel-group semantics, and reconciliation of recordable output into
//! the persisted project item list. The coordinator ties the stages
//! together and owns the foreground/background split.

pub mod coordinator;
pub mod executor;
pub mod plan;
pub mod pruner;
pub mod reconciler;

pub use coordinator::{BackgroundHandle, BackgroundReport, Coordinator, TurnRequest, TurnResult};
pub use executor::{ExecutionOutcome, PlanExecutor};
pub use plan::{PlanLibrary, StepCondition, WorkflowPlan, WorkflowStep};
pub use pruner::{ContextPruner, PrunedContext, PruneStats, PruningStrategy};
pub use reconciler::{ReconcileSummary, Reconciler};
