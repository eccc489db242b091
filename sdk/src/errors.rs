//! Error types and handling
//!
//! This module provides the error types used throughout the Trellis engine.
//! All errors implement the `PipelineErrorExt` trait which provides
//! user-friendly hints and indicates whether errors are recoverable.
//!
//! Configuration errors (a missing plan mapping, an unregistered agent)
//! surface synchronously before any reply is produced; everything that can
//! fail after the reply has been returned is caught in the background task
//! and only ever observable through logs and the activity trail.

use thiserror::Error;

/// Trait for Trellis error extensions
///
/// Provides additional context for errors: a hint safe to display to end
/// users, and whether the error is worth retrying.
pub trait PipelineErrorExt {
    /// Returns a user-friendly hint for the error
    fn user_hint(&self) -> &str;

    /// Returns whether the error is recoverable
    ///
    /// Recoverable errors can be retried or worked around. Non-recoverable
    /// errors are configuration problems that require operator intervention.
    fn is_recoverable(&self) -> bool;
}

/// Main pipeline error type
#[derive(Debug, Error)]
pub enum PipelineError {
    // Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Unknown intent label: {0}")]
    UnknownIntent(String),

    #[error("No workflow plan mapped for intent: {0}")]
    MissingPlan(String),

    #[error("Agent already registered: {0}")]
    DuplicateAgent(String),

    #[error("Agent not registered: {0}")]
    AgentNotRegistered(String),

    // Runtime errors
    #[error("Agent invocation failed ({agent}): {reason}")]
    Agent { agent: String, reason: String },

    #[error("Step timed out after {seconds}s ({agent})")]
    StepTimeout { agent: String, seconds: u64 },

    #[error("Intent classification failed: {0}")]
    Classification(String),

    #[error("LLM provider error: {0}")]
    Llm(String),

    #[error("Persistence error: {0}")]
    Persistence(String),

    // Generic IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl PipelineErrorExt for PipelineError {
    fn user_hint(&self) -> &str {
        match self {
            Self::Config(_) => "Check your config.toml file for errors",
            Self::UnknownIntent(_) => "The message could not be classified. Try rephrasing",
            Self::MissingPlan(_) => "No workflow is configured for this intent. Check the plan table",
            Self::DuplicateAgent(_) => "An agent was registered twice. Check engine wiring",
            Self::AgentNotRegistered(_) => "A plan references an agent that is not registered",
            Self::Agent { .. } => "An agent call failed. Check provider availability",
            Self::StepTimeout { .. } => "An agent took too long to respond. Try again",
            Self::Classification(_) => "Intent classification failed. Check provider availability",
            Self::Llm(_) => "LLM provider unavailable. Check your API key and network",
            Self::Persistence(_) => "Database operation failed. Check the data directory",
            Self::Io(_) => "File system operation failed",
        }
    }

    fn is_recoverable(&self) -> bool {
        match self {
            // Configuration problems need operator intervention
            Self::Config(_)
            | Self::MissingPlan(_)
            | Self::DuplicateAgent(_)
            | Self::AgentNotRegistered(_) => false,

            // Everything else is worth retrying
            _ => true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_errors_not_recoverable() {
        assert!(!PipelineError::MissingPlan("deciding".to_string()).is_recoverable());
        assert!(!PipelineError::AgentNotRegistered("review".to_string()).is_recoverable());
        assert!(!PipelineError::DuplicateAgent("recorder".to_string()).is_recoverable());
    }

    #[test]
    fn test_runtime_errors_recoverable() {
        assert!(PipelineError::StepTimeout {
            agent: "review".to_string(),
            seconds: 60
        }
        .is_recoverable());
        assert!(PipelineError::Llm("connection refused".to_string()).is_recoverable());
        assert!(PipelineError::Persistence("disk full".to_string()).is_recoverable());
    }

    #[test]
    fn test_hints_are_nonempty() {
        let errors = [
            PipelineError::Config("x".to_string()),
            PipelineError::UnknownIntent("x".to_string()),
            PipelineError::MissingPlan("x".to_string()),
            PipelineError::Agent {
                agent: "x".to_string(),
                reason: "y".to_string(),
            },
        ];
        for err in &errors {
            assert!(!err.user_hint().is_empty());
        }
    }

    #[test]
    fn test_display_includes_detail() {
        let err = PipelineError::MissingPlan("deciding".to_string());
        assert!(err.to_string().contains("deciding"));

        let err = PipelineError::StepTimeout {
            agent: "review".to_string(),
            seconds: 60,
        };
        assert!(err.to_string().contains("60"));
        assert!(err.to_string().contains("review"));
    }
}
