//! Command handlers for CLI operations
//!
//! This module implements the handlers for all CLI commands and the wiring
//! that assembles the pipeline: database, LLM provider, agent registry,
//! plan library, and coordinator.

use anyhow::{Context, Result};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;

use crate::agents::{AgentKind, AgentRegistry, LlmAgent};
use crate::classifier::LlmIntentClassifier;
use crate::config::Config;
use crate::llm::openai::OpenAiCompatProvider;
use crate::llm::LLMProvider;
use crate::store::{ActivityLog, Database, ProjectStore, SqliteStore};
use crate::workflow::{
    ContextPruner, Coordinator, PlanExecutor, PlanLibrary, Reconciler, TurnRequest,
};

/// Output format for command results
#[derive(Debug, Clone, Copy)]
pub enum OutputFormat {
    /// Human-readable text output
    Text,
    /// JSON output for machine consumption
    Json,
}

/// Assemble the full pipeline from configuration
async fn build_coordinator(config: &Config) -> Result<(Coordinator, SqliteStore)> {
    let database = Database::new(&config.db_path())
        .await
        .context("Failed to open database")?;
    let store = SqliteStore::new(database.pool().clone());

    let provider: Arc<dyn LLMProvider> =
        Arc::new(OpenAiCompatProvider::new(config.llm.clone()));

    let mut registry = AgentRegistry::new();
    for kind in [
        AgentKind::Conversation,
        AgentKind::Recorder,
        AgentKind::GapAnalysis,
        AgentKind::Review,
        AgentKind::Research,
        AgentKind::Reference,
    ] {
        registry.register(kind, Arc::new(LlmAgent::new(kind, Arc::clone(&provider))))?;
    }

    let plans = PlanLibrary::default();
    // Fail fast on wiring mistakes before the first message arrives
    registry.validate(&plans)?;

    let pruner = Arc::new(ContextPruner::new(
        config.pruning.rules.clone(),
        config.pruning.default_window,
    ));

    let executor = Arc::new(PlanExecutor::new(
        Arc::new(registry),
        pruner,
        Duration::from_secs(config.workflow.step_timeout_secs),
    ));

    let store_arc: Arc<dyn ProjectStore> = Arc::new(store.clone());
    let activity: Arc<dyn ActivityLog> = Arc::new(store.clone());
    let reconciler = Arc::new(Reconciler::new(Arc::clone(&store_arc)));

    let classifier = Arc::new(LlmIntentClassifier::new(
        provider,
        config.workflow.classifier_window,
    ));

    let coordinator = Coordinator::new(
        classifier,
        Arc::new(plans),
        executor,
        reconciler,
        store_arc,
        activity,
    );

    Ok((coordinator, store))
}

/// Send one message through the pipeline.
///
/// The reply is printed as soon as the foreground step returns; the
/// process then waits for the background phase so its work is not killed
/// by exit, and reports what was reconciled.
pub async fn handle_chat(
    project: String,
    message: String,
    config: &Config,
    format: OutputFormat,
) -> Result<()> {
    let (coordinator, _store) = build_coordinator(config).await?;

    let result = coordinator
        .handle_message(TurnRequest {
            project_id: project.clone(),
            user_id: whoami(),
            message,
        })
        .await?;

    match format {
        OutputFormat::Text => {
            for response in result.responses.iter().filter(|r| r.show_to_user) {
                println!("{}", response.message);
            }
        }
        OutputFormat::Json => {
            println!(
                "{}",
                json!({
                    "workflow": result.workflow,
                    "responses": result.responses,
                    "updates": result.updates,
                })
            );
        }
    }

    // A CLI invocation is its own process: wait for the background phase
    // instead of letting exit abort it. Library embedders are free to drop
    // the handle.
    let report = result.background.join().await;

    match format {
        OutputFormat::Text => {
            if report.updates.total() > 0 {
                println!(
                    "[recorded: {} added, {} moved, {} updated]",
                    report.updates.items_added,
                    report.updates.items_moved,
                    report.updates.items_modified
                );
            }
            if let Some(error) = &report.error {
                eprintln!("[background analysis failed: {}]", error);
            }
        }
        OutputFormat::Json => {
            println!(
                "{}",
                json!({
                    "background": {
                        "updates": report.updates,
                        "error": report.error,
                    }
                })
            );
        }
    }

    Ok(())
}

/// Show a project's items grouped by state
pub async fn handle_items(project: String, config: &Config, format: OutputFormat) -> Result<()> {
    let (_coordinator, store) = build_coordinator(config).await?;

    let items = store.get_items(&project).await?;
    let state = sdk::types::ProjectState::from_items(&items);

    match format {
        OutputFormat::Text => {
            if state.is_empty() {
                println!("No items recorded for project '{}'.", project);
                return Ok(());
            }
            for (title, bucket) in [
                ("Decided", &state.decided),
                ("Exploring", &state.exploring),
                ("Parked", &state.parked),
            ] {
                if bucket.is_empty() {
                    continue;
                }
                println!("{} ({}):", title, bucket.len());
                for item in bucket {
                    match &item.citation {
                        Some(c) => println!("  - {} ({}%, \"{}\")", item.text, c.confidence, c.user_quote),
                        None => println!("  - {}", item.text),
                    }
                }
            }
        }
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(&state)?);
        }
    }

    Ok(())
}

/// Show recent conversation history
pub async fn handle_history(
    project: String,
    limit: usize,
    config: &Config,
    format: OutputFormat,
) -> Result<()> {
    let (_coordinator, store) = build_coordinator(config).await?;
    let messages = store.recent_messages(&project, limit).await?;

    match format {
        OutputFormat::Text => {
            if messages.is_empty() {
                println!("No messages for project '{}'.", project);
            }
            for msg in &messages {
                println!("[{}] {}: {}", msg.created_at.format("%Y-%m-%d %H:%M"), msg.role, msg.content);
            }
        }
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(&messages)?);
        }
    }

    Ok(())
}

/// Show the recent activity trail
pub async fn handle_activity(
    project: String,
    limit: usize,
    config: &Config,
    format: OutputFormat,
) -> Result<()> {
    let (_coordinator, store) = build_coordinator(config).await?;
    let entries = store.recent_activity(&project, limit).await?;

    match format {
        OutputFormat::Text => {
            if entries.is_empty() {
                println!("No activity for project '{}'.", project);
            }
            for entry in &entries {
                println!(
                    "[{}] {} {} {}",
                    entry.created_at.format("%Y-%m-%d %H:%M:%S"),
                    entry.agent,
                    entry.action,
                    entry.details
                );
            }
        }
        OutputFormat::Json => {
            let rendered: Vec<serde_json::Value> = entries
                .iter()
                .map(|e| {
                    json!({
                        "agent": e.agent,
                        "action": e.action,
                        "details": e.details,
                        "createdAt": e.created_at,
                    })
                })
                .collect();
            println!("{}", serde_json::to_string_pretty(&rendered)?);
        }
    }

    Ok(())
}

fn whoami() -> String {
    std::env::var("USER").unwrap_or_else(|_| "local".to_string())
}
