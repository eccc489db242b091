//! Reconciliation
//!
//! Turns structured agent output into persisted project-item mutations.
//! Responses are scanned in order for the two recordable metadata shapes:
//! the batch form (`itemsToRecord`) and the single form (`shouldRecord` +
//! `item`). Everything else is a no-op.
//!
//! Items are only ever appended. The item list is fetched once per run and
//! all resulting items land in one `append_items` call, so a run either
//! records everything it found or nothing. State changes are expressed by
//! re-appending an item's text with the new state; the newest occurrence
//! of a text wins on read.

use crate::store::ProjectStore;
use chrono::Utc;
use sdk::errors::PipelineError;
use sdk::types::{AgentResponse, Citation, ItemState, ProjectItem, RecordInstruction};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;

/// What a reconciliation run changed
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ReconcileSummary {
    /// Items whose text was new to the project
    pub items_added: usize,

    /// Re-recordings of an existing text in the same state (citation
    /// refresh)
    pub items_modified: usize,

    /// Re-recordings of an existing text under a different state
    pub items_moved: usize,
}

impl ReconcileSummary {
    pub fn total(&self) -> usize {
        self.items_added + self.items_modified + self.items_moved
    }
}

/// Marker for items recorded through the batch path
const BATCH_SOURCE: &str = "batch";

pub struct Reconciler {
    store: Arc<dyn ProjectStore>,
}

impl Reconciler {
    pub fn new(store: Arc<dyn ProjectStore>) -> Self {
        Self { store }
    }

    /// Apply the recordable instructions found in `responses`.
    ///
    /// `user_message` is the triggering user message; it becomes the
    /// citation quote whenever an agent supplied none, which keeps the
    /// decided-items-carry-a-quote invariant without trusting agents to
    /// remember it.
    pub async fn reconcile(
        &self,
        project_id: &str,
        responses: &[AgentResponse],
        user_message: &str,
    ) -> Result<ReconcileSummary, PipelineError> {
        let existing = self.store.get_items(project_id).await?;

        // Latest state per normalized text; later appends shadow earlier ones
        let mut known: HashMap<String, ItemState> = HashMap::new();
        for item in &existing {
            known.insert(normalize(&item.text), item.state);
        }

        let mut summary = ReconcileSummary::default();
        let mut new_items: Vec<ProjectItem> = Vec::new();

        for response in responses {
            let Some(metadata) = &response.metadata else {
                continue;
            };

            if metadata.has_batch() {
                let instructions = metadata.items_to_record.as_deref().unwrap_or_default();
                tracing::debug!(
                    agent = response.agent.as_str(),
                    count = instructions.len(),
                    "applying batch recording"
                );
                for instruction in instructions {
                    let item = build_item(instruction, user_message, Some(BATCH_SOURCE));
                    tally(&mut summary, &mut known, &item);
                    new_items.push(item);
                }
            } else if metadata.has_single() {
                let instruction = RecordInstruction {
                    item: metadata.item.clone().unwrap_or_default(),
                    state: metadata.state.unwrap_or(ItemState::Exploring),
                    user_quote: metadata.user_quote.clone(),
                    confidence: metadata.confidence,
                };
                tracing::debug!(
                    agent = response.agent.as_str(),
                    state = instruction.state.as_str(),
                    "applying single recording"
                );
                let item = build_item(&instruction, user_message, Some(&response.agent));
                tally(&mut summary, &mut known, &item);
                new_items.push(item);
            } else {
                // Neither shape: nothing to do for this response
                tracing::debug!(agent = response.agent.as_str(), "no recordable metadata");
            }
        }

        if new_items.is_empty() {
            return Ok(summary);
        }

        self.store.append_items(project_id, new_items).await?;

        tracing::info!(
            project_id,
            added = summary.items_added,
            modified = summary.items_modified,
            moved = summary.items_moved,
            "reconciliation complete"
        );

        Ok(summary)
    }
}

fn normalize(text: &str) -> String {
    text.trim().to_lowercase()
}

fn build_item(
    instruction: &RecordInstruction,
    user_message: &str,
    source: Option<&str>,
) -> ProjectItem {
    let quote = instruction
        .user_quote
        .clone()
        .filter(|q| !q.is_empty())
        .unwrap_or_else(|| user_message.to_string());

    ProjectItem::new(
        instruction.item.clone(),
        instruction.state,
        Some(Citation {
            user_quote: quote,
            timestamp: Utc::now(),
            confidence: instruction.confidence.unwrap_or(100).min(100),
            source: source.map(|s| s.to_string()),
        }),
    )
}

fn tally(
    summary: &mut ReconcileSummary,
    known: &mut HashMap<String, ItemState>,
    item: &ProjectItem,
) {
    let key = normalize(&item.text);
    match known.get(&key) {
        None => summary.items_added += 1,
        Some(state) if *state == item.state => summary.items_modified += 1,
        Some(_) => summary.items_moved += 1,
    }
    known.insert(key, item.state);
}
