//! Context pruning
//!
//! Each agent sees a reduced slice of the conversation tailored to its
//! needs, so per-step context stays inside model token budgets. Strategies
//! are selected per consumer from an injected rule table; pruning itself is
//! a pure function of its inputs — no hidden state, no randomness, and no
//! mutation of the history it is given.

use regex::Regex;
use sdk::types::{ConversationMessage, ProjectItem, ProjectState};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::OnceLock;

/// How a consumer's history slice is selected
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "strategy", rename_all = "snake_case")]
pub enum PruningStrategy {
    /// Keep the last `window` messages
    Recency { window: usize },

    /// Keep messages that produced a recorded item or state change, plus
    /// the last 5 messages
    DecisionsOnly,

    /// Keep messages matching task/todo heuristics or quoted by recorded
    /// items, plus the last 10 messages
    TasksOnly,
}

/// Per-call pruning statistics, for logging and tests
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PruneStats {
    pub strategy: &'static str,
    pub total: usize,
    pub kept: usize,
}

/// A pruned history slice plus its stats
#[derive(Debug, Clone)]
pub struct PrunedContext {
    pub history: Vec<ConversationMessage>,
    pub stats: PruneStats,
}

/// Keyword heuristics for the tasks-only strategy
fn task_keyword_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)\b(todo|task|action item|next step|need to|needs to|should|must)\b")
            .expect("task keyword regex is valid")
    })
}

/// Context pruner with an injected rule table
///
/// The consumer -> strategy map comes from configuration, not from code, so
/// deployments and tests can swap strategies freely.
pub struct ContextPruner {
    rules: HashMap<String, PruningStrategy>,
    default_window: usize,
}

impl ContextPruner {
    pub fn new(rules: HashMap<String, PruningStrategy>, default_window: usize) -> Self {
        Self {
            rules,
            default_window,
        }
    }

    /// Strategy for a consumer; unconfigured consumers get the recency
    /// default.
    pub fn strategy_for(&self, consumer: &str) -> PruningStrategy {
        self.rules
            .get(consumer)
            .copied()
            .unwrap_or(PruningStrategy::Recency {
                window: self.default_window,
            })
    }

    /// Reduce `history` to the slice relevant to `consumer`
    pub fn prune(
        &self,
        consumer: &str,
        history: &[ConversationMessage],
        state: &ProjectState,
    ) -> PrunedContext {
        let strategy = self.strategy_for(consumer);

        let (kept, name) = match strategy {
            PruningStrategy::Recency { window } => (Self::recency(history, window), "recency"),
            PruningStrategy::DecisionsOnly => {
                (Self::filtered_union(history, state, 5, Self::produced_record), "decisions_only")
            }
            PruningStrategy::TasksOnly => {
                (Self::filtered_union(history, state, 10, Self::task_like), "tasks_only")
            }
        };

        let stats = PruneStats {
            strategy: name,
            total: history.len(),
            kept: kept.len(),
        };

        tracing::debug!(
            consumer,
            strategy = stats.strategy,
            total = stats.total,
            kept = stats.kept,
            "history pruned"
        );

        PrunedContext { history: kept, stats }
    }

    fn recency(history: &[ConversationMessage], window: usize) -> Vec<ConversationMessage> {
        let start = history.len().saturating_sub(window);
        history[start..].to_vec()
    }

    /// Keep messages matching `matches`, union the trailing `tail` window.
    ///
    /// One pass in original order: membership of either set keeps the
    /// message, so deduplication by identity and stable (non-re-sorted)
    /// ordering fall out of the walk itself.
    fn filtered_union(
        history: &[ConversationMessage],
        state: &ProjectState,
        tail: usize,
        matches: fn(&ConversationMessage, &[&ProjectItem]) -> bool,
    ) -> Vec<ConversationMessage> {
        let items: Vec<&ProjectItem> = state
            .decided
            .iter()
            .chain(state.exploring.iter())
            .chain(state.parked.iter())
            .collect();

        let tail_start = history.len().saturating_sub(tail);

        history
            .iter()
            .enumerate()
            .filter(|(i, msg)| *i >= tail_start || matches(msg, &items))
            .map(|(_, msg)| msg.clone())
            .collect()
    }

    /// Did this message produce a recorded item or state change?
    ///
    /// A message qualifies when a recorded item's citation quotes it, or
    /// when the message was stamped with a recorded-item id.
    fn produced_record(msg: &ConversationMessage, items: &[&ProjectItem]) -> bool {
        if let Some(metadata) = &msg.metadata {
            if metadata.get("recordedItemId").is_some() {
                return true;
            }
        }

        items.iter().any(|item| {
            item.citation
                .as_ref()
                .map(|c| !c.user_quote.is_empty() && msg.content.contains(&c.user_quote))
                .unwrap_or(false)
        })
    }

    /// Does this message look like task/todo talk, or is it quoted by a
    /// recorded item?
    fn task_like(msg: &ConversationMessage, items: &[&ProjectItem]) -> bool {
        task_keyword_regex().is_match(&msg.content) || Self::produced_record(msg, items)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use sdk::types::{Citation, ItemState};

    fn history_of(contents: &[&str]) -> Vec<ConversationMessage> {
        contents
            .iter()
            .map(|c| ConversationMessage::user(*c))
            .collect()
    }

    fn pruner_with(consumer: &str, strategy: PruningStrategy) -> ContextPruner {
        let mut rules = HashMap::new();
        rules.insert(consumer.to_string(), strategy);
        ContextPruner::new(rules, 20)
    }

    #[test]
    fn test_recency_window() {
        let pruner = pruner_with("conversation", PruningStrategy::Recency { window: 3 });
        let history = history_of(&["a", "b", "c", "d", "e"]);

        let pruned = pruner.prune("conversation", &history, &ProjectState::default());
        let contents: Vec<&str> = pruned.history.iter().map(|m| m.content.as_str()).collect();
        assert_eq!(contents, vec!["c", "d", "e"]);
        assert_eq!(pruned.stats.total, 5);
        assert_eq!(pruned.stats.kept, 3);
    }

    #[test]
    fn test_recency_shorter_than_window() {
        let pruner = pruner_with("conversation", PruningStrategy::Recency { window: 10 });
        let history = history_of(&["a", "b"]);
        let pruned = pruner.prune("conversation", &history, &ProjectState::default());
        assert_eq!(pruned.history.len(), 2);
    }

    #[test]
    fn test_default_strategy_for_unknown_consumer() {
        let pruner = ContextPruner::new(HashMap::new(), 20);
        assert_eq!(
            pruner.strategy_for("anything"),
            PruningStrategy::Recency { window: 20 }
        );

        let history: Vec<ConversationMessage> = (0..30)
            .map(|i| ConversationMessage::user(format!("m{}", i)))
            .collect();
        let pruned = pruner.prune("anything", &history, &ProjectState::default());
        assert_eq!(pruned.history.len(), 20);
        assert_eq!(pruned.history[0].content, "m10");
    }

    #[test]
    fn test_decisions_only_keeps_cited_messages() {
        let pruner = pruner_with("recorder", PruningStrategy::DecisionsOnly);

        // 12 messages; the second one is quoted by a decided item
        let mut history: Vec<ConversationMessage> = (0..12)
            .map(|i| ConversationMessage::user(format!("filler {}", i)))
            .collect();
        history[1] = ConversationMessage::user("Let's use PostgreSQL for storage");

        let items = vec![ProjectItem::new(
            "Use PostgreSQL",
            ItemState::Decided,
            Some(Citation {
                user_quote: "Let's use PostgreSQL".to_string(),
                timestamp: Utc::now(),
                confidence: 95,
                source: None,
            }),
        )];
        let state = ProjectState::from_items(&items);

        let pruned = pruner.prune("recorder", &history, &state);
        // The cited message plus the last 5
        assert_eq!(pruned.history.len(), 6);
        assert_eq!(pruned.history[0].content, "Let's use PostgreSQL for storage");
        assert_eq!(pruned.history[1].content, "filler 7");
    }

    #[test]
    fn test_decisions_only_dedup_and_order() {
        let pruner = pruner_with("recorder", PruningStrategy::DecisionsOnly);

        // The cited message is already inside the tail window: it must
        // appear exactly once, in its original position.
        let mut history = history_of(&["a", "b", "c", "d"]);
        history[2] = ConversationMessage::user("Let's use PostgreSQL");

        let items = vec![ProjectItem::new(
            "Use PostgreSQL",
            ItemState::Decided,
            Some(Citation {
                user_quote: "Let's use PostgreSQL".to_string(),
                timestamp: Utc::now(),
                confidence: 95,
                source: None,
            }),
        )];
        let state = ProjectState::from_items(&items);

        let pruned = pruner.prune("recorder", &history, &state);
        assert_eq!(pruned.history.len(), 4);
        let ids: Vec<&str> = pruned.history.iter().map(|m| m.id.as_str()).collect();
        let mut deduped = ids.clone();
        deduped.dedup();
        assert_eq!(ids, deduped);
        assert_eq!(pruned.history[2].content, "Let's use PostgreSQL");
    }

    #[test]
    fn test_decisions_only_metadata_stamp() {
        let pruner = pruner_with("recorder", PruningStrategy::DecisionsOnly);

        let mut history: Vec<ConversationMessage> = (0..10)
            .map(|i| ConversationMessage::user(format!("filler {}", i)))
            .collect();
        history[0] = ConversationMessage::user("we settled this")
            .with_metadata(serde_json::json!({"recordedItemId": "abc"}));

        let pruned = pruner.prune("recorder", &history, &ProjectState::default());
        assert_eq!(pruned.history.len(), 6);
        assert_eq!(pruned.history[0].content, "we settled this");
    }

    #[test]
    fn test_tasks_only_keyword_match() {
        let pruner = pruner_with("gap_analysis", PruningStrategy::TasksOnly);

        let mut history: Vec<ConversationMessage> = (0..15)
            .map(|i| ConversationMessage::user(format!("filler {}", i)))
            .collect();
        history[0] = ConversationMessage::user("TODO: pick a database");
        history[2] = ConversationMessage::user("we need to choose a hosting region");

        let pruned = pruner.prune("gap_analysis", &history, &ProjectState::default());
        // Two keyword matches plus the last 10
        assert_eq!(pruned.history.len(), 12);
        assert_eq!(pruned.history[0].content, "TODO: pick a database");
        assert_eq!(pruned.history[1].content, "we need to choose a hosting region");
    }

    #[test]
    fn test_determinism() {
        let pruner = pruner_with("recorder", PruningStrategy::DecisionsOnly);
        let history = history_of(&["a", "b", "c", "d", "e", "f", "g"]);
        let state = ProjectState::default();

        let first = pruner.prune("recorder", &history, &state);
        let second = pruner.prune("recorder", &history, &state);
        assert_eq!(first.history, second.history);
        assert_eq!(first.stats, second.stats);
    }

    #[test]
    fn test_inputs_not_mutated() {
        let pruner = pruner_with("conversation", PruningStrategy::Recency { window: 2 });
        let history = history_of(&["a", "b", "c"]);
        let before = history.clone();
        let _ = pruner.prune("conversation", &history, &ProjectState::default());
        assert_eq!(history, before);
    }
}
