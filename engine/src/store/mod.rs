//! Persistence boundary
//!
//! The pipeline touches storage only through these traits: the project
//! store (items + conversation history) and the activity log sink. The
//! shipped implementation is SQLite-backed (`sqlite`); tests substitute
//! their own.
//!
//! `append_items` has whole-document replace semantics: the item list is
//! read, extended, and written back as one JSON document. Two concurrent
//! reconciliations on the same project are therefore not linearizable —
//! an accepted limitation under a single active writer.

use async_trait::async_trait;
use sdk::errors::PipelineError;
use sdk::types::{ConversationMessage, ProjectItem};

pub mod sqlite;

pub use sqlite::{ActivityEntry, Database, SqliteStore};

/// Project item list and conversation history access
#[async_trait]
pub trait ProjectStore: Send + Sync {
    /// Full item list for a project, in append order
    async fn get_items(&self, project_id: &str) -> Result<Vec<ProjectItem>, PipelineError>;

    /// Append items to the project's list.
    ///
    /// Implemented as a single read-then-write against the full item
    /// collection: all of `new_items` land, or none do.
    async fn append_items(
        &self,
        project_id: &str,
        new_items: Vec<ProjectItem>,
    ) -> Result<(), PipelineError>;

    /// The last `limit` conversation messages, in chronological order
    async fn recent_messages(
        &self,
        project_id: &str,
        limit: usize,
    ) -> Result<Vec<ConversationMessage>, PipelineError>;

    /// Append one message to the conversation (append-only)
    async fn append_message(
        &self,
        project_id: &str,
        message: ConversationMessage,
    ) -> Result<(), PipelineError>;
}

/// Fire-and-forget activity trail
///
/// Failures must not propagate: implementations log and swallow them.
#[async_trait]
pub trait ActivityLog: Send + Sync {
    async fn record(&self, project_id: &str, agent: &str, action: &str, details: &str);
}
