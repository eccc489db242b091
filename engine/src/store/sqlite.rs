//! SQLite persistence
//!
//! `Database` owns the connection pool (WAL mode, idempotent migrations);
//! `SqliteStore` implements the persistence traits on top of it. Item
//! lists are stored as a JSON document column on the project row and
//! replaced wholesale on append.

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sdk::errors::PipelineError;
use sdk::types::{ConversationMessage, MessageRole, ProjectItem};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use sqlx::{ConnectOptions, Row};
use std::path::Path;
use std::str::FromStr;
use tracing::{debug, info, warn};

use super::{ActivityLog, ProjectStore};

/// Database connection pool
pub struct Database {
    pool: SqlitePool,
}

impl Database {
    /// Open (or create) the database file, enable WAL mode, and run
    /// migrations. Migrations are idempotent and safe to run repeatedly.
    pub async fn new(db_path: &Path) -> Result<Self> {
        info!("Initializing database at: {}", db_path.display());

        if let Some(parent) = db_path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .context("Failed to create database directory")?;
        }

        let connection_string = format!("sqlite:{}", db_path.display());
        let options = SqliteConnectOptions::from_str(&connection_string)?
            .create_if_missing(true)
            .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
            .synchronous(sqlx::sqlite::SqliteSynchronous::Normal)
            .foreign_keys(true)
            .disable_statement_logging();

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await
            .context("Failed to connect to database")?;

        debug!("Database connection established");

        let db = Self { pool };
        db.run_migrations().await?;
        Ok(db)
    }

    async fn run_migrations(&self) -> Result<()> {
        sqlx::raw_sql(include_str!("../../migrations/001_initial.sql"))
            .execute(&self.pool)
            .await
            .context("Failed to execute migration 001_initial.sql")?;
        debug!("Database migrations completed");
        Ok(())
    }

    /// Get a reference to the connection pool
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Flush the WAL and close all connections. Call during shutdown.
    pub async fn close(self) -> Result<()> {
        sqlx::query("PRAGMA wal_checkpoint(TRUNCATE)")
            .execute(&self.pool)
            .await
            .context("Failed to flush WAL")?;
        self.pool.close().await;
        Ok(())
    }
}

/// One row of the activity trail
#[derive(Debug, Clone)]
pub struct ActivityEntry {
    pub agent: String,
    pub action: String,
    pub details: String,
    pub created_at: DateTime<Utc>,
}

/// SQLite-backed implementation of the persistence traits
#[derive(Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Make sure the project row exists before writing against it
    async fn ensure_project(&self, project_id: &str) -> Result<(), PipelineError> {
        sqlx::query("INSERT OR IGNORE INTO projects (id, items, created_at) VALUES (?, '[]', ?)")
            .bind(project_id)
            .bind(Utc::now().timestamp_millis())
            .execute(&self.pool)
            .await
            .map_err(|e| PipelineError::Persistence(e.to_string()))?;
        Ok(())
    }

    /// Recent activity rows, newest first (CLI surface)
    pub async fn recent_activity(
        &self,
        project_id: &str,
        limit: usize,
    ) -> Result<Vec<ActivityEntry>, PipelineError> {
        let rows = sqlx::query(
            "SELECT agent, action, details, created_at FROM activity_log \
             WHERE project_id = ? ORDER BY created_at DESC, id DESC LIMIT ?",
        )
        .bind(project_id)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| PipelineError::Persistence(e.to_string()))?;

        Ok(rows
            .into_iter()
            .map(|row| ActivityEntry {
                agent: row.get("agent"),
                action: row.get("action"),
                details: row.get::<Option<String>, _>("details").unwrap_or_default(),
                created_at: millis_to_datetime(row.get("created_at")),
            })
            .collect())
    }
}

fn millis_to_datetime(millis: i64) -> DateTime<Utc> {
    DateTime::from_timestamp_millis(millis).unwrap_or_default()
}

fn role_from_str(raw: &str) -> MessageRole {
    match raw {
        "assistant" => MessageRole::Assistant,
        _ => MessageRole::User,
    }
}

#[async_trait]
impl ProjectStore for SqliteStore {
    async fn get_items(&self, project_id: &str) -> Result<Vec<ProjectItem>, PipelineError> {
        let row = sqlx::query("SELECT items FROM projects WHERE id = ?")
            .bind(project_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| PipelineError::Persistence(e.to_string()))?;

        let Some(row) = row else {
            return Ok(Vec::new());
        };

        let raw: String = row.get("items");
        serde_json::from_str(&raw)
            .map_err(|e| PipelineError::Persistence(format!("item list corrupt: {}", e)))
    }

    async fn append_items(
        &self,
        project_id: &str,
        new_items: Vec<ProjectItem>,
    ) -> Result<(), PipelineError> {
        if new_items.is_empty() {
            return Ok(());
        }

        self.ensure_project(project_id).await?;

        // Whole-document replace: read the full list, extend, write back
        let mut items = self.get_items(project_id).await?;
        items.extend(new_items);

        let rendered = serde_json::to_string(&items)
            .map_err(|e| PipelineError::Persistence(e.to_string()))?;

        sqlx::query("UPDATE projects SET items = ? WHERE id = ?")
            .bind(rendered)
            .bind(project_id)
            .execute(&self.pool)
            .await
            .map_err(|e| PipelineError::Persistence(e.to_string()))?;

        Ok(())
    }

    async fn recent_messages(
        &self,
        project_id: &str,
        limit: usize,
    ) -> Result<Vec<ConversationMessage>, PipelineError> {
        let rows = sqlx::query(
            "SELECT id, role, content, metadata, created_at FROM messages \
             WHERE project_id = ? ORDER BY created_at DESC, rowid DESC LIMIT ?",
        )
        .bind(project_id)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| PipelineError::Persistence(e.to_string()))?;

        let mut messages: Vec<ConversationMessage> = rows
            .into_iter()
            .map(|row| ConversationMessage {
                id: row.get("id"),
                role: role_from_str(&row.get::<String, _>("role")),
                content: row.get("content"),
                created_at: millis_to_datetime(row.get("created_at")),
                metadata: row
                    .get::<Option<String>, _>("metadata")
                    .and_then(|raw| serde_json::from_str(&raw).ok()),
            })
            .collect();

        // Fetched newest-first; hand back chronological order
        messages.reverse();
        Ok(messages)
    }

    async fn append_message(
        &self,
        project_id: &str,
        message: ConversationMessage,
    ) -> Result<(), PipelineError> {
        self.ensure_project(project_id).await?;

        let metadata = message
            .metadata
            .as_ref()
            .map(|m| m.to_string());

        sqlx::query(
            "INSERT INTO messages (id, project_id, role, content, metadata, created_at) \
             VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(&message.id)
        .bind(project_id)
        .bind(message.role.to_string())
        .bind(&message.content)
        .bind(metadata)
        .bind(message.created_at.timestamp_millis())
        .execute(&self.pool)
        .await
        .map_err(|e| PipelineError::Persistence(e.to_string()))?;

        Ok(())
    }
}

#[async_trait]
impl ActivityLog for SqliteStore {
    async fn record(&self, project_id: &str, agent: &str, action: &str, details: &str) {
        let result = sqlx::query(
            "INSERT INTO activity_log (project_id, agent, action, details, created_at) \
             VALUES (?, ?, ?, ?, ?)",
        )
        .bind(project_id)
        .bind(agent)
        .bind(action)
        .bind(details)
        .bind(Utc::now().timestamp_millis())
        .execute(&self.pool)
        .await;

        // Fire-and-forget: a failed activity write never propagates
        if let Err(e) = result {
            warn!("activity log write failed: {}", e);
        }
    }
}
