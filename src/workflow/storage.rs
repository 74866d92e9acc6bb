//! Workflow definition storage
//!
//! The engine only needs `WorkflowStore::load`. `SqliteWorkflowStore` keeps
//! definitions as JSON in a SQLite table; `InMemoryWorkflowStore` backs tests
//! and one-shot CLI runs.

use crate::workflow::types::WorkflowDefinition;
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use parking_lot::RwLock;
use serde::Serialize;
use sqlx::{
    sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions},
    Row,
};
use std::{collections::HashMap, path::Path};

/// Source of workflow definitions
#[async_trait]
pub trait WorkflowStore: Send + Sync {
    /// Load a definition by id; `Ok(None)` when it does not exist
    async fn load(&self, workflow_id: &str) -> Result<Option<WorkflowDefinition>>;
}

/// Workflow definitions in a single SQLite table
///
/// The definition itself is a JSON document; id, name and node count are
/// plain columns so listings never parse JSON.
#[derive(Debug, Clone)]
pub struct SqliteWorkflowStore {
    db: SqlitePool,
}

impl SqliteWorkflowStore {
    pub fn with_pool(db: SqlitePool) -> Self {
        Self { db }
    }

    /// Open (creating if missing) the database file and ensure the table
    pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if let Some(dir) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(dir).with_context(|| format!("cannot create {}", dir.display()))?;
        }

        tracing::info!("🗄️ Opening workflow database: {}", path.display());
        let db = SqlitePool::connect_with(SqliteConnectOptions::new().filename(path).create_if_missing(true)).await?;

        let store = Self::with_pool(db);
        store.init_schema().await?;
        Ok(store)
    }

    /// Private in-memory database; a single connection so every query sees
    /// the same data
    pub async fn in_memory() -> Result<Self> {
        let db = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await?;
        let store = Self::with_pool(db);
        store.init_schema().await?;
        Ok(store)
    }

    /// Idempotent
    pub async fn init_schema(&self) -> Result<()> {
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS workflow_definitions (\
                workflow_id TEXT PRIMARY KEY, \
                display_name TEXT NOT NULL, \
                node_count INTEGER NOT NULL, \
                document TEXT NOT NULL, \
                imported_at TEXT NOT NULL, \
                revised_at TEXT NOT NULL\
            )",
        )
        .execute(&self.db)
        .await?;
        Ok(())
    }

    /// Insert a definition or replace the stored revision; the first import
    /// time is kept
    pub async fn save_workflow(&self, workflow: &WorkflowDefinition) -> Result<()> {
        let document = serde_json::to_string(workflow)?;
        let now = Utc::now().to_rfc3339();

        sqlx::query(
            "INSERT INTO workflow_definitions \
                (workflow_id, display_name, node_count, document, imported_at, revised_at) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?5) \
             ON CONFLICT(workflow_id) DO UPDATE SET \
                display_name = excluded.display_name, \
                node_count = excluded.node_count, \
                document = excluded.document, \
                revised_at = excluded.revised_at",
        )
        .bind(&workflow.id)
        .bind(&workflow.name)
        .bind(workflow.nodes.len() as i64)
        .bind(&document)
        .bind(&now)
        .execute(&self.db)
        .await
        .with_context(|| format!("failed to store workflow '{}'", workflow.id))?;

        tracing::debug!("💾 Saved workflow '{}' ({} nodes)", workflow.id, workflow.nodes.len());
        Ok(())
    }

    /// Summaries of every stored workflow, by id
    pub async fn list_workflows(&self) -> Result<Vec<WorkflowSummary>> {
        let rows = sqlx::query(
            "SELECT workflow_id, display_name, node_count, imported_at, revised_at \
             FROM workflow_definitions ORDER BY workflow_id",
        )
        .fetch_all(&self.db)
        .await?;

        rows.into_iter()
            .map(|row| -> Result<WorkflowSummary> {
                Ok(WorkflowSummary {
                    id: row.try_get("workflow_id")?,
                    name: row.try_get("display_name")?,
                    node_count: row.try_get::<i64, _>("node_count")?.max(0) as usize,
                    imported_at: row.try_get("imported_at")?,
                    revised_at: row.try_get("revised_at")?,
                })
            })
            .collect()
    }

    /// Returns whether a definition was removed
    pub async fn delete_workflow(&self, workflow_id: &str) -> Result<bool> {
        let outcome = sqlx::query("DELETE FROM workflow_definitions WHERE workflow_id = ?1")
            .bind(workflow_id)
            .execute(&self.db)
            .await?;
        Ok(outcome.rows_affected() == 1)
    }
}

#[async_trait]
impl WorkflowStore for SqliteWorkflowStore {
    async fn load(&self, workflow_id: &str) -> Result<Option<WorkflowDefinition>> {
        let document: Option<String> =
            sqlx::query_scalar("SELECT document FROM workflow_definitions WHERE workflow_id = ?1")
                .bind(workflow_id)
                .fetch_optional(&self.db)
                .await?;

        document
            .map(|raw| {
                serde_json::from_str(&raw).with_context(|| format!("stored workflow '{}' is not valid", workflow_id))
            })
            .transpose()
    }
}

/// Listing row; timestamps are RFC 3339 text
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowSummary {
    pub id: String,
    pub name: String,
    pub node_count: usize,
    pub imported_at: String,
    pub revised_at: String,
}

/// Process-local store
#[derive(Debug, Default)]
pub struct InMemoryWorkflowStore {
    workflows: RwLock<HashMap<String, WorkflowDefinition>>,
}

impl InMemoryWorkflowStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, workflow: WorkflowDefinition) {
        self.workflows.write().insert(workflow.id.clone(), workflow);
    }
}

#[async_trait]
impl WorkflowStore for InMemoryWorkflowStore {
    async fn load(&self, workflow_id: &str) -> Result<Option<WorkflowDefinition>> {
        Ok(self.workflows.read().get(workflow_id).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workflow::types::NodeSpec;

    fn sample(name: &str) -> WorkflowDefinition {
        WorkflowDefinition {
            id: "wf-reel".into(),
            name: name.into(),
            nodes: vec![
                NodeSpec::new("start", "manual_trigger"),
                NodeSpec::new("gen", "content_generator").with_input("topic", "$start.topic"),
            ],
        }
    }

    #[tokio::test]
    async fn sqlite_round_trip_and_upsert() {
        let store = SqliteWorkflowStore::in_memory().await.unwrap();
        store.save_workflow(&sample("first")).await.unwrap();
        store.save_workflow(&sample("renamed")).await.unwrap();

        let loaded = store.load("wf-reel").await.unwrap().expect("stored workflow");
        assert_eq!(loaded.name, "renamed");
        assert_eq!(loaded.nodes.len(), 2);
        assert_eq!(loaded.nodes[1].inputs["topic"], "$start.topic");

        let listed = store.list_workflows().await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].name, "renamed");
        assert_eq!(listed[0].node_count, 2);
    }

    #[tokio::test]
    async fn sqlite_missing_and_delete() {
        let store = SqliteWorkflowStore::in_memory().await.unwrap();
        assert!(store.load("nope").await.unwrap().is_none());

        store.save_workflow(&sample("x")).await.unwrap();
        assert!(store.delete_workflow("wf-reel").await.unwrap());
        assert!(!store.delete_workflow("wf-reel").await.unwrap());
    }

    #[tokio::test]
    async fn in_memory_store_loads_inserted() {
        let store = InMemoryWorkflowStore::new();
        store.insert(sample("mem"));
        assert_eq!(store.load("wf-reel").await.unwrap().unwrap().name, "mem");
    }
}
