//! SQLite-backed store
//!
//! Checklists and graph state are stored as JSON documents in a key-value
//! table (`checklist:{id}`, `graph:{id}`). Accepted updates are appended to
//! `progress_log`, ordered by insertion and unique per update id.

use super::ProgressStore;
use crate::graph::DependencyNode;
use crate::models::{Checklist, ProgressUpdate};
use chrono::Utc;
use preflight_common::{Error, Result};
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::SqlitePool;
use std::path::Path;

#[derive(Debug, Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Open (creating if needed) the database at `path`
    pub async fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let db_url = format!("sqlite://{}?mode=rwc", path.display());
        tracing::debug!("Connecting to database: {}", db_url);

        let pool = SqlitePool::connect(&db_url).await.map_err(Error::Database)?;
        Self::from_pool(pool).await
    }

    /// Private in-memory database
    ///
    /// Limited to one connection: every SQLite in-memory connection is a
    /// separate database.
    pub async fn in_memory() -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .map_err(Error::Database)?;
        Self::from_pool(pool).await
    }

    pub async fn from_pool(pool: SqlitePool) -> Result<Self> {
        init_tables(&pool).await?;
        Ok(Self { pool })
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    async fn get_document(&self, key: &str) -> Result<Option<String>> {
        let row: Option<(String,)> = sqlx::query_as("SELECT value FROM documents WHERE key = ?")
            .bind(key)
            .fetch_optional(&self.pool)
            .await
            .map_err(Error::Database)?;
        Ok(row.map(|(value,)| value))
    }

    async fn set_document(&self, key: &str, value: String) -> Result<()> {
        sqlx::query(
            "INSERT INTO documents (key, value, updated_at) VALUES (?, ?, ?)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at",
        )
        .bind(key)
        .bind(value)
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await
        .map_err(Error::Database)?;
        Ok(())
    }
}

async fn init_tables(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS documents (
            key TEXT PRIMARY KEY,
            value TEXT NOT NULL,
            updated_at TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await
    .map_err(Error::Database)?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS progress_log (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            checklist_id TEXT NOT NULL,
            update_id TEXT NOT NULL,
            body TEXT NOT NULL,
            UNIQUE(checklist_id, update_id)
        )
        "#,
    )
    .execute(pool)
    .await
    .map_err(Error::Database)?;

    tracing::debug!("Database tables initialized (documents, progress_log)");
    Ok(())
}

#[async_trait::async_trait]
impl ProgressStore for SqliteStore {
    async fn load_checklist(&self, checklist_id: &str) -> Result<Checklist> {
        let body = self
            .get_document(&format!("checklist:{}", checklist_id))
            .await?
            .ok_or_else(|| Error::NotFound(format!("Checklist {}", checklist_id)))?;
        Ok(serde_json::from_str(&body)?)
    }

    async fn save_checklist(&self, checklist: &Checklist) -> Result<()> {
        let body = serde_json::to_string(checklist)?;
        self.set_document(&format!("checklist:{}", checklist.id), body)
            .await
    }

    async fn save_progress(&self, checklist_id: &str, update: &ProgressUpdate) -> Result<()> {
        let body = serde_json::to_string(update)?;
        sqlx::query(
            "INSERT OR IGNORE INTO progress_log (checklist_id, update_id, body) VALUES (?, ?, ?)",
        )
        .bind(checklist_id)
        .bind(update.id.to_string())
        .bind(body)
        .execute(&self.pool)
        .await
        .map_err(Error::Database)?;
        Ok(())
    }

    async fn progress_log(&self, checklist_id: &str) -> Result<Vec<ProgressUpdate>> {
        let rows: Vec<(String,)> =
            sqlx::query_as("SELECT body FROM progress_log WHERE checklist_id = ? ORDER BY id")
                .bind(checklist_id)
                .fetch_all(&self.pool)
                .await
                .map_err(Error::Database)?;

        rows.into_iter()
            .map(|(body,)| serde_json::from_str(&body).map_err(Error::from))
            .collect()
    }

    async fn load_graph_state(&self, checklist_id: &str) -> Result<Vec<DependencyNode>> {
        match self.get_document(&format!("graph:{}", checklist_id)).await? {
            Some(body) => Ok(serde_json::from_str(&body)?),
            None => Ok(Vec::new()),
        }
    }

    async fn save_graph_state(&self, checklist_id: &str, nodes: &[DependencyNode]) -> Result<()> {
        let body = serde_json::to_string(nodes)?;
        self.set_document(&format!("graph:{}", checklist_id), body)
            .await
    }
}
