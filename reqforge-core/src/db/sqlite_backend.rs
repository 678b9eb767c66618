//! SQLite database storage backend
//!
//! Each project is one row holding its full JSON snapshot, so a save is a
//! single-row replace inside a transaction.

use anyhow::{Context, Result};
use rusqlite::{params, Connection};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};
use tracing::{debug, error};
use uuid::Uuid;

use crate::models::Project;

use super::traits::{BackendType, ProjectBackend};

/// Current schema version
const SCHEMA_VERSION: i32 = 1;

/// SQLite backend implementation
pub struct SqliteBackend {
    path: PathBuf,
    conn: Mutex<Connection>,
}

impl SqliteBackend {
    /// Opens (or creates) the database at `path`
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref().to_path_buf();

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(&path)
            .with_context(|| format!("Failed to open database {:?}", path))?;

        // WAL lets readers proceed while a save is in flight
        conn.execute_batch("PRAGMA journal_mode=WAL;")?;

        let backend = Self {
            path,
            conn: Mutex::new(conn),
        };

        backend.init_schema()?;
        Ok(backend)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn conn(&self) -> MutexGuard<'_, Connection> {
        self.conn
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    /// Initialize the database schema
    fn init_schema(&self) -> Result<()> {
        let conn = self.conn();

        let has_version_table: bool = conn.query_row(
            "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = 'schema_version'",
            [],
            |row| row.get::<_, i64>(0).map(|n| n > 0),
        )?;

        let current_version: i32 = if has_version_table {
            conn.query_row("SELECT version FROM schema_version LIMIT 1", [], |row| {
                row.get(0)
            })
            .unwrap_or(0)
        } else {
            0
        };

        if current_version == 0 {
            conn.execute_batch(include_str!("schema.sql"))?;
        } else if current_version < SCHEMA_VERSION {
            anyhow::bail!(
                "Database schema version {} is outdated, expected {}",
                current_version,
                SCHEMA_VERSION
            );
        }

        Ok(())
    }
}

impl ProjectBackend for SqliteBackend {
    fn backend_type(&self) -> BackendType {
        BackendType::Sqlite
    }

    fn location(&self) -> String {
        self.path.display().to_string()
    }

    fn save(&self, project: &Project) -> Result<()> {
        let data = serde_json::to_string(project).context("Failed to serialize project")?;

        let mut conn = self.conn();
        let tx = conn.transaction()?;
        tx.execute(
            "INSERT OR REPLACE INTO projects (id, name, updated_at, data)
             VALUES (?1, ?2, ?3, ?4)",
            params![
                project.id().to_string(),
                project.name,
                project.updated_at().to_rfc3339(),
                data,
            ],
        )?;
        tx.commit()?;

        debug!(project_id = %project.id(), "Saved project to SQLite");
        Ok(())
    }

    fn load_all(&self) -> Result<Vec<Project>> {
        let conn = self.conn();
        let mut stmt = conn.prepare("SELECT id, data FROM projects ORDER BY name")?;
        let rows = stmt.query_map([], |row| {
            let id: String = row.get(0)?;
            let data: String = row.get(1)?;
            Ok((id, data))
        })?;

        let mut projects = Vec::new();
        for row in rows {
            let (id, data) = row?;
            match serde_json::from_str::<Project>(&data) {
                Ok(project) => projects.push(project),
                Err(e) => error!(project_id = %id, "Skipping unreadable project row: {}", e),
            }
        }
        Ok(projects)
    }

    fn delete(&self, project_id: &Uuid) -> Result<()> {
        let conn = self.conn();
        conn.execute(
            "DELETE FROM projects WHERE id = ?1",
            [project_id.to_string()],
        )?;
        Ok(())
    }
}
