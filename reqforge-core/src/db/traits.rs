//! Persistence backend trait
//!
//! The store keeps the authoritative copy of every project in memory and
//! hands each committed snapshot to a backend. Backends must replace a
//! project's stored snapshot atomically.

use anyhow::Result;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::Project;

/// Types of persistence backends available
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum BackendType {
    /// One JSON file per project in a directory
    #[default]
    Json,
    /// SQLite database file, one row per project
    Sqlite,
    /// Process-local, nothing survives a restart
    Memory,
}

impl std::fmt::Display for BackendType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BackendType::Json => write!(f, "JSON"),
            BackendType::Sqlite => write!(f, "SQLite"),
            BackendType::Memory => write!(f, "memory"),
        }
    }
}

/// Core trait for project persistence backends
pub trait ProjectBackend: Send + Sync {
    /// Returns the backend type
    fn backend_type(&self) -> BackendType;

    /// Human readable location of the stored data
    fn location(&self) -> String;

    /// Atomically replaces the stored snapshot of `project`
    fn save(&self, project: &Project) -> Result<()>;

    /// Loads every stored project
    ///
    /// Entries that cannot be decoded are skipped and logged rather than
    /// failing the whole load.
    fn load_all(&self) -> Result<Vec<Project>>;

    /// Removes a stored project; deleting an unknown id is not an error
    fn delete(&self, project_id: &Uuid) -> Result<()>;
}
