use anyhow::{Context, Result};
use std::collections::BTreeMap;
use std::sync::{Mutex, PoisonError};
use uuid::Uuid;

use crate::models::Project;

use super::traits::{BackendType, ProjectBackend};

/// Keeps serialized snapshots in process memory
///
/// Snapshots go through serde so the backend exercises the same round trip
/// as the on-disk backends.
#[derive(Default)]
pub struct MemoryBackend {
    projects: Mutex<BTreeMap<Uuid, String>>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ProjectBackend for MemoryBackend {
    fn backend_type(&self) -> BackendType {
        BackendType::Memory
    }

    fn location(&self) -> String {
        "memory".to_string()
    }

    fn save(&self, project: &Project) -> Result<()> {
        let data = serde_json::to_string(project).context("Failed to serialize project")?;
        self.projects
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(project.id(), data);
        Ok(())
    }

    fn load_all(&self) -> Result<Vec<Project>> {
        let projects = self.projects.lock().unwrap_or_else(PoisonError::into_inner);
        projects
            .values()
            .map(|data| serde_json::from_str(data).context("Failed to decode stored project"))
            .collect()
    }

    fn delete(&self, project_id: &Uuid) -> Result<()> {
        self.projects
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(project_id);
        Ok(())
    }
}
