//! JSON export and import of whole projects

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use tracing::info;
use uuid::Uuid;

use crate::models::Project;
use crate::store::RequirementsStore;

/// Version of the export envelope
pub const EXPORT_FORMAT_VERSION: u32 = 1;

/// Exported project together with when and how it was written
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectExport {
    pub format_version: u32,
    pub exported_at: DateTime<Utc>,
    pub project: Project,
}

impl ProjectExport {
    pub fn new(project: Project) -> Self {
        Self {
            format_version: EXPORT_FORMAT_VERSION,
            exported_at: Utc::now(),
            project,
        }
    }
}

/// Accepts both the envelope and a bare project document
#[derive(Deserialize)]
#[serde(untagged)]
enum ImportDocument {
    Envelope(ProjectExport),
    Bare(Project),
}

pub fn to_json_string(project: &Project) -> Result<String> {
    serde_json::to_string_pretty(&ProjectExport::new(project.clone()))
        .context("Failed to serialize project export")
}

pub fn from_json_str(content: &str) -> Result<Project> {
    let document: ImportDocument =
        serde_json::from_str(content).context("Not a project export document")?;
    match document {
        ImportDocument::Envelope(export) => {
            if export.format_version > EXPORT_FORMAT_VERSION {
                anyhow::bail!(
                    "Unsupported export format version {} (newest known is {})",
                    export.format_version,
                    EXPORT_FORMAT_VERSION
                );
            }
            Ok(export.project)
        }
        ImportDocument::Bare(project) => Ok(project),
    }
}

/// Export a stored project to a JSON file
pub fn export_json(store: &RequirementsStore, project_id: &Uuid, output_path: &Path) -> Result<()> {
    let project = store
        .export_project(project_id)
        .with_context(|| format!("Project {} not found", project_id))?;
    let json = to_json_string(&project)?;
    if let Some(parent) = output_path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    fs::write(output_path, json)
        .with_context(|| format!("Failed to write export to {:?}", output_path))?;

    info!(
        project_id = %project_id,
        requirements = project.requirement_count(),
        path = ?output_path,
        "Exported project"
    );
    Ok(())
}

/// Import a project from a JSON file under a fresh id
pub fn import_json(store: &RequirementsStore, input_path: &Path) -> Result<Uuid> {
    let content = fs::read_to_string(input_path)
        .with_context(|| format!("Failed to read {:?}", input_path))?;
    let project = from_json_str(&content)
        .with_context(|| format!("Failed to parse {:?}", input_path))?;
    let id = store.import_project(project)?;
    Ok(id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{NewRequirement, NewTrace, TraceType};
    use std::collections::BTreeMap;
    use tempfile::TempDir;

    #[test]
    fn test_export_then_import_keeps_content() {
        let store = RequirementsStore::in_memory();
        let pid = store.create_project("Checkout Flow", "Cart", BTreeMap::new()).unwrap();
        let a = store
            .add_requirement(&pid, NewRequirement::new("Pay by card", "Users shall pay by card"))
            .unwrap()
            .unwrap();
        let b = store
            .add_requirement(&pid, NewRequirement::new("Card tests", "Verify card payments"))
            .unwrap()
            .unwrap();
        store.add_trace(&pid, NewTrace::new(b, a, TraceType::Tests)).unwrap();

        let dir = TempDir::new().unwrap();
        let path = dir.path().join("out").join("checkout.json");
        export_json(&store, &pid, &path).unwrap();

        let imported = import_json(&store, &path).unwrap();
        assert_ne!(imported, pid);
        let original = store.get_project(&pid).unwrap();
        let copy = store.get_project(&imported).unwrap();
        assert_eq!(copy.name, original.name);
        assert_eq!(copy.requirement_count(), 2);
        assert_eq!(copy.traces(), original.traces());
        assert_eq!(copy.requirement(&a), original.requirement(&a));
    }

    #[test]
    fn test_bare_project_document_is_accepted() {
        let store = RequirementsStore::in_memory();
        let pid = store.create_project("P", "", BTreeMap::new()).unwrap();
        let bare = serde_json::to_string(&store.get_project(&pid).unwrap()).unwrap();
        assert_eq!(from_json_str(&bare).unwrap().name, "P");
    }

    #[test]
    fn test_rejects_newer_format_and_garbage() {
        let store = RequirementsStore::in_memory();
        let pid = store.create_project("P", "", BTreeMap::new()).unwrap();
        let mut export = ProjectExport::new(store.get_project(&pid).unwrap());
        export.format_version = EXPORT_FORMAT_VERSION + 1;
        let json = serde_json::to_string(&export).unwrap();
        assert!(from_json_str(&json).is_err());
        assert!(from_json_str("{\"hello\": 1}").is_err());
    }

    #[test]
    fn test_export_unknown_project_fails() {
        let store = RequirementsStore::in_memory();
        let dir = TempDir::new().unwrap();
        assert!(export_json(&store, &Uuid::new_v4(), &dir.path().join("x.json")).is_err());
    }
}
