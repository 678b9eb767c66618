//! In-memory requirements store backed by a persistence backend
//!
//! Each project sits behind its own mutex so that mutations of one project
//! are serialized while different projects proceed in parallel. A mutation
//! works on a copy of the project, persists the copy, and only then swaps
//! it in, so a failed write leaves the in-memory state untouched.

use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};
use tracing::{debug, info};
use uuid::Uuid;

use crate::config::StorageConfig;
use crate::db::{create_backend, MemoryBackend, ProjectBackend};
use crate::error::StoreError;
use crate::models::{
    Hierarchy, NewRequirement, NewTrace, Project, ProjectPatch, RefinementRecord, Requirement,
    RequirementFilter, RequirementPatch, Trace, TraceEdge, TraceGraph, TracePatch,
    ValidationIssue,
};

/// `None` once the project has been deleted
type ProjectSlot = Arc<Mutex<Option<Project>>>;

/// Result of a mutation closure
enum Outcome<R> {
    /// Nothing changed; no write needed
    Unchanged(R),
    /// The project copy changed and must be persisted
    Changed(R),
}

/// Owns all projects and mediates every change to them
pub struct RequirementsStore {
    projects: RwLock<HashMap<Uuid, ProjectSlot>>,
    backend: Box<dyn ProjectBackend>,
}

impl RequirementsStore {
    /// Creates a store seeded with everything the backend holds
    pub fn open(backend: Box<dyn ProjectBackend>) -> Result<Self, StoreError> {
        let loaded = backend.load_all().map_err(|source| StoreError::Load {
            location: backend.location(),
            source,
        })?;
        info!(
            count = loaded.len(),
            backend = %backend.backend_type(),
            "Opened requirements store"
        );

        let projects = loaded
            .into_iter()
            .map(|p| (p.id(), Arc::new(Mutex::new(Some(p)))))
            .collect();
        Ok(Self {
            projects: RwLock::new(projects),
            backend,
        })
    }

    /// Opens the backend described by the storage configuration
    pub fn from_config(config: &StorageConfig) -> Result<Self, StoreError> {
        let backend = create_backend(config).map_err(|source| StoreError::Load {
            location: config
                .dir
                .as_ref()
                .map(|d| d.display().to_string())
                .unwrap_or_else(|| "memory".to_string()),
            source,
        })?;
        Self::open(backend)
    }

    /// A store that persists nothing beyond the process
    pub fn in_memory() -> Self {
        Self {
            projects: RwLock::new(HashMap::new()),
            backend: Box::new(MemoryBackend::new()),
        }
    }

    pub fn backend(&self) -> &dyn ProjectBackend {
        self.backend.as_ref()
    }

    fn slot(&self, project_id: &Uuid) -> Option<ProjectSlot> {
        self.projects
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(project_id)
            .cloned()
    }

    fn lock(slot: &ProjectSlot) -> MutexGuard<'_, Option<Project>> {
        slot.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn insert(&self, project: Project) {
        self.projects
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(project.id(), Arc::new(Mutex::new(Some(project))));
    }

    /// Read a project without copying it
    ///
    /// The project's lock is held while `f` runs, so `f` must be quick.
    pub fn with_project<R>(&self, project_id: &Uuid, f: impl FnOnce(&Project) -> R) -> Option<R> {
        let slot = self.slot(project_id)?;
        let guard = Self::lock(&slot);
        guard.as_ref().map(f)
    }

    /// Apply `f` to a copy of the project and commit it if it changed
    ///
    /// Returns `Ok(None)` when the project does not exist.
    fn mutate<R>(
        &self,
        project_id: &Uuid,
        f: impl FnOnce(&mut Project) -> Outcome<R>,
    ) -> Result<Option<R>, StoreError> {
        let Some(slot) = self.slot(project_id) else {
            return Ok(None);
        };
        let mut guard = Self::lock(&slot);
        let Some(current) = guard.as_ref() else {
            return Ok(None);
        };

        let mut draft = current.clone();
        match f(&mut draft) {
            Outcome::Unchanged(result) => Ok(Some(result)),
            Outcome::Changed(result) => {
                self.backend
                    .save(&draft)
                    .map_err(|source| StoreError::PersistenceFailure {
                        project_id: *project_id,
                        source,
                    })?;
                *guard = Some(draft);
                Ok(Some(result))
            }
        }
    }

    // =========================================================================
    // Projects
    // =========================================================================

    pub fn create_project(
        &self,
        name: impl Into<String>,
        description: impl Into<String>,
        metadata: BTreeMap<String, Value>,
    ) -> Result<Uuid, StoreError> {
        let project = Project::new(name.into(), description.into(), metadata);
        let id = project.id();
        self.backend
            .save(&project)
            .map_err(|source| StoreError::PersistenceFailure {
                project_id: id,
                source,
            })?;
        info!(project_id = %id, name = %project.name, "Created project");
        self.insert(project);
        Ok(id)
    }

    /// Snapshot of one project
    pub fn get_project(&self, project_id: &Uuid) -> Option<Project> {
        self.with_project(project_id, Project::clone)
    }

    /// Snapshots of all projects, oldest first
    pub fn list_projects(&self) -> Vec<Project> {
        let slots: Vec<ProjectSlot> = self
            .projects
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .cloned()
            .collect();
        let mut projects: Vec<Project> = slots
            .iter()
            .filter_map(|slot| Self::lock(slot).clone())
            .collect();
        projects.sort_by(|a, b| {
            a.created_at()
                .cmp(&b.created_at())
                .then_with(|| a.id().cmp(&b.id()))
        });
        projects
    }

    /// Find a project by id string or by exact (case-insensitive) name
    pub fn find_project(&self, key: &str) -> Option<Project> {
        if let Ok(id) = Uuid::parse_str(key.trim()) {
            return self.get_project(&id);
        }
        self.list_projects()
            .into_iter()
            .find(|p| p.name.eq_ignore_ascii_case(key.trim()))
    }

    pub fn update_project(&self, project_id: &Uuid, patch: ProjectPatch) -> Result<bool, StoreError> {
        let changed = self.mutate(project_id, |project| {
            if project.apply(patch) {
                Outcome::Changed(true)
            } else {
                Outcome::Unchanged(true)
            }
        })?;
        Ok(changed.unwrap_or(false))
    }

    pub fn delete_project(&self, project_id: &Uuid) -> Result<bool, StoreError> {
        let Some(slot) = self.slot(project_id) else {
            return Ok(false);
        };
        {
            let mut guard = Self::lock(&slot);
            if guard.is_none() {
                return Ok(false);
            }
            self.backend
                .delete(project_id)
                .map_err(|source| StoreError::PersistenceFailure {
                    project_id: *project_id,
                    source,
                })?;
            // Anyone still holding the slot now sees a deleted project
            *guard = None;
        }
        self.projects
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(project_id);
        info!(project_id = %project_id, "Deleted project");
        Ok(true)
    }

    /// Copy of a project under a fresh id, ready for export
    pub fn export_project(&self, project_id: &Uuid) -> Option<Project> {
        self.get_project(project_id)
    }

    /// Adds an externally built project under a fresh id
    pub fn import_project(&self, mut project: Project) -> Result<Uuid, StoreError> {
        project.reassign_id();
        let id = project.id();
        self.backend
            .save(&project)
            .map_err(|source| StoreError::PersistenceFailure {
                project_id: id,
                source,
            })?;
        info!(
            project_id = %id,
            requirements = project.requirement_count(),
            traces = project.traces().len(),
            "Imported project"
        );
        self.insert(project);
        Ok(id)
    }

    // =========================================================================
    // Requirements
    // =========================================================================

    /// Returns `Ok(None)` when the project is unknown
    pub fn add_requirement(
        &self,
        project_id: &Uuid,
        requirement: NewRequirement,
    ) -> Result<Option<Uuid>, StoreError> {
        let id = self.mutate(project_id, |project| {
            Outcome::Changed(project.add_requirement(requirement))
        })?;
        if let Some(id) = id {
            debug!(project_id = %project_id, requirement_id = %id, "Added requirement");
        }
        Ok(id)
    }

    pub fn get_requirement(&self, project_id: &Uuid, requirement_id: &Uuid) -> Option<Requirement> {
        self.with_project(project_id, |p| p.requirement(requirement_id).cloned())
            .flatten()
    }

    pub fn list_requirements(
        &self,
        project_id: &Uuid,
        filter: &RequirementFilter,
    ) -> Option<Vec<Requirement>> {
        self.with_project(project_id, |p| {
            let mut reqs: Vec<Requirement> =
                p.filter_requirements(filter).into_iter().cloned().collect();
            reqs.sort_by(|a, b| {
                a.created_at()
                    .cmp(&b.created_at())
                    .then_with(|| a.id().cmp(&b.id()))
            });
            reqs
        })
    }

    /// Applies a field-level patch; false when the project or requirement is unknown
    pub fn update_requirement(
        &self,
        project_id: &Uuid,
        requirement_id: &Uuid,
        patch: RequirementPatch,
    ) -> Result<bool, StoreError> {
        let found = self.mutate(project_id, |project| {
            match project.update_requirement(requirement_id, patch) {
                None => Outcome::Unchanged(false),
                Some(false) => Outcome::Unchanged(true),
                Some(true) => Outcome::Changed(true),
            }
        })?;
        Ok(found.unwrap_or(false))
    }

    pub fn delete_requirement(&self, project_id: &Uuid, requirement_id: &Uuid) -> Result<bool, StoreError> {
        let deleted = self.mutate(project_id, |project| {
            if project.delete_requirement(requirement_id) {
                Outcome::Changed(true)
            } else {
                Outcome::Unchanged(false)
            }
        })?;
        Ok(deleted.unwrap_or(false))
    }

    /// Appends a refinement outcome to the requirement's metadata
    pub fn record_refinement(
        &self,
        project_id: &Uuid,
        requirement_id: &Uuid,
        record: RefinementRecord,
    ) -> Result<bool, StoreError> {
        let recorded = self.mutate(project_id, |project| {
            if project.record_refinement(requirement_id, record) {
                Outcome::Changed(true)
            } else {
                Outcome::Unchanged(false)
            }
        })?;
        Ok(recorded.unwrap_or(false))
    }

    /// Notes received feedback in the requirement's history
    pub fn record_feedback(
        &self,
        project_id: &Uuid,
        requirement_id: &Uuid,
        feedback: &str,
    ) -> Result<bool, StoreError> {
        let recorded = self.mutate(project_id, |project| {
            if project.record_feedback(requirement_id, feedback) {
                Outcome::Changed(true)
            } else {
                Outcome::Unchanged(false)
            }
        })?;
        Ok(recorded.unwrap_or(false))
    }

    pub fn hierarchy(&self, project_id: &Uuid) -> Option<Hierarchy> {
        self.with_project(project_id, Project::hierarchy)
    }

    pub fn validate_references(&self, project_id: &Uuid) -> Option<Vec<ValidationIssue>> {
        self.with_project(project_id, Project::validate_references)
    }

    // =========================================================================
    // Traces
    // =========================================================================

    /// Returns `Ok(None)` when the project or either endpoint is unknown
    pub fn add_trace(&self, project_id: &Uuid, trace: NewTrace) -> Result<Option<Uuid>, StoreError> {
        let id = self.mutate(project_id, |project| match project.add_trace(trace) {
            Some(id) => Outcome::Changed(Some(id)),
            None => Outcome::Unchanged(None),
        })?;
        Ok(id.flatten())
    }

    pub fn get_trace(&self, project_id: &Uuid, trace_id: &Uuid) -> Option<Trace> {
        self.with_project(project_id, |p| p.trace(trace_id).cloned())
            .flatten()
    }

    pub fn list_traces(&self, project_id: &Uuid) -> Option<Vec<Trace>> {
        self.with_project(project_id, |p| p.traces().to_vec())
    }

    /// Outgoing then incoming edges of a requirement
    pub fn traces_for(&self, project_id: &Uuid, requirement_id: &Uuid) -> Option<Vec<TraceEdge>> {
        self.with_project(project_id, |p| TraceGraph::build(p).edges(requirement_id))
    }

    pub fn update_trace(
        &self,
        project_id: &Uuid,
        trace_id: &Uuid,
        patch: TracePatch,
    ) -> Result<bool, StoreError> {
        let found = self.mutate(project_id, |project| match project.update_trace(trace_id, patch) {
            None => Outcome::Unchanged(false),
            Some(false) => Outcome::Unchanged(true),
            Some(true) => Outcome::Changed(true),
        })?;
        Ok(found.unwrap_or(false))
    }

    pub fn delete_trace(&self, project_id: &Uuid, trace_id: &Uuid) -> Result<bool, StoreError> {
        let deleted = self.mutate(project_id, |project| {
            if project.delete_trace(trace_id) {
                Outcome::Changed(true)
            } else {
                Outcome::Unchanged(false)
            }
        })?;
        Ok(deleted.unwrap_or(false))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::BackendType;
    use crate::models::{RequirementStatus, TraceType};
    use std::sync::atomic::{AtomicBool, Ordering};

    /// Memory backend whose writes can be made to fail
    #[derive(Default)]
    struct FlakyBackend {
        inner: MemoryBackend,
        failing: Arc<AtomicBool>,
    }

    impl ProjectBackend for FlakyBackend {
        fn backend_type(&self) -> BackendType {
            BackendType::Memory
        }

        fn location(&self) -> String {
            "flaky".into()
        }

        fn save(&self, project: &Project) -> anyhow::Result<()> {
            if self.failing.load(Ordering::SeqCst) {
                anyhow::bail!("disk full");
            }
            self.inner.save(project)
        }

        fn load_all(&self) -> anyhow::Result<Vec<Project>> {
            self.inner.load_all()
        }

        fn delete(&self, project_id: &Uuid) -> anyhow::Result<()> {
            if self.failing.load(Ordering::SeqCst) {
                anyhow::bail!("disk full");
            }
            self.inner.delete(project_id)
        }
    }

    #[test]
    fn test_project_crud() {
        let store = RequirementsStore::in_memory();
        let id = store
            .create_project("Checkout Flow", "Cart and payment", BTreeMap::new())
            .unwrap();

        assert_eq!(store.get_project(&id).unwrap().name, "Checkout Flow");
        assert_eq!(store.list_projects().len(), 1);
        assert_eq!(store.find_project("checkout flow").unwrap().id(), id);

        assert!(store
            .update_project(
                &id,
                ProjectPatch {
                    name: Some("Checkout".into()),
                    ..Default::default()
                }
            )
            .unwrap());
        assert_eq!(store.get_project(&id).unwrap().name, "Checkout");

        assert!(store.delete_project(&id).unwrap());
        assert!(!store.delete_project(&id).unwrap());
        assert!(store.get_project(&id).is_none());
    }

    #[test]
    fn test_unknown_ids_are_absent() {
        let store = RequirementsStore::in_memory();
        let ghost = Uuid::new_v4();
        assert_eq!(
            store.add_requirement(&ghost, NewRequirement::new("A", "a")).unwrap(),
            None
        );
        assert!(store.get_requirement(&ghost, &ghost).is_none());
        assert!(!store
            .update_requirement(&ghost, &ghost, RequirementPatch::default())
            .unwrap());

        let pid = store.create_project("P", "", BTreeMap::new()).unwrap();
        assert!(!store
            .update_requirement(&pid, &ghost, RequirementPatch::default())
            .unwrap());
        assert!(store.list_requirements(&pid, &RequirementFilter::default()).unwrap().is_empty());
    }

    #[test]
    fn test_mutations_are_persisted() {
        let store = RequirementsStore::in_memory();
        let pid = store.create_project("P", "", BTreeMap::new()).unwrap();
        let rid = store
            .add_requirement(&pid, NewRequirement::new("Login", "Users log in"))
            .unwrap()
            .unwrap();
        store
            .update_requirement(
                &pid,
                &rid,
                RequirementPatch {
                    status: Some(RequirementStatus::Accepted),
                    ..Default::default()
                },
            )
            .unwrap();

        let persisted = store.backend().load_all().unwrap();
        assert_eq!(persisted, vec![store.get_project(&pid).unwrap()]);
        assert_eq!(
            persisted[0].requirement(&rid).unwrap().status,
            RequirementStatus::Accepted
        );
    }

    #[test]
    fn test_failed_write_keeps_memory_state() {
        let backend = FlakyBackend::default();
        let failing = Arc::clone(&backend.failing);
        let store = RequirementsStore::open(Box::new(backend)).unwrap();
        let pid = store.create_project("P", "", BTreeMap::new()).unwrap();
        let rid = store
            .add_requirement(&pid, NewRequirement::new("Login", "Users log in"))
            .unwrap()
            .unwrap();
        let before = store.get_project(&pid).unwrap();

        failing.store(true, Ordering::SeqCst);
        let result = store.update_requirement(
            &pid,
            &rid,
            RequirementPatch {
                title: Some("Sign in".into()),
                ..Default::default()
            },
        );
        assert!(matches!(result, Err(StoreError::PersistenceFailure { .. })));
        assert_eq!(store.get_project(&pid).unwrap(), before);
        assert!(matches!(
            store.delete_project(&pid),
            Err(StoreError::PersistenceFailure { .. })
        ));
        assert!(store.get_project(&pid).is_some());

        failing.store(false, Ordering::SeqCst);
        assert!(store.delete_project(&pid).unwrap());
    }

    #[test]
    fn test_no_op_update_does_not_touch_history() {
        let store = RequirementsStore::in_memory();
        let pid = store.create_project("P", "", BTreeMap::new()).unwrap();
        let rid = store
            .add_requirement(&pid, NewRequirement::new("Login", "Users log in"))
            .unwrap()
            .unwrap();
        assert!(store
            .update_requirement(
                &pid,
                &rid,
                RequirementPatch {
                    title: Some("Login".into()),
                    ..Default::default()
                }
            )
            .unwrap());
        assert_eq!(store.get_requirement(&pid, &rid).unwrap().history().len(), 1);
    }

    #[test]
    fn test_trace_crud_and_edges() {
        let store = RequirementsStore::in_memory();
        let pid = store.create_project("P", "", BTreeMap::new()).unwrap();
        let code = store
            .add_requirement(&pid, NewRequirement::new("Card module", "Implements card payments"))
            .unwrap()
            .unwrap();
        let need = store
            .add_requirement(&pid, NewRequirement::new("Pay by card", "Users pay by card"))
            .unwrap()
            .unwrap();

        let tid = store
            .add_trace(&pid, NewTrace::new(code, need, TraceType::Implements))
            .unwrap()
            .unwrap();
        assert_eq!(
            store
                .add_trace(&pid, NewTrace::new(code, Uuid::new_v4(), TraceType::Tests))
                .unwrap(),
            None
        );

        let edges = store.traces_for(&pid, &need).unwrap();
        assert_eq!(edges.len(), 1);
        assert_eq!(edges[0].label, "implemented-by");
        assert_eq!(edges[0].other_id, code);

        assert!(store
            .update_trace(
                &pid,
                &tid,
                TracePatch {
                    description: Some("card module covers the need".into()),
                    ..Default::default()
                }
            )
            .unwrap());
        assert_eq!(store.list_traces(&pid).unwrap().len(), 1);
        assert!(store.delete_trace(&pid, &tid).unwrap());
        assert!(store.get_trace(&pid, &tid).is_none());
    }

    #[test]
    fn test_import_assigns_fresh_id() {
        let store = RequirementsStore::in_memory();
        let pid = store.create_project("P", "", BTreeMap::new()).unwrap();
        store
            .add_requirement(&pid, NewRequirement::new("Login", "Users log in"))
            .unwrap();

        let exported = store.export_project(&pid).unwrap();
        let imported = store.import_project(exported).unwrap();
        assert_ne!(imported, pid);
        assert_eq!(store.get_project(&imported).unwrap().requirement_count(), 1);
        assert_eq!(store.list_projects().len(), 2);
    }

    #[test]
    fn test_parallel_mutations_on_one_project() {
        let store = Arc::new(RequirementsStore::in_memory());
        let pid = store.create_project("P", "", BTreeMap::new()).unwrap();

        let handles: Vec<_> = (0..8)
            .map(|i| {
                let store = Arc::clone(&store);
                std::thread::spawn(move || {
                    store
                        .add_requirement(&pid, NewRequirement::new(format!("Req {}", i), "desc"))
                        .unwrap()
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(store.get_project(&pid).unwrap().requirement_count(), 8);
        assert_eq!(store.backend().load_all().unwrap()[0].requirement_count(), 8);
    }
}
