use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use tracing::warn;
use uuid::Uuid;

use super::requirement::{
    NewRequirement, RefinementRecord, Requirement, RequirementPatch, RequirementPriority,
    RequirementStatus, RequirementType,
};
use super::trace::{NewTrace, Trace, TracePatch};

/// Container for a set of requirements and the traces between them
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Project {
    id: Uuid,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub metadata: BTreeMap<String, Value>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    #[serde(default)]
    requirements: BTreeMap<Uuid, Requirement>,
    #[serde(default)]
    traces: Vec<Trace>,
}

/// Partial update of a project's own attributes
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProjectPatch {
    pub name: Option<String>,
    pub description: Option<String>,
    /// Merged key by key
    pub metadata: Option<BTreeMap<String, Value>>,
}

/// Filters for listing requirements; all set filters must match
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RequirementFilter {
    pub status: Option<RequirementStatus>,
    pub requirement_type: Option<RequirementType>,
    pub priority: Option<RequirementPriority>,
    pub tag: Option<String>,
}

impl RequirementFilter {
    pub fn matches(&self, req: &Requirement) -> bool {
        self.status.map_or(true, |s| req.status == s)
            && self
                .requirement_type
                .as_ref()
                .map_or(true, |t| &req.requirement_type == t)
            && self.priority.map_or(true, |p| req.priority == Some(p))
            && self.tag.as_ref().map_or(true, |t| req.tags.contains(t))
    }
}

/// Key of a hierarchy node: the sentinel root or a parent requirement
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum HierarchyKey {
    Root,
    Parent(Uuid),
}

impl fmt::Display for HierarchyKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HierarchyKey::Root => write!(f, "root"),
            HierarchyKey::Parent(id) => write!(f, "{}", id),
        }
    }
}

/// Parent → ordered direct children, derived from the requirement set
#[derive(Debug, Clone, PartialEq)]
pub struct Hierarchy {
    nodes: BTreeMap<HierarchyKey, Vec<Uuid>>,
}

impl Hierarchy {
    fn build(project: &Project) -> Self {
        let mut ordered: Vec<&Requirement> = project.requirements.values().collect();
        ordered.sort_by_key(|r| (r.created_at(), r.id()));

        let mut nodes: BTreeMap<HierarchyKey, Vec<Uuid>> = BTreeMap::new();
        nodes.insert(HierarchyKey::Root, Vec::new());
        for req in ordered {
            let key = req
                .parent_id
                .map(HierarchyKey::Parent)
                .unwrap_or(HierarchyKey::Root);
            nodes.entry(key).or_default().push(req.id());
        }
        Self { nodes }
    }

    pub fn roots(&self) -> &[Uuid] {
        self.children(&HierarchyKey::Root)
    }

    pub fn children(&self, key: &HierarchyKey) -> &[Uuid] {
        self.nodes.get(key).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn children_of(&self, parent: Uuid) -> &[Uuid] {
        self.children(&HierarchyKey::Parent(parent))
    }

    pub fn iter(&self) -> impl Iterator<Item = (&HierarchyKey, &Vec<Uuid>)> {
        self.nodes.iter()
    }

    /// Keys as strings, the shape export collaborators consume
    pub fn to_string_map(&self) -> BTreeMap<String, Vec<String>> {
        self.nodes
            .iter()
            .map(|(k, v)| (k.to_string(), v.iter().map(Uuid::to_string).collect()))
            .collect()
    }
}

/// A reference that names something no longer (or never) in the project
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ValidationIssue {
    DanglingParent { requirement_id: Uuid, parent_id: Uuid },
    DanglingDependency { requirement_id: Uuid, dependency_id: Uuid },
    DanglingTraceEndpoint { trace_id: Uuid, missing_id: Uuid },
}

impl fmt::Display for ValidationIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValidationIssue::DanglingParent {
                requirement_id,
                parent_id,
            } => write!(f, "requirement {} has unknown parent {}", requirement_id, parent_id),
            ValidationIssue::DanglingDependency {
                requirement_id,
                dependency_id,
            } => write!(
                f,
                "requirement {} depends on unknown requirement {}",
                requirement_id, dependency_id
            ),
            ValidationIssue::DanglingTraceEndpoint {
                trace_id,
                missing_id,
            } => write!(f, "trace {} points at unknown requirement {}", trace_id, missing_id),
        }
    }
}

impl Project {
    pub(crate) fn new(name: String, description: String, metadata: BTreeMap<String, Value>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            name,
            description,
            metadata,
            created_at: now,
            updated_at: now,
            requirements: BTreeMap::new(),
            traces: Vec::new(),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    /// Give an imported project a fresh identity
    pub(crate) fn reassign_id(&mut self) {
        self.id = Uuid::new_v4();
        self.touch();
    }

    fn touch(&mut self) {
        self.updated_at = Utc::now();
    }

    pub(crate) fn apply(&mut self, patch: ProjectPatch) -> bool {
        let mut changed = false;
        if let Some(name) = patch.name {
            changed |= self.name != name;
            self.name = name;
        }
        if let Some(description) = patch.description {
            changed |= self.description != description;
            self.description = description;
        }
        if let Some(metadata) = patch.metadata {
            for (key, value) in metadata {
                if self.metadata.get(&key) != Some(&value) {
                    self.metadata.insert(key, value);
                    changed = true;
                }
            }
        }
        if changed {
            self.touch();
        }
        changed
    }

    // =========================================================================
    // Requirements
    // =========================================================================

    pub fn requirement(&self, id: &Uuid) -> Option<&Requirement> {
        self.requirements.get(id)
    }

    pub fn requirements(&self) -> impl Iterator<Item = &Requirement> {
        self.requirements.values()
    }

    pub fn requirement_count(&self) -> usize {
        self.requirements.len()
    }

    pub fn filter_requirements(&self, filter: &RequirementFilter) -> Vec<&Requirement> {
        self.requirements
            .values()
            .filter(|r| filter.matches(r))
            .collect()
    }

    /// Adds a requirement; dangling parent or dependency references are logged, not rejected
    pub(crate) fn add_requirement(&mut self, new: NewRequirement) -> Uuid {
        let requirement = Requirement::new(new);
        let id = requirement.id();
        for issue in self.reference_issues(&requirement) {
            warn!(project_id = %self.id, "{}", issue);
        }
        self.requirements.insert(id, requirement);
        self.touch();
        id
    }

    /// Returns `None` when the requirement is unknown, otherwise whether anything changed
    pub(crate) fn update_requirement(&mut self, id: &Uuid, patch: RequirementPatch) -> Option<bool> {
        let requirement = self.requirements.get_mut(id)?;
        let changed = requirement.apply(patch);
        if changed {
            if let Some(requirement) = self.requirements.get(id) {
                for issue in self.reference_issues(requirement) {
                    warn!(project_id = %self.id, "{}", issue);
                }
            }
            self.touch();
        }
        Some(changed)
    }

    /// Removes the requirement; references to it from other requirements and traces are left dangling
    pub(crate) fn delete_requirement(&mut self, id: &Uuid) -> bool {
        if self.requirements.remove(id).is_some() {
            self.touch();
            true
        } else {
            false
        }
    }

    pub(crate) fn record_refinement(&mut self, id: &Uuid, record: RefinementRecord) -> bool {
        match self.requirements.get_mut(id) {
            Some(requirement) => {
                requirement.record_refinement(record);
                self.touch();
                true
            }
            None => false,
        }
    }

    pub(crate) fn record_feedback(&mut self, id: &Uuid, feedback: &str) -> bool {
        match self.requirements.get_mut(id) {
            Some(requirement) => {
                requirement.record_feedback(feedback);
                self.touch();
                true
            }
            None => false,
        }
    }

    /// Parent id (or root) → direct children, oldest first
    pub fn hierarchy(&self) -> Hierarchy {
        Hierarchy::build(self)
    }

    fn reference_issues(&self, requirement: &Requirement) -> Vec<ValidationIssue> {
        let mut issues = Vec::new();
        if let Some(parent_id) = requirement.parent_id {
            if parent_id == requirement.id() || !self.requirements.contains_key(&parent_id) {
                issues.push(ValidationIssue::DanglingParent {
                    requirement_id: requirement.id(),
                    parent_id,
                });
            }
        }
        for dependency_id in &requirement.dependencies {
            if !self.requirements.contains_key(dependency_id) {
                issues.push(ValidationIssue::DanglingDependency {
                    requirement_id: requirement.id(),
                    dependency_id: *dependency_id,
                });
            }
        }
        issues
    }

    /// Every parent, dependency and trace reference that names a missing requirement
    pub fn validate_references(&self) -> Vec<ValidationIssue> {
        let mut issues: Vec<ValidationIssue> = self
            .requirements
            .values()
            .flat_map(|r| self.reference_issues(r))
            .collect();

        for trace in &self.traces {
            for endpoint in [trace.source_id, trace.target_id] {
                if !self.requirements.contains_key(&endpoint) {
                    issues.push(ValidationIssue::DanglingTraceEndpoint {
                        trace_id: trace.id(),
                        missing_id: endpoint,
                    });
                }
            }
        }
        issues
    }

    // =========================================================================
    // Traces
    // =========================================================================

    pub fn traces(&self) -> &[Trace] {
        &self.traces
    }

    pub fn trace(&self, id: &Uuid) -> Option<&Trace> {
        self.traces.iter().find(|t| &t.id() == id)
    }

    /// Traces where the requirement is source or target
    pub fn traces_for(&self, requirement_id: &Uuid) -> Vec<&Trace> {
        self.traces
            .iter()
            .filter(|t| &t.source_id == requirement_id || &t.target_id == requirement_id)
            .collect()
    }

    /// Adds a trace when both endpoints exist at creation time
    pub(crate) fn add_trace(&mut self, new: NewTrace) -> Option<Uuid> {
        for endpoint in [new.source_id, new.target_id] {
            if !self.requirements.contains_key(&endpoint) {
                warn!(
                    project_id = %self.id,
                    "Trace endpoint {} not found, trace not created", endpoint
                );
                return None;
            }
        }
        let trace = Trace::new(new);
        let id = trace.id();
        self.traces.push(trace);
        self.touch();
        Some(id)
    }

    pub(crate) fn update_trace(&mut self, id: &Uuid, patch: TracePatch) -> Option<bool> {
        let trace = self.traces.iter_mut().find(|t| &t.id() == id)?;
        let changed = trace.apply(patch);
        if changed {
            self.touch();
        }
        Some(changed)
    }

    pub(crate) fn delete_trace(&mut self, id: &Uuid) -> bool {
        let original_len = self.traces.len();
        self.traces.retain(|t| &t.id() != id);
        if self.traces.len() == original_len {
            return false;
        }
        self.touch();
        true
    }
}
