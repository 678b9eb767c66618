//! Project context handed to a planning collaborator

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use uuid::Uuid;

use crate::models::{
    Project, Requirement, RequirementPriority, RequirementStatus, RequirementType,
};

/// High and critical titles listed in the objective
const MAX_PRIMARY_GOALS: usize = 3;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProjectInfo {
    pub id: Uuid,
    pub name: String,
    pub description: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Requirement fields relevant to planning
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PlannedRequirement {
    pub id: Uuid,
    pub title: String,
    pub description: String,
    pub status: RequirementStatus,
    pub priority: Option<RequirementPriority>,
    pub tags: BTreeSet<String>,
}

impl From<&Requirement> for PlannedRequirement {
    fn from(req: &Requirement) -> Self {
        Self {
            id: req.id(),
            title: req.title.clone(),
            description: req.description.clone(),
            status: req.status,
            priority: req.priority,
            tags: req.tags.clone(),
        }
    }
}

/// Requirements bucketed by kind; anything not non-functional or a
/// constraint counts as functional
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RequirementBuckets {
    pub functional: Vec<PlannedRequirement>,
    pub non_functional: Vec<PlannedRequirement>,
    pub constraints: Vec<PlannedRequirement>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PriorityBuckets {
    pub critical: Vec<Uuid>,
    pub high: Vec<Uuid>,
    pub medium: Vec<Uuid>,
    pub low: Vec<Uuid>,
    pub unspecified: Vec<Uuid>,
}

impl PriorityBuckets {
    fn push(&mut self, priority: Option<RequirementPriority>, id: Uuid) {
        let bucket = match priority {
            Some(RequirementPriority::Critical) => &mut self.critical,
            Some(RequirementPriority::High) => &mut self.high,
            Some(RequirementPriority::Medium) => &mut self.medium,
            Some(RequirementPriority::Low) => &mut self.low,
            None => &mut self.unspecified,
        };
        bucket.push(id);
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PlanningContext {
    pub project_info: ProjectInfo,
    pub objective: String,
    pub requirements: RequirementBuckets,
    pub priorities: PriorityBuckets,
    /// Only requirements that declare dependencies appear here
    pub dependencies: BTreeMap<Uuid, Vec<Uuid>>,
}

impl PlanningContext {
    pub fn from_project(project: &Project) -> Self {
        let mut ordered: Vec<&Requirement> = project.requirements().collect();
        ordered.sort_by(|a, b| {
            a.created_at()
                .cmp(&b.created_at())
                .then_with(|| a.id().cmp(&b.id()))
        });

        let mut requirements = RequirementBuckets::default();
        let mut priorities = PriorityBuckets::default();
        let mut dependencies = BTreeMap::new();

        for req in &ordered {
            let planned = PlannedRequirement::from(*req);
            match req.requirement_type {
                RequirementType::NonFunctional => requirements.non_functional.push(planned),
                RequirementType::Constraint => requirements.constraints.push(planned),
                _ => requirements.functional.push(planned),
            }
            priorities.push(req.priority, req.id());
            if !req.dependencies.is_empty() {
                dependencies.insert(req.id(), req.dependencies.iter().copied().collect());
            }
        }

        Self {
            project_info: ProjectInfo {
                id: project.id(),
                name: project.name.clone(),
                description: project.description.clone(),
                created_at: project.created_at(),
                updated_at: project.updated_at(),
            },
            objective: compile_objective(project, &ordered),
            requirements,
            priorities,
            dependencies,
        }
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}

fn compile_objective(project: &Project, ordered: &[&Requirement]) -> String {
    let mut objective = format!("Create a plan for {}", project.name);
    if !project.description.trim().is_empty() {
        objective.push_str(&format!(": {}", project.description.trim()));
    }

    let goals: Vec<&str> = ordered
        .iter()
        .filter(|r| {
            matches!(
                r.priority,
                Some(RequirementPriority::High | RequirementPriority::Critical)
            )
        })
        .map(|r| r.title.as_str())
        .take(MAX_PRIMARY_GOALS)
        .collect();
    if !goals.is_empty() {
        objective.push_str("\n\nPrimary goals:");
        for title in goals {
            objective.push_str(&format!("\n- {}", title));
        }
    }
    objective
}
