//! Entity model: projects own requirements and the traces between them

mod project;
mod requirement;
mod trace;

pub use project::{
    Hierarchy, HierarchyKey, Project, ProjectPatch, RequirementFilter, ValidationIssue,
};
pub use requirement::{
    HistoryEntry, NewRequirement, RefinementRecord, Requirement, RequirementPatch,
    RequirementPriority, RequirementStatus, RequirementType, ACCEPTANCE_CRITERIA_KEY,
    REFINEMENT_HISTORY_KEY,
};
pub use trace::{NewTrace, Trace, TraceEdge, TraceGraph, TracePatch, TraceType};
