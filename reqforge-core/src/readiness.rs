//! Project-level planning readiness
//!
//! Every requirement of a project is analyzed and the results are folded
//! into a single go/no-go decision for the planning step.

use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info};
use uuid::Uuid;

use crate::ai::{AnalysisContext, QualityAnalyzer, QualityReport};
use crate::models::{Project, ValidationIssue};
use crate::store::RequirementsStore;

/// Fraction of ready requirements at which a project is ready (inclusive)
pub const PROJECT_READY_FRACTION: f64 = 0.70;

/// Suggestions kept per requirement in a readiness report
const MAX_SUGGESTIONS: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ReadinessStatus {
    Ready,
    NeedsRefinement,
    Error,
}

impl fmt::Display for ReadinessStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReadinessStatus::Ready => write!(f, "ready"),
            ReadinessStatus::NeedsRefinement => write!(f, "needs_refinement"),
            ReadinessStatus::Error => write!(f, "error"),
        }
    }
}

/// Readiness of one requirement
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RequirementReadiness {
    pub id: Uuid,
    pub title: String,
    pub score: f64,
    pub ready: bool,
    /// Total number of suggestions the analysis produced
    pub issues: usize,
    pub suggestions: Vec<String>,
}

impl From<&QualityReport> for RequirementReadiness {
    fn from(report: &QualityReport) -> Self {
        Self {
            id: report.requirement_id,
            title: report.title.clone(),
            score: report.overall_score,
            ready: report.is_ready(),
            issues: report.suggestions.len(),
            suggestions: report
                .suggestions
                .iter()
                .take(MAX_SUGGESTIONS)
                .cloned()
                .collect(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReadinessReport {
    pub status: ReadinessStatus,
    pub project_id: Uuid,
    pub project_name: Option<String>,
    pub total: usize,
    pub ready_count: usize,
    pub readiness_percentage: f64,
    /// Lowest score first
    pub per_requirement: Vec<RequirementReadiness>,
    /// Dangling parent, dependency and trace references; informational only
    pub reference_issues: Vec<ValidationIssue>,
    pub message: Option<String>,
}

impl ReadinessReport {
    fn error(project_id: Uuid, project_name: Option<String>, message: impl Into<String>) -> Self {
        Self {
            status: ReadinessStatus::Error,
            project_id,
            project_name,
            total: 0,
            ready_count: 0,
            readiness_percentage: 0.0,
            per_requirement: Vec::new(),
            reference_issues: Vec::new(),
            message: Some(message.into()),
        }
    }

    pub fn is_ready(&self) -> bool {
        self.status == ReadinessStatus::Ready
    }
}

/// Aggregates per-requirement analyses into a planning decision
#[derive(Clone)]
pub struct ReadinessGate {
    analyzer: Arc<dyn QualityAnalyzer>,
}

impl ReadinessGate {
    pub fn new(analyzer: Arc<dyn QualityAnalyzer>) -> Self {
        Self { analyzer }
    }

    /// Assess a stored project
    ///
    /// Works on a snapshot, so no project lock is held while analyzing.
    pub fn assess_project(&self, store: &RequirementsStore, project_id: &Uuid) -> ReadinessReport {
        match store.get_project(project_id) {
            Some(project) => self.assess(&project),
            None => ReadinessReport::error(
                *project_id,
                None,
                format!("Project {} not found", project_id),
            ),
        }
    }

    pub fn assess(&self, project: &Project) -> ReadinessReport {
        let total = project.requirement_count();
        if total == 0 {
            return ReadinessReport::error(
                project.id(),
                Some(project.name.clone()),
                "No requirements found in project",
            );
        }

        let mut per_requirement: Vec<RequirementReadiness> = project
            .requirements()
            .map(|req| {
                let context = AnalysisContext::from_project(project, &req.id());
                let report = self.analyzer.analyze(req, Some(&context));
                debug!(
                    requirement_id = %req.id(),
                    score = report.overall_score,
                    "Scored requirement for readiness"
                );
                RequirementReadiness::from(&report)
            })
            .collect();
        per_requirement.sort_by(|a, b| a.score.total_cmp(&b.score));

        let ready_count = per_requirement.iter().filter(|r| r.ready).count();
        let fraction = ready_count as f64 / total as f64;
        let status = if fraction >= PROJECT_READY_FRACTION {
            ReadinessStatus::Ready
        } else {
            ReadinessStatus::NeedsRefinement
        };

        let reference_issues = project.validate_references();

        info!(
            project_id = %project.id(),
            ready = ready_count,
            total,
            status = %status,
            "Assessed planning readiness"
        );

        ReadinessReport {
            status,
            project_id: project.id(),
            project_name: Some(project.name.clone()),
            total,
            ready_count,
            readiness_percentage: fraction * 100.0,
            per_requirement,
            reference_issues,
            message: None,
        }
    }
}
