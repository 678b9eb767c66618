//! Interactive refinement of a single requirement
//!
//! A session analyzes the requirement, presents the report, applies one
//! edit chosen by the user and analyzes again, until the requirement is
//! good enough or the user stops. All interaction goes through
//! [`RefinementIo`] so the loop itself has no terminal dependency.

use chrono::Utc;
use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use thiserror::Error;
use tracing::{debug, info};
use uuid::Uuid;

use crate::ai::{AnalysisContext, Criterion, FeedbackRefiner, QualityAnalyzer, QualityReport, RefinedFields};
use crate::error::StoreError;
use crate::models::{
    NewRequirement, RefinementRecord, Requirement, RequirementPatch, RequirementPriority,
    RequirementType, ACCEPTANCE_CRITERIA_KEY,
};
use crate::store::RequirementsStore;

/// A fresh analysis above this ends the session without presenting anything
pub const AUTO_ACCEPT_THRESHOLD: f64 = 0.85;

#[derive(Debug, Error)]
pub enum RefinementError {
    #[error("Project {0} not found")]
    ProjectNotFound(Uuid),

    #[error("Requirement {requirement_id} not found in project {project_id}")]
    RequirementNotFound { project_id: Uuid, requirement_id: Uuid },

    #[error(transparent)]
    Store(#[from] StoreError),

    /// The caller-input channel failed or was closed
    #[error("Input failed: {0}")]
    Input(#[source] anyhow::Error),
}

/// One of the edits offered after each analysis
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EditChoice {
    UpdateTitle,
    UpdateDescription,
    UpdateType,
    UpdatePriority,
    UpdateTags,
    MarkComplete,
    ShowDetail,
    Exit,
}

impl EditChoice {
    pub const ALL: [EditChoice; 8] = [
        EditChoice::UpdateTitle,
        EditChoice::UpdateDescription,
        EditChoice::UpdateType,
        EditChoice::UpdatePriority,
        EditChoice::UpdateTags,
        EditChoice::MarkComplete,
        EditChoice::ShowDetail,
        EditChoice::Exit,
    ];

    pub fn label(self) -> &'static str {
        match self {
            EditChoice::UpdateTitle => "Update title",
            EditChoice::UpdateDescription => "Update description",
            EditChoice::UpdateType => "Update requirement type",
            EditChoice::UpdatePriority => "Update priority",
            EditChoice::UpdateTags => "Add or update tags",
            EditChoice::MarkComplete => "Mark as complete and finish refinement",
            EditChoice::ShowDetail => "Show detailed analysis",
            EditChoice::Exit => "Exit without further changes",
        }
    }
}

impl fmt::Display for EditChoice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.label())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RefinementStatus {
    /// The first or a later analysis scored above [`AUTO_ACCEPT_THRESHOLD`]
    AutoAccepted,
    /// The user marked the requirement complete
    Finished,
    /// The user left without further changes
    Exited,
}

impl fmt::Display for RefinementStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RefinementStatus::AutoAccepted => write!(f, "auto_accepted"),
            RefinementStatus::Finished => write!(f, "finished"),
            RefinementStatus::Exited => write!(f, "exited"),
        }
    }
}

/// Where a session currently is
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Analyzing,
    Presenting,
    AwaitingChoice,
    ApplyingEdit(EditChoice),
    Done(RefinementStatus),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RefinementOutcome {
    pub status: RefinementStatus,
    pub requirement_id: Uuid,
    /// Overall score of the last analysis
    pub score: f64,
    /// Overall score of the first analysis
    pub score_before: f64,
    /// Criteria that stopped being improvement areas during the session
    pub improved_areas: Vec<Criterion>,
    pub ready_for_planning: bool,
}

/// Caller-input and presentation channel of a session
pub trait RefinementIo {
    /// Read one line of free text; an empty string means "no change"
    fn read_text(&mut self, label: &str) -> anyhow::Result<String>;

    fn present(&mut self, requirement: &Requirement, report: &QualityReport);

    fn choose(&mut self, options: &[EditChoice]) -> anyhow::Result<EditChoice>;

    fn show_detail(&mut self, report: &QualityReport) -> anyhow::Result<()>;

    fn notify(&mut self, message: &str);
}

/// The analyze / present / edit loop for one requirement
pub struct RefinementSession<'a> {
    store: &'a RequirementsStore,
    analyzer: &'a dyn QualityAnalyzer,
    project_id: Uuid,
    requirement_id: Uuid,
    state: SessionState,
}

impl<'a> RefinementSession<'a> {
    /// Session over an existing requirement
    pub fn open(
        store: &'a RequirementsStore,
        analyzer: &'a dyn QualityAnalyzer,
        project_id: Uuid,
        requirement_id: Uuid,
    ) -> Result<Self, RefinementError> {
        lookup(store, &project_id, &requirement_id)?;
        Ok(Self {
            store,
            analyzer,
            project_id,
            requirement_id,
            state: SessionState::Analyzing,
        })
    }

    /// Session over a requirement collected through `io` and created first
    pub fn create(
        store: &'a RequirementsStore,
        analyzer: &'a dyn QualityAnalyzer,
        project_id: Uuid,
        io: &mut dyn RefinementIo,
    ) -> Result<Self, RefinementError> {
        if store.get_project(&project_id).is_none() {
            return Err(RefinementError::ProjectNotFound(project_id));
        }

        let title = io.read_text("Title").map_err(RefinementError::Input)?;
        let title = title.trim();
        if title.is_empty() {
            return Err(RefinementError::Input(anyhow::anyhow!(
                "A requirement needs a title"
            )));
        }
        let description = io
            .read_text("Brief description")
            .map_err(RefinementError::Input)?;

        let requirement_id = store
            .add_requirement(&project_id, NewRequirement::new(title, description.trim()))?
            .ok_or(RefinementError::ProjectNotFound(project_id))?;
        io.notify(&format!("Created new requirement with ID: {}", requirement_id));

        Ok(Self {
            store,
            analyzer,
            project_id,
            requirement_id,
            state: SessionState::Analyzing,
        })
    }

    pub fn requirement_id(&self) -> Uuid {
        self.requirement_id
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    fn transition(&mut self, next: SessionState) {
        debug!(
            requirement_id = %self.requirement_id,
            from = ?self.state,
            to = ?next,
            "Refinement state change"
        );
        self.state = next;
    }

    /// Current requirement plus its project context, without holding a lock afterwards
    fn snapshot(&self) -> Result<(Requirement, Option<AnalysisContext>), RefinementError> {
        let found = self.store.with_project(&self.project_id, |project| {
            project.requirement(&self.requirement_id).map(|req| {
                (
                    req.clone(),
                    AnalysisContext::from_project(project, &self.requirement_id),
                )
            })
        });
        match found {
            None => Err(RefinementError::ProjectNotFound(self.project_id)),
            Some(None) => Err(RefinementError::RequirementNotFound {
                project_id: self.project_id,
                requirement_id: self.requirement_id,
            }),
            Some(Some((req, context))) => Ok((req, Some(context))),
        }
    }

    /// Drive the session to completion
    pub fn run(&mut self, io: &mut dyn RefinementIo) -> Result<RefinementOutcome, RefinementError> {
        let mut first: Option<QualityReport> = None;

        let (status, last) = 'session: loop {
            self.transition(SessionState::Analyzing);
            let (requirement, context) = self.snapshot()?;
            let report = self.analyzer.analyze(&requirement, context.as_ref());
            if first.is_none() {
                first = Some(report.clone());
            }

            if report.overall_score > AUTO_ACCEPT_THRESHOLD {
                io.notify("This requirement is well-defined and ready for planning!");
                break (RefinementStatus::AutoAccepted, report);
            }

            self.transition(SessionState::Presenting);
            io.present(&requirement, &report);

            let choice = loop {
                self.transition(SessionState::AwaitingChoice);
                let choice = io.choose(&EditChoice::ALL).map_err(RefinementError::Input)?;
                match choice {
                    EditChoice::MarkComplete => break 'session (RefinementStatus::Finished, report),
                    EditChoice::Exit => break 'session (RefinementStatus::Exited, report),
                    EditChoice::ShowDetail => {
                        io.show_detail(&report).map_err(RefinementError::Input)?
                    }
                    edit => break edit,
                }
            };

            self.transition(SessionState::ApplyingEdit(choice));
            if let Some(patch) = read_patch(choice, &requirement, io)? {
                let found = self
                    .store
                    .update_requirement(&self.project_id, &self.requirement_id, patch)?;
                if !found {
                    return Err(RefinementError::RequirementNotFound {
                        project_id: self.project_id,
                        requirement_id: self.requirement_id,
                    });
                }
            }
        };

        self.transition(SessionState::Done(status));
        let first = first.unwrap_or_else(|| last.clone());
        let improved_areas: Vec<Criterion> = first
            .improvement_areas
            .iter()
            .filter(|c| !last.improvement_areas.contains(c))
            .copied()
            .collect();

        let record = RefinementRecord {
            timestamp: Utc::now(),
            score_before: first.overall_score,
            score_after: last.overall_score,
            improved_areas: improved_areas.iter().map(|c| c.name().to_string()).collect(),
        };
        let recorded = self
            .store
            .record_refinement(&self.project_id, &self.requirement_id, record)?;
        if !recorded {
            return Err(RefinementError::RequirementNotFound {
                project_id: self.project_id,
                requirement_id: self.requirement_id,
            });
        }

        info!(
            requirement_id = %self.requirement_id,
            status = %status,
            before = first.overall_score,
            after = last.overall_score,
            "Refinement session finished"
        );

        Ok(RefinementOutcome {
            status,
            requirement_id: self.requirement_id,
            score: last.overall_score,
            score_before: first.overall_score,
            improved_areas,
            ready_for_planning: last.is_ready(),
        })
    }
}

/// Ask for the new value of the field behind `choice`
///
/// Blank input and unparseable priorities produce no patch.
fn read_patch(
    choice: EditChoice,
    requirement: &Requirement,
    io: &mut dyn RefinementIo,
) -> Result<Option<RequirementPatch>, RefinementError> {
    let mut read = |label: String| -> Result<Option<String>, RefinementError> {
        let input = io.read_text(&label).map_err(RefinementError::Input)?;
        let input = input.trim();
        Ok((!input.is_empty()).then(|| input.to_string()))
    };

    let patch = match choice {
        EditChoice::UpdateTitle => read(format!("New title (current: {})", requirement.title))?
            .map(|title| RequirementPatch {
                title: Some(title),
                ..Default::default()
            }),
        EditChoice::UpdateDescription => read("New description".to_string())?.map(|description| {
            RequirementPatch {
                description: Some(description),
                ..Default::default()
            }
        }),
        EditChoice::UpdateType => {
            let known: Vec<String> = RequirementType::KNOWN.iter().map(|t| t.to_string()).collect();
            read(format!(
                "New type (current: {}; known: {})",
                requirement.requirement_type,
                known.join(", ")
            ))?
            .map(|t| RequirementPatch {
                requirement_type: Some(RequirementType::parse(&t)),
                ..Default::default()
            })
        }
        EditChoice::UpdatePriority => {
            let current = requirement
                .priority
                .map_or_else(|| "none".to_string(), |p| p.to_string());
            match read(format!(
                "New priority (current: {}; low, medium, high, critical)",
                current
            ))? {
                None => None,
                Some(input) => match RequirementPriority::parse(&input) {
                    Some(priority) => Some(RequirementPatch {
                        priority: Some(priority),
                        ..Default::default()
                    }),
                    None => {
                        io.notify(&format!(
                            "Unknown priority '{}', expected low, medium, high or critical",
                            input
                        ));
                        None
                    }
                },
            }
        }
        EditChoice::UpdateTags => {
            let current: Vec<&str> = requirement.tags.iter().map(String::as_str).collect();
            let current = if current.is_empty() {
                "none".to_string()
            } else {
                current.join(", ")
            };
            read(format!("New tags, comma-separated (current: {})", current))?.and_then(|input| {
                let tags = parse_tags(&input);
                (!tags.is_empty()).then(|| RequirementPatch {
                    tags: Some(tags.into_iter().collect()),
                    ..Default::default()
                })
            })
        }
        EditChoice::MarkComplete | EditChoice::ShowDetail | EditChoice::Exit => None,
    };
    Ok(patch)
}

fn parse_tags(input: &str) -> Vec<String> {
    input
        .split(',')
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(str::to_string)
        .collect()
}

fn lookup(
    store: &RequirementsStore,
    project_id: &Uuid,
    requirement_id: &Uuid,
) -> Result<Requirement, RefinementError> {
    match store.with_project(project_id, |p| p.requirement(requirement_id).cloned()) {
        None => Err(RefinementError::ProjectNotFound(*project_id)),
        Some(None) => Err(RefinementError::RequirementNotFound {
            project_id: *project_id,
            requirement_id: *requirement_id,
        }),
        Some(Some(req)) => Ok(req),
    }
}

/// Result of refining a requirement from free-text feedback
#[derive(Debug, Clone, PartialEq)]
pub struct FeedbackOutcome {
    pub requirement_id: Uuid,
    pub fields: RefinedFields,
    /// Difference between the revised fields and the stored requirement
    pub patch: RequirementPatch,
    pub applied: bool,
}

/// Revise a requirement from feedback, optionally applying the revision
///
/// The oracle is consulted on a snapshot so no project lock is held while
/// it runs. The feedback is always noted in the requirement's history.
pub fn refine_with_feedback(
    store: &RequirementsStore,
    refiner: &FeedbackRefiner,
    project_id: &Uuid,
    requirement_id: &Uuid,
    feedback: &str,
    auto_update: bool,
) -> Result<FeedbackOutcome, RefinementError> {
    let requirement = lookup(store, project_id, requirement_id)?;
    let fields = refiner.refine(&requirement, feedback);
    let patch = revision_patch(&requirement, &fields);

    store.record_feedback(project_id, requirement_id, feedback)?;

    let applied = if auto_update && !patch.is_empty() {
        store.update_requirement(project_id, requirement_id, patch.clone())?
    } else {
        false
    };
    info!(
        requirement_id = %requirement_id,
        applied,
        "Refined requirement from feedback"
    );

    Ok(FeedbackOutcome {
        requirement_id: *requirement_id,
        fields,
        patch,
        applied,
    })
}

fn revision_patch(requirement: &Requirement, fields: &RefinedFields) -> RequirementPatch {
    let mut patch = RequirementPatch::default();
    if fields.title != requirement.title {
        patch.title = Some(fields.title.clone());
    }
    if fields.description != requirement.description {
        patch.description = Some(fields.description.clone());
    }
    if fields.requirement_type != requirement.requirement_type {
        patch.requirement_type = Some(fields.requirement_type.clone());
    }
    if fields.priority.is_some() && fields.priority != requirement.priority {
        patch.priority = fields.priority;
    }
    if !fields.acceptance_criteria.is_empty() {
        let criteria = Value::Array(
            fields
                .acceptance_criteria
                .iter()
                .cloned()
                .map(Value::String)
                .collect(),
        );
        if requirement.metadata.get(ACCEPTANCE_CRITERIA_KEY) != Some(&criteria) {
            patch.metadata = Some(BTreeMap::from([(
                ACCEPTANCE_CRITERIA_KEY.to_string(),
                criteria,
            )]));
        }
    }
    patch
}
