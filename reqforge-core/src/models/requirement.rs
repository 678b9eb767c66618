use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use uuid::Uuid;

/// Metadata key holding the list of refinement session outcomes
pub const REFINEMENT_HISTORY_KEY: &str = "refinement_history";

/// Metadata key holding acceptance criteria proposed by feedback refinement
pub const ACCEPTANCE_CRITERIA_KEY: &str = "acceptance_criteria";

/// Represents the status of a requirement
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "kebab-case")]
pub enum RequirementStatus {
    New,
    Accepted,
    InProgress,
    Completed,
    Rejected,
}

impl RequirementStatus {
    pub const ALL: [RequirementStatus; 5] = [
        RequirementStatus::New,
        RequirementStatus::Accepted,
        RequirementStatus::InProgress,
        RequirementStatus::Completed,
        RequirementStatus::Rejected,
    ];

    /// Parse a status leniently ("in progress", "in_progress" and "in-progress" all match)
    pub fn parse(s: &str) -> Option<Self> {
        match normalize_label(s).as_str() {
            "new" => Some(RequirementStatus::New),
            "accepted" => Some(RequirementStatus::Accepted),
            "in-progress" | "inprogress" => Some(RequirementStatus::InProgress),
            "completed" | "complete" | "done" => Some(RequirementStatus::Completed),
            "rejected" => Some(RequirementStatus::Rejected),
            _ => None,
        }
    }
}

impl Default for RequirementStatus {
    fn default() -> Self {
        RequirementStatus::New
    }
}

impl fmt::Display for RequirementStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RequirementStatus::New => write!(f, "new"),
            RequirementStatus::Accepted => write!(f, "accepted"),
            RequirementStatus::InProgress => write!(f, "in-progress"),
            RequirementStatus::Completed => write!(f, "completed"),
            RequirementStatus::Rejected => write!(f, "rejected"),
        }
    }
}

/// Represents the priority of a requirement
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "lowercase")]
pub enum RequirementPriority {
    Low,
    Medium,
    High,
    Critical,
}

impl RequirementPriority {
    pub const ALL: [RequirementPriority; 4] = [
        RequirementPriority::Low,
        RequirementPriority::Medium,
        RequirementPriority::High,
        RequirementPriority::Critical,
    ];

    pub fn parse(s: &str) -> Option<Self> {
        match normalize_label(s).as_str() {
            "low" => Some(RequirementPriority::Low),
            "medium" | "med" => Some(RequirementPriority::Medium),
            "high" => Some(RequirementPriority::High),
            "critical" => Some(RequirementPriority::Critical),
            _ => None,
        }
    }
}

impl fmt::Display for RequirementPriority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RequirementPriority::Low => write!(f, "low"),
            RequirementPriority::Medium => write!(f, "medium"),
            RequirementPriority::High => write!(f, "high"),
            RequirementPriority::Critical => write!(f, "critical"),
        }
    }
}

/// Represents the type of a requirement
///
/// The set is open: anything that is not one of the conventional kinds is
/// kept verbatim as `Custom`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum RequirementType {
    Functional,
    NonFunctional,
    Constraint,
    Security,
    Performance,
    Ux,
    Custom(String),
}

impl RequirementType {
    /// The conventional kinds, in presentation order
    pub const KNOWN: [RequirementType; 6] = [
        RequirementType::Functional,
        RequirementType::NonFunctional,
        RequirementType::Constraint,
        RequirementType::Security,
        RequirementType::Performance,
        RequirementType::Ux,
    ];

    /// Parse a requirement type from a string
    pub fn parse(s: &str) -> Self {
        match normalize_label(s).as_str() {
            "functional" => RequirementType::Functional,
            "non-functional" | "nonfunctional" => RequirementType::NonFunctional,
            "constraint" | "constraints" => RequirementType::Constraint,
            "security" => RequirementType::Security,
            "performance" => RequirementType::Performance,
            "ux" | "usability" => RequirementType::Ux,
            _ => RequirementType::Custom(s.trim().to_string()),
        }
    }
}

impl Default for RequirementType {
    fn default() -> Self {
        RequirementType::Functional
    }
}

impl fmt::Display for RequirementType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RequirementType::Functional => write!(f, "functional"),
            RequirementType::NonFunctional => write!(f, "non-functional"),
            RequirementType::Constraint => write!(f, "constraint"),
            RequirementType::Security => write!(f, "security"),
            RequirementType::Performance => write!(f, "performance"),
            RequirementType::Ux => write!(f, "ux"),
            RequirementType::Custom(name) => write!(f, "{}", name),
        }
    }
}

impl From<String> for RequirementType {
    fn from(s: String) -> Self {
        RequirementType::parse(&s)
    }
}

impl From<RequirementType> for String {
    fn from(t: RequirementType) -> Self {
        t.to_string()
    }
}

fn normalize_label(s: &str) -> String {
    s.trim().to_lowercase().replace(['_', ' '], "-")
}

/// One entry of a requirement's append-only history
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct HistoryEntry {
    pub timestamp: DateTime<Utc>,
    pub action: String,
    pub description: String,
}

/// Outcome of a refinement session, stored under `refinement_history`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RefinementRecord {
    pub timestamp: DateTime<Utc>,
    pub score_before: f64,
    pub score_after: f64,
    /// Criteria that were improvement areas at the start and are no longer
    pub improved_areas: Vec<String>,
}

/// Attributes for a requirement about to be created by its project
#[derive(Debug, Clone, PartialEq)]
pub struct NewRequirement {
    pub title: String,
    pub description: String,
    pub requirement_type: RequirementType,
    pub priority: Option<RequirementPriority>,
    pub status: RequirementStatus,
    pub tags: BTreeSet<String>,
    pub parent_id: Option<Uuid>,
    pub dependencies: BTreeSet<Uuid>,
    pub metadata: BTreeMap<String, Value>,
    pub created_by: Option<String>,
}

impl NewRequirement {
    /// A functional, medium priority requirement with no links
    pub fn new(title: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            description: description.into(),
            requirement_type: RequirementType::Functional,
            priority: Some(RequirementPriority::Medium),
            status: RequirementStatus::New,
            tags: BTreeSet::new(),
            parent_id: None,
            dependencies: BTreeSet::new(),
            metadata: BTreeMap::new(),
            created_by: None,
        }
    }

    pub fn with_type(mut self, requirement_type: RequirementType) -> Self {
        self.requirement_type = requirement_type;
        self
    }

    pub fn with_priority(mut self, priority: Option<RequirementPriority>) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags = tags.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_parent(mut self, parent_id: Uuid) -> Self {
        self.parent_id = Some(parent_id);
        self
    }

    pub fn with_dependencies<I: IntoIterator<Item = Uuid>>(mut self, dependencies: I) -> Self {
        self.dependencies = dependencies.into_iter().collect();
        self
    }

    pub fn created_by(mut self, creator: impl Into<String>) -> Self {
        self.created_by = Some(creator.into());
        self
    }
}

/// Field-level partial update of a requirement
///
/// `None` leaves a field untouched. `parent_id: Some(None)` clears the parent.
/// `metadata` is merged key by key into the existing metadata.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RequirementPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub requirement_type: Option<RequirementType>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub priority: Option<RequirementPriority>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<RequirementStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tags: Option<BTreeSet<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<Option<Uuid>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dependencies: Option<BTreeSet<Uuid>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<BTreeMap<String, Value>>,
}

impl RequirementPatch {
    pub fn is_empty(&self) -> bool {
        self == &RequirementPatch::default()
    }
}

/// Represents a single requirement in a project
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Requirement {
    /// Unique identifier, assigned at creation and never changed
    id: Uuid,

    /// Short title describing the requirement
    pub title: String,

    /// Detailed description of the requirement
    pub description: String,

    pub requirement_type: RequirementType,

    /// Priority level, absent when never assigned
    pub priority: Option<RequirementPriority>,

    pub status: RequirementStatus,

    /// Tags for categorizing the requirement
    #[serde(default)]
    pub tags: BTreeSet<String>,

    /// Parent requirement in the same project
    #[serde(default)]
    pub parent_id: Option<Uuid>,

    /// IDs of requirements this requirement depends on
    #[serde(default)]
    pub dependencies: BTreeSet<Uuid>,

    #[serde(default)]
    pub metadata: BTreeMap<String, Value>,

    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,

    #[serde(default)]
    pub created_by: Option<String>,

    #[serde(default)]
    history: Vec<HistoryEntry>,
}

impl Requirement {
    /// Creates a requirement; only projects call this
    pub(crate) fn new(new: NewRequirement) -> Self {
        let now = Utc::now();
        let mut requirement = Self {
            id: Uuid::new_v4(),
            title: new.title,
            description: new.description,
            requirement_type: new.requirement_type,
            priority: new.priority,
            status: new.status,
            tags: new.tags,
            parent_id: new.parent_id,
            dependencies: new.dependencies,
            metadata: new.metadata,
            created_at: now,
            updated_at: now,
            created_by: new.created_by,
            history: Vec::new(),
        };
        requirement.push_history("created", "Requirement created".to_string());
        requirement
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

    pub fn history(&self) -> &[HistoryEntry] {
        &self.history
    }

    /// Refinement session outcomes recorded so far, oldest first
    pub fn refinement_history(&self) -> Vec<RefinementRecord> {
        self.metadata
            .get(REFINEMENT_HISTORY_KEY)
            .and_then(|v| serde_json::from_value(v.clone()).ok())
            .unwrap_or_default()
    }

    /// Apply a partial update
    ///
    /// Every changed field is described in a single history entry. Returns
    /// false (and leaves `updated_at` alone) when nothing actually changed.
    pub(crate) fn apply(&mut self, patch: RequirementPatch) -> bool {
        let mut changes = Vec::new();

        track(&mut changes, "title", &mut self.title, patch.title, |v| v.clone());
        track(
            &mut changes,
            "description",
            &mut self.description,
            patch.description,
            |v| v.clone(),
        );
        track(
            &mut changes,
            "requirement_type",
            &mut self.requirement_type,
            patch.requirement_type,
            |v| v.to_string(),
        );
        track(
            &mut changes,
            "priority",
            &mut self.priority,
            patch.priority.map(Some),
            |v| v.map(|p| p.to_string()).unwrap_or_else(|| "none".into()),
        );
        track(&mut changes, "status", &mut self.status, patch.status, |v| {
            v.to_string()
        });
        track(&mut changes, "tags", &mut self.tags, patch.tags, |v| {
            format!("[{}]", v.iter().cloned().collect::<Vec<_>>().join(", "))
        });
        track(
            &mut changes,
            "parent_id",
            &mut self.parent_id,
            patch.parent_id,
            |v| v.map(|id| id.to_string()).unwrap_or_else(|| "none".into()),
        );
        track(
            &mut changes,
            "dependencies",
            &mut self.dependencies,
            patch.dependencies,
            |v| format!("{} item(s)", v.len()),
        );

        if let Some(metadata) = patch.metadata {
            for (key, value) in metadata {
                if self.metadata.get(&key) != Some(&value) {
                    changes.push(format!("metadata.{}", key));
                    self.metadata.insert(key, value);
                }
            }
        }

        if changes.is_empty() {
            return false;
        }

        self.updated_at = Utc::now();
        self.push_history("updated", format!("Updated attributes: {}", changes.join(", ")));
        true
    }

    pub(crate) fn record_refinement(&mut self, record: RefinementRecord) {
        let entry = serde_json::to_value(&record).unwrap_or(Value::Null);
        let slot = self
            .metadata
            .entry(REFINEMENT_HISTORY_KEY.to_string())
            .or_insert_with(|| Value::Array(Vec::new()));
        if !slot.is_array() {
            *slot = Value::Array(Vec::new());
        }
        if let Value::Array(items) = slot {
            items.push(entry);
        }

        self.updated_at = Utc::now();
        self.push_history(
            "refined",
            format!(
                "Refinement session: score {:.2} -> {:.2}",
                record.score_before, record.score_after
            ),
        );
    }

    pub(crate) fn record_feedback(&mut self, feedback: &str) {
        self.updated_at = Utc::now();
        self.push_history("feedback", format!("Feedback received: {}", feedback));
    }

    fn push_history(&mut self, action: &str, description: String) {
        self.history.push(HistoryEntry {
            timestamp: Utc::now(),
            action: action.to_string(),
            description,
        });
    }
}

/// Overwrite `slot` with `value` when it differs, noting the change
fn track<T: PartialEq>(
    changes: &mut Vec<String>,
    name: &str,
    slot: &mut T,
    value: Option<T>,
    render: impl Fn(&T) -> String,
) {
    if let Some(value) = value {
        if *slot != value {
            changes.push(format!("{}: {} -> {}", name, render(slot), render(&value)));
            *slot = value;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample() -> Requirement {
        Requirement::new(NewRequirement::new("Login form", "Users log in with email"))
    }

    #[test]
    fn test_new_requirement_has_created_history() {
        let req = sample();
        assert_eq!(req.history().len(), 1);
        assert_eq!(req.history()[0].action, "created");
        assert_eq!(req.created_at(), req.updated_at());
        assert_eq!(req.priority, Some(RequirementPriority::Medium));
    }

    #[test]
    fn test_apply_records_one_entry_for_many_fields() {
        let mut req = sample();
        let changed = req.apply(RequirementPatch {
            title: Some("Login page".into()),
            priority: Some(RequirementPriority::High),
            tags: Some(["auth".to_string()].into_iter().collect()),
            ..Default::default()
        });

        assert!(changed);
        assert_eq!(req.history().len(), 2);
        let entry = &req.history()[1];
        assert_eq!(entry.action, "updated");
        assert!(entry.description.contains("title: Login form -> Login page"));
        assert!(entry.description.contains("priority: medium -> high"));
        assert!(entry.description.contains("tags"));
    }

    #[test]
    fn test_apply_without_change_leaves_history() {
        let mut req = sample();
        let changed = req.apply(RequirementPatch {
            title: Some("Login form".into()),
            ..Default::default()
        });
        assert!(!changed);
        assert_eq!(req.history().len(), 1);
    }

    #[test]
    fn test_apply_merges_metadata() {
        let mut req = sample();
        req.apply(RequirementPatch {
            metadata: Some([("owner".to_string(), json!("ana"))].into_iter().collect()),
            ..Default::default()
        });
        req.apply(RequirementPatch {
            metadata: Some([("source".to_string(), json!("workshop"))].into_iter().collect()),
            ..Default::default()
        });
        assert_eq!(req.metadata.get("owner"), Some(&json!("ana")));
        assert_eq!(req.metadata.get("source"), Some(&json!("workshop")));
    }

    #[test]
    fn test_clear_parent() {
        let parent = Uuid::new_v4();
        let mut req = Requirement::new(NewRequirement::new("Child", "desc").with_parent(parent));
        assert!(req.apply(RequirementPatch {
            parent_id: Some(None),
            ..Default::default()
        }));
        assert_eq!(req.parent_id, None);
    }

    #[test]
    fn test_record_refinement_appends() {
        let mut req = sample();
        for score in [0.4, 0.6] {
            req.record_refinement(RefinementRecord {
                timestamp: Utc::now(),
                score_before: score,
                score_after: score + 0.3,
                improved_areas: vec!["clarity".into()],
            });
        }
        let records = req.refinement_history();
        assert_eq!(records.len(), 2);
        assert_eq!(records[1].score_before, 0.6);
        assert_eq!(req.history().last().unwrap().action, "refined");
    }

    #[test]
    fn test_requirement_type_parse_and_serde() {
        assert_eq!(RequirementType::parse("Non_Functional"), RequirementType::NonFunctional);
        assert_eq!(
            RequirementType::parse("regulatory"),
            RequirementType::Custom("regulatory".into())
        );
        let json = serde_json::to_string(&RequirementType::NonFunctional).unwrap();
        assert_eq!(json, "\"non-functional\"");
        let back: RequirementType = serde_json::from_str("\"compliance\"").unwrap();
        assert_eq!(back, RequirementType::Custom("compliance".into()));
    }

    #[test]
    fn test_status_and_priority_parse() {
        assert_eq!(RequirementStatus::parse("In Progress"), Some(RequirementStatus::InProgress));
        assert_eq!(RequirementStatus::parse("bogus"), None);
        assert_eq!(RequirementPriority::parse(" HIGH "), Some(RequirementPriority::High));
        assert_eq!(
            serde_json::to_string(&RequirementStatus::InProgress).unwrap(),
            "\"in-progress\""
        );
    }
}
