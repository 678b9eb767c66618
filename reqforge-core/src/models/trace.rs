use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use uuid::Uuid;

use super::project::Project;

/// Represents the kind of link a trace records
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum TraceType {
    /// Source implements target
    Implements,
    /// Source is derived from target
    Derives,
    /// Source verifies target
    Tests,
    /// Source refines target
    Refines,
    /// Undirected association
    RelatesTo,
    /// Custom trace type with user-defined name
    Custom(String),
}

impl TraceType {
    pub fn parse(s: &str) -> Self {
        match s.trim().to_lowercase().replace('_', "-").as_str() {
            "implements" => TraceType::Implements,
            "derives" => TraceType::Derives,
            "tests" | "verifies" => TraceType::Tests,
            "refines" => TraceType::Refines,
            "relates-to" | "relates" | "references" => TraceType::RelatesTo,
            _ => TraceType::Custom(s.trim().to_string()),
        }
    }

    /// Label of the same edge read from the target's side
    pub fn inverse_label(&self) -> String {
        match self {
            TraceType::Implements => "implemented-by".to_string(),
            TraceType::Derives => "derived-from".to_string(),
            TraceType::Tests => "tested-by".to_string(),
            TraceType::Refines => "refined-by".to_string(),
            TraceType::RelatesTo => "relates-to".to_string(),
            TraceType::Custom(name) => format!("{} (inverse)", name),
        }
    }
}

impl fmt::Display for TraceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TraceType::Implements => write!(f, "implements"),
            TraceType::Derives => write!(f, "derives"),
            TraceType::Tests => write!(f, "tests"),
            TraceType::Refines => write!(f, "refines"),
            TraceType::RelatesTo => write!(f, "relates-to"),
            TraceType::Custom(name) => write!(f, "{}", name),
        }
    }
}

impl From<String> for TraceType {
    fn from(s: String) -> Self {
        TraceType::parse(&s)
    }
}

impl From<TraceType> for String {
    fn from(t: TraceType) -> Self {
        t.to_string()
    }
}

/// A typed directed edge between two requirements of one project
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Trace {
    id: Uuid,
    pub source_id: Uuid,
    pub target_id: Uuid,
    pub trace_type: TraceType,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub metadata: BTreeMap<String, Value>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

/// Attributes for a trace about to be created by its project
#[derive(Debug, Clone, PartialEq)]
pub struct NewTrace {
    pub source_id: Uuid,
    pub target_id: Uuid,
    pub trace_type: TraceType,
    pub description: Option<String>,
    pub metadata: BTreeMap<String, Value>,
}

impl NewTrace {
    pub fn new(source_id: Uuid, target_id: Uuid, trace_type: TraceType) -> Self {
        Self {
            source_id,
            target_id,
            trace_type,
            description: None,
            metadata: BTreeMap::new(),
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }
}

/// Partial update of a trace; metadata is merged key by key
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TracePatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trace_type: Option<TraceType>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<BTreeMap<String, Value>>,
}

impl Trace {
    pub(crate) fn new(new: NewTrace) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            source_id: new.source_id,
            target_id: new.target_id,
            trace_type: new.trace_type,
            description: new.description,
            metadata: new.metadata,
            created_at: now,
            updated_at: now,
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

    pub(crate) fn apply(&mut self, patch: TracePatch) -> bool {
        let mut changed = false;
        if let Some(trace_type) = patch.trace_type {
            changed |= self.trace_type != trace_type;
            self.trace_type = trace_type;
        }
        if let Some(description) = patch.description {
            changed |= self.description.as_deref() != Some(description.as_str());
            self.description = Some(description);
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
            self.updated_at = Utc::now();
        }
        changed
    }
}

/// One edge as seen from a particular requirement
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TraceEdge {
    pub trace_id: Uuid,
    /// The requirement at the other end
    pub other_id: Uuid,
    /// Trace type for outgoing edges, inverse label for incoming ones
    pub label: String,
}

/// Bidirectional adjacency view over a project's traces
#[derive(Debug, Clone, Default)]
pub struct TraceGraph {
    outgoing: BTreeMap<Uuid, Vec<TraceEdge>>,
    incoming: BTreeMap<Uuid, Vec<TraceEdge>>,
    dangling: Vec<Uuid>,
}

impl TraceGraph {
    pub fn build(project: &Project) -> Self {
        let mut graph = TraceGraph::default();
        let known: BTreeSet<Uuid> = project.requirements().map(|r| r.id()).collect();

        for trace in project.traces() {
            if !known.contains(&trace.source_id) || !known.contains(&trace.target_id) {
                graph.dangling.push(trace.id());
            }
            graph
                .outgoing
                .entry(trace.source_id)
                .or_default()
                .push(TraceEdge {
                    trace_id: trace.id(),
                    other_id: trace.target_id,
                    label: trace.trace_type.to_string(),
                });
            graph
                .incoming
                .entry(trace.target_id)
                .or_default()
                .push(TraceEdge {
                    trace_id: trace.id(),
                    other_id: trace.source_id,
                    label: trace.trace_type.inverse_label(),
                });
        }

        graph
    }

    pub fn outgoing(&self, requirement_id: &Uuid) -> &[TraceEdge] {
        self.outgoing
            .get(requirement_id)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn incoming(&self, requirement_id: &Uuid) -> &[TraceEdge] {
        self.incoming
            .get(requirement_id)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Both directions, outgoing first
    pub fn edges(&self, requirement_id: &Uuid) -> Vec<TraceEdge> {
        self.outgoing(requirement_id)
            .iter()
            .chain(self.incoming(requirement_id))
            .cloned()
            .collect()
    }

    /// Traces whose source or target no longer exists
    pub fn dangling(&self) -> &[Uuid] {
        &self.dangling
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_trace_type_from_str() {
        assert_eq!(TraceType::parse("implements"), TraceType::Implements);
        assert_eq!(TraceType::parse("Relates_To"), TraceType::RelatesTo);
        assert_eq!(TraceType::parse("verifies"), TraceType::Tests);

        if let TraceType::Custom(name) = TraceType::parse("satisfies") {
            assert_eq!(name, "satisfies");
        } else {
            panic!("Expected Custom variant");
        }
    }

    #[test]
    fn test_trace_type_inverse_label() {
        assert_eq!(TraceType::Implements.inverse_label(), "implemented-by");
        assert_eq!(TraceType::Tests.inverse_label(), "tested-by");
        assert_eq!(TraceType::RelatesTo.inverse_label(), "relates-to");
    }

    #[test]
    fn test_trace_patch_merges_metadata() {
        let mut trace = Trace::new(NewTrace::new(Uuid::new_v4(), Uuid::new_v4(), TraceType::Derives));
        let changed = trace.apply(TracePatch {
            description: Some("derived during review".into()),
            metadata: Some([("reviewer".to_string(), Value::from("kim"))].into_iter().collect()),
            ..Default::default()
        });
        assert!(changed);
        assert_eq!(trace.description.as_deref(), Some("derived during review"));
        assert!(!trace.apply(TracePatch {
            trace_type: Some(TraceType::Derives),
            ..Default::default()
        }));
    }
}
