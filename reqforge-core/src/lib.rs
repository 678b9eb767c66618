pub mod ai;
pub mod config;
pub mod db;
pub mod error;
pub mod export;
pub mod models;
pub mod planning;
pub mod readiness;
pub mod refinement;
pub mod store;

// Re-export commonly used types
pub use ai::{
    AnalysisContext, AnalysisSource, Criterion, CriterionScore, FallbackAnalyzer,
    FeedbackRefiner, OracleAnalyzer, OracleError, QualityAnalyzer, QualityReport,
    RuleBasedAnalyzer, TextGenerator, GOOD_CRITERION_THRESHOLD, REQUIREMENT_READY_THRESHOLD,
};
pub use config::{Config, OracleConfig, OracleMode, StorageConfig};
pub use db::{create_backend, BackendType, JsonDirBackend, MemoryBackend, ProjectBackend, SqliteBackend};
pub use error::StoreError;
pub use models::{
    Hierarchy, HierarchyKey, HistoryEntry, NewRequirement, NewTrace, Project, ProjectPatch,
    RefinementRecord, Requirement, RequirementFilter, RequirementPatch, RequirementPriority,
    RequirementStatus, RequirementType, Trace, TraceEdge, TraceGraph, TracePatch, TraceType,
    ValidationIssue,
};
pub use planning::PlanningContext;
pub use readiness::{
    ReadinessGate, ReadinessReport, ReadinessStatus, RequirementReadiness, PROJECT_READY_FRACTION,
};
pub use refinement::{
    refine_with_feedback, EditChoice, FeedbackOutcome, RefinementError, RefinementIo,
    RefinementOutcome, RefinementSession, RefinementStatus, SessionState, AUTO_ACCEPT_THRESHOLD,
};
pub use store::RequirementsStore;
