//! Requirement quality analysis
//!
//! Rule-based scoring is always available. When an oracle (a text
//! generation service) is configured it is consulted first, and any
//! failure there silently degrades to the rules.

mod analyzer;
pub mod client;
mod oracle;
pub mod prompts;
mod refine;
mod report;
pub mod responses;
mod rules;

pub use analyzer::{AnalysisContext, AnalysisStrategy, FallbackAnalyzer, QualityAnalyzer};
pub use client::{
    call_with_deadline, ClaudeCliGenerator, GenerationSettings, HttpGenerator, OracleError,
    TextGenerator,
};
pub use oracle::OracleAnalyzer;
pub use refine::FeedbackRefiner;
pub use report::{
    AnalysisSource, Criterion, CriterionScore, QualityReport, GOOD_CRITERION_THRESHOLD,
    REQUIREMENT_READY_THRESHOLD,
};
pub use responses::RefinedFields;
pub use rules::RuleBasedAnalyzer;
