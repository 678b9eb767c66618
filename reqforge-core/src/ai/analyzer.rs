//! Analysis strategies and their composition
//!
//! Callers only see [`QualityAnalyzer`], which always produces a report.
//! Strategies that can fail implement [`AnalysisStrategy`] and are tried in
//! order by [`FallbackAnalyzer`], which ends with the rule-based analyzer.

use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::config::OracleConfig;
use crate::models::{Project, Requirement};

use super::client::OracleError;
use super::oracle::OracleAnalyzer;
use super::report::QualityReport;
use super::rules::RuleBasedAnalyzer;

/// Maximum number of sibling titles passed along as context
const MAX_SIBLING_TITLES: usize = 20;

/// Optional project context for a single analysis
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct AnalysisContext {
    pub project_name: String,
    pub project_description: String,
    /// Requirement type label → number of requirements of that type
    pub counts_by_type: BTreeMap<String, usize>,
    /// Titles of the other requirements in the project
    pub sibling_titles: Vec<String>,
}

impl AnalysisContext {
    pub fn from_project(project: &Project, requirement_id: &Uuid) -> Self {
        let mut counts_by_type: BTreeMap<String, usize> = BTreeMap::new();
        for req in project.requirements() {
            *counts_by_type
                .entry(req.requirement_type.to_string())
                .or_default() += 1;
        }

        let sibling_titles = project
            .requirements()
            .filter(|r| &r.id() != requirement_id)
            .map(|r| r.title.clone())
            .take(MAX_SIBLING_TITLES)
            .collect();

        Self {
            project_name: project.name.clone(),
            project_description: project.description.clone(),
            counts_by_type,
            sibling_titles,
        }
    }
}

/// Produces a quality report for a requirement; never fails
pub trait QualityAnalyzer: Send + Sync {
    fn analyze(&self, requirement: &Requirement, context: Option<&AnalysisContext>) -> QualityReport;
}

/// An analysis strategy that may be unavailable or fail
pub trait AnalysisStrategy: Send + Sync {
    fn name(&self) -> String;

    fn try_analyze(
        &self,
        requirement: &Requirement,
        context: Option<&AnalysisContext>,
    ) -> Result<QualityReport, OracleError>;
}

/// Tries each strategy in order and falls back to the rules
#[derive(Clone, Default)]
pub struct FallbackAnalyzer {
    strategies: Vec<Arc<dyn AnalysisStrategy>>,
    rules: RuleBasedAnalyzer,
}

impl FallbackAnalyzer {
    /// Rules only
    pub fn rules_only() -> Self {
        Self::default()
    }

    pub fn with_strategy(mut self, strategy: Arc<dyn AnalysisStrategy>) -> Self {
        self.strategies.push(strategy);
        self
    }

    /// Oracle first when configured and available, rules last
    pub fn from_config(config: &OracleConfig) -> Self {
        match config.generator() {
            Some(generator) => {
                let oracle = OracleAnalyzer::new(generator, config.settings());
                Self::rules_only().with_strategy(Arc::new(oracle))
            }
            None => Self::rules_only(),
        }
    }

    pub fn strategy_names(&self) -> Vec<String> {
        self.strategies
            .iter()
            .map(|s| s.name())
            .chain(std::iter::once("rules".to_string()))
            .collect()
    }
}

impl QualityAnalyzer for FallbackAnalyzer {
    fn analyze(&self, requirement: &Requirement, context: Option<&AnalysisContext>) -> QualityReport {
        for strategy in &self.strategies {
            match strategy.try_analyze(requirement, context) {
                Ok(report) => {
                    debug!(
                        requirement_id = %requirement.id(),
                        strategy = %strategy.name(),
                        score = report.overall_score,
                        "Analysis complete"
                    );
                    return report;
                }
                Err(e) => warn!(
                    requirement_id = %requirement.id(),
                    strategy = %strategy.name(),
                    "Analysis failed, falling back: {}", e
                ),
            }
        }
        self.rules.analyze(requirement, context)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ai::report::AnalysisSource;
    use crate::models::NewRequirement;

    struct Broken;

    impl AnalysisStrategy for Broken {
        fn name(&self) -> String {
            "broken".into()
        }

        fn try_analyze(
            &self,
            _requirement: &Requirement,
            _context: Option<&AnalysisContext>,
        ) -> Result<QualityReport, OracleError> {
            Err(OracleError::NotAvailable)
        }
    }

    fn project() -> (Project, Uuid) {
        let mut project = Project::new("Shop".into(), "Web shop".into(), BTreeMap::new());
        let id = project.add_requirement(NewRequirement::new("Pay", "Users can pay."));
        project.add_requirement(NewRequirement::new("Browse catalogue", "Users browse products"));
        (project, id)
    }

    #[test]
    fn test_failed_strategy_falls_back_to_rules() {
        let (project, id) = project();
        let req = project.requirement(&id).unwrap();
        let analyzer = FallbackAnalyzer::rules_only().with_strategy(Arc::new(Broken));

        let report = analyzer.analyze(req, None);
        assert_eq!(report, RuleBasedAnalyzer.report(req));
        assert_eq!(report.source, AnalysisSource::Rules);
        assert_eq!(analyzer.strategy_names(), vec!["broken", "rules"]);
    }

    #[test]
    fn test_context_excludes_self() {
        let (project, id) = project();
        let ctx = AnalysisContext::from_project(&project, &id);
        assert_eq!(ctx.project_name, "Shop");
        assert_eq!(ctx.sibling_titles, vec!["Browse catalogue".to_string()]);
        assert_eq!(ctx.counts_by_type.get("functional"), Some(&2));
    }
}
