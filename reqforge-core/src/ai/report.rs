//! Quality report shared by every analysis strategy

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Criterion scores below this are improvement areas
pub const GOOD_CRITERION_THRESHOLD: f64 = 0.7;

/// A requirement is ready for planning when its overall score is strictly above this
pub const REQUIREMENT_READY_THRESHOLD: f64 = 0.7;

/// The five fixed quality criteria
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Criterion {
    Clarity,
    Completeness,
    Testability,
    Feasibility,
    Consistency,
}

impl Criterion {
    pub const ALL: [Criterion; 5] = [
        Criterion::Clarity,
        Criterion::Completeness,
        Criterion::Testability,
        Criterion::Feasibility,
        Criterion::Consistency,
    ];

    /// Weight of the criterion in the overall score; the weights sum to 1
    pub fn weight(self) -> f64 {
        match self {
            Criterion::Clarity => 0.25,
            Criterion::Completeness => 0.25,
            Criterion::Testability => 0.20,
            Criterion::Feasibility => 0.15,
            Criterion::Consistency => 0.15,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Criterion::Clarity => "clarity",
            Criterion::Completeness => "completeness",
            Criterion::Testability => "testability",
            Criterion::Feasibility => "feasibility",
            Criterion::Consistency => "consistency",
        }
    }

    pub fn description(self) -> &'static str {
        match self {
            Criterion::Clarity => "How clear and unambiguous the requirement is",
            Criterion::Completeness => "Whether the requirement contains all necessary information",
            Criterion::Testability => "Whether the requirement can be verified and tested",
            Criterion::Feasibility => "Whether the requirement is technically feasible",
            Criterion::Consistency => "Whether the requirement conflicts with others",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        let s = s.trim().to_lowercase();
        Criterion::ALL.into_iter().find(|c| c.name() == s)
    }
}

impl fmt::Display for Criterion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Score and feedback lines for one criterion
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CriterionScore {
    pub criterion: Criterion,
    pub score: f64,
    #[serde(default)]
    pub feedback: Vec<String>,
}

impl CriterionScore {
    pub fn new(criterion: Criterion, score: f64) -> Self {
        Self {
            criterion,
            score,
            feedback: Vec::new(),
        }
    }

    pub fn with_feedback(mut self, feedback: impl Into<String>) -> Self {
        self.feedback.push(feedback.into());
        self
    }
}

/// Which strategy produced a report
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AnalysisSource {
    Rules,
    Oracle,
}

impl fmt::Display for AnalysisSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AnalysisSource::Rules => write!(f, "rules"),
            AnalysisSource::Oracle => write!(f, "oracle"),
        }
    }
}

/// Scored assessment of one requirement
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QualityReport {
    pub requirement_id: Uuid,
    pub title: String,
    /// One entry per criterion, in [`Criterion::ALL`] order
    pub criteria: Vec<CriterionScore>,
    pub overall_score: f64,
    pub suggestions: Vec<String>,
    pub improvement_areas: Vec<Criterion>,
    pub source: AnalysisSource,
}

impl QualityReport {
    /// Build a report from per-criterion scores
    ///
    /// Scores are clamped to [0, 1]; a criterion that was not supplied
    /// scores the midpoint 0.5. Suggestions are the criterion feedback lines
    /// followed by `extra_suggestions`, without duplicates.
    pub fn assemble(
        requirement_id: Uuid,
        title: impl Into<String>,
        scores: Vec<CriterionScore>,
        extra_suggestions: Vec<String>,
        source: AnalysisSource,
    ) -> Self {
        let criteria: Vec<CriterionScore> = Criterion::ALL
            .into_iter()
            .map(|criterion| {
                let mut entry = scores
                    .iter()
                    .find(|s| s.criterion == criterion)
                    .cloned()
                    .unwrap_or_else(|| CriterionScore::new(criterion, 0.5));
                entry.score = if entry.score.is_finite() {
                    entry.score.clamp(0.0, 1.0)
                } else {
                    0.5
                };
                entry
            })
            .collect();

        let overall_score = criteria
            .iter()
            .map(|c| c.score * c.criterion.weight())
            .sum::<f64>()
            .clamp(0.0, 1.0);

        let improvement_areas = criteria
            .iter()
            .filter(|c| c.score < GOOD_CRITERION_THRESHOLD)
            .map(|c| c.criterion)
            .collect();

        let mut suggestions: Vec<String> = Vec::new();
        let lines = criteria
            .iter()
            .flat_map(|c| c.feedback.iter().cloned())
            .chain(extra_suggestions);
        for line in lines {
            if !suggestions.contains(&line) {
                suggestions.push(line);
            }
        }

        Self {
            requirement_id,
            title: title.into(),
            criteria,
            overall_score,
            suggestions,
            improvement_areas,
            source,
        }
    }

    pub fn criterion(&self, criterion: Criterion) -> Option<&CriterionScore> {
        self.criteria.iter().find(|c| c.criterion == criterion)
    }

    pub fn score(&self, criterion: Criterion) -> f64 {
        self.criterion(criterion).map_or(0.0, |c| c.score)
    }

    /// Overall score strictly above [`REQUIREMENT_READY_THRESHOLD`]
    pub fn is_ready(&self) -> bool {
        self.overall_score > REQUIREMENT_READY_THRESHOLD
    }

    /// Plain text rendering used by presentation layers
    pub fn render_feedback(&self) -> String {
        let mut lines = vec![
            format!("## Quality Analysis for '{}'", self.title),
            String::new(),
            format!("Overall Quality Score: {:.2}/1.0", self.overall_score),
            String::new(),
            "### Criterion Scores:".to_string(),
        ];

        for c in &self.criteria {
            lines.push(format!("- {}: {:.2}", capitalize(c.criterion.name()), c.score));
        }

        lines.push(String::new());
        lines.push("### Improvement Suggestions:".to_string());
        if self.suggestions.is_empty() {
            lines.push("- No specific suggestions - this requirement is well-formed!".to_string());
        } else {
            lines.extend(self.suggestions.iter().map(|s| format!("- {}", s)));
        }

        lines.join("\n")
    }
}

fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_weights_sum_to_one() {
        let total: f64 = Criterion::ALL.iter().map(|c| c.weight()).sum();
        assert!((total - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_assemble_fills_missing_with_midpoint() {
        let report = QualityReport::assemble(
            Uuid::new_v4(),
            "Export",
            vec![CriterionScore::new(Criterion::Clarity, 1.0)],
            Vec::new(),
            AnalysisSource::Oracle,
        );
        assert_eq!(report.criteria.len(), 5);
        assert_eq!(report.score(Criterion::Testability), 0.5);
        let expected = 0.25 + 0.5 * 0.75;
        assert!((report.overall_score - expected).abs() < 1e-9);
        assert_eq!(
            report.improvement_areas,
            vec![
                Criterion::Completeness,
                Criterion::Testability,
                Criterion::Feasibility,
                Criterion::Consistency
            ]
        );
    }

    #[test]
    fn test_assemble_clamps_and_dedups() {
        let report = QualityReport::assemble(
            Uuid::new_v4(),
            "Export",
            vec![
                CriterionScore::new(Criterion::Clarity, 1.7).with_feedback("Be precise"),
                CriterionScore::new(Criterion::Completeness, -0.2).with_feedback("Be precise"),
            ],
            vec!["Be precise".into(), "Add tags".into()],
            AnalysisSource::Rules,
        );
        assert_eq!(report.score(Criterion::Clarity), 1.0);
        assert_eq!(report.score(Criterion::Completeness), 0.0);
        assert_eq!(report.suggestions, vec!["Be precise", "Add tags"]);
    }

    #[test]
    fn test_render_feedback() {
        let report = QualityReport::assemble(
            Uuid::new_v4(),
            "Pay",
            Criterion::ALL
                .into_iter()
                .map(|c| CriterionScore::new(c, 0.9))
                .collect(),
            Vec::new(),
            AnalysisSource::Rules,
        );
        let text = report.render_feedback();
        assert!(text.contains("## Quality Analysis for 'Pay'"));
        assert!(text.contains("Overall Quality Score: 0.90/1.0"));
        assert!(text.contains("- Testability: 0.90"));
        assert!(text.contains("well-formed"));
        assert!(report.is_ready());
    }
}
