//! Deterministic, lexical quality rules
//!
//! These are shallow heuristics over the title and description text. They
//! never look at other requirements, so consistency is a fixed score.

use crate::models::{Requirement, RequirementType};

use super::analyzer::{AnalysisContext, QualityAnalyzer};
use super::report::{AnalysisSource, Criterion, CriterionScore, QualityReport};

const SHORT_TITLE_CHARS: usize = 10;
const LONG_TITLE_CHARS: usize = 100;
const BRIEF_DESCRIPTION_CHARS: usize = 30;
const MAX_COMPLEXITY_TERMS: usize = 3;
const CONSISTENCY_SCORE: f64 = 0.7;

const VERIFICATION_TERMS: [&str; 7] = [
    "measure",
    "verify",
    "test",
    "validate",
    "check",
    "confirm",
    "demonstrate",
];

const COMPLEXITY_TERMS: [&str; 9] = [
    "complex",
    "difficult",
    "challenging",
    "integrate",
    "multiple",
    "all",
    "every",
    "always",
    "never",
];

const WEAK_WORDS: [&str; 7] = ["may", "might", "could", "should", "would", "can", "optionally"];

/// Rule-based analysis strategy; always available
#[derive(Debug, Clone, Copy, Default)]
pub struct RuleBasedAnalyzer;

impl RuleBasedAnalyzer {
    pub fn new() -> Self {
        Self
    }

    pub fn report(&self, requirement: &Requirement) -> QualityReport {
        let description = requirement.description.to_lowercase();

        let scores = vec![
            clarity(&requirement.title),
            completeness(requirement, &description),
            testability(&description),
            feasibility(&description),
            CriterionScore::new(Criterion::Consistency, CONSISTENCY_SCORE),
        ];

        let mut extra = Vec::new();
        if requirement.requirement_type == RequirementType::Functional
            && !description.contains("shall")
        {
            extra.push(
                "Consider using 'shall' statements for functional requirements (e.g., 'The system shall...')"
                    .to_string(),
            );
        }

        let weak = weak_words(&description);
        if !weak.is_empty() {
            extra.push(format!(
                "Replace weak words ({}) with more definitive terms",
                weak.join(", ")
            ));
        }

        QualityReport::assemble(
            requirement.id(),
            requirement.title.clone(),
            scores,
            extra,
            AnalysisSource::Rules,
        )
    }
}

impl QualityAnalyzer for RuleBasedAnalyzer {
    fn analyze(&self, requirement: &Requirement, _context: Option<&AnalysisContext>) -> QualityReport {
        self.report(requirement)
    }
}

fn clarity(title: &str) -> CriterionScore {
    let len = title.trim().chars().count();
    if len < SHORT_TITLE_CHARS {
        CriterionScore::new(Criterion::Clarity, 0.3).with_feedback(
            "Title is too short. A good title should briefly summarize what needs to be achieved.",
        )
    } else if len > LONG_TITLE_CHARS {
        CriterionScore::new(Criterion::Clarity, 0.6)
            .with_feedback("Title is very long. Consider simplifying it for better clarity.")
    } else {
        CriterionScore::new(Criterion::Clarity, 0.8)
    }
}

fn completeness(requirement: &Requirement, description: &str) -> CriterionScore {
    let mut entry = if description.trim().chars().count() < BRIEF_DESCRIPTION_CHARS {
        CriterionScore::new(Criterion::Completeness, 0.3).with_feedback(
            "Description is too brief. Provide more details about what, why, and how.",
        )
    } else {
        let mut entry = CriterionScore::new(Criterion::Completeness, 0.4);
        if description.contains("what") {
            entry.score += 0.2;
        } else {
            entry
                .feedback
                .push("Add details about WHAT needs to be accomplished".to_string());
        }
        if description.contains("why") || description.contains("because") {
            entry.score += 0.2;
        } else {
            entry
                .feedback
                .push("Add context about WHY this requirement matters (business value)".to_string());
        }
        if description.contains("how") {
            entry.score += 0.2;
        } else {
            entry.feedback.push(
                "Consider adding guidance on HOW this might be implemented or verified".to_string(),
            );
        }
        entry.score = entry.score.min(1.0);
        entry
    };

    // Metadata gaps are worth mentioning but do not move the score
    if requirement.priority.is_none() {
        entry
            .feedback
            .push("Add a priority level to help with planning".to_string());
    }
    if requirement.tags.is_empty() {
        entry
            .feedback
            .push("Add tags to categorize this requirement".to_string());
    }
    entry
}

fn testability(description: &str) -> CriterionScore {
    let count = count_terms(description, &VERIFICATION_TERMS);
    if count == 0 {
        CriterionScore::new(Criterion::Testability, 0.3)
            .with_feedback("Add specific, measurable criteria for verification")
    } else {
        CriterionScore::new(Criterion::Testability, (0.3 + 0.15 * count as f64).min(1.0))
    }
}

fn feasibility(description: &str) -> CriterionScore {
    if count_terms(description, &COMPLEXITY_TERMS) > MAX_COMPLEXITY_TERMS {
        CriterionScore::new(Criterion::Feasibility, 0.5).with_feedback(
            "Consider breaking this down into smaller, more manageable requirements",
        )
    } else {
        CriterionScore::new(Criterion::Feasibility, 0.8)
    }
}

/// Number of distinct terms that occur anywhere in `text`
fn count_terms(text: &str, terms: &[&str]) -> usize {
    terms.iter().filter(|term| text.contains(*term)).count()
}

/// Weak modal words used as whole words, in vocabulary order
fn weak_words(text: &str) -> Vec<&'static str> {
    let words: Vec<&str> = text
        .split(|c: char| !c.is_alphanumeric() && c != '\'')
        .filter(|w| !w.is_empty())
        .collect();
    WEAK_WORDS
        .into_iter()
        .filter(|weak| words.contains(weak))
        .collect()
}
