//! Response Parsing Module
//!
//! Oracle replies are free text. Scores are pulled out with patterns such
//! as `Clarity: 4/5` or `clarity ... 4 out of 5`; bullet lines become
//! suggestions. Refinement replies use labeled sections.

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::models::{Requirement, RequirementPriority, RequirementType};

use super::client::OracleError;
use super::report::{Criterion, CriterionScore};

/// Criterion scores and suggestions recovered from an analysis reply
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedAnalysis {
    /// Only the criteria that had a recognisable score or feedback
    pub scores: Vec<CriterionScore>,
    pub suggestions: Vec<String>,
}

/// Requirement fields recovered from a refinement reply
///
/// Sections the reply did not contain keep the original requirement's value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RefinedFields {
    pub title: String,
    pub description: String,
    pub requirement_type: RequirementType,
    pub priority: Option<RequirementPriority>,
    pub acceptance_criteria: Vec<String>,
}

impl RefinedFields {
    /// The unchanged fields of `req`
    pub fn passthrough(req: &Requirement) -> Self {
        Self {
            title: req.title.clone(),
            description: req.description.clone(),
            requirement_type: req.requirement_type.clone(),
            priority: req.priority,
            acceptance_criteria: Vec::new(),
        }
    }
}

fn score_pattern(criterion: Criterion) -> Result<Regex, regex::Error> {
    Regex::new(&format!(
        r"(?i)\b{}\b[^0-9\n]{{0,40}}?(\d+(?:\.\d+)?)\s*(?:/|out\s+of)\s*(5|10)\b",
        criterion.name()
    ))
}

fn bullet_pattern() -> Result<Regex, regex::Error> {
    Regex::new(r"^\s*(?:[-*•]|\d+[.)])\s+(.+?)\s*$")
}

fn invalid(e: regex::Error) -> OracleError {
    OracleError::InvalidResponse(format!("Bad pattern: {}", e))
}

/// Score of `criterion` rescaled to [0, 1], if the text states one
///
/// A value above its scale is treated as absent.
pub fn extract_score(text: &str, criterion: Criterion) -> Option<f64> {
    let pattern = score_pattern(criterion).ok()?;
    let score = pattern.captures_iter(text).find_map(|caps| {
        let value: f64 = caps.get(1)?.as_str().parse().ok()?;
        let scale: f64 = caps.get(2)?.as_str().parse().ok()?;
        (value <= scale).then(|| value / scale)
    });
    score
}

/// Text of every bullet or numbered list item
pub fn extract_bullets(text: &str) -> Vec<String> {
    let Ok(pattern) = bullet_pattern() else {
        return Vec::new();
    };
    text.lines()
        .filter_map(|line| pattern.captures(line))
        .filter_map(|caps| caps.get(1).map(|m| m.as_str().to_string()))
        .filter(|item| !item.is_empty())
        .collect()
}

/// Parse a scored analysis reply
///
/// Fails when not a single criterion score can be found; criteria that are
/// missing individually are left for the report to default.
pub fn parse_analysis_reply(reply: &str) -> Result<ParsedAnalysis, OracleError> {
    let mut scores: Vec<CriterionScore> = Vec::new();
    for criterion in Criterion::ALL {
        let pattern = score_pattern(criterion).map_err(invalid)?;
        if let Some(score) = extract_score(reply, criterion) {
            scores.push(CriterionScore::new(criterion, score));
        } else if pattern.is_match(reply) {
            // Matched the shape but the value was out of range
            scores.push(CriterionScore::new(criterion, 0.5));
        }
    }

    if scores.is_empty() {
        return Err(OracleError::InvalidResponse(format!(
            "No criterion scores found in reply: {}",
            &reply.chars().take(200).collect::<String>()
        )));
    }

    let mut suggestions = Vec::new();
    for bullet in extract_bullets(reply) {
        let is_score_line = Criterion::ALL
            .into_iter()
            .any(|c| extract_score(&bullet, c).is_some());
        if is_score_line {
            continue;
        }

        let lower = bullet.to_lowercase();
        for criterion in Criterion::ALL {
            if !lower.contains(criterion.name()) {
                continue;
            }
            match scores.iter_mut().find(|s| s.criterion == criterion) {
                Some(entry) => entry.feedback.push(bullet.clone()),
                None => scores.push(CriterionScore::new(criterion, 0.5).with_feedback(bullet.clone())),
            }
        }
        suggestions.push(bullet);
    }

    Ok(ParsedAnalysis {
        scores,
        suggestions,
    })
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Section {
    Title,
    Description,
    Type,
    Priority,
    AcceptanceCriteria,
}

fn section_label(line: &str) -> Option<(Section, &str)> {
    let (label, rest) = line.split_once(':')?;
    let section = match label.trim().trim_matches('*').trim().to_lowercase().as_str() {
        "title" => Section::Title,
        "description" => Section::Description,
        "type" => Section::Type,
        "priority" => Section::Priority,
        "acceptance criteria" => Section::AcceptanceCriteria,
        _ => return None,
    };
    Some((section, rest.trim()))
}

/// Parse a labeled-section refinement reply on top of the original fields
pub fn parse_refinement_reply(reply: &str, original: &Requirement) -> RefinedFields {
    let mut fields = RefinedFields::passthrough(original);
    let mut title: Option<String> = None;
    let mut description: Vec<String> = Vec::new();
    let mut seen_description = false;
    let mut current: Option<Section> = None;
    let bullet = bullet_pattern().ok();

    for line in reply.lines() {
        if let Some((section, rest)) = section_label(line) {
            current = Some(section);
            match section {
                Section::Title if !rest.is_empty() => title = Some(rest.to_string()),
                Section::Description => {
                    seen_description = true;
                    if !rest.is_empty() {
                        description.push(rest.to_string());
                    }
                }
                Section::Type if !rest.is_empty() => {
                    fields.requirement_type = RequirementType::parse(rest)
                }
                Section::Priority => {
                    if let Some(priority) = RequirementPriority::parse(rest) {
                        fields.priority = Some(priority);
                    }
                }
                Section::AcceptanceCriteria if !rest.is_empty() => {
                    fields.acceptance_criteria.push(rest.to_string())
                }
                _ => {}
            }
            continue;
        }

        match current {
            Some(Section::Description) => description.push(line.trim_end().to_string()),
            Some(Section::AcceptanceCriteria) => {
                let item = bullet
                    .as_ref()
                    .and_then(|p| p.captures(line))
                    .and_then(|caps| caps.get(1))
                    .map(|m| m.as_str().to_string());
                if let Some(item) = item {
                    fields.acceptance_criteria.push(item);
                }
            }
            _ => {}
        }
    }

    if let Some(title) = title {
        fields.title = title;
    }
    let description = description.join("\n").trim().to_string();
    if seen_description && !description.is_empty() {
        fields.description = description;
    }
    fields
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{NewRequirement, Project};
    use std::collections::BTreeMap;

    fn original() -> Requirement {
        let mut project = Project::new("P".into(), String::new(), BTreeMap::new());
        let id = project.add_requirement(NewRequirement::new("Pay", "Users can pay."));
        project.requirement(&id).cloned().unwrap()
    }

    #[test]
    fn test_extract_score_formats() {
        assert_eq!(extract_score("Clarity: 4/5", Criterion::Clarity), Some(0.8));
        assert_eq!(
            extract_score("I would rate testability 3 out of 5.", Criterion::Testability),
            Some(0.6)
        );
        assert_eq!(extract_score("Feasibility - 7/10", Criterion::Feasibility), Some(0.7));
        assert_eq!(extract_score("Clarity: 9/5", Criterion::Clarity), None);
        assert_eq!(extract_score("Clarity is fine", Criterion::Clarity), None);
    }

    #[test]
    fn test_parse_analysis_reply() {
        let reply = "Clarity: 4/5\nCompleteness: 2/5\nTestability: 1/5\n\n\
            Suggestions:\n- Add acceptance criteria to improve testability\n\
            - Explain why the feature matters\n* Split the payment methods";
        let parsed = parse_analysis_reply(reply).unwrap();

        assert_eq!(parsed.scores.len(), 3);
        assert_eq!(parsed.suggestions.len(), 3);
        let testability = parsed
            .scores
            .iter()
            .find(|s| s.criterion == Criterion::Testability)
            .unwrap();
        assert_eq!(testability.feedback, vec!["Add acceptance criteria to improve testability"]);
    }

    #[test]
    fn test_score_bullets_are_not_suggestions() {
        let reply = "- Clarity: 4/5\n- Consistency: 5/5\n- Use measurable targets";
        let parsed = parse_analysis_reply(reply).unwrap();
        assert_eq!(parsed.suggestions, vec!["Use measurable targets"]);
    }

    #[test]
    fn test_unparseable_reply_is_invalid() {
        let result = parse_analysis_reply("Looks good to me!");
        assert!(matches!(result, Err(OracleError::InvalidResponse(_))));
    }

    #[test]
    fn test_parse_refinement_reply() {
        let reply = "Title: Pay by card at checkout\n\
            Description: The system shall let users pay by card.\n\
            Supported cards are Visa and Mastercard.\n\
            Type: functional\n\
            Priority: HIGH\n\
            Acceptance Criteria:\n\
            - A valid card payment completes within 3 seconds\n\
            - Declined cards show an error";
        let fields = parse_refinement_reply(reply, &original());

        assert_eq!(fields.title, "Pay by card at checkout");
        assert_eq!(
            fields.description,
            "The system shall let users pay by card.\nSupported cards are Visa and Mastercard."
        );
        assert_eq!(fields.priority, Some(RequirementPriority::High));
        assert_eq!(fields.acceptance_criteria.len(), 2);
    }

    #[test]
    fn test_refinement_missing_sections_keep_original() {
        let fields = parse_refinement_reply("Priority: urgent-ish\nTitle: Card payment", &original());
        assert_eq!(fields.title, "Card payment");
        assert_eq!(fields.description, "Users can pay.");
        assert_eq!(fields.priority, Some(RequirementPriority::Medium));
        assert!(fields.acceptance_criteria.is_empty());
    }
}
