//! Prompt Templates for Oracle Operations
//!
//! Prompts carry the requirement's own fields, optional project context and
//! the reply format the parsers in `responses` understand.

use crate::models::Requirement;

use super::analyzer::AnalysisContext;

pub const ANALYSIS_SYSTEM_PROMPT: &str = "You are an expert requirements analyst with deep \
experience in requirements engineering. Assess software requirements for clarity, \
completeness, testability, feasibility and consistency. Be specific and actionable.";

pub const REFINEMENT_SYSTEM_PROMPT: &str = "You are an expert requirements engineer. Rewrite \
requirements so they are clear, complete and testable while keeping their original intent.";

/// Build context about the project
fn build_project_context(ctx: &AnalysisContext) -> String {
    let counts = if ctx.counts_by_type.is_empty() {
        "None".to_string()
    } else {
        ctx.counts_by_type
            .iter()
            .map(|(t, n)| format!("{} {}", n, t))
            .collect::<Vec<_>>()
            .join(", ")
    };

    let siblings = if ctx.sibling_titles.is_empty() {
        "- None".to_string()
    } else {
        ctx.sibling_titles
            .iter()
            .map(|t| format!("- {}", t))
            .collect::<Vec<_>>()
            .join("\n")
    };

    format!(
        r#"## Project Context
- Project Name: {}
- Project Description: {}
- Requirements by Type: {}

### Other Requirements in this Project
{}"#,
        ctx.project_name,
        if ctx.project_description.is_empty() {
            "Not provided"
        } else {
            &ctx.project_description
        },
        counts,
        siblings
    )
}

/// Format a requirement for inclusion in a prompt
fn requirement_to_context(req: &Requirement) -> String {
    let tags = if req.tags.is_empty() {
        "None".to_string()
    } else {
        req.tags.iter().cloned().collect::<Vec<_>>().join(", ")
    };

    format!(
        r#"## Requirement
- Title: {}
- Type: {}
- Priority: {}
- Status: {}
- Tags: {}

### Description
{}"#,
        req.title,
        req.requirement_type,
        req.priority
            .map(|p| p.to_string())
            .unwrap_or_else(|| "Not specified".to_string()),
        req.status,
        tags,
        req.description
    )
}

/// Build prompt for scoring a requirement
pub fn build_analysis_prompt(req: &Requirement, ctx: Option<&AnalysisContext>) -> String {
    let project_context = ctx
        .map(|c| format!("{}\n\n", build_project_context(c)))
        .unwrap_or_default();
    let req_context = requirement_to_context(req);

    format!(
        r#"{project_context}{req_context}

## Task
Score this requirement against each criterion on a scale of 0 to 5:
1. Clarity: Is it clear and unambiguous?
2. Completeness: Does it contain all necessary information (what, why, how)?
3. Testability: Can it be verified with measurable criteria?
4. Feasibility: Is it realistic to implement as one unit of work?
5. Consistency: Does it fit with the other requirements of the project?

## Response Format
Start with one line per criterion, exactly like this:
Clarity: <n>/5
Completeness: <n>/5
Testability: <n>/5
Feasibility: <n>/5
Consistency: <n>/5

Then list concrete suggestions for improvement as bullet points starting with "- ".
Mention the criterion name in a bullet when it addresses a specific criterion."#
    )
}

/// Build prompt for revising a requirement according to feedback
pub fn build_refinement_prompt(req: &Requirement, feedback: &str) -> String {
    let req_context = requirement_to_context(req);

    format!(
        r#"{req_context}

## Feedback
{feedback}

## Task
Create an improved version of the requirement that addresses the feedback.

## Response Format
Respond with these labeled sections and nothing else:
Title: <improved title>
Description: <improved description, may span several lines>
Type: <functional|non-functional|constraint|security|performance|ux>
Priority: <low|medium|high|critical>
Acceptance Criteria:
- <criterion>
- <criterion>"#
    )
}
