use colored::{ColoredString, Colorize};

use reqforge_core::{
    Project, QualityReport, ReadinessReport, ReadinessStatus, Requirement, RequirementPriority,
    RequirementStatus, TraceEdge,
};

pub fn status(status: RequirementStatus) -> ColoredString {
    let label = status.to_string();
    match status {
        RequirementStatus::New => label.yellow(),
        RequirementStatus::Accepted => label.blue(),
        RequirementStatus::InProgress => label.cyan(),
        RequirementStatus::Completed => label.green(),
        RequirementStatus::Rejected => label.red(),
    }
}

pub fn priority(priority: Option<RequirementPriority>) -> ColoredString {
    match priority {
        Some(RequirementPriority::Critical) => "critical".red().bold(),
        Some(RequirementPriority::High) => "high".red(),
        Some(RequirementPriority::Medium) => "medium".yellow(),
        Some(RequirementPriority::Low) => "low".green(),
        None => "-".normal(),
    }
}

pub fn score(value: f64) -> ColoredString {
    let text = format!("{:.2}", value);
    if value > 0.7 {
        text.green()
    } else if value >= 0.5 {
        text.yellow()
    } else {
        text.red()
    }
}

fn truncate(text: &str, width: usize) -> String {
    if text.chars().count() <= width {
        text.to_string()
    } else {
        let cut: String = text.chars().take(width.saturating_sub(3)).collect();
        format!("{}...", cut)
    }
}

pub fn print_project_row(project: &Project) {
    println!(
        "{:<36} | {:<30} | {:>5}",
        project.id().to_string(),
        truncate(&project.name, 30),
        project.requirement_count()
    );
}

pub fn print_requirement_row(req: &Requirement) {
    println!(
        "{:<36} | {:<30} | {:<12} | {:<10} | {:<15}",
        req.id().to_string(),
        truncate(&req.title, 30),
        status(req.status),
        priority(req.priority),
        req.requirement_type.to_string()
    );
}

pub fn print_requirement(req: &Requirement) {
    println!("{} {}", "Requirement:".bold(), req.title.bold());
    println!("  {} {}", "ID:".dimmed(), req.id());
    println!("  {} {}", "Type:".dimmed(), req.requirement_type);
    println!("  {} {}", "Status:".dimmed(), status(req.status));
    println!("  {} {}", "Priority:".dimmed(), priority(req.priority));
    if !req.tags.is_empty() {
        let tags: Vec<&str> = req.tags.iter().map(String::as_str).collect();
        println!("  {} {}", "Tags:".dimmed(), tags.join(", "));
    }
    if let Some(parent) = req.parent_id {
        println!("  {} {}", "Parent:".dimmed(), parent);
    }
    if !req.dependencies.is_empty() {
        let deps: Vec<String> = req.dependencies.iter().map(|d| d.to_string()).collect();
        println!("  {} {}", "Depends on:".dimmed(), deps.join(", "));
    }
    println!();
    println!("{}", req.description);
}

pub fn print_history(req: &Requirement) {
    println!("{}", "History:".bold());
    for entry in req.history() {
        println!(
            "  {} [{}] {}",
            entry.timestamp.format("%Y-%m-%d %H:%M:%S"),
            entry.action,
            entry.description
        );
    }
}

pub fn print_edges(edges: &[TraceEdge]) {
    if edges.is_empty() {
        return;
    }
    println!("{}", "Traces:".bold());
    for edge in edges {
        println!("  {} {} ({})", edge.label.cyan(), edge.other_id, edge.trace_id);
    }
}

pub fn print_report(report: &QualityReport) {
    println!("{}", report.render_feedback());
    if !report.improvement_areas.is_empty() {
        let areas: Vec<&str> = report.improvement_areas.iter().map(|c| c.name()).collect();
        println!();
        println!("{} {}", "Improvement areas:".yellow(), areas.join(", "));
    }
}

pub fn print_readiness(report: &ReadinessReport) {
    let status = match report.status {
        ReadinessStatus::Ready => "READY".green().bold(),
        ReadinessStatus::NeedsRefinement => "NEEDS REFINEMENT".yellow().bold(),
        ReadinessStatus::Error => "ERROR".red().bold(),
    };
    println!("Planning readiness: {}", status);
    if let Some(message) = &report.message {
        println!("{}", message);
        return;
    }
    println!(
        "Requirements ready: {}/{} ({:.1}%)",
        report.ready_count, report.total, report.readiness_percentage
    );
    println!();
    for entry in &report.per_requirement {
        let mark = if entry.ready { "✓".green() } else { "✗".red() };
        println!("{} {} {}", mark, score(entry.score), entry.title);
        for suggestion in &entry.suggestions {
            println!("      - {}", suggestion.dimmed());
        }
    }
    if !report.reference_issues.is_empty() {
        println!();
        println!("{}", "Dangling references:".yellow());
        for issue in &report.reference_issues {
            println!("  - {}", issue);
        }
    }
}
