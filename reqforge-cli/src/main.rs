mod cli;
mod prompts;
mod render;

use anyhow::{bail, Context, Result};
use clap::Parser;
use colored::Colorize;
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;
use std::sync::Arc;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};
use uuid::Uuid;

use reqforge_core::{
    export, refine_with_feedback, AnalysisContext, Config, FallbackAnalyzer, FeedbackRefiner,
    Hierarchy, HierarchyKey, NewRequirement, NewTrace, PlanningContext, Project,
    QualityAnalyzer, ReadinessGate, RefinementSession, RequirementFilter, RequirementPatch,
    RequirementPriority, RequirementStatus, RequirementType, RequirementsStore, TraceType,
};

use crate::cli::{Cli, Command, ProjectCommand, ReqCommand, TraceCommand};

fn init_tracing(debug: bool) {
    let filter = if debug {
        EnvFilter::new("reqforge=debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("reqforge=info"))
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(false).with_writer(std::io::stderr))
        .with(filter)
        .init();
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.debug);
    tracing::debug!("reqforge starting with args: {:?}", cli);

    let config = Config::load(cli.config.as_deref())?;
    let store = RequirementsStore::from_config(&config.storage)?;

    match cli.command {
        Command::Project(cmd) => handle_project_command(cmd, &store)?,
        Command::Req(cmd) => handle_req_command(cmd, &store)?,
        Command::Trace(cmd) => handle_trace_command(cmd, &store)?,
        Command::Analyze {
            project,
            requirement,
            rules_only,
        } => {
            let analyzer = build_analyzer(&config, rules_only);
            analyze(&store, &analyzer, &project, requirement.as_deref())?;
        }
        Command::Readiness {
            project,
            json,
            rules_only,
        } => {
            let project = resolve_project(&store, &project)?;
            let gate = ReadinessGate::new(Arc::new(build_analyzer(&config, rules_only)));
            let report = gate.assess_project(&store, &project.id());
            if json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                render::print_readiness(&report);
            }
        }
        Command::PlanContext { project } => {
            let project = resolve_project(&store, &project)?;
            println!("{}", PlanningContext::from_project(&project).to_json()?);
        }
        Command::Refine {
            project,
            requirement,
            rules_only,
        } => {
            let analyzer = build_analyzer(&config, rules_only);
            refine(&store, &analyzer, &project, requirement.as_deref())?;
        }
        Command::RefineFeedback {
            project,
            requirement,
            feedback,
            apply,
        } => {
            let refiner =
                FeedbackRefiner::new(config.oracle.generator(), config.oracle.settings());
            refine_feedback(&store, &refiner, &project, &requirement, &feedback, apply)?;
        }
        Command::Export { project, output } => {
            let project = resolve_project(&store, &project)?;
            export::export_json(&store, &project.id(), &output)?;
            println!("Exported to JSON: {}", output.display());
            println!("  Total requirements: {}", project.requirement_count());
        }
        Command::Import { path } => import(&store, &path)?,
    }

    Ok(())
}

fn build_analyzer(config: &Config, rules_only: bool) -> FallbackAnalyzer {
    if rules_only {
        FallbackAnalyzer::rules_only()
    } else {
        FallbackAnalyzer::from_config(&config.oracle)
    }
}

fn resolve_project(store: &RequirementsStore, key: &str) -> Result<Project> {
    store
        .find_project(key)
        .with_context(|| format!("Project not found: {}", key))
}

/// Full UUID, or a prefix matching exactly one requirement of the project
fn resolve_requirement(project: &Project, key: &str) -> Result<Uuid> {
    let key = key.trim();
    if let Ok(id) = Uuid::parse_str(key) {
        if project.requirement(&id).is_some() {
            return Ok(id);
        }
        bail!("Requirement {} not found in project {}", id, project.name);
    }

    let matches: Vec<Uuid> = project
        .requirements()
        .map(|r| r.id())
        .filter(|id| id.to_string().starts_with(&key.to_lowercase()))
        .collect();
    match matches.as_slice() {
        [id] => Ok(*id),
        [] => bail!("Requirement not found: {}", key),
        _ => bail!("Requirement prefix '{}' is ambiguous ({} matches)", key, matches.len()),
    }
}

fn parse_priority(s: &str) -> Result<RequirementPriority> {
    RequirementPriority::parse(s)
        .with_context(|| format!("Invalid priority: {} (expected low, medium, high or critical)", s))
}

fn parse_status(s: &str) -> Result<RequirementStatus> {
    RequirementStatus::parse(s).with_context(|| {
        format!(
            "Invalid status: {} (expected new, accepted, in-progress, completed or rejected)",
            s
        )
    })
}

fn parse_tags(s: &str) -> BTreeSet<String> {
    s.split(',')
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty())
        .collect()
}

fn handle_project_command(cmd: ProjectCommand, store: &RequirementsStore) -> Result<()> {
    match cmd {
        ProjectCommand::Create { name, description } => {
            let id = store.create_project(name.clone(), description, BTreeMap::new())?;
            println!("{} {} ({})", "Created project".green(), name, id);
        }
        ProjectCommand::List => {
            let projects = store.list_projects();
            if projects.is_empty() {
                println!("{}", "No projects found.".yellow());
                return Ok(());
            }
            println!("{:<36} | {:<30} | {:>5}", "ID", "Name", "Reqs");
            println!("{}", "-".repeat(78));
            for project in &projects {
                render::print_project_row(project);
            }
        }
        ProjectCommand::Show { project } => {
            let project = resolve_project(store, &project)?;
            println!("{} {}", "Project:".bold(), project.name.bold());
            println!("  {} {}", "ID:".dimmed(), project.id());
            if !project.description.is_empty() {
                println!("  {}", project.description);
            }
            println!(
                "  {} {} requirements, {} traces",
                "Contents:".dimmed(),
                project.requirement_count(),
                project.traces().len()
            );
            println!();
            let hierarchy = project.hierarchy();
            print_subtree(&project, &hierarchy, &HierarchyKey::Root, 0);
            for issue in project.validate_references() {
                println!("{} {}", "warning:".yellow(), issue);
            }
        }
        ProjectCommand::Delete { project, yes } => {
            let project = resolve_project(store, &project)?;
            let question = format!("Delete project '{}' and all its requirements?", project.name);
            if !prompts::confirm(&question, yes)? {
                println!("Cancelled.");
                return Ok(());
            }
            store.delete_project(&project.id())?;
            println!("{} {}", "Deleted project".green(), project.name);
        }
    }
    Ok(())
}

fn print_subtree(
    project: &Project,
    hierarchy: &Hierarchy,
    key: &HierarchyKey,
    depth: usize,
) {
    for id in hierarchy.children(key) {
        if let Some(req) = project.requirement(id) {
            println!(
                "{}{} {} [{}]",
                "  ".repeat(depth),
                "-".dimmed(),
                req.title,
                render::status(req.status)
            );
            print_subtree(project, hierarchy, &HierarchyKey::Parent(*id), depth + 1);
        }
    }
}

fn handle_req_command(cmd: ReqCommand, store: &RequirementsStore) -> Result<()> {
    match cmd {
        ReqCommand::Add {
            project,
            title,
            description,
            r#type,
            priority,
            tags,
            parent,
            depends_on,
        } => {
            let project = resolve_project(store, &project)?;
            let mut new = NewRequirement::new(title, description);
            if let Some(t) = r#type {
                new = new.with_type(RequirementType::parse(&t));
            }
            if let Some(p) = priority {
                new = new.with_priority(Some(parse_priority(&p)?));
            }
            if let Some(t) = tags {
                new = new.with_tags(parse_tags(&t));
            }
            if let Some(p) = parent {
                new = new.with_parent(resolve_requirement(&project, &p)?);
            }
            if let Some(deps) = depends_on {
                let ids = deps
                    .split(',')
                    .map(str::trim)
                    .filter(|d| !d.is_empty())
                    .map(|d| resolve_requirement(&project, d))
                    .collect::<Result<Vec<_>>>()?;
                new = new.with_dependencies(ids);
            }
            let id = store
                .add_requirement(&project.id(), new)?
                .with_context(|| format!("Project {} disappeared", project.id()))?;
            println!("{} {}", "Added requirement".green(), id);
        }
        ReqCommand::List {
            project,
            status,
            r#type,
            priority,
            tag,
        } => {
            let project = resolve_project(store, &project)?;
            let filter = RequirementFilter {
                status: status.as_deref().map(parse_status).transpose()?,
                requirement_type: r#type.as_deref().map(RequirementType::parse),
                priority: priority.as_deref().map(parse_priority).transpose()?,
                tag,
            };
            let requirements = store
                .list_requirements(&project.id(), &filter)
                .unwrap_or_default();
            if requirements.is_empty() {
                println!("{}", "No requirements found.".yellow());
                return Ok(());
            }
            println!(
                "{:<36} | {:<30} | {:<12} | {:<10} | {:<15}",
                "ID", "Title", "Status", "Priority", "Type"
            );
            println!("{}", "-".repeat(115));
            for req in &requirements {
                render::print_requirement_row(req);
            }
        }
        ReqCommand::Show {
            project,
            requirement,
        } => {
            let project = resolve_project(store, &project)?;
            let id = resolve_requirement(&project, &requirement)?;
            if let Some(req) = project.requirement(&id) {
                render::print_requirement(req);
                println!();
                render::print_history(req);
                let edges = store.traces_for(&project.id(), &id).unwrap_or_default();
                println!();
                render::print_edges(&edges);
            }
        }
        ReqCommand::Update {
            project,
            requirement,
            title,
            description,
            r#type,
            priority,
            status,
            tags,
            parent,
        } => {
            let project = resolve_project(store, &project)?;
            let id = resolve_requirement(&project, &requirement)?;
            let parent_id = match parent.as_deref().map(str::trim) {
                None => None,
                Some("none") | Some("") => Some(None),
                Some(p) => Some(Some(resolve_requirement(&project, p)?)),
            };
            let patch = RequirementPatch {
                title,
                description,
                requirement_type: r#type.as_deref().map(RequirementType::parse),
                priority: priority.as_deref().map(parse_priority).transpose()?,
                status: status.as_deref().map(parse_status).transpose()?,
                tags: tags.as_deref().map(parse_tags),
                parent_id,
                ..Default::default()
            };
            if patch.is_empty() {
                println!("{}", "Nothing to update.".yellow());
                return Ok(());
            }
            store.update_requirement(&project.id(), &id, patch)?;
            println!("{} {}", "Updated requirement".green(), id);
        }
        ReqCommand::Delete {
            project,
            requirement,
            yes,
        } => {
            let project = resolve_project(store, &project)?;
            let id = resolve_requirement(&project, &requirement)?;
            let title = project
                .requirement(&id)
                .map(|r| r.title.clone())
                .unwrap_or_default();
            if !prompts::confirm(&format!("Delete requirement '{}'?", title), yes)? {
                println!("Cancelled.");
                return Ok(());
            }
            store.delete_requirement(&project.id(), &id)?;
            println!("{} {}", "Deleted requirement".green(), id);
        }
    }
    Ok(())
}

fn handle_trace_command(cmd: TraceCommand, store: &RequirementsStore) -> Result<()> {
    match cmd {
        TraceCommand::Add {
            project,
            from,
            to,
            r#type,
            description,
        } => {
            let project = resolve_project(store, &project)?;
            let mut trace = NewTrace::new(
                resolve_requirement(&project, &from)?,
                resolve_requirement(&project, &to)?,
                TraceType::parse(&r#type),
            );
            if let Some(d) = description {
                trace = trace.with_description(d);
            }
            match store.add_trace(&project.id(), trace)? {
                Some(id) => println!("{} {}", "Added trace".green(), id),
                None => bail!("Trace endpoints must both exist in project {}", project.name),
            }
        }
        TraceCommand::List {
            project,
            requirement,
        } => {
            let project = resolve_project(store, &project)?;
            if let Some(key) = requirement {
                let id = resolve_requirement(&project, &key)?;
                render::print_edges(&store.traces_for(&project.id(), &id).unwrap_or_default());
                return Ok(());
            }
            let traces = store.list_traces(&project.id()).unwrap_or_default();
            if traces.is_empty() {
                println!("{}", "No traces found.".yellow());
                return Ok(());
            }
            for trace in &traces {
                let title = |id: &Uuid| {
                    project
                        .requirement(id)
                        .map(|r| r.title.clone())
                        .unwrap_or_else(|| format!("{} (missing)", id).red().to_string())
                };
                println!(
                    "{}  {} {} {}",
                    trace.id().to_string().dimmed(),
                    title(&trace.source_id),
                    trace.trace_type.to_string().cyan(),
                    title(&trace.target_id)
                );
            }
        }
        TraceCommand::Delete { project, trace } => {
            let project = resolve_project(store, &project)?;
            let id = Uuid::parse_str(trace.trim()).context("Trace ID must be a UUID")?;
            if store.delete_trace(&project.id(), &id)? {
                println!("{} {}", "Deleted trace".green(), id);
            } else {
                bail!("Trace {} not found", id);
            }
        }
    }
    Ok(())
}

fn analyze(
    store: &RequirementsStore,
    analyzer: &dyn QualityAnalyzer,
    project: &str,
    requirement: Option<&str>,
) -> Result<()> {
    let project = resolve_project(store, project)?;
    let ids: Vec<Uuid> = match requirement {
        Some(key) => vec![resolve_requirement(&project, key)?],
        None => project.requirements().map(|r| r.id()).collect(),
    };
    if ids.is_empty() {
        println!("{}", "No requirements found.".yellow());
    }
    for id in ids {
        if let Some(req) = project.requirement(&id) {
            let context = AnalysisContext::from_project(&project, &id);
            let report = analyzer.analyze(req, Some(&context));
            render::print_report(&report);
            println!();
        }
    }
    Ok(())
}

fn refine(
    store: &RequirementsStore,
    analyzer: &dyn QualityAnalyzer,
    project: &str,
    requirement: Option<&str>,
) -> Result<()> {
    let project = resolve_project(store, project)?;
    let mut io = prompts::InquireIo;
    let mut session = match requirement {
        Some(key) => {
            let id = resolve_requirement(&project, key)?;
            let title = project
                .requirement(&id)
                .map(|r| r.title.as_str())
                .unwrap_or_default();
            println!("\nLet's refine requirement: {} ({})\n", title, id);
            RefinementSession::open(store, analyzer, project.id(), id)?
        }
        None => {
            println!("\nLet's create a new requirement\n");
            RefinementSession::create(store, analyzer, project.id(), &mut io)?
        }
    };

    let outcome = session.run(&mut io)?;
    println!();
    println!("{}", "Refinement complete!".green().bold());
    println!(
        "Final quality score: {}/1.0 (was {:.2})",
        render::score(outcome.score),
        outcome.score_before
    );
    if outcome.ready_for_planning {
        println!("{}", "Ready for planning.".green());
    } else {
        println!("{}", "Not yet ready for planning.".yellow());
    }
    Ok(())
}

fn refine_feedback(
    store: &RequirementsStore,
    refiner: &FeedbackRefiner,
    project: &str,
    requirement: &str,
    feedback: &str,
    apply: bool,
) -> Result<()> {
    if !refiner.is_available() {
        println!(
            "{}",
            "No oracle configured; the requirement will be kept as is.".yellow()
        );
    }
    let project = resolve_project(store, project)?;
    let id = resolve_requirement(&project, requirement)?;
    let outcome = refine_with_feedback(store, refiner, &project.id(), &id, feedback, apply)?;

    println!("{} {}", "Title:".bold(), outcome.fields.title);
    println!("{} {}", "Type:".bold(), outcome.fields.requirement_type);
    println!("{} {}", "Priority:".bold(), render::priority(outcome.fields.priority));
    println!("{}", "Description:".bold());
    println!("{}", outcome.fields.description);
    if !outcome.fields.acceptance_criteria.is_empty() {
        println!("{}", "Acceptance Criteria:".bold());
        for item in &outcome.fields.acceptance_criteria {
            println!("  - {}", item);
        }
    }
    println!();
    if outcome.applied {
        println!("{}", "Revision applied.".green());
    } else if outcome.patch.is_empty() {
        println!("No changes suggested.");
    } else {
        println!("Run again with --apply to update the requirement.");
    }
    Ok(())
}

fn import(store: &RequirementsStore, path: &Path) -> Result<()> {
    let id = export::import_json(store, path)?;
    let project = store
        .get_project(&id)
        .with_context(|| format!("Imported project {} not found", id))?;
    println!(
        "{} {} ({}) with {} requirements",
        "Imported project".green(),
        project.name,
        id,
        project.requirement_count()
    );
    Ok(())
}
