use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[clap(author, version, about = "Track requirements, score their quality and refine them")]
pub struct Cli {
    /// Path to the configuration file
    #[clap(long, global = true)]
    pub config: Option<PathBuf>,

    /// Enable debug logging
    #[clap(long, global = true)]
    pub debug: bool,

    #[clap(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Manage projects
    #[clap(subcommand)]
    Project(ProjectCommand),

    /// Manage requirements of a project
    #[clap(subcommand)]
    Req(ReqCommand),

    /// Manage traces between requirements
    #[clap(subcommand)]
    Trace(TraceCommand),

    /// Score requirement quality
    Analyze {
        /// Project name or ID
        project: String,

        /// Requirement ID or unique ID prefix; all requirements when omitted
        requirement: Option<String>,

        /// Skip the oracle and use the deterministic rules only
        #[clap(long)]
        rules_only: bool,
    },

    /// Decide whether a project is ready for planning
    Readiness {
        /// Project name or ID
        project: String,

        /// Print the report as JSON
        #[clap(long)]
        json: bool,

        #[clap(long)]
        rules_only: bool,
    },

    /// Print the planning context of a project as JSON
    PlanContext {
        /// Project name or ID
        project: String,
    },

    /// Refine a requirement interactively; creates a new one when no ID is given
    Refine {
        /// Project name or ID
        project: String,

        /// Requirement ID or unique ID prefix
        requirement: Option<String>,

        #[clap(long)]
        rules_only: bool,
    },

    /// Revise a requirement from free-text feedback using the oracle
    RefineFeedback {
        /// Project name or ID
        project: String,

        /// Requirement ID or unique ID prefix
        requirement: String,

        /// The feedback to address
        #[clap(long, short = 'f')]
        feedback: String,

        /// Apply the revision instead of only showing it
        #[clap(long)]
        apply: bool,
    },

    /// Export a project to a JSON file
    Export {
        /// Project name or ID
        project: String,

        /// Output file
        #[clap(long, short = 'o')]
        output: PathBuf,
    },

    /// Import a project from a JSON export file
    Import {
        /// Input file
        path: PathBuf,
    },
}

#[derive(Subcommand, Debug)]
pub enum ProjectCommand {
    /// Create a new project
    Create {
        /// Name of the project
        #[clap(long)]
        name: String,

        /// Description of the project
        #[clap(long, default_value = "")]
        description: String,
    },

    /// List all projects
    List,

    /// Show a project with its requirement hierarchy
    Show {
        /// Project name or ID
        project: String,
    },

    /// Delete a project
    Delete {
        /// Project name or ID
        project: String,

        /// Skip confirmation prompt
        #[clap(long, short = 'y')]
        yes: bool,
    },
}

#[derive(Subcommand, Debug)]
pub enum ReqCommand {
    /// Add a requirement
    Add {
        /// Project name or ID
        project: String,

        #[clap(long)]
        title: String,

        #[clap(long, default_value = "")]
        description: String,

        /// Requirement type (functional, non-functional, constraint, security, performance, ux, or custom)
        #[clap(long)]
        r#type: Option<String>,

        /// Priority (low, medium, high, critical)
        #[clap(long)]
        priority: Option<String>,

        /// Tags (comma separated)
        #[clap(long)]
        tags: Option<String>,

        /// Parent requirement ID or unique ID prefix
        #[clap(long)]
        parent: Option<String>,

        /// Requirement IDs this one depends on (comma separated)
        #[clap(long)]
        depends_on: Option<String>,
    },

    /// List requirements
    List {
        /// Project name or ID
        project: String,

        #[clap(long)]
        status: Option<String>,

        #[clap(long)]
        r#type: Option<String>,

        #[clap(long)]
        priority: Option<String>,

        #[clap(long)]
        tag: Option<String>,
    },

    /// Show one requirement with its history and traces
    Show {
        /// Project name or ID
        project: String,

        /// Requirement ID or unique ID prefix
        requirement: String,
    },

    /// Update fields of a requirement
    Update {
        /// Project name or ID
        project: String,

        /// Requirement ID or unique ID prefix
        requirement: String,

        #[clap(long)]
        title: Option<String>,

        #[clap(long)]
        description: Option<String>,

        #[clap(long)]
        r#type: Option<String>,

        #[clap(long)]
        priority: Option<String>,

        /// Status (new, accepted, in-progress, completed, rejected)
        #[clap(long)]
        status: Option<String>,

        /// Replace the tags (comma separated)
        #[clap(long)]
        tags: Option<String>,

        /// Parent requirement ID, or "none" to clear it
        #[clap(long)]
        parent: Option<String>,
    },

    /// Delete a requirement
    Delete {
        /// Project name or ID
        project: String,

        /// Requirement ID or unique ID prefix
        requirement: String,

        /// Skip confirmation prompt
        #[clap(long, short = 'y')]
        yes: bool,
    },
}

#[derive(Subcommand, Debug)]
pub enum TraceCommand {
    /// Add a trace between two requirements
    Add {
        /// Project name or ID
        project: String,

        /// Source requirement ID or unique ID prefix
        #[clap(long)]
        from: String,

        /// Target requirement ID or unique ID prefix
        #[clap(long)]
        to: String,

        /// Trace type (implements, derives, tests, refines, relates-to, or custom)
        #[clap(long)]
        r#type: String,

        #[clap(long)]
        description: Option<String>,
    },

    /// List traces of a project, or the edges of one requirement
    List {
        /// Project name or ID
        project: String,

        /// Only edges touching this requirement
        #[clap(long)]
        requirement: Option<String>,
    },

    /// Delete a trace
    Delete {
        /// Project name or ID
        project: String,

        /// Trace ID
        trace: String,
    },
}
