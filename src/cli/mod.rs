//! CLI definitions using clap.

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

pub mod commands;

/// pipectl - Issue pipeline progression for agent review workflows
#[derive(Parser, Debug)]
#[command(name = "pipectl", author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Database path (default: ~/.pipectl/data/pipeline.db)
    #[arg(long, global = true, env = "PIPECTL_DB")]
    pub db: Option<PathBuf>,

    /// Actor name for audit trail
    #[arg(long, global = true, env = "PIPECTL_ACTOR")]
    pub actor: Option<String>,

    /// Active workspace
    #[arg(long, global = true, env = "PIPECTL_WORKSPACE")]
    pub workspace: Option<String>,

    /// Output as JSON (for agent integration)
    #[arg(long, alias = "robot", global = true)]
    pub json: bool,

    /// Increase logging verbosity (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Quiet mode (no output except errors)
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Disable colored output
    #[arg(long, global = true)]
    pub no_color: bool,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Create the pipectl database
    Init {
        /// Overwrite existing database
        #[arg(long)]
        force: bool,

        /// Save this workspace as the default in ~/.pipectl/config.json
        #[arg(long)]
        default_workspace: Option<String>,
    },

    /// Print version information
    Version,

    /// Project management
    Project {
        #[command(subcommand)]
        command: ProjectCommands,
    },

    /// Issue management
    Issue {
        #[command(subcommand)]
        command: IssueCommands,
    },

    /// Step catalog management
    Step {
        #[command(subcommand)]
        command: StepCommands,
    },

    /// Move issues through their pipeline
    Pipeline {
        #[command(subcommand)]
        command: PipelineCommands,
    },

    /// Context gate signals
    Gate {
        #[command(subcommand)]
        command: GateCommands,
    },

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

/// Supported shells for completions.
#[derive(clap::ValueEnum, Clone, Debug)]
pub enum Shell {
    Bash,
    Zsh,
    Fish,
    PowerShell,
    Elvish,
}

// ============================================================================
// Project Commands
// ============================================================================

#[derive(Subcommand, Debug)]
pub enum ProjectCommands {
    /// Create a new project in the active workspace
    Create(ProjectCreateArgs),

    /// List projects in the active workspace
    List {
        /// Maximum projects to return
        #[arg(short, long, default_value = "50")]
        limit: usize,
    },

    /// Show project details
    Show {
        /// Project ID
        id: String,
    },
}

#[derive(Args, Debug)]
pub struct ProjectCreateArgs {
    /// Project name
    pub name: String,

    /// Project description
    #[arg(short, long)]
    pub description: Option<String>,

    /// Issue ID prefix (e.g., "DOC" creates DOC-1, DOC-2)
    #[arg(short = 'p', long)]
    pub issue_prefix: Option<String>,
}

// ============================================================================
// Issue Commands
// ============================================================================

#[derive(Subcommand, Debug)]
pub enum IssueCommands {
    /// Create a new issue
    Create(IssueCreateArgs),

    /// List issues in a project
    List {
        /// Project ID
        #[arg(long)]
        project: String,

        /// Filter by work status (todo, in_progress, review, done, blocked)
        #[arg(short, long)]
        status: Option<String>,

        /// Maximum issues to return
        #[arg(short, long, default_value = "50")]
        limit: u32,
    },

    /// Show issue details
    Show {
        /// Issue ID (short or full)
        id: String,
    },
}

#[derive(Args, Debug)]
pub struct IssueCreateArgs {
    /// Issue title
    pub title: String,

    /// Project ID
    #[arg(long)]
    pub project: String,

    /// Issue description
    #[arg(short, long)]
    pub description: Option<String>,
}

// ============================================================================
// Step Commands
// ============================================================================

#[derive(Subcommand, Debug)]
pub enum StepCommands {
    /// Append a step to a project's catalog
    Add(StepAddArgs),

    /// List a project's steps in order
    List {
        /// Project ID
        #[arg(long)]
        project: String,
    },

    /// Change a step's default assignee
    Restaff {
        /// Step ID
        id: String,

        /// New assignee (omit to clear)
        #[arg(long)]
        agent: Option<String>,
    },
}

#[derive(Args, Debug)]
pub struct StepAddArgs {
    /// Step name (e.g., "Draft", "Approval")
    pub name: String,

    /// Project ID
    #[arg(long)]
    pub project: String,

    /// Step type: agent_work, agent_review, human_review
    #[arg(short = 't', long = "type", default_value = "agent_work")]
    pub step_type: String,

    /// Default assignee
    #[arg(long)]
    pub agent: Option<String>,

    /// Park after completion instead of advancing
    #[arg(long)]
    pub no_auto_advance: bool,

    /// Explicit step number (default: one past the last step)
    #[arg(long)]
    pub number: Option<i64>,
}

// ============================================================================
// Pipeline Commands
// ============================================================================

#[derive(Subcommand, Debug)]
pub enum PipelineCommands {
    /// Complete the issue's current step
    Advance {
        /// Issue ID (short or full)
        issue: String,

        /// Acting agent (default: the step's assignee)
        #[arg(long)]
        agent: Option<String>,

        /// Notes recorded with the history entry
        #[arg(short, long)]
        notes: Option<String>,
    },

    /// Reject the current step and send the issue back
    Reject {
        /// Issue ID (short or full)
        issue: String,

        /// Why the step was rejected
        #[arg(short, long)]
        reason: String,

        /// Acting agent (default: the step's assignee)
        #[arg(long)]
        agent: Option<String>,
    },

    /// Show where an issue sits in its pipeline
    Status {
        /// Issue ID (short or full)
        issue: String,
    },

    /// Show an issue's transition history
    History {
        /// Issue ID (short or full)
        issue: String,
    },

    /// Clear an issue's pipeline position (history is kept)
    Reset {
        /// Issue ID (short or full)
        issue: String,
    },
}

// ============================================================================
// Gate Commands
// ============================================================================

#[derive(Subcommand, Debug)]
pub enum GateCommands {
    /// Record the context gate outcome for an issue
    Record {
        /// Issue ID (short or full)
        issue: String,

        /// Gate status: succeeded, failed, bypassed
        status: String,

        /// Error message reported by the gate
        #[arg(long)]
        error: Option<String>,
    },
}
