//! Project management commands.
//!
//! - `pipectl project create <name>` - Create a project in the active workspace
//! - `pipectl project list` - List projects in the active workspace
//! - `pipectl project show <id>` - Show project details and its step catalog

use super::{format_timestamp, open_storage, print_json, scoped_project};
use crate::cli::{ProjectCommands, ProjectCreateArgs};
use crate::config::{default_actor, resolve_workspace};
use crate::error::{Error, Result};
use crate::model::{PipelineStep, Project};
use crate::storage::SqliteStorage;
use serde::Serialize;
use std::path::PathBuf;

#[derive(Serialize)]
struct ProjectOutput {
    id: String,
    name: String,
    workspace_id: String,
    description: Option<String>,
    issue_prefix: Option<String>,
    next_issue_number: i32,
    created_at: String,
    updated_at: String,
}

impl From<Project> for ProjectOutput {
    fn from(p: Project) -> Self {
        Self {
            id: p.id,
            name: p.name,
            workspace_id: p.workspace_id,
            description: p.description,
            issue_prefix: p.issue_prefix,
            next_issue_number: p.next_issue_number,
            created_at: format_timestamp(p.created_at),
            updated_at: format_timestamp(p.updated_at),
        }
    }
}

#[derive(Serialize)]
struct ProjectListOutput {
    projects: Vec<ProjectOutput>,
    count: usize,
}

#[derive(Serialize)]
struct ProjectShowOutput {
    #[serde(flatten)]
    project: ProjectOutput,
    steps: Vec<PipelineStep>,
}

/// Execute a project command.
///
/// # Errors
///
/// Returns `NotInitialized` without a database, `NoWorkspace` without an
/// active workspace, or any storage error.
pub fn execute(
    command: &ProjectCommands,
    db_path: Option<&PathBuf>,
    actor: Option<&str>,
    workspace: Option<&str>,
    json: bool,
) -> Result<()> {
    let mut storage = open_storage(db_path)?;
    let actor = actor.map_or_else(default_actor, String::from);

    match command {
        ProjectCommands::Create(args) => create(&mut storage, args, workspace, &actor, json),
        ProjectCommands::List { limit } => list(&storage, *limit, workspace, json),
        ProjectCommands::Show { id } => show(&storage, id, workspace, json),
    }
}

fn create(
    storage: &mut SqliteStorage,
    args: &ProjectCreateArgs,
    workspace: Option<&str>,
    actor: &str,
    json: bool,
) -> Result<()> {
    let workspace = resolve_workspace(workspace)?;

    let name = args.name.trim();
    if name.is_empty() {
        return Err(Error::InvalidArgument("project name cannot be empty".to_string()));
    }

    let mut project = Project::new(name.to_string(), workspace);
    if let Some(ref desc) = args.description {
        project = project.with_description(desc);
    }
    if let Some(ref prefix) = args.issue_prefix {
        let prefix = prefix.trim().to_uppercase();
        if prefix.is_empty() || !prefix.chars().all(|c| c.is_ascii_alphanumeric()) {
            return Err(Error::InvalidArgument(format!(
                "issue prefix must be alphanumeric, got '{prefix}'"
            )));
        }
        project.issue_prefix = Some(prefix);
    } else if let Some(derived) = project.issue_prefix.take() {
        project.issue_prefix = Some(storage.free_issue_prefix(&derived)?);
    }

    storage.create_project(&project, actor)?;

    if json {
        print_json(&ProjectOutput::from(project))?;
    } else {
        println!("Created project: {}", project.name);
        println!("  ID:        {}", project.id);
        println!("  Workspace: {}", project.workspace_id);
        if let Some(ref prefix) = project.issue_prefix {
            println!("  Prefix:    {prefix}");
        }
    }

    Ok(())
}

fn list(storage: &SqliteStorage, limit: usize, workspace: Option<&str>, json: bool) -> Result<()> {
    let workspace = resolve_workspace(workspace)?;
    let projects = storage.list_projects(Some(&workspace), limit)?;

    if json {
        let projects: Vec<ProjectOutput> = projects.into_iter().map(ProjectOutput::from).collect();
        let count = projects.len();
        return print_json(&ProjectListOutput { projects, count });
    }

    if projects.is_empty() {
        println!("No projects in workspace {workspace}.");
        return Ok(());
    }

    println!("Projects ({} found):", projects.len());
    println!();
    for project in &projects {
        let prefix = project.issue_prefix.as_deref().unwrap_or("-");
        println!("  {} [{}] {}", project.id, prefix, project.name);
        if let Some(ref desc) = project.description {
            println!("        {desc}");
        }
    }

    Ok(())
}

fn show(storage: &SqliteStorage, id: &str, workspace: Option<&str>, json: bool) -> Result<()> {
    let project = scoped_project(storage, id, workspace)?;
    let steps = storage.list_steps(&project.id)?;

    if json {
        return print_json(&ProjectShowOutput {
            project: ProjectOutput::from(project),
            steps,
        });
    }

    println!("{} ({})", project.name, project.id);
    println!();
    println!("Workspace:  {}", project.workspace_id);
    if let Some(ref prefix) = project.issue_prefix {
        println!("Prefix:     {prefix}");
    }
    println!("Created:    {}", format_timestamp(project.created_at));
    if let Some(ref desc) = project.description {
        println!();
        println!("{desc}");
    }

    println!();
    if steps.is_empty() {
        println!("No pipeline steps. Add one with 'pipectl step add'.");
    } else {
        println!("Pipeline ({} steps):", steps.len());
        for step in &steps {
            let auto = if step.auto_advance { "auto" } else { "manual" };
            println!(
                "  {:>3}. {} [{}, {}]",
                step.step_number, step.name, step.step_type, auto
            );
        }
    }

    Ok(())
}
