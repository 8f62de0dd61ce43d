//! Issue command implementations.

use super::{
    format_timestamp, open_storage, print_json, scoped_issue, scoped_project, unknown_choice,
};
use crate::cli::{IssueCommands, IssueCreateArgs};
use crate::config::default_actor;
use crate::error::{Error, Result};
use crate::model::{Issue, WorkStatus};
use crate::storage::SqliteStorage;
use crate::validate::normalize_work_status;
use serde::Serialize;
use std::path::PathBuf;

#[derive(Serialize)]
struct IssueListOutput {
    issues: Vec<Issue>,
    count: usize,
}

/// Execute an issue command.
///
/// # Errors
///
/// Returns `NotInitialized` without a database, workspace errors for
/// out-of-scope projects, or any storage error.
pub fn execute(
    command: &IssueCommands,
    db_path: Option<&PathBuf>,
    actor: Option<&str>,
    workspace: Option<&str>,
    json: bool,
) -> Result<()> {
    let mut storage = open_storage(db_path)?;
    let actor = actor.map_or_else(default_actor, String::from);

    match command {
        IssueCommands::Create(args) => create(&mut storage, args, workspace, &actor, json),
        IssueCommands::List {
            project,
            status,
            limit,
        } => list(&storage, project, status.as_deref(), *limit, workspace, json),
        IssueCommands::Show { id } => show(&storage, id, workspace, json),
    }
}

fn create(
    storage: &mut SqliteStorage,
    args: &IssueCreateArgs,
    workspace: Option<&str>,
    actor: &str,
    json: bool,
) -> Result<()> {
    let title = args.title.trim();
    if title.is_empty() {
        return Err(Error::InvalidArgument("issue title cannot be empty".to_string()));
    }

    let project = scoped_project(storage, &args.project, workspace)?;
    let issue = storage.create_issue(&project.id, title, args.description.as_deref(), actor)?;

    if json {
        print_json(&issue)?;
    } else {
        let short_id = issue.short_id.as_deref().unwrap_or(&issue.id);
        println!("Created issue [{short_id}] {}", issue.title);
        println!("  ID: {}", issue.id);
    }

    Ok(())
}

fn list(
    storage: &SqliteStorage,
    project_id: &str,
    status: Option<&str>,
    limit: u32,
    workspace: Option<&str>,
    json: bool,
) -> Result<()> {
    let project = scoped_project(storage, project_id, workspace)?;

    let status = status
        .map(|s| normalize_work_status(s).map_err(unknown_choice("work status")))
        .transpose()?;

    let issues = storage.list_issues(&project.id, status, Some(limit))?;

    if json {
        let count = issues.len();
        return print_json(&IssueListOutput { issues, count });
    }

    if issues.is_empty() {
        println!("No issues found.");
        return Ok(());
    }

    println!("Issues ({} found):", issues.len());
    println!();
    for issue in &issues {
        let status_icon = match issue.work_status {
            WorkStatus::Todo => "○",
            WorkStatus::InProgress => "●",
            WorkStatus::Review => "◐",
            WorkStatus::Done => "✓",
            WorkStatus::Blocked => "⊘",
        };
        let short_id = issue.short_id.as_deref().unwrap_or(&issue.id);
        println!("{status_icon} [{short_id}] {} ({})", issue.title, issue.work_status);
    }

    Ok(())
}

fn show(storage: &SqliteStorage, id: &str, workspace: Option<&str>, json: bool) -> Result<()> {
    let issue = scoped_issue(storage, id, workspace)?;

    if json {
        return print_json(&issue);
    }

    let short_id = issue.short_id.as_deref().unwrap_or(&issue.id);
    println!("[{short_id}] {}", issue.title);
    println!();
    println!("Status:   {}", issue.work_status);
    println!("Project:  {}", issue.project_id);
    println!("Created:  {}", format_timestamp(issue.created_at));
    if let Some(ref desc) = issue.description {
        println!();
        println!("Description:");
        println!("{desc}");
    }

    Ok(())
}
