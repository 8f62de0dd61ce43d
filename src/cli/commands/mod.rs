//! Command implementations.

pub mod completions;
pub mod gate;
pub mod init;
pub mod issue;
pub mod pipeline;
pub mod project;
pub mod step;
pub mod version;

use crate::config::{ensure_workspace_access, load_settings, resolve_db_path, resolve_workspace};
use crate::error::{Error, Result};
use crate::model::{Issue, Project};
use crate::storage::SqliteStorage;
use crate::validate::find_similar_ids;
use std::path::PathBuf;

/// Resolve and open the database. It must already exist (`pipectl init`).
pub(crate) fn open_storage(db_path: Option<&PathBuf>) -> Result<SqliteStorage> {
    let db_path = resolve_db_path(db_path.map(PathBuf::as_path)).ok_or(Error::NotInitialized)?;

    if !db_path.exists() {
        return Err(Error::NotInitialized);
    }

    let settings = load_settings()?;
    SqliteStorage::open_with_timeout(&db_path, settings.busy_timeout_ms)
}

/// Load a project and check it belongs to the active workspace.
pub(crate) fn scoped_project(
    storage: &SqliteStorage,
    project_id: &str,
    workspace: Option<&str>,
) -> Result<Project> {
    let workspace = resolve_workspace(workspace)?;
    let project = storage
        .get_project(project_id)?
        .ok_or_else(|| Error::ProjectNotFound {
            id: project_id.to_string(),
        })?;
    ensure_workspace_access(&project, &workspace, &format!("project {}", project.id))?;
    Ok(project)
}

/// Load an issue and check its project belongs to the active workspace.
pub(crate) fn scoped_issue(
    storage: &SqliteStorage,
    issue_id: &str,
    workspace: Option<&str>,
) -> Result<Issue> {
    let workspace = resolve_workspace(workspace)?;
    let issue = storage.get_issue(issue_id)?.ok_or_else(|| {
        let all_ids = storage.get_all_issue_short_ids().unwrap_or_default();
        let similar = find_similar_ids(issue_id, &all_ids, 3);
        if similar.is_empty() {
            Error::IssueNotFound {
                id: issue_id.to_string(),
            }
        } else {
            Error::IssueNotFoundSimilar {
                id: issue_id.to_string(),
                similar,
            }
        }
    })?;

    let project = storage
        .get_project(&issue.project_id)?
        .ok_or_else(|| Error::ProjectNotFound {
            id: issue.project_id.clone(),
        })?;
    let label = issue.short_id.as_deref().unwrap_or(&issue.id);
    ensure_workspace_access(&project, &workspace, &format!("issue {label}"))?;
    Ok(issue)
}

pub(crate) fn format_timestamp(ts: i64) -> String {
    chrono::DateTime::from_timestamp_millis(ts)
        .map_or_else(|| ts.to_string(), |dt| dt.to_rfc3339())
}

pub(crate) fn print_json<T: serde::Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string(value)?);
    Ok(())
}

/// Turn a failed `validate::normalize_*` lookup into an `InvalidArgument`.
pub(crate) fn unknown_choice(kind: &'static str) -> impl FnOnce((String, Option<String>)) -> Error {
    move |(input, suggestion)| {
        let hint = suggestion.map_or_else(String::new, |s| format!(" (did you mean '{s}'?)"));
        Error::InvalidArgument(format!("unknown {kind} '{input}'{hint}"))
    }
}
