//! Configuration management.
//!
//! This module provides functions for resolving the database path, the
//! active workspace, and the acting user, and for loading the optional
//! settings file.
//!
//! # Layout
//!
//! pipectl keeps everything under `~/.pipectl/`:
//! - **Database**: `~/.pipectl/data/pipeline.db`
//! - **Settings**: `~/.pipectl/config.json`

mod settings;

pub use settings::{config_path, load_settings, save_settings, Settings};

use crate::error::{Error, Result};
use crate::model::Project;

use std::path::{Path, PathBuf};

/// Get the global pipectl directory (`~/.pipectl/`).
#[must_use]
pub fn global_dir() -> Option<PathBuf> {
    directories::BaseDirs::new().map(|b| b.home_dir().join(".pipectl"))
}

/// Check if test mode is enabled.
///
/// Test mode is enabled by setting `PIPECTL_TEST_DB=1` (or any non-empty value).
/// This redirects all database operations to an isolated test database.
#[must_use]
pub fn is_test_mode() -> bool {
    std::env::var("PIPECTL_TEST_DB").is_ok_and(|v| is_truthy(&v))
}

fn is_truthy(value: &str) -> bool {
    !value.is_empty() && value != "0" && !value.eq_ignore_ascii_case("false")
}

/// Get the test database path (`~/.pipectl/test/pipeline.db`).
#[must_use]
pub fn test_db_path() -> Option<PathBuf> {
    global_dir().map(|dir| dir.join("test").join("pipeline.db"))
}

/// Resolve the database path.
///
/// Priority:
/// 1. If `explicit_path` is provided, use it directly
/// 2. `PIPECTL_TEST_DB` environment variable → uses test database
/// 3. `PIPECTL_DB` environment variable
/// 4. Global location: `~/.pipectl/data/pipeline.db`
#[must_use]
pub fn resolve_db_path(explicit_path: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit_path {
        return Some(path.to_path_buf());
    }

    if is_test_mode() {
        return test_db_path();
    }

    if let Ok(db_path) = std::env::var("PIPECTL_DB") {
        if !db_path.trim().is_empty() {
            return Some(PathBuf::from(db_path));
        }
    }

    global_dir().map(|dir| dir.join("data").join("pipeline.db"))
}

/// Resolve the active workspace.
///
/// Priority:
/// 1. Explicit `--workspace` flag
/// 2. `PIPECTL_WORKSPACE` environment variable
/// 3. `default_workspace` from the settings file
/// 4. **Error** — no fallback, no guessing
///
/// # Errors
///
/// Returns `NoWorkspace` when nothing is set, or `Config` if the settings
/// file is malformed.
pub fn resolve_workspace(explicit: Option<&str>) -> Result<String> {
    if let Some(ws) = explicit.map(str::trim).filter(|w| !w.is_empty()) {
        return Ok(ws.to_string());
    }

    if let Ok(ws) = std::env::var("PIPECTL_WORKSPACE") {
        if !ws.trim().is_empty() {
            return Ok(ws.trim().to_string());
        }
    }

    load_settings()?
        .default_workspace
        .filter(|w| !w.trim().is_empty())
        .ok_or(Error::NoWorkspace)
}

/// Check that a project belongs to the active workspace.
///
/// # Errors
///
/// Returns `Forbidden` if the project lives in another workspace.
pub fn ensure_workspace_access(project: &Project, workspace: &str, resource: &str) -> Result<()> {
    if project.workspace_id == workspace {
        return Ok(());
    }
    Err(Error::Forbidden {
        resource: resource.to_string(),
        owner: project.workspace_id.clone(),
        workspace: workspace.to_string(),
    })
}

/// Get the default actor name.
///
/// Priority:
/// 1. `PIPECTL_ACTOR` environment variable
/// 2. Git user name
/// 3. System username
/// 4. "unknown"
#[must_use]
pub fn default_actor() -> String {
    if let Ok(actor) = std::env::var("PIPECTL_ACTOR") {
        if !actor.is_empty() {
            return actor;
        }
    }

    if let Ok(output) = std::process::Command::new("git")
        .args(["config", "user.name"])
        .output()
    {
        if output.status.success() {
            let name = String::from_utf8_lossy(&output.stdout).trim().to_string();
            if !name.is_empty() {
                return name;
            }
        }
    }

    if let Ok(user) = std::env::var("USER") {
        return user;
    }

    "unknown".to_string()
}
