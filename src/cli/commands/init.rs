//! Initialize the pipectl database.
//!
//! Creates `~/.pipectl/data/pipeline.db` (or the `--db` / `PIPECTL_DB`
//! location) and applies the schema. When `PIPECTL_TEST_DB=1` is set,
//! `~/.pipectl/test/pipeline.db` is used instead.

use crate::config::{load_settings, resolve_db_path, save_settings};
use crate::error::{Error, Result};
use crate::storage::SqliteStorage;
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Serialize)]
struct InitOutput {
    database: PathBuf,
    #[serde(skip_serializing_if = "Option::is_none")]
    default_workspace: Option<String>,
}

/// Execute the init command.
///
/// # Errors
///
/// Returns `AlreadyInitialized` if the database exists and `force` is not
/// set, or an error if the directory or database cannot be created.
pub fn execute(
    db_path: Option<&PathBuf>,
    force: bool,
    default_workspace: Option<&str>,
    json: bool,
) -> Result<()> {
    let db_path = resolve_db_path(db_path.map(PathBuf::as_path)).ok_or_else(|| {
        Error::Config("Could not determine pipectl database location".to_string())
    })?;

    create_database(&db_path, force)?;

    if let Some(ws) = default_workspace {
        let mut settings = load_settings()?;
        settings.default_workspace = Some(ws.to_string());
        save_settings(&settings)?;
    }

    if json {
        let output = InitOutput {
            database: db_path,
            default_workspace: default_workspace.map(ToString::to_string),
        };
        println!("{}", serde_json::to_string(&output)?);
    } else {
        println!("Initialized pipectl database");
        println!("  Database: {}", db_path.display());
        if let Some(ws) = default_workspace {
            println!("  Default workspace: {ws}");
        }
    }

    Ok(())
}

fn create_database(db_path: &Path, force: bool) -> Result<()> {
    if db_path.exists() {
        if !force {
            return Err(Error::AlreadyInitialized {
                path: db_path.to_path_buf(),
            });
        }
        fs::remove_file(db_path)?;
        for suffix in ["-wal", "-shm"] {
            let sidecar = PathBuf::from(format!("{}{suffix}", db_path.display()));
            if sidecar.exists() {
                fs::remove_file(sidecar)?;
            }
        }
    }

    if let Some(parent) = db_path.parent() {
        fs::create_dir_all(parent)?;
    }

    // Opening applies the schema
    SqliteStorage::open(db_path)?;
    Ok(())
}
