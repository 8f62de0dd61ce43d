//! Context gate commands.

use super::{open_storage, print_json, scoped_issue, unknown_choice};
use crate::cli::GateCommands;
use crate::config::default_actor;
use crate::error::Result;
use crate::validate::{non_blank, normalize_gate_status};
use std::path::PathBuf;

/// Execute a gate command.
///
/// # Errors
///
/// Returns `InvalidArgument` for an unknown gate status, workspace errors for
/// out-of-scope issues, or any storage error.
pub fn execute(
    command: &GateCommands,
    db_path: Option<&PathBuf>,
    actor: Option<&str>,
    workspace: Option<&str>,
    json: bool,
) -> Result<()> {
    let GateCommands::Record {
        issue,
        status,
        error,
    } = command;

    let status = normalize_gate_status(status).map_err(unknown_choice("gate status"))?;

    let mut storage = open_storage(db_path)?;
    let actor = actor.map_or_else(default_actor, String::from);

    let issue = scoped_issue(&storage, issue, workspace)?;
    let error = non_blank(error.as_deref());
    let state = storage.record_gate_signal(&issue.id, status, error.as_deref(), &actor)?;

    if json {
        return print_json(&state);
    }

    let short_id = issue.short_id.as_deref().unwrap_or(&issue.id);
    println!("Recorded gate {status} for [{short_id}]", status = status.as_str());
    if let Some(ref err) = state.gate.error {
        println!("  Error: {err}");
    }

    Ok(())
}
