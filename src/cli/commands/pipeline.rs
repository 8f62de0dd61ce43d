//! Pipeline progression commands.
//!
//! - `pipectl pipeline advance <issue>` - Complete the current step
//! - `pipectl pipeline reject <issue> --reason R` - Send the issue back
//! - `pipectl pipeline status <issue>` - Where the issue sits
//! - `pipectl pipeline history <issue>` - Every recorded transition
//! - `pipectl pipeline reset <issue>` - Clear the position, keep history

use super::{format_timestamp, open_storage, print_json, scoped_issue};
use crate::cli::PipelineCommands;
use crate::config::default_actor;
use crate::engine::status::PipelineStatusView;
use crate::engine::PipelineEngine;
use crate::error::Result;
use crate::model::{HistoryEntry, PipelinePosition, PipelineStep, StepResult};
use crate::storage::SqliteStorage;
use colored::Colorize;
use serde::Serialize;
use std::path::PathBuf;

#[derive(Serialize)]
struct HistoryOutput {
    issue_id: String,
    history: Vec<HistoryEntry>,
    count: usize,
}

#[derive(Serialize)]
struct ResetOutput {
    issue_id: String,
    reset: bool,
}

/// Execute a pipeline command.
///
/// # Errors
///
/// Propagates engine errors unchanged: `Validation`, `Conflict`,
/// `IssueNotFound`, workspace errors, and storage errors.
pub fn execute(
    command: &PipelineCommands,
    db_path: Option<&PathBuf>,
    actor: Option<&str>,
    workspace: Option<&str>,
    json: bool,
) -> Result<()> {
    let mut storage = open_storage(db_path)?;
    let actor = actor.map_or_else(default_actor, String::from);

    match command {
        PipelineCommands::Advance {
            issue,
            agent,
            notes,
        } => advance(&mut storage, issue, agent.as_deref(), notes.as_deref(), workspace, &actor, json),
        PipelineCommands::Reject {
            issue,
            reason,
            agent,
        } => reject(&mut storage, issue, agent.as_deref(), reason, workspace, &actor, json),
        PipelineCommands::Status { issue } => status(&mut storage, issue, workspace, &actor, json),
        PipelineCommands::History { issue } => history(&storage, issue, workspace, json),
        PipelineCommands::Reset { issue } => reset(&mut storage, issue, workspace, &actor, json),
    }
}

fn step_name(storage: &SqliteStorage, step_id: &str) -> String {
    storage
        .get_step(step_id)
        .ok()
        .flatten()
        .map_or_else(|| step_id.to_string(), |s| s.name)
}

fn advance(
    storage: &mut SqliteStorage,
    issue_id: &str,
    agent: Option<&str>,
    notes: Option<&str>,
    workspace: Option<&str>,
    actor: &str,
    json: bool,
) -> Result<()> {
    let issue = scoped_issue(storage, issue_id, workspace)?;
    let result = PipelineEngine::new(storage, actor).complete(&issue.id, agent, notes)?;

    if json {
        return print_json(&result);
    }

    let completed = step_name(storage, &result.completed_step_id);
    println!("{} Completed {}", "✓".green(), completed.bold());

    match result.current_pipeline_step_id.as_deref() {
        None => println!("  Pipeline completed"),
        Some(current) if current == result.completed_step_id => {
            if result.parked_for_human_review {
                println!("  {}", "Waiting for human review".yellow());
            } else {
                println!("  Holding on {completed} until advanced again");
            }
        }
        Some(current) => {
            let next = step_name(storage, current);
            if result.parked_for_human_review {
                println!("  Now at {} {}", next.bold(), "(human review)".yellow());
            } else {
                println!("  Now at {}", next.bold());
            }
        }
    }

    Ok(())
}

fn reject(
    storage: &mut SqliteStorage,
    issue_id: &str,
    agent: Option<&str>,
    reason: &str,
    workspace: Option<&str>,
    actor: &str,
    json: bool,
) -> Result<()> {
    let issue = scoped_issue(storage, issue_id, workspace)?;
    let result = PipelineEngine::new(storage, actor).reject(&issue.id, agent, reason)?;

    if json {
        return print_json(&result);
    }

    println!(
        "{} Rejected {}",
        "✗".red(),
        step_name(storage, &result.completed_step_id).bold()
    );
    println!(
        "  Sent back to {}",
        step_name(storage, &result.current_pipeline_step_id).bold()
    );

    Ok(())
}

fn status(
    storage: &mut SqliteStorage,
    issue_id: &str,
    workspace: Option<&str>,
    actor: &str,
    json: bool,
) -> Result<()> {
    let issue = scoped_issue(storage, issue_id, workspace)?;
    let view = PipelineEngine::new(storage, actor).status(&issue.id)?;

    if json {
        return print_json(&view);
    }

    print_status(&view);
    Ok(())
}

fn print_status(view: &PipelineStatusView) {
    let short_id = view.issue.short_id.as_deref().unwrap_or(&view.issue.id);
    println!("{} {}", format!("[{short_id}]").bold(), view.issue.title);
    println!("Status: {}", view.issue.work_status);

    let position = match &view.position {
        PipelinePosition::NotStarted => "not started".dimmed().to_string(),
        PipelinePosition::Completed => "completed".green().to_string(),
        PipelinePosition::AtStep(_) => match view.current_step {
            Some(ref step) => step.name.clone(),
            None => "unknown step".red().to_string(),
        },
    };
    println!("Position: {position}");

    if let Some(status) = view.gate.status {
        let label = match view.gate.error.as_deref() {
            Some(err) => format!("{} ({err})", status.as_str()),
            None => status.as_str().to_string(),
        };
        println!("Gate: {label}");
    }

    println!();
    println!("{}", "Pipeline".cyan().bold());
    let current = view.current_index();
    for (i, step) in view.steps.iter().enumerate() {
        let marker = match current {
            Some(c) if c == i => "▶".green().to_string(),
            Some(c) if i < c => "✓".dimmed().to_string(),
            _ if view.position == PipelinePosition::Completed => "✓".dimmed().to_string(),
            _ => " ".to_string(),
        };
        println!("  {marker} {}", describe_step(step));
    }

    if !view.history.is_empty() {
        println!();
        println!("{}", "History".cyan().bold());
        for entry in &view.history {
            print_history_entry(entry, &view.steps);
        }
    }
}

fn describe_step(step: &PipelineStep) -> String {
    let auto = if step.auto_advance { "" } else { ", manual" };
    format!("{}. {} [{}{auto}]", step.step_number, step.name, step.step_type)
}

fn print_history_entry(entry: &HistoryEntry, steps: &[PipelineStep]) {
    let name = steps
        .iter()
        .find(|s| s.id == entry.step_id)
        .map_or(entry.step_id.as_str(), |s| s.name.as_str());
    let result = match entry.result {
        StepResult::Completed => "completed".green(),
        StepResult::Rejected => "rejected".red(),
    };
    let agent = entry.agent_id.as_deref().unwrap_or("-");
    println!(
        "  {} {} {} by {}",
        format_timestamp(entry.completed_at).dimmed(),
        name,
        result,
        agent
    );
    if let Some(ref notes) = entry.notes {
        println!("      {notes}");
    }
}

fn history(storage: &SqliteStorage, issue_id: &str, workspace: Option<&str>, json: bool) -> Result<()> {
    let issue = scoped_issue(storage, issue_id, workspace)?;
    let history = storage.list_history(&issue.id)?;

    if json {
        let count = history.len();
        return print_json(&HistoryOutput {
            issue_id: issue.id,
            history,
            count,
        });
    }

    if history.is_empty() {
        println!("No transitions recorded.");
        return Ok(());
    }

    let steps = storage.list_steps(&issue.project_id)?;
    for entry in &history {
        print_history_entry(entry, &steps);
    }
    Ok(())
}

fn reset(
    storage: &mut SqliteStorage,
    issue_id: &str,
    workspace: Option<&str>,
    actor: &str,
    json: bool,
) -> Result<()> {
    let issue = scoped_issue(storage, issue_id, workspace)?;
    storage.reset_pipeline_state(&issue.id, actor)?;

    if json {
        return print_json(&ResetOutput {
            issue_id: issue.id,
            reset: true,
        });
    }

    let short_id = issue.short_id.as_deref().unwrap_or(&issue.id);
    println!("Reset pipeline for [{short_id}]; history kept");
    Ok(())
}
