//! Step catalog commands.

use super::{open_storage, print_json, scoped_project, unknown_choice};
use crate::cli::{StepAddArgs, StepCommands};
use crate::config::default_actor;
use crate::error::{Error, Result};
use crate::model::PipelineStep;
use crate::storage::{NewStep, SqliteStorage};
use crate::validate::{non_blank, normalize_step_type};
use serde::Serialize;
use std::path::PathBuf;

#[derive(Serialize)]
struct StepListOutput {
    project_id: String,
    steps: Vec<PipelineStep>,
    count: usize,
}

/// Execute a step command.
///
/// # Errors
///
/// Returns `NotInitialized` without a database, `InvalidArgument` for an
/// unknown step type, or any storage error.
pub fn execute(
    command: &StepCommands,
    db_path: Option<&PathBuf>,
    actor: Option<&str>,
    workspace: Option<&str>,
    json: bool,
) -> Result<()> {
    let mut storage = open_storage(db_path)?;
    let actor = actor.map_or_else(default_actor, String::from);

    match command {
        StepCommands::Add(args) => add(&mut storage, args, workspace, &actor, json),
        StepCommands::List { project } => list(&storage, project, workspace, json),
        StepCommands::Restaff { id, agent } => {
            restaff(&mut storage, id, agent.as_deref(), workspace, &actor, json)
        }
    }
}

fn add(
    storage: &mut SqliteStorage,
    args: &StepAddArgs,
    workspace: Option<&str>,
    actor: &str,
    json: bool,
) -> Result<()> {
    let step_type = normalize_step_type(&args.step_type).map_err(unknown_choice("step type"))?;

    let project = scoped_project(storage, &args.project, workspace)?;
    let agent = non_blank(args.agent.as_deref());

    let step = storage.add_step(
        &NewStep {
            project_id: &project.id,
            name: &args.name,
            step_type,
            assigned_agent_id: agent.as_deref(),
            auto_advance: !args.no_auto_advance,
            step_number: args.number,
        },
        actor,
    )?;

    if json {
        print_json(&step)?;
    } else {
        println!(
            "Added step {}. {} [{}] to {}",
            step.step_number, step.name, step.step_type, project.name
        );
        println!("  ID: {}", step.id);
    }

    Ok(())
}

fn list(storage: &SqliteStorage, project_id: &str, workspace: Option<&str>, json: bool) -> Result<()> {
    let project = scoped_project(storage, project_id, workspace)?;
    let steps = storage.list_steps(&project.id)?;

    if json {
        let count = steps.len();
        return print_json(&StepListOutput {
            project_id: project.id,
            steps,
            count,
        });
    }

    if steps.is_empty() {
        println!("No pipeline steps for {}.", project.name);
        return Ok(());
    }

    println!("Pipeline for {} ({} steps):", project.name, steps.len());
    for step in &steps {
        let auto = if step.auto_advance { "auto" } else { "manual" };
        let agent = step.assigned_agent_id.as_deref().unwrap_or("-");
        println!(
            "  {:>3}. {} [{}, {}] agent={} ({})",
            step.step_number, step.name, step.step_type, auto, agent, step.id
        );
    }

    Ok(())
}

fn restaff(
    storage: &mut SqliteStorage,
    step_id: &str,
    agent: Option<&str>,
    workspace: Option<&str>,
    actor: &str,
    json: bool,
) -> Result<()> {
    let step = storage.get_step(step_id)?.ok_or_else(|| Error::StepNotFound {
        id: step_id.to_string(),
    })?;
    scoped_project(storage, &step.project_id, workspace)?;

    let agent = non_blank(agent);
    let step = storage.restaff_step(&step.id, agent.as_deref(), actor)?;

    if json {
        print_json(&step)?;
    } else {
        match step.assigned_agent_id.as_deref() {
            Some(agent) => println!("Step {} now assigned to {agent}", step.name),
            None => println!("Step {} is now unassigned", step.name),
        }
    }

    Ok(())
}
