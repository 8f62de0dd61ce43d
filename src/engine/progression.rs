//! Step-catalog traversal and transition planning.
//!
//! Everything here is pure: given the ordered catalog, the current state and
//! a timestamp, these functions decide what the next state is. Applying the
//! plan is the engine's job.

use crate::error::{Error, Result};
use crate::model::{
    IssuePipelineState, NewHistoryEntry, PipelinePosition, PipelineStep, StateUpdate,
    StepResult, WorkStatus,
};
use crate::validate::non_blank;
use tracing::debug;

/// A resolved position in the catalog.
#[derive(Debug, Clone, Copy)]
pub struct Cursor<'s> {
    pub index: usize,
    pub step: &'s PipelineStep,
}

/// What a transition did to the pointer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// Case A: moved forward onto `to`.
    Advanced { to: String, parked: bool },
    /// Case B: stayed on the completed step.
    Held { parked: bool },
    /// Case C: the last step was completed.
    Finished,
    /// Moved backward onto the previous actionable step.
    Rejected { to: String },
}

/// A fully planned transition, ready to be persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transition {
    /// The step that was current when the call was made.
    pub from_step_id: String,
    pub history: NewHistoryEntry,
    pub update: StateUpdate,
    /// `None` leaves the issue's work status untouched.
    pub work_status: Option<WorkStatus>,
    pub outcome: Outcome,
}

impl Transition {
    #[must_use]
    pub fn parked_for_human_review(&self) -> bool {
        matches!(
            self.outcome,
            Outcome::Advanced { parked: true, .. } | Outcome::Held { parked: true }
        )
    }

    #[must_use]
    pub fn completed_pipeline(&self) -> bool {
        self.outcome == Outcome::Finished
    }
}

/// Find the step the state points at.
///
/// # Errors
///
/// `Conflict` if the id is not in the catalog (catalog and state desynchronized).
pub fn locate<'s>(steps: &'s [PipelineStep], step_id: &str) -> Result<Cursor<'s>> {
    steps
        .iter()
        .enumerate()
        .find(|(_, step)| step.id == step_id)
        .map(|(index, step)| Cursor { index, step })
        .ok_or_else(|| {
            Error::Conflict(format!(
                "current step {step_id} is not in the project's step catalog"
            ))
        })
}

/// Resolve the step a completion acts on.
///
/// A never-started issue is treated as sitting on the first step; this is
/// the only place that bootstrap happens.
///
/// # Errors
///
/// - `Validation` if the catalog is empty
/// - `Conflict` if the pointer is unknown or the pipeline already completed
pub fn ensure_started<'s>(
    steps: &'s [PipelineStep],
    state: &IssuePipelineState,
) -> Result<Cursor<'s>> {
    match state.position() {
        PipelinePosition::NotStarted => steps
            .first()
            .map(|step| Cursor { index: 0, step })
            .ok_or_else(|| {
                Error::Validation(format!(
                    "project {} has no pipeline steps",
                    state.project_id
                ))
            }),
        PipelinePosition::AtStep(step_id) => locate(steps, &step_id),
        PipelinePosition::Completed => Err(Error::Conflict(format!(
            "pipeline for issue {} is already completed",
            state.issue_id
        ))),
    }
}

/// Explicit acting agent if non-blank, else the step's default assignee.
#[must_use]
pub fn effective_agent(explicit: Option<&str>, step: &PipelineStep) -> Option<String> {
    non_blank(explicit).or_else(|| non_blank(step.assigned_agent_id.as_deref()))
}

/// Walk backward from `index - 1` to 0, skipping human-review gates.
///
/// An `index` past the end of the catalog starts from the last step.
#[must_use]
pub fn previous_actionable(steps: &[PipelineStep], index: usize) -> Option<usize> {
    steps[..index.min(steps.len())]
        .iter()
        .rposition(|s| !s.is_human_review())
}

/// Plan a `CompleteCurrentStep` call.
///
/// # Errors
///
/// See [`ensure_started`].
pub fn plan_completion(
    steps: &[PipelineStep],
    state: &IssuePipelineState,
    acting_agent_id: Option<&str>,
    notes: Option<&str>,
    now: i64,
) -> Result<Transition> {
    let current = ensure_started(steps, state)?;
    let step = current.step;

    let history = NewHistoryEntry::new(&state.issue_id, &step.id, StepResult::Completed, now)
        .with_agent(effective_agent(acting_agent_id, step))
        .with_notes(notes.map(ToString::to_string));

    let started_at = state.pipeline_started_at.or(Some(now));

    let (update, work_status, outcome) = match steps.get(current.index + 1) {
        // Case A: auto-advance onto the next step
        Some(next) if step.auto_advance && !step.is_human_review() => {
            let parked = next.is_human_review();
            debug!(from = %step.id, to = %next.id, parked, "auto-advancing");
            (
                StateUpdate {
                    current_step_id: Some(next.id.clone()),
                    started_at,
                    completed_at: state.pipeline_completed_at,
                },
                Some(if parked {
                    WorkStatus::Review
                } else {
                    WorkStatus::InProgress
                }),
                Outcome::Advanced {
                    to: next.id.clone(),
                    parked,
                },
            )
        }
        // Case B: done, but leaving needs an external trigger
        Some(_) => {
            let parked = step.is_human_review();
            debug!(step = %step.id, parked, "holding on step");
            (
                StateUpdate {
                    current_step_id: Some(step.id.clone()),
                    started_at,
                    completed_at: state.pipeline_completed_at,
                },
                parked.then_some(WorkStatus::Review),
                Outcome::Held { parked },
            )
        }
        // Case C: last step
        None => (
            StateUpdate {
                current_step_id: None,
                started_at,
                completed_at: Some(now),
            },
            Some(WorkStatus::Done),
            Outcome::Finished,
        ),
    };

    Ok(Transition {
        from_step_id: step.id.clone(),
        history,
        update,
        work_status,
        outcome,
    })
}

/// Plan a `RejectCurrentStep` call.
///
/// # Errors
///
/// - `Validation` if the issue has no current step
/// - `Conflict` if the pointer is unknown, sits on the first step, or no
///   earlier actionable step exists
pub fn plan_rejection(
    steps: &[PipelineStep],
    state: &IssuePipelineState,
    acting_agent_id: Option<&str>,
    reason: &str,
    now: i64,
) -> Result<Transition> {
    let Some(step_id) = state.current_pipeline_step_id.as_deref() else {
        return Err(Error::Validation(format!(
            "issue {} has no current step to reject",
            state.issue_id
        )));
    };

    let current = locate(steps, step_id)?;
    if current.index == 0 {
        return Err(Error::Conflict(format!(
            "cannot reject the first step ({})",
            current.step.id
        )));
    }

    let target = previous_actionable(steps, current.index).ok_or_else(|| {
        Error::Conflict(format!(
            "no previous actionable step before {}",
            current.step.id
        ))
    })?;
    let target = &steps[target];
    debug!(from = %current.step.id, to = %target.id, "rejecting back");

    let history = NewHistoryEntry::new(&state.issue_id, &current.step.id, StepResult::Rejected, now)
        .with_agent(effective_agent(acting_agent_id, current.step))
        .with_notes(Some(reason.to_string()));

    Ok(Transition {
        from_step_id: current.step.id.clone(),
        history,
        update: StateUpdate {
            current_step_id: Some(target.id.clone()),
            started_at: state.pipeline_started_at,
            completed_at: state.pipeline_completed_at,
        },
        work_status: Some(WorkStatus::InProgress),
        outcome: Outcome::Rejected {
            to: target.id.clone(),
        },
    })
}
