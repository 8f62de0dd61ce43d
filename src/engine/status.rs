//! Read-only pipeline status projection.

use crate::engine::store::PipelineStore;
use crate::error::{Error, Result};
use crate::model::{
    GateSnapshot, HistoryEntry, Issue, IssuePipelineState, PipelinePosition, PipelineStep,
    WorkStatus,
};
use serde::Serialize;

/// The issue fields a status view carries.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IssueSummary {
    pub id: String,
    pub short_id: Option<String>,
    pub project_id: String,
    pub title: String,
    pub work_status: WorkStatus,
}

impl From<&Issue> for IssueSummary {
    fn from(issue: &Issue) -> Self {
        Self {
            id: issue.id.clone(),
            short_id: issue.short_id.clone(),
            project_id: issue.project_id.clone(),
            title: issue.title.clone(),
            work_status: issue.work_status,
        }
    }
}

/// Everything a dashboard needs to render one issue's pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PipelineStatusView {
    pub issue: IssueSummary,
    pub position: PipelinePosition,
    /// `None` when there is no pointer or it names a step not in the catalog.
    pub current_step: Option<PipelineStep>,
    pub steps: Vec<PipelineStep>,
    pub history: Vec<HistoryEntry>,
    pub pipeline_started_at: Option<i64>,
    pub pipeline_completed_at: Option<i64>,
    pub gate: GateSnapshot,
}

impl PipelineStatusView {
    /// Zero-based index of the current step in the catalog.
    #[must_use]
    pub fn current_index(&self) -> Option<usize> {
        let current = self.current_step.as_ref()?;
        self.steps.iter().position(|s| s.id == current.id)
    }
}

/// Build the status view for an issue. Never writes.
///
/// # Errors
///
/// `IssueNotFound` if the issue does not exist; storage errors otherwise.
pub fn build_status<S: PipelineStore + ?Sized>(store: &S, issue_id: &str) -> Result<PipelineStatusView> {
    let issue = store
        .get_issue(issue_id)?
        .ok_or_else(|| Error::IssueNotFound {
            id: issue_id.to_string(),
        })?;

    let steps = store.list_steps(&issue.project_id)?;
    let state = store
        .get_state(&issue.id)?
        .unwrap_or_else(|| IssuePipelineState::not_started(&issue.id, &issue.project_id));
    let history = store.list_history(&issue.id)?;

    let current_step = state
        .current_pipeline_step_id
        .as_deref()
        .and_then(|id| steps.iter().find(|s| s.id == id))
        .cloned();

    Ok(PipelineStatusView {
        issue: IssueSummary::from(&issue),
        position: state.position(),
        current_step,
        steps,
        history,
        pipeline_started_at: state.pipeline_started_at,
        pipeline_completed_at: state.pipeline_completed_at,
        gate: state.gate,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{GateStatus, Project, StepType};
    use crate::storage::{NewStep, SqliteStorage};

    #[test]
    fn test_status_for_never_started_issue() {
        let mut storage = SqliteStorage::open_memory().unwrap();
        let project = Project::new("Web".to_string(), "ws".to_string());
        storage.create_project(&project, "t").unwrap();
        let issue = storage.create_issue(&project.id, "Landing page", None, "t").unwrap();
        storage
            .add_step(
                &NewStep {
                    project_id: &project.id,
                    name: "Build",
                    step_type: StepType::AgentWork,
                    assigned_agent_id: None,
                    auto_advance: true,
                    step_number: None,
                },
                "t",
            )
            .unwrap();

        let view = build_status(&storage.store(), "WEB-1").unwrap();
        assert_eq!(view.issue.id, issue.id);
        assert_eq!(view.position, PipelinePosition::NotStarted);
        assert!(view.current_step.is_none());
        assert_eq!(view.steps.len(), 1);
        assert!(view.history.is_empty());
        assert!(view.pipeline_started_at.is_none());
    }

    #[test]
    fn test_status_surfaces_gate_snapshot() {
        let mut storage = SqliteStorage::open_memory().unwrap();
        let project = Project::new("Web".to_string(), "ws".to_string());
        storage.create_project(&project, "t").unwrap();
        let issue = storage.create_issue(&project.id, "Landing page", None, "t").unwrap();
        storage
            .record_gate_signal(&issue.id, GateStatus::Bypassed, None, "gate")
            .unwrap();

        let view = build_status(&storage.store(), &issue.id).unwrap();
        assert_eq!(view.gate.status, Some(GateStatus::Bypassed));
        assert_eq!(view.position, PipelinePosition::NotStarted);
    }

    #[test]
    fn test_status_unknown_issue() {
        let storage = SqliteStorage::open_memory().unwrap();
        let err = build_status(&storage.store(), "NOPE-1").unwrap_err();
        assert!(matches!(err, Error::IssueNotFound { .. }));
    }
}
