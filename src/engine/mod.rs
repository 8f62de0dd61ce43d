//! Issue pipeline progression engine.
//!
//! Moves an issue through its project's ordered step catalog:
//!
//! - [`complete_current_step`] records a completion and advances, parks, or
//!   finishes the pipeline
//! - [`reject_current_step`] records a rejection and sends the issue back to
//!   the nearest earlier step that is not a human-review gate
//! - [`status::build_status`] projects the current state without writing
//!
//! Both mutations are generic over [`store::PipelineStore`] and expect to be
//! called inside one write transaction; [`PipelineEngine`] does that through
//! [`store::TransactionalStore`].

pub mod progression;
pub mod status;
pub mod store;

use crate::error::{Error, Result};
use crate::model::{Issue, IssuePipelineState, PipelineStep};
use crate::storage::events::EventType;
use crate::storage::MutationContext;
use crate::validate::non_blank;
use progression::{plan_completion, plan_rejection, Outcome, Transition};
use serde::Serialize;
use status::{build_status, PipelineStatusView};
use store::{PipelineStore, TransactionalStore};
use tracing::info;

/// Result of a successful completion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CompletionResult {
    pub issue_id: String,
    /// The step that was current when the call was made.
    pub completed_step_id: String,
    /// `None` once the pipeline is completed.
    pub current_pipeline_step_id: Option<String>,
    pub completed_pipeline: bool,
    pub parked_for_human_review: bool,
}

/// Result of a successful rejection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RejectionResult {
    pub issue_id: String,
    /// The step that was rejected.
    pub completed_step_id: String,
    pub current_pipeline_step_id: String,
}

/// Complete the issue's current step.
///
/// A never-started issue is first placed on the catalog's first step.
///
/// # Errors
///
/// - `IssueNotFound` for an unknown issue
/// - `Validation` if the project has no steps
/// - `Conflict` if the pipeline already completed or the pointer is stale
/// - any storage error, which the caller's transaction rolls back
pub fn complete_current_step<S: PipelineStore + ?Sized>(
    store: &S,
    ctx: &mut MutationContext,
    issue_id: &str,
    acting_agent_id: Option<&str>,
    notes: Option<&str>,
) -> Result<CompletionResult> {
    let (issue, steps, state) = load(store, issue_id)?;
    if steps.is_empty() {
        return Err(Error::Validation(format!(
            "project {} has no pipeline steps",
            issue.project_id
        )));
    }

    let now = chrono::Utc::now().timestamp_millis();
    let transition = plan_completion(&steps, &state, acting_agent_id, notes, now)?;
    apply(store, ctx, &issue, &transition)?;

    Ok(CompletionResult {
        issue_id: issue.id,
        completed_step_id: transition.from_step_id.clone(),
        current_pipeline_step_id: transition.update.current_step_id.clone(),
        completed_pipeline: transition.completed_pipeline(),
        parked_for_human_review: transition.parked_for_human_review(),
    })
}

/// Reject the issue's current step.
///
/// # Errors
///
/// - `Validation` for a blank reason or an issue with no current step
/// - `IssueNotFound` for an unknown issue
/// - `Conflict` on the first step, with no earlier actionable step, or with
///   a stale pointer
pub fn reject_current_step<S: PipelineStore + ?Sized>(
    store: &S,
    ctx: &mut MutationContext,
    issue_id: &str,
    acting_agent_id: Option<&str>,
    reason: &str,
) -> Result<RejectionResult> {
    let reason = non_blank(Some(reason))
        .ok_or_else(|| Error::Validation("rejection reason must not be empty".to_string()))?;

    let (issue, steps, state) = load(store, issue_id)?;

    let now = chrono::Utc::now().timestamp_millis();
    let transition = plan_rejection(&steps, &state, acting_agent_id, &reason, now)?;
    apply(store, ctx, &issue, &transition)?;

    let Outcome::Rejected { to } = transition.outcome else {
        return Err(Error::Other("rejection planned a non-rejection outcome".to_string()));
    };

    Ok(RejectionResult {
        issue_id: issue.id,
        completed_step_id: transition.from_step_id,
        current_pipeline_step_id: to,
    })
}

fn load<S: PipelineStore + ?Sized>(
    store: &S,
    issue_id: &str,
) -> Result<(Issue, Vec<PipelineStep>, IssuePipelineState)> {
    let issue = store
        .get_issue(issue_id)?
        .ok_or_else(|| Error::IssueNotFound {
            id: issue_id.to_string(),
        })?;
    let steps = store.list_steps(&issue.project_id)?;
    let state = store
        .get_state(&issue.id)?
        .unwrap_or_else(|| IssuePipelineState::not_started(&issue.id, &issue.project_id));
    Ok((issue, steps, state))
}

/// Persist a planned transition: history, then state, then work status.
fn apply<S: PipelineStore + ?Sized>(
    store: &S,
    ctx: &mut MutationContext,
    issue: &Issue,
    transition: &Transition,
) -> Result<()> {
    let entry = store.append_history(&transition.history)?;
    store.update_state(&issue.id, &issue.project_id, &transition.update)?;

    if let Some(status) = transition.work_status {
        store.set_work_status(&issue.id, status)?;
        if status != issue.work_status {
            ctx.record_change(
                "issue",
                &issue.id,
                EventType::IssueStatusChanged,
                Some(issue.work_status.as_str().to_string()),
                Some(status.as_str().to_string()),
            );
        }
    }

    let event_type = match transition.outcome {
        Outcome::Rejected { .. } => EventType::PipelineStepRejected,
        _ => EventType::PipelineStepCompleted,
    };
    ctx.record_note(
        "issue",
        &issue.id,
        event_type,
        (
            Some(transition.from_step_id.clone()),
            transition.update.current_step_id.clone(),
        ),
        entry.notes.as_deref(),
    );

    if transition.completed_pipeline() {
        ctx.record_event("issue", &issue.id, EventType::PipelineCompleted);
    }

    info!(
        issue_id = %issue.id,
        step_id = %transition.from_step_id,
        outcome = ?transition.outcome,
        agent = entry.agent_id.as_deref().unwrap_or("-"),
        "pipeline transition"
    );

    Ok(())
}

/// Runs engine operations against a transactional store on behalf of one actor.
pub struct PipelineEngine<'a, T: TransactionalStore> {
    store: &'a mut T,
    actor: String,
}

impl<'a, T: TransactionalStore> PipelineEngine<'a, T> {
    pub fn new(store: &'a mut T, actor: &str) -> Self {
        Self {
            store,
            actor: actor.to_string(),
        }
    }

    /// See [`complete_current_step`].
    ///
    /// # Errors
    ///
    /// Propagates every engine and storage error; nothing is persisted on error.
    pub fn complete(
        &mut self,
        issue_id: &str,
        acting_agent_id: Option<&str>,
        notes: Option<&str>,
    ) -> Result<CompletionResult> {
        self.store
            .transact("complete_current_step", &self.actor, |store, ctx| {
                complete_current_step(store, ctx, issue_id, acting_agent_id, notes)
            })
    }

    /// See [`reject_current_step`].
    ///
    /// # Errors
    ///
    /// Propagates every engine and storage error; nothing is persisted on error.
    pub fn reject(
        &mut self,
        issue_id: &str,
        acting_agent_id: Option<&str>,
        reason: &str,
    ) -> Result<RejectionResult> {
        self.store
            .transact("reject_current_step", &self.actor, |store, ctx| {
                reject_current_step(store, ctx, issue_id, acting_agent_id, reason)
            })
    }

    /// See [`build_status`].
    ///
    /// # Errors
    ///
    /// `IssueNotFound` for an unknown issue; storage errors otherwise.
    pub fn status(&self, issue_id: &str) -> Result<PipelineStatusView> {
        self.store.read(|store| build_status(store, issue_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{PipelinePosition, Project, StepResult, StepType, WorkStatus};
    use crate::storage::{NewStep, SqliteStorage};

    struct Fixture {
        storage: SqliteStorage,
        issue_id: String,
        steps: Vec<PipelineStep>,
    }

    impl Fixture {
        fn new(spec: &[(&str, StepType, bool)]) -> Self {
            let mut storage = SqliteStorage::open_memory().unwrap();
            let project = Project::new("Docs".to_string(), "ws_1".to_string());
            storage.create_project(&project, "tester").unwrap();
            let issue = storage
                .create_issue(&project.id, "Write guide", None, "tester")
                .unwrap();

            let steps = spec
                .iter()
                .map(|&(name, step_type, auto_advance)| {
                    storage
                        .add_step(
                            &NewStep {
                                project_id: &project.id,
                                name,
                                step_type,
                                assigned_agent_id: None,
                                auto_advance,
                                step_number: None,
                            },
                            "tester",
                        )
                        .unwrap()
                })
                .collect();

            Self {
                storage,
                issue_id: issue.id,
                steps,
            }
        }

        fn engine(&mut self) -> PipelineEngine<'_, SqliteStorage> {
            PipelineEngine::new(&mut self.storage, "tester")
        }

        fn complete(&mut self, notes: &str) -> Result<CompletionResult> {
            let id = self.issue_id.clone();
            self.engine().complete(&id, None, Some(notes))
        }

        fn reject(&mut self, reason: &str) -> Result<RejectionResult> {
            let id = self.issue_id.clone();
            self.engine().reject(&id, None, reason)
        }

        fn status(&mut self) -> PipelineStatusView {
            let id = self.issue_id.clone();
            self.engine().status(&id).unwrap()
        }

        fn step_id(&self, index: usize) -> String {
            self.steps[index].id.clone()
        }

        fn current(&mut self) -> Option<String> {
            self.status().current_step.map(|s| s.id)
        }
    }

    fn draft_edit_approval() -> Fixture {
        Fixture::new(&[
            ("Draft", StepType::AgentWork, true),
            ("Edit", StepType::AgentReview, true),
            ("Approval", StepType::HumanReview, false),
        ])
    }

    #[test]
    fn test_draft_edit_approval_scenario() {
        let mut f = draft_edit_approval();

        let r = f.complete("Draft done").unwrap();
        assert_eq!(r.completed_step_id, f.step_id(0));
        assert_eq!(r.current_pipeline_step_id, Some(f.step_id(1)));
        assert!(!r.parked_for_human_review);
        assert_eq!(f.status().issue.work_status, WorkStatus::InProgress);

        let r = f.complete("Edit done").unwrap();
        assert_eq!(r.current_pipeline_step_id, Some(f.step_id(2)));
        assert!(r.parked_for_human_review);
        assert_eq!(f.status().issue.work_status, WorkStatus::Review);

        let r = f.reject("needs rework").unwrap();
        assert_eq!(r.completed_step_id, f.step_id(2));
        assert_eq!(r.current_pipeline_step_id, f.step_id(1));

        let view = f.status();
        assert_eq!(view.issue.work_status, WorkStatus::InProgress);
        let results: Vec<StepResult> = view.history.iter().map(|h| h.result).collect();
        assert_eq!(
            results,
            vec![StepResult::Completed, StepResult::Completed, StepResult::Rejected]
        );
        assert_eq!(view.history[2].notes.as_deref(), Some("needs rework"));
    }

    #[test]
    fn test_monotonic_forward_progress() {
        let mut f = Fixture::new(&[
            ("A", StepType::AgentWork, true),
            ("B", StepType::AgentWork, true),
            ("C", StepType::AgentReview, true),
            ("D", StepType::AgentWork, true),
        ]);

        for i in 0..3 {
            let r = f.complete("ok").unwrap();
            assert_eq!(r.completed_step_id, f.step_id(i));
            assert_eq!(r.current_pipeline_step_id, Some(f.step_id(i + 1)));
        }

        let r = f.complete("last").unwrap();
        assert!(r.completed_pipeline);
        assert!(r.current_pipeline_step_id.is_none());

        let view = f.status();
        assert_eq!(view.position, PipelinePosition::Completed);
        assert!(view.pipeline_completed_at.is_some());
        assert_eq!(view.issue.work_status, WorkStatus::Done);
    }

    #[test]
    fn test_completed_pipeline_refuses_further_completion() {
        let mut f = Fixture::new(&[("Only", StepType::AgentWork, true)]);
        f.complete("done").unwrap();

        let err = f.complete("again").unwrap_err();
        assert!(matches!(err, Error::Conflict(_)));
        assert_eq!(f.status().history.len(), 1);
    }

    #[test]
    fn test_human_review_parks_regardless_of_auto_advance() {
        let mut f = Fixture::new(&[
            ("Work", StepType::AgentWork, true),
            ("Sign-off", StepType::HumanReview, true),
            ("Ship", StepType::AgentWork, true),
        ]);

        f.complete("work").unwrap();
        let r = f.complete("approved").unwrap();

        // Still on the gate
        assert_eq!(r.completed_step_id, f.step_id(1));
        assert_eq!(r.current_pipeline_step_id, Some(f.step_id(1)));
        assert!(r.parked_for_human_review);
        assert_eq!(f.status().issue.work_status, WorkStatus::Review);
    }

    #[test]
    fn test_non_auto_step_holds_without_touching_work_status() {
        let mut f = Fixture::new(&[
            ("Work", StepType::AgentWork, false),
            ("Review", StepType::AgentReview, true),
        ]);

        let r = f.complete("first pass").unwrap();
        assert_eq!(r.current_pipeline_step_id, Some(f.step_id(0)));
        assert!(!r.parked_for_human_review);
        assert_eq!(f.status().issue.work_status, WorkStatus::Todo);
    }

    #[test]
    fn test_recompleting_held_step_appends_history() {
        let mut f = Fixture::new(&[
            ("Approval", StepType::HumanReview, false),
            ("Ship", StepType::AgentWork, true),
        ]);

        f.complete("attempt 1").unwrap();
        let before = f.status();
        f.complete("attempt 2").unwrap();
        let after = f.status();

        // State is unchanged; each attempt is logged
        assert_eq!(before.current_step, after.current_step);
        assert_eq!(before.pipeline_started_at, after.pipeline_started_at);
        assert_eq!(after.history.len(), 2);
        assert!(after.history.iter().all(|h| h.step_id == f.step_id(0)));
    }

    #[test]
    fn test_rejection_skips_human_review_steps() {
        let mut f = Fixture::new(&[
            ("Draft", StepType::AgentWork, true),
            ("Legal", StepType::HumanReview, false),
            ("Copy", StepType::AgentWork, true),
            ("Final", StepType::AgentReview, true),
        ]);

        f.complete("draft").unwrap();
        // Legal holds; move the pointer past it by hand
        let store = f.storage.store();
        store::PipelineStateStore::update_state(
            &store,
            &f.issue_id,
            &f.steps[0].project_id,
            &crate::model::StateUpdate {
                current_step_id: Some(f.step_id(2)),
                started_at: None,
                completed_at: None,
            },
        )
        .unwrap();

        f.complete("copy").unwrap();
        assert_eq!(f.current(), Some(f.step_id(3)));

        let r = f.reject("tone").unwrap();
        assert_eq!(r.current_pipeline_step_id, f.step_id(2));

        let r = f.reject("structure").unwrap();
        assert_eq!(r.completed_step_id, f.step_id(2));
        assert_eq!(r.current_pipeline_step_id, f.step_id(0));
    }

    #[test]
    fn test_rejection_boundaries() {
        let mut f = Fixture::new(&[
            ("Gate", StepType::HumanReview, false),
            ("Draft", StepType::AgentWork, true),
            ("Review", StepType::AgentReview, true),
        ]);

        // Nothing to reject before the pipeline starts
        assert!(matches!(f.reject("early"), Err(Error::Validation(_))));

        // Sitting on the first step
        f.complete("gate").unwrap();
        assert_eq!(f.current(), Some(f.step_id(0)));
        assert!(matches!(f.reject("no"), Err(Error::Conflict(_))));

        // Only a human-review step lies behind Draft
        let store = f.storage.store();
        store::PipelineStateStore::update_state(
            &store,
            &f.issue_id,
            &f.steps[0].project_id,
            &crate::model::StateUpdate {
                current_step_id: Some(f.step_id(1)),
                started_at: None,
                completed_at: None,
            },
        )
        .unwrap();
        assert!(matches!(f.reject("no target"), Err(Error::Conflict(_))));

        // Failed rejections leave no trace
        assert_eq!(f.status().history.len(), 1);
    }

    #[test]
    fn test_blank_reason_is_validation() {
        let mut f = draft_edit_approval();
        f.complete("draft").unwrap();
        assert!(matches!(f.reject("   "), Err(Error::Validation(_))));
    }

    #[test]
    fn test_history_is_append_only_and_tracks_current_step() {
        let mut f = draft_edit_approval();
        let mut expected = Vec::new();

        for action in ["complete", "complete", "reject", "complete", "reject"] {
            let current = f.current().unwrap_or_else(|| f.step_id(0));
            let before = f.status().history;
            match action {
                "complete" => {
                    f.complete(action).unwrap();
                }
                _ => {
                    f.reject(action).unwrap();
                }
            }
            expected.push(current);

            let after = f.status().history;
            assert_eq!(&after[..before.len()], &before[..]);
        }

        let history = f.status().history;
        assert_eq!(history.len(), expected.len());
        let step_ids: Vec<String> = history.into_iter().map(|h| h.step_id).collect();
        assert_eq!(step_ids, expected);
    }

    #[test]
    fn test_status_read_is_idempotent() {
        let mut f = draft_edit_approval();
        f.complete("draft").unwrap();

        let first = f.status();
        let second = f.status();
        assert_eq!(first, second);
    }

    #[test]
    fn test_started_at_set_once() {
        let mut f = draft_edit_approval();
        f.complete("draft").unwrap();
        let started = f.status().pipeline_started_at;
        assert!(started.is_some());

        f.complete("edit").unwrap();
        f.reject("again").unwrap();
        assert_eq!(f.status().pipeline_started_at, started);
    }

    #[test]
    fn test_acting_agent_falls_back_to_step_assignee() {
        let mut f = draft_edit_approval();
        let draft = f.step_id(0);
        f.storage
            .restaff_step(&draft, Some("writer-bot"), "tester")
            .unwrap();

        let id = f.issue_id.clone();
        f.engine().complete(&id, Some("  "), None).unwrap();
        f.engine().complete(&id, Some("editor-7"), None).unwrap();

        let history = f.status().history;
        assert_eq!(history[0].agent_id.as_deref(), Some("writer-bot"));
        assert_eq!(history[1].agent_id.as_deref(), Some("editor-7"));
    }

    #[test]
    fn test_empty_catalog_is_validation() {
        let mut f = Fixture::new(&[]);
        assert!(matches!(f.complete("x"), Err(Error::Validation(_))));
    }

    #[test]
    fn test_unknown_issue_is_not_found() {
        let mut f = draft_edit_approval();
        let err = f.engine().complete("DOCS-99", None, None).unwrap_err();
        assert!(matches!(err, Error::IssueNotFound { .. }));
    }

    #[test]
    fn test_short_id_is_accepted() {
        let mut f = draft_edit_approval();
        let r = f.engine().complete("DOCS-1", None, None).unwrap();
        assert_eq!(r.issue_id, f.issue_id);
    }

    #[test]
    fn test_transitions_record_audit_events() {
        let mut f = Fixture::new(&[("Only", StepType::AgentWork, true)]);
        f.complete("done").unwrap();

        let events = f.storage.list_events("issue", &f.issue_id, None).unwrap();
        let kinds: Vec<EventType> = events.iter().map(|e| e.event_type).collect();
        assert!(kinds.contains(&EventType::PipelineStepCompleted));
        assert!(kinds.contains(&EventType::PipelineCompleted));
        assert!(kinds.contains(&EventType::IssueStatusChanged));

        let step_event = events
            .iter()
            .find(|e| e.event_type == EventType::PipelineStepCompleted)
            .unwrap();
        assert_eq!(step_event.comment.as_deref(), Some("done"));
        assert_eq!(step_event.old_value.as_deref(), Some(f.step_id(0).as_str()));
        assert_eq!(step_event.new_value, None);
    }

    #[test]
    fn test_rejection_event_carries_reason() {
        let mut f = draft_edit_approval();
        f.complete("draft").unwrap();
        f.reject("too thin").unwrap();

        let events = f.storage.list_events("issue", &f.issue_id, None).unwrap();
        let rejected = events
            .iter()
            .find(|e| e.event_type == EventType::PipelineStepRejected)
            .unwrap();
        assert_eq!(rejected.comment.as_deref(), Some("too thin"));
        assert_eq!(rejected.old_value.as_deref(), Some(f.step_id(1).as_str()));
        assert_eq!(rejected.new_value.as_deref(), Some(f.step_id(0).as_str()));
    }

    #[test]
    fn test_failed_write_rolls_back_history() {
        let mut f = draft_edit_approval();
        f.storage
            .conn()
            .execute_batch(
                "CREATE TRIGGER test_fail_state BEFORE INSERT ON issue_pipeline_state
                 BEGIN SELECT RAISE(ABORT, 'state write failed'); END;",
            )
            .unwrap();

        let err = f.complete("draft").unwrap_err();
        assert!(matches!(err, Error::Database(_)));

        let view = f.status();
        assert!(view.history.is_empty());
        assert_eq!(view.position, PipelinePosition::NotStarted);
        assert_eq!(view.issue.work_status, WorkStatus::Todo);
    }

    #[test]
    fn test_concurrent_completions_are_serialized() {
        const WORKERS: usize = 5;

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pipeline.db");

        let mut seed = SqliteStorage::open(&path).unwrap();
        let project = Project::new("Docs".to_string(), "ws_1".to_string());
        seed.create_project(&project, "seed").unwrap();
        let issue = seed.create_issue(&project.id, "Race", None, "seed").unwrap();
        let steps: Vec<String> = (0..WORKERS)
            .map(|i| {
                let name = format!("Step {i}");
                seed.add_step(
                    &NewStep {
                        project_id: &project.id,
                        name: &name,
                        step_type: StepType::AgentWork,
                        assigned_agent_id: None,
                        auto_advance: true,
                        step_number: None,
                    },
                    "seed",
                )
                .unwrap()
                .id
            })
            .collect();

        let connections: Vec<SqliteStorage> = (0..WORKERS)
            .map(|_| SqliteStorage::open_with_timeout(&path, Some(30_000)).unwrap())
            .collect();

        let handles: Vec<_> = connections
            .into_iter()
            .enumerate()
            .map(|(n, mut storage)| {
                let issue_id = issue.id.clone();
                std::thread::spawn(move || {
                    let agent = format!("worker-{n}");
                    PipelineEngine::new(&mut storage, &agent)
                        .complete(&issue_id, Some(&agent), None)
                        .unwrap()
                })
            })
            .collect();

        let mut completed: Vec<String> = handles
            .into_iter()
            .map(|h| h.join().unwrap().completed_step_id)
            .collect();
        completed.sort_by_key(|id| steps.iter().position(|s| s == id));
        assert_eq!(completed, steps);

        let view = build_status(&seed.store(), &issue.id).unwrap();
        let history: Vec<String> = view.history.into_iter().map(|h| h.step_id).collect();
        assert_eq!(history, steps);
        assert_eq!(view.position, PipelinePosition::Completed);
        assert_eq!(view.issue.work_status, WorkStatus::Done);
    }

    #[test]
    fn test_concurrent_complete_and_reject_are_serialized() {
        const WORKERS: usize = 8;
        const STEPS: usize = 4;

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pipeline.db");

        let mut seed = SqliteStorage::open(&path).unwrap();
        let project = Project::new("Docs".to_string(), "ws_1".to_string());
        seed.create_project(&project, "seed").unwrap();
        let issue = seed.create_issue(&project.id, "Race", None, "seed").unwrap();
        let steps: Vec<String> = (0..STEPS)
            .map(|i| {
                let name = format!("Step {i}");
                seed.add_step(
                    &NewStep {
                        project_id: &project.id,
                        name: &name,
                        step_type: StepType::AgentWork,
                        assigned_agent_id: None,
                        auto_advance: true,
                        step_number: None,
                    },
                    "seed",
                )
                .unwrap()
                .id
            })
            .collect();

        // Start on step 1 so the first reject has somewhere to go
        PipelineEngine::new(&mut seed, "seed")
            .complete(&issue.id, None, None)
            .unwrap();

        let connections: Vec<SqliteStorage> = (0..WORKERS)
            .map(|_| SqliteStorage::open_with_timeout(&path, Some(30_000)).unwrap())
            .collect();

        let handles: Vec<_> = connections
            .into_iter()
            .enumerate()
            .map(|(n, mut storage)| {
                let issue_id = issue.id.clone();
                std::thread::spawn(move || {
                    let agent = format!("worker-{n}");
                    let mut engine = PipelineEngine::new(&mut storage, &agent);
                    if n % 2 == 0 {
                        engine.complete(&issue_id, None, None).map(|_| ())
                    } else {
                        engine.reject(&issue_id, None, "rework").map(|_| ())
                    }
                })
            })
            .collect();

        let mut succeeded = 0;
        for handle in handles {
            match handle.join().unwrap() {
                Ok(()) => succeeded += 1,
                Err(e) => assert!(
                    matches!(e, Error::Conflict(_) | Error::Validation(_)),
                    "unexpected error: {e:?}"
                ),
            }
        }

        let view = build_status(&seed.store(), &issue.id).unwrap();
        assert_eq!(view.history.len(), succeeded + 1);

        // Replay: every entry names the step that was current when it committed
        let mut current = Some(0_usize);
        for entry in &view.history {
            let index = current.expect("no entries after the pipeline finished");
            assert_eq!(entry.step_id, steps[index]);
            current = match entry.result {
                StepResult::Completed if index + 1 < STEPS => Some(index + 1),
                StepResult::Completed => None,
                StepResult::Rejected => Some(index - 1),
            };
        }

        match current {
            Some(index) => {
                assert_eq!(view.current_step.map(|s| s.id), Some(steps[index].clone()));
            }
            None => assert_eq!(view.position, PipelinePosition::Completed),
        }
    }
}
