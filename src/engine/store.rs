//! Collaborator contracts consumed by the progression engine.
//!
//! The engine never talks to SQLite directly. It reads the step catalog and
//! issue state and writes history, state, and work status through these
//! traits. Every call made during one Complete/Reject happens on the same
//! store handle, which the caller opens inside a single write transaction.

use crate::error::Result;
use crate::model::{
    HistoryEntry, Issue, IssuePipelineState, NewHistoryEntry, PipelineStep, StateUpdate,
    WorkStatus,
};
use crate::storage::MutationContext;

/// Read-only access to a project's ordered step catalog.
pub trait StepCatalog {
    /// Steps for `project_id`, sorted ascending by `step_number`.
    fn list_steps(&self, project_id: &str) -> Result<Vec<PipelineStep>>;
}

/// Issue lookup (full ID or short ID).
pub trait IssueDirectory {
    fn get_issue(&self, issue_id: &str) -> Result<Option<Issue>>;
}

/// Per-issue pipeline cursor.
pub trait PipelineStateStore {
    /// `None` means no row exists yet, which reads as "not started".
    fn get_state(&self, issue_id: &str) -> Result<Option<IssuePipelineState>>;

    /// Upsert the cursor fields. Implementations must keep an already-set
    /// `pipeline_started_at` and must not touch the gate snapshot.
    fn update_state(&self, issue_id: &str, project_id: &str, update: &StateUpdate) -> Result<()>;
}

/// Append-only transition ledger.
pub trait HistoryLog {
    fn append_history(&self, entry: &NewHistoryEntry) -> Result<HistoryEntry>;

    /// All entries for `issue_id` in insertion order.
    fn list_history(&self, issue_id: &str) -> Result<Vec<HistoryEntry>>;
}

/// Writer for the issue's coarse work status.
pub trait WorkStatusSink {
    fn set_work_status(&self, issue_id: &str, status: WorkStatus) -> Result<()>;
}

/// Everything the engine needs from persistence.
pub trait PipelineStore:
    StepCatalog + IssueDirectory + PipelineStateStore + HistoryLog + WorkStatusSink
{
}

impl<T> PipelineStore for T where
    T: StepCatalog + IssueDirectory + PipelineStateStore + HistoryLog + WorkStatusSink
{
}

/// A store that can run a closure as one atomic, serialized write unit.
///
/// Every read and write `f` makes goes through the same handle; an error
/// from `f` discards all of them.
pub trait TransactionalStore {
    /// Run `f` inside a write transaction.
    fn transact<R, F>(&mut self, op: &str, actor: &str, f: F) -> Result<R>
    where
        F: FnOnce(&dyn PipelineStore, &mut MutationContext) -> Result<R>;

    /// Run `f` against a read-only view.
    fn read<R, F>(&self, f: F) -> Result<R>
    where
        F: FnOnce(&dyn PipelineStore) -> Result<R>;
}
