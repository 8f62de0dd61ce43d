//! Data models for pipectl.
//!
//! This module contains all domain models:
//! - Project (workspace-scoped owner of a step catalog)
//! - Issue (with its coarse work status)
//! - PipelineStep (one ordered stage of a project's review workflow)
//! - IssuePipelineState (per-issue cursor and gate snapshot)
//! - HistoryEntry (append-only transition ledger)

pub mod history;
pub mod issue;
pub mod project;
pub mod state;
pub mod step;

pub use history::{HistoryEntry, NewHistoryEntry, StepResult};
pub use issue::{Issue, WorkStatus};
pub use project::Project;
pub use state::{GateSnapshot, GateStatus, IssuePipelineState, PipelinePosition, StateUpdate};
pub use step::{PipelineStep, StepType};
