//! Pipeline history model.
//!
//! History entries are the system of record for audit and reporting. They are
//! written once by the progression engine and never modified.

use serde::{Deserialize, Serialize};

/// Outcome recorded for a transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StepResult {
    Completed,
    Rejected,
}

impl StepResult {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Completed => "completed",
            Self::Rejected => "rejected",
        }
    }

    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "completed" => Some(Self::Completed),
            "rejected" => Some(Self::Rejected),
            _ => None,
        }
    }
}

/// A persisted history entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryEntry {
    /// Insertion sequence (SQLite rowid); defines ordering.
    pub seq: i64,
    pub id: String,
    pub issue_id: String,
    /// The step that was current when the transition happened
    pub step_id: String,
    pub agent_id: Option<String>,
    pub started_at: i64,
    pub completed_at: i64,
    pub result: StepResult,
    pub notes: Option<String>,
}

/// A history entry ready to be appended.
///
/// Transitions are instantaneous, so `started_at` and `completed_at` are
/// both set from `at`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewHistoryEntry {
    pub id: String,
    pub issue_id: String,
    pub step_id: String,
    pub agent_id: Option<String>,
    pub at: i64,
    pub result: StepResult,
    pub notes: Option<String>,
}

impl NewHistoryEntry {
    pub fn new(issue_id: &str, step_id: &str, result: StepResult, at: i64) -> Self {
        Self {
            id: format!("hist_{}", &uuid::Uuid::new_v4().to_string()[..12]),
            issue_id: issue_id.to_string(),
            step_id: step_id.to_string(),
            agent_id: None,
            at,
            result,
            notes: None,
        }
    }

    #[must_use]
    pub fn with_agent(mut self, agent_id: Option<String>) -> Self {
        self.agent_id = agent_id;
        self
    }

    #[must_use]
    pub fn with_notes(mut self, notes: Option<String>) -> Self {
        self.notes = notes;
        self
    }
}
