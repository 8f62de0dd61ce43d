//! Per-issue pipeline state.
//!
//! One row per issue, created lazily on first mutation. The row is the
//! cursor the progression engine moves; it is never shared between issues.

use serde::{Deserialize, Serialize};

/// Outcome of the external context gate run at issue creation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GateStatus {
    Succeeded,
    Failed,
    Bypassed,
}

impl GateStatus {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Succeeded => "succeeded",
            Self::Failed => "failed",
            Self::Bypassed => "bypassed",
        }
    }

    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "succeeded" => Some(Self::Succeeded),
            "failed" => Some(Self::Failed),
            "bypassed" => Some(Self::Bypassed),
            _ => None,
        }
    }
}

/// Snapshot of the external gate signal, surfaced verbatim in status views.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GateSnapshot {
    pub status: Option<GateStatus>,
    pub error: Option<String>,
    pub checked_at: Option<i64>,
}

/// Where an issue sits in its pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "step_id", rename_all = "snake_case")]
pub enum PipelinePosition {
    /// No transition has happened yet.
    NotStarted,
    /// The pointer references a step.
    AtStep(String),
    /// The last step was completed.
    Completed,
}

/// Persisted pipeline state for one issue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IssuePipelineState {
    pub issue_id: String,
    pub project_id: String,

    /// `None` means "not started" or "completed"; see [`Self::position`].
    pub current_pipeline_step_id: Option<String>,

    /// Set by the first transition, never overwritten.
    pub pipeline_started_at: Option<i64>,

    /// Set exactly once, when the last step completes.
    pub pipeline_completed_at: Option<i64>,

    #[serde(default)]
    pub gate: GateSnapshot,

    pub updated_at: i64,
}

impl IssuePipelineState {
    /// A "not started" record. Does not imply step 0 has been entered.
    pub fn not_started(issue_id: &str, project_id: &str) -> Self {
        Self {
            issue_id: issue_id.to_string(),
            project_id: project_id.to_string(),
            current_pipeline_step_id: None,
            pipeline_started_at: None,
            pipeline_completed_at: None,
            gate: GateSnapshot::default(),
            updated_at: chrono::Utc::now().timestamp_millis(),
        }
    }

    /// Disambiguate the nullable pointer.
    #[must_use]
    pub fn position(&self) -> PipelinePosition {
        match (&self.current_pipeline_step_id, self.pipeline_completed_at) {
            (Some(step_id), _) => PipelinePosition::AtStep(step_id.clone()),
            (None, Some(_)) => PipelinePosition::Completed,
            (None, None) => PipelinePosition::NotStarted,
        }
    }
}

/// Fields the progression engine writes on every transition.
///
/// The gate snapshot is owned by the external gate and is not written here.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StateUpdate {
    pub current_step_id: Option<String>,
    pub started_at: Option<i64>,
    pub completed_at: Option<i64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_position_disambiguates_null_pointer() {
        let mut state = IssuePipelineState::not_started("issue_1", "proj_1");
        assert_eq!(state.position(), PipelinePosition::NotStarted);

        state.current_pipeline_step_id = Some("step_a".to_string());
        assert_eq!(state.position(), PipelinePosition::AtStep("step_a".to_string()));

        state.current_pipeline_step_id = None;
        state.pipeline_completed_at = Some(10);
        assert_eq!(state.position(), PipelinePosition::Completed);
    }

    #[test]
    fn test_gate_status_parsing() {
        assert_eq!(GateStatus::parse("bypassed"), Some(GateStatus::Bypassed));
        assert_eq!(GateStatus::parse("passed"), None);
    }
}
