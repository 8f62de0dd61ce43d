//! Pipeline step model.
//!
//! Steps are the ordered stages of a project's review workflow. A step is
//! immutable once created except for re-staffing (`assigned_agent_id`).

use serde::{Deserialize, Serialize};

/// The kind of work a step represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepType {
    AgentWork,
    AgentReview,
    HumanReview,
}

impl StepType {
    /// Get the string representation for storage.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::AgentWork => "agent_work",
            Self::AgentReview => "agent_review",
            Self::HumanReview => "human_review",
        }
    }

    /// Parse a canonical storage string. Synonyms are handled by
    /// [`crate::validate::normalize_step_type`].
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "agent_work" => Some(Self::AgentWork),
            "agent_review" => Some(Self::AgentReview),
            "human_review" => Some(Self::HumanReview),
            _ => None,
        }
    }

    /// Human review steps are gates: they always park the pipeline and are
    /// never a landing zone for rejections.
    #[must_use]
    pub const fn is_gate(&self) -> bool {
        matches!(self, Self::HumanReview)
    }
}

impl std::fmt::Display for StepType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A pipeline step belonging to a project.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineStep {
    /// Unique identifier (`step_` prefix)
    pub id: String,

    /// Owning project
    pub project_id: String,

    /// Position key; strictly increasing within a project
    pub step_number: i64,

    /// Display label (e.g. "Draft", "Approval")
    pub name: String,

    pub step_type: StepType,

    /// Default assignee, used when the caller does not name an acting agent
    pub assigned_agent_id: Option<String>,

    /// Whether completing this step moves straight on to the next one
    pub auto_advance: bool,

    /// Creation timestamp (Unix milliseconds)
    pub created_at: i64,

    /// Last update timestamp (Unix milliseconds)
    pub updated_at: i64,
}

impl PipelineStep {
    /// Create a new step with a generated ID.
    pub fn new(
        project_id: String,
        step_number: i64,
        name: String,
        step_type: StepType,
        auto_advance: bool,
    ) -> Self {
        let now = chrono::Utc::now().timestamp_millis();
        let id = format!("step_{}", &uuid::Uuid::new_v4().to_string()[..12]);

        Self {
            id,
            project_id,
            step_number,
            name,
            step_type,
            assigned_agent_id: None,
            auto_advance,
            created_at: now,
            updated_at: now,
        }
    }

    /// Set the default assignee.
    #[must_use]
    pub fn with_agent(mut self, agent_id: &str) -> Self {
        self.assigned_agent_id = Some(agent_id.to_string());
        self
    }

    /// Whether this step is a human-review gate.
    #[must_use]
    pub const fn is_human_review(&self) -> bool {
        self.step_type.is_gate()
    }
}
