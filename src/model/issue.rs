//! Issue model.
//!
//! Only the fields the pipeline needs are modelled here: ownership, a title
//! for summaries, and the coarse `work_status` dashboards read.

use serde::{Deserialize, Serialize};

/// Coarse, issue-level status.
///
/// The progression engine is the sole writer for pipeline-driven
/// transitions and only ever writes `InProgress`, `Review` or `Done`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkStatus {
    Todo,
    InProgress,
    Review,
    Done,
    Blocked,
}

impl WorkStatus {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Todo => "todo",
            Self::InProgress => "in_progress",
            Self::Review => "review",
            Self::Done => "done",
            Self::Blocked => "blocked",
        }
    }

    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "todo" => Some(Self::Todo),
            "in_progress" => Some(Self::InProgress),
            "review" => Some(Self::Review),
            "done" => Some(Self::Done),
            "blocked" => Some(Self::Blocked),
            _ => None,
        }
    }
}

impl Default for WorkStatus {
    fn default() -> Self {
        Self::Todo
    }
}

impl std::fmt::Display for WorkStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An issue record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Issue {
    /// Unique identifier (`issue_` prefix)
    pub id: String,

    /// Short ID for easy reference (e.g., "PIPE-3")
    pub short_id: Option<String>,

    pub project_id: String,
    pub title: String,
    pub description: Option<String>,
    pub work_status: WorkStatus,

    /// Creation timestamp (Unix milliseconds)
    pub created_at: i64,

    /// Last update timestamp (Unix milliseconds)
    pub updated_at: i64,
}

impl Issue {
    /// Create a new issue with default values.
    pub fn new(project_id: String, title: String) -> Self {
        let now = chrono::Utc::now().timestamp_millis();
        let id = format!("issue_{}", &uuid::Uuid::new_v4().to_string()[..12]);

        Self {
            id,
            short_id: None,
            project_id,
            title,
            description: None,
            work_status: WorkStatus::Todo,
            created_at: now,
            updated_at: now,
        }
    }

    #[must_use]
    pub fn with_description(mut self, description: &str) -> Self {
        self.description = Some(description.to_string());
        self
    }

    #[must_use]
    pub fn with_short_id(mut self, short_id: String) -> Self {
        self.short_id = Some(short_id);
        self
    }
}
