//! Project model for pipectl.
//!
//! Projects own a pipeline step catalog and issue ID prefixes, and are
//! scoped to a workspace.

use serde::{Deserialize, Serialize};

/// A project in pipectl.
///
/// Projects provide:
/// - Issue ID prefixes (e.g., "PIPE" -> PIPE-1, PIPE-2)
/// - The ordered pipeline step catalog
/// - Workspace ownership for tenant scoping
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Project {
    /// Unique identifier (`proj_` prefix)
    pub id: String,

    /// Display name for the project
    pub name: String,

    /// Workspace this project belongs to
    pub workspace_id: String,

    /// Optional description
    pub description: Option<String>,

    /// Prefix for issue short IDs (e.g., "PIPE" creates PIPE-1, PIPE-2)
    pub issue_prefix: Option<String>,

    /// Next issue number to assign
    #[serde(default = "default_one")]
    pub next_issue_number: i32,

    /// Creation timestamp (Unix milliseconds)
    pub created_at: i64,

    /// Last update timestamp (Unix milliseconds)
    pub updated_at: i64,
}

fn default_one() -> i32 {
    1
}

impl Project {
    /// Create a new project with default values.
    pub fn new(name: String, workspace_id: String) -> Self {
        let now = chrono::Utc::now().timestamp_millis();
        let id = format!("proj_{}", &uuid::Uuid::new_v4().to_string()[..12]);

        let issue_prefix = default_issue_prefix(&name);

        Self {
            id,
            name,
            workspace_id,
            description: None,
            issue_prefix: Some(issue_prefix),
            next_issue_number: 1,
            created_at: now,
            updated_at: now,
        }
    }

    /// Set the project description.
    #[must_use]
    pub fn with_description(mut self, description: &str) -> Self {
        self.description = Some(description.to_string());
        self
    }

    /// Generate the next issue short ID.
    pub fn next_issue_short_id(&self) -> String {
        let prefix = self.issue_prefix.as_deref().unwrap_or(FALLBACK_PREFIX);
        format!("{}-{}", prefix, self.next_issue_number)
    }
}

const FALLBACK_PREFIX: &str = "PIPE";

/// First 4 ASCII alphanumerics of the name, uppercased, or `PIPE`.
fn default_issue_prefix(name: &str) -> String {
    let prefix: String = name
        .chars()
        .filter(char::is_ascii_alphanumeric)
        .take(4)
        .collect::<String>()
        .to_ascii_uppercase();

    if prefix.is_empty() {
        FALLBACK_PREFIX.to_string()
    } else {
        prefix
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_project() {
        let project = Project::new("Docs Site".to_string(), "ws_acme".to_string());

        assert!(project.id.starts_with("proj_"));
        assert_eq!(project.name, "Docs Site");
        assert_eq!(project.workspace_id, "ws_acme");
        assert_eq!(project.issue_prefix, Some("DOCS".to_string()));
        assert_eq!(project.next_issue_number, 1);
    }

    #[test]
    fn test_next_issue_short_id() {
        let mut project = Project::new("Test".to_string(), "ws".to_string());
        project.issue_prefix = Some("TEST".to_string());
        project.next_issue_number = 42;

        assert_eq!(project.next_issue_short_id(), "TEST-42");
    }

    #[test]
    fn test_prefix_ignores_non_ascii() {
        let project = Project::new("Über-Café 9".to_string(), "ws".to_string());
        assert_eq!(project.issue_prefix.as_deref(), Some("BERC"));
    }

    #[test]
    fn test_prefix_falls_back_without_alphanumerics() {
        let project = Project::new("→ ★".to_string(), "ws".to_string());
        assert_eq!(project.issue_prefix.as_deref(), Some("PIPE"));
        assert_eq!(project.next_issue_short_id(), "PIPE-1");
    }
}
