//! Error types for pipectl.
//!
//! Provides structured error handling with:
//! - A stable error kind taxonomy (`ErrorKind`) callers can map to 400/404/409
//! - Machine-readable error codes (`ErrorCode`)
//! - Category-based exit codes (2=db, 3=not_found, 4=validation, 5=conflict, etc.)
//! - Context-aware recovery hints
//! - Structured JSON output for piped / non-TTY consumers

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for pipectl operations.
pub type Result<T> = std::result::Result<T, Error>;

// ── Error Kind ────────────────────────────────────────────────

/// Coarse, stable classification of every failure.
///
/// The engine only guarantees that the kind is discriminable; presentation
/// (HTTP status, exit code, message) is up to the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Validation,
    Conflict,
    NotFound,
    Forbidden,
    NoWorkspace,
    Storage,
    Internal,
}

// ── Error Code ────────────────────────────────────────────────

/// Machine-readable error codes grouped by category.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    // Database (exit 2)
    NotInitialized,
    AlreadyInitialized,
    DatabaseError,

    // Not Found (exit 3)
    IssueNotFound,
    ProjectNotFound,
    StepNotFound,

    // Validation (exit 4)
    ValidationFailed,
    InvalidArgument,

    // Conflict (exit 5)
    PipelineConflict,

    // Scoping (exit 6)
    Forbidden,
    NoWorkspace,

    // Config (exit 7)
    ConfigError,

    // I/O (exit 8)
    IoError,
    JsonError,

    // Internal (exit 1)
    InternalError,
}

impl ErrorCode {
    /// Machine-readable SCREAMING_SNAKE code string.
    #[must_use]
    pub const fn as_str(&self) -> &str {
        match self {
            Self::NotInitialized => "NOT_INITIALIZED",
            Self::AlreadyInitialized => "ALREADY_INITIALIZED",
            Self::DatabaseError => "DATABASE_ERROR",
            Self::IssueNotFound => "ISSUE_NOT_FOUND",
            Self::ProjectNotFound => "PROJECT_NOT_FOUND",
            Self::StepNotFound => "STEP_NOT_FOUND",
            Self::ValidationFailed => "VALIDATION_FAILED",
            Self::InvalidArgument => "INVALID_ARGUMENT",
            Self::PipelineConflict => "PIPELINE_CONFLICT",
            Self::Forbidden => "FORBIDDEN",
            Self::NoWorkspace => "NO_WORKSPACE",
            Self::ConfigError => "CONFIG_ERROR",
            Self::IoError => "IO_ERROR",
            Self::JsonError => "JSON_ERROR",
            Self::InternalError => "INTERNAL_ERROR",
        }
    }

    /// Category-based exit code (1-8).
    #[must_use]
    pub const fn exit_code(&self) -> u8 {
        match self {
            Self::InternalError => 1,
            Self::NotInitialized | Self::AlreadyInitialized | Self::DatabaseError => 2,
            Self::IssueNotFound | Self::ProjectNotFound | Self::StepNotFound => 3,
            Self::ValidationFailed | Self::InvalidArgument => 4,
            Self::PipelineConflict => 5,
            Self::Forbidden | Self::NoWorkspace => 6,
            Self::ConfigError => 7,
            Self::IoError | Self::JsonError => 8,
        }
    }

    /// Whether an agent should retry with corrected input.
    ///
    /// Conflicts are retryable: the caller re-reads status and tries again.
    /// `DatabaseError` covers busy/locked writers.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::ValidationFailed
                | Self::InvalidArgument
                | Self::PipelineConflict
                | Self::DatabaseError
        )
    }
}

// ── Error Enum ────────────────────────────────────────────────

/// Errors that can occur in pipectl operations.
#[derive(Error, Debug)]
pub enum Error {
    #[error("Not initialized: run `pipectl init` first")]
    NotInitialized,

    #[error("Already initialized at {path}")]
    AlreadyInitialized { path: PathBuf },

    #[error("Issue not found: {id}")]
    IssueNotFound { id: String },

    #[error("Issue not found: {id} (did you mean: {}?)", similar.join(", "))]
    IssueNotFoundSimilar { id: String, similar: Vec<String> },

    #[error("Project not found: {id}")]
    ProjectNotFound { id: String },

    #[error("Pipeline step not found: {id}")]
    StepNotFound { id: String },

    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Pipeline conflict: {0}")]
    Conflict(String),

    #[error("Forbidden: {resource} belongs to workspace '{owner}', not '{workspace}'")]
    Forbidden {
        resource: String,
        owner: String,
        workspace: String,
    },

    #[error("No workspace selected")]
    NoWorkspace,

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Map this error to its structured `ErrorCode`.
    #[must_use]
    pub const fn error_code(&self) -> ErrorCode {
        match self {
            Self::NotInitialized => ErrorCode::NotInitialized,
            Self::AlreadyInitialized { .. } => ErrorCode::AlreadyInitialized,
            Self::Database(_) => ErrorCode::DatabaseError,
            Self::IssueNotFound { .. } | Self::IssueNotFoundSimilar { .. } => {
                ErrorCode::IssueNotFound
            }
            Self::ProjectNotFound { .. } => ErrorCode::ProjectNotFound,
            Self::StepNotFound { .. } => ErrorCode::StepNotFound,
            Self::Validation(_) => ErrorCode::ValidationFailed,
            Self::InvalidArgument(_) => ErrorCode::InvalidArgument,
            Self::Conflict(_) => ErrorCode::PipelineConflict,
            Self::Forbidden { .. } => ErrorCode::Forbidden,
            Self::NoWorkspace => ErrorCode::NoWorkspace,
            Self::Config(_) => ErrorCode::ConfigError,
            Self::Io(_) => ErrorCode::IoError,
            Self::Json(_) => ErrorCode::JsonError,
            Self::Other(_) => ErrorCode::InternalError,
        }
    }

    /// The stable kind of this error.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::Validation(_) | Self::InvalidArgument(_) => ErrorKind::Validation,
            Self::Conflict(_) => ErrorKind::Conflict,
            Self::IssueNotFound { .. }
            | Self::IssueNotFoundSimilar { .. }
            | Self::ProjectNotFound { .. }
            | Self::StepNotFound { .. } => ErrorKind::NotFound,
            Self::Forbidden { .. } => ErrorKind::Forbidden,
            Self::NoWorkspace => ErrorKind::NoWorkspace,
            Self::NotInitialized | Self::AlreadyInitialized { .. } | Self::Database(_) => {
                ErrorKind::Storage
            }
            Self::Io(_) | Self::Json(_) | Self::Config(_) | Self::Other(_) => {
                ErrorKind::Internal
            }
        }
    }

    /// Category-based exit code, delegating to the `ErrorCode`.
    #[must_use]
    pub const fn exit_code(&self) -> u8 {
        self.error_code().exit_code()
    }

    /// Context-aware recovery hint for agents and humans.
    ///
    /// Returns `None` if no actionable suggestion exists.
    #[must_use]
    pub fn hint(&self) -> Option<String> {
        match self {
            Self::NotInitialized => {
                Some("Run `pipectl init` to initialize the database".to_string())
            }

            Self::AlreadyInitialized { path } => Some(format!(
                "Database already exists at {}. Use `--force` to reinitialize.",
                path.display()
            )),

            Self::IssueNotFound { id } => Some(format!(
                "No issue with ID '{id}'. Use `pipectl issue list --project <project>` to see available issues."
            )),
            Self::IssueNotFoundSimilar { similar, .. } => {
                Some(format!("Did you mean: {}?", similar.join(", ")))
            }

            Self::ProjectNotFound { id } => Some(format!(
                "No project with ID '{id}'. Use `pipectl project list` to see available projects."
            )),

            Self::StepNotFound { id } => Some(format!(
                "No pipeline step with ID '{id}'. Use `pipectl step list --project <project>` to see the catalog."
            )),

            Self::Conflict(msg) => {
                if msg.contains("first step") || msg.contains("actionable") {
                    Some(
                        "Rejection needs an earlier non-human-review step to land on."
                            .to_string(),
                    )
                } else if msg.contains("catalog") {
                    Some(
                        "The step catalog changed under this issue. \
                         Inspect with `pipectl pipeline status <issue>` or reset it."
                            .to_string(),
                    )
                } else {
                    Some("Re-read `pipectl pipeline status <issue>` and retry.".to_string())
                }
            }

            Self::Validation(msg) => {
                if msg.contains("no pipeline steps") {
                    Some("Add steps first: pipectl step add <name> --project <project> --type agent_work".to_string())
                } else if msg.contains("no current step") {
                    Some("Advance the issue before rejecting it.".to_string())
                } else {
                    None
                }
            }

            Self::NoWorkspace => Some(
                "Pass --workspace, set PIPECTL_WORKSPACE, or set default_workspace in ~/.pipectl/config.json"
                    .to_string(),
            ),

            Self::Forbidden { owner, .. } => {
                Some(format!("Switch to workspace '{owner}' to act on this resource."))
            }

            Self::InvalidArgument(msg) => {
                if msg.contains("step type") {
                    Some(
                        "Valid step types: agent_work, agent_review, human_review. \
                         Synonyms: work→agent_work, review→agent_review, approval→human_review"
                            .to_string(),
                    )
                } else if msg.contains("gate status") {
                    Some("Valid gate statuses: succeeded, failed, bypassed".to_string())
                } else if msg.contains("work status") {
                    Some("Valid work statuses: todo, in_progress, review, done, blocked".to_string())
                } else {
                    None
                }
            }

            Self::Database(_) | Self::Io(_) | Self::Json(_) | Self::Config(_) | Self::Other(_) => {
                None
            }
        }
    }

    /// Structured JSON representation for machine consumption.
    #[must_use]
    pub fn to_structured_json(&self) -> serde_json::Value {
        let code = self.error_code();
        let mut obj = serde_json::json!({
            "error": {
                "code": code.as_str(),
                "message": self.to_string(),
                "retryable": code.is_retryable(),
                "exit_code": code.exit_code(),
            }
        });

        if let Some(hint) = self.hint() {
            obj["error"]["hint"] = serde_json::Value::String(hint);
        }

        obj
    }
}
