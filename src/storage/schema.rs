//! Database schema definitions.
//!
//! This module contains the complete SQLite schema for pipectl: the
//! project/issue records the pipeline hangs off, the step catalog, the
//! per-issue pipeline state, the append-only history ledger, and audit events.

use rusqlite::{Connection, Result};

/// Current schema version for migration tracking.
pub const CURRENT_SCHEMA_VERSION: i32 = 1;

/// The complete SQL schema for the pipectl database.
///
/// Timestamps are stored as INTEGER (Unix milliseconds).
pub const SCHEMA_SQL: &str = r#"
-- ====================
-- Schema Version Tracking
-- ====================

CREATE TABLE IF NOT EXISTS schema_migrations (
    version TEXT PRIMARY KEY,
    applied_at INTEGER NOT NULL
);

-- ====================
-- Core Tables
-- ====================

-- Projects: workspace-scoped owners of a step catalog
CREATE TABLE IF NOT EXISTS projects (
    id TEXT PRIMARY KEY,
    name TEXT NOT NULL,
    workspace_id TEXT NOT NULL,
    description TEXT,
    issue_prefix TEXT,
    next_issue_number INTEGER DEFAULT 1,
    created_at INTEGER NOT NULL,
    updated_at INTEGER NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_projects_workspace ON projects(workspace_id);
-- Prefixes are global so a short ID names exactly one issue
CREATE UNIQUE INDEX IF NOT EXISTS idx_projects_issue_prefix ON projects(issue_prefix);

-- Issues: only the fields the pipeline reads or writes
CREATE TABLE IF NOT EXISTS issues (
    id TEXT PRIMARY KEY,
    short_id TEXT,
    project_id TEXT NOT NULL,
    title TEXT NOT NULL,
    description TEXT,
    work_status TEXT NOT NULL DEFAULT 'todo',
    created_at INTEGER NOT NULL,
    updated_at INTEGER NOT NULL,
    FOREIGN KEY (project_id) REFERENCES projects(id) ON DELETE CASCADE,
    CHECK (work_status IN ('todo', 'in_progress', 'review', 'done', 'blocked'))
);

CREATE INDEX IF NOT EXISTS idx_issues_project ON issues(project_id);
CREATE INDEX IF NOT EXISTS idx_issues_work_status ON issues(work_status);
CREATE UNIQUE INDEX IF NOT EXISTS idx_issues_short_id ON issues(short_id);

-- Pipeline Steps: ordered step catalog per project
CREATE TABLE IF NOT EXISTS pipeline_steps (
    id TEXT PRIMARY KEY,
    project_id TEXT NOT NULL,
    step_number INTEGER NOT NULL,
    name TEXT NOT NULL,
    step_type TEXT NOT NULL,
    assigned_agent_id TEXT,
    auto_advance INTEGER NOT NULL DEFAULT 0,
    created_at INTEGER NOT NULL,
    updated_at INTEGER NOT NULL,
    FOREIGN KEY (project_id) REFERENCES projects(id) ON DELETE CASCADE,
    UNIQUE(project_id, step_number),
    CHECK (step_number > 0),
    CHECK (step_type IN ('agent_work', 'agent_review', 'human_review'))
);

CREATE INDEX IF NOT EXISTS idx_pipeline_steps_project ON pipeline_steps(project_id, step_number);

-- Issue Pipeline State: one row per issue, created lazily
CREATE TABLE IF NOT EXISTS issue_pipeline_state (
    issue_id TEXT PRIMARY KEY,
    project_id TEXT NOT NULL,
    current_pipeline_step_id TEXT,
    pipeline_started_at INTEGER,
    pipeline_completed_at INTEGER,
    gate_status TEXT,
    gate_error TEXT,
    gate_checked_at INTEGER,
    updated_at INTEGER NOT NULL,
    FOREIGN KEY (issue_id) REFERENCES issues(id) ON DELETE CASCADE,
    CHECK (gate_status IS NULL OR gate_status IN ('succeeded', 'failed', 'bypassed'))
);

-- Issue Pipeline History: append-only transition ledger
CREATE TABLE IF NOT EXISTS issue_pipeline_history (
    seq INTEGER PRIMARY KEY AUTOINCREMENT,
    id TEXT NOT NULL UNIQUE,
    issue_id TEXT NOT NULL,
    step_id TEXT NOT NULL,
    agent_id TEXT,
    started_at INTEGER NOT NULL,
    completed_at INTEGER NOT NULL,
    result TEXT NOT NULL,
    notes TEXT,
    FOREIGN KEY (issue_id) REFERENCES issues(id),
    CHECK (result IN ('completed', 'rejected'))
);

CREATE INDEX IF NOT EXISTS idx_pipeline_history_issue ON issue_pipeline_history(issue_id, seq);
CREATE INDEX IF NOT EXISTS idx_pipeline_history_step ON issue_pipeline_history(step_id);

-- History rows are immutable once written
CREATE TRIGGER IF NOT EXISTS trg_pipeline_history_no_update
BEFORE UPDATE ON issue_pipeline_history
BEGIN
    SELECT RAISE(ABORT, 'issue_pipeline_history is append-only');
END;

-- ====================
-- Audit
-- ====================

CREATE TABLE IF NOT EXISTS events (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    entity_type TEXT NOT NULL,
    entity_id TEXT NOT NULL,
    event_type TEXT NOT NULL,
    actor TEXT NOT NULL,
    old_value TEXT,
    new_value TEXT,
    comment TEXT,
    created_at INTEGER NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_events_entity ON events(entity_type, entity_id);
CREATE INDEX IF NOT EXISTS idx_events_created ON events(created_at DESC);
"#;

/// Apply the complete schema to the database.
///
/// Idempotent: every statement uses `IF NOT EXISTS`.
///
/// # Errors
///
/// Returns an error if any statement fails.
pub fn apply_schema(conn: &Connection) -> Result<()> {
    // Set pragmas before schema creation
    conn.pragma_update(None, "journal_mode", "WAL")?;
    conn.pragma_update(None, "foreign_keys", "ON")?;
    conn.pragma_update(None, "synchronous", "NORMAL")?;
    conn.pragma_update(None, "temp_store", "MEMORY")?;

    conn.execute_batch(SCHEMA_SQL)?;

    // Run migrations for existing databases
    super::migrations::run_migrations(conn)?;

    conn.execute(
        "INSERT OR IGNORE INTO schema_migrations (version, applied_at) VALUES (?1, ?2)",
        rusqlite::params![
            format!("v{CURRENT_SCHEMA_VERSION}"),
            chrono::Utc::now().timestamp_millis()
        ],
    )?;

    Ok(())
}
