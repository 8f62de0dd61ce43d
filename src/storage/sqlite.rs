//! SQLite storage implementation.
//!
//! This module provides the storage backend for pipectl using SQLite.
//! It follows the MutationContext pattern for transaction discipline and audit logging.

use crate::engine::store::{
    HistoryLog, IssueDirectory, PipelineStateStore, PipelineStore, StepCatalog,
    TransactionalStore, WorkStatusSink,
};
use crate::error::{Error, Result};
use crate::model::{
    GateSnapshot, GateStatus, HistoryEntry, Issue, IssuePipelineState, NewHistoryEntry,
    PipelineStep, Project, StateUpdate, StepResult, StepType, WorkStatus,
};
use crate::storage::events::{get_events, insert_event, Event, EventType};
use crate::storage::schema::apply_schema;
use rusqlite::{Connection, OptionalExtension, Transaction};
use std::path::Path;
use std::time::Duration;

/// Default busy timeout when none is configured.
pub const DEFAULT_BUSY_TIMEOUT_MS: u64 = 5000;

/// SQLite-based storage backend.
#[derive(Debug)]
pub struct SqliteStorage {
    conn: Connection,
}

/// Context for a mutation operation, tracking side effects.
///
/// Passed to mutation closures to record audit events, which are written
/// in the same transaction as the mutation itself.
pub struct MutationContext {
    /// Name of the operation being performed.
    pub op_name: String,
    /// Actor performing the operation (agent ID, user, etc.).
    pub actor: String,
    /// Events to write at the end of the transaction.
    pub events: Vec<Event>,
}

impl MutationContext {
    /// Create a new mutation context.
    #[must_use]
    pub fn new(op_name: &str, actor: &str) -> Self {
        Self {
            op_name: op_name.to_string(),
            actor: actor.to_string(),
            events: Vec::new(),
        }
    }

    /// Record an event for this operation.
    pub fn record_event(&mut self, entity_type: &str, entity_id: &str, event_type: EventType) {
        self.events
            .push(Event::new(entity_type, entity_id, event_type, &self.actor));
    }

    /// Record an event with old/new values for field tracking.
    pub fn record_change(
        &mut self,
        entity_type: &str,
        entity_id: &str,
        event_type: EventType,
        old_value: Option<String>,
        new_value: Option<String>,
    ) {
        self.events.push(
            Event::new(entity_type, entity_id, event_type, &self.actor)
                .with_values(old_value, new_value),
        );
    }

    /// Record a field change annotated with an optional free-text comment.
    pub fn record_note(
        &mut self,
        entity_type: &str,
        entity_id: &str,
        event_type: EventType,
        values: (Option<String>, Option<String>),
        comment: Option<&str>,
    ) {
        let mut event = Event::new(entity_type, entity_id, event_type, &self.actor)
            .with_values(values.0, values.1);
        if let Some(comment) = comment {
            event = event.with_comment(comment);
        }
        self.events.push(event);
    }
}

/// Input for adding a step to a catalog.
#[derive(Debug, Clone)]
pub struct NewStep<'a> {
    pub project_id: &'a str,
    pub name: &'a str,
    pub step_type: StepType,
    pub assigned_agent_id: Option<&'a str>,
    pub auto_advance: bool,
    /// Defaults to one past the current maximum.
    pub step_number: Option<i64>,
}

/// Collaborator-contract view over a connection or an open transaction.
///
/// Built from a `Transaction` inside [`SqliteStorage::mutate`] for writes, or
/// from the plain connection for reads.
#[derive(Clone, Copy)]
pub struct ConnStore<'c> {
    conn: &'c Connection,
}

impl<'c> ConnStore<'c> {
    #[must_use]
    pub fn new(conn: &'c Connection) -> Self {
        Self { conn }
    }
}

impl SqliteStorage {
    /// Open a database at the given path.
    ///
    /// Creates the database and applies schema if it doesn't exist.
    ///
    /// # Errors
    ///
    /// Returns an error if the connection cannot be established or schema fails.
    pub fn open(path: &Path) -> Result<Self> {
        Self::open_with_timeout(path, None)
    }

    /// Open a database with an optional busy timeout.
    ///
    /// The timeout is how long a writer waits for a competing write
    /// transaction before failing with `SQLITE_BUSY`.
    ///
    /// # Errors
    ///
    /// Returns an error if the connection cannot be established or schema fails.
    pub fn open_with_timeout(path: &Path, timeout_ms: Option<u64>) -> Result<Self> {
        let conn = Connection::open(path)?;
        conn.busy_timeout(Duration::from_millis(
            timeout_ms.unwrap_or(DEFAULT_BUSY_TIMEOUT_MS),
        ))?;

        apply_schema(&conn)?;
        Ok(Self { conn })
    }

    /// Open an in-memory database (for testing).
    ///
    /// # Errors
    ///
    /// Returns an error if the connection cannot be established.
    pub fn open_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        apply_schema(&conn)?;
        Ok(Self { conn })
    }

    /// Get a reference to the underlying connection (for read operations).
    #[must_use]
    pub fn conn(&self) -> &Connection {
        &self.conn
    }

    /// Read-only contract view over the connection.
    #[must_use]
    pub fn store(&self) -> ConnStore<'_> {
        ConnStore::new(&self.conn)
    }

    /// Execute a mutation with the transaction protocol.
    ///
    /// This method:
    /// 1. Begins an IMMEDIATE transaction (takes the write lock up front)
    /// 2. Executes the mutation closure
    /// 3. Writes audit events
    /// 4. Commits (or rolls back on error)
    ///
    /// Because the write lock is held before the closure's first read, a
    /// read-compute-write closure is serialized against every other writer
    /// on the same database file.
    ///
    /// # Errors
    ///
    /// Returns an error if any step fails. The transaction is rolled back on error.
    pub fn mutate<F, R>(&mut self, op: &str, actor: &str, f: F) -> Result<R>
    where
        F: FnOnce(&Transaction, &mut MutationContext) -> Result<R>,
    {
        let tx = self
            .conn
            .transaction_with_behavior(rusqlite::TransactionBehavior::Immediate)?;

        let mut ctx = MutationContext::new(op, actor);

        // Dropping `tx` on the error path rolls back
        let result = f(&tx, &mut ctx)?;

        for event in &ctx.events {
            insert_event(&tx, event)?;
        }

        tx.commit()?;

        Ok(result)
    }

    // ==================
    // Project Operations
    // ==================

    /// Create a new project.
    ///
    /// # Errors
    ///
    /// Returns `Validation` if another project already uses the issue
    /// prefix, or an error if the insert fails.
    pub fn create_project(&mut self, project: &Project, actor: &str) -> Result<()> {
        self.mutate("create_project", actor, |tx, ctx| {
            if let Some(ref prefix) = project.issue_prefix {
                if let Some(owner) = prefix_owner_on(tx, prefix)? {
                    return Err(Error::Validation(format!(
                        "issue prefix '{prefix}' is already used by project {owner}"
                    )));
                }
            }

            tx.execute(
                "INSERT INTO projects (id, name, workspace_id, description, issue_prefix, next_issue_number, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                rusqlite::params![
                    project.id,
                    project.name,
                    project.workspace_id,
                    project.description,
                    project.issue_prefix,
                    project.next_issue_number,
                    project.created_at,
                    project.updated_at,
                ],
            )?;

            ctx.record_event("project", &project.id, EventType::ProjectCreated);
            Ok(())
        })
    }

    /// Pick an unused issue prefix, appending a counter to `base` if needed.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn free_issue_prefix(&self, base: &str) -> Result<String> {
        if prefix_owner_on(&self.conn, base)?.is_none() {
            return Ok(base.to_string());
        }
        let mut n = 2_u32;
        loop {
            let candidate = format!("{base}{n}");
            if prefix_owner_on(&self.conn, &candidate)?.is_none() {
                return Ok(candidate);
            }
            n += 1;
        }
    }

    /// Get a project by ID.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn get_project(&self, id: &str) -> Result<Option<Project>> {
        get_project_on(&self.conn, id)
    }

    /// List projects, optionally restricted to one workspace.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn list_projects(&self, workspace_id: Option<&str>, limit: usize) -> Result<Vec<Project>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, name, workspace_id, description, issue_prefix, next_issue_number, created_at, updated_at
             FROM projects
             WHERE ?1 IS NULL OR workspace_id = ?1
             ORDER BY updated_at DESC
             LIMIT ?2",
        )?;

        let rows = stmt.query_map(
            rusqlite::params![workspace_id, i64::try_from(limit).unwrap_or(i64::MAX)],
            map_project_row,
        )?;

        rows.collect::<std::result::Result<Vec<_>, _>>()
            .map_err(Error::from)
    }

    // ================
    // Issue Operations
    // ================

    /// Create a new issue in a project, assigning the next short ID.
    ///
    /// # Errors
    ///
    /// Returns `ProjectNotFound` if the project does not exist, or an error
    /// if the insert fails.
    pub fn create_issue(
        &mut self,
        project_id: &str,
        title: &str,
        description: Option<&str>,
        actor: &str,
    ) -> Result<Issue> {
        self.mutate("create_issue", actor, |tx, ctx| {
            let project = get_project_on(tx, project_id)?.ok_or_else(|| Error::ProjectNotFound {
                id: project_id.to_string(),
            })?;

            let mut issue = Issue::new(project.id.clone(), title.to_string())
                .with_short_id(project.next_issue_short_id());
            if let Some(desc) = description {
                issue = issue.with_description(desc);
            }

            tx.execute(
                "INSERT INTO issues (id, short_id, project_id, title, description, work_status, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?7)",
                rusqlite::params![
                    issue.id,
                    issue.short_id,
                    issue.project_id,
                    issue.title,
                    issue.description,
                    issue.work_status.as_str(),
                    issue.created_at,
                ],
            )?;

            tx.execute(
                "UPDATE projects SET next_issue_number = next_issue_number + 1, updated_at = ?1 WHERE id = ?2",
                rusqlite::params![issue.created_at, project.id],
            )?;

            ctx.record_event("issue", &issue.id, EventType::IssueCreated);
            Ok(issue)
        })
    }

    /// Get an issue by ID (full ID or short ID).
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn get_issue(&self, id: &str) -> Result<Option<Issue>> {
        self.store().get_issue(id)
    }

    /// List issues in a project, oldest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn list_issues(
        &self,
        project_id: &str,
        work_status: Option<WorkStatus>,
        limit: Option<u32>,
    ) -> Result<Vec<Issue>> {
        let limit = limit.unwrap_or(50);
        let mut stmt = self.conn.prepare(
            "SELECT id, short_id, project_id, title, description, work_status, created_at, updated_at
             FROM issues
             WHERE project_id = ?1 AND (?2 IS NULL OR work_status = ?2)
             ORDER BY created_at ASC, rowid ASC
             LIMIT ?3",
        )?;

        let rows = stmt.query_map(
            rusqlite::params![project_id, work_status.map(|s| s.as_str()), limit],
            map_issue_row,
        )?;

        rows.collect::<std::result::Result<Vec<_>, _>>()
            .map_err(Error::from)
    }

    /// All issue short IDs (for "did you mean" suggestions).
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn get_all_issue_short_ids(&self) -> Result<Vec<String>> {
        let mut stmt = self
            .conn
            .prepare("SELECT short_id FROM issues WHERE short_id IS NOT NULL")?;
        let rows = stmt.query_map([], |row| row.get(0))?;
        rows.collect::<std::result::Result<Vec<_>, _>>()
            .map_err(Error::from)
    }

    // =======================
    // Step Catalog Operations
    // =======================

    /// Add a step to a project's catalog.
    ///
    /// # Errors
    ///
    /// - `ProjectNotFound` if the project does not exist
    /// - `Validation` for a non-positive or duplicate step number
    pub fn add_step(&mut self, new: &NewStep<'_>, actor: &str) -> Result<PipelineStep> {
        if new.name.trim().is_empty() {
            return Err(Error::Validation("step name must not be empty".to_string()));
        }

        self.mutate("add_step", actor, |tx, ctx| {
            if get_project_on(tx, new.project_id)?.is_none() {
                return Err(Error::ProjectNotFound {
                    id: new.project_id.to_string(),
                });
            }

            let step_number = match new.step_number {
                Some(n) => n,
                None => {
                    let max: Option<i64> = tx.query_row(
                        "SELECT MAX(step_number) FROM pipeline_steps WHERE project_id = ?1",
                        [new.project_id],
                        |row| row.get(0),
                    )?;
                    max.unwrap_or(0) + 1
                }
            };

            if step_number <= 0 {
                return Err(Error::Validation(format!(
                    "step number must be positive, got {step_number}"
                )));
            }

            let taken: bool = tx
                .prepare("SELECT 1 FROM pipeline_steps WHERE project_id = ?1 AND step_number = ?2")?
                .exists(rusqlite::params![new.project_id, step_number])?;
            if taken {
                return Err(Error::Validation(format!(
                    "step number {step_number} already exists in project {}",
                    new.project_id
                )));
            }

            let mut step = PipelineStep::new(
                new.project_id.to_string(),
                step_number,
                new.name.trim().to_string(),
                new.step_type,
                new.auto_advance,
            );
            if let Some(agent) = new.assigned_agent_id {
                step = step.with_agent(agent);
            }

            tx.execute(
                "INSERT INTO pipeline_steps (id, project_id, step_number, name, step_type, assigned_agent_id, auto_advance, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?8)",
                rusqlite::params![
                    step.id,
                    step.project_id,
                    step.step_number,
                    step.name,
                    step.step_type.as_str(),
                    step.assigned_agent_id,
                    step.auto_advance,
                    step.created_at,
                ],
            )?;

            ctx.record_change(
                "project",
                &step.project_id,
                EventType::StepAdded,
                None,
                Some(step.id.clone()),
            );
            Ok(step)
        })
    }

    /// Get a step by ID.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn get_step(&self, id: &str) -> Result<Option<PipelineStep>> {
        get_step_on(&self.conn, id)
    }

    /// The ordered catalog for a project.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn list_steps(&self, project_id: &str) -> Result<Vec<PipelineStep>> {
        self.store().list_steps(project_id)
    }

    /// Change a step's default assignee. The only mutation a step allows.
    ///
    /// # Errors
    ///
    /// Returns `StepNotFound` if the step does not exist.
    pub fn restaff_step(
        &mut self,
        step_id: &str,
        assigned_agent_id: Option<&str>,
        actor: &str,
    ) -> Result<PipelineStep> {
        let now = chrono::Utc::now().timestamp_millis();

        self.mutate("restaff_step", actor, |tx, ctx| {
            let mut step = get_step_on(tx, step_id)?.ok_or_else(|| Error::StepNotFound {
                id: step_id.to_string(),
            })?;

            tx.execute(
                "UPDATE pipeline_steps SET assigned_agent_id = ?1, updated_at = ?2 WHERE id = ?3",
                rusqlite::params![assigned_agent_id, now, step.id],
            )?;

            ctx.record_change(
                "step",
                &step.id,
                EventType::StepRestaffed,
                step.assigned_agent_id.clone(),
                assigned_agent_id.map(ToString::to_string),
            );

            step.assigned_agent_id = assigned_agent_id.map(ToString::to_string);
            step.updated_at = now;
            Ok(step)
        })
    }

    // ==========================
    // Pipeline State Operations
    // ==========================

    /// Current pipeline state for an issue, if a row exists.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn get_pipeline_state(&self, issue_id: &str) -> Result<Option<IssuePipelineState>> {
        self.store().get_state(issue_id)
    }

    /// History for an issue in insertion order.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn list_history(&self, issue_id: &str) -> Result<Vec<HistoryEntry>> {
        self.store().list_history(issue_id)
    }

    /// Record the external context gate outcome for an issue.
    ///
    /// Creates the state row if needed without starting the pipeline.
    ///
    /// # Errors
    ///
    /// Returns `IssueNotFound` if the issue does not exist.
    pub fn record_gate_signal(
        &mut self,
        issue_id: &str,
        status: GateStatus,
        error: Option<&str>,
        actor: &str,
    ) -> Result<IssuePipelineState> {
        let now = chrono::Utc::now().timestamp_millis();

        self.mutate("record_gate_signal", actor, |tx, ctx| {
            let store = ConnStore::new(tx);
            let issue = store.get_issue(issue_id)?.ok_or_else(|| Error::IssueNotFound {
                id: issue_id.to_string(),
            })?;

            tx.execute(
                "INSERT INTO issue_pipeline_state (issue_id, project_id, gate_status, gate_error, gate_checked_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?5)
                 ON CONFLICT(issue_id) DO UPDATE SET
                    gate_status = excluded.gate_status,
                    gate_error = excluded.gate_error,
                    gate_checked_at = excluded.gate_checked_at,
                    updated_at = excluded.updated_at",
                rusqlite::params![issue.id, issue.project_id, status.as_str(), error, now],
            )?;

            ctx.record_change(
                "issue",
                &issue.id,
                EventType::GateRecorded,
                None,
                Some(status.as_str().to_string()),
            );

            store.get_state(&issue.id)?.ok_or_else(|| {
                Error::Other(format!("pipeline state for {} vanished after write", issue.id))
            })
        })
    }

    /// Clear the pipeline cursor and timestamps. History and gate are kept.
    ///
    /// # Errors
    ///
    /// Returns `IssueNotFound` if the issue does not exist.
    pub fn reset_pipeline_state(&mut self, issue_id: &str, actor: &str) -> Result<()> {
        let now = chrono::Utc::now().timestamp_millis();

        self.mutate("reset_pipeline_state", actor, |tx, ctx| {
            let issue = ConnStore::new(tx)
                .get_issue(issue_id)?
                .ok_or_else(|| Error::IssueNotFound {
                    id: issue_id.to_string(),
                })?;

            tx.execute(
                "UPDATE issue_pipeline_state
                 SET current_pipeline_step_id = NULL, pipeline_started_at = NULL,
                     pipeline_completed_at = NULL, updated_at = ?1
                 WHERE issue_id = ?2",
                rusqlite::params![now, issue.id],
            )?;

            ctx.record_event("issue", &issue.id, EventType::PipelineReset);
            Ok(())
        })
    }

    /// Audit events for an entity, newest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn list_events(&self, entity_type: &str, entity_id: &str, limit: Option<u32>) -> Result<Vec<Event>> {
        get_events(&self.conn, entity_type, entity_id, limit).map_err(Error::from)
    }
}

// ==========================
// Collaborator Contracts
// ==========================

impl TransactionalStore for SqliteStorage {
    fn transact<R, F>(&mut self, op: &str, actor: &str, f: F) -> Result<R>
    where
        F: FnOnce(&dyn PipelineStore, &mut MutationContext) -> Result<R>,
    {
        self.mutate(op, actor, |tx, ctx| f(&ConnStore::new(tx), ctx))
    }

    fn read<R, F>(&self, f: F) -> Result<R>
    where
        F: FnOnce(&dyn PipelineStore) -> Result<R>,
    {
        f(&self.store())
    }
}

impl StepCatalog for ConnStore<'_> {
    fn list_steps(&self, project_id: &str) -> Result<Vec<PipelineStep>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, project_id, step_number, name, step_type, assigned_agent_id, auto_advance, created_at, updated_at
             FROM pipeline_steps WHERE project_id = ?1
             ORDER BY step_number ASC",
        )?;

        let rows = stmt.query_map([project_id], map_step_row)?;
        rows.collect::<std::result::Result<Vec<_>, _>>()
            .map_err(Error::from)
    }
}

impl IssueDirectory for ConnStore<'_> {
    fn get_issue(&self, issue_id: &str) -> Result<Option<Issue>> {
        // Full ID first, then short ID
        let by_id = self
            .conn
            .query_row(
                "SELECT id, short_id, project_id, title, description, work_status, created_at, updated_at
                 FROM issues WHERE id = ?1",
                [issue_id],
                map_issue_row,
            )
            .optional()?;
        if by_id.is_some() {
            return Ok(by_id);
        }

        let mut stmt = self.conn.prepare(
            "SELECT id, short_id, project_id, title, description, work_status, created_at, updated_at
             FROM issues WHERE short_id = ?1
             LIMIT 2",
        )?;
        let mut matches = stmt
            .query_map([issue_id], map_issue_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        if matches.len() > 1 {
            return Err(Error::Validation(format!(
                "short ID {issue_id} matches more than one issue; use the full issue ID"
            )));
        }
        Ok(matches.pop())
    }
}

impl PipelineStateStore for ConnStore<'_> {
    fn get_state(&self, issue_id: &str) -> Result<Option<IssuePipelineState>> {
        let mut stmt = self.conn.prepare(
            "SELECT issue_id, project_id, current_pipeline_step_id, pipeline_started_at, pipeline_completed_at,
                    gate_status, gate_error, gate_checked_at, updated_at
             FROM issue_pipeline_state WHERE issue_id = ?1",
        )?;

        stmt.query_row([issue_id], map_state_row)
            .optional()
            .map_err(Error::from)
    }

    fn update_state(&self, issue_id: &str, project_id: &str, update: &StateUpdate) -> Result<()> {
        let now = chrono::Utc::now().timestamp_millis();

        // started_at and completed_at are write-once: keep whatever is stored
        self.conn.execute(
            "INSERT INTO issue_pipeline_state (issue_id, project_id, current_pipeline_step_id, pipeline_started_at, pipeline_completed_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)
             ON CONFLICT(issue_id) DO UPDATE SET
                current_pipeline_step_id = excluded.current_pipeline_step_id,
                pipeline_started_at = COALESCE(issue_pipeline_state.pipeline_started_at, excluded.pipeline_started_at),
                pipeline_completed_at = COALESCE(issue_pipeline_state.pipeline_completed_at, excluded.pipeline_completed_at),
                updated_at = excluded.updated_at",
            rusqlite::params![
                issue_id,
                project_id,
                update.current_step_id,
                update.started_at,
                update.completed_at,
                now,
            ],
        )?;

        Ok(())
    }
}

impl HistoryLog for ConnStore<'_> {
    fn append_history(&self, entry: &NewHistoryEntry) -> Result<HistoryEntry> {
        self.conn.execute(
            "INSERT INTO issue_pipeline_history (id, issue_id, step_id, agent_id, started_at, completed_at, result, notes)
             VALUES (?1, ?2, ?3, ?4, ?5, ?5, ?6, ?7)",
            rusqlite::params![
                entry.id,
                entry.issue_id,
                entry.step_id,
                entry.agent_id,
                entry.at,
                entry.result.as_str(),
                entry.notes,
            ],
        )?;

        Ok(HistoryEntry {
            seq: self.conn.last_insert_rowid(),
            id: entry.id.clone(),
            issue_id: entry.issue_id.clone(),
            step_id: entry.step_id.clone(),
            agent_id: entry.agent_id.clone(),
            started_at: entry.at,
            completed_at: entry.at,
            result: entry.result,
            notes: entry.notes.clone(),
        })
    }

    fn list_history(&self, issue_id: &str) -> Result<Vec<HistoryEntry>> {
        let mut stmt = self.conn.prepare(
            "SELECT seq, id, issue_id, step_id, agent_id, started_at, completed_at, result, notes
             FROM issue_pipeline_history WHERE issue_id = ?1
             ORDER BY seq ASC",
        )?;

        let rows = stmt.query_map([issue_id], map_history_row)?;
        rows.collect::<std::result::Result<Vec<_>, _>>()
            .map_err(Error::from)
    }
}

impl WorkStatusSink for ConnStore<'_> {
    fn set_work_status(&self, issue_id: &str, status: WorkStatus) -> Result<()> {
        let rows = self.conn.execute(
            "UPDATE issues SET work_status = ?1, updated_at = ?2 WHERE id = ?3",
            rusqlite::params![status.as_str(), chrono::Utc::now().timestamp_millis(), issue_id],
        )?;

        if rows == 0 {
            return Err(Error::IssueNotFound {
                id: issue_id.to_string(),
            });
        }
        Ok(())
    }
}

// ==================
// Row Mapping
// ==================

fn get_project_on(conn: &Connection, id: &str) -> Result<Option<Project>> {
    conn.prepare(
        "SELECT id, name, workspace_id, description, issue_prefix, next_issue_number, created_at, updated_at
         FROM projects WHERE id = ?1",
    )?
    .query_row([id], map_project_row)
    .optional()
    .map_err(Error::from)
}

fn prefix_owner_on(conn: &Connection, prefix: &str) -> Result<Option<String>> {
    conn.query_row(
        "SELECT id FROM projects WHERE issue_prefix = ?1",
        [prefix],
        |row| row.get(0),
    )
    .optional()
    .map_err(Error::from)
}

fn get_step_on(conn: &Connection, id: &str) -> Result<Option<PipelineStep>> {
    conn.prepare(
        "SELECT id, project_id, step_number, name, step_type, assigned_agent_id, auto_advance, created_at, updated_at
         FROM pipeline_steps WHERE id = ?1",
    )?
    .query_row([id], map_step_row)
    .optional()
    .map_err(Error::from)
}

/// Parse a TEXT column into a closed enum, failing the row on unknown values.
fn parse_enum<T>(
    row: &rusqlite::Row<'_>,
    idx: usize,
    parse: impl Fn(&str) -> Option<T>,
) -> rusqlite::Result<T> {
    let raw: String = row.get(idx)?;
    parse(&raw).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            idx,
            rusqlite::types::Type::Text,
            format!("unknown value '{raw}'").into(),
        )
    })
}

fn map_project_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Project> {
    Ok(Project {
        id: row.get(0)?,
        name: row.get(1)?,
        workspace_id: row.get(2)?,
        description: row.get(3)?,
        issue_prefix: row.get(4)?,
        next_issue_number: row.get(5)?,
        created_at: row.get(6)?,
        updated_at: row.get(7)?,
    })
}

fn map_issue_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Issue> {
    Ok(Issue {
        id: row.get(0)?,
        short_id: row.get(1)?,
        project_id: row.get(2)?,
        title: row.get(3)?,
        description: row.get(4)?,
        work_status: parse_enum(row, 5, WorkStatus::parse)?,
        created_at: row.get(6)?,
        updated_at: row.get(7)?,
    })
}

fn map_step_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<PipelineStep> {
    Ok(PipelineStep {
        id: row.get(0)?,
        project_id: row.get(1)?,
        step_number: row.get(2)?,
        name: row.get(3)?,
        step_type: parse_enum(row, 4, StepType::parse)?,
        assigned_agent_id: row.get(5)?,
        auto_advance: row.get(6)?,
        created_at: row.get(7)?,
        updated_at: row.get(8)?,
    })
}

fn map_state_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<IssuePipelineState> {
    let gate_status = match row.get::<_, Option<String>>(5)? {
        Some(_) => Some(parse_enum(row, 5, GateStatus::parse)?),
        None => None,
    };

    Ok(IssuePipelineState {
        issue_id: row.get(0)?,
        project_id: row.get(1)?,
        current_pipeline_step_id: row.get(2)?,
        pipeline_started_at: row.get(3)?,
        pipeline_completed_at: row.get(4)?,
        gate: GateSnapshot {
            status: gate_status,
            error: row.get(6)?,
            checked_at: row.get(7)?,
        },
        updated_at: row.get(8)?,
    })
}

fn map_history_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<HistoryEntry> {
    Ok(HistoryEntry {
        seq: row.get(0)?,
        id: row.get(1)?,
        issue_id: row.get(2)?,
        step_id: row.get(3)?,
        agent_id: row.get(4)?,
        started_at: row.get(5)?,
        completed_at: row.get(6)?,
        result: parse_enum(row, 7, StepResult::parse)?,
        notes: row.get(8)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn seeded() -> (SqliteStorage, Project, Issue) {
        let mut storage = SqliteStorage::open_memory().unwrap();
        let project = Project::new("Docs".to_string(), "ws_1".to_string());
        storage.create_project(&project, "actor").unwrap();
        let issue = storage
            .create_issue(&project.id, "Write guide", Some("the guide"), "actor")
            .unwrap();
        (storage, project, issue)
    }

    fn new_step<'a>(project_id: &'a str, name: &'a str) -> NewStep<'a> {
        NewStep {
            project_id,
            name,
            step_type: StepType::AgentWork,
            assigned_agent_id: None,
            auto_advance: true,
            step_number: None,
        }
    }

    #[test]
    fn test_open_memory() {
        assert!(SqliteStorage::open_memory().is_ok());
    }

    #[test]
    fn test_issue_crud() {
        let (storage, project, issue) = seeded();

        assert_eq!(issue.short_id.as_deref(), Some("DOCS-1"));
        assert_eq!(issue.work_status, WorkStatus::Todo);

        // By full ID and by short ID
        assert_eq!(storage.get_issue(&issue.id).unwrap().unwrap().title, "Write guide");
        assert_eq!(storage.get_issue("DOCS-1").unwrap().unwrap().id, issue.id);

        let issues = storage.list_issues(&project.id, None, None).unwrap();
        assert_eq!(issues.len(), 1);
        let todo = storage
            .list_issues(&project.id, Some(WorkStatus::Done), None)
            .unwrap();
        assert!(todo.is_empty());
    }

    #[test]
    fn test_same_prefix_projects_get_distinct_short_ids() {
        let (mut storage, _, first) = seeded();

        let base = Project::new("Docs Site".to_string(), "ws_1".to_string());
        let err = storage.create_project(&base, "actor").unwrap_err();
        assert!(matches!(err, Error::Validation(_)));

        let mut site = base;
        site.issue_prefix = Some(storage.free_issue_prefix("DOCS").unwrap());
        storage.create_project(&site, "actor").unwrap();
        assert_eq!(site.issue_prefix.as_deref(), Some("DOCS2"));

        let second = storage.create_issue(&site.id, "Landing page", None, "actor").unwrap();
        assert_eq!(second.short_id.as_deref(), Some("DOCS2-1"));
        assert_eq!(storage.get_issue("DOCS-1").unwrap().unwrap().id, first.id);
        assert_eq!(storage.get_issue("DOCS2-1").unwrap().unwrap().id, second.id);
    }

    #[test]
    fn test_prefix_is_unique_across_workspaces() {
        let (mut storage, _, _) = seeded();
        let other = Project::new("Docs".to_string(), "ws_2".to_string());
        assert!(matches!(
            storage.create_project(&other, "actor").unwrap_err(),
            Error::Validation(_)
        ));
    }

    #[test]
    fn test_ambiguous_short_id_is_rejected() {
        let (mut storage, _, first) = seeded();
        let mut other = Project::new("Other".to_string(), "ws_1".to_string());
        other.issue_prefix = Some("OTHR".to_string());
        storage.create_project(&other, "actor").unwrap();
        let second = storage.create_issue(&other.id, "Clash", None, "actor").unwrap();

        // Databases whose rows predate the global short-id index
        storage
            .conn()
            .execute_batch("DROP INDEX idx_issues_short_id;")
            .unwrap();
        storage
            .conn()
            .execute("UPDATE issues SET short_id = 'DOCS-1' WHERE id = ?1", [&second.id])
            .unwrap();

        let err = storage.get_issue("DOCS-1").unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
        // Full IDs stay unambiguous
        assert_eq!(storage.get_issue(&first.id).unwrap().unwrap().id, first.id);
    }

    #[test]
    fn test_create_issue_requires_project() {
        let mut storage = SqliteStorage::open_memory().unwrap();
        let err = storage.create_issue("proj_missing", "x", None, "actor").unwrap_err();
        assert!(matches!(err, Error::ProjectNotFound { .. }));
    }

    #[test]
    fn test_short_ids_increment() {
        let (mut storage, project, _) = seeded();
        let second = storage.create_issue(&project.id, "Second", None, "actor").unwrap();
        assert_eq!(second.short_id.as_deref(), Some("DOCS-2"));
    }

    #[test]
    fn test_step_catalog_ordering_and_numbering() {
        let (mut storage, project, _) = seeded();

        let mut late = new_step(&project.id, "Approval");
        late.step_number = Some(30);
        late.step_type = StepType::HumanReview;
        storage.add_step(&late, "actor").unwrap();

        let mut early = new_step(&project.id, "Draft");
        early.step_number = Some(10);
        storage.add_step(&early, "actor").unwrap();

        // Defaults to max + 1
        let appended = storage.add_step(&new_step(&project.id, "Polish"), "actor").unwrap();
        assert_eq!(appended.step_number, 31);

        let names: Vec<String> = storage
            .list_steps(&project.id)
            .unwrap()
            .into_iter()
            .map(|s| s.name)
            .collect();
        assert_eq!(names, vec!["Draft", "Approval", "Polish"]);
    }

    #[test]
    fn test_add_step_validation() {
        let (mut storage, project, _) = seeded();

        let mut zero = new_step(&project.id, "Zero");
        zero.step_number = Some(0);
        assert!(matches!(storage.add_step(&zero, "a"), Err(Error::Validation(_))));

        let mut one = new_step(&project.id, "One");
        one.step_number = Some(1);
        storage.add_step(&one, "a").unwrap();
        assert!(matches!(storage.add_step(&one, "a"), Err(Error::Validation(_))));

        assert!(matches!(
            storage.add_step(&new_step("proj_nope", "X"), "a"),
            Err(Error::ProjectNotFound { .. })
        ));
    }

    #[test]
    fn test_restaff_step() {
        let (mut storage, project, _) = seeded();
        let step = storage.add_step(&new_step(&project.id, "Draft"), "actor").unwrap();

        let updated = storage.restaff_step(&step.id, Some("writer-bot"), "actor").unwrap();
        assert_eq!(updated.assigned_agent_id.as_deref(), Some("writer-bot"));
        assert_eq!(
            storage.get_step(&step.id).unwrap().unwrap().assigned_agent_id.as_deref(),
            Some("writer-bot")
        );

        let events = storage.list_events("step", &step.id, None).unwrap();
        assert_eq!(events[0].event_type, EventType::StepRestaffed);
        assert_eq!(events[0].new_value.as_deref(), Some("writer-bot"));

        assert!(matches!(
            storage.restaff_step("step_nope", None, "actor"),
            Err(Error::StepNotFound { .. })
        ));
    }

    #[test]
    fn test_gate_signal_does_not_start_pipeline() {
        let (mut storage, _, issue) = seeded();

        let state = storage
            .record_gate_signal(&issue.id, GateStatus::Failed, Some("context missing"), "gate")
            .unwrap();

        assert_eq!(state.gate.status, Some(GateStatus::Failed));
        assert_eq!(state.gate.error.as_deref(), Some("context missing"));
        assert!(state.gate.checked_at.is_some());
        assert_eq!(state.position(), crate::model::PipelinePosition::NotStarted);
        assert!(state.pipeline_started_at.is_none());
    }

    #[test]
    fn test_update_state_keeps_write_once_timestamps() {
        let (storage, project, issue) = seeded();
        let store = storage.store();

        store
            .update_state(&issue.id, &project.id, &StateUpdate {
                current_step_id: Some("s1".to_string()),
                started_at: Some(100),
                completed_at: None,
            })
            .unwrap();
        store
            .update_state(&issue.id, &project.id, &StateUpdate {
                current_step_id: Some("s2".to_string()),
                started_at: Some(999),
                completed_at: None,
            })
            .unwrap();

        let state = store.get_state(&issue.id).unwrap().unwrap();
        assert_eq!(state.current_pipeline_step_id.as_deref(), Some("s2"));
        assert_eq!(state.pipeline_started_at, Some(100));
    }

    #[test]
    fn test_history_insertion_order() {
        let (storage, _, issue) = seeded();
        let store = storage.store();

        for (step, result) in [("s1", StepResult::Completed), ("s2", StepResult::Rejected)] {
            store
                .append_history(&NewHistoryEntry::new(&issue.id, step, result, 5))
                .unwrap();
        }

        let history = store.list_history(&issue.id).unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].step_id, "s1");
        assert_eq!(history[1].result, StepResult::Rejected);
        assert!(history[0].seq < history[1].seq);
        assert_eq!(history[0].started_at, history[0].completed_at);
    }

    #[test]
    fn test_set_work_status_unknown_issue() {
        let storage = SqliteStorage::open_memory().unwrap();
        let err = storage
            .store()
            .set_work_status("issue_nope", WorkStatus::Done)
            .unwrap_err();
        assert!(matches!(err, Error::IssueNotFound { .. }));
    }

    #[test]
    fn test_mutate_rolls_back_on_error() {
        let (mut storage, project, issue) = seeded();

        let result: Result<()> = storage.mutate("failing", "actor", |tx, _ctx| {
            ConnStore::new(tx).update_state(&issue.id, &project.id, &StateUpdate {
                current_step_id: Some("s1".to_string()),
                started_at: Some(1),
                completed_at: None,
            })?;
            Err(Error::Conflict("forced".to_string()))
        });

        assert!(result.is_err());
        assert!(storage.get_pipeline_state(&issue.id).unwrap().is_none());
    }
}
