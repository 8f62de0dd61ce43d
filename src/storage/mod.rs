//! SQLite storage layer for pipectl.
//!
//! This module provides the persistence layer using SQLite with:
//! - WAL mode for concurrent reads
//! - IMMEDIATE transactions so read-compute-write units are serialized
//! - Audit events for operator history
//!
//! # Submodules
//!
//! - [`events`] - Audit event storage
//! - [`migrations`] - Embedded, idempotent schema migrations
//! - [`schema`] - Database schema definitions
//! - [`sqlite`] - Main SQLite storage implementation

pub mod events;
pub mod migrations;
pub mod schema;
pub mod sqlite;

pub use sqlite::{ConnStore, MutationContext, NewStep, SqliteStorage, DEFAULT_BUSY_TIMEOUT_MS};
