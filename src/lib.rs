//! pipectl - Issue pipeline progression engine
//!
//! This crate moves issues through a project's ordered review pipeline and
//! provides the `pipectl` CLI on top of it.
//!
//! # Architecture
//!
//! - [`engine`] - Complete/reject transitions and the status projection
//! - [`model`] - Data types (Project, Issue, PipelineStep, state, history)
//! - [`storage`] - SQLite database layer
//! - [`config`] - Path, workspace, and settings resolution
//! - [`cli`] - Command-line interface using clap
//! - [`validate`] - Input normalization with typo suggestions
//! - [`error`] - Error types and handling

#![forbid(unsafe_code)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod cli;
pub mod config;
pub mod engine;
pub mod error;
pub mod model;
pub mod storage;
pub mod validate;

pub use error::{Error, Result};
