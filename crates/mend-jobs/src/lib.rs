//! # mend-jobs
//!
//! Backfill runner for the mend document migration engine.
//!
//! This crate provides:
//! - A sequential, halt-on-first-failure batch commit loop
//! - Run reports with explicit counts and the triggering error
//! - Run events via a broadcast channel
//!
//! ## Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use mend_db::{Database, PoolConfig};
//! use mend_jobs::{MigrationRunner, RunnerConfig};
//!
//! let db = Database::connect_with_config("postgres://...", PoolConfig::from_env()).await?;
//! let runner = MigrationRunner::new(Arc::new(db.documents.clone()), RunnerConfig::from_env());
//!
//! let report = runner.run().await;
//! println!("{}", report.summary_line());
//! ```

pub mod report;
pub mod runner;

// Re-export core types
pub use mend_core::*;

pub use report::{FailureKind, MigrationReport, RunFailure, RunState};
pub use runner::{MalformedPolicy, MigrationEvent, MigrationRunner, RunnerConfig};
