//! Run states, terminal failures, and the report a migration run returns.

use std::fmt;
use std::time::Duration;

use serde::Serialize;
use serde_json::{json, Value};
use thiserror::Error;
use uuid::Uuid;

use mend_core::logging::{
    BATCH_INDEX, CANDIDATE_COUNT, COLLECTION, DOCUMENT_ID, DURATION_MS, MALFORMED_COUNT,
    PLANNED_COUNT, RUN_ID, SCANNED_COUNT, SUCCESS, UPDATED_COUNT,
};
use mend_core::Error;

/// Position of a run in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "state", content = "batch_index", rename_all = "snake_case")]
pub enum RunState {
    NotStarted,
    Scanning,
    Computing,
    /// Committing the batch with this zero-based index.
    Committing(usize),
    Done,
    Failed,
}

impl RunState {
    /// Whether the run has finished, successfully or not.
    pub fn is_terminal(&self) -> bool {
        matches!(self, RunState::Done | RunState::Failed)
    }
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunState::NotStarted => write!(f, "not_started"),
            RunState::Scanning => write!(f, "scanning"),
            RunState::Computing => write!(f, "computing"),
            RunState::Committing(i) => write!(f, "committing({})", i),
            RunState::Done => write!(f, "done"),
            RunState::Failed => write!(f, "failed"),
        }
    }
}

/// Error category of a failed run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// The store could not be read, or the very first commit failed.
    SourceUnavailable,
    /// A candidate document carried a field of the wrong shape.
    MalformedDocument,
    /// A commit failed after earlier batches were committed.
    PartialCommit,
}

/// Why a run ended in [`RunState::Failed`].
#[derive(Debug, Error)]
pub enum RunFailure {
    #[error("scan failed after reading {read} documents: {source}")]
    Scan { read: usize, source: Error },

    #[error("document {document_id} is malformed: {source}")]
    MalformedDocument { document_id: String, source: Error },

    #[error("batch {batch_index} ({batch_size} documents) failed to commit: {source}")]
    Commit {
        batch_index: usize,
        batch_size: usize,
        /// Documents updated by the batches committed before this one.
        committed: usize,
        source: Error,
    },
}

impl RunFailure {
    pub fn kind(&self) -> FailureKind {
        match self {
            RunFailure::Scan { .. } => FailureKind::SourceUnavailable,
            RunFailure::MalformedDocument { .. } => FailureKind::MalformedDocument,
            RunFailure::Commit { committed: 0, .. } => FailureKind::SourceUnavailable,
            RunFailure::Commit { .. } => FailureKind::PartialCommit,
        }
    }

    /// Index of the batch whose commit failed.
    pub fn batch_index(&self) -> Option<usize> {
        match self {
            RunFailure::Commit { batch_index, .. } => Some(*batch_index),
            _ => None,
        }
    }

    /// Id of the document that triggered the failure, when known.
    pub fn document_id(&self) -> Option<&str> {
        match self {
            RunFailure::MalformedDocument { document_id, .. } => Some(document_id),
            RunFailure::Scan { source, .. } | RunFailure::Commit { source, .. } => {
                source.document_id()
            }
        }
    }

    /// The underlying error.
    pub fn error(&self) -> &Error {
        match self {
            RunFailure::Scan { source, .. }
            | RunFailure::MalformedDocument { source, .. }
            | RunFailure::Commit { source, .. } => source,
        }
    }
}

/// Outcome of one migration run.
///
/// Counts are explicit values so callers can assert on a run without
/// capturing its log output.
#[derive(Debug)]
pub struct MigrationReport {
    pub run_id: Uuid,
    pub collection: String,
    pub dry_run: bool,
    /// Terminal state: [`RunState::Done`] or [`RunState::Failed`].
    pub state: RunState,
    /// Documents read by the scan. Zero when the scan failed.
    pub scanned: usize,
    /// Documents the migration predicate selected.
    pub candidates: usize,
    /// Candidates skipped because they were malformed.
    pub malformed: usize,
    /// Non-empty patches handed to the batch accumulator.
    pub planned: usize,
    /// Documents whose patch was committed.
    pub updated: usize,
    pub batches_planned: usize,
    pub batches_committed: usize,
    pub elapsed: Duration,
    pub failure: Option<RunFailure>,
}

impl MigrationReport {
    pub(crate) fn new(run_id: Uuid, collection: &str, dry_run: bool) -> Self {
        Self {
            run_id,
            collection: collection.to_string(),
            dry_run,
            state: RunState::NotStarted,
            scanned: 0,
            candidates: 0,
            malformed: 0,
            planned: 0,
            updated: 0,
            batches_planned: 0,
            batches_committed: 0,
            elapsed: Duration::ZERO,
            failure: None,
        }
    }

    /// Whether the run reached [`RunState::Done`].
    pub fn is_success(&self) -> bool {
        self.state == RunState::Done
    }

    /// The final human-readable outcome line.
    pub fn summary_line(&self) -> String {
        if let Some(failure) = &self.failure {
            return format!(
                "migration failed: {} (updated {} of {} documents)",
                failure, self.updated, self.candidates
            );
        }
        if self.candidates == 0 {
            return format!("no {} needed migration", self.collection);
        }
        let skipped = match self.malformed {
            0 => String::new(),
            n => format!(" ({} malformed skipped)", n),
        };
        if self.dry_run {
            return format!(
                "dry run: {} of {} documents would be updated{}",
                self.planned, self.scanned, skipped
            );
        }
        format!(
            "updated {} of {} documents{}",
            self.updated, self.scanned, skipped
        )
    }

    /// Machine-readable form of the report.
    ///
    /// Keys shared with log events use the same names.
    pub fn to_json(&self) -> Value {
        json!({
            RUN_ID: self.run_id.to_string(),
            COLLECTION: self.collection,
            "dry_run": self.dry_run,
            "state": self.state,
            SUCCESS: self.is_success(),
            SCANNED_COUNT: self.scanned,
            CANDIDATE_COUNT: self.candidates,
            MALFORMED_COUNT: self.malformed,
            PLANNED_COUNT: self.planned,
            UPDATED_COUNT: self.updated,
            "batches_planned": self.batches_planned,
            "batches_committed": self.batches_committed,
            DURATION_MS: self.elapsed.as_millis() as u64,
            "failure": self.failure.as_ref().map(|f| json!({
                "kind": f.kind(),
                "message": f.to_string(),
                BATCH_INDEX: f.batch_index(),
                DOCUMENT_ID: f.document_id(),
            })),
            "summary": self.summary_line(),
        })
    }
}
