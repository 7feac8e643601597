//! Migration runner: scan, compute, accumulate, and commit one collection.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Instant;

use futures::StreamExt;
use tokio::sync::broadcast;
use tracing::{debug, error, info, trace, warn};
use uuid::Uuid;

use mend_core::{
    accumulate, compute_patch, defaults, needs_migration, Clock, Document, DocumentSource, Error,
    PatchEntry, SystemClock,
};

use crate::report::{MigrationReport, RunFailure, RunState};

/// What to do with a candidate document whose fields have the wrong shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MalformedPolicy {
    /// Fail the whole run so the data problem is visible.
    #[default]
    Abort,
    /// Log, tally, and continue with the remaining documents.
    Skip,
}

impl FromStr for MalformedPolicy {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "abort" => Ok(MalformedPolicy::Abort),
            "skip" => Ok(MalformedPolicy::Skip),
            other => Err(Error::Config(format!(
                "unknown malformed-document policy '{}' (expected 'abort' or 'skip')",
                other
            ))),
        }
    }
}

impl fmt::Display for MalformedPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MalformedPolicy::Abort => write!(f, "abort"),
            MalformedPolicy::Skip => write!(f, "skip"),
        }
    }
}

/// Configuration for a migration run.
#[derive(Debug, Clone)]
pub struct RunnerConfig {
    /// Collection to repair.
    pub collection: String,
    /// Maximum entries per atomic commit, within `1..=MAX_BATCH_SIZE`.
    pub batch_size: usize,
    /// Compute and report without committing.
    pub dry_run: bool,
    pub on_malformed: MalformedPolicy,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            collection: defaults::COLLECTION.to_string(),
            batch_size: defaults::MAX_BATCH_SIZE,
            dry_run: false,
            on_malformed: MalformedPolicy::Abort,
        }
    }
}

impl RunnerConfig {
    /// Create config from environment variables (with defaults).
    ///
    /// | Variable | Default | Description |
    /// |----------|---------|-------------|
    /// | `MIGRATION_COLLECTION` | `matches` | Collection to repair |
    /// | `MIGRATION_BATCH_SIZE` | `500` | Entries per commit (clamped to 1..=500) |
    /// | `MIGRATION_DRY_RUN` | `false` | Compute and report only |
    /// | `MIGRATION_ON_MALFORMED` | `abort` | `abort` or `skip` |
    pub fn from_env() -> Self {
        let base = Self::default();

        let collection = std::env::var("MIGRATION_COLLECTION")
            .ok()
            .filter(|v| !v.trim().is_empty())
            .unwrap_or(base.collection);

        let batch_size = std::env::var("MIGRATION_BATCH_SIZE")
            .ok()
            .and_then(|v| v.parse::<usize>().ok())
            .unwrap_or(base.batch_size);

        let dry_run = std::env::var("MIGRATION_DRY_RUN")
            .map(|v| v == "true" || v == "1")
            .unwrap_or(false);

        let on_malformed = match std::env::var("MIGRATION_ON_MALFORMED") {
            Ok(v) => v.parse().unwrap_or_else(|e| {
                warn!(error = %e, "Ignoring MIGRATION_ON_MALFORMED, using default");
                MalformedPolicy::default()
            }),
            Err(_) => MalformedPolicy::default(),
        };

        Self {
            collection,
            batch_size,
            dry_run,
            on_malformed,
        }
        .with_batch_size(batch_size)
    }

    /// Set the collection to repair.
    pub fn with_collection(mut self, collection: impl Into<String>) -> Self {
        self.collection = collection.into();
        self
    }

    /// Set the batch size, clamped to `1..=MAX_BATCH_SIZE`.
    pub fn with_batch_size(mut self, size: usize) -> Self {
        self.batch_size = size.clamp(1, defaults::MAX_BATCH_SIZE);
        self
    }

    /// Enable or disable dry-run mode.
    pub fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    /// Set the malformed-document policy.
    pub fn with_malformed_policy(mut self, policy: MalformedPolicy) -> Self {
        self.on_malformed = policy;
        self
    }
}

/// Event emitted while a run progresses.
#[derive(Debug, Clone)]
pub enum MigrationEvent {
    /// The scan finished reading the collection.
    ScanCompleted { run_id: Uuid, scanned: usize },
    /// Patches were computed and grouped into batches.
    PatchesComputed {
        run_id: Uuid,
        candidates: usize,
        planned: usize,
        batches: usize,
    },
    /// A batch was committed.
    BatchCommitted {
        run_id: Uuid,
        batch_index: usize,
        batch_size: usize,
    },
    /// A batch failed to commit; the run stops here.
    BatchFailed {
        run_id: Uuid,
        batch_index: usize,
        error: String,
    },
    /// The run reached a terminal state.
    RunFinished {
        run_id: Uuid,
        state: RunState,
        updated: usize,
    },
}

/// Runs the backfill over one collection of a [`DocumentSource`].
///
/// A run scans the whole collection, computes patches for the documents
/// the migration predicate selects, groups them into batches, and commits
/// the batches one after another. The first failed commit stops the run;
/// batches committed before it stay committed.
pub struct MigrationRunner {
    source: Arc<dyn DocumentSource>,
    config: RunnerConfig,
    clock: Arc<dyn Clock>,
    event_tx: broadcast::Sender<MigrationEvent>,
}

impl MigrationRunner {
    /// Create a runner using the wall clock.
    pub fn new(source: Arc<dyn DocumentSource>, config: RunnerConfig) -> Self {
        let (event_tx, _) = broadcast::channel(defaults::EVENT_BUS_CAPACITY);
        Self {
            source,
            config,
            clock: Arc::new(SystemClock),
            event_tx,
        }
    }

    /// Replace the clock used for defaulted timestamps.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn config(&self) -> &RunnerConfig {
        &self.config
    }

    /// Get a receiver for run events.
    pub fn events(&self) -> broadcast::Receiver<MigrationEvent> {
        self.event_tx.subscribe()
    }

    fn emit(&self, event: MigrationEvent) {
        // No subscribers is fine.
        let _ = self.event_tx.send(event);
    }

    fn advance(&self, state: &mut RunState, next: RunState, run_id: Uuid) {
        debug!(
            subsystem = "jobs",
            component = "runner",
            %run_id,
            from = %state,
            to = %next,
            "Run state transition"
        );
        *state = next;
    }

    /// Execute one run to completion and report its outcome.
    pub async fn run(&self) -> MigrationReport {
        let run_id = Uuid::now_v7();
        let start = Instant::now();
        let collection = self.config.collection.as_str();
        let mut report = MigrationReport::new(run_id, collection, self.config.dry_run);
        let mut state = RunState::NotStarted;

        info!(
            subsystem = "jobs",
            component = "runner",
            op = "start",
            %run_id,
            collection,
            batch_size = self.config.batch_size,
            dry_run = self.config.dry_run,
            on_malformed = %self.config.on_malformed,
            "Migration run started"
        );

        self.advance(&mut state, RunState::Scanning, run_id);
        let docs = match self.scan(run_id).await {
            Ok(docs) => docs,
            Err(failure) => return self.finish(report, &mut state, start, Some(failure)),
        };
        report.scanned = docs.len();
        info!(
            subsystem = "jobs",
            component = "runner",
            op = "scan",
            %run_id,
            collection,
            scanned = report.scanned,
            "Collection scanned"
        );
        self.emit(MigrationEvent::ScanCompleted {
            run_id,
            scanned: report.scanned,
        });

        self.advance(&mut state, RunState::Computing, run_id);
        let entries = match self.compute(run_id, &docs, &mut report) {
            Ok(entries) => entries,
            Err(failure) => return self.finish(report, &mut state, start, Some(failure)),
        };
        drop(docs);

        let batches = accumulate(entries, self.config.batch_size);
        report.planned = batches.iter().map(|b| b.len()).sum();
        report.batches_planned = batches.len();
        info!(
            subsystem = "jobs",
            component = "runner",
            op = "compute",
            %run_id,
            candidates = report.candidates,
            planned = report.planned,
            malformed = report.malformed,
            batch_count = report.batches_planned,
            "Patches computed"
        );
        self.emit(MigrationEvent::PatchesComputed {
            run_id,
            candidates: report.candidates,
            planned: report.planned,
            batches: report.batches_planned,
        });

        if self.config.dry_run {
            for batch in &batches {
                debug!(
                    %run_id,
                    batch_index = batch.index,
                    batch_size = batch.len(),
                    "Dry run, batch not committed"
                );
            }
            return self.finish(report, &mut state, start, None);
        }

        for batch in &batches {
            self.advance(&mut state, RunState::Committing(batch.index), run_id);
            let commit_start = Instant::now();

            match self.source.commit_batch(collection, batch).await {
                Ok(()) => {
                    report.updated += batch.len();
                    report.batches_committed += 1;
                    info!(
                        subsystem = "jobs",
                        component = "runner",
                        op = "commit",
                        %run_id,
                        batch_index = batch.index,
                        batch_size = batch.len(),
                        updated = report.updated,
                        duration_ms = commit_start.elapsed().as_millis() as u64,
                        "Batch committed ({}/{})",
                        batch.index + 1,
                        report.batches_planned
                    );
                    self.emit(MigrationEvent::BatchCommitted {
                        run_id,
                        batch_index: batch.index,
                        batch_size: batch.len(),
                    });
                }
                Err(e) => {
                    self.emit(MigrationEvent::BatchFailed {
                        run_id,
                        batch_index: batch.index,
                        error: e.to_string(),
                    });
                    let failure = RunFailure::Commit {
                        batch_index: batch.index,
                        batch_size: batch.len(),
                        committed: report.updated,
                        source: e,
                    };
                    return self.finish(report, &mut state, start, Some(failure));
                }
            }
        }

        self.finish(report, &mut state, start, None)
    }

    /// Read the whole collection. Any failed read aborts the scan.
    async fn scan(&self, run_id: Uuid) -> Result<Vec<Document>, RunFailure> {
        let mut stream = self.source.scan_collection(&self.config.collection);
        let mut docs = Vec::new();

        while let Some(item) = stream.next().await {
            match item {
                Ok(doc) => docs.push(doc),
                Err(e) => {
                    trace!(%run_id, read = docs.len(), "Scan interrupted");
                    return Err(RunFailure::Scan {
                        read: docs.len(),
                        source: e,
                    });
                }
            }
        }

        Ok(docs)
    }

    /// Evaluate the predicate and compute patches in scan order.
    fn compute(
        &self,
        run_id: Uuid,
        docs: &[Document],
        report: &mut MigrationReport,
    ) -> Result<Vec<PatchEntry>, RunFailure> {
        let mut entries = Vec::new();

        for doc in docs {
            if !needs_migration(doc) {
                trace!(%run_id, document_id = %doc.id, "Document already compliant");
                continue;
            }
            report.candidates += 1;

            match compute_patch(doc, self.clock.as_ref()) {
                Ok(patch) => {
                    trace!(
                        %run_id,
                        document_id = %doc.id,
                        fields = patch.len(),
                        "Patch computed"
                    );
                    entries.push(PatchEntry::new(doc.id.clone(), patch));
                }
                Err(e) => match self.config.on_malformed {
                    MalformedPolicy::Abort => {
                        return Err(RunFailure::MalformedDocument {
                            document_id: doc.id.clone(),
                            source: e,
                        })
                    }
                    MalformedPolicy::Skip => {
                        report.malformed += 1;
                        warn!(
                            subsystem = "jobs",
                            component = "runner",
                            %run_id,
                            document_id = %doc.id,
                            error = %e,
                            "Skipping malformed document"
                        );
                    }
                },
            }
        }

        Ok(entries)
    }

    fn finish(
        &self,
        mut report: MigrationReport,
        state: &mut RunState,
        start: Instant,
        failure: Option<RunFailure>,
    ) -> MigrationReport {
        let terminal = if failure.is_some() {
            RunState::Failed
        } else {
            RunState::Done
        };
        self.advance(state, terminal, report.run_id);

        if matches!(failure, Some(RunFailure::Scan { .. })) {
            report.scanned = 0;
        }
        report.state = terminal;
        report.failure = failure;
        report.elapsed = start.elapsed();

        let duration_ms = report.elapsed.as_millis() as u64;
        match &report.failure {
            None => info!(
                subsystem = "jobs",
                component = "runner",
                op = "finish",
                run_id = %report.run_id,
                success = true,
                scanned = report.scanned,
                candidates = report.candidates,
                updated = report.updated,
                duration_ms,
                "{}",
                report.summary_line()
            ),
            Some(failure) => error!(
                subsystem = "jobs",
                component = "runner",
                op = "finish",
                run_id = %report.run_id,
                success = false,
                scanned = report.scanned,
                candidates = report.candidates,
                updated = report.updated,
                batch_index = failure.batch_index(),
                document_id = failure.document_id(),
                duration_ms,
                "{}",
                report.summary_line()
            ),
        }

        self.emit(MigrationEvent::RunFinished {
            run_id: report.run_id,
            state: terminal,
            updated: report.updated,
        });
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn policy_parses_case_insensitively() {
        assert_eq!("abort".parse::<MalformedPolicy>().unwrap(), MalformedPolicy::Abort);
        assert_eq!(" Skip ".parse::<MalformedPolicy>().unwrap(), MalformedPolicy::Skip);
        assert!(matches!(
            "retry".parse::<MalformedPolicy>(),
            Err(Error::Config(_))
        ));
    }

    #[test]
    fn default_config_targets_matches_with_store_limit() {
        let config = RunnerConfig::default();
        assert_eq!(config.collection, "matches");
        assert_eq!(config.batch_size, 500);
        assert!(!config.dry_run);
        assert_eq!(config.on_malformed, MalformedPolicy::Abort);
    }

    #[test]
    fn batch_size_is_clamped() {
        assert_eq!(RunnerConfig::default().with_batch_size(0).batch_size, 1);
        assert_eq!(RunnerConfig::default().with_batch_size(10_000).batch_size, 500);
        assert_eq!(RunnerConfig::default().with_batch_size(42).batch_size, 42);
    }
}
