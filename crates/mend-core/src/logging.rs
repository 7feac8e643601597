//! Structured logging field name constants for mend.
//!
//! Log events and the JSON run report use these names, so a backfill run can
//! be queried by the same keys in log aggregation and in the report printed
//! by `mend-backfill --json`.
//!
//! ## Log Level Contract
//!
//! | Level | Usage |
//! |-------|-------|
//! | ERROR | Run failed, operator must re-run |
//! | WARN  | Malformed document skipped, pool pressure |
//! | INFO  | Run lifecycle, scan completion, batch commits |
//! | DEBUG | Batch plans, config choices |
//! | TRACE | Per-document decisions |

// ─── Identity fields ───────────────────────────────────────────────────────

/// Correlation ID for one migration run. Format: UUIDv7.
pub const RUN_ID: &str = "run_id";

/// Subsystem originating the log event.
/// Values: "db", "jobs"
pub const SUBSYSTEM: &str = "subsystem";

/// Component within a subsystem.
/// Examples: "runner", "pool", "pg_source", "memory_source"
pub const COMPONENT: &str = "component";

/// Logical operation name.
/// Examples: "scan", "compute", "commit"
pub const OPERATION: &str = "op";

// ─── Entity fields ─────────────────────────────────────────────────────────

/// Collection being migrated.
pub const COLLECTION: &str = "collection";

/// Document id being operated on.
pub const DOCUMENT_ID: &str = "document_id";

/// Zero-based index of the batch being committed.
pub const BATCH_INDEX: &str = "batch_index";

// ─── Measurement fields ────────────────────────────────────────────────────

/// Wall-clock duration in milliseconds.
pub const DURATION_MS: &str = "duration_ms";

/// Number of documents read by the scan.
pub const SCANNED_COUNT: &str = "scanned";

/// Number of documents the predicate selected.
pub const CANDIDATE_COUNT: &str = "candidates";

/// Number of candidates skipped as malformed.
pub const MALFORMED_COUNT: &str = "malformed";

/// Number of non-empty patches planned for commit.
pub const PLANNED_COUNT: &str = "planned";

/// Number of documents whose patch was committed.
pub const UPDATED_COUNT: &str = "updated";

/// Number of entries in a batch.
pub const BATCH_SIZE: &str = "batch_size";

/// Number of batches planned for the run.
pub const BATCH_COUNT: &str = "batch_count";

// ─── Outcome fields ────────────────────────────────────────────────────────

/// Boolean success/failure indicator.
pub const SUCCESS: &str = "success";

/// Error message when an operation fails.
pub const ERROR_MSG: &str = "error";
