//! mend-backfill: repair the match documents of one collection so they
//! conform to the current schema.
//!
//! Runs with no arguments. Configuration comes from the environment (and a
//! `.env` file); the optional flags override it. Exits 0 when the run
//! reaches `Done`, non-zero otherwise.

use std::process::ExitCode;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tracing::{error, info};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use mend_core::defaults;
use mend_db::{log_pool_metrics, Database, PoolConfig};
use mend_jobs::{MalformedPolicy, MigrationReport, MigrationRunner, RunnerConfig};

#[derive(Parser)]
#[command(name = "mend-backfill")]
#[command(author, version, about = "Backfill missing match fields in batches")]
struct Cli {
    /// Collection to repair (overrides MIGRATION_COLLECTION)
    #[arg(long)]
    collection: Option<String>,

    /// Documents per atomic commit, 1..=500 (overrides MIGRATION_BATCH_SIZE)
    #[arg(long)]
    batch_size: Option<usize>,

    /// Compute and report without committing anything
    #[arg(long)]
    dry_run: bool,

    /// Skip malformed documents instead of failing the run
    #[arg(long)]
    skip_malformed: bool,

    /// Apply pending schema migrations to the store before running
    #[arg(long)]
    migrate: bool,

    /// Print the final report as JSON on stdout
    #[arg(long)]
    json: bool,

    /// Document store connection URL
    #[arg(long, env = "DATABASE_URL", default_value = defaults::DATABASE_URL)]
    database_url: String,
}

impl Cli {
    fn runner_config(&self) -> RunnerConfig {
        let mut config = RunnerConfig::from_env();
        if let Some(collection) = &self.collection {
            config = config.with_collection(collection.clone());
        }
        if let Some(size) = self.batch_size {
            config = config.with_batch_size(size);
        }
        if self.dry_run {
            config = config.with_dry_run(true);
        }
        if self.skip_malformed {
            config = config.with_malformed_policy(MalformedPolicy::Skip);
        }
        config
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    // Load environment variables
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    let _log_guard = init_tracing();

    match run(&cli).await {
        Ok(report) => {
            if cli.json {
                match serde_json::to_string_pretty(&report.to_json()) {
                    Ok(out) => println!("{}", out),
                    Err(e) => error!(error = %e, "Failed to serialize report"),
                }
            }
            if report.is_success() {
                ExitCode::SUCCESS
            } else {
                ExitCode::FAILURE
            }
        }
        Err(e) => {
            error!(error = %format!("{:#}", e), "Backfill could not start");
            ExitCode::from(2)
        }
    }
}

async fn run(cli: &Cli) -> anyhow::Result<MigrationReport> {
    let config = cli.runner_config();

    info!("Connecting to document store...");
    let db = Database::connect_with_config(&cli.database_url, PoolConfig::from_env())
        .await
        .context("connecting to document store")?;

    if cli.migrate {
        info!("Running database migrations...");
        db.migrate().await.context("applying schema migrations")?;
    }

    let runner = MigrationRunner::new(Arc::new(db.documents.clone()), config);
    let report = runner.run().await;

    log_pool_metrics(db.pool());
    db.pool().close().await;
    Ok(report)
}

/// Initialize tracing with configurable output.
///
/// Environment variables:
///   LOG_FORMAT  - "json" or "text" (default: "text")
///   LOG_FILE    - path to log file (optional, enables file logging)
///   LOG_ANSI    - "true"/"false" override ANSI colors (auto-detected by default)
///   RUST_LOG    - standard env filter (default: "info")
fn init_tracing() -> Option<WorkerGuard> {
    let log_format = std::env::var("LOG_FORMAT").unwrap_or_else(|_| "text".to_string());
    let log_file = std::env::var("LOG_FILE").ok();
    let log_ansi = std::env::var("LOG_ANSI")
        .ok()
        .map(|v| v == "true" || v == "1");

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "info,sqlx=warn".into());

    let registry = tracing_subscriber::registry().with(env_filter);

    // Optionally create a file appender with daily rotation
    let guard = if let Some(ref path) = log_file {
        let file_dir = std::path::Path::new(path)
            .parent()
            .unwrap_or(std::path::Path::new("."));
        let file_name = std::path::Path::new(path)
            .file_name()
            .and_then(|f| f.to_str())
            .unwrap_or("mend-backfill.log");
        let file_appender = tracing_appender::rolling::daily(file_dir, file_name);
        let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

        if log_format == "json" {
            registry
                .with(
                    tracing_subscriber::fmt::layer()
                        .json()
                        .with_writer(non_blocking),
                )
                .init();
        } else {
            let layer = tracing_subscriber::fmt::layer()
                .with_writer(non_blocking)
                .with_ansi(log_ansi.unwrap_or(false)); // no ANSI in files by default
            registry.with(layer).init();
        }
        Some(guard)
    } else {
        // Console-only output, kept off stdout so --json stays parseable
        if log_format == "json" {
            registry
                .with(
                    tracing_subscriber::fmt::layer()
                        .json()
                        .with_writer(std::io::stderr),
                )
                .init();
        } else {
            let mut layer = tracing_subscriber::fmt::layer().with_writer(std::io::stderr);
            if let Some(ansi) = log_ansi {
                layer = layer.with_ansi(ansi);
            }
            registry.with(layer).init();
        }
        None
    };

    info!(
        log_format = %log_format,
        log_file = log_file.as_deref().unwrap_or("(stderr)"),
        "Logging initialized"
    );
    guard
}
