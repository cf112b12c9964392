use anyhow::Result;
use std::sync::{Arc, Mutex};

pub mod application;
pub mod domain;
pub mod infrastructure;
pub mod presentation;

// ─── Log level ────────────────────────────────────────────────────────────────

/// Controls the verbosity of streamdiff's internal tracing output.
///
/// Pass to [`init_tracing`] before calling any async entry point.
///
/// | Variant | `tracing` level | When to use                              |
/// |---------|-----------------|------------------------------------------|
/// | `Error` | `error`         | `--quiet` / CI scripting                 |
/// | `Info`  | `info`          | Default, shows per-source timings        |
/// | `Debug` | `debug`         | `--verbose`, shows source open/drain too |
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogLevel {
    Error,
    #[default]
    Info,
    Debug,
}

/// Initialise the global `tracing` subscriber for streamdiff.
///
/// Respects `RUST_LOG` when set, falling back to `level` otherwise. Logs go
/// to stderr so that diffs streamed to stdout stay parseable.
///
/// Call this **once** at application startup. Library consumers who manage
/// their own subscriber should skip this and configure tracing themselves.
///
/// Only available when the `cli` feature is enabled (pulls in
/// `tracing-subscriber`).
#[cfg(feature = "cli")]
pub fn init_tracing(level: LogLevel) {
    use tracing_subscriber::fmt::format::FmtSpan;

    let default_filter = match level {
        LogLevel::Error => "streamdiff=error",
        LogLevel::Info => "streamdiff=info",
        LogLevel::Debug => "streamdiff=debug",
    };

    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_span_events(FmtSpan::CLOSE)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .init();
}

// ─── Public API Facade ───

pub use application::comparer::RowComparer;
pub use application::duplicates::{DuplicateOptions, DuplicatePolicy};
pub use application::monitoring::PerfReport;
pub use application::session::{DiffFilter, DiffOptions, DiffSession, Differ, OutputOptions};
pub use domain::cell::{Cell, Row};
pub use domain::column::{CompareWith, ComparerKind, KeySpec};
pub use domain::error::DiffError;
pub use domain::ports::{DiffFooter, DiffHeader, RowConsumer, RowProducer};
pub use domain::row_diff::{DiffStatus, RowDiff};
pub use domain::stats::{DiffStats, DuplicationStats};
pub use domain::value_objects::{ExcludedColumns, IncludedColumns, SortDirection, SourceLabel};
pub use infrastructure::config::{AppConfig, DiffConfig, OutputConfig, SourceConfig};
pub use infrastructure::sources::{delimited::CsvRowProducer, memory::MemoryRowProducer};
pub use presentation::sinks::{
    delimited::CsvRowConsumer, json::JsonRowConsumer, memory::MemoryRowConsumer,
    memory::NullRowConsumer,
};

use crate::application::monitoring::MonitoringRowProducer;
use crate::infrastructure::sources::producer_for;
use crate::presentation::sinks::consumer_for;

/// Everything a configured run produced besides the diffs themselves.
#[derive(Debug, Clone)]
pub struct RunReport {
    pub stats: DiffStats,
    /// Only sources that ran under a duplicate policy are listed.
    pub duplicates: Vec<(SourceLabel, DuplicationStats)>,
    pub perf: PerfReport,
}

// ─── Public entry points ───

/// Diff the two configured sources into the configured destination.
///
/// Use [`run_with_timing`] if you also want a performance report.
pub async fn run(cfg: &AppConfig) -> Result<DiffStats> {
    let report = run_with_timing(cfg).await?;
    Ok(report.stats)
}

/// Same as [`run`], with per-source read timings and duplicate figures.
pub async fn run_with_timing(cfg: &AppConfig) -> Result<RunReport> {
    let report = PerfReport::new();

    let old = build_producer(&cfg.old, SourceLabel::Old, Arc::clone(&report))?;
    let new = build_producer(&cfg.new, SourceLabel::New, Arc::clone(&report))?;
    let differ = Differ::new(cfg.diff.to_options())?;

    let mut session = differ.start(old, new).await?;
    let mut consumer = consumer_for(&cfg.output.destination)?;
    let stats = session
        .to(consumer.as_mut(), &cfg.output.to_options())
        .await?;

    let duplicates = [SourceLabel::Old, SourceLabel::New]
        .into_iter()
        .filter_map(|side| session.duplication_stats(side).map(|s| (side, s)))
        .collect();
    drop(session);

    let perf = report.lock().map(|r| r.clone()).unwrap_or_default();
    Ok(RunReport {
        stats,
        duplicates,
        perf,
    })
}

// ─── Private helpers ───────────────────────────────────────────────────────────

/// Build a source producer and wrap it in the monitoring decorator.
///
/// The shared `report` accumulates timings from both sides of the run.
fn build_producer(
    cfg: &SourceConfig,
    side: SourceLabel,
    report: Arc<Mutex<PerfReport>>,
) -> Result<Box<dyn RowProducer>> {
    let inner = producer_for(cfg)?;
    Ok(Box::new(MonitoringRowProducer::new(inner, side, report)))
}
