use crate::domain::cell::Row;
use crate::domain::ports::RowProducer;
use crate::domain::value_objects::SourceLabel;
use anyhow::Result;
use async_trait::async_trait;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tracing::{info, instrument};

// ─── PerfReport ──────────────────────────────────────────────────────────────

/// A single timed operation.
#[derive(Debug, Clone, serde::Serialize)]
pub struct OpTiming {
    /// Operation name: "read_header" or "read_rows".
    pub operation: &'static str,
    /// Source the operation ran against.
    pub source: String,
    /// Elapsed wall time in milliseconds.
    pub duration_ms: u128,
    /// Number of rows involved.
    pub rows: usize,
}

/// Accumulated performance timings for a single streamdiff run.
///
/// Shared across both decorated producers for one run via `Arc<Mutex<_>>`.
#[derive(Debug, Default, Clone, serde::Serialize)]
pub struct PerfReport {
    pub timings: Vec<OpTiming>,
    pub total_rows_read: usize,
    pub total_ms: u128,
}

impl PerfReport {
    pub fn new() -> Arc<Mutex<Self>> {
        Arc::new(Mutex::new(Self::default()))
    }

    pub fn record(report: &Arc<Mutex<Self>>, timing: OpTiming) {
        if let Ok(mut r) = report.lock() {
            r.total_ms += timing.duration_ms;
            if timing.operation == "read_rows" {
                r.total_rows_read += timing.rows;
            }
            r.timings.push(timing);
        }
    }

    pub fn total_rows_read(&self) -> usize {
        self.total_rows_read
    }

    pub fn total_ms(&self) -> u128 {
        self.total_ms
    }
}

// ─── MonitoringRowProducer ───────────────────────────────────────────────────

/// Decorator: wraps any `RowProducer`, measures the time spent reading and
/// counts rows, and appends the totals to the shared `PerfReport` when the
/// producer is closed.
pub struct MonitoringRowProducer {
    inner: Box<dyn RowProducer>,
    side: SourceLabel,
    report: Arc<Mutex<PerfReport>>,
    rows: usize,
    elapsed: Duration,
    reported: bool,
}

impl MonitoringRowProducer {
    pub fn new(inner: Box<dyn RowProducer>, side: SourceLabel, report: Arc<Mutex<PerfReport>>) -> Self {
        Self {
            inner,
            side,
            report,
            rows: 0,
            elapsed: Duration::ZERO,
            reported: false,
        }
    }
}

#[async_trait]
impl RowProducer for MonitoringRowProducer {
    async fn open(&mut self) -> Result<()> {
        self.inner.open().await
    }

    #[instrument(name = "read_header", skip(self), fields(source = %self.side), level = "info")]
    async fn read_header(&mut self) -> Result<Vec<String>> {
        let start = Instant::now();
        let header = self.inner.read_header().await?;
        let duration_ms = start.elapsed().as_millis();

        info!(source = %self.side, columns = header.len(), duration_ms, "read_header completed");

        PerfReport::record(
            &self.report,
            OpTiming {
                operation: "read_header",
                source: self.side.to_string(),
                duration_ms,
                rows: 0,
            },
        );

        Ok(header)
    }

    async fn read_row(&mut self) -> Result<Option<Row>> {
        let start = Instant::now();
        let row = self.inner.read_row().await?;
        self.elapsed += start.elapsed();
        if row.is_some() {
            self.rows += 1;
        }
        Ok(row)
    }

    fn close(&mut self) -> Result<()> {
        if !self.reported {
            self.reported = true;
            let duration_ms = self.elapsed.as_millis();
            info!(source = %self.side, rows = self.rows, duration_ms, "read_rows completed");
            PerfReport::record(
                &self.report,
                OpTiming {
                    operation: "read_rows",
                    source: self.side.to_string(),
                    duration_ms,
                    rows: self.rows,
                },
            );
        }
        self.inner.close()
    }
}
