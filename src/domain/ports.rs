use crate::domain::{cell::Row, row_diff::RowDiff, stats::DiffStats};
use anyhow::Result;
use async_trait::async_trait;
use serde::Serialize;
use std::collections::BTreeMap;

/// Port: one side of the comparison (implemented by MemoryRowProducer,
/// CsvRowProducer, MonitoringRowProducer).
///
/// `read_header` is called exactly once, before any `read_row`. Rows must
/// already be ordered by the configured keys. Reads are the only points
/// where a session suspends.
#[async_trait]
pub trait RowProducer: Send {
    async fn open(&mut self) -> Result<()>;
    async fn read_header(&mut self) -> Result<Vec<String>>;
    /// Next row, or `None` at end of stream.
    async fn read_row(&mut self) -> Result<Option<Row>>;
    /// Release the underlying resource. Must be idempotent.
    fn close(&mut self) -> Result<()>;
}

/// Sent to a consumer once, before any diff.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DiffHeader {
    pub columns: Vec<String>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub labels: BTreeMap<String, String>,
}

/// Sent to a consumer once, after the last forwarded diff.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DiffFooter {
    pub stats: DiffStats,
}

/// Port: where forwarded diffs go (implemented by JsonRowConsumer,
/// CsvRowConsumer, MemoryRowConsumer, NullRowConsumer).
pub trait RowConsumer: Send {
    fn open(&mut self) -> Result<()>;
    fn write_header(&mut self, header: &DiffHeader) -> Result<()>;
    fn write_diff(&mut self, diff: &RowDiff) -> Result<()>;
    fn write_footer(&mut self, footer: &DiffFooter) -> Result<()>;
    /// Flush and release. Must be idempotent.
    fn close(&mut self) -> Result<()>;
}
