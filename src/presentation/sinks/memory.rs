use anyhow::Result;

use crate::domain::ports::{DiffFooter, DiffHeader, RowConsumer};
use crate::domain::row_diff::RowDiff;

/// Keeps everything it receives. Mostly useful in tests and for callers
/// that want the forwarded diffs as a `Vec`.
#[derive(Debug, Default)]
pub struct MemoryRowConsumer {
    pub header: Option<DiffHeader>,
    pub diffs: Vec<RowDiff>,
    pub footer: Option<DiffFooter>,
    pub opens: usize,
    pub closes: usize,
}

impl MemoryRowConsumer {
    pub fn new() -> Self {
        Self::default()
    }
}

impl RowConsumer for MemoryRowConsumer {
    fn open(&mut self) -> Result<()> {
        self.opens += 1;
        Ok(())
    }

    fn write_header(&mut self, header: &DiffHeader) -> Result<()> {
        self.header = Some(header.clone());
        Ok(())
    }

    fn write_diff(&mut self, diff: &RowDiff) -> Result<()> {
        self.diffs.push(diff.clone());
        Ok(())
    }

    fn write_footer(&mut self, footer: &DiffFooter) -> Result<()> {
        self.footer = Some(footer.clone());
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        self.closes += 1;
        Ok(())
    }
}

/// Discards everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullRowConsumer;

impl RowConsumer for NullRowConsumer {
    fn open(&mut self) -> Result<()> {
        Ok(())
    }

    fn write_header(&mut self, _header: &DiffHeader) -> Result<()> {
        Ok(())
    }

    fn write_diff(&mut self, _diff: &RowDiff) -> Result<()> {
        Ok(())
    }

    fn write_footer(&mut self, _footer: &DiffFooter) -> Result<()> {
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        Ok(())
    }
}
