use anyhow::{Context, Result};
use std::io::Write;

use crate::domain::ports::{DiffFooter, DiffHeader, RowConsumer};
use crate::domain::row_diff::RowDiff;

/// Streams one JSON document: `{"header":..,"items":[..],"footer":..}`.
///
/// Items are written as they arrive, so memory stays flat however long
/// the diff is.
pub struct JsonRowConsumer<W: Write + Send> {
    out: W,
    items: usize,
    header_written: bool,
    footer_written: bool,
    closed: bool,
}

impl<W: Write + Send> JsonRowConsumer<W> {
    pub fn new(out: W) -> Self {
        Self {
            out,
            items: 0,
            header_written: false,
            footer_written: false,
            closed: false,
        }
    }

    pub fn get_ref(&self) -> &W {
        &self.out
    }

    pub fn into_inner(self) -> W {
        self.out
    }
}

impl<W: Write + Send> RowConsumer for JsonRowConsumer<W> {
    fn open(&mut self) -> Result<()> {
        Ok(())
    }

    fn write_header(&mut self, header: &DiffHeader) -> Result<()> {
        self.out.write_all(b"{\"header\":")?;
        serde_json::to_writer(&mut self.out, header).context("Failed to serialize diff header")?;
        self.out.write_all(b",\"items\":[")?;
        self.header_written = true;
        Ok(())
    }

    fn write_diff(&mut self, diff: &RowDiff) -> Result<()> {
        if self.items > 0 {
            self.out.write_all(b",")?;
        }
        serde_json::to_writer(&mut self.out, diff).context("Failed to serialize diff item")?;
        self.items += 1;
        Ok(())
    }

    fn write_footer(&mut self, footer: &DiffFooter) -> Result<()> {
        self.out.write_all(b"],\"footer\":")?;
        serde_json::to_writer(&mut self.out, footer).context("Failed to serialize diff footer")?;
        self.out.write_all(b"}\n")?;
        self.footer_written = true;
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        // An interrupted run still leaves a parseable document behind.
        if self.header_written && !self.footer_written {
            self.out.write_all(b"]}\n")?;
        }
        self.out.flush().context("Failed to flush JSON output")
    }
}
