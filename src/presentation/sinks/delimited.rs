use anyhow::{Context, Result};
use std::io::Write;

use crate::domain::ports::{DiffFooter, DiffHeader, RowConsumer};
use crate::domain::row_diff::RowDiff;

pub const STATUS_COLUMN: &str = "DIFF_STATUS";

/// Writes one CSV record per diff: the status followed by the current
/// values (old values for a deletion). The footer is not written; stats
/// are reported through the summary instead.
pub struct CsvRowConsumer<W: Write + Send> {
    writer: csv::Writer<W>,
    closed: bool,
}

impl<W: Write + Send> CsvRowConsumer<W> {
    pub fn new(out: W, delimiter: u8) -> Self {
        Self {
            writer: csv::WriterBuilder::new()
                .delimiter(delimiter)
                .flexible(true)
                .from_writer(out),
            closed: false,
        }
    }

    pub fn get_ref(&self) -> &W {
        self.writer.get_ref()
    }
}

impl<W: Write + Send> RowConsumer for CsvRowConsumer<W> {
    fn open(&mut self) -> Result<()> {
        Ok(())
    }

    fn write_header(&mut self, header: &DiffHeader) -> Result<()> {
        let record = std::iter::once(STATUS_COLUMN).chain(header.columns.iter().map(String::as_str));
        self.writer
            .write_record(record)
            .context("Failed to write CSV header")
    }

    fn write_diff(&mut self, diff: &RowDiff) -> Result<()> {
        let cells = diff.current_row().map(|r| r.as_slice()).unwrap_or_default();
        let mut record = Vec::with_capacity(cells.len() + 1);
        record.push(diff.status.as_str().to_string());
        record.extend(cells.iter().map(|c| c.to_string()));
        self.writer
            .write_record(&record)
            .context("Failed to write CSV record")
    }

    fn write_footer(&mut self, _footer: &DiffFooter) -> Result<()> {
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        self.writer.flush().context("Failed to flush CSV output")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::cell::Cell;

    #[test]
    fn writes_status_column_and_current_values() {
        let mut c = CsvRowConsumer::new(Vec::new(), b',');
        c.open().unwrap();
        c.write_header(&DiffHeader {
            columns: vec!["id".into(), "name".into()],
            labels: Default::default(),
        })
        .unwrap();
        c.write_diff(&RowDiff::matched(
            vec![Cell::text("2"), Cell::text("rachel")],
            vec![Cell::text("2"), Cell::text("rachel, jr")],
            true,
        ))
        .unwrap();
        c.write_diff(&RowDiff::deleted(vec![Cell::text("3"), Cell::Null]))
            .unwrap();
        c.write_footer(&DiffFooter::default()).unwrap();
        c.close().unwrap();

        let text = String::from_utf8(c.get_ref().clone()).unwrap();
        assert_eq!(
            text,
            "DIFF_STATUS,id,name\nmodified,2,\"rachel, jr\"\ndeleted,3,\n"
        );
    }

    #[test]
    fn honours_delimiter() {
        let mut c = CsvRowConsumer::new(Vec::new(), b'\t');
        c.write_header(&DiffHeader {
            columns: vec!["id".into()],
            labels: Default::default(),
        })
        .unwrap();
        c.close().unwrap();
        assert_eq!(c.get_ref().as_slice(), b"DIFF_STATUS\tid\n");
    }
}
