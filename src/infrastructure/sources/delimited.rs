use anyhow::{Context, Result};
use async_trait::async_trait;
use std::fs::File;
use std::io::Read;
use std::path::PathBuf;
use tracing::debug;

use crate::domain::cell::{Cell, Row};
use crate::domain::ports::RowProducer;

enum CsvInput {
    Path(PathBuf),
    Reader(Option<Box<dyn Read + Send>>),
}

/// Streaming CSV/TSV reader. The first record is the header; every field
/// is read as text. Records may be shorter or longer than the header.
pub struct CsvRowProducer {
    input: CsvInput,
    delimiter: u8,
    reader: Option<csv::Reader<Box<dyn Read + Send>>>,
    record: csv::StringRecord,
}

impl CsvRowProducer {
    pub fn from_path(path: impl Into<PathBuf>, delimiter: u8) -> Self {
        Self::with_input(CsvInput::Path(path.into()), delimiter)
    }

    pub fn from_reader(reader: impl Read + Send + 'static, delimiter: u8) -> Self {
        Self::with_input(CsvInput::Reader(Some(Box::new(reader))), delimiter)
    }

    fn with_input(input: CsvInput, delimiter: u8) -> Self {
        Self {
            input,
            delimiter,
            reader: None,
            record: csv::StringRecord::new(),
        }
    }

    fn describe(&self) -> String {
        match &self.input {
            CsvInput::Path(p) => p.display().to_string(),
            CsvInput::Reader(_) => "<reader>".to_string(),
        }
    }

    fn reader(&mut self) -> Result<&mut csv::Reader<Box<dyn Read + Send>>> {
        let what = self.describe();
        self.reader
            .as_mut()
            .with_context(|| format!("CSV source {what} is not open"))
    }
}

#[async_trait]
impl RowProducer for CsvRowProducer {
    async fn open(&mut self) -> Result<()> {
        let input: Box<dyn Read + Send> = match &mut self.input {
            CsvInput::Path(path) => Box::new(
                File::open(&*path)
                    .with_context(|| format!("Failed to open CSV file: {}", path.display()))?,
            ),
            CsvInput::Reader(reader) => reader
                .take()
                .context("CSV reader source can only be opened once")?,
        };
        self.reader = Some(
            csv::ReaderBuilder::new()
                .delimiter(self.delimiter)
                .has_headers(false)
                .flexible(true)
                .from_reader(input),
        );
        debug!(source = %self.describe(), "CSV source opened");
        Ok(())
    }

    async fn read_header(&mut self) -> Result<Vec<String>> {
        let what = self.describe();
        let mut record = csv::StringRecord::new();
        let found = self
            .reader()?
            .read_record(&mut record)
            .with_context(|| format!("Failed to read CSV header of {what}"))?;
        if !found {
            return Ok(Vec::new());
        }
        Ok(record.iter().map(str::to_string).collect())
    }

    async fn read_row(&mut self) -> Result<Option<Row>> {
        let what = self.describe();
        let mut record = std::mem::take(&mut self.record);
        let found = self
            .reader()?
            .read_record(&mut record)
            .with_context(|| format!("Failed to read CSV record of {what}"))?;
        let row = found.then(|| record.iter().map(|f| Cell::Text(f.to_string())).collect());
        self.record = record;
        Ok(row)
    }

    fn close(&mut self) -> Result<()> {
        self.reader = None;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[tokio::test]
    async fn reads_header_and_rows() {
        let data = "id,name,age\n1,john,33\n2,\"rachel, jr\",22\n";
        let mut p = CsvRowProducer::from_reader(Cursor::new(data), b',');
        p.open().await.unwrap();
        assert_eq!(p.read_header().await.unwrap(), vec!["id", "name", "age"]);
        let r1 = p.read_row().await.unwrap().unwrap();
        assert_eq!(r1, vec![Cell::text("1"), Cell::text("john"), Cell::text("33")]);
        let r2 = p.read_row().await.unwrap().unwrap();
        assert_eq!(r2[1], Cell::text("rachel, jr"));
        assert!(p.read_row().await.unwrap().is_none());
        p.close().unwrap();
    }

    #[tokio::test]
    async fn empty_input_has_empty_header() {
        let mut p = CsvRowProducer::from_reader(Cursor::new(""), b',');
        p.open().await.unwrap();
        assert!(p.read_header().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn tab_delimiter_and_short_records() {
        let data = "id\tname\n1\n";
        let mut p = CsvRowProducer::from_reader(Cursor::new(data), b'\t');
        p.open().await.unwrap();
        assert_eq!(p.read_header().await.unwrap(), vec!["id", "name"]);
        assert_eq!(p.read_row().await.unwrap().unwrap(), vec![Cell::text("1")]);
    }

    #[tokio::test]
    async fn reading_before_open_fails() {
        let mut p = CsvRowProducer::from_path("/nonexistent/file.csv", b',');
        assert!(p.read_row().await.is_err());
        assert!(p.open().await.is_err());
    }
}
