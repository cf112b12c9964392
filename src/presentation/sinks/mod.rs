use anyhow::{Context, Result};
use std::fs::{self, File};
use std::io::{self, BufWriter, Write};
use std::path::Path;

use crate::domain::ports::RowConsumer;
use crate::infrastructure::config::{DestinationConfig, OutputFormat};

use self::{delimited::CsvRowConsumer, json::JsonRowConsumer, memory::NullRowConsumer};

pub mod delimited;
pub mod json;
pub mod memory;

/// Resolve a configured destination to a consumer.
///
/// `"console"` streams CSV to stdout, `"null"` discards everything, and any
/// other name is a file path whose extension picks the format.
pub fn consumer_for(destination: &DestinationConfig) -> Result<Box<dyn RowConsumer>> {
    match destination {
        DestinationConfig::Named(name) if name == "console" => Ok(console(OutputFormat::Csv)),
        DestinationConfig::Named(name) if name == "null" => Ok(Box::new(NullRowConsumer)),
        DestinationConfig::Named(path) => file_consumer(format_from_extension(path), path),
        DestinationConfig::Options { format, path: None } => Ok(console(*format)),
        DestinationConfig::Options {
            format,
            path: Some(path),
        } => file_consumer(*format, path),
    }
}

fn console(format: OutputFormat) -> Box<dyn RowConsumer> {
    let out: Box<dyn Write + Send> = Box::new(io::stdout());
    match format {
        OutputFormat::Json => Box::new(JsonRowConsumer::new(out)),
        OutputFormat::Csv => Box::new(CsvRowConsumer::new(out, b',')),
    }
}

fn file_consumer(format: OutputFormat, path: &str) -> Result<Box<dyn RowConsumer>> {
    let path = Path::new(path);
    if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
        fs::create_dir_all(dir)
            .with_context(|| format!("Failed to create output directory: {}", dir.display()))?;
    }
    let file = File::create(path)
        .with_context(|| format!("Failed to create output file: {}", path.display()))?;
    let out = BufWriter::new(file);
    Ok(match format {
        OutputFormat::Json => Box::new(JsonRowConsumer::new(out)),
        OutputFormat::Csv => {
            let delimiter = if has_extension(path, "tsv") { b'\t' } else { b',' };
            Box::new(CsvRowConsumer::new(out, delimiter))
        }
    })
}

fn format_from_extension(path: &str) -> OutputFormat {
    if has_extension(Path::new(path), "json") {
        OutputFormat::Json
    } else {
        OutputFormat::Csv
    }
}

fn has_extension(path: &Path, ext: &str) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case(ext))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ports::DiffHeader;

    #[test]
    fn file_destination_creates_parent_dirs() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested/out/diff.json");
        let mut consumer =
            consumer_for(&DestinationConfig::Named(path.to_str().unwrap().to_string())).unwrap();
        consumer.open().unwrap();
        consumer.write_header(&DiffHeader::default()).unwrap();
        consumer.close().unwrap();
        let text = fs::read_to_string(&path).unwrap();
        assert!(text.starts_with("{\"header\":"), "got: {text}");
    }

    #[test]
    fn extension_picks_format() {
        assert_eq!(format_from_extension("out/diff.JSON"), OutputFormat::Json);
        assert_eq!(format_from_extension("out/diff.csv"), OutputFormat::Csv);
        assert_eq!(format_from_extension("diff"), OutputFormat::Csv);
    }

    #[test]
    fn null_destination_accepts_everything() {
        let mut consumer = consumer_for(&DestinationConfig::Named("null".into())).unwrap();
        consumer.open().unwrap();
        consumer.write_header(&DiffHeader::default()).unwrap();
        consumer.close().unwrap();
    }
}
