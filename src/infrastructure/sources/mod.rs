use anyhow::Result;

use crate::domain::ports::RowProducer;
use crate::infrastructure::config::SourceConfig;

use self::delimited::CsvRowProducer;

pub mod delimited;
pub mod memory;

/// Resolve a configured source to a concrete producer.
///
/// Every supported format is a delimited text file today; programmatic
/// callers pass their own `Box<dyn RowProducer>` to `Differ::start` instead.
pub fn producer_for(cfg: &SourceConfig) -> Result<Box<dyn RowProducer>> {
    if cfg.path().is_empty() {
        anyhow::bail!("source path is empty");
    }
    Ok(Box::new(CsvRowProducer::from_path(cfg.path(), cfg.delimiter())))
}
