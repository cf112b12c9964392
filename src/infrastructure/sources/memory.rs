use anyhow::Result;
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use crate::domain::cell::Row;
use crate::domain::ports::RowProducer;

/// In-memory implementation of [`RowProducer`]: a header plus rows that are
/// already ordered by the diff keys.
pub struct MemoryRowProducer {
    header: Vec<String>,
    rows: VecDeque<Row>,
    closes: Arc<AtomicUsize>,
}

impl MemoryRowProducer {
    pub fn new(header: Vec<String>, rows: Vec<Row>) -> Self {
        Self {
            header,
            rows: rows.into(),
            closes: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Build from string literals: first slice is the header.
    pub fn from_strs(header: &[&str], rows: &[&[&str]]) -> Self {
        Self::new(
            header.iter().map(|h| h.to_string()).collect(),
            rows.iter()
                .map(|r| r.iter().map(|c| (*c).into()).collect())
                .collect(),
        )
    }

    /// Counter of `close` calls, shared with the producer.
    pub fn close_counter(&self) -> Arc<AtomicUsize> {
        Arc::clone(&self.closes)
    }
}

#[async_trait]
impl RowProducer for MemoryRowProducer {
    async fn open(&mut self) -> Result<()> {
        Ok(())
    }

    async fn read_header(&mut self) -> Result<Vec<String>> {
        Ok(self.header.clone())
    }

    async fn read_row(&mut self) -> Result<Option<Row>> {
        Ok(self.rows.pop_front())
    }

    fn close(&mut self) -> Result<()> {
        self.closes.fetch_add(1, Ordering::SeqCst);
        self.rows.clear();
        Ok(())
    }
}
