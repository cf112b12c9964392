use anyhow::{Context, Result};
use std::cmp::Ordering;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::application::columns::ResolvedColumns;
use crate::application::comparer::KeyComparer;
use crate::application::duplicates::{DuplicateOptions, DuplicateResolver};
use crate::application::ordering::check_order;
use crate::domain::cell::Row;
use crate::domain::ports::RowProducer;
use crate::domain::stats::DuplicationStats;
use crate::domain::value_objects::SourceLabel;

// ─── SourceHandle ────────────────────────────────────────────────────────────

/// Owns one opened producer and guarantees it is closed exactly once:
/// explicitly through [`SourceHandle::close`], or on drop for every other
/// exit path (error unwinding, a dropped future, an abandoned session).
pub struct SourceHandle {
    side: SourceLabel,
    producer: Box<dyn RowProducer>,
    eof: bool,
    closed: bool,
}

impl SourceHandle {
    /// Open the producer and read its header.
    pub async fn open(side: SourceLabel, producer: Box<dyn RowProducer>) -> Result<(Self, Vec<String>)> {
        let mut handle = Self {
            side,
            producer,
            eof: false,
            closed: false,
        };
        handle
            .producer
            .open()
            .await
            .with_context(|| format!("Failed to open {side} source"))?;
        let header = handle
            .producer
            .read_header()
            .await
            .with_context(|| format!("Failed to read {side} header"))?;
        debug!(source = %side, columns = header.len(), "header read");
        Ok((handle, header))
    }

    pub fn side(&self) -> SourceLabel {
        self.side
    }

    /// Next raw row. The producer is not polled again once it reported the
    /// end of its stream.
    pub async fn read(&mut self) -> Result<Option<Row>> {
        if self.eof || self.closed {
            return Ok(None);
        }
        let row = self
            .producer
            .read_row()
            .await
            .with_context(|| format!("Failed to read row from {} source", self.side))?;
        if row.is_none() {
            self.eof = true;
        }
        Ok(row)
    }

    pub fn close(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        self.producer
            .close()
            .with_context(|| format!("Failed to close {} source", self.side))
    }
}

impl Drop for SourceHandle {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            warn!(source = %self.side, error = %e, "close failed during unwind");
        }
    }
}

// ─── RowCursor ───────────────────────────────────────────────────────────────

/// Pulls rows from one side: projects them onto the output columns, folds
/// duplicate-key runs when a policy is configured, and checks ordering of
/// every row it hands out against the previous one.
pub struct RowCursor {
    handle: SourceHandle,
    columns: Arc<ResolvedColumns>,
    comparer: KeyComparer,
    duplicates: Option<DuplicateResolver>,
    /// Row read past the end of a duplicate run.
    pending: Option<Row>,
    previous: Option<Row>,
    consumed: usize,
}

impl RowCursor {
    pub fn new(
        handle: SourceHandle,
        columns: Arc<ResolvedColumns>,
        comparer: KeyComparer,
        duplicates: Option<DuplicateOptions>,
    ) -> Self {
        let side = handle.side();
        Self {
            handle,
            columns,
            comparer,
            duplicates: duplicates.map(|options| DuplicateResolver::new(side, options)),
            pending: None,
            previous: None,
            consumed: 0,
        }
    }

    pub fn side(&self) -> SourceLabel {
        self.handle.side()
    }

    /// Rows handed out so far (after duplicate folding).
    pub fn consumed(&self) -> usize {
        self.consumed
    }

    pub fn duplication_stats(&self) -> Option<&DuplicationStats> {
        self.duplicates.as_ref().map(DuplicateResolver::stats)
    }

    pub async fn next(&mut self) -> Result<Option<Row>> {
        let row = match self.duplicates {
            Some(_) => self.next_resolved().await?,
            None => read_projected(&mut self.handle, &self.columns).await?,
        };
        check_order(
            self.handle.side(),
            &self.comparer,
            self.previous.as_ref(),
            row.as_ref(),
        )?;
        if let Some(r) = &row {
            self.previous = Some(r.clone());
            self.consumed += 1;
        }
        Ok(row)
    }

    async fn next_resolved(&mut self) -> Result<Option<Row>> {
        let Some(resolver) = self.duplicates.as_mut() else {
            return read_projected(&mut self.handle, &self.columns).await;
        };

        let first = match self.pending.take() {
            Some(row) => row,
            None => match read_projected(&mut self.handle, &self.columns).await? {
                Some(row) => row,
                None => return Ok(None),
            },
        };
        resolver.push(first)?;

        while let Some(row) = read_projected(&mut self.handle, &self.columns).await? {
            let same_key = resolver
                .last()
                .map_or(false, |last| self.comparer.compare_rows(last, &row) == Ordering::Equal);
            if !same_key {
                self.pending = Some(row);
                break;
            }
            resolver.push(row)?;
        }

        Ok(resolver.finish())
    }

    pub fn close(&mut self) -> Result<()> {
        self.handle.close()
    }
}

async fn read_projected(handle: &mut SourceHandle, columns: &ResolvedColumns) -> Result<Option<Row>> {
    let side = handle.side();
    Ok(handle.read().await?.map(|row| columns.project(side, row)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::columns::resolve_columns;
    use crate::domain::cell::Cell;
    use crate::domain::column::KeySpec;
    use crate::domain::error::DiffError;
    use crate::domain::value_objects::{ExcludedColumns, IncludedColumns};
    use crate::infrastructure::sources::memory::MemoryRowProducer;

    async fn cursor(rows: &[(&str, &str)], duplicates: Option<DuplicateOptions>) -> RowCursor {
        let header = vec!["id".to_string(), "name".to_string()];
        let producer = MemoryRowProducer::new(
            header.clone(),
            rows.iter()
                .map(|(id, name)| vec![Cell::text(*id), Cell::text(*name)])
                .collect(),
        );
        let (handle, _) = SourceHandle::open(SourceLabel::Old, Box::new(producer)).await.unwrap();
        let columns = resolve_columns(
            &header,
            &header,
            &IncludedColumns::default(),
            &ExcludedColumns::default(),
            &[KeySpec::new("id")],
        )
        .unwrap();
        let comparer = KeyComparer::new(columns.keys.clone()).unwrap();
        RowCursor::new(handle, Arc::new(columns), comparer, duplicates)
    }

    async fn drain(cursor: &mut RowCursor) -> Result<Vec<String>> {
        let mut names = Vec::new();
        while let Some(row) = cursor.next().await? {
            names.push(row[1].to_string());
        }
        Ok(names)
    }

    #[tokio::test]
    async fn plain_cursor_yields_rows_in_order() {
        let mut c = cursor(&[("1", "a"), ("2", "b")], None).await;
        assert_eq!(drain(&mut c).await.unwrap(), vec!["a", "b"]);
        assert_eq!(c.consumed(), 2);
        assert!(c.next().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn plain_cursor_rejects_duplicates() {
        let mut c = cursor(&[("1", "a"), ("1", "b")], None).await;
        let err = drain(&mut c).await.unwrap_err();
        assert!(matches!(
            err.downcast_ref::<DiffError>(),
            Some(DiffError::NotUnique { .. })
        ));
    }

    #[tokio::test]
    async fn keep_last_folds_runs_including_the_tail() {
        let mut c = cursor(
            &[("1", "a"), ("2", "b"), ("2", "b2"), ("3", "c"), ("3", "c2"), ("3", "c3")],
            Some(DuplicateOptions::keep_last()),
        )
        .await;
        assert_eq!(drain(&mut c).await.unwrap(), vec!["a", "b2", "c3"]);
        let stats = c.duplication_stats().unwrap();
        assert_eq!(stats.unique_keys, 3);
        assert_eq!(stats.duplicated_keys, 2);
        assert_eq!(stats.duplicate_rows, 3);
    }

    #[tokio::test]
    async fn ordering_is_still_checked_with_duplicates() {
        let mut c = cursor(&[("2", "a"), ("2", "b"), ("1", "c")], Some(DuplicateOptions::keep_first())).await;
        let err = drain(&mut c).await.unwrap_err();
        assert!(matches!(
            err.downcast_ref::<DiffError>(),
            Some(DiffError::Unordered { side: SourceLabel::Old, .. })
        ));
    }
}
