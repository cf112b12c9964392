use anyhow::Result;
use std::cmp::Ordering;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::application::columns::ResolvedColumns;
use crate::application::comparer::KeyComparer;
use crate::application::source::RowCursor;
use crate::domain::cell::Row;
use crate::domain::row_diff::RowDiff;
use crate::domain::stats::DuplicationStats;
use crate::domain::value_objects::SourceLabel;

/// Which side(s) must be read before the next comparison.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Advance {
    Both,
    Old,
    New,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum EngineState {
    Running,
    Exhausted,
}

// ─────────────────────────────────────────────────────────────────────────────
// DiffIterator
// ─────────────────────────────────────────────────────────────────────────────

/// Merge-join over two key-ordered sources.
///
/// Walks both cursors in lock-step and classifies one pair per call to
/// [`DiffIterator::next`]:
/// - equal keys: both rows are compared field by field (`same`/`modified`),
///   then both sides advance;
/// - old key first: the old row is `deleted` and only the old side advances;
/// - new key first: the new row is `added` and only the new side advances.
///
/// Rows are only read when the next diff is requested, so stopping early
/// never reads ahead. Both sources are closed when the sequence ends or the
/// first error surfaces; after that `next` keeps returning `None`.
pub struct DiffIterator {
    old: RowCursor,
    new: RowCursor,
    columns: Arc<ResolvedColumns>,
    comparer: KeyComparer,
    old_row: Option<Row>,
    new_row: Option<Row>,
    advance: Advance,
    state: EngineState,
}

impl DiffIterator {
    pub fn new(old: RowCursor, new: RowCursor, columns: Arc<ResolvedColumns>, comparer: KeyComparer) -> Self {
        Self {
            old,
            new,
            columns,
            comparer,
            old_row: None,
            new_row: None,
            advance: Advance::Both,
            state: EngineState::Running,
        }
    }

    pub fn is_exhausted(&self) -> bool {
        self.state == EngineState::Exhausted
    }

    pub fn duplication_stats(&self, side: SourceLabel) -> Option<&DuplicationStats> {
        match side {
            SourceLabel::Old => self.old.duplication_stats(),
            SourceLabel::New => self.new.duplication_stats(),
        }
    }

    /// Next classified difference, or `None` once both sides are drained.
    pub async fn next(&mut self) -> Result<Option<RowDiff>> {
        if self.is_exhausted() {
            return Ok(None);
        }
        match self.step().await {
            Ok(Some(diff)) => Ok(Some(diff)),
            Ok(None) => {
                debug!(
                    old_rows = self.old.consumed(),
                    new_rows = self.new.consumed(),
                    "both sources drained"
                );
                self.close()?;
                Ok(None)
            }
            Err(e) => {
                if let Err(close_err) = self.close() {
                    warn!(error = %close_err, "close failed after diff error");
                }
                Err(e)
            }
        }
    }

    async fn step(&mut self) -> Result<Option<RowDiff>> {
        match self.advance {
            Advance::Both => {
                self.old_row = self.old.next().await?;
                self.new_row = self.new.next().await?;
            }
            Advance::Old => self.old_row = self.old.next().await?,
            Advance::New => self.new_row = self.new.next().await?,
        }

        let delta = self.comparer.compare(self.old_row.as_ref(), self.new_row.as_ref());
        let diff = match (delta, self.old_row.take(), self.new_row.take()) {
            (_, None, None) => return Ok(None),
            (Ordering::Equal, Some(old_row), Some(new_row)) => {
                self.advance = Advance::Both;
                let modified = self.columns.is_modified(&old_row, &new_row);
                RowDiff::matched(old_row, new_row, modified)
            }
            (Ordering::Less, Some(old_row), new_row) => {
                self.new_row = new_row;
                self.advance = Advance::Old;
                RowDiff::deleted(old_row)
            }
            (_, old_row, Some(new_row)) => {
                self.old_row = old_row;
                self.advance = Advance::New;
                RowDiff::added(new_row)
            }
            (_, Some(old_row), None) => {
                self.advance = Advance::Old;
                RowDiff::deleted(old_row)
            }
        };
        Ok(Some(diff))
    }

    /// Close both sources. Safe to call more than once.
    pub fn close(&mut self) -> Result<()> {
        self.state = EngineState::Exhausted;
        self.old_row = None;
        self.new_row = None;
        let old = self.old.close();
        let new = self.new.close();
        old.and(new)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::columns::resolve_columns;
    use crate::application::source::SourceHandle;
    use crate::domain::cell::Cell;
    use crate::domain::column::{CompareWith, KeySpec};
    use crate::domain::row_diff::DiffStatus;
    use crate::domain::value_objects::{ExcludedColumns, IncludedColumns};
    use crate::infrastructure::sources::memory::MemoryRowProducer;

    fn producer(rows: &[(i64, &str)]) -> Box<MemoryRowProducer> {
        Box::new(MemoryRowProducer::new(
            vec!["id".into(), "name".into()],
            rows.iter()
                .map(|(id, name)| vec![Cell::text(id.to_string()), Cell::text(*name)])
                .collect(),
        ))
    }

    async fn engine(old: &[(i64, &str)], new: &[(i64, &str)], key: KeySpec) -> DiffIterator {
        let (old_handle, old_header) = SourceHandle::open(SourceLabel::Old, producer(old)).await.unwrap();
        let (new_handle, new_header) = SourceHandle::open(SourceLabel::New, producer(new)).await.unwrap();
        let columns = Arc::new(
            resolve_columns(
                &old_header,
                &new_header,
                &IncludedColumns::default(),
                &ExcludedColumns::default(),
                &[key],
            )
            .unwrap(),
        );
        let comparer = KeyComparer::new(columns.keys.clone()).unwrap();
        DiffIterator::new(
            RowCursor::new(old_handle, Arc::clone(&columns), comparer.clone(), None),
            RowCursor::new(new_handle, Arc::clone(&columns), comparer.clone(), None),
            columns,
            comparer,
        )
    }

    async fn statuses(engine: &mut DiffIterator) -> Vec<(DiffStatus, String)> {
        let mut out = Vec::new();
        while let Some(diff) = engine.next().await.unwrap() {
            let id = diff.current_row().unwrap()[0].to_string();
            out.push((diff.status, id));
        }
        out
    }

    #[tokio::test]
    async fn classifies_interleaved_keys() {
        let mut e = engine(
            &[(1, "a"), (2, "b"), (4, "d")],
            &[(2, "B"), (3, "c"), (4, "d"), (5, "e")],
            KeySpec::new("id").with_comparer(CompareWith::Number),
        )
        .await;
        assert_eq!(
            statuses(&mut e).await,
            vec![
                (DiffStatus::Deleted, "1".to_string()),
                (DiffStatus::Modified, "2".to_string()),
                (DiffStatus::Added, "3".to_string()),
                (DiffStatus::Same, "4".to_string()),
                (DiffStatus::Added, "5".to_string()),
            ]
        );
        assert!(e.is_exhausted());
        assert!(e.next().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn deletion_tail_is_emitted() {
        let mut e = engine(&[(1, "a"), (2, "b"), (3, "c")], &[(1, "a")], KeySpec::new("id")).await;
        let out = statuses(&mut e).await;
        assert_eq!(out.len(), 3);
        assert_eq!(out[1].0, DiffStatus::Deleted);
        assert_eq!(out[2].0, DiffStatus::Deleted);
    }

    #[tokio::test]
    async fn deltas_match_statuses() {
        let mut e = engine(&[(1, "a"), (3, "c")], &[(2, "b"), (3, "x")], KeySpec::new("id")).await;
        let mut deltas = Vec::new();
        while let Some(diff) = e.next().await.unwrap() {
            deltas.push(diff.delta);
        }
        assert_eq!(deltas, vec![-1, 1, 0]);
    }

    #[tokio::test]
    async fn unsorted_input_aborts_and_closes() {
        let mut e = engine(&[(2, "b"), (1, "a")], &[(1, "a"), (2, "b")], KeySpec::new("id")).await;
        let mut failed = false;
        for _ in 0..4 {
            match e.next().await {
                Ok(Some(_)) => continue,
                Ok(None) => break,
                Err(_) => {
                    failed = true;
                    break;
                }
            }
        }
        assert!(failed);
        assert!(e.is_exhausted());
        assert!(e.next().await.unwrap().is_none());
    }
}
