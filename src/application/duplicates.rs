use anyhow::Result;
use std::collections::VecDeque;
use std::fmt;
use std::sync::Arc;
use tracing::warn;

use crate::domain::cell::Row;
use crate::domain::error::DiffError;
use crate::domain::stats::DuplicationStats;
use crate::domain::value_objects::SourceLabel;

pub const DEFAULT_DUPLICATE_BUFFER_SIZE: usize = 1000;

/// Folds a run of rows sharing a key into one representative row.
///
/// The slice is never empty and holds at most `buffer_size` rows: under a
/// permissive overflow policy only the most recent ones.
pub type RowReducer = Arc<dyn Fn(&[Row]) -> Row + Send + Sync>;

/// How a run of same-key rows is reduced.
#[derive(Clone)]
pub enum DuplicatePolicy {
    KeepFirst,
    KeepLast,
    Custom(RowReducer),
}

impl fmt::Debug for DuplicatePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DuplicatePolicy::KeepFirst => f.write_str("KeepFirst"),
            DuplicatePolicy::KeepLast => f.write_str("KeepLast"),
            DuplicatePolicy::Custom(_) => f.write_str("Custom(..)"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct DuplicateOptions {
    pub policy: DuplicatePolicy,
    /// Longest run kept in memory.
    pub buffer_size: usize,
    /// When false, a longer run is fatal; when true, only the most recent
    /// `buffer_size` rows are kept.
    pub allow_overflow: bool,
}

impl DuplicateOptions {
    pub fn new(policy: DuplicatePolicy) -> Self {
        Self {
            policy,
            buffer_size: DEFAULT_DUPLICATE_BUFFER_SIZE,
            allow_overflow: false,
        }
    }

    pub fn keep_first() -> Self {
        Self::new(DuplicatePolicy::KeepFirst)
    }

    pub fn keep_last() -> Self {
        Self::new(DuplicatePolicy::KeepLast)
    }

    pub fn custom<F>(reducer: F) -> Self
    where
        F: Fn(&[Row]) -> Row + Send + Sync + 'static,
    {
        Self::new(DuplicatePolicy::Custom(Arc::new(reducer)))
    }

    pub fn with_buffer_size(mut self, buffer_size: usize) -> Self {
        self.buffer_size = buffer_size;
        self
    }

    pub fn with_overflow(mut self, allow_overflow: bool) -> Self {
        self.allow_overflow = allow_overflow;
        self
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// DuplicateResolver
// ─────────────────────────────────────────────────────────────────────────────

/// Buffers one run of consecutive same-key rows from one source.
///
/// Keep-first and keep-last only hold the rows they select; a custom
/// reducer gets a bounded sliding window. All policies count the run so the
/// overflow bound is enforced either way.
pub struct DuplicateResolver {
    side: SourceLabel,
    options: DuplicateOptions,
    limit: usize,
    run_len: usize,
    first: Option<Row>,
    last: Option<Row>,
    window: VecDeque<Row>,
    overflow_reported: bool,
    stats: DuplicationStats,
}

impl DuplicateResolver {
    pub fn new(side: SourceLabel, options: DuplicateOptions) -> Self {
        let limit = options.buffer_size.max(1);
        Self {
            side,
            options,
            limit,
            run_len: 0,
            first: None,
            last: None,
            window: VecDeque::new(),
            overflow_reported: false,
            stats: DuplicationStats::default(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.run_len == 0
    }

    /// Most recently buffered row; the key of the current run.
    pub fn last(&self) -> Option<&Row> {
        match self.options.policy {
            DuplicatePolicy::Custom(_) => self.window.back(),
            _ => self.last.as_ref().or(self.first.as_ref()),
        }
    }

    /// Append a row to the current run.
    pub fn push(&mut self, row: Row) -> Result<()> {
        if self.run_len >= self.limit {
            if !self.options.allow_overflow {
                return Err(DiffError::DuplicateOverflow {
                    side: self.side,
                    limit: self.limit,
                }
                .into());
            }
            if !self.overflow_reported {
                warn!(source = %self.side, limit = self.limit, "duplicate buffer full, dropping oldest rows of the run");
                self.overflow_reported = true;
            }
        }
        self.run_len += 1;

        match self.options.policy {
            DuplicatePolicy::KeepFirst | DuplicatePolicy::KeepLast => {
                if self.first.is_none() {
                    self.first = Some(row);
                } else {
                    self.last = Some(row);
                }
            }
            DuplicatePolicy::Custom(_) => {
                if self.window.len() >= self.limit {
                    self.window.pop_front();
                }
                self.window.push_back(row);
            }
        }
        Ok(())
    }

    /// Close the current run and return its representative row.
    pub fn finish(&mut self) -> Option<Row> {
        if self.run_len == 0 {
            return None;
        }
        self.stats.record_run(self.run_len);
        self.run_len = 0;
        self.overflow_reported = false;

        let first = self.first.take();
        let last = self.last.take();
        match &self.options.policy {
            DuplicatePolicy::KeepFirst => first,
            DuplicatePolicy::KeepLast => last.or(first),
            DuplicatePolicy::Custom(reducer) => {
                let run: Vec<Row> = self.window.drain(..).collect();
                if run.len() == 1 {
                    run.into_iter().next()
                } else {
                    Some(reducer(&run))
                }
            }
        }
    }

    pub fn stats(&self) -> &DuplicationStats {
        &self.stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::cell::Cell;

    fn row(id: i64, name: &str) -> Row {
        vec![Cell::from(id), Cell::text(name)]
    }

    fn run(resolver: &mut DuplicateResolver, rows: Vec<Row>) -> Result<Option<Row>> {
        for r in rows {
            resolver.push(r)?;
        }
        Ok(resolver.finish())
    }

    #[test]
    fn keep_first_selects_first_row() {
        let mut r = DuplicateResolver::new(SourceLabel::Old, DuplicateOptions::keep_first());
        let out = run(&mut r, vec![row(3, "dave"), row(3, "dave bis"), row(3, "dave ter")]).unwrap();
        assert_eq!(out, Some(row(3, "dave")));
        assert!(r.is_empty());
    }

    #[test]
    fn keep_last_selects_last_row() {
        let mut r = DuplicateResolver::new(SourceLabel::Old, DuplicateOptions::keep_last());
        let out = run(&mut r, vec![row(3, "dave"), row(3, "dave bis")]).unwrap();
        assert_eq!(out, Some(row(3, "dave bis")));
    }

    #[test]
    fn single_row_run_passes_through() {
        let mut r = DuplicateResolver::new(
            SourceLabel::New,
            DuplicateOptions::custom(|_| panic!("reducer must not run for a single row")),
        );
        assert_eq!(run(&mut r, vec![row(1, "john")]).unwrap(), Some(row(1, "john")));
    }

    #[test]
    fn finish_on_empty_run_returns_none() {
        let mut r = DuplicateResolver::new(SourceLabel::New, DuplicateOptions::keep_last());
        assert_eq!(r.finish(), None);
    }

    #[test]
    fn custom_reducer_sees_the_whole_run() {
        let mut r = DuplicateResolver::new(
            SourceLabel::Old,
            DuplicateOptions::custom(|rows| {
                let names: Vec<String> = rows.iter().map(|r| r[1].to_string()).collect();
                vec![rows[0][0].clone(), Cell::text(names.join("+"))]
            }),
        );
        let out = run(&mut r, vec![row(1, "a"), row(1, "b"), row(1, "c")]).unwrap();
        assert_eq!(out, Some(vec![Cell::from(1i64), Cell::text("a+b+c")]));
    }

    #[test]
    fn overflow_is_fatal_by_default() {
        let mut r = DuplicateResolver::new(
            SourceLabel::New,
            DuplicateOptions::keep_last().with_buffer_size(10),
        );
        let rows = (0..100).map(|i| row(1, &i.to_string())).collect();
        let err = run(&mut r, rows).unwrap_err();
        assert_eq!(
            err.downcast_ref::<DiffError>(),
            Some(&DiffError::DuplicateOverflow { side: SourceLabel::New, limit: 10 })
        );
    }

    #[test]
    fn permitted_overflow_keeps_last_rows_only() {
        let mut r = DuplicateResolver::new(
            SourceLabel::Old,
            DuplicateOptions::custom(|rows| {
                assert_eq!(rows.len(), 10);
                vec![Cell::from(rows.len() as i64), rows[0][1].clone()]
            })
            .with_buffer_size(10)
            .with_overflow(true),
        );
        let rows = (0..100).map(|i| row(1, &i.to_string())).collect();
        let out = run(&mut r, rows).unwrap().unwrap();
        assert_eq!(out, vec![Cell::from(10i64), Cell::text("90")]);
        assert_eq!(r.stats().duplicate_rows, 99);
        assert_eq!(r.stats().max_duplicates_per_key, 100);
    }

    #[test]
    fn last_tracks_the_run_key() {
        let mut r = DuplicateResolver::new(SourceLabel::Old, DuplicateOptions::keep_first());
        assert!(r.last().is_none());
        r.push(row(2, "x")).unwrap();
        assert_eq!(r.last(), Some(&row(2, "x")));
        r.push(row(2, "y")).unwrap();
        assert_eq!(r.last(), Some(&row(2, "y")));
    }
}
