use anyhow::Result;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::application::columns::resolve_columns;
use crate::application::comparer::{KeyComparer, RowComparer};
use crate::application::duplicates::DuplicateOptions;
use crate::application::engine::DiffIterator;
use crate::application::source::{RowCursor, SourceHandle};
use crate::domain::column::KeySpec;
use crate::domain::error::DiffError;
use crate::domain::ports::{DiffFooter, DiffHeader, RowConsumer, RowProducer};
use crate::domain::row_diff::RowDiff;
use crate::domain::stats::{DiffStats, DuplicationStats};
use crate::domain::value_objects::{ExcludedColumns, IncludedColumns, SourceLabel};

/// Decides whether a diff is counted and forwarded.
pub type DiffFilter = Arc<dyn Fn(&RowDiff) -> bool + Send + Sync>;

// ─── Options ─────────────────────────────────────────────────────────────────

/// What to compare and how.
#[derive(Clone, Default)]
pub struct DiffOptions {
    pub keys: Vec<KeySpec>,
    pub included_columns: IncludedColumns,
    pub excluded_columns: ExcludedColumns,
    /// `None` turns duplicate keys into a uniqueness error.
    pub duplicates: Option<DuplicateOptions>,
    /// Replaces the per-key comparison of two present rows.
    pub row_comparer: Option<RowComparer>,
}

impl DiffOptions {
    pub fn new<K: Into<KeySpec>>(keys: impl IntoIterator<Item = K>) -> Self {
        Self {
            keys: keys.into_iter().map(Into::into).collect(),
            ..Self::default()
        }
    }

    pub fn include(mut self, columns: &[&str]) -> Self {
        self.included_columns = IncludedColumns(columns.iter().map(|c| c.to_string()).collect());
        self
    }

    pub fn exclude(mut self, columns: &[&str]) -> Self {
        self.excluded_columns = ExcludedColumns(columns.iter().map(|c| c.to_string()).collect());
        self
    }

    pub fn with_duplicates(mut self, duplicates: DuplicateOptions) -> Self {
        self.duplicates = Some(duplicates);
        self
    }

    pub fn with_row_comparer(mut self, row_comparer: RowComparer) -> Self {
        self.row_comparer = Some(row_comparer);
        self
    }
}

/// How a session is driven into a [`RowConsumer`].
#[derive(Clone, Default)]
pub struct OutputOptions {
    /// Forward `same` rows too. They are always counted.
    pub keep_same_rows: bool,
    /// Stop the session once this many changes have been counted.
    pub max_changes: Option<usize>,
    /// Diffs rejected here are neither counted nor forwarded.
    pub filter: Option<DiffFilter>,
    /// Free-form labels passed through in the consumer header.
    pub labels: BTreeMap<String, String>,
}

impl OutputOptions {
    pub fn keep_same_rows(mut self) -> Self {
        self.keep_same_rows = true;
        self
    }

    pub fn max_changes(mut self, max_changes: usize) -> Self {
        self.max_changes = Some(max_changes);
        self
    }

    pub fn filter<F>(mut self, filter: F) -> Self
    where
        F: Fn(&RowDiff) -> bool + Send + Sync + 'static,
    {
        self.filter = Some(Arc::new(filter));
        self
    }

    pub fn label(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.labels.insert(key.into(), value.into());
        self
    }

    fn limit_reached(&self, stats: &DiffStats) -> bool {
        matches!(self.max_changes, Some(max) if max > 0 && stats.total_changes >= max)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Differ
// ─────────────────────────────────────────────────────────────────────────────

/// Reusable diff configuration. Each [`Differ::start`] opens a brand-new
/// session over fresh producers.
#[derive(Clone)]
pub struct Differ {
    options: DiffOptions,
}

impl Differ {
    pub fn new(options: DiffOptions) -> Result<Self> {
        if options.keys.is_empty() {
            return Err(DiffError::NoKeys.into());
        }
        Ok(Self { options })
    }

    pub fn options(&self) -> &DiffOptions {
        &self.options
    }

    /// Open both producers, read their headers and resolve the output
    /// columns. Column and key errors surface here, before any row is read.
    #[instrument(name = "start_session", skip_all, fields(session = tracing::field::Empty))]
    pub async fn start(&self, old: Box<dyn RowProducer>, new: Box<dyn RowProducer>) -> Result<DiffSession> {
        let id = Uuid::new_v4();
        tracing::Span::current().record("session", tracing::field::display(id));

        let (old_handle, old_header) = SourceHandle::open(SourceLabel::Old, old).await?;
        let (new_handle, new_header) = SourceHandle::open(SourceLabel::New, new).await?;

        let columns = Arc::new(resolve_columns(
            &old_header,
            &new_header,
            &self.options.included_columns,
            &self.options.excluded_columns,
            &self.options.keys,
        )?);
        let comparer = KeyComparer::new(columns.keys.clone())?
            .with_row_comparer(self.options.row_comparer.clone());

        info!(
            %id,
            columns = columns.columns.len(),
            keys = %comparer.describe_order(),
            "session opened"
        );

        let names = columns.names();
        let engine = DiffIterator::new(
            RowCursor::new(
                old_handle,
                Arc::clone(&columns),
                comparer.clone(),
                self.options.duplicates.clone(),
            ),
            RowCursor::new(
                new_handle,
                Arc::clone(&columns),
                comparer.clone(),
                self.options.duplicates.clone(),
            ),
            columns,
            comparer,
        );

        Ok(DiffSession {
            id,
            state: SessionState::Opened,
            columns: names,
            engine,
            stats: DiffStats::new(),
        })
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// DiffSession
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SessionState {
    /// Headers read, no row consumed yet.
    Opened,
    Iterating,
    Closed,
}

/// One pass over two opened producers.
///
/// The diff sequence can be consumed once, either pulled with
/// [`DiffSession::next_diff`] or driven into a consumer with
/// [`DiffSession::to`]. Once it is exhausted, failed or closed, every
/// further attempt fails with [`DiffError::SessionClosed`]. Dropping the
/// session closes both producers.
pub struct DiffSession {
    id: Uuid,
    state: SessionState,
    columns: Vec<String>,
    engine: DiffIterator,
    stats: DiffStats,
}

impl DiffSession {
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Output column names, known as soon as the session is open.
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    /// Snapshot of the running statistics.
    pub fn stats(&self) -> &DiffStats {
        &self.stats
    }

    pub fn duplication_stats(&self, side: SourceLabel) -> Option<DuplicationStats> {
        self.engine.duplication_stats(side).cloned()
    }

    pub fn is_closed(&self) -> bool {
        self.state == SessionState::Closed
    }

    /// Pull the next diff. Every returned diff is counted in [`Self::stats`].
    pub async fn next_diff(&mut self) -> Result<Option<RowDiff>> {
        if self.state == SessionState::Closed {
            return Err(DiffError::SessionClosed.into());
        }
        self.state = SessionState::Iterating;

        match self.engine.next().await {
            Ok(Some(diff)) => {
                self.stats.add(&diff);
                Ok(Some(diff))
            }
            Ok(None) => {
                self.finish();
                Ok(None)
            }
            Err(e) => {
                self.state = SessionState::Closed;
                Err(e)
            }
        }
    }

    /// Pull the whole sequence into memory.
    pub async fn collect(&mut self) -> Result<Vec<RowDiff>> {
        let mut diffs = Vec::new();
        while let Some(diff) = self.next_diff().await? {
            diffs.push(diff);
        }
        Ok(diffs)
    }

    /// Drive the whole sequence into `consumer` and return the final stats.
    ///
    /// Per diff, in order: the filter decides whether it counts at all,
    /// `same` rows are forwarded only with `keep_same_rows`, and the session
    /// stops after the item that brings the change count to `max_changes`.
    /// The consumer always gets a header first and a footer last, and is
    /// closed on every exit path.
    #[instrument(name = "diff_to_consumer", skip_all, fields(session = %self.id))]
    pub async fn to(&mut self, consumer: &mut dyn RowConsumer, output: &OutputOptions) -> Result<DiffStats> {
        if self.state != SessionState::Opened {
            return Err(DiffError::SessionClosed.into());
        }
        self.state = SessionState::Iterating;

        let mut sink = ConsumerGuard::new(consumer);
        let result = self.drive(&mut sink, output).await;

        let engine_closed = self.engine.close();
        self.state = SessionState::Closed;
        let sink_closed = sink.close();

        match result {
            Ok(()) => {
                engine_closed?;
                sink_closed?;
                info!(
                    total = self.stats.total_comparisons,
                    changes = self.stats.total_changes,
                    change_percent = self.stats.change_percent,
                    "diff completed"
                );
                Ok(self.stats.clone())
            }
            Err(e) => {
                for close_err in [engine_closed.err(), sink_closed.err()].into_iter().flatten() {
                    warn!(error = %close_err, "close failed after diff error");
                }
                Err(e)
            }
        }
    }

    async fn drive(&mut self, sink: &mut ConsumerGuard<'_>, output: &OutputOptions) -> Result<()> {
        sink.consumer.open()?;
        sink.consumer.write_header(&DiffHeader {
            columns: self.columns.clone(),
            labels: output.labels.clone(),
        })?;

        while let Some(diff) = self.engine.next().await? {
            if let Some(filter) = &output.filter {
                if !filter(&diff) {
                    continue;
                }
            }
            self.stats.add(&diff);
            if diff.status.is_change() || output.keep_same_rows {
                sink.consumer.write_diff(&diff)?;
            }
            if output.limit_reached(&self.stats) {
                info!(max_changes = ?output.max_changes, "change limit reached, stopping");
                break;
            }
        }

        sink.consumer.write_footer(&DiffFooter {
            stats: self.stats.clone(),
        })
    }

    /// Close both producers. Further iteration fails with
    /// [`DiffError::SessionClosed`].
    pub fn close(&mut self) -> Result<()> {
        self.state = SessionState::Closed;
        self.engine.close()
    }

    fn finish(&mut self) {
        self.state = SessionState::Closed;
        info!(
            session = %self.id,
            total = self.stats.total_comparisons,
            changes = self.stats.total_changes,
            "diff sequence exhausted"
        );
    }
}

/// Closes the wrapped consumer exactly once, including when the driving
/// future is dropped midway.
struct ConsumerGuard<'a> {
    consumer: &'a mut dyn RowConsumer,
    closed: bool,
}

impl<'a> ConsumerGuard<'a> {
    fn new(consumer: &'a mut dyn RowConsumer) -> Self {
        Self {
            consumer,
            closed: false,
        }
    }

    fn close(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        self.consumer.close()
    }
}

impl Drop for ConsumerGuard<'_> {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            warn!(error = %e, "consumer close failed during unwind");
        }
    }
}
