use serde::Serialize;

use crate::domain::row_diff::{DiffStatus, RowDiff};

/// Running counters over emitted differences.
///
/// Monotonic for a session and cheap to clone, so a snapshot can be taken
/// at any point for progress reporting.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DiffStats {
    pub total_comparisons: usize,
    pub added: usize,
    pub deleted: usize,
    pub modified: usize,
    pub same: usize,
    pub total_changes: usize,
    pub change_percent: f64,
}

impl DiffStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, diff: &RowDiff) {
        self.total_comparisons += 1;
        match diff.status {
            DiffStatus::Added => self.added += 1,
            DiffStatus::Deleted => self.deleted += 1,
            DiffStatus::Modified => self.modified += 1,
            DiffStatus::Same => self.same += 1,
        }
        self.total_changes = self.added + self.deleted + self.modified;
        self.change_percent = round2(self.total_changes as f64 / self.total_comparisons as f64 * 100.0);
    }

    pub fn has_changes(&self) -> bool {
        self.total_changes > 0
    }
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Per-source duplicate-key figures, collected while a duplicate policy is
/// active.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DuplicationStats {
    /// Distinct keys seen (one per run of equal keys).
    pub unique_keys: usize,
    /// Keys that occurred more than once.
    pub duplicated_keys: usize,
    /// Rows folded away by the duplicate policy.
    pub duplicate_rows: usize,
    /// Smallest run length among duplicated keys.
    pub min_duplicates_per_key: usize,
    pub max_duplicates_per_key: usize,
    pub avg_duplicates_per_key: f64,
}

impl DuplicationStats {
    /// Record one closed run of `run_len` rows sharing a key.
    pub fn record_run(&mut self, run_len: usize) {
        self.unique_keys += 1;
        if run_len < 2 {
            return;
        }
        self.duplicated_keys += 1;
        self.duplicate_rows += run_len - 1;
        if self.duplicated_keys == 1 || run_len < self.min_duplicates_per_key {
            self.min_duplicates_per_key = run_len;
        }
        self.max_duplicates_per_key = self.max_duplicates_per_key.max(run_len);
        let rows_in_runs = self.duplicate_rows + self.duplicated_keys;
        self.avg_duplicates_per_key = round2(rows_in_runs as f64 / self.duplicated_keys as f64);
    }
}
