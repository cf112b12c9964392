use serde::Serialize;
use std::cmp::Ordering;
use std::fmt;

use crate::domain::cell::Row;

/// Classification of one logical record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DiffStatus {
    Added,
    Deleted,
    Modified,
    Same,
}

impl DiffStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            DiffStatus::Added => "added",
            DiffStatus::Deleted => "deleted",
            DiffStatus::Modified => "modified",
            DiffStatus::Same => "same",
        }
    }

    pub fn is_change(&self) -> bool {
        !matches!(self, DiffStatus::Same)
    }
}

impl fmt::Display for DiffStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One emitted comparison between the two sides.
///
/// `delta` is the key ordering outcome: `-1` key only in old, `+1` key only
/// in new, `0` key on both sides. Rows are already projected onto the
/// output columns.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RowDiff {
    pub delta: i8,
    pub status: DiffStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub old_row: Option<Row>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub new_row: Option<Row>,
}

impl RowDiff {
    pub fn added(new_row: Row) -> Self {
        Self {
            delta: 1,
            status: DiffStatus::Added,
            old_row: None,
            new_row: Some(new_row),
        }
    }

    pub fn deleted(old_row: Row) -> Self {
        Self {
            delta: -1,
            status: DiffStatus::Deleted,
            old_row: Some(old_row),
            new_row: None,
        }
    }

    pub fn matched(old_row: Row, new_row: Row, modified: bool) -> Self {
        Self {
            delta: 0,
            status: if modified {
                DiffStatus::Modified
            } else {
                DiffStatus::Same
            },
            old_row: Some(old_row),
            new_row: Some(new_row),
        }
    }

    pub fn ordering(&self) -> Ordering {
        self.delta.cmp(&0)
    }

    /// The row that best represents the record: new values, or old ones
    /// for a deletion.
    pub fn current_row(&self) -> Option<&Row> {
        self.new_row.as_ref().or(self.old_row.as_ref())
    }
}
