use anyhow::Result;
use std::cmp::Ordering;
use std::sync::Arc;

use crate::domain::cell::{Cell, Row};
use crate::domain::column::{CompareWith, KeyColumn};
use crate::domain::error::DiffError;
use crate::domain::value_objects::SortDirection;

/// Replaces the composite key comparison for two present rows.
///
/// Absent-row handling stays in [`KeyComparer`]; the override only ever sees
/// rows that exist.
pub type RowComparer = Arc<dyn Fn(&[KeyColumn], &Row, &Row) -> Ordering + Send + Sync>;

static NULL: Cell = Cell::Null;

// ─── Cell comparers ──────────────────────────────────────────────────────────

/// Numbers and booleans compare numerically, everything else by code point.
/// Never locale-aware, so it agrees with exports sorted by a database.
pub fn default_compare(a: &Cell, b: &Cell) -> Ordering {
    if let (Some(x), Some(y)) = (a.as_number(), b.as_number()) {
        return x.total_cmp(&y);
    }
    string_compare(a, b)
}

pub fn string_compare(a: &Cell, b: &Cell) -> Ordering {
    match (a, b) {
        (Cell::Text(x), Cell::Text(y)) => x.as_str().cmp(y.as_str()),
        _ => a.to_string().cmp(&b.to_string()),
    }
}

/// Compare as numbers. Equal textual forms short-circuit without parsing;
/// values that fail to parse sort before values that parse.
pub fn number_compare(a: &Cell, b: &Cell) -> Ordering {
    if let (Cell::Text(x), Cell::Text(y)) = (a, b) {
        if x == y {
            return Ordering::Equal;
        }
    }
    match (parse_number(a), parse_number(b)) {
        (Some(x), Some(y)) => x.total_cmp(&y),
        (None, Some(_)) => Ordering::Less,
        (Some(_), None) => Ordering::Greater,
        (None, None) => string_compare(a, b),
    }
}

fn parse_number(cell: &Cell) -> Option<f64> {
    match cell {
        Cell::Text(s) => s.trim().parse::<f64>().ok().filter(|n| !n.is_nan()),
        other => other.as_number(),
    }
}

impl CompareWith {
    pub fn compare(&self, a: &Cell, b: &Cell) -> Ordering {
        match self {
            CompareWith::Default => default_compare(a, b),
            CompareWith::String => string_compare(a, b),
            CompareWith::Number => number_compare(a, b),
            CompareWith::Custom(f) => f(a, b),
        }
    }
}

// ─── Composite key comparer ──────────────────────────────────────────────────

/// Orders rows by one or more key columns, each with its own comparer and
/// direction. The first non-equal key wins.
#[derive(Clone)]
pub struct KeyComparer {
    keys: Arc<[KeyColumn]>,
    row_comparer: Option<RowComparer>,
}

impl KeyComparer {
    pub fn new(keys: Vec<KeyColumn>) -> Result<Self> {
        if keys.is_empty() {
            return Err(DiffError::NoKeys.into());
        }
        Ok(Self {
            keys: keys.into(),
            row_comparer: None,
        })
    }

    pub fn with_row_comparer(mut self, row_comparer: Option<RowComparer>) -> Self {
        self.row_comparer = row_comparer;
        self
    }

    pub fn keys(&self) -> &[KeyColumn] {
        &self.keys
    }

    /// Compare two possibly absent rows.
    ///
    /// An absent row sorts after any present row, whatever the key
    /// directions: `(Some, None)` is `Less` (deletion tail) and `(None, Some)`
    /// is `Greater` (addition tail).
    pub fn compare(&self, a: Option<&Row>, b: Option<&Row>) -> Ordering {
        match (a, b) {
            (None, None) => Ordering::Equal,
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (Some(a), Some(b)) => self.compare_rows(a, b),
        }
    }

    pub fn compare_rows(&self, a: &Row, b: &Row) -> Ordering {
        if let Some(f) = &self.row_comparer {
            return f(&self.keys, a, b);
        }
        for key in self.keys.iter() {
            let x = a.get(key.index).unwrap_or(&NULL);
            let y = b.get(key.index).unwrap_or(&NULL);
            let ord = key.comparer.compare(x, y);
            let ord = match key.direction {
                SortDirection::Asc => ord,
                SortDirection::Desc => ord.reverse(),
            };
            if ord != Ordering::Equal {
                return ord;
            }
        }
        Ordering::Equal
    }

    /// `"ID ASC, NAME DESC"`
    pub fn describe_order(&self) -> String {
        self.keys
            .iter()
            .map(KeyColumn::describe)
            .collect::<Vec<_>>()
            .join(", ")
    }

    /// `"ID, NAME"`
    pub fn describe_keys(&self) -> String {
        self.keys
            .iter()
            .map(|k| k.name.as_str())
            .collect::<Vec<_>>()
            .join(", ")
    }
}
