use serde::{Deserialize, Serialize};
use std::fmt;

/// One field value, as produced by a row codec.
///
/// Absent values (a short row, or a column the row's side does not have) are
/// always represented as [`Cell::Null`], both for comparisons and for what is
/// handed to consumers, so nothing changes when the output is re-read.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Cell {
    #[default]
    Null,
    Bool(bool),
    Number(f64),
    Text(String),
}

/// One record from one side, positional.
pub type Row = Vec<Cell>;

impl Cell {
    pub fn text(s: impl Into<String>) -> Self {
        Cell::Text(s.into())
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Cell::Null)
    }

    /// Numeric view of the cell, for numbers and booleans only.
    pub fn as_number(&self) -> Option<f64> {
        match self {
            Cell::Number(n) => Some(*n),
            Cell::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
            _ => None,
        }
    }

    /// Field-level equality used to classify `same` vs `modified`.
    ///
    /// `Null` and the empty string are the same value: a CSV export cannot
    /// tell them apart.
    pub fn same_as(&self, other: &Cell) -> bool {
        match (self, other) {
            (Cell::Null, Cell::Text(s)) | (Cell::Text(s), Cell::Null) => s.is_empty(),
            (a, b) => match (a.as_number(), b.as_number()) {
                (Some(x), Some(y)) => x == y,
                _ => a == b,
            },
        }
    }
}

impl fmt::Display for Cell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Cell::Null => Ok(()),
            Cell::Bool(b) => b.fmt(f),
            Cell::Number(n) => n.fmt(f),
            Cell::Text(s) => s.fmt(f),
        }
    }
}

impl From<&str> for Cell {
    fn from(s: &str) -> Self {
        Cell::Text(s.to_string())
    }
}

impl From<String> for Cell {
    fn from(s: String) -> Self {
        Cell::Text(s)
    }
}

impl From<f64> for Cell {
    fn from(n: f64) -> Self {
        Cell::Number(n)
    }
}

impl From<i64> for Cell {
    fn from(n: i64) -> Self {
        Cell::Number(n as f64)
    }
}

impl From<bool> for Cell {
    fn from(b: bool) -> Self {
        Cell::Bool(b)
    }
}

/// Render a row the way error messages quote it: `[1,"john",33]`.
pub fn format_row(row: &[Cell]) -> String {
    serde_json::to_string(row).unwrap_or_default()
}
