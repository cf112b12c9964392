use serde::{Deserialize, Serialize};
use std::fmt;

/// Which of the two snapshots a row, header or error belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceLabel {
    Old,
    New,
}

impl fmt::Display for SourceLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SourceLabel::Old => f.write_str("old"),
            SourceLabel::New => f.write_str("new"),
        }
    }
}

/// Sort direction of one key column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum SortDirection {
    #[default]
    #[serde(rename = "ASC", alias = "asc")]
    Asc,
    #[serde(rename = "DESC", alias = "desc")]
    Desc,
}

impl fmt::Display for SortDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SortDirection::Asc => f.write_str("ASC"),
            SortDirection::Desc => f.write_str("DESC"),
        }
    }
}

/// List of columns to keep in the output; empty means "all of them".
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct IncludedColumns(pub Vec<String>);

impl IncludedColumns {
    pub fn allows(&self, col: &str) -> bool {
        self.0.is_empty() || self.0.iter().any(|c| c == col)
    }
}

/// List of columns to exclude from the diff (e.g., created_at, updated_at)
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ExcludedColumns(pub Vec<String>);

impl ExcludedColumns {
    pub fn contains(&self, col: &str) -> bool {
        self.0.iter().any(|c| c == col)
    }
}
