use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::sync::Arc;

use crate::domain::cell::Cell;
use crate::domain::value_objects::SortDirection;

/// User-supplied ordering of two cells of the same key column.
pub type CellComparer = Arc<dyn Fn(&Cell, &Cell) -> Ordering + Send + Sync>;

/// Named comparers selectable from configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ComparerKind {
    /// Numbers and booleans numerically, everything else by code point.
    #[default]
    Default,
    /// Code-point ordering of the textual form.
    String,
    /// Parse both sides as numbers; unparseable values sort first.
    Number,
}

/// How the cells of one key column are ordered.
#[derive(Clone, Default)]
pub enum CompareWith {
    #[default]
    Default,
    String,
    Number,
    Custom(CellComparer),
}

impl fmt::Debug for CompareWith {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CompareWith::Default => f.write_str("Default"),
            CompareWith::String => f.write_str("String"),
            CompareWith::Number => f.write_str("Number"),
            CompareWith::Custom(_) => f.write_str("Custom(..)"),
        }
    }
}

impl From<ComparerKind> for CompareWith {
    fn from(kind: ComparerKind) -> Self {
        match kind {
            ComparerKind::Default => CompareWith::Default,
            ComparerKind::String => CompareWith::String,
            ComparerKind::Number => CompareWith::Number,
        }
    }
}

/// A configured key: the column name plus how to order it.
#[derive(Debug, Clone)]
pub struct KeySpec {
    pub name: String,
    pub comparer: CompareWith,
    pub direction: SortDirection,
}

impl KeySpec {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            comparer: CompareWith::Default,
            direction: SortDirection::Asc,
        }
    }

    pub fn descending(mut self) -> Self {
        self.direction = SortDirection::Desc;
        self
    }

    pub fn with_comparer(mut self, comparer: impl Into<CompareWith>) -> Self {
        self.comparer = comparer.into();
        self
    }

    pub fn with_custom_comparer<F>(self, f: F) -> Self
    where
        F: Fn(&Cell, &Cell) -> Ordering + Send + Sync + 'static,
    {
        self.with_comparer(CompareWith::Custom(Arc::new(f)))
    }
}

impl From<&str> for KeySpec {
    fn from(name: &str) -> Self {
        KeySpec::new(name)
    }
}

/// One projected output column and where it lives on each side.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Column {
    pub name: String,
    /// Position in the old header, `None` when the old side lacks it.
    pub old_index: Option<usize>,
    /// Position in the new header. Always present for output columns.
    pub new_index: Option<usize>,
}

/// A key column, addressed by its position in the projected output row.
#[derive(Debug, Clone)]
pub struct KeyColumn {
    pub name: String,
    pub index: usize,
    pub comparer: CompareWith,
    pub direction: SortDirection,
}

impl KeyColumn {
    /// `"ID ASC"`, as quoted by ordering errors.
    pub fn describe(&self) -> String {
        format!("{} {}", self.name, self.direction)
    }
}
