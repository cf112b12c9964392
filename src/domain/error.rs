use thiserror::Error;

use crate::domain::value_objects::SourceLabel;

/// Fatal conditions raised by the diff core.
///
/// Every public operation returns `anyhow::Result`; match on a kind with
/// `err.downcast_ref::<DiffError>()`.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DiffError {
    #[error("expected at least one key column")]
    NoKeys,

    #[error("key column '{key}' not found in {side} header")]
    KeyNotFound { key: String, side: SourceLabel },

    #[error("no columns found in {side} header")]
    EmptyHeader { side: SourceLabel },

    #[error("{side} source is not sorted by [{expected}]: previous row {previous} is followed by {current}")]
    Unordered {
        side: SourceLabel,
        expected: String,
        previous: String,
        current: String,
    },

    #[error("{side} source has duplicate keys [{keys}]: previous row {previous} has the same key as {current}")]
    NotUnique {
        side: SourceLabel,
        keys: String,
        previous: String,
        current: String,
    },

    #[error("too many duplicate rows in {side} source (buffer limit is {limit})")]
    DuplicateOverflow { side: SourceLabel, limit: usize },

    #[error("diff session is closed")]
    SessionClosed,
}
