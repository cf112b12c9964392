use anyhow::Result;
use std::cmp::Ordering;

use crate::application::comparer::KeyComparer;
use crate::domain::cell::{format_row, Row};
use crate::domain::error::DiffError;
use crate::domain::value_objects::SourceLabel;

/// Check that `current` may follow `previous` within one source.
///
/// Called once per side for every pair of rows actually consumed from that
/// side. Out-of-order rows fail with [`DiffError::Unordered`]; equal keys
/// fail with [`DiffError::NotUnique`]. When a duplicate policy is active the
/// resolver has already folded equal keys, so equality never reaches here.
pub fn check_order(
    side: SourceLabel,
    comparer: &KeyComparer,
    previous: Option<&Row>,
    current: Option<&Row>,
) -> Result<()> {
    let (previous, current) = match (previous, current) {
        (Some(p), Some(c)) => (p, c),
        _ => return Ok(()),
    };
    if std::ptr::eq(previous, current) {
        return Ok(());
    }

    match comparer.compare_rows(previous, current) {
        Ordering::Less => Ok(()),
        Ordering::Greater => Err(DiffError::Unordered {
            side,
            expected: comparer.describe_order(),
            previous: format_row(previous),
            current: format_row(current),
        }
        .into()),
        Ordering::Equal => Err(DiffError::NotUnique {
            side,
            keys: comparer.describe_keys(),
            previous: format_row(previous),
            current: format_row(current),
        }
        .into()),
    }
}
