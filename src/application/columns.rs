use anyhow::Result;
use std::collections::HashMap;

use crate::domain::cell::{Cell, Row};
use crate::domain::column::{Column, KeyColumn, KeySpec};
use crate::domain::error::DiffError;
use crate::domain::value_objects::{ExcludedColumns, IncludedColumns, SourceLabel};

// ─────────────────────────────────────────────────────────────────────────────
// Column resolution
// ─────────────────────────────────────────────────────────────────────────────

/// Output columns and keys computed once per session from both headers.
///
/// Rows read from either side are projected onto `columns` right after they
/// are read, so everything downstream (key comparison, ordering checks,
/// field comparison, consumers) works on one positional layout.
#[derive(Debug, Clone)]
pub struct ResolvedColumns {
    pub columns: Vec<Column>,
    pub keys: Vec<KeyColumn>,
    old_reindex: bool,
    new_reindex: bool,
}

/// Reconcile the two headers into the projected output column list.
///
/// Output columns follow the new header's order, filtered by `included`
/// (empty keeps everything) and `excluded` (wins over `included`). Columns
/// that only exist in the old header are dropped. Every key must resolve on
/// both sides.
pub fn resolve_columns(
    old_header: &[String],
    new_header: &[String],
    included: &IncludedColumns,
    excluded: &ExcludedColumns,
    key_specs: &[KeySpec],
) -> Result<ResolvedColumns> {
    if old_header.is_empty() {
        return Err(DiffError::EmptyHeader { side: SourceLabel::Old }.into());
    }
    if new_header.is_empty() {
        return Err(DiffError::EmptyHeader { side: SourceLabel::New }.into());
    }
    if key_specs.is_empty() {
        return Err(DiffError::NoKeys.into());
    }

    let old_positions = positions(old_header);
    let columns: Vec<Column> = new_header
        .iter()
        .enumerate()
        .filter(|(_, name)| included.allows(name) && !excluded.contains(name))
        .map(|(new_index, name)| Column {
            name: name.clone(),
            old_index: old_positions.get(name.as_str()).copied(),
            new_index: Some(new_index),
        })
        .collect();

    let mut keys = Vec::with_capacity(key_specs.len());
    for spec in key_specs {
        let (index, column) = columns
            .iter()
            .enumerate()
            .find(|(_, c)| c.name == spec.name)
            .ok_or_else(|| DiffError::KeyNotFound {
                key: spec.name.clone(),
                side: SourceLabel::New,
            })?;
        if column.old_index.is_none() {
            return Err(DiffError::KeyNotFound {
                key: spec.name.clone(),
                side: SourceLabel::Old,
            }
            .into());
        }
        keys.push(KeyColumn {
            name: spec.name.clone(),
            index,
            comparer: spec.comparer.clone(),
            direction: spec.direction,
        });
    }

    let old_reindex = needs_reindex(&columns, old_header.len(), |c| c.old_index);
    let new_reindex = needs_reindex(&columns, new_header.len(), |c| c.new_index);

    Ok(ResolvedColumns {
        columns,
        keys,
        old_reindex,
        new_reindex,
    })
}

/// First position wins when a header repeats a name.
fn positions(header: &[String]) -> HashMap<&str, usize> {
    let mut map = HashMap::with_capacity(header.len());
    for (i, name) in header.iter().enumerate() {
        map.entry(name.as_str()).or_insert(i);
    }
    map
}

fn needs_reindex(columns: &[Column], header_len: usize, index: impl Fn(&Column) -> Option<usize>) -> bool {
    columns.len() != header_len
        || columns
            .iter()
            .enumerate()
            .any(|(i, c)| index(c) != Some(i))
}

impl ResolvedColumns {
    pub fn names(&self) -> Vec<String> {
        self.columns.iter().map(|c| c.name.clone()).collect()
    }

    pub fn is_key(&self, index: usize) -> bool {
        self.keys.iter().any(|k| k.index == index)
    }

    /// Whether rows from `side` must be rebuilt column by column.
    pub fn needs_reindex(&self, side: SourceLabel) -> bool {
        match side {
            SourceLabel::Old => self.old_reindex,
            SourceLabel::New => self.new_reindex,
        }
    }

    /// Map a raw row from `side` onto the output columns. Missing cells
    /// become `Cell::Null`.
    pub fn project(&self, side: SourceLabel, mut row: Row) -> Row {
        if !self.needs_reindex(side) {
            row.resize(self.columns.len(), Cell::Null);
            return row;
        }
        self.columns
            .iter()
            .map(|c| {
                let index = match side {
                    SourceLabel::Old => c.old_index,
                    SourceLabel::New => c.new_index,
                };
                index
                    .and_then(|i| row.get(i).cloned())
                    .unwrap_or_default()
            })
            .collect()
    }

    /// Compare the non-key columns of two projected rows sharing a key.
    ///
    /// A column the old header lacks always counts as a change.
    pub fn is_modified(&self, old_row: &Row, new_row: &Row) -> bool {
        self.columns.iter().enumerate().any(|(i, c)| {
            if self.is_key(i) {
                return false;
            }
            if c.old_index.is_none() {
                return true;
            }
            match (old_row.get(i), new_row.get(i)) {
                (Some(a), Some(b)) => !a.same_as(b),
                (Some(a), None) | (None, Some(a)) => !a.same_as(&Cell::Null),
                (None, None) => false,
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::value_objects::SortDirection;

    fn header(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    fn keys(names: &[&str]) -> Vec<KeySpec> {
        names.iter().map(|n| KeySpec::new(*n)).collect()
    }

    fn resolve(old: &[&str], new: &[&str], key_names: &[&str]) -> Result<ResolvedColumns> {
        resolve_columns(
            &header(old),
            &header(new),
            &IncludedColumns::default(),
            &ExcludedColumns::default(),
            &keys(key_names),
        )
    }

    fn kind(err: anyhow::Error) -> DiffError {
        err.downcast_ref::<DiffError>().cloned().unwrap()
    }

    #[test]
    fn identical_headers_need_no_reindex() {
        let r = resolve(&["id", "name"], &["id", "name"], &["id"]).unwrap();
        assert_eq!(r.names(), header(&["id", "name"]));
        assert!(!r.needs_reindex(SourceLabel::Old));
        assert!(!r.needs_reindex(SourceLabel::New));
        assert_eq!(r.keys[0].index, 0);
    }

    #[test]
    fn output_follows_new_header_and_maps_old_positions() {
        let r = resolve(&["name", "id", "legacy"], &["id", "name", "email"], &["id"]).unwrap();
        assert_eq!(r.names(), header(&["id", "name", "email"]));
        assert_eq!(r.columns[0].old_index, Some(1));
        assert_eq!(r.columns[1].old_index, Some(0));
        assert_eq!(r.columns[2].old_index, None);
        assert!(r.needs_reindex(SourceLabel::Old));
        assert!(!r.needs_reindex(SourceLabel::New));
    }

    #[test]
    fn exclude_wins_over_include() {
        let r = resolve_columns(
            &header(&["id", "a", "b", "c"]),
            &header(&["id", "a", "b", "c"]),
            &IncludedColumns(header(&["id", "a", "b"])),
            &ExcludedColumns(header(&["b"])),
            &keys(&["id"]),
        )
        .unwrap();
        assert_eq!(r.names(), header(&["id", "a"]));
        assert!(r.needs_reindex(SourceLabel::Old));
    }

    #[test]
    fn empty_headers_are_rejected() {
        assert_eq!(
            kind(resolve(&[], &["id"], &["id"]).err().unwrap()),
            DiffError::EmptyHeader { side: SourceLabel::Old }
        );
        assert_eq!(
            kind(resolve(&["id"], &[], &["id"]).err().unwrap()),
            DiffError::EmptyHeader { side: SourceLabel::New }
        );
    }

    #[test]
    fn missing_keys_name_the_side() {
        assert_eq!(
            kind(resolve(&["id"], &["id", "code"], &["code"]).err().unwrap()),
            DiffError::KeyNotFound { key: "code".into(), side: SourceLabel::Old }
        );
        assert_eq!(
            kind(resolve(&["id", "code"], &["id"], &["code"]).err().unwrap()),
            DiffError::KeyNotFound { key: "code".into(), side: SourceLabel::New }
        );
        assert_eq!(kind(resolve(&["id"], &["id"], &[]).err().unwrap()), DiffError::NoKeys);
    }

    #[test]
    fn keys_keep_their_direction_and_order() {
        let specs = vec![KeySpec::new("b").descending(), KeySpec::new("a")];
        let r = resolve_columns(
            &header(&["a", "b"]),
            &header(&["a", "b"]),
            &IncludedColumns::default(),
            &ExcludedColumns::default(),
            &specs,
        )
        .unwrap();
        assert_eq!(r.keys[0].name, "b");
        assert_eq!(r.keys[0].index, 1);
        assert_eq!(r.keys[0].direction, SortDirection::Desc);
        assert_eq!(r.keys[1].index, 0);
    }

    #[test]
    fn projection_pads_reorders_and_drops() {
        let r = resolve(&["name", "id", "legacy"], &["id", "name", "email"], &["id"]).unwrap();
        let old = r.project(SourceLabel::Old, vec!["john".into(), "1".into(), "x".into()]);
        assert_eq!(old, vec![Cell::text("1"), Cell::text("john"), Cell::Null]);

        let new = r.project(SourceLabel::New, vec!["1".into()]);
        assert_eq!(new, vec![Cell::text("1"), Cell::Null, Cell::Null]);
    }

    #[test]
    fn column_only_in_new_forces_modified() {
        let r = resolve(&["id", "name"], &["id", "name", "email"], &["id"]).unwrap();
        let old = r.project(SourceLabel::Old, vec!["1".into(), "john".into()]);
        let new = r.project(SourceLabel::New, vec!["1".into(), "john".into(), "".into()]);
        assert!(r.is_modified(&old, &new));
    }

    #[test]
    fn column_only_in_old_is_ignored() {
        let r = resolve(&["id", "name", "legacy"], &["id", "name"], &["id"]).unwrap();
        let old = r.project(SourceLabel::Old, vec!["1".into(), "john".into(), "zzz".into()]);
        let new = r.project(SourceLabel::New, vec!["1".into(), "john".into()]);
        assert!(!r.is_modified(&old, &new));
    }

    #[test]
    fn key_columns_are_not_compared_as_fields() {
        let specs = vec![KeySpec::new("id").with_comparer(crate::domain::column::CompareWith::Number)];
        let r = resolve_columns(
            &header(&["id", "v"]),
            &header(&["id", "v"]),
            &IncludedColumns::default(),
            &ExcludedColumns::default(),
            &specs,
        )
        .unwrap();
        assert!(!r.is_modified(&vec!["1.0".into(), "a".into()], &vec!["1".into(), "a".into()]));
        assert!(r.is_modified(&vec!["1".into(), "a".into()], &vec!["1".into(), "b".into()]));
    }
}
