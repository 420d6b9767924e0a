//! Per-column search index.
//!
//! The index is an associative value → row-set structure kept in lock-step
//! with its column. Its update discipline is the load-bearing part of the
//! column contracts:
//!
//! - `set` runs against the index *before* the column, so the index can
//!   still locate the old value (and so a uniqueness violation aborts
//!   before any data mutation).
//! - `insert` runs against the column first, then the index.
//! - `erase` runs against the index first.
//! - `move_last_over` erases the overwritten row with `is_last = true`
//!   (no shifting of subsequent rows) and then rewrites the moved value's
//!   row through `update_ref`.
//!
//! The structure itself is in-memory and rebuilt from column content on
//! accessor refresh; the columns block still reserves the slot after the
//! column root for it, which is what the refresh protocol keys off.

use std::collections::BTreeMap;

use colonnade_error::{Result, StoreError};

/// An indexable value.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum IndexKey {
    Null,
    Int(i64),
    Bytes(Vec<u8>),
}

impl IndexKey {
    /// Key for an optional byte string.
    pub fn from_bytes(value: Option<&[u8]>) -> Self {
        match value {
            None => Self::Null,
            Some(b) => Self::Bytes(b.to_vec()),
        }
    }

    /// Key for an optional UTF-8 string.
    pub fn from_str_opt(value: Option<&str>) -> Self {
        Self::from_bytes(value.map(str::as_bytes))
    }
}

/// Value → ordered row set, with a row → value mirror for O(1) reverse
/// lookup during `set`/`erase`.
#[derive(Debug, Default)]
pub struct SearchIndex {
    allow_duplicates: bool,
    by_value: BTreeMap<IndexKey, Vec<usize>>,
    by_row: Vec<Option<IndexKey>>,
    ndx_in_parent: usize,
}

impl SearchIndex {
    /// Create an empty index.
    pub fn new(allow_duplicates: bool) -> Self {
        Self {
            allow_duplicates,
            ..Self::default()
        }
    }

    /// Number of indexed rows.
    pub fn len(&self) -> usize {
        self.by_row.len()
    }

    /// Whether no rows are indexed.
    pub fn is_empty(&self) -> bool {
        self.by_row.is_empty()
    }

    /// Whether the index rejects duplicate values.
    pub fn allows_duplicates(&self) -> bool {
        self.allow_duplicates
    }

    /// Slot position of this index within the table's columns block
    /// (always the slot directly after its column's root).
    pub fn ndx_in_parent(&self) -> usize {
        self.ndx_in_parent
    }

    pub fn set_ndx_in_parent(&mut self, ndx: usize) {
        self.ndx_in_parent = ndx;
    }

    fn check_unique(&self, key: &IndexKey, ignore_row: Option<usize>, at_row: usize) -> Result<()> {
        if self.allow_duplicates {
            return Ok(());
        }
        if let Some(rows) = self.by_value.get(key) {
            let occupied = match ignore_row {
                None => !rows.is_empty(),
                Some(skip) => rows.iter().any(|&r| r != skip),
            };
            if occupied {
                return Err(StoreError::UniqueViolation { row: at_row });
            }
        }
        Ok(())
    }

    fn shift_rows_ge(&mut self, threshold: usize, delta: isize) {
        for rows in self.by_value.values_mut() {
            for r in rows.iter_mut() {
                if *r >= threshold {
                    *r = (*r as isize + delta) as usize;
                }
            }
        }
    }

    /// Record `count` new rows holding `key`, starting at `row`. When
    /// `is_append` is false, subsequent rows shift up to make room.
    ///
    /// Uniqueness is checked before any mutation, so a constraint failure
    /// leaves both index and column untouched.
    pub fn insert(&mut self, row: usize, key: IndexKey, count: usize, is_append: bool) -> Result<()> {
        if count == 0 {
            return Ok(());
        }
        self.check_unique(&key, None, row)?;
        if !self.allow_duplicates && count > 1 {
            return Err(StoreError::UniqueViolation { row });
        }
        if !is_append {
            self.shift_rows_ge(row, count as isize);
        }
        let rows = self.by_value.entry(key.clone()).or_default();
        for i in 0..count {
            let pos = rows.partition_point(|&r| r < row + i);
            rows.insert(pos, row + i);
        }
        self.by_row
            .splice(row..row, std::iter::repeat(Some(key)).take(count));
        Ok(())
    }

    /// Remove the entry for `row`. With `is_last` set, subsequent rows are
    /// not shifted (used when erasing the final row, and by
    /// `move_last_over` before `update_ref` repoints the moved value).
    pub fn erase(&mut self, row: usize, is_last: bool) {
        let Some(key) = self.by_row.get_mut(row).and_then(Option::take) else {
            return;
        };
        if let Some(rows) = self.by_value.get_mut(&key) {
            rows.retain(|&r| r != row);
            if rows.is_empty() {
                self.by_value.remove(&key);
            }
        }
        if is_last {
            if row + 1 == self.by_row.len() {
                self.by_row.pop();
            }
            // Otherwise the slot stays vacant until update_ref fills it.
        } else {
            self.by_row.remove(row);
            self.shift_rows_ge(row + 1, -1);
        }
    }

    /// Change the value recorded for `row`. The uniqueness check runs
    /// before any mutation.
    pub fn set(&mut self, row: usize, key: IndexKey) -> Result<()> {
        self.check_unique(&key, Some(row), row)?;
        let old = self.by_row.get_mut(row).and_then(Option::take);
        if let Some(old_key) = old {
            if let Some(rows) = self.by_value.get_mut(&old_key) {
                rows.retain(|&r| r != row);
                if rows.is_empty() {
                    self.by_value.remove(&old_key);
                }
            }
        }
        let rows = self.by_value.entry(key.clone()).or_default();
        let pos = rows.partition_point(|&r| r < row);
        rows.insert(pos, row);
        self.by_row[row] = Some(key);
        Ok(())
    }

    /// Re-point the entry holding `key` from `old_row` to `new_row`.
    pub fn update_ref(&mut self, key: &IndexKey, old_row: usize, new_row: usize) {
        if let Some(rows) = self.by_value.get_mut(key) {
            rows.retain(|&r| r != old_row);
            let pos = rows.partition_point(|&r| r < new_row);
            rows.insert(pos, new_row);
        }
        self.by_row[new_row] = Some(key.clone());
        if old_row + 1 == self.by_row.len() {
            self.by_row.pop();
        } else if old_row != new_row {
            self.by_row[old_row] = None;
        }
    }

    /// Smallest row holding `key`.
    pub fn find_first(&self, key: &IndexKey) -> Option<usize> {
        self.by_value.get(key).and_then(|rows| rows.first().copied())
    }

    /// All rows holding `key`, ascending.
    pub fn find_all(&self, key: &IndexKey) -> Vec<usize> {
        self.by_value.get(key).cloned().unwrap_or_default()
    }

    /// Borrowed view of the rows holding `key` (the no-copy variant).
    pub fn find_all_rows(&self, key: &IndexKey) -> Option<&[usize]> {
        self.by_value.get(key).map(Vec::as_slice)
    }

    /// Number of rows holding `key`.
    pub fn count(&self, key: &IndexKey) -> usize {
        self.by_value.get(key).map_or(0, Vec::len)
    }

    /// Drop all entries.
    pub fn clear(&mut self) {
        self.by_value.clear();
        self.by_row.clear();
    }

    /// Rebuild from column content; used by the accessor refresh protocol.
    pub fn rebuild<I: IntoIterator<Item = IndexKey>>(&mut self, keys: I) -> Result<()> {
        self.clear();
        for (row, key) in keys.into_iter().enumerate() {
            self.insert(row, key, 1, true)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn int(v: i64) -> IndexKey {
        IndexKey::Int(v)
    }

    #[test]
    fn insert_and_find() {
        let mut idx = SearchIndex::new(true);
        idx.insert(0, int(10), 1, true).unwrap();
        idx.insert(1, int(20), 1, true).unwrap();
        idx.insert(2, int(10), 1, true).unwrap();

        assert_eq!(idx.find_first(&int(10)), Some(0));
        assert_eq!(idx.find_all(&int(10)), vec![0, 2]);
        assert_eq!(idx.count(&int(10)), 2);
        assert_eq!(idx.count(&int(20)), 1);
        assert_eq!(idx.find_first(&int(99)), None);
    }

    #[test]
    fn mid_insert_shifts_rows() {
        let mut idx = SearchIndex::new(true);
        idx.insert(0, int(1), 1, true).unwrap();
        idx.insert(1, int(2), 1, true).unwrap();
        // Insert between them.
        idx.insert(1, int(9), 1, false).unwrap();
        assert_eq!(idx.find_first(&int(1)), Some(0));
        assert_eq!(idx.find_first(&int(9)), Some(1));
        assert_eq!(idx.find_first(&int(2)), Some(2));
    }

    #[test]
    fn erase_shifts_unless_last() {
        let mut idx = SearchIndex::new(true);
        for (row, v) in [1, 2, 3].into_iter().enumerate() {
            idx.insert(row, int(v), 1, true).unwrap();
        }
        idx.erase(0, false);
        assert_eq!(idx.find_first(&int(1)), None);
        assert_eq!(idx.find_first(&int(2)), Some(0));
        assert_eq!(idx.find_first(&int(3)), Some(1));

        idx.erase(1, true);
        assert_eq!(idx.find_first(&int(3)), None);
        assert_eq!(idx.len(), 1);
    }

    #[test]
    fn move_last_over_discipline() {
        // ["a", "b", "c"]; move row 2 over row 0.
        let mut idx = SearchIndex::new(true);
        idx.insert(0, IndexKey::from_str_opt(Some("a")), 1, true).unwrap();
        idx.insert(1, IndexKey::from_str_opt(Some("b")), 1, true).unwrap();
        idx.insert(2, IndexKey::from_str_opt(Some("c")), 1, true).unwrap();

        idx.erase(0, true);
        idx.update_ref(&IndexKey::from_str_opt(Some("c")), 2, 0);

        assert_eq!(idx.find_first(&IndexKey::from_str_opt(Some("a"))), None);
        assert_eq!(idx.find_first(&IndexKey::from_str_opt(Some("c"))), Some(0));
        assert_eq!(idx.find_first(&IndexKey::from_str_opt(Some("b"))), Some(1));
        assert_eq!(idx.len(), 2);
    }

    #[test]
    fn set_replaces_value() {
        let mut idx = SearchIndex::new(true);
        idx.insert(0, int(5), 1, true).unwrap();
        idx.set(0, int(7)).unwrap();
        assert_eq!(idx.find_first(&int(5)), None);
        assert_eq!(idx.find_first(&int(7)), Some(0));
    }

    #[test]
    fn unique_rejects_before_mutation() {
        let mut idx = SearchIndex::new(false);
        idx.insert(0, int(5), 1, true).unwrap();
        let err = idx.insert(1, int(5), 1, true).unwrap_err();
        assert!(matches!(err, StoreError::UniqueViolation { row: 1 }));
        // Nothing changed.
        assert_eq!(idx.len(), 1);
        assert_eq!(idx.count(&int(5)), 1);

        // Setting a row to its own value is not a violation.
        idx.set(0, int(5)).unwrap();
        // Setting to an occupied value is.
        idx.insert(1, int(6), 1, true).unwrap();
        assert!(idx.set(1, int(5)).is_err());
        assert_eq!(idx.find_first(&int(6)), Some(1));
    }

    #[test]
    fn null_is_a_key() {
        let mut idx = SearchIndex::new(true);
        idx.insert(0, IndexKey::Null, 1, true).unwrap();
        idx.insert(1, IndexKey::from_str_opt(Some("")), 1, true).unwrap();
        // Null and empty are distinct.
        assert_eq!(idx.find_first(&IndexKey::Null), Some(0));
        assert_eq!(idx.find_first(&IndexKey::from_str_opt(Some(""))), Some(1));
    }

    #[test]
    fn rebuild_matches_fresh_content() {
        let mut idx = SearchIndex::new(true);
        idx.insert(0, int(1), 1, true).unwrap();
        idx.rebuild([int(4), int(5), int(4)]).unwrap();
        assert_eq!(idx.find_all(&int(4)), vec![0, 2]);
        assert_eq!(idx.find_first(&int(1)), None);
        assert_eq!(idx.len(), 3);
    }
}
