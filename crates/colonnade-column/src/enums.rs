//! The enumerated string column: dictionary encoding.
//!
//! Two sibling structures share the column index: `keys`, a string column
//! of unique key strings, and `values`, an integer column of indices into
//! `keys`. The dictionary only ever grows; `clear` empties the values but
//! deliberately keeps the keys (no compaction).

use colonnade_arena::Arena;
use colonnade_error::{Result, StoreError};
use colonnade_types::{NodeType, Ref};

use crate::index::{IndexKey, SearchIndex};
use crate::integer::IntColumn;
use crate::string::StringColumn;

/// Dictionary-encoded string column accessor.
#[derive(Debug)]
pub struct EnumStringColumn {
    values: IntColumn,
    keys: StringColumn,
    nullable: bool,
    index: Option<SearchIndex>,
}

impl EnumStringColumn {
    /// Create a new empty column.
    pub fn create(arena: &mut Arena, nullable: bool) -> Result<Self> {
        Ok(Self {
            values: IntColumn::create(arena, NodeType::Normal, false)?,
            keys: StringColumn::create(arena, nullable)?,
            nullable,
            index: None,
        })
    }

    /// Attach to existing `values` and `keys` roots.
    pub fn from_refs(arena: &Arena, values: Ref, keys: Ref, nullable: bool) -> Result<Self> {
        Ok(Self {
            values: IntColumn::from_ref(arena, values, false)?,
            keys: StringColumn::from_ref(arena, keys, nullable)?,
            nullable,
            index: None,
        })
    }

    pub fn values_root(&self) -> Ref {
        self.values.root()
    }

    pub fn keys_root(&self) -> Ref {
        self.keys.root()
    }

    pub fn keys(&self) -> &StringColumn {
        &self.keys
    }

    pub fn is_nullable(&self) -> bool {
        self.nullable
    }

    /// Attach the values tree to the owning columns block.
    pub fn set_parent(&mut self, parent: Ref, ndx_in_parent: usize) {
        self.values.set_parent(parent, ndx_in_parent);
    }

    pub fn set_ndx_in_parent(&mut self, ndx: usize) {
        self.values.set_ndx_in_parent(ndx);
        if let Some(index) = &mut self.index {
            index.set_ndx_in_parent(ndx + 1);
        }
    }

    /// Number of rows.
    pub fn size(&self, arena: &Arena) -> Result<usize> {
        self.values.size(arena)
    }

    pub fn is_empty(&self, arena: &Arena) -> Result<bool> {
        self.values.is_empty(arena)
    }

    /// Number of distinct keys ever written.
    pub fn key_count(&self, arena: &Arena) -> Result<usize> {
        self.keys.size(arena)
    }

    /// Read the value at `ndx` through the dictionary.
    pub fn get(&self, arena: &Arena, ndx: usize) -> Result<Option<String>> {
        let key_ndx = self.values.get(arena, ndx)?;
        self.keys.get(arena, key_ndx as usize)
    }

    /// The key index stored at `ndx`.
    pub fn get_key_ndx_at(&self, arena: &Arena, ndx: usize) -> Result<usize> {
        Ok(self.values.get(arena, ndx)? as usize)
    }

    pub fn is_null(&self, arena: &Arena, ndx: usize) -> Result<bool> {
        Ok(self.get(arena, ndx)?.is_none())
    }

    /// Look up a value in the dictionary.
    pub fn get_key_ndx(&self, arena: &Arena, value: Option<&str>) -> Result<Option<usize>> {
        self.keys.find_first(arena, value, 0, None)
    }

    /// Look up a value, appending it to the dictionary if absent. Keys are
    /// append-only.
    pub fn get_key_ndx_or_add(&mut self, arena: &mut Arena, value: Option<&str>) -> Result<usize> {
        if let Some(ndx) = self.keys.find_first(arena, value, 0, None)? {
            return Ok(ndx);
        }
        let pos = self.keys.size(arena)?;
        self.keys.add(arena, value)?;
        Ok(pos)
    }

    fn check_null(&self, value: Option<&str>) -> Result<()> {
        if value.is_none() && !self.nullable {
            return Err(StoreError::NotNullable);
        }
        Ok(())
    }

    /// Write the value at `ndx`.
    ///
    /// The index is updated before the column so it can still locate the
    /// old value.
    pub fn set(&mut self, arena: &mut Arena, ndx: usize, value: Option<&str>) -> Result<()> {
        self.check_null(value)?;
        let size = self.size(arena)?;
        if ndx >= size {
            return Err(StoreError::RowOutOfBounds { row: ndx, size });
        }
        if let Some(index) = &mut self.index {
            index.set(ndx, IndexKey::from_str_opt(value))?;
        }
        let key_ndx = self.get_key_ndx_or_add(arena, value)?;
        self.values.set_raw(arena, ndx, key_ndx as i64)
    }

    pub fn set_null(&mut self, arena: &mut Arena, ndx: usize) -> Result<()> {
        if !self.nullable {
            return Err(StoreError::NotNullable);
        }
        self.set(arena, ndx, None)
    }

    /// Insert `num_rows` copies of `value` at `ndx` (`None` appends). No
    /// key is added when no rows are inserted.
    pub fn insert(
        &mut self,
        arena: &mut Arena,
        ndx: Option<usize>,
        value: Option<&str>,
        num_rows: usize,
    ) -> Result<()> {
        if num_rows == 0 {
            return Ok(());
        }
        self.check_null(value)?;
        let size = self.size(arena)?;
        let is_append = ndx.is_none() || ndx == Some(size);
        let key_ndx = self.get_key_ndx_or_add(arena, value)?;
        self.values.insert_raw(arena, ndx, key_ndx as i64, num_rows)?;
        if let Some(index) = &mut self.index {
            let row = if is_append { size } else { ndx.unwrap_or(size) };
            index.insert(row, IndexKey::from_str_opt(value), num_rows, is_append)?;
        }
        Ok(())
    }

    pub fn add(&mut self, arena: &mut Arena, value: Option<&str>) -> Result<()> {
        self.insert(arena, None, value, 1)
    }

    /// Remove the row at `ndx`. The index is updated first.
    pub fn erase(&mut self, arena: &mut Arena, ndx: usize) -> Result<()> {
        let size = self.size(arena)?;
        if ndx >= size {
            return Err(StoreError::RowOutOfBounds { row: ndx, size });
        }
        let is_last = ndx + 1 == size;
        if let Some(index) = &mut self.index {
            index.erase(ndx, is_last);
        }
        self.values.erase_raw(arena, ndx, is_last)
    }

    /// Move the last row over `row_ndx`.
    pub fn move_last_over(
        &mut self,
        arena: &mut Arena,
        row_ndx: usize,
        last_row_ndx: usize,
    ) -> Result<()> {
        let size = self.size(arena)?;
        if row_ndx > last_row_ndx {
            return Err(StoreError::NonMonotonicRows {
                first: row_ndx,
                second: last_row_ndx,
            });
        }
        if last_row_ndx + 1 != size {
            return Err(StoreError::RowOutOfBounds {
                row: last_row_ndx,
                size,
            });
        }
        if self.index.is_some() {
            let moved = self.get(arena, last_row_ndx)?;
            if let Some(index) = &mut self.index {
                index.erase(row_ndx, true);
                if row_ndx != last_row_ndx {
                    index.update_ref(
                        &IndexKey::from_str_opt(moved.as_deref()),
                        last_row_ndx,
                        row_ndx,
                    );
                }
            }
        }
        let moved_key = self.values.get(arena, last_row_ndx)?;
        self.values
            .move_last_over_raw(arena, row_ndx, last_row_ndx, moved_key)
    }

    /// Swap two rows. A no-op when both encode the same key.
    ///
    /// The two index writes are not atomic; like the bytes column's
    /// `move_last_over`, callers needing atomicity wrap this at the
    /// transaction layer.
    pub fn swap_rows(&mut self, arena: &mut Arena, a: usize, b: usize) -> Result<()> {
        let key_a = self.values.get(arena, a)?;
        let key_b = self.values.get(arena, b)?;
        if key_a == key_b {
            return Ok(());
        }
        if self.index.is_some() {
            let value_a = self.get(arena, a)?;
            let value_b = self.get(arena, b)?;
            if let Some(index) = &mut self.index {
                index.set(a, IndexKey::from_str_opt(value_b.as_deref()))?;
                index.set(b, IndexKey::from_str_opt(value_a.as_deref()))?;
            }
        }
        self.values.set_raw(arena, a, key_b)?;
        self.values.set_raw(arena, b, key_a)
    }

    /// Remove all rows. The key dictionary is deliberately kept.
    pub fn clear(&mut self, arena: &mut Arena) -> Result<()> {
        self.values.clear_raw(arena)?;
        if let Some(index) = &mut self.index {
            index.clear();
        }
        Ok(())
    }

    /// Destroy values, keys and index.
    pub fn destroy(&mut self, arena: &mut Arena) {
        self.keys.destroy(arena);
        self.values.destroy(arena);
        self.index = None;
    }

    // -- queries ------------------------------------------------------------

    /// Number of rows holding `value`, translated through the dictionary
    /// (or answered by the index directly).
    pub fn count(&self, arena: &Arena, value: Option<&str>) -> Result<usize> {
        if let Some(index) = &self.index {
            return Ok(index.count(&IndexKey::from_str_opt(value)));
        }
        match self.get_key_ndx(arena, value)? {
            None => Ok(0),
            Some(key_ndx) => self.values.count(arena, key_ndx as i64),
        }
    }

    /// Number of rows holding the key at `key_ndx`.
    pub fn count_key(&self, arena: &Arena, key_ndx: usize) -> Result<usize> {
        self.values.count(arena, key_ndx as i64)
    }

    /// Smallest row in `[begin, end)` holding `value`.
    pub fn find_first(
        &self,
        arena: &Arena,
        value: Option<&str>,
        begin: usize,
        end: Option<usize>,
    ) -> Result<Option<usize>> {
        let size = self.size(arena)?;
        let full = begin == 0 && end.unwrap_or(size) >= size;
        if full {
            if let Some(index) = &self.index {
                return Ok(index.find_first(&IndexKey::from_str_opt(value)));
            }
        }
        match self.get_key_ndx(arena, value)? {
            None => Ok(None),
            Some(key_ndx) => self.values.find_first(arena, key_ndx as i64, begin, end),
        }
    }

    /// All rows in `[begin, end)` holding `value`, ascending.
    pub fn find_all(
        &self,
        arena: &Arena,
        value: Option<&str>,
        begin: usize,
        end: Option<usize>,
    ) -> Result<Vec<usize>> {
        let size = self.size(arena)?;
        let full = begin == 0 && end.unwrap_or(size) >= size;
        if full {
            if let Some(index) = &self.index {
                return Ok(index.find_all(&IndexKey::from_str_opt(value)));
            }
        }
        match self.get_key_ndx(arena, value)? {
            None => Ok(Vec::new()),
            Some(key_ndx) => self.values.find_all(arena, key_ndx as i64, begin, end),
        }
    }

    /// Borrowed row set from the index (the no-copy variant). A null probe
    /// on a non-nullable column is an early out.
    pub fn find_all_indexed(&self, value: Option<&str>) -> Option<&[usize]> {
        if value.is_none() && !self.nullable {
            return None;
        }
        self.index
            .as_ref()?
            .find_all_rows(&IndexKey::from_str_opt(value))
    }

    // -- search index -------------------------------------------------------

    pub fn has_search_index(&self) -> bool {
        self.index.is_some()
    }

    /// Build a search index over the decoded string values.
    pub fn create_search_index(&mut self, arena: &Arena, allow_duplicates: bool) -> Result<()> {
        debug_assert!(self.index.is_none());
        let mut index = SearchIndex::new(allow_duplicates);
        let size = self.size(arena)?;
        for row in 0..size {
            let value = self.get(arena, row)?;
            index.insert(row, IndexKey::from_str_opt(value.as_deref()), 1, true)?;
        }
        if let Some(ndx) = self.values.ndx_in_parent() {
            index.set_ndx_in_parent(ndx + 1);
        }
        self.index = Some(index);
        Ok(())
    }

    /// Adopt an externally built index (dictionary upgrade hand-off).
    pub fn install_search_index(&mut self, index: SearchIndex) {
        debug_assert!(self.index.is_none());
        self.index = Some(index);
    }

    pub fn destroy_search_index(&mut self) {
        self.index = None;
    }

    // -- comparisons --------------------------------------------------------

    /// Element-wise equality with a plain string column.
    pub fn compare_string(&self, arena: &Arena, other: &StringColumn) -> Result<bool> {
        let n = self.size(arena)?;
        if other.size(arena)? != n {
            return Ok(false);
        }
        for row in 0..n {
            if self.get(arena, row)? != other.get(arena, row)? {
                return Ok(false);
            }
        }
        Ok(true)
    }

    /// Element-wise equality with another enumerated column.
    pub fn compare(&self, arena: &Arena, other: &EnumStringColumn) -> Result<bool> {
        let n = self.size(arena)?;
        if other.size(arena)? != n {
            return Ok(false);
        }
        for row in 0..n {
            if self.get(arena, row)? != other.get(arena, row)? {
                return Ok(false);
            }
        }
        Ok(true)
    }

    // -- refresh ------------------------------------------------------------

    /// Re-synchronize after an external commit. The values tree re-reads
    /// its root from the parent slot; the keys root is re-read from the
    /// spec's enumkeys array (passed in by the owning column set); the
    /// index is rebuilt from decoded values.
    pub fn refresh_accessor_tree(&mut self, arena: &Arena, keys_root: Ref) -> Result<()> {
        self.values.refresh_accessor_tree(arena)?;
        self.keys = StringColumn::from_ref(arena, keys_root, self.nullable)?;
        if self.index.is_some() {
            let size = self.size(arena)?;
            let mut keys = Vec::with_capacity(size);
            for row in 0..size {
                let value = self.get(arena, row)?;
                keys.push(IndexKey::from_str_opt(value.as_deref()));
            }
            if let Some(index) = &mut self.index {
                index.rebuild(keys)?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_reuse_scenario() {
        // Spec scenario 4: insert "red", "green", "red".
        let mut arena = Arena::new();
        let mut col = EnumStringColumn::create(&mut arena, false).unwrap();
        col.add(&mut arena, Some("red")).unwrap();
        col.add(&mut arena, Some("green")).unwrap();
        col.add(&mut arena, Some("red")).unwrap();

        assert_eq!(col.key_count(&arena).unwrap(), 2);
        assert_eq!(col.keys().get(&arena, 0).unwrap().as_deref(), Some("red"));
        assert_eq!(col.keys().get(&arena, 1).unwrap().as_deref(), Some("green"));
        assert_eq!(col.get_key_ndx_at(&arena, 0).unwrap(), 0);
        assert_eq!(col.get_key_ndx_at(&arena, 1).unwrap(), 1);
        assert_eq!(col.get_key_ndx_at(&arena, 2).unwrap(), 0);
        assert_eq!(col.get(&arena, 2).unwrap().as_deref(), Some("red"));
    }

    #[test]
    fn clear_keeps_keys() {
        let mut arena = Arena::new();
        let mut col = EnumStringColumn::create(&mut arena, false).unwrap();
        col.add(&mut arena, Some("a")).unwrap();
        col.add(&mut arena, Some("b")).unwrap();
        col.clear(&mut arena).unwrap();
        assert_eq!(col.size(&arena).unwrap(), 0);
        assert_eq!(col.key_count(&arena).unwrap(), 2);

        // Re-adding reuses the surviving dictionary.
        col.add(&mut arena, Some("b")).unwrap();
        assert_eq!(col.get_key_ndx_at(&arena, 0).unwrap(), 1);
        assert_eq!(col.key_count(&arena).unwrap(), 2);
    }

    #[test]
    fn find_translates_through_dictionary() {
        let mut arena = Arena::new();
        let mut col = EnumStringColumn::create(&mut arena, false).unwrap();
        for v in ["p", "q", "p", "r"] {
            col.add(&mut arena, Some(v)).unwrap();
        }
        assert_eq!(col.find_first(&arena, Some("p"), 0, None).unwrap(), Some(0));
        assert_eq!(col.find_first(&arena, Some("p"), 1, None).unwrap(), Some(2));
        assert_eq!(col.find_all(&arena, Some("p"), 0, None).unwrap(), vec![0, 2]);
        assert_eq!(col.count(&arena, Some("p")).unwrap(), 2);
        assert_eq!(col.count(&arena, Some("absent")).unwrap(), 0);
    }

    #[test]
    fn swap_rows_same_key_is_noop() {
        let mut arena = Arena::new();
        let mut col = EnumStringColumn::create(&mut arena, false).unwrap();
        col.add(&mut arena, Some("same")).unwrap();
        col.add(&mut arena, Some("same")).unwrap();
        col.add(&mut arena, Some("other")).unwrap();
        col.create_search_index(&arena, true).unwrap();

        col.swap_rows(&mut arena, 0, 1).unwrap();
        assert_eq!(col.get(&arena, 0).unwrap().as_deref(), Some("same"));

        col.swap_rows(&mut arena, 0, 2).unwrap();
        assert_eq!(col.get(&arena, 0).unwrap().as_deref(), Some("other"));
        assert_eq!(col.get(&arena, 2).unwrap().as_deref(), Some("same"));
        assert_eq!(col.find_first(&arena, Some("other"), 0, None).unwrap(), Some(0));
    }

    #[test]
    fn indexed_operations() {
        let mut arena = Arena::new();
        let mut col = EnumStringColumn::create(&mut arena, false).unwrap();
        for v in ["a", "b", "c"] {
            col.add(&mut arena, Some(v)).unwrap();
        }
        col.create_search_index(&arena, true).unwrap();

        col.move_last_over(&mut arena, 0, 2).unwrap();
        assert_eq!(col.size(&arena).unwrap(), 2);
        assert_eq!(col.get(&arena, 0).unwrap().as_deref(), Some("c"));
        assert_eq!(col.find_first(&arena, Some("a"), 0, None).unwrap(), None);
        assert_eq!(col.find_first(&arena, Some("c"), 0, None).unwrap(), Some(0));
        assert_eq!(col.find_first(&arena, Some("b"), 0, None).unwrap(), Some(1));

        // Keys never shrink.
        assert_eq!(col.key_count(&arena).unwrap(), 3);
    }

    #[test]
    fn null_write_to_non_nullable_fails() {
        let mut arena = Arena::new();
        let mut col = EnumStringColumn::create(&mut arena, false).unwrap();
        col.add(&mut arena, Some("v")).unwrap();
        assert!(matches!(
            col.set(&mut arena, 0, None).unwrap_err(),
            StoreError::NotNullable
        ));
        assert!(matches!(
            col.add(&mut arena, None).unwrap_err(),
            StoreError::NotNullable
        ));

        let mut nullable = EnumStringColumn::create(&mut arena, true).unwrap();
        nullable.add(&mut arena, None).unwrap();
        assert!(nullable.is_null(&arena, 0).unwrap());
    }
}
