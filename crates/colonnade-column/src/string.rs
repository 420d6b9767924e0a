//! The string column: UTF-8 facade over the bytes machinery.
//!
//! Strings share the bytes column's size-adaptive leaves and its null
//! handling (null is distinct from `""`). The facade adds `&str` typing
//! and the dictionary bootstrap (`auto_enumerate`) used to upgrade a
//! string column to its enumerated encoding.

use colonnade_arena::Arena;
use colonnade_error::{Result, StoreError};
use colonnade_types::{LeafKind, NodeType, Ref};

use crate::bytes::{BytesColumn, RootKind};
use crate::integer::IntColumn;

/// String-valued column accessor.
#[derive(Debug)]
pub struct StringColumn {
    col: BytesColumn,
}

impl StringColumn {
    /// Create a new empty column.
    pub fn create(arena: &mut Arena, nullable: bool) -> Result<Self> {
        Ok(Self {
            col: BytesColumn::create(arena, nullable)?,
        })
    }

    /// Attach to an existing root.
    pub fn from_ref(arena: &Arena, root: Ref, nullable: bool) -> Result<Self> {
        Ok(Self {
            col: BytesColumn::from_ref(arena, root, nullable)?,
        })
    }

    pub fn root(&self) -> Ref {
        self.col.root()
    }

    pub fn root_kind(&self) -> RootKind {
        self.col.root_kind()
    }

    pub fn is_nullable(&self) -> bool {
        self.col.is_nullable()
    }

    pub fn set_parent(&mut self, parent: Ref, ndx_in_parent: usize) {
        self.col.set_parent(parent, ndx_in_parent);
    }

    pub fn set_ndx_in_parent(&mut self, ndx: usize) {
        self.col.set_ndx_in_parent(ndx);
    }

    pub fn size(&self, arena: &Arena) -> Result<usize> {
        self.col.size(arena)
    }

    pub fn is_empty(&self, arena: &Arena) -> Result<bool> {
        self.col.is_empty(arena)
    }

    /// Read the value at `ndx`. `None` is null.
    pub fn get(&self, arena: &Arena, ndx: usize) -> Result<Option<String>> {
        match self.col.get(arena, ndx)? {
            None => Ok(None),
            Some(bytes) => String::from_utf8(bytes)
                .map(Some)
                .map_err(|_| StoreError::NodePayloadMismatch {
                    detail: "string column holds non-UTF-8 bytes",
                }),
        }
    }

    pub fn is_null(&self, arena: &Arena, ndx: usize) -> Result<bool> {
        self.col.is_null(arena, ndx)
    }

    /// The leaf kind currently holding row `ndx`.
    pub fn leaf_kind_at(&self, arena: &Arena, ndx: usize) -> Result<LeafKind> {
        self.col.leaf_kind_at(arena, ndx)
    }

    pub fn set(&mut self, arena: &mut Arena, ndx: usize, value: Option<&str>) -> Result<()> {
        self.col.set(arena, ndx, value.map(str::as_bytes))
    }

    pub fn set_null(&mut self, arena: &mut Arena, ndx: usize) -> Result<()> {
        self.col.set_null(arena, ndx)
    }

    pub fn insert(
        &mut self,
        arena: &mut Arena,
        ndx: Option<usize>,
        value: Option<&str>,
        num_rows: usize,
    ) -> Result<()> {
        self.col.insert(arena, ndx, value.map(str::as_bytes), num_rows)
    }

    pub fn add(&mut self, arena: &mut Arena, value: Option<&str>) -> Result<()> {
        self.col.add(arena, value.map(str::as_bytes))
    }

    pub fn erase(&mut self, arena: &mut Arena, ndx: usize) -> Result<()> {
        self.col.erase(arena, ndx)
    }

    pub fn move_last_over(
        &mut self,
        arena: &mut Arena,
        row_ndx: usize,
        last_row_ndx: usize,
    ) -> Result<()> {
        self.col.move_last_over(arena, row_ndx, last_row_ndx)
    }

    pub fn clear(&mut self, arena: &mut Arena) -> Result<()> {
        self.col.clear(arena)
    }

    pub fn swap_rows(&mut self, arena: &mut Arena, a: usize, b: usize) -> Result<()> {
        self.col.swap_rows(arena, a, b)
    }

    pub fn destroy(&mut self, arena: &mut Arena) {
        self.col.destroy(arena);
    }

    pub fn find_first(
        &self,
        arena: &Arena,
        value: Option<&str>,
        begin: usize,
        end: Option<usize>,
    ) -> Result<Option<usize>> {
        self.col.find_first(arena, value.map(str::as_bytes), begin, end)
    }

    pub fn find_all(
        &self,
        arena: &Arena,
        value: Option<&str>,
        begin: usize,
        end: Option<usize>,
    ) -> Result<Vec<usize>> {
        self.col.find_all(arena, value.map(str::as_bytes), begin, end)
    }

    pub fn count(&self, arena: &Arena, value: Option<&str>) -> Result<usize> {
        self.col.count(arena, value.map(str::as_bytes))
    }

    /// Lower bound over a column sorted ascending (null sorts first).
    pub fn lower_bound(&self, arena: &Arena, value: Option<&str>) -> Result<usize> {
        self.col.lower_bound(arena, value.map(str::as_bytes))
    }

    /// Upper bound over a sorted column.
    pub fn upper_bound(&self, arena: &Arena, value: Option<&str>) -> Result<usize> {
        self.col.upper_bound(arena, value.map(str::as_bytes))
    }

    pub fn has_search_index(&self) -> bool {
        self.col.has_search_index()
    }

    pub fn create_search_index(&mut self, arena: &Arena, allow_duplicates: bool) -> Result<()> {
        self.col.create_search_index(arena, allow_duplicates)
    }

    pub fn destroy_search_index(&mut self) {
        self.col.destroy_search_index();
    }

    /// Borrowed row set from the index (the no-copy variant).
    pub fn find_all_indexed(&self, value: Option<&str>) -> Option<&[usize]> {
        self.col.find_all_indexed(value.map(str::as_bytes))
    }

    /// Element-wise equality with another string column.
    pub fn compare(&self, arena: &Arena, other: &StringColumn) -> Result<bool> {
        self.col.compare(arena, &other.col)
    }

    pub fn verify(&self, arena: &Arena) -> Result<()> {
        self.col.verify(arena)
    }

    pub fn refresh_accessor_tree(&mut self, arena: &Arena) -> Result<bool> {
        self.col.refresh_accessor_tree(arena)
    }

    /// Build the `(keys, values)` pair for dictionary encoding: a string
    /// column of unique keys in lexicographic order and an integer column
    /// of key indices, one per row.
    ///
    /// Unless `enforce` is set, bails out (returning `None` and freeing
    /// the scratch keys) as soon as fewer than half the rows turn out to
    /// be duplicates.
    pub fn auto_enumerate(&self, arena: &mut Arena, enforce: bool) -> Result<Option<(Ref, Ref)>> {
        let n = self.size(arena)?;
        let mut keys = StringColumn::create(arena, self.is_nullable())?;

        for i in 0..n {
            let v = self.get(arena, i)?;
            let v = v.as_deref();
            let pos = keys.lower_bound(arena, v)?;
            if pos != keys.size(arena)? && keys.get(arena, pos)?.as_deref() == v {
                continue;
            }
            if !enforce && n / 2 < keys.size(arena)? {
                keys.destroy(arena);
                return Ok(None);
            }
            keys.insert(arena, Some(pos), v, 1)?;
        }

        let mut values = IntColumn::create(arena, NodeType::Normal, false)?;
        for i in 0..n {
            let v = self.get(arena, i)?;
            let pos = keys.lower_bound(arena, v.as_deref())?;
            values.add(arena, pos as i64)?;
        }
        Ok(Some((keys.root(), values.root())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn string_round_trip() {
        let mut arena = Arena::new();
        let mut col = StringColumn::create(&mut arena, false).unwrap();
        col.add(&mut arena, Some("hello")).unwrap();
        col.add(&mut arena, Some("")).unwrap();
        col.insert(&mut arena, Some(1), Some("mid"), 1).unwrap();

        assert_eq!(col.get(&arena, 0).unwrap().as_deref(), Some("hello"));
        assert_eq!(col.get(&arena, 1).unwrap().as_deref(), Some("mid"));
        assert_eq!(col.get(&arena, 2).unwrap().as_deref(), Some(""));
    }

    #[test]
    fn long_strings_promote() {
        let mut arena = Arena::new();
        let mut col = StringColumn::create(&mut arena, false).unwrap();
        col.add(&mut arena, Some("short")).unwrap();
        let medium = "m".repeat(40);
        let big = "b".repeat(200);
        col.add(&mut arena, Some(&medium)).unwrap();
        assert_eq!(col.leaf_kind_at(&arena, 0).unwrap(), LeafKind::Medium);
        col.add(&mut arena, Some(&big)).unwrap();
        assert_eq!(col.leaf_kind_at(&arena, 0).unwrap(), LeafKind::Big);
        assert_eq!(col.get(&arena, 1).unwrap().as_deref(), Some(medium.as_str()));
        assert_eq!(col.get(&arena, 2).unwrap().as_deref(), Some(big.as_str()));
    }

    #[test]
    fn auto_enumerate_builds_sorted_keys() {
        let mut arena = Arena::new();
        let mut col = StringColumn::create(&mut arena, false).unwrap();
        for v in ["red", "green", "red", "blue", "green", "red"] {
            col.add(&mut arena, Some(v)).unwrap();
        }
        let (keys_ref, values_ref) = col.auto_enumerate(&mut arena, false).unwrap().unwrap();

        let keys = StringColumn::from_ref(&arena, keys_ref, false).unwrap();
        assert_eq!(keys.size(&arena).unwrap(), 3);
        assert_eq!(keys.get(&arena, 0).unwrap().as_deref(), Some("blue"));
        assert_eq!(keys.get(&arena, 1).unwrap().as_deref(), Some("green"));
        assert_eq!(keys.get(&arena, 2).unwrap().as_deref(), Some("red"));

        let values = IntColumn::from_ref(&arena, values_ref, false).unwrap();
        assert_eq!(values.size(&arena).unwrap(), 6);
        // red green red blue green red -> 2 1 2 0 1 2
        let decoded: Vec<i64> = (0..6).map(|i| values.get(&arena, i).unwrap()).collect();
        assert_eq!(decoded, vec![2, 1, 2, 0, 1, 2]);
    }

    #[test]
    fn auto_enumerate_bails_without_duplicates() {
        let mut arena = Arena::new();
        let mut col = StringColumn::create(&mut arena, false).unwrap();
        for i in 0..8 {
            col.add(&mut arena, Some(&format!("unique-{i}"))).unwrap();
        }
        assert!(col.auto_enumerate(&mut arena, false).unwrap().is_none());
        // Enforcement overrides the heuristic.
        assert!(col.auto_enumerate(&mut arena, true).unwrap().is_some());
    }

    #[test]
    fn indexed_find() {
        let mut arena = Arena::new();
        let mut col = StringColumn::create(&mut arena, false).unwrap();
        for v in ["x", "y", "x"] {
            col.add(&mut arena, Some(v)).unwrap();
        }
        col.create_search_index(&arena, true).unwrap();
        assert_eq!(col.find_first(&arena, Some("x"), 0, None).unwrap(), Some(0));
        assert_eq!(col.find_all(&arena, Some("x"), 0, None).unwrap(), vec![0, 2]);
        assert_eq!(col.count(&arena, Some("y")).unwrap(), 1);
        assert_eq!(col.find_all_indexed(Some("x")).unwrap(), &[0, 2]);
    }
}
