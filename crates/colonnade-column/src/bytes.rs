//! The bytes column: variable-length values with size-adaptive leaves.
//!
//! Within one column the leaves can be of three kinds (small / medium /
//! big), chosen per leaf by the longest value it holds. Writes promote a
//! leaf in place when the incoming value needs a higher kind; promotion is
//! monotonic, and only a full clear of a non-leaf root ever returns the
//! column to a small leaf.
//!
//! Null is representable when the column is nullable and is distinct from
//! the empty value.

use colonnade_arena::Arena;
use colonnade_btree::bptree::{self, EraseHandler, TreeInsertState};
use colonnade_btree::{leaf_bytes, node};
use colonnade_error::{Result, StoreError};
use colonnade_types::{LeafKind, Ref};
use tracing::debug;

use crate::index::{IndexKey, SearchIndex};

/// Cached shape of the root accessor; the refresh protocol compares this
/// against the header bits of the re-read root.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RootKind {
    Leaf(LeafKind),
    Inner,
}

/// Bytes-valued column accessor.
#[derive(Debug)]
pub struct BytesColumn {
    root: Ref,
    root_kind: RootKind,
    nullable: bool,
    index: Option<SearchIndex>,
    parent: Option<(Ref, usize)>,
}

impl BytesColumn {
    /// Create a new empty column (small-leaf root).
    pub fn create(arena: &mut Arena, nullable: bool) -> Result<Self> {
        let root = leaf_bytes::small::create_empty(arena)?;
        Ok(Self {
            root,
            root_kind: RootKind::Leaf(LeafKind::Small),
            nullable,
            index: None,
            parent: None,
        })
    }

    /// Attach to an existing root.
    pub fn from_ref(arena: &Arena, root: Ref, nullable: bool) -> Result<Self> {
        let root_kind = read_root_kind(arena, root)?;
        Ok(Self {
            root,
            root_kind,
            nullable,
            index: None,
            parent: None,
        })
    }

    pub fn root(&self) -> Ref {
        self.root
    }

    /// The cached root accessor shape.
    pub fn root_kind(&self) -> RootKind {
        self.root_kind
    }

    pub fn is_nullable(&self) -> bool {
        self.nullable
    }

    // -- parent wiring ------------------------------------------------------

    pub fn set_parent(&mut self, parent: Ref, ndx_in_parent: usize) {
        self.parent = Some((parent, ndx_in_parent));
        if let Some(index) = &mut self.index {
            index.set_ndx_in_parent(ndx_in_parent + 1);
        }
    }

    pub fn set_ndx_in_parent(&mut self, ndx: usize) {
        if let Some((parent, _)) = self.parent {
            self.parent = Some((parent, ndx));
        }
        if let Some(index) = &mut self.index {
            index.set_ndx_in_parent(ndx + 1);
        }
    }

    fn update_parent(&self, arena: &mut Arena) -> Result<()> {
        if let Some((parent, ndx)) = self.parent {
            node::slot_set(arena, parent, ndx, colonnade_types::Slot::Ref(self.root))?;
        }
        Ok(())
    }

    fn set_root(&mut self, arena: &mut Arena, root: Ref, kind: RootKind) -> Result<()> {
        self.root = root;
        self.root_kind = kind;
        self.update_parent(arena)
    }

    // -- size and reads -----------------------------------------------------

    fn root_is_leaf(&self) -> bool {
        matches!(self.root_kind, RootKind::Leaf(_))
    }

    /// Number of rows.
    pub fn size(&self, arena: &Arena) -> Result<usize> {
        node::size_from_ref(arena, self.root)
    }

    pub fn is_empty(&self, arena: &Arena) -> Result<bool> {
        Ok(self.size(arena)? == 0)
    }

    /// Read the value at `ndx`. `None` is null.
    pub fn get(&self, arena: &Arena, ndx: usize) -> Result<Option<Vec<u8>>> {
        if self.root_is_leaf() {
            return leaf_bytes::get(arena, self.root, ndx);
        }
        let (leaf, rel) = bptree::get_leaf(arena, self.root, ndx)?;
        leaf_bytes::get(arena, leaf, rel)
    }

    /// Whether the value at `ndx` is null.
    pub fn is_null(&self, arena: &Arena, ndx: usize) -> Result<bool> {
        Ok(self.get(arena, ndx)?.is_none())
    }

    /// The leaf kind currently holding row `ndx`.
    pub fn leaf_kind_at(&self, arena: &Arena, ndx: usize) -> Result<LeafKind> {
        if self.root_is_leaf() {
            return leaf_bytes::kind_of(arena, self.root);
        }
        let (leaf, _) = bptree::get_leaf(arena, self.root, ndx)?;
        leaf_bytes::kind_of(arena, leaf)
    }

    // -- index plumbing -----------------------------------------------------

    pub fn has_search_index(&self) -> bool {
        self.index.is_some()
    }

    pub fn search_index(&self) -> Option<&SearchIndex> {
        self.index.as_ref()
    }

    /// Build a search index over current content.
    pub fn create_search_index(&mut self, arena: &Arena, allow_duplicates: bool) -> Result<()> {
        debug_assert!(self.index.is_none());
        let mut index = SearchIndex::new(allow_duplicates);
        let size = self.size(arena)?;
        for row in 0..size {
            let value = self.get(arena, row)?;
            index.insert(row, IndexKey::from_bytes(value.as_deref()), 1, true)?;
        }
        if let Some((_, ndx)) = self.parent {
            index.set_ndx_in_parent(ndx + 1);
        }
        self.index = Some(index);
        Ok(())
    }

    pub fn destroy_search_index(&mut self) {
        self.index = None;
    }

    // -- promotion ----------------------------------------------------------

    /// Promote the root leaf (if needed) so a value of `value_len` bytes
    /// fits, and return the root's resulting leaf kind.
    fn upgrade_root_leaf(&mut self, arena: &mut Arena, value_len: usize) -> Result<LeafKind> {
        let RootKind::Leaf(current) = self.root_kind else {
            return Err(StoreError::InvalidNodeHeader {
                detail: "root leaf upgrade on a non-leaf root",
            });
        };
        let required = LeafKind::required_for(value_len);
        if required <= current {
            return Ok(current);
        }
        let new_root = leaf_bytes::promote(arena, self.root, required, self.nullable)?;
        self.set_root(arena, new_root, RootKind::Leaf(required))?;
        Ok(required)
    }

    /// Promote the leaf holding element `ndx` of a non-leaf tree so that
    /// `value_len` fits.
    fn upgrade_leaf_at(&mut self, arena: &mut Arena, ndx: usize, value_len: usize) -> Result<()> {
        let required = LeafKind::required_for(value_len);
        let nullable = self.nullable;
        bptree::update_elem(arena, self.root, ndx, &mut |a, leaf, _rel| {
            let kind = leaf_bytes::kind_of(a, leaf)?;
            if required <= kind {
                return Ok(None);
            }
            let new_leaf = leaf_bytes::promote(a, leaf, required, nullable)?;
            Ok(Some(new_leaf))
        })
    }

    // -- writes -------------------------------------------------------------

    fn check_null(&self, value: Option<&[u8]>) -> Result<()> {
        if value.is_none() && !self.nullable {
            return Err(StoreError::NotNullable);
        }
        Ok(())
    }

    /// Write the value at `ndx`.
    ///
    /// The index is updated before the column so it can still locate the
    /// old value, and so a constraint failure aborts before any mutation.
    pub fn set(&mut self, arena: &mut Arena, ndx: usize, value: Option<&[u8]>) -> Result<()> {
        self.set_with_options(arena, ndx, value, false)
    }

    /// Like [`BytesColumn::set`], optionally appending a NUL terminator to
    /// the stored payload (C-string compatibility). The terminator is part
    /// of the stored bytes.
    pub fn set_with_options(
        &mut self,
        arena: &mut Arena,
        ndx: usize,
        value: Option<&[u8]>,
        add_zero_term: bool,
    ) -> Result<()> {
        self.check_null(value)?;
        let size = self.size(arena)?;
        if ndx >= size {
            return Err(StoreError::RowOutOfBounds { row: ndx, size });
        }
        let stored = apply_zero_term(value, add_zero_term);
        let stored = stored.as_deref();

        if let Some(index) = &mut self.index {
            index.set(ndx, IndexKey::from_bytes(stored))?;
        }

        if self.root_is_leaf() {
            self.upgrade_root_leaf(arena, stored.map_or(0, <[u8]>::len))?;
            return leaf_bytes::set(arena, self.root, ndx, stored);
        }
        self.upgrade_leaf_at(arena, ndx, stored.map_or(0, <[u8]>::len))?;
        bptree::update_elem(arena, self.root, ndx, &mut |a, leaf, rel| {
            leaf_bytes::set(a, leaf, rel, stored)?;
            Ok(None)
        })
    }

    /// Write a null. Fails on non-nullable columns.
    pub fn set_null(&mut self, arena: &mut Arena, ndx: usize) -> Result<()> {
        if !self.nullable {
            return Err(StoreError::NotNullable);
        }
        self.set(arena, ndx, None)
    }

    /// Insert `num_rows` copies of `value` at `ndx` (`None` appends). The
    /// column is updated first, the index second.
    pub fn insert(
        &mut self,
        arena: &mut Arena,
        ndx: Option<usize>,
        value: Option<&[u8]>,
        num_rows: usize,
    ) -> Result<()> {
        self.insert_with_options(arena, ndx, value, num_rows, false)
    }

    /// Like [`BytesColumn::insert`] with the NUL-terminator option.
    pub fn insert_with_options(
        &mut self,
        arena: &mut Arena,
        ndx: Option<usize>,
        value: Option<&[u8]>,
        num_rows: usize,
        add_zero_term: bool,
    ) -> Result<()> {
        self.check_null(value)?;
        let size = self.size(arena)?;
        let ndx = match ndx {
            Some(n) if n == size => None,
            Some(n) if n > size => return Err(StoreError::RowOutOfBounds { row: n, size }),
            other => other,
        };
        let stored = apply_zero_term(value, add_zero_term);
        let stored_ref = stored.as_deref();
        let is_append = ndx.is_none();

        for i in 0..num_rows {
            self.tree_insert_one(arena, ndx.map(|n| n + i), stored_ref)?;
        }

        if let Some(index) = &mut self.index {
            let row = if is_append { size } else { ndx.unwrap_or(size) };
            index.insert(row, IndexKey::from_bytes(stored_ref), num_rows, is_append)?;
        }
        Ok(())
    }

    fn tree_insert_one(
        &mut self,
        arena: &mut Arena,
        ndx: Option<usize>,
        value: Option<&[u8]>,
    ) -> Result<()> {
        let value_len = value.map_or(0, <[u8]>::len);
        let mut state = TreeInsertState::default();
        let sibling = if self.root_is_leaf() {
            self.upgrade_root_leaf(arena, value_len)?;
            leaf_bytes::leaf_insert(arena, self.root, ndx, value, &mut state)?
        } else {
            // Promote the target leaf first so the descent below can write
            // without re-parenting.
            let size = self.size(arena)?;
            let target = ndx.unwrap_or(size.saturating_sub(1)).min(size.saturating_sub(1));
            self.upgrade_leaf_at(arena, target, value_len)?;
            bptree::insert(arena, self.root, ndx, &mut state, &mut |a, leaf, i, st| {
                leaf_bytes::leaf_insert(a, leaf, i, value, st)
            })?
        };
        if let Some(sibling) = sibling {
            let new_root = bptree::introduce_new_root(arena, self.root, sibling, &state)?;
            self.set_root(arena, new_root, RootKind::Inner)?;
        }
        Ok(())
    }

    /// Append a value.
    pub fn add(&mut self, arena: &mut Arena, value: Option<&[u8]>) -> Result<()> {
        self.insert(arena, None, value, 1)
    }

    fn tree_erase(&mut self, arena: &mut Arena, ndx: usize, is_last: bool) -> Result<()> {
        if self.root_is_leaf() {
            return leaf_bytes::erase(arena, self.root, ndx);
        }
        struct Handler;
        impl EraseHandler for Handler {
            fn erase_leaf_elem(
                &mut self,
                arena: &mut Arena,
                leaf: Ref,
                ndx: Option<usize>,
            ) -> Result<bool> {
                let n = leaf_bytes::count(arena, leaf)?;
                if n == 1 {
                    return Ok(true);
                }
                leaf_bytes::erase(arena, leaf, ndx.unwrap_or(n - 1)).map(|()| false)
            }
            fn destroy_leaf(&mut self, arena: &mut Arena, leaf: Ref) {
                node::destroy_deep(arena, leaf);
            }
            fn make_empty_leaf(&mut self, arena: &mut Arena) -> Result<Ref> {
                leaf_bytes::small::create_empty(arena)
            }
        }
        let ndx_arg = if is_last { None } else { Some(ndx) };
        if let Some(new_root) = bptree::erase(arena, self.root, ndx_arg, &mut Handler)? {
            let kind = read_root_kind(arena, new_root)?;
            self.set_root(arena, new_root, kind)?;
        }
        Ok(())
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
        self.tree_erase(arena, ndx, is_last)
    }

    /// Move the last row over `row_ndx`.
    ///
    /// Not atomic: a failure mid-way can leave the overwrite applied
    /// without the trailing erase. Callers needing stronger guarantees
    /// wrap the call in a snapshot at the transaction layer.
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
        // Source and destination can share a leaf, so the value is buffered
        // before the overwrite.
        let moved = self.get(arena, last_row_ndx)?;
        let moved_ref = moved.as_deref();

        if let Some(index) = &mut self.index {
            index.erase(row_ndx, true);
            if row_ndx != last_row_ndx {
                index.update_ref(&IndexKey::from_bytes(moved_ref), last_row_ndx, row_ndx);
            }
        }

        if row_ndx != last_row_ndx {
            if self.root_is_leaf() {
                // Same leaf holds both rows; the value fits its kind.
                leaf_bytes::set(arena, self.root, row_ndx, moved_ref)?;
            } else {
                self.upgrade_leaf_at(arena, row_ndx, moved_ref.map_or(0, <[u8]>::len))?;
                bptree::update_elem(arena, self.root, row_ndx, &mut |a, leaf, rel| {
                    leaf_bytes::set(a, leaf, rel, moved_ref)?;
                    Ok(None)
                })?;
            }
        }
        self.tree_erase(arena, last_row_ndx, true)
    }

    /// Remove all rows. A leaf root is cleared in place (keeping its
    /// kind); a non-leaf root is replaced by a fresh empty small leaf.
    pub fn clear(&mut self, arena: &mut Arena) -> Result<()> {
        if let Some(index) = &mut self.index {
            index.clear();
        }
        if self.root_is_leaf() {
            return leaf_bytes::clear(arena, self.root);
        }
        let new_root = leaf_bytes::small::create_empty(arena)?;
        node::destroy_deep(arena, self.root);
        debug!(root = new_root.get(), "clear bytes column to small leaf");
        self.set_root(arena, new_root, RootKind::Leaf(LeafKind::Small))
    }

    /// Swap the values of two rows.
    ///
    /// Like `move_last_over`, not atomic across its two writes.
    pub fn swap_rows(&mut self, arena: &mut Arena, a: usize, b: usize) -> Result<()> {
        if a == b {
            return Ok(());
        }
        let va = self.get(arena, a)?;
        let vb = self.get(arena, b)?;
        if va.is_none() && vb.is_none() {
            return Ok(());
        }
        self.set(arena, a, vb.as_deref())?;
        self.set(arena, b, va.as_deref())
    }

    /// Destroy the whole tree (and index).
    pub fn destroy(&mut self, arena: &mut Arena) {
        node::destroy_deep(arena, self.root);
        self.index = None;
    }

    // -- scans --------------------------------------------------------------

    /// Visit each leaf in row order as `(leaf_ref, row_offset)`; stop when
    /// the callback returns `false`.
    fn for_each_leaf<F>(&self, arena: &Arena, mut f: F) -> Result<()>
    where
        F: FnMut(&Arena, Ref, usize) -> Result<bool>,
    {
        if self.root_is_leaf() {
            f(arena, self.root, 0)?;
            return Ok(());
        }
        let size = self.size(arena)?;
        let mut row = 0;
        while row < size {
            let (leaf, rel) = bptree::get_leaf(arena, self.root, row)?;
            debug_assert_eq!(rel, 0);
            let leaf_size = leaf_bytes::count(arena, leaf)?;
            if !f(arena, leaf, row)? {
                return Ok(());
            }
            row += leaf_size;
        }
        Ok(())
    }

    /// Smallest row in `[begin, end)` holding `value`. Delegates to the
    /// index for full-range searches.
    pub fn find_first(
        &self,
        arena: &Arena,
        value: Option<&[u8]>,
        begin: usize,
        end: Option<usize>,
    ) -> Result<Option<usize>> {
        let size = self.size(arena)?;
        let end = end.unwrap_or(size).min(size);
        if let Some(index) = &self.index {
            if begin == 0 && end == size {
                return Ok(index.find_first(&IndexKey::from_bytes(value)));
            }
        }
        let mut found = None;
        self.for_each_leaf(arena, |arena, leaf, offset| {
            let leaf_size = leaf_bytes::count(arena, leaf)?;
            if offset + leaf_size <= begin || offset >= end {
                return Ok(offset < end);
            }
            let lo = begin.saturating_sub(offset);
            let hi = (end - offset).min(leaf_size);
            if let Some(ndx) = leaf_bytes::find_first(arena, leaf, value, lo, hi)? {
                found = Some(offset + ndx);
                return Ok(false);
            }
            Ok(true)
        })?;
        Ok(found)
    }

    /// All rows in `[begin, end)` holding `value`, ascending.
    pub fn find_all(
        &self,
        arena: &Arena,
        value: Option<&[u8]>,
        begin: usize,
        end: Option<usize>,
    ) -> Result<Vec<usize>> {
        let size = self.size(arena)?;
        let end = end.unwrap_or(size).min(size);
        if let Some(index) = &self.index {
            if begin == 0 && end == size {
                return Ok(index.find_all(&IndexKey::from_bytes(value)));
            }
        }
        let mut out = Vec::new();
        for row in begin..end {
            if self.get(arena, row)?.as_deref() == value {
                out.push(row);
            }
        }
        Ok(out)
    }

    /// Borrowed row set from the index (the no-copy variant). `None` when
    /// the value is absent; a null probe on a non-nullable column is an
    /// early out.
    pub fn find_all_indexed(&self, value: Option<&[u8]>) -> Option<&[usize]> {
        if value.is_none() && !self.nullable {
            return None;
        }
        self.index.as_ref()?.find_all_rows(&IndexKey::from_bytes(value))
    }

    /// Number of rows holding `value`. Uses the index when present, else
    /// scans leaf by leaf.
    pub fn count(&self, arena: &Arena, value: Option<&[u8]>) -> Result<usize> {
        if let Some(index) = &self.index {
            return Ok(index.count(&IndexKey::from_bytes(value)));
        }
        let mut total = 0;
        self.for_each_leaf(arena, |arena, leaf, _offset| {
            total += leaf_bytes::count_matches(arena, leaf, value)?;
            Ok(true)
        })?;
        Ok(total)
    }

    // -- sorted-column searches ---------------------------------------------

    /// Lower bound over a column sorted ascending (null before empty
    /// before everything else).
    pub fn lower_bound(&self, arena: &Arena, value: Option<&[u8]>) -> Result<usize> {
        self.bound(arena, value, |probe, v| probe.as_deref() < v)
    }

    /// Upper bound over a sorted column.
    pub fn upper_bound(&self, arena: &Arena, value: Option<&[u8]>) -> Result<usize> {
        self.bound(arena, value, |probe, v| probe.as_deref() <= v)
    }

    fn bound(
        &self,
        arena: &Arena,
        value: Option<&[u8]>,
        go_right: impl Fn(&Option<Vec<u8>>, Option<&[u8]>) -> bool,
    ) -> Result<usize> {
        let mut lo = 0usize;
        let mut len = self.size(arena)?;
        while len > 0 {
            let half = len / 2;
            let mid = lo + half;
            let probe = self.get(arena, mid)?;
            if go_right(&probe, value) {
                lo = mid + 1;
                len -= half + 1;
            } else {
                len = half;
            }
        }
        Ok(lo)
    }

    /// Element-wise equality with another bytes column.
    pub fn compare(&self, arena: &Arena, other: &BytesColumn) -> Result<bool> {
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

    // -- verification -------------------------------------------------------

    /// Structural check: every leaf parses, kinds are leaf kinds, and the
    /// per-leaf counts add up to the column size.
    pub fn verify(&self, arena: &Arena) -> Result<()> {
        let size = self.size(arena)?;
        let mut covered = 0usize;
        self.for_each_leaf(arena, |arena, leaf, offset| {
            let kind = leaf_bytes::kind_of(arena, leaf)?;
            let n = leaf_bytes::count(arena, leaf)?;
            if offset != covered {
                return Err(StoreError::verify(format!(
                    "leaf offset {offset} does not match covered rows {covered}"
                )));
            }
            for i in 0..n {
                let value = leaf_bytes::get(arena, leaf, i)?;
                if let Some(bytes) = &value {
                    if LeafKind::required_for(bytes.len()) > kind {
                        return Err(StoreError::verify(format!(
                            "value of {} bytes stored in a {kind:?} leaf",
                            bytes.len()
                        )));
                    }
                }
                if value.is_none() && !self.nullable {
                    return Err(StoreError::verify(
                        "null stored in a non-nullable column".to_owned(),
                    ));
                }
            }
            covered += n;
            Ok(true)
        })?;
        if covered != size {
            return Err(StoreError::verify(format!(
                "leaves cover {covered} rows, column reports {size}"
            )));
        }
        Ok(())
    }

    // -- refresh ------------------------------------------------------------

    /// Re-synchronize with the ref graph: re-read the root ref from the
    /// parent slot, replace the cached root accessor when the node kind
    /// changed, and rebuild the search index. Returns whether the root
    /// accessor had to be replaced (vs re-initialized in place).
    pub fn refresh_accessor_tree(&mut self, arena: &Arena) -> Result<bool> {
        let Some((parent, ndx)) = self.parent else {
            return Ok(false);
        };
        let root = node::slot_get(arena, parent, ndx)?
            .as_ref_value()
            .ok_or(StoreError::NodePayloadMismatch {
                detail: "column root slot is not a ref",
            })?;
        let new_kind = read_root_kind(arena, root)?;
        let replaced = new_kind != self.root_kind || root != self.root;
        self.root = root;
        self.root_kind = new_kind;

        if self.index.is_some() {
            let size = self.size(arena)?;
            let mut keys = Vec::with_capacity(size);
            for row in 0..size {
                let value = self.get(arena, row)?;
                keys.push(IndexKey::from_bytes(value.as_deref()));
            }
            if let Some(index) = &mut self.index {
                index.rebuild(keys)?;
                index.set_ndx_in_parent(ndx + 1);
            }
        }
        Ok(replaced)
    }
}

fn read_root_kind(arena: &Arena, root: Ref) -> Result<RootKind> {
    let header = node::header(arena, root)?;
    if header.flags.inner {
        Ok(RootKind::Inner)
    } else {
        LeafKind::from_flags(header.flags)
            .map(RootKind::Leaf)
            .ok_or(StoreError::InvalidNodeHeader {
                detail: "bytes column root is neither leaf nor inner",
            })
    }
}

fn apply_zero_term(value: Option<&[u8]>, add_zero_term: bool) -> Option<Vec<u8>> {
    match (value, add_zero_term) {
        (Some(bytes), true) => {
            let mut stored = Vec::with_capacity(bytes.len() + 1);
            stored.extend_from_slice(bytes);
            stored.push(0);
            Some(stored)
        }
        (Some(bytes), false) => Some(bytes.to_vec()),
        (None, _) => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn new_col(arena: &mut Arena) -> BytesColumn {
        BytesColumn::create(arena, false).unwrap()
    }

    #[test]
    fn leaf_promotion_scenario() {
        // Spec scenario 2: add("x"), add("y"); set(0, <80 bytes>) promotes
        // to big; row 1 still reads back.
        let mut arena = Arena::new();
        let mut col = new_col(&mut arena);
        col.add(&mut arena, Some(b"x")).unwrap();
        col.add(&mut arena, Some(b"y")).unwrap();
        assert_eq!(col.leaf_kind_at(&arena, 0).unwrap(), LeafKind::Small);

        let long = vec![b'z'; 80];
        col.set(&mut arena, 0, Some(&long)).unwrap();
        assert_eq!(col.leaf_kind_at(&arena, 0).unwrap(), LeafKind::Big);
        assert_eq!(col.get(&arena, 0).unwrap().as_deref(), Some(&long[..]));
        assert_eq!(col.get(&arena, 1).unwrap().as_deref(), Some(&b"y"[..]));
    }

    #[test]
    fn promotion_is_monotonic() {
        let mut arena = Arena::new();
        let mut col = new_col(&mut arena);
        col.add(&mut arena, Some(b"tiny")).unwrap();
        col.add(&mut arena, Some(&[b'm'; 40])).unwrap();
        assert_eq!(col.leaf_kind_at(&arena, 0).unwrap(), LeafKind::Medium);

        // Writing a small value back does not demote.
        col.set(&mut arena, 1, Some(b"s")).unwrap();
        assert_eq!(col.leaf_kind_at(&arena, 0).unwrap(), LeafKind::Medium);

        col.add(&mut arena, Some(&[b'b'; 100])).unwrap();
        assert_eq!(col.leaf_kind_at(&arena, 0).unwrap(), LeafKind::Big);
        assert_eq!(col.get(&arena, 0).unwrap().as_deref(), Some(&b"tiny"[..]));
    }

    #[test]
    fn multi_leaf_tree_with_mixed_kinds() {
        let mut arena = Arena::new();
        let mut col = new_col(&mut arena);
        for i in 0..1200usize {
            let value = format!("v{i}");
            col.add(&mut arena, Some(value.as_bytes())).unwrap();
        }
        assert!(matches!(col.root_kind(), RootKind::Inner));

        // Promote only the leaf holding row 0.
        let long = vec![b'L'; 70];
        col.set(&mut arena, 0, Some(&long)).unwrap();
        assert_eq!(col.leaf_kind_at(&arena, 0).unwrap(), LeafKind::Big);
        assert_eq!(col.leaf_kind_at(&arena, 1100).unwrap(), LeafKind::Small);

        assert_eq!(col.get(&arena, 0).unwrap().as_deref(), Some(&long[..]));
        assert_eq!(col.get(&arena, 999).unwrap().as_deref(), Some(&b"v999"[..]));
        assert_eq!(col.get(&arena, 1199).unwrap().as_deref(), Some(&b"v1199"[..]));
    }

    #[test]
    fn erase_and_size() {
        let mut arena = Arena::new();
        let mut col = new_col(&mut arena);
        for v in [&b"a"[..], b"b", b"c"] {
            col.add(&mut arena, Some(v)).unwrap();
        }
        col.erase(&mut arena, 1).unwrap();
        assert_eq!(col.size(&arena).unwrap(), 2);
        assert_eq!(col.get(&arena, 1).unwrap().as_deref(), Some(&b"c"[..]));
    }

    #[test]
    fn move_last_over_indexed_scenario() {
        // Spec scenario 3: indexed ["a","b","c"], move_last_over(0, 2).
        let mut arena = Arena::new();
        let mut col = new_col(&mut arena);
        for v in [&b"a"[..], b"b", b"c"] {
            col.add(&mut arena, Some(v)).unwrap();
        }
        col.create_search_index(&arena, true).unwrap();

        col.move_last_over(&mut arena, 0, 2).unwrap();
        assert_eq!(col.size(&arena).unwrap(), 2);
        assert_eq!(col.get(&arena, 0).unwrap().as_deref(), Some(&b"c"[..]));
        assert_eq!(col.get(&arena, 1).unwrap().as_deref(), Some(&b"b"[..]));

        assert_eq!(col.find_first(&arena, Some(b"a"), 0, None).unwrap(), None);
        assert_eq!(col.find_first(&arena, Some(b"c"), 0, None).unwrap(), Some(0));
        assert_eq!(col.find_first(&arena, Some(b"b"), 0, None).unwrap(), Some(1));
    }

    #[test]
    fn clear_resets_non_leaf_root_to_small() {
        let mut arena = Arena::new();
        let mut col = new_col(&mut arena);
        for i in 0..1100usize {
            col.add(&mut arena, Some(format!("{i}").as_bytes())).unwrap();
        }
        assert!(matches!(col.root_kind(), RootKind::Inner));
        col.clear(&mut arena).unwrap();
        assert_eq!(col.size(&arena).unwrap(), 0);
        assert_eq!(col.root_kind(), RootKind::Leaf(LeafKind::Small));
        assert_eq!(arena.block_count(), 1);
    }

    #[test]
    fn clear_keeps_kind_on_leaf_root() {
        let mut arena = Arena::new();
        let mut col = new_col(&mut arena);
        col.add(&mut arena, Some(&[b'x'; 100])).unwrap();
        assert_eq!(col.root_kind(), RootKind::Leaf(LeafKind::Big));
        col.clear(&mut arena).unwrap();
        assert_eq!(col.size(&arena).unwrap(), 0);
        assert_eq!(col.root_kind(), RootKind::Leaf(LeafKind::Big));
    }

    #[test]
    fn null_vs_empty() {
        let mut arena = Arena::new();
        let mut col = BytesColumn::create(&mut arena, true).unwrap();
        col.add(&mut arena, Some(b"")).unwrap();
        col.add(&mut arena, None).unwrap();
        assert!(!col.is_null(&arena, 0).unwrap());
        assert!(col.is_null(&arena, 1).unwrap());
        assert_eq!(col.find_first(&arena, None, 0, None).unwrap(), Some(1));
        assert_eq!(col.find_first(&arena, Some(b""), 0, None).unwrap(), Some(0));

        let mut strict = new_col(&mut arena);
        strict.add(&mut arena, Some(b"v")).unwrap();
        assert!(matches!(
            strict.set_null(&mut arena, 0).unwrap_err(),
            StoreError::NotNullable
        ));
        assert!(matches!(
            strict.add(&mut arena, None).unwrap_err(),
            StoreError::NotNullable
        ));
    }

    #[test]
    fn zero_terminated_writes() {
        let mut arena = Arena::new();
        let mut col = new_col(&mut arena);
        col.insert_with_options(&mut arena, None, Some(b"abc"), 1, true)
            .unwrap();
        assert_eq!(col.get(&arena, 0).unwrap().as_deref(), Some(&b"abc\0"[..]));
    }

    #[test]
    fn scans_and_count() {
        let mut arena = Arena::new();
        let mut col = new_col(&mut arena);
        for v in [&b"p"[..], b"q", b"p", b"r"] {
            col.add(&mut arena, Some(v)).unwrap();
        }
        assert_eq!(col.find_first(&arena, Some(b"p"), 0, None).unwrap(), Some(0));
        assert_eq!(col.find_first(&arena, Some(b"p"), 1, None).unwrap(), Some(2));
        assert_eq!(col.find_all(&arena, Some(b"p"), 0, None).unwrap(), vec![0, 2]);
        assert_eq!(col.count(&arena, Some(b"p")).unwrap(), 2);
        assert_eq!(col.count(&arena, Some(b"z")).unwrap(), 0);
    }

    #[test]
    fn sorted_bounds() {
        let mut arena = Arena::new();
        let mut col = new_col(&mut arena);
        for v in [&b"a"[..], b"b", b"b", b"d"] {
            col.add(&mut arena, Some(v)).unwrap();
        }
        assert_eq!(col.lower_bound(&arena, Some(b"b")).unwrap(), 1);
        assert_eq!(col.upper_bound(&arena, Some(b"b")).unwrap(), 3);
        assert_eq!(col.lower_bound(&arena, Some(b"c")).unwrap(), 3);
    }

    #[test]
    fn swap_rows_values() {
        let mut arena = Arena::new();
        let mut col = new_col(&mut arena);
        col.add(&mut arena, Some(b"first")).unwrap();
        col.add(&mut arena, Some(b"second")).unwrap();
        col.swap_rows(&mut arena, 0, 1).unwrap();
        assert_eq!(col.get(&arena, 0).unwrap().as_deref(), Some(&b"second"[..]));
        assert_eq!(col.get(&arena, 1).unwrap().as_deref(), Some(&b"first"[..]));
    }

    #[test]
    fn verify_clean_column() {
        let mut arena = Arena::new();
        let mut col = new_col(&mut arena);
        for i in 0..50usize {
            col.add(&mut arena, Some(format!("value-{i}").as_bytes())).unwrap();
        }
        col.set(&mut arena, 3, Some(&[b'x'; 200])).unwrap();
        col.verify(&arena).unwrap();
    }
}
