//! The integer column.
//!
//! A column is a single B+-tree; the root is either an integer leaf (the
//! common case for small columns) or an inner node. All other column kinds
//! build on this one: the enum column stores key indices here, the
//! subtable and link columns store refs and tagged scalars through the
//! slot accessors.
//!
//! Mutations keep the optional search index in lock-step. The ordering is
//! deliberate and documented per operation: the index is updated first for
//! `set`, `erase` and `move_last_over` (so it can still find the old value
//! and so constraint failures abort before data changes), and second for
//! `insert`.

use colonnade_arena::Arena;
use colonnade_btree::bptree::{self, EraseHandler, TreeInsertState};
use colonnade_btree::{leaf_int, node};
use colonnade_error::{Result, StoreError};
use colonnade_types::{NodeFlags, NodeType, Ref, Slot};
use tracing::debug;

use crate::index::{IndexKey, SearchIndex};

/// Null sentinel for nullable integer columns.
pub const NULL_INT: i64 = i64::MIN;

/// Integer-valued column accessor.
#[derive(Debug)]
pub struct IntColumn {
    root: Ref,
    leaf_type: NodeType,
    nullable: bool,
    index: Option<SearchIndex>,
    parent: Option<(Ref, usize)>,
}

impl IntColumn {
    /// Create a new empty column. `leaf_type` selects plain integer leaves
    /// or ref-bearing leaves (subtable/link columns).
    pub fn create(arena: &mut Arena, leaf_type: NodeType, nullable: bool) -> Result<Self> {
        let flags = match leaf_type {
            NodeType::Normal => NodeFlags::default(),
            NodeType::HasRefs => NodeFlags {
                hasrefs: true,
                ..NodeFlags::default()
            },
            NodeType::InnerBptree => {
                return Err(StoreError::InvalidNodeHeader {
                    detail: "a column leaf type cannot be an inner node",
                })
            }
        };
        let root = leaf_int::create_with_flags(arena, flags, &[])?;
        Ok(Self {
            root,
            leaf_type,
            nullable,
            index: None,
            parent: None,
        })
    }

    /// Attach to an existing root. The leaf type is read from an actual
    /// leaf (the root itself, or the first leaf under an inner root).
    pub fn from_ref(arena: &Arena, root: Ref, nullable: bool) -> Result<Self> {
        let mut probe = root;
        while node::header(arena, probe)?.flags.inner {
            probe = bptree::get_leaf(arena, probe, 0)?.0;
        }
        let leaf_type = if node::header(arena, probe)?.flags.hasrefs {
            NodeType::HasRefs
        } else {
            NodeType::Normal
        };
        Ok(Self {
            root,
            leaf_type,
            nullable,
            index: None,
            parent: None,
        })
    }

    /// The root ref.
    pub fn root(&self) -> Ref {
        self.root
    }

    /// Whether null is representable.
    pub fn is_nullable(&self) -> bool {
        self.nullable
    }

    // -- parent wiring ------------------------------------------------------

    /// Attach to the owning columns block: `(block ref, slot index)`.
    pub fn set_parent(&mut self, parent: Ref, ndx_in_parent: usize) {
        self.parent = Some((parent, ndx_in_parent));
        if let Some(index) = &mut self.index {
            index.set_ndx_in_parent(ndx_in_parent + 1);
        }
    }

    pub fn ndx_in_parent(&self) -> Option<usize> {
        self.parent.map(|(_, ndx)| ndx)
    }

    pub fn set_ndx_in_parent(&mut self, ndx: usize) {
        if let Some((parent, _)) = self.parent {
            self.parent = Some((parent, ndx));
        }
        if let Some(index) = &mut self.index {
            index.set_ndx_in_parent(ndx + 1);
        }
    }

    /// Write the current root ref into the parent's slot.
    fn update_parent(&self, arena: &mut Arena) -> Result<()> {
        if let Some((parent, ndx)) = self.parent {
            node::slot_set(arena, parent, ndx, Slot::Ref(self.root))?;
        }
        Ok(())
    }

    fn set_root(&mut self, arena: &mut Arena, root: Ref) -> Result<()> {
        self.root = root;
        self.update_parent(arena)
    }

    // -- size and reads -----------------------------------------------------

    fn root_is_leaf(&self, arena: &Arena) -> Result<bool> {
        Ok(!bptree::is_inner(arena, self.root)?)
    }

    /// Number of rows.
    pub fn size(&self, arena: &Arena) -> Result<usize> {
        node::size_from_ref(arena, self.root)
    }

    pub fn is_empty(&self, arena: &Arena) -> Result<bool> {
        Ok(self.size(arena)? == 0)
    }

    /// Read the value at `ndx`.
    pub fn get(&self, arena: &Arena, ndx: usize) -> Result<i64> {
        if self.root_is_leaf(arena)? {
            return leaf_int::get(arena, self.root, ndx);
        }
        let (leaf, rel) = bptree::get_leaf(arena, self.root, ndx)?;
        leaf_int::get(arena, leaf, rel)
    }

    /// The last value.
    pub fn back(&self, arena: &Arena) -> Result<i64> {
        let size = self.size(arena)?;
        if size == 0 {
            return Err(StoreError::RowOutOfBounds { row: 0, size: 0 });
        }
        self.get(arena, size - 1)
    }

    /// Whether the value at `ndx` is null.
    pub fn is_null(&self, arena: &Arena, ndx: usize) -> Result<bool> {
        Ok(self.nullable && self.get(arena, ndx)? == NULL_INT)
    }

    /// Decode the slot at `ndx` (for ref-bearing columns).
    pub fn get_slot(&self, arena: &Arena, ndx: usize) -> Result<Slot> {
        Ok(Slot::from_raw(self.get(arena, ndx)? as u64))
    }

    // -- index plumbing -----------------------------------------------------

    pub fn has_search_index(&self) -> bool {
        self.index.is_some()
    }

    pub fn search_index(&self) -> Option<&SearchIndex> {
        self.index.as_ref()
    }

    pub fn search_index_mut(&mut self) -> Option<&mut SearchIndex> {
        self.index.as_mut()
    }

    fn index_key(&self, v: i64) -> IndexKey {
        if self.nullable && v == NULL_INT {
            IndexKey::Null
        } else {
            IndexKey::Int(v)
        }
    }

    /// Build a search index over current content.
    pub fn create_search_index(&mut self, arena: &Arena, allow_duplicates: bool) -> Result<()> {
        debug_assert!(self.index.is_none());
        let mut index = SearchIndex::new(allow_duplicates);
        let size = self.size(arena)?;
        for row in 0..size {
            let key = self.index_key(self.get(arena, row)?);
            index.insert(row, key, 1, true)?;
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

    // -- writes -------------------------------------------------------------

    fn tree_set(&mut self, arena: &mut Arena, ndx: usize, v: i64) -> Result<()> {
        if self.root_is_leaf(arena)? {
            return leaf_int::set(arena, self.root, ndx, v);
        }
        bptree::update_elem(arena, self.root, ndx, &mut |a, leaf, rel| {
            leaf_int::set(a, leaf, rel, v)?;
            Ok(None)
        })
    }

    /// Write without touching the search index.
    pub(crate) fn set_raw(&mut self, arena: &mut Arena, ndx: usize, v: i64) -> Result<()> {
        let size = self.size(arena)?;
        if ndx >= size {
            return Err(StoreError::RowOutOfBounds { row: ndx, size });
        }
        self.tree_set(arena, ndx, v)
    }

    /// Write the value at `ndx`.
    ///
    /// The index is updated first, while it can still locate the old value.
    pub fn set(&mut self, arena: &mut Arena, ndx: usize, v: i64) -> Result<()> {
        let size = self.size(arena)?;
        if ndx >= size {
            return Err(StoreError::RowOutOfBounds { row: ndx, size });
        }
        let key = self.index_key(v);
        if let Some(index) = &mut self.index {
            index.set(ndx, key)?;
        }
        self.tree_set(arena, ndx, v)
    }

    /// Write a null. Fails on non-nullable columns.
    pub fn set_null(&mut self, arena: &mut Arena, ndx: usize) -> Result<()> {
        if !self.nullable {
            return Err(StoreError::NotNullable);
        }
        self.set(arena, ndx, NULL_INT)
    }

    /// Store a slot value (for ref-bearing columns).
    pub fn set_slot(&mut self, arena: &mut Arena, ndx: usize, slot: Slot) -> Result<()> {
        self.set(arena, ndx, slot.to_raw() as i64)
    }

    fn tree_insert_one(&mut self, arena: &mut Arena, ndx: Option<usize>, v: i64) -> Result<()> {
        let mut state = TreeInsertState::default();
        let sibling = if self.root_is_leaf(arena)? {
            leaf_int::leaf_insert(arena, self.root, ndx, v, &mut state)?
        } else {
            bptree::insert(arena, self.root, ndx, &mut state, &mut |a, leaf, i, st| {
                leaf_int::leaf_insert(a, leaf, i, v, st)
            })?
        };
        if let Some(sibling) = sibling {
            let new_root = bptree::introduce_new_root(arena, self.root, sibling, &state)?;
            self.set_root(arena, new_root)?;
        }
        Ok(())
    }

    /// Insert without touching the search index. `ndx` of `None` appends.
    pub(crate) fn insert_raw(
        &mut self,
        arena: &mut Arena,
        ndx: Option<usize>,
        v: i64,
        num_rows: usize,
    ) -> Result<()> {
        let size = self.size(arena)?;
        let ndx = match ndx {
            Some(n) if n == size => None,
            Some(n) if n > size => {
                return Err(StoreError::RowOutOfBounds { row: n, size });
            }
            other => other,
        };
        for i in 0..num_rows {
            self.tree_insert_one(arena, ndx.map(|n| n + i), v)?;
        }
        Ok(())
    }

    /// Insert `num_rows` copies of `v` at `ndx` (`None` appends). The
    /// column is updated first, the index second.
    pub fn insert(
        &mut self,
        arena: &mut Arena,
        ndx: Option<usize>,
        v: i64,
        num_rows: usize,
    ) -> Result<()> {
        let size = self.size(arena)?;
        let is_append = ndx.is_none() || ndx == Some(size);
        self.insert_raw(arena, ndx, v, num_rows)?;
        let key = self.index_key(v);
        if let Some(index) = &mut self.index {
            let row = if is_append { size } else { ndx.unwrap_or(size) };
            index.insert(row, key, num_rows, is_append)?;
        }
        Ok(())
    }

    /// Append a value.
    pub fn add(&mut self, arena: &mut Arena, v: i64) -> Result<()> {
        self.insert(arena, None, v, 1)
    }

    fn tree_erase(&mut self, arena: &mut Arena, ndx: usize, is_last: bool) -> Result<()> {
        if self.root_is_leaf(arena)? {
            return leaf_int::erase(arena, self.root, ndx);
        }
        struct Handler {
            flags: NodeFlags,
        }
        impl EraseHandler for Handler {
            fn erase_leaf_elem(
                &mut self,
                arena: &mut Arena,
                leaf: Ref,
                ndx: Option<usize>,
            ) -> Result<bool> {
                let n = leaf_int::count(arena, leaf)?;
                if n == 1 {
                    return Ok(true);
                }
                leaf_int::erase(arena, leaf, ndx.unwrap_or(n - 1)).map(|()| false)
            }
            fn destroy_leaf(&mut self, arena: &mut Arena, leaf: Ref) {
                node::destroy_deep(arena, leaf);
            }
            fn make_empty_leaf(&mut self, arena: &mut Arena) -> Result<Ref> {
                leaf_int::create_with_flags(arena, self.flags, &[])
            }
        }
        let flags = node_flags_for(self.leaf_type);
        let ndx = if is_last { None } else { Some(ndx) };
        if let Some(new_root) = bptree::erase(arena, self.root, ndx, &mut Handler { flags })? {
            self.set_root(arena, new_root)?;
        }
        Ok(())
    }

    /// Erase without touching the search index.
    pub(crate) fn erase_raw(&mut self, arena: &mut Arena, ndx: usize, is_last: bool) -> Result<()> {
        self.tree_erase(arena, ndx, is_last)
    }

    /// Remove the row at `ndx`. The index is updated first, while row
    /// numbering still matches.
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

    /// Move the last row over `row_ndx`. `last_row_ndx` must be the current
    /// last row.
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
        let moved = self.get(arena, last_row_ndx)?;
        let key = self.index_key(moved);
        if let Some(index) = &mut self.index {
            // Remove the overwritten row without shifting subsequent rows,
            // then re-point the moved value.
            index.erase(row_ndx, true);
            if row_ndx != last_row_ndx {
                index.update_ref(&key, last_row_ndx, row_ndx);
            }
        }
        self.move_last_over_raw(arena, row_ndx, last_row_ndx, moved)
    }

    pub(crate) fn move_last_over_raw(
        &mut self,
        arena: &mut Arena,
        row_ndx: usize,
        last_row_ndx: usize,
        moved: i64,
    ) -> Result<()> {
        if row_ndx != last_row_ndx {
            self.tree_set(arena, row_ndx, moved)?;
        }
        self.tree_erase(arena, last_row_ndx, true)
    }

    /// Remove all rows. A non-leaf root is replaced by a fresh empty leaf.
    pub fn clear(&mut self, arena: &mut Arena) -> Result<()> {
        if let Some(index) = &mut self.index {
            index.clear();
        }
        self.clear_raw(arena)
    }

    pub(crate) fn clear_raw(&mut self, arena: &mut Arena) -> Result<()> {
        if self.root_is_leaf(arena)? {
            return leaf_int::clear(arena, self.root);
        }
        let flags = node_flags_for(self.leaf_type);
        let new_root = leaf_int::create_with_flags(arena, flags, &[])?;
        node::destroy_deep(arena, self.root);
        self.set_root(arena, new_root)
    }

    /// Swap the values of two rows, index-aware.
    pub fn swap_rows(&mut self, arena: &mut Arena, a: usize, b: usize) -> Result<()> {
        if a == b {
            return Ok(());
        }
        let va = self.get(arena, a)?;
        let vb = self.get(arena, b)?;
        if let Some(index) = &mut self.index {
            index.set(a, IndexKey::Int(vb))?;
            index.set(b, IndexKey::Int(va))?;
        }
        self.tree_set(arena, a, vb)?;
        self.tree_set(arena, b, va)
    }

    /// Destroy the whole tree (and index).
    pub fn destroy(&mut self, arena: &mut Arena) {
        node::destroy_deep(arena, self.root);
        self.index = None;
    }

    /// If the slot at `ndx` holds a ref, recursively destroy the subtree
    /// it points at. Null and tagged slots are left alone.
    pub fn destroy_subtree(&mut self, arena: &mut Arena, ndx: usize, clear_value: bool) -> Result<()> {
        match self.get_slot(arena, ndx)? {
            Slot::Ref(child) => {
                node::destroy_deep(arena, child);
                debug!(row = ndx, subtree = child.get(), "destroy slot subtree");
                if clear_value {
                    self.set(arena, ndx, 0)?;
                }
                Ok(())
            }
            Slot::Null | Slot::Tagged(_) => Ok(()),
        }
    }

    // -- leaf iteration -----------------------------------------------------

    /// Visit each leaf in row order as `(leaf_ref, row_offset)`.
    fn for_each_leaf<F>(&self, arena: &Arena, mut f: F) -> Result<()>
    where
        F: FnMut(&Arena, Ref, usize) -> Result<bool>,
    {
        let size = self.size(arena)?;
        if self.root_is_leaf(arena)? {
            f(arena, self.root, 0)?;
            return Ok(());
        }
        let mut row = 0;
        while row < size {
            let (leaf, rel) = bptree::get_leaf(arena, self.root, row)?;
            debug_assert_eq!(rel, 0);
            let leaf_size = leaf_int::count(arena, leaf)?;
            if !f(arena, leaf, row)? {
                return Ok(());
            }
            row += leaf_size;
        }
        Ok(())
    }

    // -- scans and aggregates ----------------------------------------------

    /// Smallest row in `[begin, end)` holding `v`. `end` of `None` means
    /// the column size. Delegates to the index for full-range scans.
    pub fn find_first(
        &self,
        arena: &Arena,
        v: i64,
        begin: usize,
        end: Option<usize>,
    ) -> Result<Option<usize>> {
        let size = self.size(arena)?;
        let end = end.unwrap_or(size).min(size);
        if let Some(index) = &self.index {
            if begin == 0 && end == size {
                return Ok(index.find_first(&self.index_key(v)));
            }
        }
        let mut found = None;
        self.for_each_leaf(arena, |arena, leaf, offset| {
            let leaf_size = leaf_int::count(arena, leaf)?;
            if offset + leaf_size <= begin || offset >= end {
                return Ok(found.is_none() && offset < end);
            }
            let lo = begin.saturating_sub(offset);
            let hi = (end - offset).min(leaf_size);
            if let Some(ndx) = leaf_int::find_first(arena, leaf, v, lo, hi)? {
                found = Some(offset + ndx);
                return Ok(false);
            }
            Ok(true)
        })?;
        Ok(found)
    }

    /// All rows in `[begin, end)` holding `v`, ascending.
    pub fn find_all(
        &self,
        arena: &Arena,
        v: i64,
        begin: usize,
        end: Option<usize>,
    ) -> Result<Vec<usize>> {
        let size = self.size(arena)?;
        let end = end.unwrap_or(size).min(size);
        if let Some(index) = &self.index {
            if begin == 0 && end == size {
                return Ok(index.find_all(&self.index_key(v)));
            }
        }
        let mut out = Vec::new();
        for row in begin..end {
            if self.get(arena, row)? == v {
                out.push(row);
            }
        }
        Ok(out)
    }

    /// Number of rows holding `v`. Uses the index when present.
    pub fn count(&self, arena: &Arena, v: i64) -> Result<usize> {
        if let Some(index) = &self.index {
            return Ok(index.count(&self.index_key(v)));
        }
        let mut n = 0;
        let size = self.size(arena)?;
        for row in 0..size {
            if self.get(arena, row)? == v {
                n += 1;
            }
        }
        Ok(n)
    }

    /// Sum of `[start, end)` (nulls excluded).
    pub fn sum(&self, arena: &Arena, start: usize, end: Option<usize>) -> Result<i64> {
        let size = self.size(arena)?;
        let end = end.unwrap_or(size).min(size);
        let mut total = 0i64;
        for row in start..end {
            let v = self.get(arena, row)?;
            if !(self.nullable && v == NULL_INT) {
                total = total.wrapping_add(v);
            }
        }
        Ok(total)
    }

    /// Minimum of `[start, end)` with its row (nulls excluded).
    pub fn minimum(
        &self,
        arena: &Arena,
        start: usize,
        end: Option<usize>,
    ) -> Result<Option<(i64, usize)>> {
        self.extremum(arena, start, end, |candidate, best| candidate < best)
    }

    /// Maximum of `[start, end)` with its row (nulls excluded).
    pub fn maximum(
        &self,
        arena: &Arena,
        start: usize,
        end: Option<usize>,
    ) -> Result<Option<(i64, usize)>> {
        self.extremum(arena, start, end, |candidate, best| candidate > best)
    }

    fn extremum(
        &self,
        arena: &Arena,
        start: usize,
        end: Option<usize>,
        better: impl Fn(i64, i64) -> bool,
    ) -> Result<Option<(i64, usize)>> {
        let size = self.size(arena)?;
        let end = end.unwrap_or(size).min(size);
        let mut best: Option<(i64, usize)> = None;
        for row in start..end {
            let v = self.get(arena, row)?;
            if self.nullable && v == NULL_INT {
                continue;
            }
            match best {
                None => best = Some((v, row)),
                Some((b, _)) if better(v, b) => best = Some((v, row)),
                _ => {}
            }
        }
        Ok(best)
    }

    /// Average of `[start, end)`.
    pub fn average(&self, arena: &Arena, start: usize, end: Option<usize>) -> Result<f64> {
        let size = self.size(arena)?;
        let end = end.unwrap_or(size).min(size);
        let n = end.saturating_sub(start);
        let sum = self.sum(arena, start, Some(end))?;
        Ok(sum as f64 / if n == 0 { 1.0 } else { n as f64 })
    }

    // -- adjust family ------------------------------------------------------

    /// Add `diff` to the value at `ndx`.
    pub fn adjust(&mut self, arena: &mut Arena, ndx: usize, diff: i64) -> Result<()> {
        let v = self.get(arena, ndx)?;
        self.set(arena, ndx, v + diff)
    }

    /// Add `diff` to every value.
    pub fn adjust_all(&mut self, arena: &mut Arena, diff: i64) -> Result<()> {
        let size = self.size(arena)?;
        for row in 0..size {
            self.adjust(arena, row, diff)?;
        }
        Ok(())
    }

    /// Add `diff` to every value greater than or equal to `limit`.
    pub fn adjust_ge(&mut self, arena: &mut Arena, limit: i64, diff: i64) -> Result<()> {
        let size = self.size(arena)?;
        for row in 0..size {
            let v = self.get(arena, row)?;
            if v >= limit {
                self.set(arena, row, v + diff)?;
            }
        }
        Ok(())
    }

    // -- sorted-column searches ---------------------------------------------

    /// Lower bound over an ascending column.
    pub fn lower_bound(&self, arena: &Arena, v: i64) -> Result<usize> {
        if self.root_is_leaf(arena)? {
            return leaf_int::lower_bound(arena, self.root, v);
        }
        self.tree_bound(arena, v, |probe, v| probe < v)
    }

    /// Upper bound over an ascending column.
    pub fn upper_bound(&self, arena: &Arena, v: i64) -> Result<usize> {
        if self.root_is_leaf(arena)? {
            return leaf_int::upper_bound(arena, self.root, v);
        }
        self.tree_bound(arena, v, |probe, v| probe <= v)
    }

    fn tree_bound(
        &self,
        arena: &Arena,
        v: i64,
        go_right: impl Fn(i64, i64) -> bool,
    ) -> Result<usize> {
        let mut lo = 0usize;
        let mut len = self.size(arena)?;
        while len > 0 {
            let half = len / 2;
            let mid = lo + half;
            let probe = self.get(arena, mid)?;
            if go_right(probe, v) {
                lo = mid + 1;
                len -= half + 1;
            } else {
                len = half;
            }
        }
        Ok(lo)
    }

    /// First row at or after `start` whose value is >= `target`, over a
    /// sorted column.
    pub fn find_gte(&self, arena: &Arena, target: i64, start: usize) -> Result<Option<usize>> {
        let size = self.size(arena)?;
        for row in start..size {
            if self.get(arena, row)? >= target {
                return Ok(Some(row));
            }
        }
        Ok(None)
    }

    /// Element-wise equality with another integer column.
    pub fn compare(&self, arena: &Arena, other: &IntColumn) -> Result<bool> {
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

    /// Re-synchronize with the ref graph after an external commit: re-read
    /// the root ref from the parent's slot and rebuild the index content.
    pub fn refresh_accessor_tree(&mut self, arena: &Arena) -> Result<()> {
        let Some((parent, ndx)) = self.parent else {
            return Ok(());
        };
        let root = node::slot_get(arena, parent, ndx)?
            .as_ref_value()
            .ok_or(StoreError::NodePayloadMismatch {
                detail: "column root slot is not a ref",
            })?;
        self.root = root;
        if self.index.is_some() {
            let size = self.size(arena)?;
            let mut keys = Vec::with_capacity(size);
            for row in 0..size {
                keys.push(self.index_key(self.get(arena, row)?));
            }
            if let Some(index) = &mut self.index {
                index.rebuild(keys)?;
                index.set_ndx_in_parent(ndx + 1);
            }
        }
        Ok(())
    }
}

const fn node_flags_for(leaf_type: NodeType) -> NodeFlags {
    match leaf_type {
        NodeType::HasRefs => NodeFlags {
            inner: false,
            hasrefs: true,
            context: false,
        },
        _ => NodeFlags {
            inner: false,
            hasrefs: false,
            context: false,
        },
    }
}
