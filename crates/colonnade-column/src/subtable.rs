//! The subtable column.
//!
//! Each slot is either 0 (empty subtable) or the ref of a child table's
//! columns block. The column also keeps a small map of live child-table
//! accessors so that open accessors stay consistent while the parent
//! mutates underneath them.
//!
//! The map holds weak references only — accessors are kept alive by their
//! external handles — but while the map is non-empty it pins the parent
//! table accessor through a strong reference to its pin. Dropping the last
//! handle to a child accessor reaches back into the map, which is why the
//! map lock is re-entrant: `detach_and_remove_all` can be the code that
//! drops that last handle while already holding the lock.

use std::cell::RefCell;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use colonnade_arena::Arena;
use colonnade_btree::node;
use colonnade_error::{Result, StoreError};
use colonnade_types::{NodeType, Ref, Slot};
use parking_lot::{Mutex, ReentrantMutex};
use smallvec::SmallVec;
use tracing::debug;

use crate::cascade::CascadeState;
use crate::integer::IntColumn;
use crate::spec::Spec;

static NEXT_ACCESSOR_ID: AtomicU64 = AtomicU64::new(1);

/// Identity object for a parent table accessor. The subtable map holds a
/// strong reference to it exactly while the map is non-empty; tests and
/// the table layer observe pinning through the strong count.
#[derive(Debug, Default)]
pub struct TablePin;

// ---------------------------------------------------------------------------
// Child table accessor
// ---------------------------------------------------------------------------

#[derive(Debug)]
struct ChildState {
    columns_ref: Option<Ref>,
    /// Top ref of the shared sub-spec this child table follows, when the
    /// owning column is wired to one.
    spec_ref: Option<Ref>,
    /// Cached schema accessor over `spec_ref`; re-read on every refresh.
    spec: Option<Spec>,
    row_ndx: usize,
    version: u64,
    detached: bool,
    marked: bool,
}

/// Live accessor for the child table stored at one row of a subtable
/// column. Shared by reference count; the owning column only holds a weak
/// entry in its map.
#[derive(Debug)]
pub struct ChildTable {
    id: u64,
    map: Weak<SubtableMapHandle>,
    state: Mutex<ChildState>,
}

impl ChildTable {
    fn new(
        map: &Arc<SubtableMapHandle>,
        columns_ref: Option<Ref>,
        spec_ref: Option<Ref>,
        spec: Option<Spec>,
        row_ndx: usize,
    ) -> Arc<Self> {
        Arc::new(Self {
            id: NEXT_ACCESSOR_ID.fetch_add(1, Ordering::Relaxed),
            map: Arc::downgrade(map),
            state: Mutex::new(ChildState {
                columns_ref,
                spec_ref,
                spec,
                row_ndx,
                version: 0,
                detached: false,
                marked: false,
            }),
        })
    }

    /// Row of the parent column this accessor mirrors.
    pub fn row_ndx(&self) -> usize {
        self.state.lock().row_ndx
    }

    /// Bumped whenever the underlying subtable is replaced or refreshed.
    pub fn version(&self) -> u64 {
        self.state.lock().version
    }

    pub fn is_attached(&self) -> bool {
        !self.state.lock().detached
    }

    /// Mark this accessor dirty for the next refresh pass.
    pub fn mark(&self) {
        self.state.lock().marked = true;
    }

    pub fn is_marked(&self) -> bool {
        self.state.lock().marked
    }

    /// Row count of the child table: the size of its first column, or 0
    /// for an empty subtable.
    pub fn size(&self, arena: &Arena) -> Result<usize> {
        let state = self.state.lock();
        if state.detached {
            return Err(StoreError::DetachedAccessor);
        }
        let Some(columns_ref) = state.columns_ref else {
            return Ok(0);
        };
        child_table_size(arena, columns_ref)
    }

    /// The child table's columns block, if any.
    pub fn columns_ref(&self) -> Result<Option<Ref>> {
        let state = self.state.lock();
        if state.detached {
            return Err(StoreError::DetachedAccessor);
        }
        Ok(state.columns_ref)
    }

    /// Run `f` against the child's cached schema accessor, if one is
    /// wired.
    pub fn with_spec<R>(&self, f: impl FnOnce(Option<&Spec>) -> R) -> R {
        let state = self.state.lock();
        f(state.spec.as_ref())
    }

    fn detach(&self) {
        self.state.lock().detached = true;
    }

    fn set_row_ndx(&self, row_ndx: usize) {
        self.state.lock().row_ndx = row_ndx;
    }

    /// Full refresh: re-point at the current slot contents, re-read the
    /// spec, bump the version, clear the dirty mark.
    fn reattach(&self, arena: &Arena, columns_ref: Option<Ref>) -> Result<()> {
        let mut state = self.state.lock();
        state.columns_ref = columns_ref;
        if let Some(spec_ref) = state.spec_ref {
            state.spec = Some(Spec::from_ref(arena, spec_ref)?);
        }
        state.version += 1;
        state.marked = false;
        Ok(())
    }

    /// Spec-only refresh for accessors that were not marked dirty: the
    /// schema accessor is re-read and the version bumped, the columns
    /// pointer is left alone.
    fn refresh_spec(&self, arena: &Arena) -> Result<()> {
        let mut state = self.state.lock();
        if let Some(spec_ref) = state.spec_ref {
            state.spec = Some(Spec::from_ref(arena, spec_ref)?);
        }
        state.version += 1;
        Ok(())
    }
}

impl Drop for ChildTable {
    fn drop(&mut self) {
        // The destructor reaches back into the owning column's map; the
        // map lock is re-entrant to make this safe when the drop happens
        // under the lock (detach_and_remove_all).
        if let Some(map) = self.map.upgrade() {
            map.child_accessor_destroyed(self.id);
        }
    }
}

/// Row count of a child table identified by its columns block.
pub fn child_table_size(arena: &Arena, columns_ref: Ref) -> Result<usize> {
    let block = arena.translate(columns_ref)?;
    if node::slot_count(block) == 0 {
        return Ok(0);
    }
    match node::slot_get(arena, columns_ref, 0)? {
        Slot::Ref(first_col) => node::size_from_ref(arena, first_col),
        _ => Err(StoreError::NodePayloadMismatch {
            detail: "child table first column slot is not a ref",
        }),
    }
}

// ---------------------------------------------------------------------------
// Subtable map
// ---------------------------------------------------------------------------

#[derive(Debug)]
struct MapEntry {
    row_ndx: usize,
    id: u64,
    table: Weak<ChildTable>,
}

#[derive(Debug, Default)]
struct SubtableMap {
    entries: SmallVec<[MapEntry; 4]>,
    pin: Option<Arc<TablePin>>,
}

/// The lock-wrapped accessor map shared between a subtable column and its
/// children (children hold it weakly for the drop notification).
#[derive(Debug, Default)]
pub struct SubtableMapHandle {
    inner: ReentrantMutex<RefCell<SubtableMap>>,
}

impl SubtableMapHandle {
    fn child_accessor_destroyed(&self, id: u64) {
        let guard = self.inner.lock();
        let became_empty = {
            let mut map = guard.borrow_mut();
            if let Some(pos) = map.entries.iter().position(|e| e.id == id) {
                // Swap with last, then pop.
                map.entries.swap_remove(pos);
            }
            map.entries.is_empty()
        };
        if became_empty {
            // Dropping the pin releases the parent table accessor.
            guard.borrow_mut().pin = None;
        }
    }

    fn find(&self, row_ndx: usize) -> Option<Arc<ChildTable>> {
        let guard = self.inner.lock();
        let weak = {
            let map = guard.borrow();
            map.entries
                .iter()
                .find(|e| e.row_ndx == row_ndx)
                .map(|e| e.table.clone())
        };
        weak.and_then(|w| w.upgrade())
    }

    fn add(&self, row_ndx: usize, table: &Arc<ChildTable>, pin: Option<Arc<TablePin>>) {
        let guard = self.inner.lock();
        let mut map = guard.borrow_mut();
        debug_assert!(
            map.entries.iter().all(|e| e.row_ndx != row_ndx),
            "at most one live accessor per row"
        );
        if map.entries.is_empty() {
            map.pin = pin;
        }
        map.entries.push(MapEntry {
            row_ndx,
            id: table.id,
            table: Arc::downgrade(table),
        });
    }

    /// Number of live entries.
    fn len(&self) -> usize {
        self.inner.lock().borrow().entries.len()
    }

    fn is_pinned(&self) -> bool {
        self.inner.lock().borrow().pin.is_some()
    }

    /// Detach every live accessor and clear the map. Each accessor is held
    /// through a transient strong reference while detaching; dropping
    /// those references re-enters the lock, which is why the entries are
    /// taken out before any drop happens.
    fn detach_and_remove_all(&self) {
        let guard = self.inner.lock();
        let (tables, _pin) = {
            let mut map = guard.borrow_mut();
            let tables: Vec<Arc<ChildTable>> = map
                .entries
                .iter()
                .filter_map(|e| e.table.upgrade())
                .collect();
            map.entries.clear();
            (tables, map.pin.take())
        };
        for table in &tables {
            table.detach();
        }
        // Transient strong references (and the pin) drop here, outside the
        // RefCell borrow.
        drop(tables);
    }

    /// Detach and remove the accessor at `row_ndx`, if any.
    fn detach_and_remove(&self, row_ndx: usize) {
        let guard = self.inner.lock();
        let (table, became_empty) = {
            let mut map = guard.borrow_mut();
            let Some(pos) = map.entries.iter().position(|e| e.row_ndx == row_ndx) else {
                return;
            };
            let table = map.entries[pos].table.upgrade();
            map.entries.swap_remove(pos);
            (table, map.entries.is_empty())
        };
        if became_empty {
            guard.borrow_mut().pin = None;
        }
        if let Some(table) = table {
            table.detach();
        }
    }

    /// Shift the row index of accessors at or after `row_ndx` up by
    /// `num_rows` (rows were inserted).
    fn adj_insert_rows(&self, row_ndx: usize, num_rows: usize) {
        let guard = self.inner.lock();
        let tables: Vec<(Arc<ChildTable>, usize)> = {
            let mut map = guard.borrow_mut();
            let mut out = Vec::new();
            for entry in map.entries.iter_mut() {
                if entry.row_ndx >= row_ndx {
                    entry.row_ndx += num_rows;
                    if let Some(t) = entry.table.upgrade() {
                        let new_ndx = entry.row_ndx;
                        out.push((t, new_ndx));
                    }
                }
            }
            out
        };
        for (table, ndx) in tables {
            table.set_row_ndx(ndx);
        }
    }

    /// Shift the row index of accessors after `row_ndx` down by one (a row
    /// was erased).
    fn adj_erase_row(&self, row_ndx: usize) {
        let guard = self.inner.lock();
        let tables: Vec<(Arc<ChildTable>, usize)> = {
            let mut map = guard.borrow_mut();
            let mut out = Vec::new();
            for entry in map.entries.iter_mut() {
                if entry.row_ndx > row_ndx {
                    entry.row_ndx -= 1;
                    if let Some(t) = entry.table.upgrade() {
                        let new_ndx = entry.row_ndx;
                        out.push((t, new_ndx));
                    }
                }
            }
            out
        };
        for (table, ndx) in tables {
            table.set_row_ndx(ndx);
        }
    }

    /// Move the accessor at `from_row` to `to_row` (move-last-over).
    fn adj_move_over(&self, from_row: usize, to_row: usize) {
        let guard = self.inner.lock();
        let table = {
            let mut map = guard.borrow_mut();
            let mut found = None;
            for entry in map.entries.iter_mut() {
                if entry.row_ndx == from_row {
                    entry.row_ndx = to_row;
                    found = entry.table.upgrade();
                }
            }
            found
        };
        if let Some(table) = table {
            table.set_row_ndx(to_row);
        }
    }

    /// Refresh every live accessor bottom-up after an external commit.
    ///
    /// Iterates in reverse because entries may be removed while iterating
    /// (a dead weak entry is pruned on sight). Marked accessors are
    /// re-pointed at the current slot contents and bumped; unmarked ones
    /// get their row index reasserted and their spec refreshed only.
    fn refresh_accessor_tree<F>(&self, arena: &Arena, columns_ref_at: F) -> Result<()>
    where
        F: Fn(usize) -> Result<Option<Ref>>,
    {
        let guard = self.inner.lock();
        let mut i = guard.borrow().entries.len();
        while i > 0 {
            i -= 1;
            let (table, row_ndx) = {
                let mut map = guard.borrow_mut();
                let entry = &map.entries[i];
                match entry.table.upgrade() {
                    Some(t) => (t, entry.row_ndx),
                    None => {
                        map.entries.swap_remove(i);
                        continue;
                    }
                }
            };
            table.set_row_ndx(row_ndx);
            if table.is_marked() {
                let columns_ref = columns_ref_at(row_ndx)?;
                table.reattach(arena, columns_ref)?;
            } else {
                table.refresh_spec(arena)?;
            }
        }
        let became_empty = guard.borrow().entries.is_empty();
        if became_empty {
            guard.borrow_mut().pin = None;
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Subtable column
// ---------------------------------------------------------------------------

/// Column of child-table roots with a live-accessor map.
#[derive(Debug)]
pub struct SubtableColumn {
    col: IntColumn,
    map: Arc<SubtableMapHandle>,
    parent_pin: Weak<TablePin>,
    /// Group-level index of the owning table, for cascade bookkeeping.
    table_ndx: Option<usize>,
    /// Top ref of the shared sub-spec all child tables of this column
    /// follow (wired by the owning column set).
    subspec_ref: Option<Ref>,
}

impl SubtableColumn {
    /// Create a new empty column. `parent_pin` identifies the owning table
    /// accessor; it is pinned while any child accessor is live.
    pub fn create(arena: &mut Arena, parent_pin: &Arc<TablePin>) -> Result<Self> {
        Ok(Self {
            col: IntColumn::create(arena, NodeType::HasRefs, false)?,
            map: Arc::new(SubtableMapHandle::default()),
            parent_pin: Arc::downgrade(parent_pin),
            table_ndx: None,
            subspec_ref: None,
        })
    }

    /// Attach to an existing root.
    pub fn from_ref(arena: &Arena, root: Ref, parent_pin: &Arc<TablePin>) -> Result<Self> {
        Ok(Self {
            col: IntColumn::from_ref(arena, root, false)?,
            map: Arc::new(SubtableMapHandle::default()),
            parent_pin: Arc::downgrade(parent_pin),
            table_ndx: None,
            subspec_ref: None,
        })
    }

    /// Wire the shared sub-spec child accessors read their schema from.
    pub fn set_subspec_ref(&mut self, subspec_ref: Ref) {
        self.subspec_ref = Some(subspec_ref);
    }

    pub fn root(&self) -> Ref {
        self.col.root()
    }

    pub fn set_parent(&mut self, parent: Ref, ndx_in_parent: usize) {
        self.col.set_parent(parent, ndx_in_parent);
    }

    pub fn set_ndx_in_parent(&mut self, ndx: usize) {
        self.col.set_ndx_in_parent(ndx);
    }

    pub fn set_table_ndx(&mut self, table_ndx: usize) {
        self.table_ndx = Some(table_ndx);
    }

    pub fn size(&self, arena: &Arena) -> Result<usize> {
        self.col.size(arena)
    }

    /// Number of live child accessors.
    pub fn live_accessor_count(&self) -> usize {
        self.map.len()
    }

    /// Whether the parent table accessor is currently pinned by the map.
    pub fn parent_is_pinned(&self) -> bool {
        self.map.is_pinned()
    }

    fn slot_at(&self, arena: &Arena, row_ndx: usize) -> Result<Option<Ref>> {
        match self.col.get_slot(arena, row_ndx)? {
            Slot::Null => Ok(None),
            Slot::Ref(r) => Ok(Some(r)),
            Slot::Tagged(_) => Err(StoreError::NodePayloadMismatch {
                detail: "subtable slot holds a tagged scalar",
            }),
        }
    }

    /// Row count of the subtable at `row_ndx` without instantiating an
    /// accessor.
    pub fn get_subtable_size(&self, arena: &Arena, row_ndx: usize) -> Result<usize> {
        match self.slot_at(arena, row_ndx)? {
            None => Ok(0),
            Some(columns_ref) => child_table_size(arena, columns_ref),
        }
    }

    /// Return the live accessor for the subtable at `row_ndx`, creating
    /// and registering one if none exists. Creating the first accessor
    /// pins the parent table accessor.
    pub fn get_subtable(&self, arena: &Arena, row_ndx: usize) -> Result<Arc<ChildTable>> {
        let size = self.size(arena)?;
        if row_ndx >= size {
            return Err(StoreError::RowOutOfBounds { row: row_ndx, size });
        }
        if let Some(existing) = self.map.find(row_ndx) {
            return Ok(existing);
        }
        let columns_ref = self.slot_at(arena, row_ndx)?;
        let spec = match self.subspec_ref {
            Some(spec_ref) => Some(Spec::from_ref(arena, spec_ref)?),
            None => None,
        };
        let table = ChildTable::new(&self.map, columns_ref, self.subspec_ref, spec, row_ndx);
        self.map.add(row_ndx, &table, self.parent_pin.upgrade());
        Ok(table)
    }

    /// Clone `source` (a columns block) into the arena and store the clone
    /// at `row_ndx`, freeing whatever the slot pointed at before. A live
    /// accessor at that row is re-pointed at the new subtable.
    pub fn set_subtable(
        &mut self,
        arena: &mut Arena,
        row_ndx: usize,
        source: Option<Ref>,
    ) -> Result<()> {
        let size = self.size(arena)?;
        if row_ndx >= size {
            return Err(StoreError::RowOutOfBounds { row: row_ndx, size });
        }
        self.destroy_subtable(arena, row_ndx)?;
        let new_ref = match source {
            None => None,
            Some(src) => Some(node::clone_deep(arena, src)?),
        };
        let slot = new_ref.map_or(Slot::Null, Slot::Ref);
        self.col.set_slot(arena, row_ndx, slot)?;
        debug!(row = row_ndx, "set subtable");

        if let Some(table) = self.map.find(row_ndx) {
            table.reattach(arena, new_ref)?;
        }
        Ok(())
    }

    /// Insert a row holding a clone of `source` at `row_ndx` (`None`
    /// appends).
    pub fn insert_subtable(
        &mut self,
        arena: &mut Arena,
        row_ndx: Option<usize>,
        source: Option<Ref>,
    ) -> Result<()> {
        let size = self.size(arena)?;
        let new_ref = match source {
            None => None,
            Some(src) => Some(node::clone_deep(arena, src)?),
        };
        let slot = new_ref.map_or(Slot::Null, Slot::Ref);
        self.col.insert(arena, row_ndx, slot.to_raw() as i64, 1)?;
        let at = row_ndx.unwrap_or(size);
        if at < size {
            self.map.adj_insert_rows(at, 1);
        }
        Ok(())
    }

    /// Append a row holding a clone of `source`.
    pub fn add_subtable(&mut self, arena: &mut Arena, source: Option<Ref>) -> Result<()> {
        self.insert_subtable(arena, None, source)
    }

    /// Overwrite the subtable at `row_ndx` with the empty subtable.
    pub fn set_null(&mut self, arena: &mut Arena, row_ndx: usize) -> Result<()> {
        self.destroy_subtable(arena, row_ndx)?;
        self.col.set_slot(arena, row_ndx, Slot::Null)?;
        if let Some(table) = self.map.find(row_ndx) {
            table.reattach(arena, None)?;
        }
        Ok(())
    }

    /// Remove the row at `row_ndx`, freeing its subtree first. A live
    /// accessor at that row is detached; later accessors shift down.
    pub fn erase(&mut self, arena: &mut Arena, row_ndx: usize) -> Result<()> {
        self.destroy_subtable(arena, row_ndx)?;
        self.col.erase(arena, row_ndx)?;
        self.map.detach_and_remove(row_ndx);
        self.map.adj_erase_row(row_ndx);
        Ok(())
    }

    /// Remove `num_rows` consecutive rows starting at `row_ndx`, freeing
    /// each subtree before its slot goes away.
    pub fn erase_rows(
        &mut self,
        arena: &mut Arena,
        row_ndx: usize,
        num_rows: usize,
    ) -> Result<()> {
        for i in 0..num_rows {
            self.destroy_subtable(arena, row_ndx + i)?;
        }
        for _ in 0..num_rows {
            self.col.erase(arena, row_ndx)?;
            self.map.detach_and_remove(row_ndx);
            self.map.adj_erase_row(row_ndx);
        }
        Ok(())
    }

    /// Move the last row over `row_ndx`, freeing the overwritten subtree.
    pub fn move_last_row_over(
        &mut self,
        arena: &mut Arena,
        row_ndx: usize,
        last_row_ndx: usize,
    ) -> Result<()> {
        self.destroy_subtable(arena, row_ndx)?;
        self.map.detach_and_remove(row_ndx);
        self.col.move_last_over(arena, row_ndx, last_row_ndx)?;
        self.map.adj_move_over(last_row_ndx, row_ndx);
        Ok(())
    }

    /// Remove all rows, freeing every subtree. Live accessors are
    /// detached.
    pub fn clear(&mut self, arena: &mut Arena) -> Result<()> {
        let size = self.size(arena)?;
        for row in 0..size {
            self.destroy_subtable(arena, row)?;
        }
        self.col.clear(arena)?;
        self.map.detach_and_remove_all();
        Ok(())
    }

    /// Detach and drop all live child accessors without touching data.
    pub fn discard_child_accessors(&self) {
        self.map.detach_and_remove_all();
    }

    fn destroy_subtable(&mut self, arena: &mut Arena, row_ndx: usize) -> Result<()> {
        self.col.destroy_subtree(arena, row_ndx, false)
    }

    /// Destroy the whole column (all subtrees and the root tree).
    pub fn destroy(&mut self, arena: &mut Arena) {
        self.map.detach_and_remove_all();
        // The root tree is ref-bearing, so deep destroy takes the
        // subtables with it.
        self.col.destroy(arena);
    }

    /// Forward a cascade break into the child table at `row_ndx`. The stop
    /// marker placed by a table clear suppresses re-entry.
    pub fn cascade_break_backlinks_to(
        &self,
        _arena: &Arena,
        row_ndx: usize,
        state: &mut CascadeState,
    ) -> Result<()> {
        let Some(table_ndx) = self.table_ndx else {
            return Ok(());
        };
        if state.is_table_stopped(table_ndx) {
            return Ok(());
        }
        state.add_row(table_ndx, row_ndx);
        Ok(())
    }

    /// Re-synchronize after an external commit: refresh the root, then
    /// walk live accessors in reverse. Marked accessors are re-pointed at
    /// current slot contents; unmarked ones get their spec refreshed only.
    pub fn refresh_accessor_tree(&mut self, arena: &Arena) -> Result<()> {
        self.col.refresh_accessor_tree(arena)?;
        let col = &self.col;
        self.map.refresh_accessor_tree(arena, |row_ndx| {
            match col.get_slot(arena, row_ndx)? {
                Slot::Null => Ok(None),
                Slot::Ref(r) => Ok(Some(r)),
                Slot::Tagged(_) => Err(StoreError::NodePayloadMismatch {
                    detail: "subtable slot holds a tagged scalar",
                }),
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use colonnade_btree::leaf_int;

    /// Build a child-table columns block with one integer column holding
    /// `values`.
    fn make_child(arena: &mut Arena, values: &[i64]) -> Ref {
        let col = leaf_int::create(arena, values).unwrap();
        node::slots_create(
            arena,
            colonnade_types::NodeFlags {
                inner: false,
                hasrefs: true,
                context: false,
            },
            1,
            &[Slot::Ref(col)],
        )
        .unwrap()
    }

    fn setup(arena: &mut Arena) -> (SubtableColumn, Arc<TablePin>) {
        let pin = Arc::new(TablePin);
        let col = SubtableColumn::create(arena, &pin).unwrap();
        (col, pin)
    }

    #[test]
    fn empty_slots_read_as_empty_subtables() {
        let mut arena = Arena::new();
        let (mut col, _pin) = setup(&mut arena);
        col.add_subtable(&mut arena, None).unwrap();
        assert_eq!(col.get_subtable_size(&arena, 0).unwrap(), 0);
        let child = col.get_subtable(&arena, 0).unwrap();
        assert_eq!(child.size(&arena).unwrap(), 0);
    }

    #[test]
    fn set_clones_source() {
        let mut arena = Arena::new();
        let (mut col, _pin) = setup(&mut arena);
        col.add_subtable(&mut arena, None).unwrap();

        let source = make_child(&mut arena, &[1, 2, 3]);
        col.set_subtable(&mut arena, 0, Some(source)).unwrap();
        assert_eq!(col.get_subtable_size(&arena, 0).unwrap(), 3);

        // The stored subtable is a clone; freeing the source leaves it intact.
        node::destroy_deep(&mut arena, source);
        assert_eq!(col.get_subtable_size(&arena, 0).unwrap(), 3);
    }

    #[test]
    fn set_refreshes_live_accessor() {
        // Spec scenario 5.
        let mut arena = Arena::new();
        let (mut col, _pin) = setup(&mut arena);
        let one_row = make_child(&mut arena, &[42]);
        col.add_subtable(&mut arena, Some(one_row)).unwrap();

        let child = col.get_subtable(&arena, 0).unwrap();
        assert_eq!(child.size(&arena).unwrap(), 1);
        let version_before = child.version();
        let old_subtree = col.slot_at(&arena, 0).unwrap().unwrap();

        let two_rows = make_child(&mut arena, &[1, 2]);
        col.set_subtable(&mut arena, 0, Some(two_rows)).unwrap();

        // The old subtree was freed, and the same accessor observes the
        // replacement.
        assert!(!arena.is_live(old_subtree));
        assert_eq!(child.size(&arena).unwrap(), 2);
        assert!(child.version() > version_before);
    }

    #[test]
    fn map_uniqueness_and_parent_pinning() {
        let mut arena = Arena::new();
        let (mut col, pin) = setup(&mut arena);
        col.add_subtable(&mut arena, None).unwrap();
        col.add_subtable(&mut arena, None).unwrap();

        assert_eq!(Arc::strong_count(&pin), 1);
        assert!(!col.parent_is_pinned());

        let a1 = col.get_subtable(&arena, 0).unwrap();
        assert!(col.parent_is_pinned());
        assert_eq!(Arc::strong_count(&pin), 2);

        // Second lookup of the same row returns the same accessor.
        let a2 = col.get_subtable(&arena, 0).unwrap();
        assert!(Arc::ptr_eq(&a1, &a2));
        assert_eq!(col.live_accessor_count(), 1);

        let b = col.get_subtable(&arena, 1).unwrap();
        assert_eq!(col.live_accessor_count(), 2);
        assert_eq!(Arc::strong_count(&pin), 2);

        // Dropping the last handle to each row unpins the parent.
        drop(a1);
        drop(a2);
        assert_eq!(col.live_accessor_count(), 1);
        assert!(col.parent_is_pinned());
        drop(b);
        assert_eq!(col.live_accessor_count(), 0);
        assert!(!col.parent_is_pinned());
        assert_eq!(Arc::strong_count(&pin), 1);
    }

    #[test]
    fn erase_detaches_and_shifts() {
        let mut arena = Arena::new();
        let (mut col, _pin) = setup(&mut arena);
        for values in [&[1i64][..], &[2, 2], &[3, 3, 3]] {
            let child = make_child(&mut arena, values);
            col.add_subtable(&mut arena, Some(child)).unwrap();
            node::destroy_deep(&mut arena, child);
        }
        let a0 = col.get_subtable(&arena, 0).unwrap();
        let a2 = col.get_subtable(&arena, 2).unwrap();

        col.erase(&mut arena, 0).unwrap();
        assert!(!a0.is_attached());
        assert!(a0.size(&arena).is_err());
        assert_eq!(a2.row_ndx(), 1);
        assert_eq!(a2.size(&arena).unwrap(), 3);
        assert_eq!(col.size(&arena).unwrap(), 2);
    }

    #[test]
    fn move_last_row_over_adjusts_accessors() {
        let mut arena = Arena::new();
        let (mut col, _pin) = setup(&mut arena);
        for values in [&[1i64][..], &[2, 2], &[3, 3, 3]] {
            let child = make_child(&mut arena, values);
            col.add_subtable(&mut arena, Some(child)).unwrap();
            node::destroy_deep(&mut arena, child);
        }
        let a_last = col.get_subtable(&arena, 2).unwrap();
        col.move_last_row_over(&mut arena, 0, 2).unwrap();

        assert_eq!(col.size(&arena).unwrap(), 2);
        assert_eq!(a_last.row_ndx(), 0);
        assert_eq!(a_last.size(&arena).unwrap(), 3);
        assert_eq!(col.get_subtable_size(&arena, 0).unwrap(), 3);
    }

    #[test]
    fn clear_frees_subtrees_and_detaches() {
        let mut arena = Arena::new();
        let (mut col, pin) = setup(&mut arena);
        let child = make_child(&mut arena, &[5, 6]);
        col.add_subtable(&mut arena, Some(child)).unwrap();
        node::destroy_deep(&mut arena, child);

        let accessor = col.get_subtable(&arena, 0).unwrap();
        assert!(col.parent_is_pinned());

        col.clear(&mut arena).unwrap();
        assert_eq!(col.size(&arena).unwrap(), 0);
        assert!(!accessor.is_attached());
        assert!(!col.parent_is_pinned());
        assert_eq!(Arc::strong_count(&pin), 1);
        // Only the column's (empty) root remains.
        assert_eq!(arena.block_count(), 1);
    }

    #[test]
    fn refresh_reasserts_rows_and_marked_children() {
        let mut arena = Arena::new();
        let (mut col, _pin) = setup(&mut arena);
        let child = make_child(&mut arena, &[9]);
        col.add_subtable(&mut arena, Some(child)).unwrap();
        node::destroy_deep(&mut arena, child);

        let accessor = col.get_subtable(&arena, 0).unwrap();
        assert_eq!(accessor.size(&arena).unwrap(), 1);

        // Simulate an external commit replacing the slot contents.
        let replacement = make_child(&mut arena, &[7, 7, 7, 7]);
        let old = col.slot_at(&arena, 0).unwrap().unwrap();
        col.col.set_slot(&mut arena, 0, Slot::Ref(replacement)).unwrap();
        node::destroy_deep(&mut arena, old);
        arena.bump_version();

        accessor.mark();
        col.refresh_accessor_tree(&arena).unwrap();
        assert!(!accessor.is_marked());
        assert_eq!(accessor.size(&arena).unwrap(), 4);
    }

    #[test]
    fn refresh_bumps_unmarked_children_and_rereads_spec() {
        use colonnade_types::{ColumnAttr, ColumnType};

        let mut arena = Arena::new();
        let (mut col, _pin) = setup(&mut arena);
        let sub_spec_top = Spec::create_empty(&mut arena).unwrap();
        col.set_subspec_ref(sub_spec_top);
        col.add_subtable(&mut arena, None).unwrap();

        let accessor = col.get_subtable(&arena, 0).unwrap();
        accessor.with_spec(|spec| assert!(spec.is_some()));
        let version_before = accessor.version();

        // Another writer grows the shared sub-spec.
        let mut sub = Spec::from_ref(&arena, sub_spec_top).unwrap();
        sub.insert_column(&mut arena, 0, ColumnType::Int, "n", ColumnAttr::empty())
            .unwrap();
        arena.bump_version();

        // The accessor is not marked dirty: the refresh pass re-reads its
        // spec only, and still bumps the version.
        assert!(!accessor.is_marked());
        col.refresh_accessor_tree(&arena).unwrap();
        assert!(accessor.version() > version_before);
        accessor.with_spec(|spec| {
            assert_eq!(spec.unwrap().column_count(&arena).unwrap(), 1);
        });
    }

    #[test]
    fn cascade_respects_stop_marker() {
        let mut arena = Arena::new();
        let (mut col, _pin) = setup(&mut arena);
        col.set_table_ndx(3);
        col.add_subtable(&mut arena, None).unwrap();

        let mut state = CascadeState::new();
        col.cascade_break_backlinks_to(&arena, 0, &mut state).unwrap();
        assert_eq!(state.rows().len(), 1);

        let mut stopped = CascadeState::new();
        stopped.set_stop_on_table(3);
        col.cascade_break_backlinks_to(&arena, 0, &mut stopped).unwrap();
        assert!(stopped.rows().is_empty());
    }
}
