//! The per-table column collection.
//!
//! A table's columns live in one ref-bearing block, one slot per column
//! root; a column with a search index owns the immediately following slot
//! as well, which is what the refresh protocol keys off. The set builds
//! typed accessors from the spec, fans row operations out across columns,
//! and coordinates cascade state and accessor refresh.

use std::sync::Arc;

use colonnade_arena::Arena;
use colonnade_btree::node;
use colonnade_error::{Result, StoreError};
use colonnade_types::{ColumnAttr, ColumnType, NodeFlags, NodeType, Ref, Slot};
use tracing::debug;

use crate::bytes::BytesColumn;
use crate::cascade::CascadeState;
use crate::enums::EnumStringColumn;
use crate::integer::{IntColumn, NULL_INT};
use crate::spec::Spec;
use crate::string::StringColumn;
use crate::subtable::{SubtableColumn, TablePin};

const fn hasrefs_flags() -> NodeFlags {
    NodeFlags {
        inner: false,
        hasrefs: true,
        context: false,
    }
}

/// Typed accessor for one column of a table.
#[derive(Debug)]
pub enum ColumnAccessor {
    Int(IntColumn),
    Bool(IntColumn),
    String(StringColumn),
    StringEnum(EnumStringColumn),
    Binary(BytesColumn),
    Table(SubtableColumn),
    /// Link-family columns store row indexes / link-list refs; their link
    /// mechanics live outside this crate, the storage does not.
    Link(IntColumn),
    LinkList(IntColumn),
    BackLink(IntColumn),
}

impl ColumnAccessor {
    fn size(&self, arena: &Arena) -> Result<usize> {
        match self {
            Self::Int(c) | Self::Bool(c) | Self::Link(c) | Self::LinkList(c) | Self::BackLink(c) => {
                c.size(arena)
            }
            Self::String(c) => c.size(arena),
            Self::StringEnum(c) => c.size(arena),
            Self::Binary(c) => c.size(arena),
            Self::Table(c) => c.size(arena),
        }
    }

    fn set_parent(&mut self, parent: Ref, ndx_in_parent: usize) {
        match self {
            Self::Int(c) | Self::Bool(c) | Self::Link(c) | Self::LinkList(c) | Self::BackLink(c) => {
                c.set_parent(parent, ndx_in_parent);
            }
            Self::String(c) => c.set_parent(parent, ndx_in_parent),
            Self::StringEnum(c) => c.set_parent(parent, ndx_in_parent),
            Self::Binary(c) => c.set_parent(parent, ndx_in_parent),
            Self::Table(c) => c.set_parent(parent, ndx_in_parent),
        }
    }

    fn root(&self) -> Ref {
        match self {
            Self::Int(c) | Self::Bool(c) | Self::Link(c) | Self::LinkList(c) | Self::BackLink(c) => {
                c.root()
            }
            Self::String(c) => c.root(),
            Self::StringEnum(c) => c.values_root(),
            Self::Binary(c) => c.root(),
            Self::Table(c) => c.root(),
        }
    }

    fn insert_default_rows(
        &mut self,
        arena: &mut Arena,
        ndx: Option<usize>,
        num_rows: usize,
        nullable: bool,
    ) -> Result<()> {
        match self {
            Self::Int(c) | Self::Bool(c) => {
                let v = if nullable { NULL_INT } else { 0 };
                c.insert(arena, ndx, v, num_rows)
            }
            Self::Link(c) | Self::LinkList(c) | Self::BackLink(c) => {
                // Unset link / empty list.
                c.insert(arena, ndx, 0, num_rows)
            }
            Self::String(c) => {
                let v = if nullable { None } else { Some("") };
                c.insert(arena, ndx, v, num_rows)
            }
            Self::StringEnum(c) => {
                let v = if nullable { None } else { Some("") };
                c.insert(arena, ndx, v, num_rows)
            }
            Self::Binary(c) => {
                let v: Option<&[u8]> = if nullable { None } else { Some(b"") };
                c.insert(arena, ndx, v, num_rows)
            }
            Self::Table(c) => {
                for i in 0..num_rows {
                    c.insert_subtable(arena, ndx.map(|n| n + i), None)?;
                }
                Ok(())
            }
        }
    }

    fn erase_row(&mut self, arena: &mut Arena, row_ndx: usize) -> Result<()> {
        match self {
            Self::Int(c) | Self::Bool(c) | Self::Link(c) | Self::LinkList(c) | Self::BackLink(c) => {
                c.erase(arena, row_ndx)
            }
            Self::String(c) => c.erase(arena, row_ndx),
            Self::StringEnum(c) => c.erase(arena, row_ndx),
            Self::Binary(c) => c.erase(arena, row_ndx),
            Self::Table(c) => c.erase(arena, row_ndx),
        }
    }

    fn move_last_over(
        &mut self,
        arena: &mut Arena,
        row_ndx: usize,
        last_row_ndx: usize,
    ) -> Result<()> {
        match self {
            Self::Int(c) | Self::Bool(c) | Self::Link(c) | Self::LinkList(c) | Self::BackLink(c) => {
                c.move_last_over(arena, row_ndx, last_row_ndx)
            }
            Self::String(c) => c.move_last_over(arena, row_ndx, last_row_ndx),
            Self::StringEnum(c) => c.move_last_over(arena, row_ndx, last_row_ndx),
            Self::Binary(c) => c.move_last_over(arena, row_ndx, last_row_ndx),
            Self::Table(c) => c.move_last_row_over(arena, row_ndx, last_row_ndx),
        }
    }

    fn clear(&mut self, arena: &mut Arena) -> Result<()> {
        match self {
            Self::Int(c) | Self::Bool(c) | Self::Link(c) | Self::LinkList(c) | Self::BackLink(c) => {
                c.clear(arena)
            }
            Self::String(c) => c.clear(arena),
            Self::StringEnum(c) => c.clear(arena),
            Self::Binary(c) => c.clear(arena),
            Self::Table(c) => c.clear(arena),
        }
    }

    fn destroy(&mut self, arena: &mut Arena) {
        match self {
            Self::Int(c) | Self::Bool(c) | Self::Link(c) | Self::LinkList(c) | Self::BackLink(c) => {
                c.destroy(arena);
            }
            Self::String(c) => c.destroy(arena),
            Self::StringEnum(c) => c.destroy(arena),
            Self::Binary(c) => c.destroy(arena),
            Self::Table(c) => c.destroy(arena),
        }
    }

    /// Write a string value. Fails with a logic error on columns that are
    /// not string valued.
    pub fn set_string(
        &mut self,
        arena: &mut Arena,
        row_ndx: usize,
        value: Option<&str>,
    ) -> Result<()> {
        match self {
            Self::String(c) => c.set(arena, row_ndx, value),
            Self::StringEnum(c) => c.set(arena, row_ndx, value),
            _ => Err(StoreError::NotStringColumn),
        }
    }

    /// Cascade hook. Only subtable columns do anything at this layer; the
    /// link family's reciprocal bookkeeping lives with the link columns
    /// themselves.
    fn cascade_break_backlinks_to(
        &self,
        arena: &Arena,
        row_ndx: usize,
        state: &mut CascadeState,
    ) -> Result<()> {
        match self {
            Self::Table(c) => c.cascade_break_backlinks_to(arena, row_ndx, state),
            _ => Ok(()),
        }
    }
}

/// All columns of one table.
#[derive(Debug)]
pub struct ColumnSet {
    columns_ref: Ref,
    spec: Spec,
    cols: Vec<ColumnAccessor>,
    pin: Arc<TablePin>,
    table_ndx: usize,
    /// Arena version the accessors were last synchronized against; the
    /// refresh pass is a no-op until an external commit bumps past it.
    last_seen_version: u64,
}

impl ColumnSet {
    /// Create an empty table (no columns, no rows).
    pub fn create(arena: &mut Arena, table_ndx: usize) -> Result<Self> {
        let spec_top = Spec::create_empty(arena)?;
        let spec = Spec::from_ref(arena, spec_top)?;
        let columns_ref = node::slots_create(arena, hasrefs_flags(), 0, &[])?;
        Ok(Self {
            columns_ref,
            spec,
            cols: Vec::new(),
            pin: Arc::new(TablePin),
            table_ndx,
            last_seen_version: arena.version(),
        })
    }

    pub fn columns_ref(&self) -> Ref {
        self.columns_ref
    }

    pub fn spec(&self) -> &Spec {
        &self.spec
    }

    pub fn spec_mut(&mut self) -> &mut Spec {
        &mut self.spec
    }

    pub fn table_ndx(&self) -> usize {
        self.table_ndx
    }

    /// The parent-pin identity handed to subtable columns.
    pub fn pin(&self) -> &Arc<TablePin> {
        &self.pin
    }

    pub fn column_count(&self) -> usize {
        self.cols.len()
    }

    pub fn column(&self, col_ndx: usize) -> &ColumnAccessor {
        &self.cols[col_ndx]
    }

    pub fn column_mut(&mut self, col_ndx: usize) -> &mut ColumnAccessor {
        &mut self.cols[col_ndx]
    }

    /// Number of rows (0 while the table has no columns).
    pub fn row_count(&self, arena: &Arena) -> Result<usize> {
        match self.cols.first() {
            None => Ok(0),
            Some(col) => col.size(arena),
        }
    }

    // -- schema changes ------------------------------------------------------

    /// Append a column of the given type. Existing rows receive default
    /// values (null when the column is nullable).
    pub fn add_column(
        &mut self,
        arena: &mut Arena,
        ty: ColumnType,
        name: &str,
        attr: ColumnAttr,
    ) -> Result<usize> {
        let col_ndx = self.cols.len();
        let rows = self.row_count(arena)?;
        let nullable = attr.contains(ColumnAttr::NULLABLE);

        self.spec.insert_column(arena, col_ndx, ty, name, attr)?;

        let mut accessor = match ty {
            ColumnType::Int => ColumnAccessor::Int(IntColumn::create(arena, NodeType::Normal, nullable)?),
            ColumnType::Bool => {
                ColumnAccessor::Bool(IntColumn::create(arena, NodeType::Normal, nullable)?)
            }
            ColumnType::String => ColumnAccessor::String(StringColumn::create(arena, nullable)?),
            ColumnType::StringEnum => {
                return Err(StoreError::ValueNotRepresentable {
                    detail: "enum columns are created by upgrading a string column",
                })
            }
            ColumnType::Binary => ColumnAccessor::Binary(BytesColumn::create(arena, nullable)?),
            ColumnType::Table => {
                let mut col = SubtableColumn::create(arena, &self.pin)?;
                col.set_table_ndx(self.table_ndx);
                let subspec_ndx = self.spec.get_subspec_ndx(arena, col_ndx)?;
                col.set_subspec_ref(self.spec.get_subspec_ref(arena, subspec_ndx)?);
                ColumnAccessor::Table(col)
            }
            ColumnType::Link => {
                ColumnAccessor::Link(IntColumn::create(arena, NodeType::Normal, false)?)
            }
            ColumnType::LinkList => {
                ColumnAccessor::LinkList(IntColumn::create(arena, NodeType::HasRefs, false)?)
            }
            ColumnType::BackLink => {
                ColumnAccessor::BackLink(IntColumn::create(arena, NodeType::HasRefs, false)?)
            }
        };

        // Wire the root into the columns block (and reserve the index slot).
        let ndx_in_parent = self.spec.get_column_ndx_in_parent(arena, col_ndx)?;
        node::slot_insert(arena, self.columns_ref, ndx_in_parent, Slot::Ref(accessor.root()))?;
        if attr.contains(ColumnAttr::INDEXED) {
            let placeholder = node::blob_create(arena, &[])?;
            node::slot_insert(arena, self.columns_ref, ndx_in_parent + 1, Slot::Ref(placeholder))?;
        }
        let slots = node::slot_count(arena.translate(self.columns_ref)?);
        node::set_count(arena, self.columns_ref, slots)?;
        accessor.set_parent(self.columns_ref, ndx_in_parent);

        // Backfill existing rows, then build the index over them.
        accessor.insert_default_rows(arena, None, rows, nullable)?;
        if attr.contains(ColumnAttr::INDEXED) {
            let allow_duplicates = !attr.contains(ColumnAttr::UNIQUE);
            match &mut accessor {
                ColumnAccessor::Int(c) | ColumnAccessor::Bool(c) => {
                    c.create_search_index(arena, allow_duplicates)?;
                }
                ColumnAccessor::String(c) => c.create_search_index(arena, allow_duplicates)?,
                ColumnAccessor::StringEnum(c) => c.create_search_index(arena, allow_duplicates)?,
                ColumnAccessor::Binary(c) => c.create_search_index(arena, allow_duplicates)?,
                _ => {}
            }
        }

        debug!(column = col_ndx, ?ty, "add column");
        self.cols.push(accessor);
        Ok(col_ndx)
    }

    /// Remove the column at `col_ndx`, releasing its trees.
    pub fn remove_column(&mut self, arena: &mut Arena, col_ndx: usize) -> Result<()> {
        let ndx_in_parent = self.spec.get_column_ndx_in_parent(arena, col_ndx)?;
        let indexed = self
            .spec
            .get_column_attr(arena, col_ndx)?
            .contains(ColumnAttr::INDEXED);

        let mut accessor = self.cols.remove(col_ndx);
        accessor.destroy(arena);
        self.spec.erase_column(arena, col_ndx)?;

        if indexed {
            if let Slot::Ref(placeholder) = node::slot_get(arena, self.columns_ref, ndx_in_parent + 1)? {
                arena.free(placeholder);
            }
            node::slot_remove(arena, self.columns_ref, ndx_in_parent + 1)?;
        }
        node::slot_remove(arena, self.columns_ref, ndx_in_parent)?;
        let slots = node::slot_count(arena.translate(self.columns_ref)?);
        node::set_count(arena, self.columns_ref, slots)?;

        // Later columns shifted left in the block.
        self.rewire_parents(arena)?;
        Ok(())
    }

    fn rewire_parents(&mut self, arena: &Arena) -> Result<()> {
        for (col_ndx, accessor) in self.cols.iter_mut().enumerate() {
            let ndx_in_parent = self.spec.get_column_ndx_in_parent(arena, col_ndx)?;
            accessor.set_parent(self.columns_ref, ndx_in_parent);
        }
        Ok(())
    }

    /// Convert the string column at `col_ndx` to its enumerated encoding
    /// using [`StringColumn::auto_enumerate`]. Returns whether the upgrade
    /// happened.
    pub fn upgrade_column_to_enum(
        &mut self,
        arena: &mut Arena,
        col_ndx: usize,
        enforce: bool,
    ) -> Result<bool> {
        let ColumnAccessor::String(col) = &self.cols[col_ndx] else {
            return Err(StoreError::NotStringColumn);
        };
        let Some((keys_ref, values_ref)) = col.auto_enumerate(arena, enforce)? else {
            return Ok(false);
        };
        let nullable = col.is_nullable();

        self.spec.upgrade_string_to_enum(arena, col_ndx, keys_ref)?;

        let ndx_in_parent = self.spec.get_column_ndx_in_parent(arena, col_ndx)?;
        node::slot_set(arena, self.columns_ref, ndx_in_parent, Slot::Ref(values_ref))?;

        let had_index = col.has_search_index();
        let mut replacement = EnumStringColumn::from_refs(arena, values_ref, keys_ref, nullable)?;
        replacement.set_parent(self.columns_ref, ndx_in_parent);
        if had_index {
            let attr = self.spec.get_column_attr(arena, col_ndx)?;
            replacement.create_search_index(arena, !attr.contains(ColumnAttr::UNIQUE))?;
        }

        let mut old = std::mem::replace(&mut self.cols[col_ndx], ColumnAccessor::StringEnum(replacement));
        if let ColumnAccessor::String(old_col) = &mut old {
            old_col.destroy(arena);
        }
        debug!(column = col_ndx, "upgrade string column to enum");
        Ok(true)
    }

    // -- row operations ------------------------------------------------------

    /// Insert `num_rows` default rows at `row_ndx` (`None` appends) across
    /// every column.
    pub fn insert_rows(
        &mut self,
        arena: &mut Arena,
        row_ndx: Option<usize>,
        num_rows: usize,
    ) -> Result<()> {
        for (col_ndx, col) in self.cols.iter_mut().enumerate() {
            let nullable = self
                .spec
                .get_column_attr(arena, col_ndx)?
                .contains(ColumnAttr::NULLABLE);
            col.insert_default_rows(arena, row_ndx, num_rows, nullable)?;
        }
        Ok(())
    }

    /// Erase one row across every column.
    pub fn erase_row(&mut self, arena: &mut Arena, row_ndx: usize) -> Result<()> {
        for col in &mut self.cols {
            col.erase_row(arena, row_ndx)?;
        }
        Ok(())
    }

    /// Move the last row over `row_ndx` across every column.
    pub fn move_last_over(&mut self, arena: &mut Arena, row_ndx: usize) -> Result<()> {
        let rows = self.row_count(arena)?;
        if rows == 0 {
            return Err(StoreError::RowOutOfBounds {
                row: row_ndx,
                size: 0,
            });
        }
        let last = rows - 1;
        for col in &mut self.cols {
            col.move_last_over(arena, row_ndx, last)?;
        }
        Ok(())
    }

    /// Remove all rows. When the table carries strong links, the cascade
    /// state is armed with this table as the stop target so the recursive
    /// break cannot re-enter the clear.
    pub fn clear(&mut self, arena: &mut Arena) -> Result<()> {
        if self.spec.has_strong_link_columns() {
            let rows = self.row_count(arena)?;
            let mut state = CascadeState::new();
            state.set_stop_on_table(self.table_ndx);
            for col in &self.cols {
                for row in 0..rows {
                    col.cascade_break_backlinks_to(arena, row, &mut state)?;
                }
            }
        }
        for col in &mut self.cols {
            col.clear(arena)?;
        }
        Ok(())
    }

    /// Collect the cascade rows reachable from one row of this table.
    pub fn cascade_break_backlinks_to(
        &self,
        arena: &Arena,
        row_ndx: usize,
        state: &mut CascadeState,
    ) -> Result<()> {
        for col in &self.cols {
            col.cascade_break_backlinks_to(arena, row_ndx, state)?;
        }
        Ok(())
    }

    // -- refresh -------------------------------------------------------------

    /// Refresh every column accessor bottom-up after an external commit.
    ///
    /// The arena version is the trigger: a commit by another writer bumps
    /// it, and a refresh against an unchanged version is a no-op.
    ///
    /// Preconditions (per column): the set itself is already consistent,
    /// dirty subtable accessors are marked, and each accessor's cached
    /// position in the columns block is still valid.
    pub fn refresh_accessor_tree(&mut self, arena: &Arena) -> Result<()> {
        if arena.version() == self.last_seen_version {
            return Ok(());
        }
        for (col_ndx, col) in self.cols.iter_mut().enumerate() {
            let ndx_in_parent = self.spec.get_column_ndx_in_parent(arena, col_ndx)?;
            match col {
                ColumnAccessor::Int(c)
                | ColumnAccessor::Bool(c)
                | ColumnAccessor::Link(c)
                | ColumnAccessor::LinkList(c)
                | ColumnAccessor::BackLink(c) => {
                    c.set_ndx_in_parent(ndx_in_parent);
                    c.refresh_accessor_tree(arena)?;
                }
                ColumnAccessor::String(c) => {
                    c.set_ndx_in_parent(ndx_in_parent);
                    c.refresh_accessor_tree(arena)?;
                }
                ColumnAccessor::Binary(c) => {
                    c.set_ndx_in_parent(ndx_in_parent);
                    c.refresh_accessor_tree(arena)?;
                }
                ColumnAccessor::StringEnum(c) => {
                    c.set_ndx_in_parent(ndx_in_parent);
                    let keys_root = self.spec.get_enumkeys_ref(arena, col_ndx)?;
                    c.refresh_accessor_tree(arena, keys_root)?;
                }
                ColumnAccessor::Table(c) => {
                    c.set_ndx_in_parent(ndx_in_parent);
                    c.refresh_accessor_tree(arena)?;
                }
            }
        }
        self.last_seen_version = arena.version();
        Ok(())
    }

    /// Destroy all columns, the spec, and the columns block.
    pub fn destroy(mut self, arena: &mut Arena) {
        for col in &mut self.cols {
            col.destroy(arena);
        }
        self.spec.destroy(arena);
        arena.free(self.columns_ref);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn build_table_and_insert_rows() {
        let mut arena = Arena::new();
        let mut set = ColumnSet::create(&mut arena, 0).unwrap();
        set.add_column(&mut arena, ColumnType::Int, "n", ColumnAttr::empty())
            .unwrap();
        set.add_column(&mut arena, ColumnType::String, "s", ColumnAttr::empty())
            .unwrap();

        set.insert_rows(&mut arena, None, 3).unwrap();
        assert_eq!(set.row_count(&arena).unwrap(), 3);

        let ColumnAccessor::Int(n) = set.column_mut(0) else {
            panic!("expected int column");
        };
        n.set(&mut arena, 1, 42).unwrap();

        let ColumnAccessor::String(s) = set.column_mut(1) else {
            panic!("expected string column");
        };
        s.set(&mut arena, 1, Some("forty-two")).unwrap();

        let ColumnAccessor::Int(n) = set.column(0) else {
            unreachable!()
        };
        assert_eq!(n.get(&arena, 1).unwrap(), 42);
        assert_eq!(n.get(&arena, 0).unwrap(), 0);
    }

    #[test]
    fn set_string_on_non_string_column_is_a_logic_error() {
        let mut arena = Arena::new();
        let mut set = ColumnSet::create(&mut arena, 0).unwrap();
        set.add_column(&mut arena, ColumnType::Int, "n", ColumnAttr::empty())
            .unwrap();
        set.add_column(&mut arena, ColumnType::String, "s", ColumnAttr::empty())
            .unwrap();
        set.insert_rows(&mut arena, None, 1).unwrap();

        set.column_mut(1)
            .set_string(&mut arena, 0, Some("ok"))
            .unwrap();
        let err = set
            .column_mut(0)
            .set_string(&mut arena, 0, Some("nope"))
            .unwrap_err();
        assert!(matches!(err, StoreError::NotStringColumn));
    }

    #[test]
    fn add_column_backfills_existing_rows() {
        let mut arena = Arena::new();
        let mut set = ColumnSet::create(&mut arena, 0).unwrap();
        set.add_column(&mut arena, ColumnType::Int, "a", ColumnAttr::empty())
            .unwrap();
        set.insert_rows(&mut arena, None, 4).unwrap();

        set.add_column(&mut arena, ColumnType::String, "b", ColumnAttr::NULLABLE)
            .unwrap();
        let ColumnAccessor::String(s) = set.column(1) else {
            unreachable!()
        };
        assert_eq!(s.size(&arena).unwrap(), 4);
        assert!(s.is_null(&arena, 0).unwrap());
    }

    #[test]
    fn row_ops_fan_out() {
        let mut arena = Arena::new();
        let mut set = ColumnSet::create(&mut arena, 0).unwrap();
        set.add_column(&mut arena, ColumnType::Int, "n", ColumnAttr::empty())
            .unwrap();
        set.add_column(&mut arena, ColumnType::Binary, "blob", ColumnAttr::empty())
            .unwrap();
        set.insert_rows(&mut arena, None, 3).unwrap();

        {
            let ColumnAccessor::Int(n) = set.column_mut(0) else {
                unreachable!()
            };
            for i in 0..3 {
                n.set(&mut arena, i, i as i64 + 1).unwrap();
            }
        }

        set.erase_row(&mut arena, 0).unwrap();
        assert_eq!(set.row_count(&arena).unwrap(), 2);

        set.move_last_over(&mut arena, 0).unwrap();
        assert_eq!(set.row_count(&arena).unwrap(), 1);
        let ColumnAccessor::Int(n) = set.column(0) else {
            unreachable!()
        };
        assert_eq!(n.get(&arena, 0).unwrap(), 3);

        set.clear(&mut arena).unwrap();
        assert_eq!(set.row_count(&arena).unwrap(), 0);
    }

    #[test]
    fn indexed_column_occupies_following_slot() {
        let mut arena = Arena::new();
        let mut set = ColumnSet::create(&mut arena, 0).unwrap();
        set.add_column(&mut arena, ColumnType::String, "k", ColumnAttr::INDEXED)
            .unwrap();
        set.add_column(&mut arena, ColumnType::Int, "v", ColumnAttr::empty())
            .unwrap();

        // Column 0 at slot 0, its index at slot 1, column 1 at slot 2.
        assert_eq!(
            node::slot_count(arena.translate(set.columns_ref()).unwrap()),
            3
        );
        assert_eq!(set.spec().get_column_ndx_in_parent(&arena, 1).unwrap(), 2);

        set.insert_rows(&mut arena, None, 2).unwrap();
        let ColumnAccessor::String(s) = set.column_mut(0) else {
            unreachable!()
        };
        s.set(&mut arena, 0, Some("hello")).unwrap();
        assert_eq!(s.find_first(&arena, Some("hello"), 0, None).unwrap(), Some(0));
    }

    #[test]
    fn enum_upgrade_through_the_set() {
        let mut arena = Arena::new();
        let mut set = ColumnSet::create(&mut arena, 0).unwrap();
        set.add_column(&mut arena, ColumnType::String, "color", ColumnAttr::empty())
            .unwrap();
        set.insert_rows(&mut arena, None, 6).unwrap();
        {
            let ColumnAccessor::String(s) = set.column_mut(0) else {
                unreachable!()
            };
            for (i, v) in ["red", "blue", "red", "red", "blue", "red"].iter().enumerate() {
                s.set(&mut arena, i, Some(v)).unwrap();
            }
        }

        assert!(set.upgrade_column_to_enum(&mut arena, 0, false).unwrap());
        assert_eq!(
            set.spec().get_column_type(&arena, 0).unwrap(),
            ColumnType::StringEnum
        );
        let ColumnAccessor::StringEnum(e) = set.column(0) else {
            panic!("expected enum column after upgrade");
        };
        assert_eq!(e.size(&arena).unwrap(), 6);
        assert_eq!(e.get(&arena, 0).unwrap().as_deref(), Some("red"));
        assert_eq!(e.get(&arena, 1).unwrap().as_deref(), Some("blue"));
        assert_eq!(e.count(&arena, Some("red")).unwrap(), 4);
    }

    #[test]
    fn refresh_after_external_commit() {
        let mut arena = Arena::new();
        let mut set = ColumnSet::create(&mut arena, 0).unwrap();
        set.add_column(&mut arena, ColumnType::Int, "n", ColumnAttr::INDEXED)
            .unwrap();
        set.insert_rows(&mut arena, None, 2).unwrap();
        {
            let ColumnAccessor::Int(n) = set.column_mut(0) else {
                unreachable!()
            };
            n.set(&mut arena, 0, 10).unwrap();
            n.set(&mut arena, 1, 20).unwrap();
        }

        // Simulate another writer replacing the column's root out from
        // under the accessor.
        let foreign = colonnade_btree::leaf_int::create(&mut arena, &[7, 8, 9]).unwrap();
        let old_root = {
            let ColumnAccessor::Int(n) = set.column(0) else {
                unreachable!()
            };
            n.root()
        };
        node::slot_set(&mut arena, set.columns_ref(), 0, Slot::Ref(foreign)).unwrap();
        node::destroy_deep(&mut arena, old_root);
        arena.bump_version();

        set.refresh_accessor_tree(&arena).unwrap();
        let ColumnAccessor::Int(n) = set.column(0) else {
            unreachable!()
        };
        assert_eq!(n.size(&arena).unwrap(), 3);
        assert_eq!(n.get(&arena, 2).unwrap(), 9);
        assert_eq!(n.find_first(&arena, 8, 0, None).unwrap(), Some(1));
    }

    #[test]
    fn refresh_is_gated_on_arena_version() {
        let mut arena = Arena::new();
        let mut set = ColumnSet::create(&mut arena, 0).unwrap();
        set.add_column(&mut arena, ColumnType::Int, "n", ColumnAttr::empty())
            .unwrap();
        set.insert_rows(&mut arena, None, 2).unwrap();

        // Swap the root slot, but without a version bump the refresh is a
        // no-op and the accessor keeps reading the old tree.
        let foreign = colonnade_btree::leaf_int::create(&mut arena, &[7, 8, 9]).unwrap();
        node::slot_set(&mut arena, set.columns_ref(), 0, Slot::Ref(foreign)).unwrap();

        set.refresh_accessor_tree(&arena).unwrap();
        {
            let ColumnAccessor::Int(n) = set.column(0) else {
                unreachable!()
            };
            assert_eq!(n.size(&arena).unwrap(), 2);
        }

        // The bump is what makes the refresh pass re-read the ref graph.
        arena.bump_version();
        set.refresh_accessor_tree(&arena).unwrap();
        let ColumnAccessor::Int(n) = set.column(0) else {
            unreachable!()
        };
        assert_eq!(n.size(&arena).unwrap(), 3);
        assert_eq!(n.get(&arena, 0).unwrap(), 7);
    }

    #[test]
    fn subtable_accessor_carries_child_spec() {
        let mut arena = Arena::new();
        let mut set = ColumnSet::create(&mut arena, 0).unwrap();
        set.add_column(&mut arena, ColumnType::Table, "items", ColumnAttr::empty())
            .unwrap();
        set.insert_rows(&mut arena, None, 1).unwrap();

        let ColumnAccessor::Table(t) = set.column(0) else {
            unreachable!()
        };
        let child = t.get_subtable(&arena, 0).unwrap();
        child.with_spec(|spec| {
            let spec = spec.expect("child accessor follows the shared sub-spec");
            assert_eq!(spec.column_count(&arena).unwrap(), 0);
        });
    }

    #[test]
    fn remove_column_releases_blocks() {
        let mut arena = Arena::new();
        let mut set = ColumnSet::create(&mut arena, 0).unwrap();
        set.add_column(&mut arena, ColumnType::Int, "a", ColumnAttr::empty())
            .unwrap();
        set.add_column(&mut arena, ColumnType::String, "b", ColumnAttr::empty())
            .unwrap();
        set.insert_rows(&mut arena, None, 2).unwrap();

        set.remove_column(&mut arena, 0).unwrap();
        assert_eq!(set.column_count(), 1);
        assert_eq!(set.spec().column_count(&arena).unwrap(), 1);
        assert_eq!(set.row_count(&arena).unwrap(), 2);

        let ColumnAccessor::String(s) = set.column(0) else {
            panic!("string column should remain");
        };
        assert_eq!(s.size(&arena).unwrap(), 2);
    }
}
