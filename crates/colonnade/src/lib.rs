//! Public API facade for the colonnade column-store core.
//!
//! A table is a collection of typed columns; each column is a persistent
//! B+-tree over a ref-addressed arena of blocks. This crate re-exports
//! the pieces a caller composes:
//!
//! - [`Arena`] — the block store every operation runs against.
//! - Column kinds: [`IntColumn`], [`StringColumn`], [`BytesColumn`],
//!   [`EnumStringColumn`], [`SubtableColumn`].
//! - [`Spec`] — the table's schema descriptor.
//! - [`ColumnSet`] — the per-table collection coordinating row operations,
//!   cascade state and accessor refresh.
//!
//! ```
//! use colonnade::{Arena, ColumnAttr, ColumnSet, ColumnType};
//!
//! let mut arena = Arena::new();
//! let mut table = ColumnSet::create(&mut arena, 0).unwrap();
//! table
//!     .add_column(&mut arena, ColumnType::Int, "count", ColumnAttr::empty())
//!     .unwrap();
//! table.insert_rows(&mut arena, None, 2).unwrap();
//! assert_eq!(table.row_count(&arena).unwrap(), 2);
//! ```

pub use colonnade_arena::Arena;
pub use colonnade_column::{
    child_table_size, BytesColumn, CascadeRow, CascadeState, ChildTable, ColumnAccessor,
    ColumnInfo, ColumnSet, EnumStringColumn, IndexKey, IntColumn, RootKind, SearchIndex, Spec,
    StringColumn, SubtableColumn, TablePin, NULL_INT,
};
pub use colonnade_error::{ErrorKind, Result, StoreError};
pub use colonnade_types::{
    limits, ColumnAttr, ColumnType, LeafKind, NodeFlags, NodeType, Ref, Slot,
};

/// The tree substrate, exposed for embedders that build custom column
/// kinds on top of the same node formats.
pub mod btree {
    pub use colonnade_btree::{bptree, leaf_bytes, leaf_int, node};
}
