//! Typed columns over the B+-tree substrate, plus the schema spec, the
//! per-column search index, cascade-delete state, and the per-table
//! column set with its accessor-refresh protocol.

pub mod bytes;
pub mod cascade;
pub mod enums;
pub mod index;
pub mod integer;
pub mod set;
pub mod spec;
pub mod string;
pub mod subtable;

pub use bytes::{BytesColumn, RootKind};
pub use cascade::{CascadeRow, CascadeState};
pub use enums::EnumStringColumn;
pub use index::{IndexKey, SearchIndex};
pub use integer::{IntColumn, NULL_INT};
pub use set::{ColumnAccessor, ColumnSet};
pub use spec::{ColumnInfo, Spec};
pub use string::StringColumn;
pub use subtable::{child_table_size, ChildTable, SubtableColumn, TablePin};
