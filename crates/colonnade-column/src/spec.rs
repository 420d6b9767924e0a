//! Table schema descriptor.
//!
//! The spec owns the authoritative column layout for one table: column
//! types, public names, attribute flags, sub-specs for subtable columns,
//! link metadata, and the key lists of enumerated string columns.
//!
//! On-arena shape: a top block of three to five child slots —
//!
//! ```text
//! [ types | names | attrs | subspecs? | enumkeys? ]
//! ```
//!
//! `types` and `attrs` are integer leaves, `names` a medium bytes leaf.
//! `subspecs` is created lazily when the first subtable/link/backlink
//! column arrives and is populated sparsely: a subtable column contributes
//! one sub-spec ref, a link or list-link column one tagged target-table
//! slot, a backlink column two tagged slots (origin table, origin column).
//! Tagged slots are `(index << 1) | 1` so an untouched placeholder of 0
//! can mean "not yet wired". `enumkeys` holds one keys-column root per
//! enumerated string column.

use std::collections::HashMap;

use colonnade_arena::Arena;
use colonnade_btree::{leaf_bytes, leaf_int, node};
use colonnade_error::{Result, StoreError};
use colonnade_types::limits::COLUMN_NAME_MAX;
use colonnade_types::{ColumnAttr, ColumnType, NodeFlags, Ref, Slot};

const TOP_TYPES: usize = 0;
const TOP_NAMES: usize = 1;
const TOP_ATTRS: usize = 2;
const TOP_SUBSPECS: usize = 3;
const TOP_ENUMKEYS: usize = 4;

const fn hasrefs_flags() -> NodeFlags {
    NodeFlags {
        inner: false,
        hasrefs: true,
        context: false,
    }
}

/// Schema descriptor accessor.
#[derive(Debug)]
pub struct Spec {
    top: Ref,
    types: Ref,
    names: Ref,
    attrs: Ref,
    subspecs: Option<Ref>,
    enumkeys: Option<Ref>,
    has_strong_links: bool,
    /// Lazily created sub-spec accessors, keyed by sub-spec index.
    /// Invalidated wholesale on structural changes.
    subspec_cache: HashMap<usize, Spec>,
}

/// Placement info for one column within the table's columns block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ColumnInfo {
    /// Slot of the column root (search indexes of earlier columns shift it).
    pub column_ref_ndx: usize,
    pub has_search_index: bool,
}

impl Spec {
    /// Allocate an empty spec (types/names/attrs only) and return its top
    /// ref. Partial allocations are released on failure.
    pub fn create_empty(arena: &mut Arena) -> Result<Ref> {
        let types = leaf_int::create(arena, &[])?;
        let names = match leaf_bytes::medium::create_empty(arena, false) {
            Ok(r) => r,
            Err(e) => {
                arena.free(types);
                return Err(e);
            }
        };
        let attrs = match leaf_int::create(arena, &[]) {
            Ok(r) => r,
            Err(e) => {
                arena.free(types);
                node::destroy_deep(arena, names);
                return Err(e);
            }
        };
        match node::slots_create(
            arena,
            hasrefs_flags(),
            3,
            &[Slot::Ref(types), Slot::Ref(names), Slot::Ref(attrs)],
        ) {
            Ok(top) => Ok(top),
            Err(e) => {
                arena.free(types);
                node::destroy_deep(arena, names);
                arena.free(attrs);
                Err(e)
            }
        }
    }

    /// Attach to an existing spec top block.
    pub fn from_ref(arena: &Arena, top: Ref) -> Result<Self> {
        let block = arena.translate(top)?;
        let n = node::slot_count(block);
        if !(3..=5).contains(&n) {
            return Err(StoreError::NodePayloadMismatch {
                detail: "spec top block is not 3-5 slots",
            });
        }
        let child = |i: usize| -> Result<Ref> {
            node::slot_get(arena, top, i)?
                .as_ref_value()
                .ok_or(StoreError::NodePayloadMismatch {
                    detail: "spec child slot is not a ref",
                })
        };
        let subspecs = if n > TOP_SUBSPECS {
            match node::slot_get(arena, top, TOP_SUBSPECS)? {
                Slot::Ref(r) => Some(r),
                Slot::Null => None,
                Slot::Tagged(_) => {
                    return Err(StoreError::NodePayloadMismatch {
                        detail: "spec subspecs slot is tagged",
                    })
                }
            }
        } else {
            None
        };
        let enumkeys = if n > TOP_ENUMKEYS {
            match node::slot_get(arena, top, TOP_ENUMKEYS)? {
                Slot::Ref(r) => Some(r),
                Slot::Null => None,
                Slot::Tagged(_) => {
                    return Err(StoreError::NodePayloadMismatch {
                        detail: "spec enumkeys slot is tagged",
                    })
                }
            }
        } else {
            None
        };
        let mut spec = Self {
            top,
            types: child(TOP_TYPES)?,
            names: child(TOP_NAMES)?,
            attrs: child(TOP_ATTRS)?,
            subspecs,
            enumkeys,
            has_strong_links: false,
            subspec_cache: HashMap::new(),
        };
        spec.update_has_strong_link_columns(arena)?;
        Ok(spec)
    }

    pub fn top_ref(&self) -> Ref {
        self.top
    }

    /// Destroy the spec and everything it owns (sub-specs, enum key lists).
    pub fn destroy(self, arena: &mut Arena) {
        node::destroy_deep(arena, self.top);
    }

    // -- basic queries ------------------------------------------------------

    /// Total column count, backlink columns included.
    pub fn column_count(&self, arena: &Arena) -> Result<usize> {
        leaf_int::count(arena, self.types)
    }

    /// Public column count (backlink columns are unnamed and excluded).
    pub fn public_column_count(&self, arena: &Arena) -> Result<usize> {
        leaf_bytes::count(arena, self.names)
    }

    pub fn get_column_type(&self, arena: &Arena, column_ndx: usize) -> Result<ColumnType> {
        let raw = leaf_int::get(arena, self.types, column_ndx)?;
        ColumnType::from_raw(raw).ok_or(StoreError::NodePayloadMismatch {
            detail: "unknown column type value",
        })
    }

    /// The externally visible type (the enum-string encoding is hidden).
    pub fn get_public_column_type(&self, arena: &Arena, column_ndx: usize) -> Result<ColumnType> {
        Ok(self.get_column_type(arena, column_ndx)?.public_type())
    }

    pub fn get_column_name(&self, arena: &Arena, column_ndx: usize) -> Result<String> {
        let bytes = leaf_bytes::get(arena, self.names, column_ndx)?.ok_or(
            StoreError::NodePayloadMismatch {
                detail: "column name slot is null",
            },
        )?;
        String::from_utf8(bytes).map_err(|_| StoreError::NodePayloadMismatch {
            detail: "column name is not UTF-8",
        })
    }

    /// Index of the named public column.
    pub fn get_column_index(&self, arena: &Arena, name: &str) -> Result<Option<usize>> {
        let n = self.public_column_count(arena)?;
        for i in 0..n {
            if self.get_column_name(arena, i)? == name {
                return Ok(Some(i));
            }
        }
        Ok(None)
    }

    pub fn get_column_attr(&self, arena: &Arena, column_ndx: usize) -> Result<ColumnAttr> {
        let raw = leaf_int::get(arena, self.attrs, column_ndx)?;
        Ok(ColumnAttr::from_bits_truncate(raw as u8))
    }

    pub fn set_column_attr(
        &mut self,
        arena: &mut Arena,
        column_ndx: usize,
        attr: ColumnAttr,
    ) -> Result<()> {
        leaf_int::set(arena, self.attrs, column_ndx, i64::from(attr.bits()))?;
        self.update_has_strong_link_columns(arena)
    }

    fn set_column_type(
        &mut self,
        arena: &mut Arena,
        column_ndx: usize,
        ty: ColumnType,
    ) -> Result<()> {
        leaf_int::set(arena, self.types, column_ndx, ty as i64)
    }

    pub fn has_strong_link_columns(&self) -> bool {
        self.has_strong_links
    }

    fn update_has_strong_link_columns(&mut self, arena: &Arena) -> Result<()> {
        let n = self.column_count(arena)?;
        self.has_strong_links = false;
        for i in 0..n {
            if self
                .get_column_attr(arena, i)?
                .contains(ColumnAttr::STRONG_LINKS)
            {
                self.has_strong_links = true;
                break;
            }
        }
        Ok(())
    }

    /// Placement of the column within the table's columns block: search
    /// indexes of earlier columns each occupy one extra slot.
    pub fn get_column_ndx_in_parent(&self, arena: &Arena, column_ndx: usize) -> Result<usize> {
        let mut offset = 0;
        for i in 0..column_ndx {
            if self
                .get_column_attr(arena, i)?
                .contains(ColumnAttr::INDEXED)
            {
                offset += 1;
            }
        }
        Ok(column_ndx + offset)
    }

    pub fn get_column_info(&self, arena: &Arena, column_ndx: usize) -> Result<ColumnInfo> {
        Ok(ColumnInfo {
            column_ref_ndx: self.get_column_ndx_in_parent(arena, column_ndx)?,
            has_search_index: self
                .get_column_attr(arena, column_ndx)?
                .contains(ColumnAttr::INDEXED),
        })
    }

    // -- subspec bookkeeping -------------------------------------------------

    fn ensure_subspecs(&mut self, arena: &mut Arena) -> Result<Ref> {
        if let Some(r) = self.subspecs {
            return Ok(r);
        }
        let subspecs = node::slots_create(arena, hasrefs_flags(), 0, &[])?;
        let top_slots = node::slot_count(arena.translate(self.top)?);
        if top_slots == TOP_SUBSPECS {
            node::slot_insert(arena, self.top, TOP_SUBSPECS, Slot::Ref(subspecs))?;
            node::set_count(arena, self.top, top_slots + 1)?;
        } else {
            node::slot_set(arena, self.top, TOP_SUBSPECS, Slot::Ref(subspecs))?;
        }
        self.subspecs = Some(subspecs);
        Ok(subspecs)
    }

    /// Position within the sparse subspecs array for `column_ndx` (which
    /// must be a subspec-bearing column, or the column count).
    pub fn get_subspec_ndx(&self, arena: &Arena, column_ndx: usize) -> Result<usize> {
        self.get_subspec_ndx_after(arena, column_ndx, column_ndx)
    }

    fn get_subspec_ndx_after(
        &self,
        arena: &Arena,
        column_ndx: usize,
        skip_column_ndx: usize,
    ) -> Result<usize> {
        let mut subspec_ndx = 0;
        for i in 0..column_ndx {
            if i == skip_column_ndx {
                continue;
            }
            subspec_ndx += self.get_column_type(arena, i)?.subspec_entries();
        }
        Ok(subspec_ndx)
    }

    fn subspecs_ref(&self) -> Result<Ref> {
        self.subspecs.ok_or(StoreError::NodePayloadMismatch {
            detail: "spec has no subspecs array",
        })
    }

    /// Ref of the sub-spec stored for a subtable column.
    pub fn get_subspec_ref(&self, arena: &Arena, subspec_ndx: usize) -> Result<Ref> {
        node::slot_get(arena, self.subspecs_ref()?, subspec_ndx)?
            .as_ref_value()
            .ok_or(StoreError::NodePayloadMismatch {
                detail: "subspec slot is not a ref",
            })
    }

    /// Lazily created accessor for a subtable column's sub-spec.
    pub fn get_subspec(&mut self, arena: &Arena, subspec_ndx: usize) -> Result<&mut Spec> {
        if !self.subspec_cache.contains_key(&subspec_ndx) {
            let top = self.get_subspec_ref(arena, subspec_ndx)?;
            let sub = Spec::from_ref(arena, top)?;
            self.subspec_cache.insert(subspec_ndx, sub);
        }
        Ok(self
            .subspec_cache
            .get_mut(&subspec_ndx)
            .expect("inserted above"))
    }

    // -- column insertion and removal ---------------------------------------

    /// Insert a column descriptor at `column_ndx`.
    pub fn insert_column(
        &mut self,
        arena: &mut Arena,
        column_ndx: usize,
        ty: ColumnType,
        name: &str,
        attr: ColumnAttr,
    ) -> Result<()> {
        if name.len() > COLUMN_NAME_MAX {
            return Err(StoreError::NameTooLong {
                len: name.len(),
                max: COLUMN_NAME_MAX,
            });
        }
        // Backlink columns are unnamed.
        if ty != ColumnType::BackLink {
            leaf_bytes::medium::insert(arena, self.names, column_ndx, Some(name.as_bytes()))?;
        }
        leaf_int::insert(arena, self.types, column_ndx, ty as i64)?;
        leaf_int::insert(arena, self.attrs, column_ndx, i64::from(attr.bits()))?;

        if ty.subspec_entries() > 0 {
            let subspecs = self.ensure_subspecs(arena)?;
            let subspec_ndx = self.get_subspec_ndx(arena, column_ndx)?;
            match ty {
                ColumnType::Table => {
                    // A subtable column gets a real (empty) sub-spec.
                    let sub = Spec::create_empty(arena)?;
                    node::slot_insert(arena, subspecs, subspec_ndx, Slot::Ref(sub))?;
                    node::set_count(arena, subspecs, self.subspec_slot_count(arena)?)?;
                }
                ColumnType::Link | ColumnType::LinkList => {
                    // Target-table index is stored as a tagged scalar once
                    // wired; until then the slot stays 0.
                    node::slot_insert(arena, subspecs, subspec_ndx, Slot::Null)?;
                    node::set_count(arena, subspecs, self.subspec_slot_count(arena)?)?;
                }
                ColumnType::BackLink => {
                    // Origin table index and origin column index.
                    node::slot_insert(arena, subspecs, subspec_ndx, Slot::Null)?;
                    node::slot_insert(arena, subspecs, subspec_ndx + 1, Slot::Null)?;
                    node::set_count(arena, subspecs, self.subspec_slot_count(arena)?)?;
                }
                _ => unreachable!("subspec_entries() > 0 covers these types only"),
            }
            self.subspec_cache.clear();
        }

        self.update_has_strong_link_columns(arena)
    }

    fn subspec_slot_count(&self, arena: &Arena) -> Result<usize> {
        Ok(node::slot_count(arena.translate(self.subspecs_ref()?)?))
    }

    /// Remove the column descriptor at `column_ndx`, releasing whatever it
    /// owns (sub-spec tree, enum key list).
    pub fn erase_column(&mut self, arena: &mut Arena, column_ndx: usize) -> Result<()> {
        let ty = self.get_column_type(arena, column_ndx)?;

        match ty {
            ColumnType::Table => {
                let subspecs = self.subspecs_ref()?;
                let subspec_ndx = self.get_subspec_ndx(arena, column_ndx)?;
                let sub = self.get_subspec_ref(arena, subspec_ndx)?;
                node::destroy_deep(arena, sub);
                node::slot_remove(arena, subspecs, subspec_ndx)?;
                node::set_count(arena, subspecs, self.subspec_slot_count(arena)?)?;
                self.subspec_cache.clear();
            }
            ColumnType::Link | ColumnType::LinkList => {
                let subspecs = self.subspecs_ref()?;
                let subspec_ndx = self.get_subspec_ndx(arena, column_ndx)?;
                node::slot_remove(arena, subspecs, subspec_ndx)?;
                node::set_count(arena, subspecs, self.subspec_slot_count(arena)?)?;
                self.subspec_cache.clear();
            }
            ColumnType::BackLink => {
                let subspecs = self.subspecs_ref()?;
                let subspec_ndx = self.get_subspec_ndx(arena, column_ndx)?;
                node::slot_remove(arena, subspecs, subspec_ndx)?;
                node::slot_remove(arena, subspecs, subspec_ndx)?;
                node::set_count(arena, subspecs, self.subspec_slot_count(arena)?)?;
                self.subspec_cache.clear();
            }
            ColumnType::StringEnum => {
                // Enum columns also own a key list.
                let enumkeys = self.enumkeys_ref()?;
                let keys_ndx = self.get_enumkeys_ndx(arena, column_ndx)?;
                if let Slot::Ref(keys) = node::slot_get(arena, enumkeys, keys_ndx)? {
                    node::destroy_deep(arena, keys);
                }
                node::slot_remove(arena, enumkeys, keys_ndx)?;
                let n = node::slot_count(arena.translate(enumkeys)?);
                node::set_count(arena, enumkeys, n)?;
            }
            _ => {}
        }

        if ty != ColumnType::BackLink {
            leaf_bytes::medium::erase(arena, self.names, column_ndx)?;
        }
        leaf_int::erase(arena, self.types, column_ndx)?;
        leaf_int::erase(arena, self.attrs, column_ndx)?;

        self.update_has_strong_link_columns(arena)
    }

    // -- enum keys -----------------------------------------------------------

    fn enumkeys_ref(&self) -> Result<Ref> {
        self.enumkeys.ok_or(StoreError::NodePayloadMismatch {
            detail: "spec has no enumkeys array",
        })
    }

    /// Position within the enumkeys array for `column_ndx` (counting
    /// earlier enumerated columns).
    pub fn get_enumkeys_ndx(&self, arena: &Arena, column_ndx: usize) -> Result<usize> {
        let mut ndx = 0;
        for i in 0..column_ndx {
            if self.get_column_type(arena, i)? == ColumnType::StringEnum {
                ndx += 1;
            }
        }
        Ok(ndx)
    }

    /// The keys-column root for an enumerated column.
    pub fn get_enumkeys_ref(&self, arena: &Arena, column_ndx: usize) -> Result<Ref> {
        let enumkeys = self.enumkeys_ref()?;
        let ndx = self.get_enumkeys_ndx(arena, column_ndx)?;
        node::slot_get(arena, enumkeys, ndx)?
            .as_ref_value()
            .ok_or(StoreError::NodePayloadMismatch {
                detail: "enumkeys slot is not a ref",
            })
    }

    /// Convert a string column's descriptor to the enumerated encoding,
    /// storing `keys_ref` in the enumkeys array. Returns the enumkeys
    /// position the keys landed in.
    pub fn upgrade_string_to_enum(
        &mut self,
        arena: &mut Arena,
        column_ndx: usize,
        keys_ref: Ref,
    ) -> Result<usize> {
        if self.get_column_type(arena, column_ndx)? != ColumnType::String {
            return Err(StoreError::NotStringColumn);
        }
        if self.enumkeys.is_none() {
            let enumkeys = node::slots_create(arena, hasrefs_flags(), 0, &[])?;
            let top_slots = node::slot_count(arena.translate(self.top)?);
            if top_slots == TOP_SUBSPECS {
                // No subtables yet: hold the subspecs position with a null.
                node::slot_insert(arena, self.top, TOP_SUBSPECS, Slot::Null)?;
            }
            let top_slots = node::slot_count(arena.translate(self.top)?);
            if top_slots == TOP_ENUMKEYS {
                node::slot_insert(arena, self.top, TOP_ENUMKEYS, Slot::Ref(enumkeys))?;
            } else {
                node::slot_set(arena, self.top, TOP_ENUMKEYS, Slot::Ref(enumkeys))?;
            }
            node::set_count(arena, self.top, node::slot_count(arena.translate(self.top)?))?;
            self.enumkeys = Some(enumkeys);
        }

        let enumkeys = self.enumkeys_ref()?;
        let ins_pos = self.get_enumkeys_ndx(arena, column_ndx)?;
        node::slot_insert(arena, enumkeys, ins_pos, Slot::Ref(keys_ref))?;
        let n = node::slot_count(arena.translate(enumkeys)?);
        node::set_count(arena, enumkeys, n)?;

        self.set_column_type(arena, column_ndx, ColumnType::StringEnum)?;
        Ok(ins_pos)
    }

    // -- link metadata -------------------------------------------------------

    /// Record the group-level index of the table a link column points at.
    pub fn set_opposite_link_table_ndx(
        &mut self,
        arena: &mut Arena,
        column_ndx: usize,
        table_ndx: usize,
    ) -> Result<()> {
        let ty = self.get_column_type(arena, column_ndx)?;
        if !ty.is_link_type() && ty != ColumnType::BackLink {
            return Err(StoreError::ValueNotRepresentable {
                detail: "link target on a non-link column",
            });
        }
        let subspecs = self.subspecs_ref()?;
        let subspec_ndx = self.get_subspec_ndx(arena, column_ndx)?;
        node::slot_set(arena, subspecs, subspec_ndx, Slot::Tagged(table_ndx as u64))
    }

    /// The group-level index of the table a link column points at. Errors
    /// if the link was never wired.
    pub fn get_opposite_link_table_ndx(
        &self,
        arena: &Arena,
        column_ndx: usize,
    ) -> Result<usize> {
        let subspecs = self.subspecs_ref()?;
        let subspec_ndx = self.get_subspec_ndx(arena, column_ndx)?;
        match node::slot_get(arena, subspecs, subspec_ndx)? {
            Slot::Tagged(v) => Ok(v as usize),
            _ => Err(StoreError::NodePayloadMismatch {
                detail: "link target not yet wired",
            }),
        }
    }

    /// Record the origin column of a backlink column.
    pub fn set_backlink_origin_column(
        &mut self,
        arena: &mut Arena,
        backlink_col_ndx: usize,
        origin_col_ndx: usize,
    ) -> Result<()> {
        if self.get_column_type(arena, backlink_col_ndx)? != ColumnType::BackLink {
            return Err(StoreError::ValueNotRepresentable {
                detail: "backlink origin on a non-backlink column",
            });
        }
        let subspecs = self.subspecs_ref()?;
        let subspec_ndx = self.get_subspec_ndx(arena, backlink_col_ndx)?;
        node::slot_set(
            arena,
            subspecs,
            subspec_ndx + 1,
            Slot::Tagged(origin_col_ndx as u64),
        )
    }

    /// The origin column of a backlink column.
    pub fn get_origin_column_ndx(&self, arena: &Arena, backlink_col_ndx: usize) -> Result<usize> {
        let subspecs = self.subspecs_ref()?;
        let subspec_ndx = self.get_subspec_ndx(arena, backlink_col_ndx)?;
        match node::slot_get(arena, subspecs, subspec_ndx + 1)? {
            Slot::Tagged(v) => Ok(v as usize),
            _ => Err(StoreError::NodePayloadMismatch {
                detail: "backlink origin not yet wired",
            }),
        }
    }

    /// Find the backlink column mirroring `(origin_table_ndx,
    /// origin_col_ndx)`.
    pub fn find_backlink_column(
        &self,
        arena: &Arena,
        origin_table_ndx: usize,
        origin_col_ndx: usize,
    ) -> Result<Option<usize>> {
        let backlinks_column_start = self.public_column_count(arena)?;
        let backlinks_start = self.get_subspec_ndx(arena, backlinks_column_start)?;
        let subspecs = self.subspecs_ref()?;
        let count = node::slot_count(arena.translate(subspecs)?);

        let mut i = backlinks_start;
        while i + 1 < count {
            let table = node::slot_get(arena, subspecs, i)?;
            let column = node::slot_get(arena, subspecs, i + 1)?;
            if table == Slot::Tagged(origin_table_ndx as u64)
                && column == Slot::Tagged(origin_col_ndx as u64)
            {
                let pos = (i - backlinks_start) / 2;
                return Ok(Some(backlinks_column_start + pos));
            }
            i += 2;
        }
        Ok(None)
    }

    // -- equality ------------------------------------------------------------

    /// Structural equality: types, names, attrs, link targets, and
    /// sub-specs recursively. `String` and `StringEnum` compare equal (the
    /// encoding is an internal optimization).
    pub fn matches(&self, arena: &Arena, other: &Spec) -> Result<bool> {
        let n = self.column_count(arena)?;
        if other.column_count(arena)? != n {
            return Ok(false);
        }
        let public = self.public_column_count(arena)?;
        if other.public_column_count(arena)? != public {
            return Ok(false);
        }
        for i in 0..public {
            if self.get_column_name(arena, i)? != other.get_column_name(arena, i)? {
                return Ok(false);
            }
        }
        for i in 0..n {
            if self.get_column_attr(arena, i)? != other.get_column_attr(arena, i)? {
                return Ok(false);
            }
            let lhs = self.get_column_type(arena, i)?;
            let rhs = other.get_column_type(arena, i)?;
            match lhs {
                ColumnType::String | ColumnType::StringEnum => {
                    if !matches!(rhs, ColumnType::String | ColumnType::StringEnum) {
                        return Ok(false);
                    }
                }
                ColumnType::Table => {
                    if rhs != ColumnType::Table {
                        return Ok(false);
                    }
                    let subspec_ndx = self.get_subspec_ndx(arena, i)?;
                    let lhs_sub = Spec::from_ref(arena, self.get_subspec_ref(arena, subspec_ndx)?)?;
                    let rhs_sub =
                        Spec::from_ref(arena, other.get_subspec_ref(arena, subspec_ndx)?)?;
                    if !lhs_sub.matches(arena, &rhs_sub)? {
                        return Ok(false);
                    }
                }
                ColumnType::Link | ColumnType::LinkList => {
                    if rhs != lhs {
                        return Ok(false);
                    }
                    let lhs_target = self.get_opposite_link_table_ndx(arena, i)?;
                    let rhs_target = other.get_opposite_link_table_ndx(arena, i)?;
                    if lhs_target != rhs_target {
                        return Ok(false);
                    }
                }
                _ => {
                    if rhs != lhs {
                        return Ok(false);
                    }
                }
            }
        }
        Ok(true)
    }

    // -- verification --------------------------------------------------------

    /// Structural invariants: name count matches the public column count,
    /// type and attribute arrays are parallel, and subspec positions are
    /// unique.
    pub fn verify(&self, arena: &Arena) -> Result<()> {
        let types = self.column_count(arena)?;
        let attrs = leaf_int::count(arena, self.attrs)?;
        if types != attrs {
            return Err(StoreError::verify(format!(
                "types ({types}) and attrs ({attrs}) disagree"
            )));
        }
        let mut public = 0;
        for i in 0..types {
            if self.get_column_type(arena, i)? != ColumnType::BackLink {
                public += 1;
            }
        }
        let names = self.public_column_count(arena)?;
        if names != public {
            return Err(StoreError::verify(format!(
                "names ({names}) disagree with public columns ({public})"
            )));
        }
        // Subspec positions must be distinct per subspec-bearing column.
        let mut seen = Vec::new();
        for i in 0..types {
            if self.get_column_type(arena, i)?.subspec_entries() > 0 {
                let ndx = self.get_subspec_ndx(arena, i)?;
                if seen.contains(&ndx) {
                    return Err(StoreError::verify(format!(
                        "subspec position {ndx} is not unique"
                    )));
                }
                seen.push(ndx);
            }
        }
        Ok(())
    }
}
