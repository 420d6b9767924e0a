//! The three leaf encodings for variable-length bytes.
//!
//! Within a bytes/string column the leaves can be of different kinds,
//! optimized for the lengths of the values they hold. The kind is read
//! from the combination of the `inner`, `hasrefs` and `context` header
//! bits:
//!
//! ```text
//!   N R C
//!   1 1 -   inner B+-tree node (not a leaf)
//!   0 0 -   small leaf: fixed-stride slab, values <= 15 bytes
//!   0 1 0   medium leaf: offsets/blob child blocks, values <= 63 bytes
//!   0 1 1   big leaf: one blob ref per slot, unbounded
//! ```
//!
//! A leaf is only ever promoted to a higher kind; the demotion path does
//! not exist outside a full clear.

use colonnade_arena::Arena;
use colonnade_error::{Result, StoreError};
use colonnade_types::limits::{MAX_NODE_SIZE, MEDIUM_VALUE_MAX, NODE_HEADER_SIZE, SMALL_VALUE_MAX};
use colonnade_types::{LeafKind, NodeFlags, Ref, Slot};
use tracing::debug;

use crate::bptree::TreeInsertState;
use crate::leaf_int;
use crate::node::{self, NodeHeader};

/// A value as written: `None` is null (distinct from empty).
pub type ValueIn<'a> = Option<&'a [u8]>;

/// A value as read back.
pub type ValueOut = Option<Vec<u8>>;

/// Leaf kind of the block at `r`. Errors on inner nodes.
pub fn kind_of(arena: &Arena, r: Ref) -> Result<LeafKind> {
    let header = node::header(arena, r)?;
    LeafKind::from_flags(header.flags).ok_or(StoreError::InvalidNodeHeader {
        detail: "expected a bytes leaf, found an inner node",
    })
}

/// Element count of the leaf at `r` (any kind).
pub fn count(arena: &Arena, r: Ref) -> Result<usize> {
    Ok(node::header(arena, r)?.count as usize)
}

/// Whether a value fits a leaf kind without promotion.
pub fn fits(kind: LeafKind, value: ValueIn<'_>) -> bool {
    match value {
        None => true,
        Some(bytes) => LeafKind::required_for(bytes.len()) <= kind,
    }
}

// ---------------------------------------------------------------------------
// Small leaf: fixed-stride slab
// ---------------------------------------------------------------------------

pub mod small {
    use super::*;

    /// Tail byte marking a null slot.
    const NULL_TAIL: u8 = 0xFF;

    /// Slot stride needed for a value of `len` bytes (value + tail byte),
    /// rounded up the {1, 2, 4, 8, 16} ladder.
    fn stride_for(len: usize) -> u8 {
        debug_assert!(len <= SMALL_VALUE_MAX);
        ((len + 1).next_power_of_two()) as u8
    }

    fn flags() -> NodeFlags {
        LeafKind::Small.flags()
    }

    fn encode_slot(slot: &mut [u8], value: ValueIn<'_>) {
        let stride = slot.len();
        slot.fill(0);
        match value {
            None => slot[stride - 1] = NULL_TAIL,
            Some(bytes) => {
                slot[..bytes.len()].copy_from_slice(bytes);
                slot[stride - 1] = (stride - 1 - bytes.len()) as u8;
            }
        }
    }

    fn decode_slot(slot: &[u8]) -> ValueOut {
        let stride = slot.len();
        let tail = slot[stride - 1];
        if tail == NULL_TAIL {
            return None;
        }
        let len = stride - 1 - tail as usize;
        Some(slot[..len].to_vec())
    }

    /// Create a small leaf holding the given values.
    pub fn create(arena: &mut Arena, values: &[ValueIn<'_>]) -> Result<Ref> {
        let mut stride = 1u8;
        for v in values {
            if let Some(bytes) = v {
                if bytes.len() > SMALL_VALUE_MAX {
                    return Err(StoreError::ValueNotRepresentable {
                        detail: "value too long for a small leaf",
                    });
                }
                stride = stride.max(stride_for(bytes.len()));
            }
        }
        let header = NodeHeader {
            flags: flags(),
            width: stride,
            count: u32::try_from(values.len()).expect("bounded by node size"),
        };
        let mut block = header.new_block(values.len() * stride as usize);
        for (i, v) in values.iter().enumerate() {
            let off = NODE_HEADER_SIZE + i * stride as usize;
            encode_slot(&mut block[off..off + stride as usize], *v);
        }
        arena.alloc(block)
    }

    /// Create an empty small leaf.
    pub fn create_empty(arena: &mut Arena) -> Result<Ref> {
        create(arena, &[])
    }

    /// Read slot `ndx`.
    pub fn get(arena: &Arena, r: Ref, ndx: usize) -> Result<ValueOut> {
        let block = arena.translate(r)?;
        let header = NodeHeader::parse(block)?;
        let size = header.count as usize;
        if ndx >= size {
            return Err(StoreError::RowOutOfBounds { row: ndx, size });
        }
        let stride = header.width as usize;
        let off = NODE_HEADER_SIZE + ndx * stride;
        Ok(decode_slot(&block[off..off + stride]))
    }

    /// All values.
    pub fn to_values(arena: &Arena, r: Ref) -> Result<Vec<ValueOut>> {
        let block = arena.translate(r)?;
        let header = NodeHeader::parse(block)?;
        let stride = header.width as usize;
        Ok((0..header.count as usize)
            .map(|i| {
                let off = NODE_HEADER_SIZE + i * stride;
                decode_slot(&block[off..off + stride])
            })
            .collect())
    }

    fn ensure_stride(arena: &mut Arena, r: Ref, needed: u8) -> Result<()> {
        let header = node::header(arena, r)?;
        if header.width >= needed {
            return Ok(());
        }
        let values = to_values(arena, r)?;
        let new_header = NodeHeader {
            width: needed,
            ..header
        };
        let mut block = new_header.new_block(values.len() * needed as usize);
        for (i, v) in values.iter().enumerate() {
            let off = NODE_HEADER_SIZE + i * needed as usize;
            encode_slot(&mut block[off..off + needed as usize], v.as_deref());
        }
        arena.replace(r, block)
    }

    fn check_value(value: ValueIn<'_>) -> Result<u8> {
        match value {
            None => Ok(1),
            Some(bytes) if bytes.len() <= SMALL_VALUE_MAX => Ok(stride_for(bytes.len())),
            Some(_) => Err(StoreError::ValueNotRepresentable {
                detail: "value too long for a small leaf",
            }),
        }
    }

    /// Write slot `ndx`, widening the slab stride if needed.
    pub fn set(arena: &mut Arena, r: Ref, ndx: usize, value: ValueIn<'_>) -> Result<()> {
        let needed = check_value(value)?;
        let size = count(arena, r)?;
        if ndx >= size {
            return Err(StoreError::RowOutOfBounds { row: ndx, size });
        }
        ensure_stride(arena, r, needed)?;
        let header = node::header(arena, r)?;
        let stride = header.width as usize;
        let block = arena.translate_mut(r)?;
        let off = NODE_HEADER_SIZE + ndx * stride;
        encode_slot(&mut block[off..off + stride], value);
        Ok(())
    }

    /// Insert a value at `ndx`, shifting later slots.
    pub fn insert(arena: &mut Arena, r: Ref, ndx: usize, value: ValueIn<'_>) -> Result<()> {
        let needed = check_value(value)?;
        let size = count(arena, r)?;
        if ndx > size {
            return Err(StoreError::RowOutOfBounds { row: ndx, size });
        }
        ensure_stride(arena, r, needed)?;
        let header = node::header(arena, r)?;
        let stride = header.width as usize;
        let block = arena.translate_mut(r)?;
        let off = NODE_HEADER_SIZE + ndx * stride;
        let mut slot = vec![0u8; stride];
        encode_slot(&mut slot, value);
        block.splice(off..off, slot);
        node::set_count(arena, r, size + 1)
    }

    /// Remove slot `ndx`.
    pub fn erase(arena: &mut Arena, r: Ref, ndx: usize) -> Result<()> {
        let size = count(arena, r)?;
        if ndx >= size {
            return Err(StoreError::RowOutOfBounds { row: ndx, size });
        }
        let stride = node::header(arena, r)?.width as usize;
        let block = arena.translate_mut(r)?;
        let off = NODE_HEADER_SIZE + ndx * stride;
        block.drain(off..off + stride);
        node::set_count(arena, r, size - 1)
    }

    /// Remove all slots, resetting the stride.
    pub fn clear(arena: &mut Arena, r: Ref) -> Result<()> {
        let header = NodeHeader {
            flags: flags(),
            width: 1,
            count: 0,
        };
        arena.replace(r, header.new_block(0))
    }
}

// ---------------------------------------------------------------------------
// Medium leaf: offsets + blob (+ nulls) child blocks
// ---------------------------------------------------------------------------

pub mod medium {
    use super::*;

    fn flags() -> NodeFlags {
        LeafKind::Medium.flags()
    }

    struct Parts {
        offsets: Ref,
        blob: Ref,
        nulls: Option<Ref>,
    }

    fn parts(arena: &Arena, r: Ref) -> Result<Parts> {
        let block = arena.translate(r)?;
        let n_slots = node::slot_count(block);
        if !(2..=3).contains(&n_slots) {
            return Err(StoreError::NodePayloadMismatch {
                detail: "medium leaf payload is not 2-3 child refs",
            });
        }
        let child = |i: usize| -> Result<Ref> {
            node::slot_get(arena, r, i)?
                .as_ref_value()
                .ok_or(StoreError::NodePayloadMismatch {
                    detail: "medium leaf child slot is not a ref",
                })
        };
        Ok(Parts {
            offsets: child(0)?,
            blob: child(1)?,
            nulls: if n_slots == 3 { Some(child(2)?) } else { None },
        })
    }

    fn check_value(value: ValueIn<'_>, nullable: bool) -> Result<()> {
        match value {
            None if !nullable => Err(StoreError::NotNullable),
            Some(bytes) if bytes.len() > MEDIUM_VALUE_MAX => {
                Err(StoreError::ValueNotRepresentable {
                    detail: "value too long for a medium leaf",
                })
            }
            _ => Ok(()),
        }
    }

    /// Create a medium leaf holding the given values.
    pub fn create(arena: &mut Arena, nullable: bool, values: &[ValueIn<'_>]) -> Result<Ref> {
        let mut offsets = Vec::with_capacity(values.len());
        let mut nulls = Vec::with_capacity(values.len());
        let mut blob = Vec::new();
        for v in values {
            check_value(*v, nullable)?;
            match v {
                None => nulls.push(1),
                Some(bytes) => {
                    blob.extend_from_slice(bytes);
                    nulls.push(0);
                }
            }
            offsets.push(blob.len() as i64);
        }
        let offsets_ref = leaf_int::create(arena, &offsets)?;
        let blob_ref = node::blob_create(arena, &blob)?;
        let mut slots = vec![Slot::Ref(offsets_ref), Slot::Ref(blob_ref)];
        if nullable {
            let nulls_ref = leaf_int::create(arena, &nulls)?;
            slots.push(Slot::Ref(nulls_ref));
        }
        node::slots_create(arena, flags(), values.len(), &slots)
    }

    /// Create an empty medium leaf.
    pub fn create_empty(arena: &mut Arena, nullable: bool) -> Result<Ref> {
        create(arena, nullable, &[])
    }

    fn bounds(arena: &Arena, offsets: Ref, ndx: usize) -> Result<(usize, usize)> {
        let start = if ndx == 0 {
            0
        } else {
            leaf_int::get(arena, offsets, ndx - 1)? as usize
        };
        let end = leaf_int::get(arena, offsets, ndx)? as usize;
        Ok((start, end))
    }

    /// Read slot `ndx`.
    pub fn get(arena: &Arena, r: Ref, ndx: usize) -> Result<ValueOut> {
        let size = count(arena, r)?;
        if ndx >= size {
            return Err(StoreError::RowOutOfBounds { row: ndx, size });
        }
        let parts = parts(arena, r)?;
        if let Some(nulls) = parts.nulls {
            if leaf_int::get(arena, nulls, ndx)? != 0 {
                return Ok(None);
            }
        }
        let (start, end) = bounds(arena, parts.offsets, ndx)?;
        let data = node::blob_bytes(arena, parts.blob)?;
        if end > data.len() || start > end {
            return Err(StoreError::NodePayloadMismatch {
                detail: "medium leaf offsets exceed blob",
            });
        }
        Ok(Some(data[start..end].to_vec()))
    }

    /// All values.
    pub fn to_values(arena: &Arena, r: Ref) -> Result<Vec<ValueOut>> {
        (0..count(arena, r)?).map(|i| get(arena, r, i)).collect()
    }

    fn splice_blob(
        arena: &mut Arena,
        blob: Ref,
        start: usize,
        end: usize,
        bytes: &[u8],
    ) -> Result<()> {
        let block = arena.translate_mut(blob)?;
        let from = NODE_HEADER_SIZE + start;
        let to = NODE_HEADER_SIZE + end;
        if to > block.len() || from > to {
            return Err(StoreError::NodePayloadMismatch {
                detail: "blob splice out of range",
            });
        }
        block.splice(from..to, bytes.iter().copied());
        let new_len = block.len() - NODE_HEADER_SIZE;
        let block = arena.translate_mut(blob)?;
        block[4..8].copy_from_slice(&(new_len as u32).to_le_bytes());
        Ok(())
    }

    fn shift_offsets_from(arena: &mut Arena, offsets: Ref, from: usize, delta: i64) -> Result<()> {
        let n = leaf_int::count(arena, offsets)?;
        for i in from..n {
            leaf_int::adjust(arena, offsets, i, delta)?;
        }
        Ok(())
    }

    /// Write slot `ndx`.
    pub fn set(arena: &mut Arena, r: Ref, ndx: usize, value: ValueIn<'_>) -> Result<()> {
        let size = count(arena, r)?;
        if ndx >= size {
            return Err(StoreError::RowOutOfBounds { row: ndx, size });
        }
        let parts = parts(arena, r)?;
        check_value(value, parts.nulls.is_some())?;
        let (start, end) = bounds(arena, parts.offsets, ndx)?;
        let bytes = value.unwrap_or(&[]);
        splice_blob(arena, parts.blob, start, end, bytes)?;
        let delta = bytes.len() as i64 - (end - start) as i64;
        if delta != 0 {
            shift_offsets_from(arena, parts.offsets, ndx, delta)?;
        }
        if let Some(nulls) = parts.nulls {
            leaf_int::set(arena, nulls, ndx, i64::from(value.is_none()))?;
        }
        Ok(())
    }

    /// Insert a value at `ndx`.
    pub fn insert(arena: &mut Arena, r: Ref, ndx: usize, value: ValueIn<'_>) -> Result<()> {
        let size = count(arena, r)?;
        if ndx > size {
            return Err(StoreError::RowOutOfBounds { row: ndx, size });
        }
        let parts = parts(arena, r)?;
        check_value(value, parts.nulls.is_some())?;
        let start = if ndx == 0 {
            0
        } else {
            leaf_int::get(arena, parts.offsets, ndx - 1)? as usize
        };
        let bytes = value.unwrap_or(&[]);
        splice_blob(arena, parts.blob, start, start, bytes)?;
        leaf_int::insert(arena, parts.offsets, ndx, (start + bytes.len()) as i64)?;
        shift_offsets_from(arena, parts.offsets, ndx + 1, bytes.len() as i64)?;
        if let Some(nulls) = parts.nulls {
            leaf_int::insert(arena, nulls, ndx, i64::from(value.is_none()))?;
        }
        node::set_count(arena, r, size + 1)
    }

    /// Remove slot `ndx`.
    pub fn erase(arena: &mut Arena, r: Ref, ndx: usize) -> Result<()> {
        let size = count(arena, r)?;
        if ndx >= size {
            return Err(StoreError::RowOutOfBounds { row: ndx, size });
        }
        let parts = parts(arena, r)?;
        let (start, end) = bounds(arena, parts.offsets, ndx)?;
        splice_blob(arena, parts.blob, start, end, &[])?;
        leaf_int::erase(arena, parts.offsets, ndx)?;
        shift_offsets_from(arena, parts.offsets, ndx, -((end - start) as i64))?;
        if let Some(nulls) = parts.nulls {
            leaf_int::erase(arena, nulls, ndx)?;
        }
        node::set_count(arena, r, size - 1)
    }

    /// Remove all slots.
    pub fn clear(arena: &mut Arena, r: Ref) -> Result<()> {
        let parts = parts(arena, r)?;
        leaf_int::clear(arena, parts.offsets)?;
        let empty = NodeHeader {
            flags: NodeFlags::default(),
            width: 1,
            count: 0,
        };
        arena.replace(parts.blob, empty.new_block(0))?;
        if let Some(nulls) = parts.nulls {
            leaf_int::clear(arena, nulls)?;
        }
        node::set_count(arena, r, 0)
    }
}

// ---------------------------------------------------------------------------
// Big leaf: one blob ref per slot
// ---------------------------------------------------------------------------

pub mod big {
    use super::*;

    fn flags() -> NodeFlags {
        LeafKind::Big.flags()
    }

    /// Create a big leaf holding the given values.
    pub fn create(arena: &mut Arena, values: &[ValueIn<'_>]) -> Result<Ref> {
        let mut slots = Vec::with_capacity(values.len());
        for v in values {
            let slot = match v {
                None => Slot::Null,
                Some(bytes) => Slot::Ref(node::blob_create(arena, bytes)?),
            };
            slots.push(slot);
        }
        node::slots_create(arena, flags(), values.len(), &slots)
    }

    /// Create an empty big leaf.
    pub fn create_empty(arena: &mut Arena) -> Result<Ref> {
        create(arena, &[])
    }

    /// Read slot `ndx`.
    pub fn get(arena: &Arena, r: Ref, ndx: usize) -> Result<ValueOut> {
        let size = count(arena, r)?;
        if ndx >= size {
            return Err(StoreError::RowOutOfBounds { row: ndx, size });
        }
        match node::slot_get(arena, r, ndx)? {
            Slot::Null => Ok(None),
            Slot::Ref(blob) => Ok(Some(node::blob_bytes(arena, blob)?.to_vec())),
            Slot::Tagged(_) => Err(StoreError::NodePayloadMismatch {
                detail: "big leaf slot holds a tagged scalar",
            }),
        }
    }

    /// All values.
    pub fn to_values(arena: &Arena, r: Ref) -> Result<Vec<ValueOut>> {
        (0..count(arena, r)?).map(|i| get(arena, r, i)).collect()
    }

    /// Write slot `ndx`, freeing the previous blob.
    pub fn set(arena: &mut Arena, r: Ref, ndx: usize, value: ValueIn<'_>) -> Result<()> {
        let size = count(arena, r)?;
        if ndx >= size {
            return Err(StoreError::RowOutOfBounds { row: ndx, size });
        }
        let new_slot = match value {
            None => Slot::Null,
            Some(bytes) => Slot::Ref(node::blob_create(arena, bytes)?),
        };
        if let Slot::Ref(old) = node::slot_get(arena, r, ndx)? {
            arena.free(old);
        }
        node::slot_set(arena, r, ndx, new_slot)
    }

    /// Insert a value at `ndx`.
    pub fn insert(arena: &mut Arena, r: Ref, ndx: usize, value: ValueIn<'_>) -> Result<()> {
        let size = count(arena, r)?;
        if ndx > size {
            return Err(StoreError::RowOutOfBounds { row: ndx, size });
        }
        let slot = match value {
            None => Slot::Null,
            Some(bytes) => Slot::Ref(node::blob_create(arena, bytes)?),
        };
        node::slot_insert(arena, r, ndx, slot)?;
        node::set_count(arena, r, size + 1)
    }

    /// Remove slot `ndx`, freeing its blob.
    pub fn erase(arena: &mut Arena, r: Ref, ndx: usize) -> Result<()> {
        let size = count(arena, r)?;
        if ndx >= size {
            return Err(StoreError::RowOutOfBounds { row: ndx, size });
        }
        if let Slot::Ref(blob) = node::slot_get(arena, r, ndx)? {
            arena.free(blob);
        }
        node::slot_remove(arena, r, ndx)?;
        node::set_count(arena, r, size - 1)
    }

    /// Remove all slots, freeing their blobs.
    pub fn clear(arena: &mut Arena, r: Ref) -> Result<()> {
        let size = count(arena, r)?;
        for i in 0..size {
            if let Slot::Ref(blob) = node::slot_get(arena, r, i)? {
                arena.free(blob);
            }
        }
        let header = NodeHeader {
            flags: flags(),
            width: 8,
            count: 0,
        };
        arena.replace(r, header.new_block(0))
    }
}

// ---------------------------------------------------------------------------
// Kind-dispatched operations
// ---------------------------------------------------------------------------

/// Read slot `ndx` of a leaf of any kind.
pub fn get(arena: &Arena, r: Ref, ndx: usize) -> Result<ValueOut> {
    match kind_of(arena, r)? {
        LeafKind::Small => small::get(arena, r, ndx),
        LeafKind::Medium => medium::get(arena, r, ndx),
        LeafKind::Big => big::get(arena, r, ndx),
    }
}

/// All values of a leaf of any kind.
pub fn to_values(arena: &Arena, r: Ref) -> Result<Vec<ValueOut>> {
    match kind_of(arena, r)? {
        LeafKind::Small => small::to_values(arena, r),
        LeafKind::Medium => medium::to_values(arena, r),
        LeafKind::Big => big::to_values(arena, r),
    }
}

/// Write slot `ndx`. The value must fit the leaf's kind (promote first).
pub fn set(arena: &mut Arena, r: Ref, ndx: usize, value: ValueIn<'_>) -> Result<()> {
    match kind_of(arena, r)? {
        LeafKind::Small => small::set(arena, r, ndx, value),
        LeafKind::Medium => medium::set(arena, r, ndx, value),
        LeafKind::Big => big::set(arena, r, ndx, value),
    }
}

/// Insert a value at `ndx`. The value must fit the leaf's kind.
pub fn insert(arena: &mut Arena, r: Ref, ndx: usize, value: ValueIn<'_>) -> Result<()> {
    match kind_of(arena, r)? {
        LeafKind::Small => small::insert(arena, r, ndx, value),
        LeafKind::Medium => medium::insert(arena, r, ndx, value),
        LeafKind::Big => big::insert(arena, r, ndx, value),
    }
}

/// Remove slot `ndx` of a leaf of any kind.
pub fn erase(arena: &mut Arena, r: Ref, ndx: usize) -> Result<()> {
    match kind_of(arena, r)? {
        LeafKind::Small => small::erase(arena, r, ndx),
        LeafKind::Medium => medium::erase(arena, r, ndx),
        LeafKind::Big => big::erase(arena, r, ndx),
    }
}

/// Clear a leaf of any kind in place (the kind is kept).
pub fn clear(arena: &mut Arena, r: Ref) -> Result<()> {
    match kind_of(arena, r)? {
        LeafKind::Small => small::clear(arena, r),
        LeafKind::Medium => medium::clear(arena, r),
        LeafKind::Big => big::clear(arena, r),
    }
}

/// Create an empty leaf of the given kind.
pub fn create_empty(arena: &mut Arena, kind: LeafKind, nullable: bool) -> Result<Ref> {
    match kind {
        LeafKind::Small => small::create_empty(arena),
        LeafKind::Medium => medium::create_empty(arena, nullable),
        LeafKind::Big => big::create_empty(arena),
    }
}

/// Promote the leaf at `r` to a higher kind: copy every value into a fresh
/// leaf of the target kind, destroy the old leaf, and return the new ref.
/// The caller re-parents the returned leaf.
pub fn promote(arena: &mut Arena, r: Ref, to: LeafKind, nullable: bool) -> Result<Ref> {
    let from = kind_of(arena, r)?;
    debug_assert!(from < to, "leaf promotion must go upward");
    let values = to_values(arena, r)?;
    let borrowed: Vec<ValueIn<'_>> = values.iter().map(|v| v.as_deref()).collect();
    let new_ref = match to {
        LeafKind::Small => small::create(arena, &borrowed)?,
        LeafKind::Medium => medium::create(arena, nullable, &borrowed)?,
        LeafKind::Big => big::create(arena, &borrowed)?,
    };
    debug!(
        from_kind = ?from,
        to_kind = ?to,
        old = r.get(),
        new = new_ref.get(),
        "promote bytes leaf"
    );
    node::destroy_deep(arena, r);
    Ok(new_ref)
}

/// B+-tree leaf insertion hook for bytes leaves: insert in place while the
/// leaf has room, split into a new sibling otherwise. The value must fit
/// the leaf's kind (promote first). `ndx` of `None` appends.
pub fn leaf_insert(
    arena: &mut Arena,
    r: Ref,
    ndx: Option<usize>,
    value: ValueIn<'_>,
    state: &mut TreeInsertState,
) -> Result<Option<Ref>> {
    let kind = kind_of(arena, r)?;
    let size = count(arena, r)?;
    let ndx = ndx.unwrap_or(size);
    if size < MAX_NODE_SIZE {
        insert(arena, r, ndx, value)?;
        return Ok(None);
    }
    // Leaf is full: move the tail into a new sibling of the same kind.
    let nullable = match kind {
        LeafKind::Medium => node::slot_count(arena.translate(r)?) == 3,
        _ => true,
    };
    let sibling = if ndx == size {
        let one = [value];
        match kind {
            LeafKind::Small => small::create(arena, &one)?,
            LeafKind::Medium => medium::create(arena, nullable, &one)?,
            LeafKind::Big => big::create(arena, &one)?,
        }
    } else {
        let values = to_values(arena, r)?;
        let tail: Vec<ValueIn<'_>> = values[ndx..].iter().map(|v| v.as_deref()).collect();
        let sibling = match kind {
            LeafKind::Small => small::create(arena, &tail)?,
            LeafKind::Medium => medium::create(arena, nullable, &tail)?,
            LeafKind::Big => big::create(arena, &tail)?,
        };
        // Trim the moved tail off the existing leaf, then place the value;
        // the ref stays stable so the parent needs no update for this leaf.
        for i in (ndx..size).rev() {
            erase(arena, r, i)?;
        }
        insert(arena, r, ndx, value)?;
        sibling
    };
    state.split_offset = if ndx == size { size } else { ndx + 1 };
    state.split_size = size + 1;
    Ok(Some(sibling))
}

/// First index in `[begin, end)` holding `value`.
pub fn find_first(
    arena: &Arena,
    r: Ref,
    value: ValueIn<'_>,
    begin: usize,
    end: usize,
) -> Result<Option<usize>> {
    let n = count(arena, r)?;
    let end = end.min(n);
    for i in begin..end {
        if get(arena, r, i)?.as_deref() == value {
            return Ok(Some(i));
        }
    }
    Ok(None)
}

/// Number of slots in `[0, count)` holding `value`.
pub fn count_matches(arena: &Arena, r: Ref, value: ValueIn<'_>) -> Result<usize> {
    let n = count(arena, r)?;
    let mut matches = 0;
    for i in 0..n {
        if get(arena, r, i)?.as_deref() == value {
            matches += 1;
        }
    }
    Ok(matches)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn small_round_trip() {
        let mut arena = Arena::new();
        let r = small::create(&mut arena, &[Some(b"a"), Some(b""), None]).unwrap();
        assert_eq!(kind_of(&arena, r).unwrap(), LeafKind::Small);
        assert_eq!(count(&arena, r).unwrap(), 3);
        assert_eq!(get(&arena, r, 0).unwrap().as_deref(), Some(&b"a"[..]));
        assert_eq!(get(&arena, r, 1).unwrap().as_deref(), Some(&b""[..]));
        assert_eq!(get(&arena, r, 2).unwrap(), None);
    }

    #[test]
    fn small_widens_stride() {
        let mut arena = Arena::new();
        let r = small::create(&mut arena, &[Some(b"x")]).unwrap();
        small::set(&mut arena, r, 0, Some(b"fifteen bytes!!")).unwrap();
        assert_eq!(
            get(&arena, r, 0).unwrap().as_deref(),
            Some(&b"fifteen bytes!!"[..])
        );
        assert!(small::set(&mut arena, r, 0, Some(b"sixteen bytes!!!")).is_err());
    }

    #[test]
    fn small_insert_erase() {
        let mut arena = Arena::new();
        let r = small::create_empty(&mut arena).unwrap();
        small::insert(&mut arena, r, 0, Some(b"b")).unwrap();
        small::insert(&mut arena, r, 0, Some(b"a")).unwrap();
        small::insert(&mut arena, r, 2, Some(b"c")).unwrap();
        let values = to_values(&arena, r).unwrap();
        assert_eq!(
            values,
            vec![
                Some(b"a".to_vec()),
                Some(b"b".to_vec()),
                Some(b"c".to_vec())
            ]
        );
        small::erase(&mut arena, r, 1).unwrap();
        assert_eq!(count(&arena, r).unwrap(), 2);
        assert_eq!(get(&arena, r, 1).unwrap().as_deref(), Some(&b"c"[..]));
    }

    #[test]
    fn medium_round_trip() {
        let mut arena = Arena::new();
        let long = vec![b'm'; 40];
        let r = medium::create(&mut arena, true, &[Some(&long), None, Some(b"short")]).unwrap();
        assert_eq!(kind_of(&arena, r).unwrap(), LeafKind::Medium);
        assert_eq!(get(&arena, r, 0).unwrap().as_deref(), Some(&long[..]));
        assert_eq!(get(&arena, r, 1).unwrap(), None);
        assert_eq!(get(&arena, r, 2).unwrap().as_deref(), Some(&b"short"[..]));
    }

    #[test]
    fn medium_set_resizes_blob() {
        let mut arena = Arena::new();
        let r = medium::create(&mut arena, false, &[Some(b"aa"), Some(b"bb"), Some(b"cc")])
            .unwrap();
        medium::set(&mut arena, r, 1, Some(b"much longer value")).unwrap();
        assert_eq!(get(&arena, r, 0).unwrap().as_deref(), Some(&b"aa"[..]));
        assert_eq!(
            get(&arena, r, 1).unwrap().as_deref(),
            Some(&b"much longer value"[..])
        );
        assert_eq!(get(&arena, r, 2).unwrap().as_deref(), Some(&b"cc"[..]));

        medium::set(&mut arena, r, 1, Some(b"")).unwrap();
        assert_eq!(get(&arena, r, 1).unwrap().as_deref(), Some(&b""[..]));
        assert_eq!(get(&arena, r, 2).unwrap().as_deref(), Some(&b"cc"[..]));
    }

    #[test]
    fn medium_insert_erase() {
        let mut arena = Arena::new();
        let r = medium::create_empty(&mut arena, false).unwrap();
        medium::insert(&mut arena, r, 0, Some(b"bbb")).unwrap();
        medium::insert(&mut arena, r, 0, Some(b"aaaa")).unwrap();
        medium::insert(&mut arena, r, 2, Some(b"c")).unwrap();
        assert_eq!(
            to_values(&arena, r).unwrap(),
            vec![
                Some(b"aaaa".to_vec()),
                Some(b"bbb".to_vec()),
                Some(b"c".to_vec())
            ]
        );
        medium::erase(&mut arena, r, 0).unwrap();
        assert_eq!(
            to_values(&arena, r).unwrap(),
            vec![Some(b"bbb".to_vec()), Some(b"c".to_vec())]
        );
    }

    #[test]
    fn medium_null_needs_nullable() {
        let mut arena = Arena::new();
        let r = medium::create_empty(&mut arena, false).unwrap();
        let err = medium::insert(&mut arena, r, 0, None).unwrap_err();
        assert!(matches!(err, StoreError::NotNullable));
    }

    #[test]
    fn big_round_trip() {
        let mut arena = Arena::new();
        let huge = vec![b'x'; 500];
        let r = big::create(&mut arena, &[Some(&huge), None, Some(b"")]).unwrap();
        assert_eq!(kind_of(&arena, r).unwrap(), LeafKind::Big);
        assert_eq!(get(&arena, r, 0).unwrap().as_deref(), Some(&huge[..]));
        assert_eq!(get(&arena, r, 1).unwrap(), None);
        // Empty is distinct from null.
        assert_eq!(get(&arena, r, 2).unwrap().as_deref(), Some(&b""[..]));
    }

    #[test]
    fn big_set_frees_old_blob() {
        let mut arena = Arena::new();
        let r = big::create(&mut arena, &[Some(b"old")]).unwrap();
        let old_blob = node::slot_get(&arena, r, 0).unwrap().as_ref_value().unwrap();
        big::set(&mut arena, r, 0, Some(b"new")).unwrap();
        assert!(!arena.is_live(old_blob));
        assert_eq!(get(&arena, r, 0).unwrap().as_deref(), Some(&b"new"[..]));
    }

    #[test]
    fn promotion_preserves_values() {
        let mut arena = Arena::new();
        let r = small::create(&mut arena, &[Some(b"x"), Some(b"y"), None]).unwrap();

        let r = promote(&mut arena, r, LeafKind::Medium, true).unwrap();
        assert_eq!(kind_of(&arena, r).unwrap(), LeafKind::Medium);
        assert_eq!(
            to_values(&arena, r).unwrap(),
            vec![Some(b"x".to_vec()), Some(b"y".to_vec()), None]
        );

        let r = promote(&mut arena, r, LeafKind::Big, true).unwrap();
        assert_eq!(kind_of(&arena, r).unwrap(), LeafKind::Big);
        assert_eq!(
            to_values(&arena, r).unwrap(),
            vec![Some(b"x".to_vec()), Some(b"y".to_vec()), None]
        );
    }

    #[test]
    fn scan_helpers() {
        let mut arena = Arena::new();
        let r = small::create(&mut arena, &[Some(b"a"), Some(b"b"), Some(b"a")]).unwrap();
        assert_eq!(
            find_first(&arena, r, Some(b"a"), 0, usize::MAX).unwrap(),
            Some(0)
        );
        assert_eq!(
            find_first(&arena, r, Some(b"a"), 1, usize::MAX).unwrap(),
            Some(2)
        );
        assert_eq!(find_first(&arena, r, Some(b"z"), 0, usize::MAX).unwrap(), None);
        assert_eq!(count_matches(&arena, r, Some(b"a")).unwrap(), 2);
    }
}
