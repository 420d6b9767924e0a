//! Integer leaf: packed element widths.
//!
//! Values are stored little-endian two's complement at a per-leaf width of
//! 1, 2, 4 or 8 bytes. The width widens on demand when a value outside the
//! current range is written and never narrows (except on clear). Ref-bearing
//! blocks reuse this format pinned at width 8, so that deep destroy/clone
//! can treat their payload as 64-bit slots.

use colonnade_arena::Arena;
use colonnade_error::{Result, StoreError};
use colonnade_types::limits::{MAX_NODE_SIZE, NODE_HEADER_SIZE};
use colonnade_types::{NodeFlags, Ref};

use crate::bptree::TreeInsertState;
use crate::node::{self, NodeHeader};

/// Minimal storage width in bytes for a value.
fn width_for(v: i64) -> u8 {
    if i64::from(v as i8) == v {
        1
    } else if i64::from(v as i16) == v {
        2
    } else if i64::from(v as i32) == v {
        4
    } else {
        8
    }
}

fn read_elem(payload: &[u8], i: usize, width: usize) -> i64 {
    let off = i * width;
    let bytes = &payload[off..off + width];
    match width {
        1 => i64::from(bytes[0] as i8),
        2 => i64::from(i16::from_le_bytes([bytes[0], bytes[1]])),
        4 => i64::from(i32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]])),
        _ => i64::from_le_bytes(bytes.try_into().expect("8-byte element")),
    }
}

fn write_elem(payload: &mut [u8], i: usize, width: usize, v: i64) {
    let off = i * width;
    let bytes = v.to_le_bytes();
    payload[off..off + width].copy_from_slice(&bytes[..width]);
}

fn load(arena: &Arena, r: Ref) -> Result<(NodeHeader, &[u8])> {
    let block = arena.translate(r)?;
    let header = NodeHeader::parse(block)?;
    let width = header.width as usize;
    if !matches!(width, 1 | 2 | 4 | 8) {
        return Err(StoreError::InvalidNodeHeader {
            detail: "integer leaf width not in {1,2,4,8}",
        });
    }
    let needed = NODE_HEADER_SIZE + header.count as usize * width;
    if block.len() < needed {
        return Err(StoreError::NodePayloadMismatch {
            detail: "integer leaf shorter than its count",
        });
    }
    Ok((header, &block[NODE_HEADER_SIZE..]))
}

/// The minimum width a block with these flags may use. Ref-bearing blocks
/// are pinned at 8 bytes so their payload slots stay addressable.
const fn min_width(flags: NodeFlags) -> u8 {
    if flags.hasrefs {
        8
    } else {
        1
    }
}

/// Create an integer-format block with the given flags and values.
pub fn create_with_flags(arena: &mut Arena, flags: NodeFlags, values: &[i64]) -> Result<Ref> {
    let mut width = min_width(flags);
    for &v in values {
        width = width.max(width_for(v));
    }
    let header = NodeHeader {
        flags,
        width,
        count: u32::try_from(values.len()).map_err(|_| StoreError::NodePayloadMismatch {
            detail: "element count exceeds u32",
        })?,
    };
    let mut block = header.new_block(values.len() * width as usize);
    for (i, &v) in values.iter().enumerate() {
        write_elem(&mut block[NODE_HEADER_SIZE..], i, width as usize, v);
    }
    arena.alloc(block)
}

/// Create a plain integer leaf.
pub fn create(arena: &mut Arena, values: &[i64]) -> Result<Ref> {
    create_with_flags(arena, NodeFlags::default(), values)
}

/// Create an empty integer leaf.
pub fn create_empty(arena: &mut Arena) -> Result<Ref> {
    create(arena, &[])
}

/// Element count.
pub fn count(arena: &Arena, r: Ref) -> Result<usize> {
    Ok(node::header(arena, r)?.count as usize)
}

/// Read element `ndx`.
pub fn get(arena: &Arena, r: Ref, ndx: usize) -> Result<i64> {
    let (header, payload) = load(arena, r)?;
    if ndx >= header.count as usize {
        return Err(StoreError::RowOutOfBounds {
            row: ndx,
            size: header.count as usize,
        });
    }
    Ok(read_elem(payload, ndx, header.width as usize))
}

/// All elements as a vector.
pub fn to_vec(arena: &Arena, r: Ref) -> Result<Vec<i64>> {
    let (header, payload) = load(arena, r)?;
    let width = header.width as usize;
    Ok((0..header.count as usize)
        .map(|i| read_elem(payload, i, width))
        .collect())
}

/// Rewrite the block at a wider element width.
fn widen(arena: &mut Arena, r: Ref, new_width: u8) -> Result<()> {
    let values = to_vec(arena, r)?;
    let header = node::header(arena, r)?;
    let new_header = NodeHeader {
        width: new_width,
        ..header
    };
    let mut block = new_header.new_block(values.len() * new_width as usize);
    for (i, &v) in values.iter().enumerate() {
        write_elem(&mut block[NODE_HEADER_SIZE..], i, new_width as usize, v);
    }
    arena.replace(r, block)
}

/// Write element `ndx`, widening the leaf if the value does not fit.
pub fn set(arena: &mut Arena, r: Ref, ndx: usize, v: i64) -> Result<()> {
    let header = node::header(arena, r)?;
    if ndx >= header.count as usize {
        return Err(StoreError::RowOutOfBounds {
            row: ndx,
            size: header.count as usize,
        });
    }
    let needed = width_for(v).max(min_width(header.flags));
    if needed > header.width {
        widen(arena, r, needed)?;
    }
    let header = node::header(arena, r)?;
    let width = header.width as usize;
    let block = arena.translate_mut(r)?;
    write_elem(&mut block[NODE_HEADER_SIZE..], ndx, width, v);
    Ok(())
}

/// Insert a value at `ndx`, shifting later elements. The caller enforces
/// the node-size ceiling; this is the raw leaf edit.
pub fn insert(arena: &mut Arena, r: Ref, ndx: usize, v: i64) -> Result<()> {
    let header = node::header(arena, r)?;
    let size = header.count as usize;
    if ndx > size {
        return Err(StoreError::RowOutOfBounds { row: ndx, size });
    }
    let needed = width_for(v).max(min_width(header.flags));
    if needed > header.width {
        widen(arena, r, needed)?;
    }
    let header = node::header(arena, r)?;
    let width = header.width as usize;
    let block = arena.translate_mut(r)?;
    let off = NODE_HEADER_SIZE + ndx * width;
    let bytes = v.to_le_bytes();
    block.splice(off..off, bytes[..width].iter().copied());
    node::set_count(arena, r, size + 1)
}

/// Append a value.
pub fn push(arena: &mut Arena, r: Ref, v: i64) -> Result<()> {
    let size = count(arena, r)?;
    insert(arena, r, size, v)
}

/// Remove the element at `ndx`, shifting later elements down.
pub fn erase(arena: &mut Arena, r: Ref, ndx: usize) -> Result<()> {
    let header = node::header(arena, r)?;
    let size = header.count as usize;
    if ndx >= size {
        return Err(StoreError::RowOutOfBounds { row: ndx, size });
    }
    let width = header.width as usize;
    let block = arena.translate_mut(r)?;
    let off = NODE_HEADER_SIZE + ndx * width;
    block.drain(off..off + width);
    node::set_count(arena, r, size - 1)
}

/// Remove all elements, resetting the width.
pub fn clear(arena: &mut Arena, r: Ref) -> Result<()> {
    let header = node::header(arena, r)?;
    let new_header = NodeHeader {
        width: min_width(header.flags),
        count: 0,
        ..header
    };
    arena.replace(r, new_header.new_block(0))
}

/// B+-tree leaf insertion hook: insert in place while the leaf has room,
/// split into a new sibling otherwise. `ndx` of `None` appends.
///
/// On split, `state` records how many elements stayed in this leaf
/// (`split_offset`) and the total across both leaves (`split_size`).
pub fn leaf_insert(
    arena: &mut Arena,
    r: Ref,
    ndx: Option<usize>,
    v: i64,
    state: &mut TreeInsertState,
) -> Result<Option<Ref>> {
    let size = count(arena, r)?;
    let ndx = ndx.unwrap_or(size);
    if size < MAX_NODE_SIZE {
        insert(arena, r, ndx, v)?;
        return Ok(None);
    }
    // Leaf is full: move the tail into a new sibling.
    let values = to_vec(arena, r)?;
    let flags = node::header(arena, r)?.flags;
    let sibling = if ndx == size {
        create_with_flags(arena, flags, &[v])?
    } else {
        let sibling = create_with_flags(arena, flags, &values[ndx..])?;
        let mut left = values[..ndx].to_vec();
        left.push(v);
        // Rebuild the left leaf in place to drop the moved tail.
        let mut width = min_width(flags);
        for &lv in &left {
            width = width.max(width_for(lv));
        }
        let new_header = NodeHeader {
            flags,
            width,
            count: u32::try_from(left.len()).expect("bounded by node size"),
        };
        let mut block = new_header.new_block(left.len() * width as usize);
        for (i, &lv) in left.iter().enumerate() {
            write_elem(&mut block[NODE_HEADER_SIZE..], i, width as usize, lv);
        }
        arena.replace(r, block)?;
        sibling
    };
    state.split_offset = if ndx == size { size } else { ndx + 1 };
    state.split_size = size + 1;
    Ok(Some(sibling))
}

/// First index in `[begin, end)` holding `v`.
pub fn find_first(
    arena: &Arena,
    r: Ref,
    v: i64,
    begin: usize,
    end: usize,
) -> Result<Option<usize>> {
    let (header, payload) = load(arena, r)?;
    let width = header.width as usize;
    let end = end.min(header.count as usize);
    for i in begin..end {
        if read_elem(payload, i, width) == v {
            return Ok(Some(i));
        }
    }
    Ok(None)
}

/// Lower bound over an ascending leaf.
pub fn lower_bound(arena: &Arena, r: Ref, v: i64) -> Result<usize> {
    let values = to_vec(arena, r)?;
    Ok(values.partition_point(|&x| x < v))
}

/// Upper bound over an ascending leaf.
pub fn upper_bound(arena: &Arena, r: Ref, v: i64) -> Result<usize> {
    let values = to_vec(arena, r)?;
    Ok(values.partition_point(|&x| x <= v))
}

/// Add `diff` to element `ndx`.
pub fn adjust(arena: &mut Arena, r: Ref, ndx: usize, diff: i64) -> Result<()> {
    let v = get(arena, r, ndx)?;
    set(arena, r, ndx, v + diff)
}

/// Add `diff` to every element.
pub fn adjust_all(arena: &mut Arena, r: Ref, diff: i64) -> Result<()> {
    let size = count(arena, r)?;
    for i in 0..size {
        adjust(arena, r, i, diff)?;
    }
    Ok(())
}

/// Add `diff` to every element greater than or equal to `limit`.
pub fn adjust_ge(arena: &mut Arena, r: Ref, limit: i64, diff: i64) -> Result<()> {
    let size = count(arena, r)?;
    for i in 0..size {
        let v = get(arena, r, i)?;
        if v >= limit {
            set(arena, r, i, v + diff)?;
        }
    }
    Ok(())
}
