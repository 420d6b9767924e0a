//! Node block layout.
//!
//! Every arena block starts with an 8-byte header:
//!
//! ```text
//! ┌────────┬────────┬───────────┬───────────────┐
//! │ flags  │ width  │ reserved  │ count (u32)   │
//! │ 1 B    │ 1 B    │ 2 B       │ 4 B LE        │
//! └────────┴────────┴───────────┴───────────────┘
//! ```
//!
//! `flags` packs the three independent bits (`inner`, `hasrefs`,
//! `context`); `width` is the element width in bytes for integer and
//! small-bytes leaves; `count` is the logical element count (for blob
//! blocks, the byte length).
//!
//! Blocks whose `hasrefs` bit is set hold 64-bit slot values in their
//! payload. A slot is decoded through [`Slot`]: zero is null, odd values
//! are tagged scalars, even values are refs. Deep destruction and deep
//! cloning recurse through ref slots only — a tagged scalar is never
//! followed, which is what makes it safe to store subtable sizes and
//! link-target indices in ref-bearing arrays.

use colonnade_arena::Arena;
use colonnade_error::{Result, StoreError};
use colonnade_types::limits::NODE_HEADER_SIZE;
use colonnade_types::{NodeFlags, Ref, Slot};
use tracing::debug;

/// Parsed node header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NodeHeader {
    pub flags: NodeFlags,
    /// Element width in bytes, where applicable (else 0).
    pub width: u8,
    /// Logical element count.
    pub count: u32,
}

impl NodeHeader {
    /// Parse the header from raw block bytes.
    pub fn parse(block: &[u8]) -> Result<Self> {
        if block.len() < NODE_HEADER_SIZE {
            return Err(StoreError::InvalidNodeHeader {
                detail: "block shorter than header",
            });
        }
        let flags = NodeFlags::from_byte(block[0]).ok_or(StoreError::InvalidNodeHeader {
            detail: "undefined flag bits",
        })?;
        let width = block[1];
        let count = u32::from_le_bytes([block[4], block[5], block[6], block[7]]);
        Ok(Self {
            flags,
            width,
            count,
        })
    }

    /// Write the header into the first 8 bytes of a block.
    pub fn write(&self, block: &mut [u8]) {
        block[0] = self.flags.to_byte();
        block[1] = self.width;
        block[2] = 0;
        block[3] = 0;
        block[4..8].copy_from_slice(&self.count.to_le_bytes());
    }

    /// A fresh block with this header and a zero-filled payload.
    pub fn new_block(&self, payload_len: usize) -> Vec<u8> {
        let mut block = vec![0u8; NODE_HEADER_SIZE + payload_len];
        self.write(&mut block);
        block
    }
}

/// Read the header of the block at `r`.
pub fn header(arena: &Arena, r: Ref) -> Result<NodeHeader> {
    NodeHeader::parse(arena.translate(r)?)
}

/// Update the stored element count of the block at `r`.
pub fn set_count(arena: &mut Arena, r: Ref, count: usize) -> Result<()> {
    let block = arena.translate_mut(r)?;
    let count = u32::try_from(count).map_err(|_| StoreError::NodePayloadMismatch {
        detail: "element count exceeds u32",
    })?;
    block[4..8].copy_from_slice(&count.to_le_bytes());
    Ok(())
}

// ---------------------------------------------------------------------------
// Slot payloads (hasrefs blocks)
// ---------------------------------------------------------------------------

/// Number of 64-bit payload slots in a hasrefs block, derived from the
/// block's byte length.
pub fn slot_count(block: &[u8]) -> usize {
    (block.len() - NODE_HEADER_SIZE) / 8
}

/// Read payload slot `i` of a hasrefs block.
pub fn slot_get(arena: &Arena, r: Ref, i: usize) -> Result<Slot> {
    let block = arena.translate(r)?;
    let off = NODE_HEADER_SIZE + i * 8;
    if off + 8 > block.len() {
        return Err(StoreError::NodePayloadMismatch {
            detail: "slot index out of payload",
        });
    }
    let raw = u64::from_le_bytes(block[off..off + 8].try_into().expect("8-byte slot"));
    Ok(Slot::from_raw(raw))
}

/// Write payload slot `i` of a hasrefs block.
pub fn slot_set(arena: &mut Arena, r: Ref, i: usize, slot: Slot) -> Result<()> {
    let block = arena.translate_mut(r)?;
    let off = NODE_HEADER_SIZE + i * 8;
    if off + 8 > block.len() {
        return Err(StoreError::NodePayloadMismatch {
            detail: "slot index out of payload",
        });
    }
    block[off..off + 8].copy_from_slice(&slot.to_raw().to_le_bytes());
    Ok(())
}

/// Insert a payload slot at `i`, growing the block. The caller maintains
/// the logical count separately when the block's count does not equal the
/// slot count.
pub fn slot_insert(arena: &mut Arena, r: Ref, i: usize, slot: Slot) -> Result<()> {
    let block = arena.translate_mut(r)?;
    let off = NODE_HEADER_SIZE + i * 8;
    if off > block.len() {
        return Err(StoreError::NodePayloadMismatch {
            detail: "slot insert out of payload",
        });
    }
    let bytes = slot.to_raw().to_le_bytes();
    block.splice(off..off, bytes);
    Ok(())
}

/// Remove the payload slot at `i`, shrinking the block.
pub fn slot_remove(arena: &mut Arena, r: Ref, i: usize) -> Result<()> {
    let block = arena.translate_mut(r)?;
    let off = NODE_HEADER_SIZE + i * 8;
    if off + 8 > block.len() {
        return Err(StoreError::NodePayloadMismatch {
            detail: "slot remove out of payload",
        });
    }
    block.drain(off..off + 8);
    Ok(())
}

/// Create a hasrefs block holding the given slots, with `count` as the
/// logical element count.
pub fn slots_create(arena: &mut Arena, flags: NodeFlags, count: usize, slots: &[Slot]) -> Result<Ref> {
    let header = NodeHeader {
        flags,
        width: 8,
        count: u32::try_from(count).map_err(|_| StoreError::NodePayloadMismatch {
            detail: "element count exceeds u32",
        })?,
    };
    let mut block = header.new_block(slots.len() * 8);
    for (i, slot) in slots.iter().enumerate() {
        let off = NODE_HEADER_SIZE + i * 8;
        block[off..off + 8].copy_from_slice(&slot.to_raw().to_le_bytes());
    }
    arena.alloc(block)
}

// ---------------------------------------------------------------------------
// Blob blocks
// ---------------------------------------------------------------------------

/// Allocate a raw blob block with the given bytes.
pub fn blob_create(arena: &mut Arena, data: &[u8]) -> Result<Ref> {
    let header = NodeHeader {
        flags: NodeFlags::default(),
        width: 1,
        count: u32::try_from(data.len()).map_err(|_| StoreError::NodePayloadMismatch {
            detail: "blob exceeds u32 length",
        })?,
    };
    let mut block = header.new_block(data.len());
    block[NODE_HEADER_SIZE..].copy_from_slice(data);
    arena.alloc(block)
}

/// Read the bytes of a blob block.
pub fn blob_bytes(arena: &Arena, r: Ref) -> Result<&[u8]> {
    let block = arena.translate(r)?;
    let header = NodeHeader::parse(block)?;
    let len = header.count as usize;
    if NODE_HEADER_SIZE + len > block.len() {
        return Err(StoreError::NodePayloadMismatch {
            detail: "blob shorter than its count",
        });
    }
    Ok(&block[NODE_HEADER_SIZE..NODE_HEADER_SIZE + len])
}

// ---------------------------------------------------------------------------
// Deep destroy / deep clone
// ---------------------------------------------------------------------------

/// Recursively free the subtree rooted at `r`.
///
/// For ref-bearing blocks, every even non-zero payload slot is followed;
/// null and tagged slots are skipped, so a tagged scalar is never freed as
/// if it were an address.
pub fn destroy_deep(arena: &mut Arena, r: Ref) {
    let Ok(block) = arena.translate(r) else {
        return;
    };
    let Ok(header) = NodeHeader::parse(block) else {
        arena.free(r);
        return;
    };
    if header.flags.hasrefs {
        let n = slot_count(block);
        let mut children = Vec::with_capacity(n);
        for i in 0..n {
            let off = NODE_HEADER_SIZE + i * 8;
            let raw = u64::from_le_bytes(
                block[off..off + 8].try_into().expect("8-byte slot"),
            );
            if let Slot::Ref(child) = Slot::from_raw(raw) {
                children.push(child);
            }
        }
        for child in children {
            destroy_deep(arena, child);
        }
    }
    arena.free(r);
}

/// Recursively copy the subtree rooted at `r`, returning the new root ref.
///
/// Tagged and null slots are copied verbatim; ref slots are rewritten to
/// point at the cloned children.
pub fn clone_deep(arena: &mut Arena, r: Ref) -> Result<Ref> {
    let block = arena.translate(r)?.to_vec();
    let header = NodeHeader::parse(&block)?;
    let mut copy = block;
    if header.flags.hasrefs {
        let n = slot_count(&copy);
        for i in 0..n {
            let off = NODE_HEADER_SIZE + i * 8;
            let raw = u64::from_le_bytes(copy[off..off + 8].try_into().expect("8-byte slot"));
            if let Slot::Ref(child) = Slot::from_raw(raw) {
                let cloned = clone_deep(arena, child)?;
                copy[off..off + 8].copy_from_slice(&cloned.get().to_le_bytes());
            }
        }
    }
    let new_ref = arena.alloc(copy)?;
    debug!(from = r.get(), to = new_ref.get(), "clone subtree");
    Ok(new_ref)
}

/// Element count of the tree rooted at `r`: the header count for a leaf,
/// the tagged total footer for an inner node.
pub fn size_from_ref(arena: &Arena, r: Ref) -> Result<usize> {
    let block = arena.translate(r)?;
    let header = NodeHeader::parse(block)?;
    if !header.flags.inner {
        return Ok(header.count as usize);
    }
    let n = slot_count(block);
    if n == 0 {
        return Err(StoreError::NodePayloadMismatch {
            detail: "inner node without footer",
        });
    }
    let off = NODE_HEADER_SIZE + (n - 1) * 8;
    let raw = u64::from_le_bytes(block[off..off + 8].try_into().expect("8-byte slot"));
    match Slot::from_raw(raw) {
        Slot::Tagged(total) => Ok(total as usize),
        _ => Err(StoreError::NodePayloadMismatch {
            detail: "inner node footer is not tagged",
        }),
    }
}
