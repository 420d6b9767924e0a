//! Ref-addressed block arena.
//!
//! The column store addresses storage through opaque [`Ref`]s handed out by
//! an arena. This crate provides the in-memory arena the core is built and
//! tested against: a map from ref to an owned byte block, with stable refs,
//! explicit free, and a configurable allocation limit for fault-injection
//! tests.
//!
//! The arena knows nothing about node formats. Deep (recursive) destruction
//! and cloning live in the tree layer, which understands which payload
//! slots are refs.
//!
//! There is intentionally no process-wide default arena: every function
//! that needs one receives it explicitly.

use std::collections::HashMap;

use colonnade_error::{Result, StoreError};
use colonnade_types::Ref;
use tracing::trace;

/// Spacing between consecutive ref values. Keeps every ref 8-byte aligned
/// so the low bit is free for the tagged-scalar convention.
const REF_STRIDE: u64 = 8;

/// In-memory block arena.
#[derive(Debug, Default)]
pub struct Arena {
    blocks: HashMap<u64, Vec<u8>>,
    next_ref: u64,
    /// When set, allocation fails once this many blocks are live.
    alloc_limit: Option<usize>,
    /// Bumped by [`Arena::bump_version`]; lets accessors detect that an
    /// external commit may have replaced parts of the ref graph.
    version: u64,
}

impl Arena {
    /// Create an empty arena.
    pub fn new() -> Self {
        Self {
            blocks: HashMap::new(),
            next_ref: REF_STRIDE,
            alloc_limit: None,
            version: 0,
        }
    }

    /// Number of live blocks.
    pub fn block_count(&self) -> usize {
        self.blocks.len()
    }

    /// Total bytes held across live blocks.
    pub fn total_bytes(&self) -> usize {
        self.blocks.values().map(Vec::len).sum()
    }

    /// Limit the number of live blocks; further allocations fail with an
    /// [`StoreError::AllocationFailed`]. Used by fault-injection tests.
    pub fn set_alloc_limit(&mut self, limit: Option<usize>) {
        self.alloc_limit = limit;
    }

    /// Current arena version (see [`Arena::bump_version`]).
    pub fn version(&self) -> u64 {
        self.version
    }

    /// Record that an external commit may have rewritten the ref graph.
    /// Accessors compare this against their cached version during refresh.
    pub fn bump_version(&mut self) {
        self.version += 1;
    }

    /// Allocate a block with the given contents and return its ref.
    pub fn alloc(&mut self, data: Vec<u8>) -> Result<Ref> {
        if let Some(limit) = self.alloc_limit {
            if self.blocks.len() >= limit {
                return Err(StoreError::AllocationFailed {
                    blocks: self.blocks.len(),
                });
            }
        }
        let raw = self.next_ref;
        self.next_ref += REF_STRIDE;
        let r = Ref::new(raw).expect("arena refs are non-zero and even");
        trace!(block = raw, len = data.len(), "alloc block");
        self.blocks.insert(raw, data);
        Ok(r)
    }

    /// Resolve a ref to its block contents.
    pub fn translate(&self, r: Ref) -> Result<&[u8]> {
        self.blocks
            .get(&r.get())
            .map(Vec::as_slice)
            .ok_or(StoreError::DanglingRef { raw: r.get() })
    }

    /// Resolve a ref to its mutable block contents.
    pub fn translate_mut(&mut self, r: Ref) -> Result<&mut Vec<u8>> {
        self.blocks
            .get_mut(&r.get())
            .ok_or(StoreError::DanglingRef { raw: r.get() })
    }

    /// Replace a block's contents in place, keeping its ref stable.
    pub fn replace(&mut self, r: Ref, data: Vec<u8>) -> Result<()> {
        let slot = self
            .blocks
            .get_mut(&r.get())
            .ok_or(StoreError::DanglingRef { raw: r.get() })?;
        *slot = data;
        Ok(())
    }

    /// Free a single block. Does not follow refs in its payload.
    pub fn free(&mut self, r: Ref) {
        trace!(block = r.get(), "free block");
        self.blocks.remove(&r.get());
    }

    /// Whether the ref currently resolves to a live block.
    pub fn is_live(&self, r: Ref) -> bool {
        self.blocks.contains_key(&r.get())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn alloc_translate_round_trip() {
        let mut arena = Arena::new();
        let r = arena.alloc(vec![1, 2, 3]).unwrap();
        assert_eq!(arena.translate(r).unwrap(), &[1, 2, 3]);
        assert_eq!(arena.block_count(), 1);
        assert_eq!(arena.total_bytes(), 3);
    }

    #[test]
    fn refs_are_even_and_distinct() {
        let mut arena = Arena::new();
        let a = arena.alloc(vec![]).unwrap();
        let b = arena.alloc(vec![]).unwrap();
        assert_ne!(a, b);
        assert_eq!(a.get() % 8, 0);
        assert_eq!(b.get() % 8, 0);
    }

    #[test]
    fn free_makes_ref_dangle() {
        let mut arena = Arena::new();
        let r = arena.alloc(vec![0]).unwrap();
        arena.free(r);
        assert!(!arena.is_live(r));
        let err = arena.translate(r).unwrap_err();
        assert!(matches!(err, StoreError::DanglingRef { .. }));
    }

    #[test]
    fn refs_are_stable_after_replace() {
        let mut arena = Arena::new();
        let r = arena.alloc(vec![1]).unwrap();
        arena.replace(r, vec![9, 9]).unwrap();
        assert_eq!(arena.translate(r).unwrap(), &[9, 9]);
    }

    #[test]
    fn alloc_limit_fails_allocation() {
        let mut arena = Arena::new();
        arena.set_alloc_limit(Some(2));
        let first = arena.alloc(vec![]).unwrap();
        arena.alloc(vec![]).unwrap();
        let err = arena.alloc(vec![]).unwrap_err();
        assert!(matches!(err, StoreError::AllocationFailed { blocks: 2 }));

        // Freeing makes room again.
        arena.free(first);
        arena.alloc(vec![]).unwrap();
    }

    #[test]
    fn version_bumps() {
        let mut arena = Arena::new();
        assert_eq!(arena.version(), 0);
        arena.bump_version();
        arena.bump_version();
        assert_eq!(arena.version(), 2);
    }
}
