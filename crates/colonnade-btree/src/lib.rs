//! Node substrate and generic B+-tree protocol.
//!
//! Every column is a B+-tree over arena blocks. This crate owns the block
//! formats (node header, integer leaf, the three bytes-leaf encodings, the
//! inner node) and the kind-agnostic tree protocol: indexed descent,
//! insert/append with split propagation, erase with collapse, and in-place
//! element update (which is how leaf promotion re-parents a leaf).
//!
//! Columns live one crate up; they own their root ref and drive the
//! protocol through the handler hooks defined here.

pub mod bptree;
pub mod leaf_bytes;
pub mod leaf_int;
pub mod node;

pub use bptree::{EraseHandler, TreeInsertState};
