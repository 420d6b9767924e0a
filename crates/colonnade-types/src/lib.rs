//! Shared value types and layout constants for the colonnade column store.
//!
//! The central conventions live here:
//!
//! - [`Ref`]: an 8-byte-aligned, non-zero block address into the arena.
//! - [`Slot`]: the decoded form of a raw 64-bit slot value. A slot can hold
//!   a ref, a tagged scalar (low bit set), or null (zero). All readers must
//!   go through [`Slot::from_raw`] rather than ad-hoc bit masking.
//! - [`NodeFlags`] / [`NodeType`]: the three independent node-header bits.
//! - [`LeafKind`]: the per-column leaf discriminator derived from those bits.

use std::fmt;
use std::num::NonZeroU64;

pub mod limits {
    //! Layout limit constants.

    /// Maximum byte length storable in a small (fixed-stride) bytes leaf.
    pub const SMALL_VALUE_MAX: usize = 15;

    /// Maximum byte length storable in a medium bytes leaf.
    pub const MEDIUM_VALUE_MAX: usize = 63;

    /// Maximum number of elements in any B+-tree node (leaf or inner).
    pub const MAX_NODE_SIZE: usize = 1000;

    /// Size of the node header in bytes.
    pub const NODE_HEADER_SIZE: usize = 8;

    /// Maximum byte length of a column name (stored in a medium bytes leaf).
    pub const COLUMN_NAME_MAX: usize = MEDIUM_VALUE_MAX;
}

// ---------------------------------------------------------------------------
// Ref
// ---------------------------------------------------------------------------

/// A block address into the arena.
///
/// Refs are non-zero and even; the arena hands them out 8-byte aligned.
/// The low bit of a valid ref is never set, which is what makes the
/// tagged-scalar convention sound: an odd slot value can never be mistaken
/// for a ref.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(transparent)]
pub struct Ref(NonZeroU64);

impl Ref {
    /// Create a ref from a raw address.
    ///
    /// Returns `None` if `raw` is zero or has its low (tag) bit set.
    #[inline]
    pub const fn new(raw: u64) -> Option<Self> {
        if raw & 1 != 0 {
            return None;
        }
        match NonZeroU64::new(raw) {
            Some(v) => Some(Self(v)),
            None => None,
        }
    }

    /// Get the raw address.
    #[inline]
    pub const fn get(self) -> u64 {
        self.0.get()
    }

    /// The raw slot encoding of this ref (identical to the address).
    #[inline]
    pub const fn to_slot(self) -> u64 {
        self.0.get()
    }
}

impl fmt::Display for Ref {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#x}", self.0)
    }
}

// ---------------------------------------------------------------------------
// Slot
// ---------------------------------------------------------------------------

/// Decoded form of a raw 64-bit slot value.
///
/// Where a slot can hold either a ref or a scalar (subtable roots, link
/// target-table indices), a set low bit denotes a tagged scalar; zero
/// denotes null/unset; any other even value is a ref.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Slot {
    /// Empty / unset (raw zero).
    Null,
    /// A block ref.
    Ref(Ref),
    /// A tagged scalar (the stored value, untagged).
    Tagged(u64),
}

impl Slot {
    /// Decode a raw slot value.
    #[inline]
    pub const fn from_raw(raw: u64) -> Self {
        if raw == 0 {
            Self::Null
        } else if raw & 1 == 1 {
            Self::Tagged(raw >> 1)
        } else {
            // Even and non-zero: a ref. A dangling value is caught on
            // translate, not here.
            match Ref::new(raw) {
                Some(r) => Self::Ref(r),
                None => Self::Null,
            }
        }
    }

    /// Encode back to the raw slot value.
    #[inline]
    pub const fn to_raw(self) -> u64 {
        match self {
            Self::Null => 0,
            Self::Ref(r) => r.get(),
            Self::Tagged(v) => (v << 1) | 1,
        }
    }

    /// Encode a tagged scalar.
    #[inline]
    pub const fn tag(value: u64) -> Self {
        Self::Tagged(value)
    }

    /// The ref, if this slot holds one.
    #[inline]
    pub const fn as_ref_value(self) -> Option<Ref> {
        match self {
            Self::Ref(r) => Some(r),
            _ => None,
        }
    }
}

// ---------------------------------------------------------------------------
// Node header bits
// ---------------------------------------------------------------------------

/// The three independent node-header bits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct NodeFlags {
    /// Inner B+-tree node (vs leaf).
    pub inner: bool,
    /// Payload is a vector of refs, not scalars.
    pub hasrefs: bool,
    /// Leaf-kind discriminator within hasrefs leaves.
    pub context: bool,
}

impl NodeFlags {
    const BIT_INNER: u8 = 0b001;
    const BIT_HASREFS: u8 = 0b010;
    const BIT_CONTEXT: u8 = 0b100;

    /// Decode from the header flag byte. Returns `None` for undefined bit
    /// combinations (an inner node always carries refs).
    #[inline]
    pub const fn from_byte(b: u8) -> Option<Self> {
        if b & !(Self::BIT_INNER | Self::BIT_HASREFS | Self::BIT_CONTEXT) != 0 {
            return None;
        }
        let flags = Self {
            inner: b & Self::BIT_INNER != 0,
            hasrefs: b & Self::BIT_HASREFS != 0,
            context: b & Self::BIT_CONTEXT != 0,
        };
        if flags.inner && !flags.hasrefs {
            return None;
        }
        Some(flags)
    }

    /// Encode to the header flag byte.
    #[inline]
    pub const fn to_byte(self) -> u8 {
        (self.inner as u8) * Self::BIT_INNER
            | (self.hasrefs as u8) * Self::BIT_HASREFS
            | (self.context as u8) * Self::BIT_CONTEXT
    }

    /// The coarse node type implied by the bits.
    #[inline]
    pub const fn node_type(self) -> NodeType {
        if self.inner {
            NodeType::InnerBptree
        } else if self.hasrefs {
            NodeType::HasRefs
        } else {
            NodeType::Normal
        }
    }
}

/// Coarse node typing derived from the header bits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NodeType {
    /// Scalar payload leaf.
    Normal,
    /// Ref-vector payload leaf.
    HasRefs,
    /// Inner B+-tree node.
    InnerBptree,
}

// ---------------------------------------------------------------------------
// Leaf kind
// ---------------------------------------------------------------------------

/// The leaf-kind discriminator for a bytes/string column root, derived from
/// `(inner, hasrefs, context)`:
///
/// ```text
///   N R C
///   1 1 -   inner B+-tree node (not a leaf)
///   0 0 -   small: fixed-stride slab, values <= 15 bytes
///   0 1 0   medium: compound leaf, values <= 63 bytes
///   0 1 1   big: one child blob ref per slot, unbounded
/// ```
///
/// A leaf may only be upgraded (small -> medium -> big, small -> big,
/// medium -> big); it is never downgraded in place except by a full clear.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum LeafKind {
    /// Fixed-stride slab leaf.
    Small,
    /// Compound leaf with offsets/blob children.
    Medium,
    /// One blob ref per slot.
    Big,
}

impl LeafKind {
    /// The minimum leaf kind able to store a value of `len` bytes.
    #[inline]
    pub const fn required_for(len: usize) -> Self {
        if len <= limits::SMALL_VALUE_MAX {
            Self::Small
        } else if len <= limits::MEDIUM_VALUE_MAX {
            Self::Medium
        } else {
            Self::Big
        }
    }

    /// Decode from node flags. Returns `None` for inner nodes.
    #[inline]
    pub const fn from_flags(flags: NodeFlags) -> Option<Self> {
        if flags.inner {
            return None;
        }
        Some(match (flags.hasrefs, flags.context) {
            (false, _) => Self::Small,
            (true, false) => Self::Medium,
            (true, true) => Self::Big,
        })
    }

    /// The node flags a leaf of this kind carries.
    #[inline]
    pub const fn flags(self) -> NodeFlags {
        match self {
            Self::Small => NodeFlags {
                inner: false,
                hasrefs: false,
                context: false,
            },
            Self::Medium => NodeFlags {
                inner: false,
                hasrefs: true,
                context: false,
            },
            Self::Big => NodeFlags {
                inner: false,
                hasrefs: true,
                context: true,
            },
        }
    }
}

// ---------------------------------------------------------------------------
// Column types and attributes
// ---------------------------------------------------------------------------

/// Column type as recorded in the spec's `types` array.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum ColumnType {
    /// 64-bit integer.
    Int = 0,
    /// Boolean (stored as integer).
    Bool = 1,
    /// UTF-8 string with size-adaptive leaves.
    String = 2,
    /// Dictionary-encoded string (integer key indices + key dictionary).
    /// Internal optimization; publicly reported as `String`.
    StringEnum = 3,
    /// Raw binary with size-adaptive leaves.
    Binary = 4,
    /// Subtable: each slot is a child-table columns-block ref.
    Table = 5,
    /// Single link to a row of a target table.
    Link = 6,
    /// List of links to rows of a target table.
    LinkList = 7,
    /// Backlink bookkeeping column (unnamed, not public).
    BackLink = 8,
}

impl ColumnType {
    /// Decode from the stored integer value.
    pub const fn from_raw(raw: i64) -> Option<Self> {
        match raw {
            0 => Some(Self::Int),
            1 => Some(Self::Bool),
            2 => Some(Self::String),
            3 => Some(Self::StringEnum),
            4 => Some(Self::Binary),
            5 => Some(Self::Table),
            6 => Some(Self::Link),
            7 => Some(Self::LinkList),
            8 => Some(Self::BackLink),
            _ => None,
        }
    }

    /// Whether this type contributes entries to the spec's sparse subspec
    /// array (1 for table/link/list-link, 2 for backlink, 0 otherwise).
    pub const fn subspec_entries(self) -> usize {
        match self {
            Self::Table | Self::Link | Self::LinkList => 1,
            Self::BackLink => 2,
            _ => 0,
        }
    }

    /// Whether this is one of the link family types.
    pub const fn is_link_type(self) -> bool {
        matches!(self, Self::Link | Self::LinkList)
    }

    /// The publicly visible type: the enum-string encoding is hidden.
    pub const fn public_type(self) -> Self {
        match self {
            Self::StringEnum => Self::String,
            other => other,
        }
    }
}

bitflags::bitflags! {
    /// Column attribute flags as recorded in the spec's `attrs` array.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct ColumnAttr: u8 {
        /// The column carries a search index in the slot after its root.
        const INDEXED = 0b0001;
        /// The search index rejects duplicate values.
        const UNIQUE = 0b0010;
        /// Null is representable, distinct from zero/empty.
        const NULLABLE = 0b0100;
        /// Link column with cascading (strong) semantics.
        const STRONG_LINKS = 0b1000;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ref_rejects_zero_and_tagged() {
        assert!(Ref::new(0).is_none());
        assert!(Ref::new(1).is_none());
        assert!(Ref::new(9).is_none());
        assert!(Ref::new(8).is_some());
        assert_eq!(Ref::new(64).unwrap().get(), 64);
    }

    #[test]
    fn slot_round_trip() {
        assert_eq!(Slot::from_raw(0), Slot::Null);
        assert_eq!(Slot::from_raw(0).to_raw(), 0);

        let r = Ref::new(0x40).unwrap();
        assert_eq!(Slot::from_raw(0x40), Slot::Ref(r));
        assert_eq!(Slot::Ref(r).to_raw(), 0x40);

        // Odd values are tagged scalars, never refs.
        assert_eq!(Slot::from_raw(7), Slot::Tagged(3));
        assert_eq!(Slot::Tagged(3).to_raw(), 7);
        assert_eq!(Slot::Tagged(0).to_raw(), 1);
    }

    #[test]
    fn node_flags_round_trip() {
        for inner in [false, true] {
            for hasrefs in [false, true] {
                for context in [false, true] {
                    let f = NodeFlags {
                        inner,
                        hasrefs,
                        context,
                    };
                    let decoded = NodeFlags::from_byte(f.to_byte());
                    if inner && !hasrefs {
                        assert!(decoded.is_none());
                    } else {
                        assert_eq!(decoded, Some(f));
                    }
                }
            }
        }
        assert!(NodeFlags::from_byte(0b1000).is_none());
    }

    #[test]
    fn node_type_from_flags() {
        let leaf = NodeFlags::default();
        assert_eq!(leaf.node_type(), NodeType::Normal);

        let refs = NodeFlags {
            hasrefs: true,
            ..NodeFlags::default()
        };
        assert_eq!(refs.node_type(), NodeType::HasRefs);

        let inner = NodeFlags {
            inner: true,
            hasrefs: true,
            context: false,
        };
        assert_eq!(inner.node_type(), NodeType::InnerBptree);
    }

    #[test]
    fn leaf_kind_thresholds() {
        assert_eq!(LeafKind::required_for(0), LeafKind::Small);
        assert_eq!(LeafKind::required_for(15), LeafKind::Small);
        assert_eq!(LeafKind::required_for(16), LeafKind::Medium);
        assert_eq!(LeafKind::required_for(63), LeafKind::Medium);
        assert_eq!(LeafKind::required_for(64), LeafKind::Big);
    }

    #[test]
    fn leaf_kind_ordering_matches_promotion() {
        assert!(LeafKind::Small < LeafKind::Medium);
        assert!(LeafKind::Medium < LeafKind::Big);
    }

    #[test]
    fn leaf_kind_flag_round_trip() {
        for kind in [LeafKind::Small, LeafKind::Medium, LeafKind::Big] {
            assert_eq!(LeafKind::from_flags(kind.flags()), Some(kind));
        }
        let inner = NodeFlags {
            inner: true,
            hasrefs: true,
            context: false,
        };
        assert_eq!(LeafKind::from_flags(inner), None);
    }

    #[test]
    fn column_type_round_trip() {
        for raw in 0..=8 {
            let ty = ColumnType::from_raw(raw).unwrap();
            assert_eq!(ty as i64, raw);
        }
        assert!(ColumnType::from_raw(9).is_none());
        assert!(ColumnType::from_raw(-1).is_none());
    }

    #[test]
    fn subspec_entry_counts() {
        assert_eq!(ColumnType::Table.subspec_entries(), 1);
        assert_eq!(ColumnType::Link.subspec_entries(), 1);
        assert_eq!(ColumnType::LinkList.subspec_entries(), 1);
        assert_eq!(ColumnType::BackLink.subspec_entries(), 2);
        assert_eq!(ColumnType::Int.subspec_entries(), 0);
        assert_eq!(ColumnType::String.subspec_entries(), 0);
    }

    #[test]
    fn public_type_hides_enum_encoding() {
        assert_eq!(ColumnType::StringEnum.public_type(), ColumnType::String);
        assert_eq!(ColumnType::Int.public_type(), ColumnType::Int);
    }
}
