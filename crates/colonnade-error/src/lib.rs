use thiserror::Error;

/// Primary error type for colonnade column-store operations.
///
/// Structured variants for the failure modes the storage core can hit,
/// classified into four kinds (see [`ErrorKind`]): caller mistakes,
/// allocation failures, structural corruption, and index constraint
/// violations.
#[derive(Error, Debug)]
pub enum StoreError {
    // === Logic errors (caller mistakes) ===
    /// Row index is out of bounds for the column.
    #[error("row index out of bounds: {row} (size {size})")]
    RowOutOfBounds { row: usize, size: usize },

    /// A string write was attempted on a column that is not string valued.
    #[error("column is not string valued")]
    NotStringColumn,

    /// A null write was attempted on a column that is not nullable.
    #[error("column is not nullable")]
    NotNullable,

    /// Row indices passed to a range operation were not monotonic.
    #[error("row indices not monotonic: {first} then {second}")]
    NonMonotonicRows { first: usize, second: usize },

    /// A column name exceeded the storable length.
    #[error("column name too long: {len} bytes (max {max})")]
    NameTooLong { len: usize, max: usize },

    /// A value cannot be represented in the target column.
    #[error("value not representable: {detail}")]
    ValueNotRepresentable { detail: &'static str },

    /// Use of an accessor that has been detached from its table.
    #[error("accessor is detached")]
    DetachedAccessor,

    // === Allocation errors ===
    /// The arena refused to allocate a new block.
    #[error("arena allocation failed: {blocks} blocks in use")]
    AllocationFailed { blocks: usize },

    // === Corruption (structural verification) ===
    /// A block ref did not resolve to an allocated block.
    #[error("dangling ref: {raw:#x}")]
    DanglingRef { raw: u64 },

    /// A node header did not decode to a valid node.
    #[error("invalid node header: {detail}")]
    InvalidNodeHeader { detail: &'static str },

    /// A node's payload did not match its header.
    #[error("node payload mismatch: {detail}")]
    NodePayloadMismatch { detail: &'static str },

    /// Structural verification failed.
    #[error("structure verification failed: {detail}")]
    VerifyFailed { detail: String },

    // === Constraint errors ===
    /// The search index rejected a duplicate value.
    #[error("unique constraint violation at row {row}")]
    UniqueViolation { row: usize },
}

/// Coarse classification of a [`StoreError`], mirroring the error-handling
/// contract of the storage core: only `Constraint` failures are recovered
/// locally (the index is modified before the column precisely so a
/// constraint failure aborts before any data mutation).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// The caller violated an API precondition.
    Logic,
    /// The arena could not satisfy an allocation.
    Allocation,
    /// The on-arena structure is malformed.
    Corruption,
    /// A search-index uniqueness constraint was violated.
    Constraint,
}

impl StoreError {
    /// Classify this error.
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::RowOutOfBounds { .. }
            | Self::NotStringColumn
            | Self::NotNullable
            | Self::NonMonotonicRows { .. }
            | Self::NameTooLong { .. }
            | Self::ValueNotRepresentable { .. }
            | Self::DetachedAccessor => ErrorKind::Logic,
            Self::AllocationFailed { .. } => ErrorKind::Allocation,
            Self::DanglingRef { .. }
            | Self::InvalidNodeHeader { .. }
            | Self::NodePayloadMismatch { .. }
            | Self::VerifyFailed { .. } => ErrorKind::Corruption,
            Self::UniqueViolation { .. } => ErrorKind::Constraint,
        }
    }

    /// Whether the operation that produced this error may have left a
    /// partial mutation behind. Constraint failures are checked before any
    /// mutation; logic errors are checked at entry.
    pub const fn is_pre_mutation(&self) -> bool {
        matches!(self.kind(), ErrorKind::Logic | ErrorKind::Constraint)
    }

    /// Create a verification failure.
    pub fn verify(detail: impl Into<String>) -> Self {
        Self::VerifyFailed {
            detail: detail.into(),
        }
    }
}

/// Result type alias using [`StoreError`].
pub type Result<T> = std::result::Result<T, StoreError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display() {
        let err = StoreError::RowOutOfBounds { row: 7, size: 3 };
        assert_eq!(err.to_string(), "row index out of bounds: 7 (size 3)");

        let err = StoreError::UniqueViolation { row: 2 };
        assert_eq!(err.to_string(), "unique constraint violation at row 2");
    }

    #[test]
    fn error_kind_mapping() {
        assert_eq!(StoreError::NotStringColumn.kind(), ErrorKind::Logic);
        assert_eq!(StoreError::NotNullable.kind(), ErrorKind::Logic);
        assert_eq!(
            StoreError::AllocationFailed { blocks: 10 }.kind(),
            ErrorKind::Allocation
        );
        assert_eq!(
            StoreError::DanglingRef { raw: 0x40 }.kind(),
            ErrorKind::Corruption
        );
        assert_eq!(
            StoreError::UniqueViolation { row: 0 }.kind(),
            ErrorKind::Constraint
        );
    }

    #[test]
    fn pre_mutation_classification() {
        assert!(StoreError::NotNullable.is_pre_mutation());
        assert!(StoreError::UniqueViolation { row: 0 }.is_pre_mutation());
        assert!(!StoreError::AllocationFailed { blocks: 1 }.is_pre_mutation());
        assert!(!StoreError::verify("bad").is_pre_mutation());
    }
}
