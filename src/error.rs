//! Invariant-violation and configuration errors.
//!
//! A plain `enum` with a manual `Display` impl rather than a derived error
//! type. Benign, expected conditions (stale tier-1 packets, already-acked
//! sequences) are reported through [`crate::status::StatusCode`], not through
//! this type; `EngineError` is reserved for conditions that indicate a
//! protocol or caller mistake.

use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineError {
    /// `BitmapSize` configured outside `1..=256`.
    BitmapSizeOutOfRange(usize),
    /// A bit the protocol claims to be flipping was already set.
    BitAlreadySet { seq: u64, table_index: Option<i64> },
    /// An adamap with `reprLength > B` was about to be admitted to the lookup
    /// table, which only ever holds range-free entries.
    ReprLengthExceedsBitmap { repr_length: u64, bitmap_size: usize },
}

impl fmt::Display for EngineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::BitmapSizeOutOfRange(b) => {
                write!(f, "bitmap size {b} out of range (must satisfy 1 <= B <= 256)")
            }
            Self::BitAlreadySet { seq, table_index } => write!(
                f,
                "bit for seq {seq} already set (table_index={table_index:?})"
            ),
            Self::ReprLengthExceedsBitmap {
                repr_length,
                bitmap_size,
            } => write!(
                f,
                "reprLength {repr_length} exceeds bitmap size {bitmap_size}; \
                 lookup-table entries may not carry range extension"
            ),
        }
    }
}

impl std::error::Error for EngineError {}
