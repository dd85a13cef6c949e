//! Error taxonomy for library-boundary failures.
//!
//! Internal routines that can never observe bad input given the invariants
//! this crate already maintains keep using `debug_assert!`; only failures a
//! caller can actually trigger from the outside go through [`ForestError`].

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ForestError {
    #[error("input quadrants are not sorted")]
    UnsortedInput,

    #[error("level {level} exceeds max_level {max_level}")]
    InvalidLevel { level: u8, max_level: u8 },

    #[error("payload size mismatch: expected {expected} bytes, found {found}")]
    PayloadSizeMismatch { expected: usize, found: usize },

    #[error("new partition counts sum to {found}, expected {expected}")]
    PartitionCountMismatch { expected: u64, found: u64 },

    #[error("transport failure: {0}")]
    Transport(String),

    #[error("operation requires a non-empty tree")]
    EmptyTreeViolation,

    #[error("tree index {0} is out of range")]
    TreeIndexOutOfRange(usize),
}

pub type Result<T> = std::result::Result<T, ForestError>;
