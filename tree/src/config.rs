//! Ambient runtime configuration, threaded explicitly through engine entry
//! points rather than kept as global state (see `DESIGN.md`, "Global state").

use crate::dim::Dim;

/// Deepest level representable by a [`crate::morton::Quadrant`]'s coordinates.
///
/// Mirrors the teacher binary's environment-driven `DEPTH` knob, but as a
/// crate-wide constant: coordinates are packed into `i64`s, and 29 bits per
/// axis leaves ample headroom below the sign bit for the extended range
/// `[-ROOT_LEN, 2*ROOT_LEN)` used during balance.
pub const MAX_LEVEL: u8 = 29;

/// `ROOT_LEN = 1 << MAX_LEVEL`, the width of the root quadrant.
pub fn root_len() -> i64 {
    1i64 << MAX_LEVEL
}

/// `LEN(level) = ROOT_LEN >> level`, the width of a quadrant at `level`.
pub fn len_at_level(level: u8) -> i64 {
    debug_assert!(level <= MAX_LEVEL, "level {level} exceeds MAX_LEVEL");
    1i64 << (MAX_LEVEL - level)
}

/// Process-local configuration shared by every engine call.
#[derive(Clone, Debug, PartialEq)]
pub struct ForestConfig {
    pub dim: Dim,
    pub max_level: u8,
    pub rank: i32,
    pub nprocs: i32,
    /// Size in bytes of each leaf's opaque user payload.
    pub data_size: usize,
}

impl ForestConfig {
    pub fn new(dim: Dim, rank: i32, nprocs: i32, data_size: usize) -> Self {
        ForestConfig {
            dim,
            max_level: MAX_LEVEL,
            rank,
            nprocs,
            data_size,
        }
    }

    /// A single-process configuration, convenient for engine unit tests that
    /// never touch the [`crate::comm::Communicator`] abstraction.
    pub fn single_rank(dim: Dim, data_size: usize) -> Self {
        ForestConfig::new(dim, 0, 1, data_size)
    }
}
