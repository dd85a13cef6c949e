//! Dimensionality of the forest: quadtrees (2D) or octrees (3D).

/// Selects whether the forest tiles a unit square or a unit cube.
///
/// The core data structures always carry an `x, y, z` triple; in [`Dim::Two`]
/// mode `z` is held at `0` and ignored by every primitive that branches on
/// dimension (child/face/edge/corner counts, insulation extent, etc).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Dim {
    Two,
    Three,
}

impl Dim {
    /// Number of children of any non-leaf quadrant (`2^D`).
    pub fn num_children(self) -> u8 {
        match self {
            Dim::Two => 4,
            Dim::Three => 8,
        }
    }

    /// Number of faces of the root (and of every quadrant).
    pub fn num_faces(self) -> u8 {
        match self {
            Dim::Two => 4,
            Dim::Three => 6,
        }
    }

    /// Number of edges; only meaningful in 3D.
    pub fn num_edges(self) -> u8 {
        match self {
            Dim::Two => 0,
            Dim::Three => 12,
        }
    }

    /// Number of corners of the root (and of every quadrant).
    pub fn num_corners(self) -> u8 {
        match self {
            Dim::Two => 4,
            Dim::Three => 8,
        }
    }

    /// Axes actually in use: 2 in 2D, 3 in 3D.
    pub fn num_axes(self) -> usize {
        match self {
            Dim::Two => 2,
            Dim::Three => 3,
        }
    }
}
