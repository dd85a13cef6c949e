//! Topology glueing the per-tree coordinate systems of a forest together.
//!
//! Each tree owns its own `[0, ROOT_LEN)^D` coordinate box; `Connectivity`
//! records, for every tree face/edge/corner, which neighboring tree (if any)
//! touches it and how that neighbor's coordinate frame is oriented relative
//! to ours. The overlap and border-balance engines use these tables to carry
//! an out-of-root candidate quadrant across a tree boundary into the
//! neighbor's frame.

use crate::dim::Dim;
use crate::morton::{corner_high, edge_decompose, edge_fixed_high, Quadrant};
use crate::config::root_len;

pub type TreeId = usize;

/// How a quadrant crossing a tree face lands in the neighbor's frame.
///
/// `swap` exchanges the two in-face axes (3D only, meaningless in 2D where
/// there is a single in-face axis); `flip` independently mirrors each
/// in-face axis about the face's center.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FaceTransform {
    pub neighbor_tree: TreeId,
    pub neighbor_face: u8,
    pub swap: bool,
    pub flip: [bool; 2],
}

/// How a quadrant crossing a 3D edge lands in the neighbor's frame.
/// `reversed` mirrors the free-axis coordinate along the edge.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct EdgeTransform {
    pub neighbor_tree: TreeId,
    pub neighbor_edge: u8,
    pub reversed: bool,
}

/// How a quadrant crossing a tree corner lands in the neighbor's frame.
/// Corners carry no extra orientation: the pair of corner indices fully
/// determines the map.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CornerTransform {
    pub neighbor_tree: TreeId,
    pub neighbor_corner: u8,
}

/// The forest's tree-to-tree topology.
///
/// Faces join at most one neighbor (a face is shared by exactly two trees,
/// or none if it's on the domain boundary). Edges and corners can be shared
/// by an arbitrary number of trees, so those tables hold a list per index.
pub struct Connectivity {
    pub num_trees: usize,
    pub dim: Dim,
    face_neighbors: Vec<Vec<Option<FaceTransform>>>,
    edge_neighbors: Vec<Vec<Vec<EdgeTransform>>>,
    corner_neighbors: Vec<Vec<Vec<CornerTransform>>>,
}

impl Connectivity {
    /// A forest of `num_trees` trees with no connections at all: every face,
    /// edge, and corner is a domain boundary. Callers wire up neighbors with
    /// [`Connectivity::join_faces`] etc.
    pub fn unconnected(num_trees: usize, dim: Dim) -> Self {
        let nf = dim.num_faces() as usize;
        let ne = dim.num_edges() as usize;
        let nc = dim.num_corners() as usize;
        Connectivity {
            num_trees,
            dim,
            face_neighbors: vec![vec![None; nf]; num_trees],
            edge_neighbors: vec![vec![Vec::new(); ne]; num_trees],
            corner_neighbors: vec![vec![Vec::new(); nc]; num_trees],
        }
    }

    /// A single tree with every face, edge, and corner wrapped onto itself
    /// (a fully periodic unit domain). Convenient for tests and for demos
    /// that want balance/overlap activity without a multi-tree connectivity
    /// table.
    pub fn periodic_single_tree(dim: Dim) -> Self {
        let mut conn = Connectivity::unconnected(1, dim);
        for f in 0..dim.num_faces() {
            let opposite = f ^ 1;
            conn.join_faces(0, f, 0, opposite, false, [false, false]);
        }
        if dim == Dim::Three {
            for e in 0..dim.num_edges() {
                let opposite = edge_opposite(e);
                conn.join_edges(0, e, 0, opposite, false);
            }
        }
        for c in 0..dim.num_corners() {
            let opposite = c ^ (dim.num_corners() - 1);
            conn.join_corners(0, c, 0, opposite);
        }
        conn
    }

    /// Wire tree `a`'s face `fa` to tree `b`'s face `fb`. Symmetric: also
    /// wires `b -> a`. `swap`/`flip` describe the orientation from `a`'s
    /// point of view; the inverse transform for `b -> a` is derived.
    pub fn join_faces(&mut self, a: TreeId, fa: u8, b: TreeId, fb: u8, swap: bool, flip: [bool; 2]) {
        self.face_neighbors[a][fa as usize] = Some(FaceTransform {
            neighbor_tree: b,
            neighbor_face: fb,
            swap,
            flip,
        });
        self.face_neighbors[b][fb as usize] = Some(FaceTransform {
            neighbor_tree: a,
            neighbor_face: fa,
            swap,
            flip,
        });
    }

    pub fn join_edges(&mut self, a: TreeId, ea: u8, b: TreeId, eb: u8, reversed: bool) {
        self.edge_neighbors[a][ea as usize].push(EdgeTransform {
            neighbor_tree: b,
            neighbor_edge: eb,
            reversed,
        });
        self.edge_neighbors[b][eb as usize].push(EdgeTransform {
            neighbor_tree: a,
            neighbor_edge: ea,
            reversed,
        });
    }

    pub fn join_corners(&mut self, a: TreeId, ca: u8, b: TreeId, cb: u8) {
        self.corner_neighbors[a][ca as usize].push(CornerTransform {
            neighbor_tree: b,
            neighbor_corner: cb,
        });
        self.corner_neighbors[b][cb as usize].push(CornerTransform {
            neighbor_tree: a,
            neighbor_corner: ca,
        });
    }

    pub fn face_neighbor(&self, tree: TreeId, face: u8) -> Option<&FaceTransform> {
        self.face_neighbors[tree][face as usize].as_ref()
    }

    pub fn edge_neighbors(&self, tree: TreeId, edge: u8) -> &[EdgeTransform] {
        &self.edge_neighbors[tree][edge as usize]
    }

    pub fn corner_neighbors(&self, tree: TreeId, corner: u8) -> &[CornerTransform] {
        &self.corner_neighbors[tree][corner as usize]
    }

    /// Whether every face table entry that has a reverse pointer is
    /// consistent (`a -> b` implies `b -> a` with the inverse orientation).
    /// Catches a malformed connectivity before it silently corrupts overlap
    /// computations.
    pub fn is_valid(&self) -> bool {
        for (tree, faces) in self.face_neighbors.iter().enumerate() {
            for (face, link) in faces.iter().enumerate() {
                let Some(link) = link else { continue };
                let back = &self.face_neighbors[link.neighbor_tree][link.neighbor_face as usize];
                match back {
                    Some(back) if back.neighbor_tree == tree && back.neighbor_face == face as u8 => {}
                    _ => return false,
                }
            }
        }
        true
    }

    /// Map an extended quadrant that has crossed face `face` of `tree` into
    /// the neighbor tree's coordinate frame. Panics if `face` is a domain
    /// boundary; callers are expected to check [`Connectivity::face_neighbor`]
    /// first.
    pub fn transform_face(&self, q: &Quadrant, tree: TreeId, face: u8) -> (TreeId, Quadrant) {
        let link = self
            .face_neighbors[tree][face as usize]
            .expect("transform_face called on a boundary face");
        let root = root_len();
        let normal_axis = (face / 2) as usize;
        let on_low_side = face % 2 == 0;
        let coord = axis_coord(q, normal_axis);
        let offset = if on_low_side { -coord } else { coord - root };
        let neighbor_low = link.neighbor_face % 2 == 0;
        let new_normal = if neighbor_low { -offset } else { root + offset };

        let in_face_axes = other_axes(normal_axis, self.dim);
        let len = crate::config::len_at_level(q.level);
        let mut reflected = [0i64; 2];
        for (i, &axis) in in_face_axes.iter().enumerate() {
            let v = axis_coord(q, axis);
            reflected[i] = if link.flip[i] { root - v - len } else { v };
        }
        let target_axes = if link.swap && self.dim == Dim::Three {
            [in_face_axes[1], in_face_axes[0]]
        } else {
            in_face_axes
        };
        let neighbor_normal_axis = (link.neighbor_face / 2) as usize;

        // Build the image from scratch rather than mutating `q` in place:
        // `normal_axis` and `neighbor_normal_axis` may coincide or differ
        // depending on how the two trees are glued, and a partial in-place
        // update risks clobbering an axis that's about to be read.
        let mut axes = [axis_coord(q, 0), axis_coord(q, 1), axis_coord(q, 2)];
        axes[neighbor_normal_axis] = new_normal;
        for (i, &axis) in target_axes.iter().enumerate() {
            if axis != neighbor_normal_axis {
                axes[axis] = reflected[i];
            }
        }
        let result = Quadrant::new(axes[0], axes[1], axes[2], q.level);
        (link.neighbor_tree, result)
    }

    /// Map an extended quadrant crossing edge `edge` of `tree` into every
    /// tree sharing that edge.
    pub fn transform_edge(&self, q: &Quadrant, tree: TreeId, edge: u8) -> Vec<(TreeId, Quadrant)> {
        let root = root_len();
        let len = crate::config::len_at_level(q.level);
        let (free_axis, fixed_axes) = edge_decompose(edge);
        let free_val = axis_coord(q, free_axis);

        self.edge_neighbors[tree][edge as usize]
            .iter()
            .map(|link| {
                let neighbor_high = edge_fixed_high(link.neighbor_edge);
                let (neighbor_free_axis, neighbor_fixed_axes) = edge_decompose(link.neighbor_edge);
                let mut result = *q;
                let new_free = if link.reversed { root - free_val - len } else { free_val };
                set_axis(&mut result, neighbor_free_axis, new_free);
                for (i, &axis) in fixed_axes.iter().enumerate() {
                    let coord = axis_coord(q, axis);
                    let src_high = edge_fixed_high(edge)[i];
                    let offset = if src_high { coord - root } else { -coord };
                    let dst_high = neighbor_high[i];
                    let new_v = if dst_high { root + offset } else { -offset };
                    set_axis(&mut result, neighbor_fixed_axes[i], new_v);
                }
                (link.neighbor_tree, result)
            })
            .collect()
    }

    /// Map an extended quadrant crossing corner `corner` of `tree` into
    /// every tree sharing that corner.
    pub fn transform_corner(&self, q: &Quadrant, tree: TreeId, corner: u8) -> Vec<(TreeId, Quadrant)> {
        let root = root_len();
        let src_high = corner_high(corner, self.dim);

        self.corner_neighbors[tree][corner as usize]
            .iter()
            .map(|link| {
                let dst_high = corner_high(link.neighbor_corner, self.dim);
                let mut result = *q;
                for axis in 0..self.dim.num_axes() {
                    let coord = axis_coord(q, axis);
                    let offset = if src_high[axis] { coord - root } else { -coord };
                    let new_v = if dst_high[axis] { root + offset } else { -offset };
                    set_axis(&mut result, axis, new_v);
                }
                (link.neighbor_tree, result)
            })
            .collect()
    }
}

fn axis_coord(q: &Quadrant, axis: usize) -> i64 {
    match axis {
        0 => q.x,
        1 => q.y,
        _ => q.z,
    }
}

fn set_axis(q: &mut Quadrant, axis: usize, v: i64) {
    match axis {
        0 => q.x = v,
        1 => q.y = v,
        _ => q.z = v,
    }
}

fn other_axes(axis: usize, dim: Dim) -> [usize; 2] {
    match (axis, dim) {
        (0, Dim::Two) => [1, 1],
        (1, Dim::Two) => [0, 0],
        (0, Dim::Three) => [1, 2],
        (1, Dim::Three) => [0, 2],
        _ => [0, 1],
    }
}

/// The edge directly across the cube from `edge` (opposite corner pair on
/// the same free axis). Used to wire up a fully periodic single tree.
fn edge_opposite(edge: u8) -> u8 {
    let block = edge / 4;
    let bits = edge % 4;
    block * 4 + (3 - bits)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unconnected_has_no_neighbors() {
        let conn = Connectivity::unconnected(3, Dim::Two);
        assert!(conn.face_neighbor(0, 0).is_none());
        assert!(conn.edge_neighbors(1, 0).is_empty());
        assert!(conn.corner_neighbors(2, 3).is_empty());
        assert!(conn.is_valid());
    }

    #[test]
    fn join_faces_is_symmetric() {
        let mut conn = Connectivity::unconnected(2, Dim::Two);
        conn.join_faces(0, 1, 1, 0, false, [false, false]);
        assert_eq!(conn.face_neighbor(0, 1).unwrap().neighbor_tree, 1);
        assert_eq!(conn.face_neighbor(1, 0).unwrap().neighbor_tree, 0);
        assert!(conn.is_valid());
    }

    #[test]
    fn transform_face_round_trips_two_aligned_trees() {
        let mut conn = Connectivity::unconnected(2, Dim::Two);
        conn.join_faces(0, 1, 1, 0, false, [false, false]);
        let len = crate::config::len_at_level(3);
        let root = root_len();
        // a quadrant at the top level of tree 0 that has stepped one cell
        // past its +x face
        let q = Quadrant::new(root, len * 2, 0, 3);
        let (neighbor, image) = conn.transform_face(&q, 0, 1);
        assert_eq!(neighbor, 1);
        // it should land just inside tree 1's -x face, same y
        assert_eq!(image.x, 0);
        assert_eq!(image.y, len * 2);

        // and transforming back should return to the original cell
        let (back_tree, back) = conn.transform_face(&image, 1, 0);
        assert_eq!(back_tree, 0);
        assert_eq!(back.x, q.x);
        assert_eq!(back.y, q.y);
    }

    #[test]
    fn periodic_single_tree_wraps_every_face() {
        let conn = Connectivity::periodic_single_tree(Dim::Two);
        for f in 0..Dim::Two.num_faces() {
            assert!(conn.face_neighbor(0, f).is_some());
        }
    }

    #[test]
    fn edge_decompose_groups_by_free_axis() {
        assert_eq!(edge_decompose(0).0, 0);
        assert_eq!(edge_decompose(5).0, 1);
        assert_eq!(edge_decompose(10).0, 2);
    }
}
