//! The overlap engine (§4.6): given a batch of boundary quadrants that just
//! changed in the local tree, find which neighboring trees need a finer
//! seed quadrant to stay 2:1-consistent, without walking either side's
//! full leaf set.
//!
//! For each boundary quadrant `q`, the candidate that could possibly force
//! a split in a neighbor is `q`'s own parent transformed into the
//! neighbor's frame (§4.6's "seed ancestor"): if the neighbor already has
//! an equal-or-finer leaf covering that image, nothing crosses; otherwise
//! the neighbor needs that image (normalized to its sibling-zero position)
//! as a border-balance seed. Membership on the neighbor side is a binary
//! search over its sorted leaves rather than a set-equality lookup, since
//! the image and the neighbor's leaf are very rarely identical quadrants --
//! the image is usually properly contained in one coarser neighbor leaf,
//! or already covered by several finer ones.

use std::cmp::Ordering;
use std::collections::HashSet;

use crate::config::MAX_LEVEL;
use crate::connectivity::{Connectivity, TreeId};
use crate::dim::Dim;
use crate::morton::{self, Quadrant};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OverlapKind {
    Face,
    FaceEdge,
    FaceEdgeCorner,
}

/// A quadrant a neighboring tree needs as a border-balance seed, tagged
/// with which tree it belongs to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct OverlapMatch {
    pub tree: TreeId,
    pub quadrant: Quadrant,
}

/// Every leaf of `leaves` (Morton-sorted, linear) whose descendant range
/// intersects `s`'s own descendant range, found by binary search rather
/// than a linear scan. `leaves` must already be sorted.
pub fn leaves_intersecting(leaves: &[Quadrant], s: &Quadrant, dim: Dim) -> Vec<Quadrant> {
    let s_first = morton::first_descendant(s, MAX_LEVEL, dim);
    let s_last = morton::last_descendant(s, MAX_LEVEL, dim);
    let start = leaves.partition_point(|l| {
        let l_last = morton::last_descendant(l, MAX_LEVEL, dim);
        morton::compare(&l_last, &s_first, dim) == Ordering::Less
    });
    let end = leaves.partition_point(|l| {
        let l_first = morton::first_descendant(l, MAX_LEVEL, dim);
        morton::compare(&l_first, &s_last, dim) != Ordering::Greater
    });
    leaves[start..end].to_vec()
}

/// For every quadrant in `in_batch` (assumed to belong to `tree_id`),
/// transform its parent across every touched face/edge/corner allowed by
/// `kind`, and emit an [`OverlapMatch`] for each neighbor that doesn't
/// already have an equal-or-finer leaf at that image.
pub fn compute_overlap(
    tree_id: TreeId,
    in_batch: &[Quadrant],
    conn: &Connectivity,
    neighbor_leaves: impl Fn(TreeId) -> Vec<Quadrant>,
    dim: Dim,
    kind: OverlapKind,
) -> Vec<OverlapMatch> {
    let include_edges = matches!(kind, OverlapKind::FaceEdge | OverlapKind::FaceEdgeCorner);
    let include_corners = matches!(kind, OverlapKind::FaceEdgeCorner);

    let mut seen: HashSet<OverlapMatch> = HashSet::new();
    let mut out = Vec::new();

    for q in in_batch {
        if q.level == 0 {
            continue;
        }
        let parent = morton::parent(q, dim);

        for face in 0..dim.num_faces() {
            if !morton::touches_tree_face(q, face, dim) {
                continue;
            }
            if conn.face_neighbor(tree_id, face).is_some() {
                let (neighbor_tree, seed_image) = conn.transform_face(&parent, tree_id, face);
                emit_if_split_needed(&mut out, &mut seen, neighbor_tree, seed_image, &neighbor_leaves, dim);
            }
        }

        if dim == Dim::Three && include_edges {
            for edge in 0..dim.num_edges() {
                if !morton::touches_tree_edge(q, edge, dim) {
                    continue;
                }
                for (neighbor_tree, seed_image) in conn.transform_edge(&parent, tree_id, edge) {
                    emit_if_split_needed(&mut out, &mut seen, neighbor_tree, seed_image, &neighbor_leaves, dim);
                }
            }
        }

        if include_corners {
            for corner in 0..dim.num_corners() {
                if !morton::touches_tree_corner(q, corner, dim) {
                    continue;
                }
                for (neighbor_tree, seed_image) in conn.transform_corner(&parent, tree_id, corner) {
                    emit_if_split_needed(&mut out, &mut seen, neighbor_tree, seed_image, &neighbor_leaves, dim);
                }
            }
        }
    }

    out
}

fn emit_if_split_needed(
    out: &mut Vec<OverlapMatch>,
    seen: &mut HashSet<OverlapMatch>,
    neighbor_tree: TreeId,
    seed_image: Quadrant,
    neighbor_leaves: &impl Fn(TreeId) -> Vec<Quadrant>,
    dim: Dim,
) {
    if seed_image.level == 0 {
        return;
    }
    let mut leaves = neighbor_leaves(neighbor_tree);
    leaves.sort_by(|a, b| morton::compare(a, b, dim));
    let hits = leaves_intersecting(&leaves, &seed_image, dim);
    if hits.iter().any(|h| h.level >= seed_image.level) {
        return; // neighbor already has equal-or-finer coverage here
    }
    let seed = morton::sibling(&seed_image, 0, dim);
    push(out, seen, neighbor_tree, seed);
}

fn push(out: &mut Vec<OverlapMatch>, seen: &mut HashSet<OverlapMatch>, tree: TreeId, quadrant: Quadrant) {
    let m = OverlapMatch { tree, quadrant };
    if seen.insert(m) {
        out.push(m);
    }
}

/// Deduplicate a batch of matches from multiple boundary quadrants, e.g.
/// after merging results from several ranks' requests.
pub fn uniqify_overlap(matches: Vec<OverlapMatch>) -> Vec<OverlapMatch> {
    let mut seen = HashSet::new();
    matches.into_iter().filter(|m| seen.insert(*m)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::len_at_level;

    #[test]
    fn leaves_intersecting_finds_the_containing_leaf() {
        let leaves = vec![Quadrant::new(0, 0, 0, 1), Quadrant::new(len_at_level(1), 0, 0, 1)];
        let s = Quadrant::new(0, 0, 0, 3);
        let hits = leaves_intersecting(&leaves, &s, Dim::Two);
        assert_eq!(hits, vec![leaves[0]]);
    }

    #[test]
    fn overlap_emits_no_seed_once_the_neighbor_already_holds_it() {
        let mut conn = Connectivity::unconnected(2, Dim::Two);
        conn.join_faces(0, 1, 1, 0, false, [false, false]);
        let len = len_at_level(2);
        let root = crate::config::root_len();
        let q = Quadrant::new(root - len, 0, 0, 2); // tree 0's +x border, level 2
        let first_pass = compute_overlap(0, &[q], &conn, |_| Vec::new(), Dim::Two, OverlapKind::FaceEdgeCorner);
        let seed = first_pass.iter().find(|m| m.tree == 1).expect("a seed is forced across the shared face").quadrant;

        // feed the seed straight back as if the neighbor had already
        // absorbed it; the same batch should force nothing further.
        let second_pass = compute_overlap(0, &[q], &conn, |t| if t == 1 { vec![seed] } else { Vec::new() }, Dim::Two, OverlapKind::FaceEdgeCorner);
        assert!(second_pass.is_empty());
    }

    #[test]
    fn overlap_emits_nothing_for_an_interior_quadrant() {
        let conn = Connectivity::unconnected(1, Dim::Two);
        let len = len_at_level(2);
        let root = crate::config::root_len();
        let q = Quadrant::new(root / 2 - len, root / 2, 0, 2); // not on any boundary
        let result = compute_overlap(0, &[q], &conn, |_| Vec::new(), Dim::Two, OverlapKind::FaceEdgeCorner);
        assert!(result.is_empty());
    }

    #[test]
    fn uniqify_overlap_drops_duplicates() {
        let m = OverlapMatch { tree: 0, quadrant: Quadrant::root() };
        let deduped = uniqify_overlap(vec![m, m, m]);
        assert_eq!(deduped.len(), 1);
    }

    #[test]
    fn overlap_crosses_into_a_joined_neighbor_tree_as_a_seed_ancestor() {
        let mut conn = Connectivity::unconnected(2, Dim::Two);
        conn.join_faces(0, 1, 1, 0, false, [false, false]);
        let len = len_at_level(2);
        let root = crate::config::root_len();
        let q = Quadrant::new(root - len, 0, 0, 2); // tree 0's +x border, level 2
        let neighbor_leaf = Quadrant::root(); // tree 1 has just the root leaf
        let result = compute_overlap(0, &[q], &conn, |t| if t == 1 { vec![neighbor_leaf] } else { Vec::new() }, Dim::Two, OverlapKind::FaceEdgeCorner);
        // the seed is q's parent (level 1) transformed into tree 1 and
        // normalized to sibling zero -- a coarser quadrant than q itself,
        // not q verbatim.
        assert!(result.iter().any(|m| m.tree == 1 && m.quadrant.level == 1));
    }
}
