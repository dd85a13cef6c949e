//! The balance engine (§4.4): enforce the 2:1 size constraint between
//! face/edge/corner neighbors by a bottom-up sweep, using a per-level
//! hashed working set to avoid re-deriving the same candidate twice.

use std::collections::HashSet;

use crate::completion;
use crate::dim::Dim;
use crate::morton::{self, Quadrant};

/// How far balance propagates: across shared faces only, faces and edges,
/// or faces, edges, and corners. Edges only exist in 3D, so in 2D
/// `FaceEdge` reduces to exactly `Face` -- there is nothing extra to add.
/// `FaceEdgeCorner` is the only variant that adds corner candidates in 2D.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BalanceKind {
    Face,
    FaceEdge,
    FaceEdgeCorner,
}

#[derive(Clone, Copy, Debug)]
pub struct BalanceOptions {
    pub kind: BalanceKind,
    /// Whether to discard a candidate parent as soon as it's known to fall
    /// outside the root before doing the (more expensive) full containment
    /// check. Off by default: the saving is marginal and the early-exit
    /// path has historically been a source of balance bugs upstream.
    pub prune_out_of_bounds_parents: bool,
}

impl Default for BalanceOptions {
    fn default() -> Self {
        BalanceOptions {
            kind: BalanceKind::FaceEdgeCorner,
            prune_out_of_bounds_parents: false,
        }
    }
}

/// Balance a single tree's leaves in isolation (no cross-tree neighbors).
/// Cross-tree candidates are the border-balance engine's job.
pub fn balance_subtree(leaves: &[Quadrant], dim: Dim, options: BalanceOptions) -> Vec<Quadrant> {
    if leaves.is_empty() {
        return Vec::new();
    }

    let maxlevel = leaves.iter().map(|q| q.level).max().unwrap_or(0);
    let mut inlist: HashSet<Quadrant> = leaves.iter().copied().collect();
    let mut accepted: HashSet<Quadrant> = HashSet::new();

    // Bottom-up: process the deepest level first, emitting coarser
    // candidate ancestors that need their own balance check one level up.
    for level in (1..=maxlevel).rev() {
        let this_level: Vec<Quadrant> = inlist.iter().copied().filter(|q| q.level == level).collect();
        if this_level.is_empty() {
            continue;
        }

        let mut outlist: HashSet<Quadrant> = HashSet::new();
        for q in &this_level {
            accepted.insert(*q);
            for candidate in balance_candidates(q, dim, options) {
                if candidate.level > 0 && candidate.is_valid(dim) {
                    outlist.insert(candidate);
                }
            }
        }

        for candidate in outlist {
            inlist.insert(candidate);
        }
    }

    // every original leaf must still be present, plus whatever coarser
    // candidates were generated by finer leaves
    for q in leaves {
        accepted.insert(*q);
    }

    let mut result: Vec<Quadrant> = accepted.into_iter().collect();
    result.sort_by(|a, b| morton::compare(a, b, dim));
    let result = crate::tree::linearize(result, dim);
    completion::complete_subtree(&result, dim)
}

/// The coarser sibling-group candidates a single finer quadrant forces on
/// its face (and, depending on `options.kind`, edge/corner) neighbors: the
/// parent of every quadrant within one insulation layer.
fn balance_candidates(q: &Quadrant, dim: Dim, options: BalanceOptions) -> Vec<Quadrant> {
    let mut out = Vec::new();
    if q.level == 0 {
        return out;
    }
    let len = crate::config::len_at_level(q.level);

    let axis_offsets: &[i64] = &[-len, 0, len];
    let include_edges = matches!(options.kind, BalanceKind::FaceEdge | BalanceKind::FaceEdgeCorner);
    let include_corners = matches!(options.kind, BalanceKind::FaceEdgeCorner);

    for &dx in axis_offsets {
        for &dy in axis_offsets {
            let dz_range: &[i64] = if dim == Dim::Three { axis_offsets } else { &[0] };
            for &dz in dz_range {
                let nonzero_axes = (dx != 0) as u8 + (dy != 0) as u8 + (dz != 0) as u8;
                let wanted = match (dim, nonzero_axes) {
                    (Dim::Two, 0) => false,
                    (Dim::Two, 1) => true,                  // face
                    (Dim::Two, 2) => include_corners,        // corner (2D has no edges)
                    (Dim::Three, 0) => false,
                    (Dim::Three, 1) => true,                 // face
                    (Dim::Three, 2) => include_edges,        // edge
                    (Dim::Three, 3) => include_corners,      // corner
                    _ => false,
                };
                if !wanted {
                    continue;
                }

                let neighbor = Quadrant::new(q.x + dx, q.y + dy, q.z + dz, q.level);
                if options.prune_out_of_bounds_parents && neighbor.is_outside_root(dim) {
                    continue;
                }
                if !neighbor.is_extended_valid(dim) {
                    continue;
                }
                out.push(morton::parent(&neighbor, dim));
            }
        }
    }
    out
}
