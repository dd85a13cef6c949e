//! The completion engine (§4.3): build the minimal complete tiling between
//! two bounding quadrants, or complete an entire tree from its extremes.
//!
//! Ported from the nearest-common-ancestor-plus-working-list algorithm
//! (`p4est_complete_region` in the original implementation): start from the
//! common ancestor's children, and repeatedly split any candidate that
//! still straddles the open interval `(a, b)` until every candidate either
//! falls entirely inside it or is discarded.

use std::collections::HashSet;

use crate::dim::Dim;
use crate::morton::{self, Quadrant};

/// Build the minimal linear, complete set of quadrants strictly between `a`
/// and `b` (exclusive of both), inclusive of `a` and `b` themselves if
/// `include_bounds` is set.
pub fn complete_region(a: &Quadrant, b: &Quadrant, include_bounds: bool, dim: Dim) -> Vec<Quadrant> {
    debug_assert_eq!(morton::compare(a, b, dim), std::cmp::Ordering::Less, "a must precede b");

    let mut result: Vec<Quadrant> = Vec::new();
    if include_bounds {
        result.push(*a);
    }

    let ancestors_a: HashSet<Quadrant> = ancestors_of(a, dim).into_iter().collect();
    let ancestors_b: HashSet<Quadrant> = ancestors_of(b, dim).into_iter().collect();
    let nca = morton::nearest_common_ancestor(a, b, dim);
    let mut working: Vec<Quadrant> = morton::children(&nca, dim);

    loop {
        let mut next_round: Vec<Quadrant> = Vec::new();
        let mut progressed = false;

        for w in working.drain(..) {
            // w straddles a's or b's boundary (it's a proper ancestor of
            // one of them) and must be refined further rather than kept or
            // dropped whole -- symmetric for both endpoints, since a
            // coarse quadrant containing `a` still has room after `a`
            // that belongs in the result, same as one containing `b`.
            if ancestors_a.contains(&w) || ancestors_b.contains(&w) {
                next_round.extend(morton::children(&w, dim));
                progressed = true;
                continue;
            }

            let after_a = morton::compare(a, &w, dim) == std::cmp::Ordering::Less;
            let before_b = morton::compare(&w, b, dim) == std::cmp::Ordering::Less;
            if after_a && before_b {
                result.push(w);
            }
            // quadrants entirely outside (a, b), or equal to a or b
            // themselves, are simply dropped
        }

        if !progressed {
            break;
        }
        working = next_round;
    }

    result.sort_by(|x, y| morton::compare(x, y, dim));
    if include_bounds {
        result.push(*b);
        result.sort_by(|x, y| morton::compare(x, y, dim));
    }
    result
}

/// Complete an entire tree: given its current (possibly incomplete)
/// sorted, linear leaves, fill every gap between consecutive leaves so the
/// result tiles `[first_descendant, last_descendant]` with no holes.
pub fn complete_subtree(leaves: &[Quadrant], dim: Dim) -> Vec<Quadrant> {
    if leaves.len() < 2 {
        return leaves.to_vec();
    }
    let mut out = Vec::with_capacity(leaves.len());
    out.push(leaves[0]);
    for pair in leaves.windows(2) {
        let (a, b) = (pair[0], pair[1]);
        if !morton::is_next(&a, &b, dim) {
            out.extend(complete_region(&a, &b, false, dim));
        }
        out.push(b);
    }
    out
}

fn ancestors_of(q: &Quadrant, dim: Dim) -> Vec<Quadrant> {
    let mut out = Vec::with_capacity(q.level as usize);
    let mut cur = *q;
    while cur.level > 0 {
        cur = morton::parent(&cur, dim);
        out.push(cur);
    }
    out
}
