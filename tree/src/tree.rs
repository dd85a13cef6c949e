//! A single tree's quadrant storage and the invariants the rest of the
//! crate relies on (§4.2): a tree is a *linear* (no ancestor-descendant
//! pair), *sorted* (Morton order), non-overlapping vector of leaves.

use log::warn;

use crate::dim::Dim;
use crate::morton::{self, Quadrant};

/// A single tree's leaves, plus the cached summaries the other engines read
/// on every call rather than recomputing.
#[derive(Clone, Debug)]
pub struct Tree {
    leaves: Vec<Quadrant>,
    /// `per_level[l]` = number of leaves at level `l`.
    per_level: Vec<u32>,
    maxlevel: u8,
    dim: Dim,
}

impl Tree {
    /// Build a tree from an already-sorted, already-linear vector of
    /// leaves. Use [`Tree::build`] instead when that isn't guaranteed.
    pub fn from_sorted_linear(leaves: Vec<Quadrant>, dim: Dim) -> Self {
        debug_assert!(is_sorted(&leaves, dim), "leaves are not sorted");
        debug_assert!(is_linear(&leaves, dim), "leaves are not linear");
        let mut tree = Tree {
            leaves,
            per_level: Vec::new(),
            maxlevel: 0,
            dim,
        };
        tree.recompute_summaries();
        tree
    }

    /// Sort and linearize an arbitrary set of quadrants into a tree.
    pub fn build(mut quadrants: Vec<Quadrant>, dim: Dim) -> Self {
        quadrants.sort_by(|a, b| morton::compare(a, b, dim));
        quadrants.dedup();
        let leaves = linearize(quadrants, dim);
        Tree::from_sorted_linear(leaves, dim)
    }

    pub fn empty(dim: Dim) -> Self {
        Tree {
            leaves: Vec::new(),
            per_level: Vec::new(),
            maxlevel: 0,
            dim,
        }
    }

    pub fn leaves(&self) -> &[Quadrant] {
        &self.leaves
    }

    pub fn len(&self) -> usize {
        self.leaves.len()
    }

    pub fn is_empty(&self) -> bool {
        self.leaves.is_empty()
    }

    pub fn dim(&self) -> Dim {
        self.dim
    }

    pub fn maxlevel(&self) -> u8 {
        self.maxlevel
    }

    pub fn count_at_level(&self, level: u8) -> u32 {
        self.per_level.get(level as usize).copied().unwrap_or(0)
    }

    /// Morton-least leaf, or `None` for an empty tree.
    pub fn first_descendant(&self) -> Option<Quadrant> {
        self.leaves.first().copied()
    }

    /// Morton-greatest leaf, or `None` for an empty tree.
    pub fn last_descendant(&self) -> Option<Quadrant> {
        self.leaves.last().copied()
    }

    /// Offset of this tree's leaves within a forest-global numbering,
    /// given the count of leaves in every preceding tree.
    pub fn quadrants_offset(preceding_trees: &[Tree]) -> u64 {
        preceding_trees.iter().map(|t| t.len() as u64).sum()
    }

    /// Replace the leaf vector wholesale (used by engines that produce a
    /// brand-new sorted, linear vector) and refresh the cached summaries.
    pub fn replace_leaves(&mut self, leaves: Vec<Quadrant>) {
        debug_assert!(is_sorted(&leaves, self.dim));
        debug_assert!(is_linear(&leaves, self.dim));
        self.leaves = leaves;
        self.recompute_summaries();
    }

    fn recompute_summaries(&mut self) {
        self.maxlevel = self.leaves.iter().map(|q| q.level).max().unwrap_or(0);
        self.per_level.clear();
        self.per_level.resize(self.maxlevel as usize + 1, 0);
        for q in &self.leaves {
            self.per_level[q.level as usize] += 1;
        }
    }

    /// Every invariant a well-formed tree must satisfy, logged
    /// individually so a caller sees exactly which one broke rather than a
    /// single opaque `false`.
    pub fn is_valid(&self) -> bool {
        let mut ok = true;
        if !is_sorted(&self.leaves, self.dim) {
            warn!("tree invariant violated: leaves are not sorted");
            ok = false;
        }
        if !is_linear(&self.leaves, self.dim) {
            warn!("tree invariant violated: leaves are not linear");
            ok = false;
        }
        for q in &self.leaves {
            if !q.is_valid(self.dim) {
                warn!("tree invariant violated: quadrant {q:?} is not in-root/aligned");
                ok = false;
            }
        }
        ok
    }
}

/// Strictly increasing in Morton order.
pub fn is_sorted(leaves: &[Quadrant], dim: Dim) -> bool {
    leaves.windows(2).all(|w| morton::compare(&w[0], &w[1], dim) == std::cmp::Ordering::Less)
}

/// No quadrant is an ancestor of a later one. Assumes `leaves` is already
/// sorted; an unsorted vector with no adjacent ancestor pair can still be
/// non-linear once sorted, so this is only meaningful post-sort.
pub fn is_linear(leaves: &[Quadrant], dim: Dim) -> bool {
    leaves.windows(2).all(|w| !morton::is_ancestor(&w[0], &w[1], dim))
}

/// Whether `leaves` exactly tiles the space between its own first and last
/// descendant with no gaps -- the property the completion engine restores.
pub fn is_complete(leaves: &[Quadrant], dim: Dim) -> bool {
    if leaves.len() < 2 {
        return true;
    }
    leaves.windows(2).all(|w| morton::is_next(&w[0], &w[1], dim))
}

/// Drop any quadrant that is an ancestor of a following quadrant, keeping
/// only the finest-level descendants. `quadrants` must already be sorted.
pub fn linearize(quadrants: Vec<Quadrant>, dim: Dim) -> Vec<Quadrant> {
    let mut out: Vec<Quadrant> = Vec::with_capacity(quadrants.len());
    for q in quadrants {
        while let Some(&last) = out.last() {
            if morton::is_ancestor(&last, &q, dim) {
                out.pop();
            } else {
                break;
            }
        }
        out.push(q);
    }
    out
}

/// Remove quadrants this rank does not own, per the half-open
/// `[first, last)` range of a partition's global first-quadrant table.
/// `owns` compares by Morton order against the two boundary quadrants.
pub fn remove_nonowned(leaves: Vec<Quadrant>, first: &Quadrant, last: &Quadrant, dim: Dim) -> Vec<Quadrant> {
    leaves
        .into_iter()
        .filter(|q| morton::compare(q, first, dim) != std::cmp::Ordering::Less && morton::compare(q, last, dim) == std::cmp::Ordering::Less)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn q(x: i64, y: i64, level: u8) -> Quadrant {
        Quadrant::new(x, y, 0, level)
    }

    #[test]
    fn build_sorts_and_linearizes() {
        let root = Quadrant::root();
        let children = morton::children(&root, Dim::Two);
        let mut input = vec![root]; // root is an ancestor of all four children
        input.extend(children.iter().copied());
        let tree = Tree::build(input, Dim::Two);
        assert_eq!(tree.len(), 4);
        assert!(is_sorted(tree.leaves(), Dim::Two));
        assert!(is_linear(tree.leaves(), Dim::Two));
    }

    #[test]
    fn per_level_histogram_matches_counts() {
        let root = Quadrant::root();
        let children = morton::children(&root, Dim::Two);
        let tree = Tree::build(children, Dim::Two);
        assert_eq!(tree.count_at_level(1), 4);
        assert_eq!(tree.maxlevel(), 1);
    }

    #[test]
    fn is_complete_detects_gap() {
        let len = crate::config::len_at_level(1);
        let a = q(0, 0, 1);
        let b = q(len * 3, 0, 1); // not a's Morton successor
        assert!(!is_complete(&[a, b], Dim::Two));
    }

    #[test]
    fn remove_nonowned_filters_by_range() {
        let root = Quadrant::root();
        let children = morton::children(&root, Dim::Two);
        let first = children[1];
        let last = children[3];
        let kept = remove_nonowned(children, &first, &last, Dim::Two);
        assert_eq!(kept, vec![children_ref(1), children_ref(2)]);
    }

    fn children_ref(i: usize) -> Quadrant {
        morton::children(&Quadrant::root(), Dim::Two)[i]
    }
}
