//! Random quadrant/tree generators used by property tests elsewhere in
//! the crate, kept in one place the way the teacher kept its point-cloud
//! generator separate from the algorithms that consumed it.

use rand::{thread_rng, Rng};

use crate::config::len_at_level;
use crate::dim::Dim;
use crate::morton::Quadrant;
use crate::tree::Tree;

/// A single random quadrant at a uniformly chosen level in `[0, max_level]`,
/// aligned to that level's grid.
pub fn random_quadrant(max_level: u8, dim: Dim) -> Quadrant {
    let mut rng = thread_rng();
    let level = rng.gen_range(0..=max_level);
    let len = len_at_level(level);
    let root = crate::config::root_len();
    let cells = root / len;
    let aligned = |rng: &mut rand::rngs::ThreadRng| rng.gen_range(0..cells) * len;
    Quadrant::new(
        aligned(&mut rng),
        aligned(&mut rng),
        if dim == Dim::Three { aligned(&mut rng) } else { 0 },
        level,
    )
}

/// `count` random quadrants, deduplicated after Morton-sorting -- suitable
/// raw input for [`crate::tree::Tree::build`] or the completion/balance
/// engines, which expect sorted input but not linearity.
pub fn random_quadrants(count: usize, max_level: u8, dim: Dim) -> Vec<Quadrant> {
    (0..count).map(|_| random_quadrant(max_level, dim)).collect()
}

/// A random, already-balanced single tree, convenient for tests that need
/// a nontrivial fixture without driving the balance engine themselves.
pub fn random_tree(count: usize, max_level: u8, dim: Dim) -> Tree {
    let options = crate::balance::BalanceOptions::default();
    let quadrants = random_quadrants(count, max_level, dim);
    let balanced = crate::balance::balance_subtree(&quadrants, dim, options);
    Tree::from_sorted_linear(balanced, dim)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn random_quadrant_is_always_valid() {
        for _ in 0..50 {
            let q = random_quadrant(5, Dim::Two);
            assert!(q.is_valid(Dim::Two));
        }
    }

    #[test]
    fn random_tree_satisfies_balance_invariants() {
        let tree = random_tree(20, 4, Dim::Two);
        assert!(tree.is_valid());
        assert!(crate::tree::is_complete(tree.leaves(), Dim::Two));
    }
}
