//! The top-level container: a distributed collection of [`Tree`]s sharing
//! one [`Connectivity`] and one rank's slice of the global leaf ordering.

use std::collections::BTreeMap;

use crc::{Crc, CRC_32_ISO_HDLC};
use rayon::prelude::*;

use crate::balance::BalanceOptions;
use crate::comm::Communicator;
use crate::config::ForestConfig;
use crate::connectivity::{Connectivity, TreeId};
use crate::dim::Dim;
use crate::error::Result;
use crate::morton::Quadrant;
use crate::partition;
use crate::tree::Tree;

const CRC32: Crc<u32> = Crc::<u32>::new(&CRC_32_ISO_HDLC);

/// This rank's view of a forest: one [`Tree`] per entry in `connectivity`,
/// holding only the leaves this rank currently owns.
pub struct Forest {
    pub config: ForestConfig,
    pub connectivity: Connectivity,
    trees: Vec<Tree>,
    /// Prefix-sum table of leaf counts across ranks: rank `r` owns global
    /// leaf indices `[global_first_quadrant[r], global_first_quadrant[r+1])`.
    pub global_first_quadrant: Vec<u64>,
    /// Index of the first tree this rank holds any leaves in, or `-1` if
    /// this rank's slice of the forest is currently empty.
    pub first_local_tree: isize,
    /// Index of the last tree this rank holds any leaves in, or `-2` if
    /// this rank's slice of the forest is currently empty (distinct from
    /// `first_local_tree`'s sentinel so an empty range never looks valid).
    pub last_local_tree: isize,
}

impl Forest {
    pub fn new(config: ForestConfig, connectivity: Connectivity) -> Self {
        let trees = (0..connectivity.num_trees).map(|_| Tree::empty(config.dim)).collect();
        Forest {
            config,
            connectivity,
            trees,
            global_first_quadrant: Vec::new(),
            first_local_tree: -1,
            last_local_tree: -2,
        }
    }

    pub fn tree(&self, tree_id: usize) -> &Tree {
        &self.trees[tree_id]
    }

    pub fn tree_mut(&mut self, tree_id: usize) -> &mut Tree {
        &mut self.trees[tree_id]
    }

    pub fn trees(&self) -> &[Tree] {
        &self.trees
    }

    pub fn dim(&self) -> Dim {
        self.config.dim
    }

    pub fn total_leaves(&self) -> u64 {
        self.trees.iter().map(|t| t.len() as u64).sum()
    }

    /// Seed every tree from a flat `(tree_id, quadrants)` list, sorting
    /// and linearizing each tree independently.
    pub fn seed(&mut self, per_tree: Vec<(usize, Vec<Quadrant>)>) {
        for (tree_id, quadrants) in per_tree {
            self.trees[tree_id] = Tree::build(quadrants, self.config.dim);
        }
        self.recompute_local_tree_range();
    }

    /// Reshuffle every tree's leaves across ranks to match `new_counts`
    /// (§4.7 point 6), then rebuild the forest-level invariants that
    /// depend on the new distribution: `global_first_quadrant`,
    /// `first_local_tree`/`last_local_tree`, and each tree's own summaries.
    /// `payload_for` supplies each quadrant's wire payload by tree id, the
    /// caller's hook for shipping whatever state rides along with a leaf.
    pub fn repartition(&mut self, world: &dyn Communicator, new_counts: &[u64], mut payload_for: impl FnMut(TreeId, &Quadrant) -> Vec<u8>) -> Result<()> {
        let dim = self.config.dim;

        let mut local_leaves: Vec<partition::Leaf> = Vec::new();
        for (tree_id, tree) in self.trees.iter().enumerate() {
            for q in tree.leaves() {
                local_leaves.push(partition::Leaf {
                    tree: tree_id,
                    quadrant: *q,
                    payload: payload_for(tree_id, q),
                });
            }
        }

        let current_counts = world.all_gather(local_leaves.len() as u64)?;
        let global_offset: u64 = current_counts[..world.rank() as usize].iter().sum();

        let result = partition::partition_given(world, &self.config, &local_leaves, global_offset, new_counts)?;

        let mut by_tree: BTreeMap<TreeId, Vec<Quadrant>> = BTreeMap::new();
        for leaf in result {
            by_tree.entry(leaf.tree).or_default().push(leaf.quadrant);
        }
        for tree in self.trees.iter_mut() {
            *tree = Tree::empty(dim);
        }
        for (tree_id, quadrants) in by_tree {
            self.trees[tree_id] = Tree::from_sorted_linear(quadrants, dim);
        }

        let new_local_counts = world.all_gather(self.total_leaves())?;
        let mut prefix = Vec::with_capacity(new_local_counts.len() + 1);
        let mut running = 0u64;
        prefix.push(running);
        for count in &new_local_counts {
            running += count;
            prefix.push(running);
        }
        self.global_first_quadrant = prefix;

        self.recompute_local_tree_range();
        Ok(())
    }

    fn recompute_local_tree_range(&mut self) {
        let nonempty: Vec<usize> = (0..self.trees.len()).filter(|&i| !self.trees[i].is_empty()).collect();
        match (nonempty.first(), nonempty.last()) {
            (Some(&first), Some(&last)) => {
                self.first_local_tree = first as isize;
                self.last_local_tree = last as isize;
            }
            _ => {
                self.first_local_tree = -1;
                self.last_local_tree = -2;
            }
        }
    }

    /// Run the interior balance engine over every local tree independently
    /// and in parallel; trees don't interact until the border-balance pass
    /// exchanges candidates across their shared faces/edges/corners.
    pub fn balance_interiors(&mut self, options: BalanceOptions) {
        let dim = self.config.dim;
        let balanced: Vec<Vec<Quadrant>> = self
            .trees
            .par_iter()
            .map(|tree| crate::balance::balance_subtree(tree.leaves(), dim, options))
            .collect();
        for (tree, leaves) in self.trees.iter_mut().zip(balanced) {
            tree.replace_leaves(leaves);
        }
    }

    /// Every structural invariant this rank's slice of the forest must
    /// satisfy: each tree's own invariants, plus connectivity consistency.
    pub fn is_valid(&self) -> bool {
        let mut ok = self.connectivity.is_valid();
        for tree in &self.trees {
            ok &= tree.is_valid();
        }
        ok
    }

    /// Whether two forests (e.g. this rank's forest before and after a
    /// round-trip partition) hold identical leaves, tree by tree.
    pub fn is_equal(&self, other: &Forest) -> bool {
        self.trees.len() == other.trees.len()
            && self.trees.iter().zip(other.trees.iter()).all(|(a, b)| a.leaves() == b.leaves())
    }

    /// A CRC-32 over every leaf's `(tree_id, x, y, z, level)` tuple in
    /// big-endian byte order, stable across ranks and partition layouts --
    /// used by property tests to confirm a partition/balance round trip
    /// preserved the forest's content.
    pub fn checksum(&self) -> u32 {
        let mut digest = CRC32.digest();
        for (tree_id, tree) in self.trees.iter().enumerate() {
            for q in tree.leaves() {
                digest.update(&(tree_id as u64).to_be_bytes());
                digest.update(&q.x.to_be_bytes());
                digest.update(&q.y.to_be_bytes());
                digest.update(&q.z.to_be_bytes());
                digest.update(&[q.level]);
            }
        }
        digest.finalize()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::comm::LocalWorld;
    use crate::morton;

    #[test]
    fn fresh_forest_has_no_leaves() {
        let conn = Connectivity::unconnected(2, Dim::Two);
        let forest = Forest::new(ForestConfig::single_rank(Dim::Two, 0), conn);
        assert_eq!(forest.total_leaves(), 0);
        assert!(forest.is_valid());
        assert_eq!(forest.first_local_tree, -1);
        assert_eq!(forest.last_local_tree, -2);
    }

    #[test]
    fn seed_updates_the_local_tree_range() {
        let conn = Connectivity::unconnected(3, Dim::Two);
        let mut forest = Forest::new(ForestConfig::single_rank(Dim::Two, 0), conn);
        forest.seed(vec![(1, vec![Quadrant::root()])]);
        assert_eq!(forest.first_local_tree, 1);
        assert_eq!(forest.last_local_tree, 1);
    }

    #[test]
    fn repartition_on_a_single_rank_preserves_content_and_rebuilds_invariants() {
        let conn = Connectivity::unconnected(1, Dim::Two);
        let mut forest = Forest::new(ForestConfig::single_rank(Dim::Two, 1), conn);
        let children = morton::children(&Quadrant::root(), Dim::Two);
        forest.seed(vec![(0, children.clone())]);
        let before_checksum = forest.checksum();

        let world = LocalWorld;
        let total = forest.total_leaves();
        forest.repartition(&world, &[total], |_, _| vec![0u8]).unwrap();

        assert_eq!(forest.checksum(), before_checksum);
        assert_eq!(forest.global_first_quadrant, vec![0, total]);
        assert_eq!(forest.first_local_tree, 0);
        assert_eq!(forest.last_local_tree, 0);
    }

    #[test]
    fn checksum_is_order_independent_within_a_tree() {
        let conn = Connectivity::unconnected(1, Dim::Two);
        let mut a = Forest::new(ForestConfig::single_rank(Dim::Two, 0), Connectivity::unconnected(1, Dim::Two));
        let mut b = Forest::new(ForestConfig::single_rank(Dim::Two, 0), conn);
        let children = morton::children(&Quadrant::root(), Dim::Two);
        a.seed(vec![(0, children.clone())]);
        let mut reversed = children.clone();
        reversed.reverse();
        b.seed(vec![(0, reversed)]);
        assert_eq!(a.checksum(), b.checksum());
    }

    #[test]
    fn balance_interiors_enforces_2to1_per_tree() {
        let mut forest = Forest::new(ForestConfig::single_rank(Dim::Two, 0), Connectivity::unconnected(1, Dim::Two));
        let len2 = crate::config::len_at_level(2);
        let fine = Quadrant::new(0, 0, 0, 3);
        let coarse = Quadrant::new(len2 * 2, 0, 0, 1);
        forest.seed(vec![(0, vec![fine, coarse])]);
        forest.balance_interiors(crate::balance::BalanceOptions::default());
        assert!(forest.tree(0).is_valid());
    }

    #[test]
    fn checksum_changes_when_leaves_differ() {
        let mut a = Forest::new(ForestConfig::single_rank(Dim::Two, 0), Connectivity::unconnected(1, Dim::Two));
        let mut b = Forest::new(ForestConfig::single_rank(Dim::Two, 0), Connectivity::unconnected(1, Dim::Two));
        a.seed(vec![(0, vec![Quadrant::root()])]);
        b.seed(vec![(0, morton::children(&Quadrant::root(), Dim::Two))]);
        assert_ne!(a.checksum(), b.checksum());
    }
}
