//! Single-process demo driver: build a random forest, balance it, and
//! print a checksum. Useful as a smoke test and as a worked example of
//! wiring the engines together without an MPI runtime.

use forest::balance::BalanceOptions;
use forest::config::ForestConfig;
use forest::connectivity::Connectivity;
use forest::data::random_quadrants;
use forest::dim::Dim;
use forest::forest::Forest;

fn main() {
    env_logger::init();

    let num_trees: usize = std::env::var("FOREST_NUM_TREES")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(1);
    let count: usize = std::env::var("FOREST_SEED_COUNT")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(64);
    let max_level: u8 = std::env::var("FOREST_MAX_LEVEL")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(6);

    let dim = Dim::Two;
    let config = ForestConfig::single_rank(dim, 0);
    let connectivity = Connectivity::unconnected(num_trees, dim);
    let mut f = Forest::new(config, connectivity);

    let seeded: Vec<(usize, Vec<_>)> = (0..num_trees).map(|t| (t, random_quadrants(count, max_level, dim))).collect();
    f.seed(seeded);

    log::info!("seeded {} leaves across {num_trees} tree(s)", f.total_leaves());
    f.balance_interiors(BalanceOptions::default());
    log::info!("balanced to {} leaves", f.total_leaves());

    if !f.is_valid() {
        log::error!("forest failed its own invariant check after balancing");
        std::process::exit(1);
    }

    println!("leaves: {}", f.total_leaves());
    println!("checksum: {:#010x}", f.checksum());
}
