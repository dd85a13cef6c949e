use forest::comm::MpiWorld;
use forest::config::ForestConfig;
use forest::dim::Dim;
use mpi::topology::Communicator as MpiCommunicatorTrait;

use parallel_tests::checks;

fn main() {
    env_logger::init();

    let universe = mpi::initialize().expect("failed to initialize MPI");
    let mpi_world = universe.world();
    let rank = mpi_world.rank();
    let nprocs = mpi_world.size();

    let config = ForestConfig::new(Dim::Two, rank, nprocs, 1);
    let world = MpiWorld::new(mpi_world);

    match checks::run(&world, &config) {
        Ok(()) => {
            log::info!("rank {rank}: all checks passed");
        }
        Err(message) => {
            log::error!("rank {rank}: {message}");
            std::process::exit(1);
        }
    }
}
