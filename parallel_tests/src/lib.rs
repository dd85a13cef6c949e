//! Real-MPI integration checks for the engines in the `forest` crate.
//!
//! Unit tests inside `forest` itself run against [`forest::comm::LocalWorld`]
//! and [`forest::comm::SimWorld`] so they stay hermetic; this crate instead
//! drives the same engines over an actual `mpi` runtime, across however many
//! ranks the caller launches it with (`mpirun -n 4 parallel_tests`).

pub mod checks;
