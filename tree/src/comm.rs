//! Transport abstraction over MPI (§6, ambient stack).
//!
//! Every engine that needs cross-rank communication (partition, border
//! balance's remote candidate exchange) takes a `&dyn Communicator` rather
//! than reaching for `mpi` directly, so unit tests can run single- or
//! multi-rank without an MPI runtime. [`LocalWorld`] is the in-process test
//! double; the real backend lives behind the `mpi` feature.

use crate::error::{ForestError, Result};

/// Point-to-point and collective operations the engines rely on. Byte-slice
/// based rather than generic: quadrants and their opaque payloads are
/// always shipped as flat buffers (§6 wire format), so there's no need for
/// the `mpi` crate's `Equivalence` machinery at this layer.
pub trait Communicator {
    fn rank(&self) -> i32;
    fn nprocs(&self) -> i32;

    /// Every rank contributes `value`; every rank receives every
    /// contribution, ordered by rank.
    fn all_gather(&self, value: u64) -> Result<Vec<u64>>;

    /// Inclusive prefix sum of `value` across ranks.
    fn scan_sum(&self, value: u64) -> Result<u64>;

    /// Rank `root`'s `data` is copied to every rank.
    fn broadcast(&self, root: i32, data: &mut Vec<u8>) -> Result<()>;

    /// Send `data` to `dest`. A zero-length `data` to the same rank as
    /// `self` is always a no-op success.
    fn send(&self, dest: i32, data: &[u8]) -> Result<()>;

    /// Blocking receive from `source`, sized by the sender's message.
    fn receive(&self, source: i32) -> Result<Vec<u8>>;

    fn barrier(&self);
}

/// Single-process stand-in used by every engine unit test. Collectives are
/// trivial identity operations and point-to-point calls to anything but
/// rank 0 itself are rejected -- precisely the single-rank contract
/// [`crate::config::ForestConfig::single_rank`] sets up.
#[derive(Default)]
pub struct LocalWorld;

impl Communicator for LocalWorld {
    fn rank(&self) -> i32 {
        0
    }

    fn nprocs(&self) -> i32 {
        1
    }

    fn all_gather(&self, value: u64) -> Result<Vec<u64>> {
        Ok(vec![value])
    }

    fn scan_sum(&self, value: u64) -> Result<u64> {
        Ok(value)
    }

    fn broadcast(&self, _root: i32, _data: &mut Vec<u8>) -> Result<()> {
        Ok(())
    }

    fn send(&self, dest: i32, data: &[u8]) -> Result<()> {
        if dest != 0 && !data.is_empty() {
            return Err(ForestError::Transport(format!(
                "LocalWorld cannot send to rank {dest}: only a single rank exists"
            )));
        }
        Ok(())
    }

    fn receive(&self, source: i32) -> Result<Vec<u8>> {
        if source != 0 {
            return Err(ForestError::Transport(format!(
                "LocalWorld cannot receive from rank {source}: only a single rank exists"
            )));
        }
        Ok(Vec::new())
    }

    fn barrier(&self) {}
}

/// An in-memory multi-rank simulator: every "rank" is just an index into a
/// shared mailbox vector, useful for exercising partition/border-balance
/// cross-rank logic deterministically without spawning real MPI processes.
pub struct SimWorld {
    rank: i32,
    nprocs: i32,
    mailboxes: std::sync::Arc<std::sync::Mutex<Vec<Vec<(i32, Vec<u8>)>>>>,
}

impl SimWorld {
    /// Build one [`SimWorld`] handle per rank, sharing a mailbox set.
    pub fn fleet(nprocs: i32) -> Vec<SimWorld> {
        let mailboxes = std::sync::Arc::new(std::sync::Mutex::new(vec![Vec::new(); nprocs as usize]));
        (0..nprocs)
            .map(|rank| SimWorld {
                rank,
                nprocs,
                mailboxes: mailboxes.clone(),
            })
            .collect()
    }
}

impl Communicator for SimWorld {
    fn rank(&self) -> i32 {
        self.rank
    }

    fn nprocs(&self) -> i32 {
        self.nprocs
    }

    fn all_gather(&self, _value: u64) -> Result<Vec<u64>> {
        Err(ForestError::Transport(
            "SimWorld does not model collectives; use send/receive directly in tests".into(),
        ))
    }

    fn scan_sum(&self, _value: u64) -> Result<u64> {
        Err(ForestError::Transport(
            "SimWorld does not model collectives; use send/receive directly in tests".into(),
        ))
    }

    fn broadcast(&self, _root: i32, _data: &mut Vec<u8>) -> Result<()> {
        Err(ForestError::Transport(
            "SimWorld does not model collectives; use send/receive directly in tests".into(),
        ))
    }

    fn send(&self, dest: i32, data: &[u8]) -> Result<()> {
        let mut mailboxes = self.mailboxes.lock().expect("mailbox lock poisoned");
        mailboxes[dest as usize].push((self.rank, data.to_vec()));
        Ok(())
    }

    fn receive(&self, source: i32) -> Result<Vec<u8>> {
        let mut mailboxes = self.mailboxes.lock().expect("mailbox lock poisoned");
        let inbox = &mut mailboxes[self.rank as usize];
        let pos = inbox
            .iter()
            .position(|(from, _)| *from == source)
            .ok_or_else(|| ForestError::Transport(format!("no message from rank {source} pending")))?;
        Ok(inbox.remove(pos).1)
    }

    fn barrier(&self) {}
}

/// Real backend over an actual MPI runtime, behind the `mpi` feature.
/// Callers construct this from the `mpi::topology::SystemCommunicator`
/// returned by `mpi::initialize()`'s `Universe::world()`.
#[cfg(feature = "mpi")]
pub struct MpiWorld {
    world: mpi::topology::SystemCommunicator,
}

#[cfg(feature = "mpi")]
impl MpiWorld {
    pub fn new(world: mpi::topology::SystemCommunicator) -> Self {
        MpiWorld { world }
    }
}

#[cfg(feature = "mpi")]
impl Communicator for MpiWorld {
    fn rank(&self) -> i32 {
        use mpi::topology::Communicator as _;
        self.world.rank()
    }

    fn nprocs(&self) -> i32 {
        use mpi::topology::Communicator as _;
        self.world.size()
    }

    fn all_gather(&self, value: u64) -> Result<Vec<u64>> {
        use mpi::topology::Communicator as _;
        use mpi::traits::*;
        let mut out = vec![0u64; self.nprocs() as usize];
        self.world.all_gather_into(&value, &mut out[..]);
        Ok(out)
    }

    fn scan_sum(&self, value: u64) -> Result<u64> {
        use mpi::collective::SystemOperation;
        use mpi::traits::*;
        let mut out = 0u64;
        self.world.scan_into(&value, &mut out, SystemOperation::sum());
        Ok(out)
    }

    fn broadcast(&self, root: i32, data: &mut Vec<u8>) -> Result<()> {
        use mpi::topology::Communicator as _;
        use mpi::traits::*;
        let root_process = self.world.process_at_rank(root);
        let mut len = data.len() as u64;
        root_process.broadcast_into(&mut len);
        if self.rank() != root {
            data.resize(len as usize, 0);
        }
        root_process.broadcast_into(&mut data[..]);
        Ok(())
    }

    fn send(&self, dest: i32, data: &[u8]) -> Result<()> {
        use mpi::point_to_point::Destination;
        use mpi::topology::Communicator as _;
        let dest_process = self.world.process_at_rank(dest);
        dest_process.send(data);
        Ok(())
    }

    fn receive(&self, source: i32) -> Result<Vec<u8>> {
        use mpi::point_to_point::Source;
        use mpi::topology::Communicator as _;
        let source_process = self.world.process_at_rank(source);
        let (data, _status) = source_process.receive_vec::<u8>();
        Ok(data)
    }

    fn barrier(&self) {
        use mpi::topology::Communicator as _;
        self.world.barrier();
    }
}
