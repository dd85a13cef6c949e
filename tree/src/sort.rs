//! Generic byte-buffer all-to-all exchange, the wire-level primitive the
//! partition engine builds on.
//!
//! Each rank sends a (possibly empty) buffer to every other rank and
//! receives one back from each; unlike MPI's own `all_to_allv`, ranks here
//! don't need to agree on counts up front since [`Communicator::send`] and
//! [`Communicator::receive`] already carry their own length.

use crate::comm::Communicator;
use crate::error::Result;

/// `send_to[r]` is the buffer destined for rank `r` (including, trivially,
/// `send_to[self.rank()]`). Returns `received[r]` = what rank `r` sent us.
pub fn all_to_all_v(world: &dyn Communicator, send_to: &[Vec<u8>]) -> Result<Vec<Vec<u8>>> {
    let nprocs = world.nprocs() as usize;
    debug_assert_eq!(send_to.len(), nprocs, "send_to must have one entry per rank");

    let rank = world.rank();
    for (dest, buf) in send_to.iter().enumerate() {
        if dest as i32 != rank {
            world.send(dest as i32, buf)?;
        }
    }

    let mut received = vec![Vec::new(); nprocs];
    for source in 0..nprocs as i32 {
        received[source as usize] = if source == rank {
            send_to[rank as usize].clone()
        } else {
            world.receive(source)?
        };
    }
    Ok(received)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::comm::SimWorld;

    #[test]
    fn all_to_all_v_delivers_every_pairwise_buffer() {
        let fleet = SimWorld::fleet(3);
        let results: Vec<_> = (0..3)
            .map(|rank| {
                let send_to: Vec<Vec<u8>> = (0..3).map(|dest| vec![rank as u8, dest as u8]).collect();
                (rank, send_to)
            })
            .collect();

        // ranks must send before any receives, so run all sends first
        for (rank, send_to) in &results {
            let world = &fleet[*rank as usize];
            for (dest, buf) in send_to.iter().enumerate() {
                if dest as i32 != world.rank() {
                    world.send(dest as i32, buf).unwrap();
                }
            }
        }

        for (rank, send_to) in &results {
            let world = &fleet[*rank as usize];
            let mut received = vec![Vec::new(); 3];
            for source in 0..3i32 {
                received[source as usize] = if source == world.rank() {
                    send_to[world.rank() as usize].clone()
                } else {
                    world.receive(source).unwrap()
                };
            }
            for source in 0..3u8 {
                assert_eq!(received[source as usize], vec![source, *rank as u8]);
            }
        }
    }

    #[test]
    fn single_rank_all_to_all_v_is_identity() {
        let fleet = SimWorld::fleet(1);
        let send_to = vec![vec![1, 2, 3]];
        let received = all_to_all_v(&fleet[0], &send_to).unwrap();
        assert_eq!(received, send_to);
    }
}
