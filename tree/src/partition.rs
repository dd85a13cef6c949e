//! The partition engine (§4.7): redistribute a forest's leaves across
//! ranks to match a target weight distribution, via a global prefix-sum
//! scan and a single all-to-all shipment of quadrants plus their payloads.
//!
//! The wire format is tree-major: a small header names the contiguous
//! range of tree ids present in a shipment and how many leaves belong to
//! each, followed by every leaf's coordinate record in tree order, followed
//! by every leaf's payload blob in the same order. Tree-major ordering
//! matters because two different trees' quadrants can collide numerically
//! (each tree owns its own `[0, ROOT_LEN)^D` box), so leaves must be kept
//! grouped by tree before they're Morton-sorted within it.

use crate::comm::Communicator;
use crate::config::ForestConfig;
use crate::connectivity::TreeId;
use crate::error::{ForestError, Result};
use crate::morton::Quadrant;
use crate::sort::all_to_all_v;

/// A leaf plus the tree it belongs to and its opaque, fixed-size user
/// payload -- the unit the partition engine ships between ranks.
#[derive(Clone, Debug, PartialEq)]
pub struct Leaf {
    pub tree: TreeId,
    pub quadrant: Quadrant,
    pub payload: Vec<u8>,
}

/// Compute this rank's half-open `[start, end)` range of global leaf
/// indices under a target distribution given by `new_counts` (one entry
/// per rank, summing to the forest's total leaf count).
pub fn target_range(rank: i32, new_counts: &[u64]) -> (u64, u64) {
    let start: u64 = new_counts[..rank as usize].iter().sum();
    let end = start + new_counts[rank as usize];
    (start, end)
}

/// Redistribute `local_leaves` (this rank's current leaves, in global
/// tree-major order, contiguous with every other rank's) to match
/// `new_counts`. `global_offset` is this rank's current leaves' starting
/// global index (the sum of every earlier rank's leaf count), obtained
/// via [`Communicator::scan_sum`] by the caller.
///
/// Returns this rank's leaves under the new distribution, tree-major and
/// Morton-sorted within each tree.
pub fn partition_given(
    world: &dyn Communicator,
    config: &ForestConfig,
    local_leaves: &[Leaf],
    global_offset: u64,
    new_counts: &[u64],
) -> Result<Vec<Leaf>> {
    let total: u64 = new_counts.iter().sum();
    let current_total = world.all_gather(local_leaves.len() as u64)?.iter().sum::<u64>();
    if total != current_total {
        return Err(ForestError::PartitionCountMismatch {
            expected: current_total,
            found: total,
        });
    }
    for leaf in local_leaves {
        if leaf.payload.len() != config.data_size {
            return Err(ForestError::PayloadSizeMismatch {
                expected: config.data_size,
                found: leaf.payload.len(),
            });
        }
    }

    let nprocs = world.nprocs() as usize;
    let mut send_to: Vec<Vec<Leaf>> = vec![Vec::new(); nprocs];
    for (i, leaf) in local_leaves.iter().enumerate() {
        let global_index = global_offset + i as u64;
        let dest = owning_rank(global_index, new_counts);
        send_to[dest as usize].push(leaf.clone());
    }

    let encoded: Vec<Vec<u8>> = send_to.iter().map(|leaves| encode_leaves(leaves, config.data_size)).collect();
    let received = all_to_all_v(world, &encoded)?;

    let mut result: Vec<Leaf> = received
        .into_iter()
        .flat_map(|buf| decode_leaves(&buf, config.data_size))
        .collect();
    result.sort_by(|a, b| a.tree.cmp(&b.tree).then_with(|| crate::morton::compare(&a.quadrant, &b.quadrant, config.dim)));
    Ok(result)
}

/// Which rank owns global leaf index `index` under `new_counts`.
fn owning_rank(index: u64, new_counts: &[u64]) -> i32 {
    let mut cumulative = 0u64;
    for (rank, &count) in new_counts.iter().enumerate() {
        cumulative += count;
        if index < cumulative {
            return rank as i32;
        }
    }
    (new_counts.len() - 1) as i32
}

/// Nudge a target partition count table so no tree-root family (the
/// `num_children` siblings produced by one coarsening step) is split
/// across ranks: if a boundary would fall strictly inside a family, the
/// boundary slides to the family's start. Supplements the raw prefix-sum
/// split with the family-alignment rule the original implementation's
/// wrapper layer applies before shipping quadrants.
pub fn partition_correction(new_counts: &mut [u64], family_boundaries: &[u64]) {
    let mut cumulative = 0u64;
    for count in new_counts.iter_mut() {
        let mut boundary = cumulative + *count;
        if let Some(&aligned) = family_boundaries.iter().filter(|&&b| b <= boundary).max() {
            if aligned != boundary && aligned > cumulative {
                boundary = aligned;
            }
        }
        *count = boundary - cumulative;
        cumulative = boundary;
    }
}

fn encode_leaves(leaves: &[Leaf], data_size: usize) -> Vec<u8> {
    if leaves.is_empty() {
        let mut out = Vec::with_capacity(16);
        out.extend_from_slice(&0u64.to_le_bytes()); // first_tree
        out.extend_from_slice(&0u64.to_le_bytes()); // num_send_trees
        return out;
    }

    let first_tree = leaves.iter().map(|l| l.tree).min().unwrap();
    let last_tree = leaves.iter().map(|l| l.tree).max().unwrap();
    let num_send_trees = last_tree - first_tree + 1;

    let mut counts = vec![0u64; num_send_trees];
    for leaf in leaves {
        counts[leaf.tree - first_tree] += 1;
    }

    let mut ordered: Vec<&Leaf> = leaves.iter().collect();
    ordered.sort_by_key(|l| l.tree);

    let mut out = Vec::with_capacity(16 + num_send_trees * 8 + leaves.len() * (25 + data_size));
    out.extend_from_slice(&(first_tree as u64).to_le_bytes());
    out.extend_from_slice(&(num_send_trees as u64).to_le_bytes());
    for count in &counts {
        out.extend_from_slice(&count.to_le_bytes());
    }
    for leaf in &ordered {
        out.extend_from_slice(&leaf.quadrant.x.to_le_bytes());
        out.extend_from_slice(&leaf.quadrant.y.to_le_bytes());
        out.extend_from_slice(&leaf.quadrant.z.to_le_bytes());
        out.push(leaf.quadrant.level);
    }
    for leaf in &ordered {
        debug_assert_eq!(leaf.payload.len(), data_size);
        out.extend_from_slice(&leaf.payload);
    }
    out
}

fn decode_leaves(buf: &[u8], data_size: usize) -> Vec<Leaf> {
    if buf.is_empty() {
        return Vec::new();
    }
    let first_tree = u64::from_le_bytes(buf[0..8].try_into().unwrap()) as TreeId;
    let num_send_trees = u64::from_le_bytes(buf[8..16].try_into().unwrap()) as usize;
    if num_send_trees == 0 {
        return Vec::new();
    }

    let counts_start = 16;
    let counts_end = counts_start + num_send_trees * 8;
    let counts: Vec<u64> = buf[counts_start..counts_end]
        .chunks_exact(8)
        .map(|c| u64::from_le_bytes(c.try_into().unwrap()))
        .collect();

    let mut tree_ids = Vec::new();
    for (i, &count) in counts.iter().enumerate() {
        tree_ids.extend(std::iter::repeat(first_tree + i).take(count as usize));
    }

    let record_stride = 8 * 3 + 1;
    let records_start = counts_end;
    let records_end = records_start + tree_ids.len() * record_stride;
    let payload_start = records_end;

    buf[records_start..records_end]
        .chunks_exact(record_stride)
        .zip(tree_ids.into_iter())
        .enumerate()
        .map(|(i, (chunk, tree))| {
            let x = i64::from_le_bytes(chunk[0..8].try_into().unwrap());
            let y = i64::from_le_bytes(chunk[8..16].try_into().unwrap());
            let z = i64::from_le_bytes(chunk[16..24].try_into().unwrap());
            let level = chunk[24];
            let payload_offset = payload_start + i * data_size;
            let payload = buf[payload_offset..payload_offset + data_size].to_vec();
            Leaf {
                tree,
                quadrant: Quadrant::new(x, y, z, level),
                payload,
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::comm::SimWorld;
    use crate::dim::Dim;

    fn leaf(level: u8, tag: u8) -> Leaf {
        Leaf {
            tree: 0,
            quadrant: Quadrant::new(0, 0, 0, level),
            payload: vec![tag],
        }
    }

    #[test]
    fn owning_rank_respects_counts() {
        let counts = vec![2, 3, 1];
        assert_eq!(owning_rank(0, &counts), 0);
        assert_eq!(owning_rank(1, &counts), 0);
        assert_eq!(owning_rank(2, &counts), 1);
        assert_eq!(owning_rank(4, &counts), 1);
        assert_eq!(owning_rank(5, &counts), 2);
    }

    #[test]
    fn partition_correction_aligns_to_family_boundary() {
        let mut counts = vec![3, 3];
        let families = vec![0, 4, 8];
        partition_correction(&mut counts, &families);
        assert_eq!(counts[0], 4);
        assert_eq!(counts[1], 2);
    }

    #[test]
    fn single_rank_partition_round_trips() {
        let fleet = SimWorld::fleet(1);
        let config = ForestConfig::single_rank(Dim::Two, 1);
        let leaves = vec![leaf(1, 1), leaf(1, 2)];
        let counts = vec![2];
        let result = partition_given(&fleet[0], &config, &leaves, 0, &counts).unwrap();
        assert_eq!(result.len(), 2);
    }

    #[test]
    fn rejects_mismatched_total_counts() {
        let fleet = SimWorld::fleet(1);
        let config = ForestConfig::single_rank(Dim::Two, 1);
        let leaves = vec![leaf(1, 1)];
        let counts = vec![5];
        let err = partition_given(&fleet[0], &config, &leaves, 0, &counts).unwrap_err();
        assert!(matches!(err, ForestError::PartitionCountMismatch { .. }));
    }

    #[test]
    fn wire_format_preserves_tree_identity_across_multiple_trees() {
        let leaves = vec![
            Leaf { tree: 2, quadrant: Quadrant::new(0, 0, 0, 1), payload: vec![9] },
            Leaf { tree: 0, quadrant: Quadrant::new(0, 0, 0, 1), payload: vec![1] },
            Leaf { tree: 1, quadrant: Quadrant::new(0, 0, 0, 1), payload: vec![5] },
        ];
        let encoded = encode_leaves(&leaves, 1);
        let mut decoded = decode_leaves(&encoded, 1);
        decoded.sort_by_key(|l| l.tree);
        assert_eq!(decoded.len(), 3);
        assert_eq!(decoded[0].tree, 0);
        assert_eq!(decoded[0].payload, vec![1]);
        assert_eq!(decoded[1].tree, 1);
        assert_eq!(decoded[1].payload, vec![5]);
        assert_eq!(decoded[2].tree, 2);
        assert_eq!(decoded[2].payload, vec![9]);
    }

    #[test]
    fn empty_leaf_set_round_trips_through_the_wire_format() {
        let encoded = encode_leaves(&[], 4);
        assert!(decode_leaves(&encoded, 4).is_empty());
    }
}
