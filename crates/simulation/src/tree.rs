//! Reference hash-tree codec used by simulated replicas.

use converge_types::{BranchId, LeafIndex, SegmentId, TreeCodec};

/// Width of one segment digest in a blob, in bytes.
pub const SEGMENT_WIDTH: usize = 8;

/// Dense fixed-shape tree codec.
///
/// A root blob is `branches` digests of [`SEGMENT_WIDTH`] bytes; a branch
/// blob is `leaves_per_branch` digests. Merging is bytewise XOR, so merge
/// order never matters and the empty blob is the identity. Missing bytes
/// compare as zero, which lets partially-covering replicas merge cleanly.
#[derive(Debug, Clone)]
pub struct FlatTree {
    pub branches: u64,
    pub leaves_per_branch: u64,
}

impl FlatTree {
    pub fn new(branches: u64, leaves_per_branch: u64) -> Self {
        Self {
            branches,
            leaves_per_branch,
        }
    }

    pub fn total_leaves(&self) -> u64 {
        self.branches * self.leaves_per_branch
    }
}

impl TreeCodec for FlatTree {
    fn merge(&self, acc: &[u8], incoming: &[u8]) -> Vec<u8> {
        let mut out = vec![0u8; acc.len().max(incoming.len())];
        out[..acc.len()].copy_from_slice(acc);
        for (byte, inc) in out.iter_mut().zip(incoming) {
            *byte ^= inc;
        }
        out
    }

    fn dirty_segments(&self, ours: &[u8], theirs: &[u8]) -> Vec<u64> {
        let at = |blob: &[u8], k: usize| blob.get(k).copied().unwrap_or(0);
        let windows = ours.len().max(theirs.len()).div_ceil(SEGMENT_WIDTH);
        (0..windows as u64)
            .filter(|segment| {
                let start = *segment as usize * SEGMENT_WIDTH;
                (start..start + SEGMENT_WIDTH).any(|k| at(ours, k) != at(theirs, k))
            })
            .collect()
    }

    fn join_segment(&self, branch: BranchId, leaf: LeafIndex) -> SegmentId {
        SegmentId(branch.0 * self.leaves_per_branch + leaf.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn merge_with_empty_is_identity() {
        let tree = FlatTree::new(4, 4);
        let blob = vec![1u8, 2, 3, 4];
        assert_eq!(tree.merge(&[], &blob), blob);
        assert_eq!(tree.merge(&blob, &[]), blob);
    }

    #[test]
    fn merge_is_commutative() {
        let tree = FlatTree::new(4, 4);
        let a = vec![0x0fu8; 8];
        let b = vec![0xf0u8; 16];
        assert_eq!(tree.merge(&a, &b), tree.merge(&b, &a));
    }

    #[test]
    fn dirty_segments_are_ascending_window_indices() {
        let tree = FlatTree::new(4, 4);
        let mut ours = vec![0u8; 32];
        let theirs = vec![0u8; 32];
        ours[0] = 1; // segment 0
        ours[25] = 1; // segment 3
        assert_eq!(tree.dirty_segments(&ours, &theirs), vec![0, 3]);
    }

    #[test]
    fn short_blobs_compare_as_zero_padded() {
        let tree = FlatTree::new(4, 4);
        let ours = vec![0u8; 8];
        let theirs = vec![0u8; 16];
        assert!(tree.dirty_segments(&ours, &theirs).is_empty());
    }

    #[test]
    fn join_segment_is_branch_major() {
        let tree = FlatTree::new(4, 8);
        assert_eq!(
            tree.join_segment(BranchId(2), LeafIndex(3)),
            SegmentId(19)
        );
    }
}
