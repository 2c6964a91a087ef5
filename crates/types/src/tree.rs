//! Capability interface onto the external hash-tree library.

use crate::{BranchId, LeafIndex, SegmentId};

/// Operations the exchange engine needs from a hash-tree implementation.
///
/// Blobs are opaque: the engine only merges them and asks where two merged
/// blobs disagree. Implementations must keep `merge` associative and
/// commutative with the empty blob as identity, so accumulator contents are
/// independent of reply arrival order, and must return `dirty_segments`
/// indices in ascending order.
pub trait TreeCodec: Send + Sync {
    /// Merge an incoming blob into an accumulated one.
    fn merge(&self, acc: &[u8], incoming: &[u8]) -> Vec<u8>;

    /// Indices of segments that differ between two blobs, ascending.
    fn dirty_segments(&self, ours: &[u8], theirs: &[u8]) -> Vec<u64>;

    /// Combine a branch id with a leaf position into a segment id.
    fn join_segment(&self, branch: BranchId, leaf: LeafIndex) -> SegmentId;
}
