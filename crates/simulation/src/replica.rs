//! In-memory replica model answering exchange fetches.

use crate::tree::{FlatTree, SEGMENT_WIDTH};
use converge_core::{FetchRequest, ReplyPayload};
use converge_types::{BranchId, KeyClock, SegmentId, TreeCodec, VersionClock};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;

/// One simulated replica: a key → clock store hashed into a [`FlatTree`].
///
/// Keys map to leaves by content digest, and every leaf digest folds in by
/// XOR, so two replicas holding the same entries produce identical blobs
/// regardless of insertion order, and the blobs of replicas holding disjoint
/// subsets XOR-merge into the blob of their union.
#[derive(Debug, Clone)]
pub struct SimReplica {
    tree: FlatTree,
    keys: BTreeMap<Vec<u8>, VersionClock>,
}

impl SimReplica {
    pub fn new(tree: FlatTree) -> Self {
        Self {
            tree,
            keys: BTreeMap::new(),
        }
    }

    pub fn insert(&mut self, key: impl Into<Vec<u8>>, clock: VersionClock) {
        self.keys.insert(key.into(), clock);
    }

    pub fn remove(&mut self, key: &[u8]) {
        self.keys.remove(key);
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// Leaf a key lives in, in global leaf space.
    fn leaf_for(&self, key: &[u8]) -> u64 {
        let digest = Sha256::digest(key);
        let mut prefix = [0u8; 8];
        prefix.copy_from_slice(&digest[..8]);
        u64::from_be_bytes(prefix) % self.tree.total_leaves()
    }

    /// Content digest of one entry.
    fn entry_digest(key: &[u8], clock: &VersionClock) -> [u8; SEGMENT_WIDTH] {
        let mut hasher = Sha256::new();
        hasher.update(key);
        hasher.update([0u8]);
        hasher.update(&clock.0);
        let digest = hasher.finalize();
        let mut out = [0u8; SEGMENT_WIDTH];
        out.copy_from_slice(&digest[..SEGMENT_WIDTH]);
        out
    }

    /// The root blob: one digest per branch, XOR-folded over its entries.
    pub fn root_blob(&self) -> Vec<u8> {
        let mut blob = vec![0u8; self.tree.branches as usize * SEGMENT_WIDTH];
        for (key, clock) in &self.keys {
            let branch = self.leaf_for(key) / self.tree.leaves_per_branch;
            let window = branch as usize * SEGMENT_WIDTH;
            for (k, byte) in Self::entry_digest(key, clock).iter().enumerate() {
                blob[window + k] ^= byte;
            }
        }
        blob
    }

    /// Branch blobs for the requested branches: one digest per leaf.
    pub fn branch_blobs(&self, ids: &[BranchId]) -> Vec<(BranchId, Vec<u8>)> {
        ids.iter()
            .map(|id| {
                let mut blob = vec![0u8; self.tree.leaves_per_branch as usize * SEGMENT_WIDTH];
                for (key, clock) in &self.keys {
                    let leaf = self.leaf_for(key);
                    if leaf / self.tree.leaves_per_branch != id.0 {
                        continue;
                    }
                    let window = (leaf % self.tree.leaves_per_branch) as usize * SEGMENT_WIDTH;
                    for (k, byte) in Self::entry_digest(key, clock).iter().enumerate() {
                        blob[window + k] ^= byte;
                    }
                }
                (*id, blob)
            })
            .collect()
    }

    /// Key/clock entries stored under the requested segments, sorted.
    pub fn clocks(&self, segments: &[SegmentId]) -> Vec<KeyClock> {
        self.keys
            .iter()
            .filter(|(key, _)| segments.contains(&SegmentId(self.leaf_for(key))))
            .map(|(key, clock)| KeyClock::new(key.clone(), clock.clone()))
            .collect()
    }

    /// Answer one phase request the way a live vnode would.
    pub fn respond(&self, request: &FetchRequest) -> ReplyPayload {
        match request {
            FetchRequest::Root => ReplyPayload::Root(self.root_blob()),
            FetchRequest::Branches(ids) => ReplyPayload::Branches(self.branch_blobs(ids)),
            FetchRequest::Clocks(segments) => ReplyPayload::Clocks(self.clocks(segments)),
        }
    }
}
