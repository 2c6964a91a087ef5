//! Per-colour reply accumulators and the merge kernel.

use converge_core::ReplyPayload;
use converge_types::{BranchId, KeyClock, TreeCodec};

/// Which accumulator shape a phase collects.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccKind {
    Root,
    Branches,
    Clocks,
}

/// Accumulated replies for one colour in the current phase.
///
/// The variant is fixed at phase entry, so a reply's payload is statically
/// paired with the merge that consumes it. Merges are associative and
/// commutative: the final content is independent of reply arrival order.
#[derive(Debug, Clone)]
pub enum Acc {
    /// Merged tree roots. Empty blob until the first reply.
    Root(Vec<u8>),
    /// Branch blobs merged per branch id. Order within is unspecified.
    Branches(Vec<(BranchId, Vec<u8>)>),
    /// Sorted, de-duplicated key/clock entries.
    Clocks(Vec<KeyClock>),
}

impl Acc {
    /// The empty accumulator of the given shape.
    pub fn empty(kind: AccKind) -> Acc {
        match kind {
            AccKind::Root => Acc::Root(Vec::new()),
            AccKind::Branches => Acc::Branches(Vec::new()),
            AccKind::Clocks => Acc::Clocks(Vec::new()),
        }
    }

    pub fn kind(&self) -> AccKind {
        match self {
            Acc::Root(_) => AccKind::Root,
            Acc::Branches(_) => AccKind::Branches,
            Acc::Clocks(_) => AccKind::Clocks,
        }
    }

    /// Merge one reply into the accumulator.
    ///
    /// Returns false, leaving the accumulator untouched, when the payload
    /// shape does not match this phase's accumulator (a malformed reply).
    pub fn merge(&mut self, payload: ReplyPayload, tree: &dyn TreeCodec) -> bool {
        match (self, payload) {
            (Acc::Root(acc), ReplyPayload::Root(blob)) => {
                *acc = tree.merge(acc, &blob);
                true
            }
            (Acc::Branches(acc), ReplyPayload::Branches(entries)) => {
                for (id, blob) in entries {
                    merge_branch(acc, id, blob, tree);
                }
                true
            }
            (Acc::Clocks(acc), ReplyPayload::Clocks(batch)) => {
                *acc = merge_clocks(acc, batch);
                true
            }
            _ => false,
        }
    }

    /// The merged root blob; empty for other shapes.
    pub fn as_root(&self) -> &[u8] {
        match self {
            Acc::Root(blob) => blob,
            _ => &[],
        }
    }

    /// The merged branch entries; empty for other shapes.
    pub fn as_branches(&self) -> &[(BranchId, Vec<u8>)] {
        match self {
            Acc::Branches(entries) => entries,
            _ => &[],
        }
    }

    /// The merged clock entries; empty for other shapes.
    pub fn as_clocks(&self) -> &[KeyClock] {
        match self {
            Acc::Clocks(entries) => entries,
            _ => &[],
        }
    }
}

/// Fold one `(branch, blob)` entry into the accumulator: append when the
/// branch is new, tree-merge with the existing blob otherwise.
fn merge_branch(
    acc: &mut Vec<(BranchId, Vec<u8>)>,
    id: BranchId,
    blob: Vec<u8>,
    tree: &dyn TreeCodec,
) {
    match acc.iter_mut().find(|(existing, _)| *existing == id) {
        Some((_, existing)) => *existing = tree.merge(&blob, existing),
        None => acc.push((id, blob)),
    }
}

/// Order-preserving merge of a reply batch into a sorted-unique accumulator.
///
/// The batch is sorted and de-duplicated first; the result is sorted and
/// unique by complete `(key, clock)` value.
pub fn merge_clocks(acc: &[KeyClock], mut batch: Vec<KeyClock>) -> Vec<KeyClock> {
    batch.sort();
    batch.dedup();

    let mut out = Vec::with_capacity(acc.len() + batch.len());
    let (mut i, mut j) = (0, 0);
    while i < acc.len() && j < batch.len() {
        match acc[i].cmp(&batch[j]) {
            std::cmp::Ordering::Less => {
                out.push(acc[i].clone());
                i += 1;
            }
            std::cmp::Ordering::Greater => {
                out.push(batch[j].clone());
                j += 1;
            }
            std::cmp::Ordering::Equal => {
                out.push(acc[i].clone());
                i += 1;
                j += 1;
            }
        }
    }
    out.extend_from_slice(&acc[i..]);
    out.extend(batch.drain(j..));
    out
}
