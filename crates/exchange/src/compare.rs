//! Pairwise comparison of accumulated replies.

use converge_types::{BranchId, KeyClock, LeafIndex, SegmentId, TreeCodec};

/// Branch ids whose segments differ between two merged root blobs.
///
/// Ascending, as delivered by the tree's dirty-segment finder.
pub fn compare_roots(tree: &dyn TreeCodec, blue: &[u8], pink: &[u8]) -> Vec<BranchId> {
    tree.dirty_segments(blue, pink)
        .into_iter()
        .map(BranchId)
        .collect()
}

/// Segment ids that differ between paired branch blobs.
///
/// Entries pair by branch id; a branch present on only one side contributes
/// nothing. Result is sorted ascending.
pub fn compare_branches(
    tree: &dyn TreeCodec,
    blue: &[(BranchId, Vec<u8>)],
    pink: &[(BranchId, Vec<u8>)],
) -> Vec<SegmentId> {
    let mut out = Vec::new();
    for (id, blue_blob) in blue {
        let Some((_, pink_blob)) = pink.iter().find(|(pink_id, _)| pink_id == id) else {
            continue;
        };
        for leaf in tree.dirty_segments(blue_blob, pink_blob) {
            out.push(tree.join_segment(*id, LeafIndex(leaf)));
        }
    }
    out.sort_unstable();
    out
}

/// Symmetric difference of two sorted-unique clock lists.
///
/// Entries present in exactly one list, compared by complete tuple value;
/// the result is sorted and unique.
pub fn compare_clocks(blue: &[KeyClock], pink: &[KeyClock]) -> Vec<KeyClock> {
    let mut out = Vec::new();
    let (mut i, mut j) = (0, 0);
    while i < blue.len() && j < pink.len() {
        match blue[i].cmp(&pink[j]) {
            std::cmp::Ordering::Less => {
                out.push(blue[i].clone());
                i += 1;
            }
            std::cmp::Ordering::Greater => {
                out.push(pink[j].clone());
                j += 1;
            }
            std::cmp::Ordering::Equal => {
                i += 1;
                j += 1;
            }
        }
    }
    out.extend_from_slice(&blue[i..]);
    out.extend_from_slice(&pink[j..]);
    out
}
