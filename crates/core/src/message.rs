//! Phase request and reply payload types.
//!
//! A reply's shape depends on the phase that requested it, so requests and
//! payloads are parallel sums: send capabilities answer `Root` with `Root`,
//! `Branches` with `Branches`, `Clocks` with `Clocks`. The accumulator in
//! the exchange crate pairs each variant with its merge statically.

use converge_types::{BranchId, KeyClock, SegmentId};
use serde::{Deserialize, Serialize};

/// The three phase requests an exchange fans out.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum FetchRequest {
    /// Fetch the merged tree root of the targets in the preflist.
    Root,
    /// Fetch the branch blobs for the given branch ids.
    Branches(Vec<BranchId>),
    /// Fetch the key/clock entries stored under the given segments.
    Clocks(Vec<SegmentId>),
}

impl FetchRequest {
    /// Get the request type name for telemetry.
    pub fn type_name(&self) -> &'static str {
        match self {
            FetchRequest::Root => "fetch_root",
            FetchRequest::Branches(_) => "fetch_branches",
            FetchRequest::Clocks(_) => "fetch_clocks",
        }
    }
}

/// Reply payload for one target's answer to a [`FetchRequest`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReplyPayload {
    /// Opaque tree-root blob.
    Root(Vec<u8>),
    /// Branch blobs keyed by branch id.
    Branches(Vec<(BranchId, Vec<u8>)>),
    /// Key/clock entries.
    Clocks(Vec<KeyClock>),
}

impl ReplyPayload {
    /// Get the payload type name for telemetry.
    pub fn type_name(&self) -> &'static str {
        match self {
            ReplyPayload::Root(_) => "root",
            ReplyPayload::Branches(_) => "branches",
            ReplyPayload::Clocks(_) => "clocks",
        }
    }
}
