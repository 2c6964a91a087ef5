//! Foundational types for the converge exchange engine.
//!
//! This crate provides the types shared by every other layer:
//!
//! - **Identifiers**: [`ExchangeId`], [`Colour`], [`BranchId`], [`LeafIndex`],
//!   [`SegmentId`]
//! - **Clocks**: opaque version clocks and keyed clock entries
//! - **Tree capability**: the [`TreeCodec`] trait onto the external hash-tree
//!   library
//!
//! # Design Philosophy
//!
//! This crate is self-contained with minimal dependencies. It does not depend
//! on any other workspace crates, making it the foundation layer.

mod clock;
mod identifiers;
mod tree;

pub use clock::{KeyClock, VersionClock};
pub use identifiers::{BranchId, Colour, ExchangeId, LeafIndex, SegmentId};
pub use tree::TreeCodec;
