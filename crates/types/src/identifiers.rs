//! Identifier newtypes used throughout the exchange engine.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Unique identifier of one exchange run.
///
/// Opaque to everything except the identifier allocator in the runtime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ExchangeId(pub u64);

impl fmt::Display for ExchangeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ex-{}", self.0)
    }
}

/// Tag distinguishing the two replica groups being compared.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Colour {
    Blue,
    Pink,
}

impl Colour {
    /// Both colours, blue first.
    pub const BOTH: [Colour; 2] = [Colour::Blue, Colour::Pink];

    /// The opposite colour.
    pub fn other(self) -> Colour {
        match self {
            Colour::Blue => Colour::Pink,
            Colour::Pink => Colour::Blue,
        }
    }
}

impl fmt::Display for Colour {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Colour::Blue => write!(f, "blue"),
            Colour::Pink => write!(f, "pink"),
        }
    }
}

/// Identifier of one hash-tree branch (a 1 KB region of the tree).
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct BranchId(pub u64);

impl fmt::Display for BranchId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Leaf position within a branch.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct LeafIndex(pub u64);

/// Identifier of one tree leaf.
///
/// Composite of a branch id and a leaf position; produced only by
/// [`TreeCodec::join_segment`](crate::TreeCodec::join_segment).
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct SegmentId(pub u64);

impl fmt::Display for SegmentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn colour_other_flips() {
        assert_eq!(Colour::Blue.other(), Colour::Pink);
        assert_eq!(Colour::Pink.other(), Colour::Blue);
    }

    #[test]
    fn display_formats() {
        assert_eq!(ExchangeId(7).to_string(), "ex-7");
        assert_eq!(Colour::Blue.to_string(), "blue");
        assert_eq!(BranchId(3).to_string(), "3");
    }
}
