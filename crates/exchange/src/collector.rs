//! Reply collection with per-colour progress tracking.

use crate::accumulator::{Acc, AccKind};
use converge_core::ReplyPayload;
use converge_types::{Colour, TreeCodec};

/// Reply progress for one colour.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Progress {
    pub received: usize,
    pub expected: usize,
}

impl Progress {
    fn is_complete(&self) -> bool {
        self.received == self.expected
    }

    fn missing(&self) -> usize {
        self.expected - self.received
    }
}

/// Outcome of absorbing one reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Absorb {
    /// Merged into the colour's accumulator.
    Merged,
    /// Payload shape did not match the phase accumulator; dropped.
    Malformed,
    /// The colour already received every expected reply; dropped.
    Surplus,
}

#[derive(Debug)]
struct Side {
    acc: Acc,
    progress: Progress,
}

impl Side {
    fn new(kind: AccKind, expected: usize) -> Self {
        Side {
            acc: Acc::empty(kind),
            progress: Progress {
                received: 0,
                expected,
            },
        }
    }
}

/// Accumulates replies from both colours for the current phase.
///
/// Holds the `received ≤ expected` invariant for each colour: surplus and
/// malformed replies are reported but never counted or merged.
#[derive(Debug)]
pub struct Collector {
    blue: Side,
    pink: Side,
}

impl Collector {
    pub fn new(kind: AccKind, blue_expected: usize, pink_expected: usize) -> Self {
        Collector {
            blue: Side::new(kind, blue_expected),
            pink: Side::new(kind, pink_expected),
        }
    }

    /// Re-arm both colours for a new phase: fresh accumulators, zeroed
    /// counters.
    pub fn reset(&mut self, kind: AccKind, blue_expected: usize, pink_expected: usize) {
        self.blue = Side::new(kind, blue_expected);
        self.pink = Side::new(kind, pink_expected);
    }

    /// Absorb one reply for the given colour.
    pub fn absorb(
        &mut self,
        colour: Colour,
        payload: ReplyPayload,
        tree: &dyn TreeCodec,
    ) -> Absorb {
        let side = self.side_mut(colour);
        if side.progress.is_complete() {
            return Absorb::Surplus;
        }
        if !side.acc.merge(payload, tree) {
            return Absorb::Malformed;
        }
        side.progress.received += 1;
        Absorb::Merged
    }

    /// Whether both colours received every expected reply.
    pub fn is_complete(&self) -> bool {
        self.blue.progress.is_complete() && self.pink.progress.is_complete()
    }

    /// Replies still outstanding across both colours.
    pub fn missing(&self) -> usize {
        self.blue.progress.missing() + self.pink.progress.missing()
    }

    pub fn progress(&self, colour: Colour) -> Progress {
        self.side(colour).progress
    }

    pub fn acc(&self, colour: Colour) -> &Acc {
        &self.side(colour).acc
    }

    fn side(&self, colour: Colour) -> &Side {
        match colour {
            Colour::Blue => &self.blue,
            Colour::Pink => &self.pink,
        }
    }

    fn side_mut(&mut self, colour: Colour) -> &mut Side {
        match colour {
            Colour::Blue => &mut self.blue,
            Colour::Pink => &mut self.pink,
        }
    }
}
