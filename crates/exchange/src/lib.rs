//! The anti-entropy exchange state machine.
//!
//! An exchange reconciles two replica groups ("blue" and "pink") of a
//! key-value dataset by comparing hash-tree summaries at progressively finer
//! granularity: tree roots, then the branches the roots disagree on, then
//! the key/clock entries under the segments the branches disagree on. The
//! final symmetric difference of clock entries is handed to an external
//! repair mechanism.
//!
//! Every comparison runs twice, separated by a jittered pause, and only the
//! intersection of the two observations moves forward. A difference caused
//! by a write that was in flight during the first observation has usually
//! converged by the second, so the intersection suppresses false positives.
//!
//! The machine itself is synchronous and deterministic
//! ([`ExchangeState`] implements [`converge_core::StateMachine`]); runners
//! own all timers, fan-out, and callback invocation.

mod accumulator;
mod collector;
mod compare;
mod config;
mod select;
mod state;

pub use accumulator::{merge_clocks, Acc, AccKind};
pub use collector::{Absorb, Collector, Progress};
pub use compare::{compare_branches, compare_clocks, compare_roots};
pub use config::ExchangeConfig;
pub use select::{intersect, select, RawId};
pub use state::{ExchangeState, Phase};
