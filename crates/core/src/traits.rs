//! State machine traits.

use crate::{Action, Event};
use std::time::Duration;

/// A synchronous, deterministic state machine: events in, actions out.
///
/// Implementations mutate internal state but perform no I/O. Runners call
/// `set_time` before every `handle` so deadline arithmetic sees a consistent
/// clock, execute the returned actions, and feed their results back as
/// events.
pub trait StateMachine {
    /// Process one event and return the actions it produced.
    fn handle(&mut self, event: Event) -> Vec<Action>;

    /// Update the machine's notion of "now".
    fn set_time(&mut self, now: Duration);

    /// The machine's current notion of "now".
    fn now(&self) -> Duration;
}
