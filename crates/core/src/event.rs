//! Event types for the exchange state machine.

use crate::ReplyPayload;
use converge_types::Colour;

/// All possible events an exchange can receive.
///
/// Events are **passive data** - they describe something that happened.
/// The state machine processes events and returns actions.
#[derive(Debug, Clone)]
pub enum Event {
    /// The jittered pause before the next phase elapsed.
    PauseElapsed,

    /// The current phase's reply deadline elapsed.
    DeadlineElapsed,

    /// One target of the given colour replied to the outstanding request.
    ReplyReceived { colour: Colour, payload: ReplyPayload },
}

impl Event {
    /// Get the event type name for telemetry.
    pub fn type_name(&self) -> &'static str {
        match self {
            Event::PauseElapsed => "PauseElapsed",
            Event::DeadlineElapsed => "DeadlineElapsed",
            Event::ReplyReceived { .. } => "ReplyReceived",
        }
    }
}
