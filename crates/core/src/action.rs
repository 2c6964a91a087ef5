//! Action types for the exchange state machine.

use crate::{FetchRequest, Outcome, TimerId};
use converge_types::{Colour, KeyClock};
use std::time::Duration;

/// Actions the state machine wants to perform.
///
/// Actions are **commands** - they describe something to do.
/// The runner executes actions and may convert results back into events.
#[derive(Debug, Clone)]
pub enum Action {
    /// Fan a phase request out to every blue and pink target.
    ///
    /// The runner walks both target lists interleaved, `lead` colour first
    /// at each rank, so neither colour starves on unequal list lengths.
    Dispatch {
        request: FetchRequest,
        lead: Colour,
    },

    /// Set a timer to fire after a duration.
    ///
    /// If a timer with the same ID already exists, it is replaced.
    SetTimer { id: TimerId, duration: Duration },

    /// Cancel a previously set timer.
    CancelTimer { id: TimerId },

    /// Hand the final repair set to the repair action. May be empty.
    EmitRepair { keys: Vec<KeyClock> },

    /// Invoke the reply action with the terminal outcome and stop.
    ///
    /// Always the last action an exchange emits; the runner releases all
    /// exchange resources when it executes this.
    Terminate { outcome: Outcome },
}

impl Action {
    /// Check if this action ends the exchange.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Action::Terminate { .. })
    }

    /// Get the action type name for telemetry.
    pub fn type_name(&self) -> &'static str {
        match self {
            Action::Dispatch { .. } => "Dispatch",
            Action::SetTimer { .. } => "SetTimer",
            Action::CancelTimer { .. } => "CancelTimer",
            Action::EmitRepair { .. } => "EmitRepair",
            Action::Terminate { .. } => "Terminate",
        }
    }
}
