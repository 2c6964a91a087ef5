//! Send capabilities and reply delivery.

use converge_core::{Event, FetchRequest, ReplyPayload};
use converge_types::{Colour, ExchangeId};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::trace;

/// Opaque descriptor of one target vnode.
///
/// Only send capabilities interpret descriptor contents; the engine carries
/// them around untouched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetDescriptor(pub Vec<u8>);

/// Opaque list of target descriptors handed to a send capability.
#[derive(Debug, Clone, Default)]
pub struct Preflist(pub Vec<TargetDescriptor>);

/// A send capability paired with the preflist it serves.
pub type Target = (Arc<dyn SendCapability>, Preflist);

/// One reply slot for a dispatched request.
///
/// Single-shot: each dispatched `(capability, preflist)` pair owes exactly
/// one reply. Deliveries after the exchange terminated land on a closed
/// channel and are dropped.
pub struct ReplySink {
    exchange: ExchangeId,
    colour: Colour,
    events: mpsc::Sender<Event>,
}

impl ReplySink {
    pub(crate) fn new(exchange: ExchangeId, colour: Colour, events: mpsc::Sender<Event>) -> Self {
        Self {
            exchange,
            colour,
            events,
        }
    }

    /// The colour this reply will be accounted to.
    pub fn colour(&self) -> Colour {
        self.colour
    }

    /// Deliver the reply to the exchange.
    pub fn deliver(self, payload: ReplyPayload) {
        let event = Event::ReplyReceived {
            colour: self.colour,
            payload,
        };
        if self.events.try_send(event).is_err() {
            trace!(
                exchange = %self.exchange,
                colour = %self.colour,
                "late reply discarded"
            );
        }
    }
}

/// Delivers one phase request to the targets named by a preflist.
///
/// Implementations must not block the dispatching task; they are expected to
/// eventually call [`ReplySink::deliver`] with the merged result for their
/// preflist. A capability that fails internally simply never delivers, which
/// the exchange observes as a phase deadline.
pub trait SendCapability: Send + Sync {
    fn send(&self, request: FetchRequest, preflist: &Preflist, colour: Colour, replies: ReplySink);
}
