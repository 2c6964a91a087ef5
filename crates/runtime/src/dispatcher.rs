//! Phase request fan-out.

use crate::capability::{ReplySink, Target};
use converge_core::{Event, FetchRequest};
use converge_types::{Colour, ExchangeId};
use tokio::sync::mpsc;

/// Fan `request` out to every blue and pink target.
///
/// Targets are walked by rank with the lead colour first at each rank, so
/// neither colour waits for the whole of the other when list lengths differ.
/// Relative order within one colour is not part of the contract.
pub fn dispatch(
    exchange: ExchangeId,
    request: &FetchRequest,
    blue: &[Target],
    pink: &[Target],
    lead: Colour,
    events: &mpsc::Sender<Event>,
) {
    for rank in 0..blue.len().max(pink.len()) {
        for colour in [lead, lead.other()] {
            let targets = match colour {
                Colour::Blue => blue,
                Colour::Pink => pink,
            };
            if let Some((capability, preflist)) = targets.get(rank) {
                let sink = ReplySink::new(exchange, colour, events.clone());
                capability.send(request.clone(), preflist, colour, sink);
            }
        }
    }
}
