//! Timer management for the exchange runtime.
//!
//! Timers are spawned as tokio tasks and can be cancelled. Each fires at
//! most once, sending its event on the exchange's channel.

use converge_core::{Event, TimerId};
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::trace;

/// Convert a TimerId to the corresponding Event.
fn timer_event(id: TimerId) -> Event {
    match id {
        TimerId::Pause => Event::PauseElapsed,
        TimerId::Deadline => Event::DeadlineElapsed,
    }
}

/// Manages the timers of one exchange.
///
/// Each timer is a tokio task that sleeps for the specified duration and
/// then sends the matching timer event to the event channel.
pub struct TimerManager {
    /// Active timers (id -> task handle).
    timers: HashMap<TimerId, JoinHandle<()>>,
    /// Event sender for timer fires.
    events: mpsc::Sender<Event>,
}

impl TimerManager {
    pub fn new(events: mpsc::Sender<Event>) -> Self {
        Self {
            timers: HashMap::new(),
            events,
        }
    }

    /// Set a timer that will fire after the given duration.
    ///
    /// If a timer with the same ID already exists, it is cancelled first.
    pub fn set_timer(&mut self, id: TimerId, duration: Duration) {
        self.cancel_timer(id);

        let events = self.events.clone();
        let handle = tokio::spawn(async move {
            tokio::time::sleep(duration).await;
            if events.send(timer_event(id)).await.is_err() {
                trace!(?id, "timer fired after exchange ended");
            }
        });

        self.timers.insert(id, handle);
        trace!(?id, ?duration, "timer set");
    }

    /// Cancel a timer.
    ///
    /// If the timer doesn't exist or has already fired, this is a no-op.
    pub fn cancel_timer(&mut self, id: TimerId) {
        if let Some(handle) = self.timers.remove(&id) {
            handle.abort();
            trace!(?id, "timer cancelled");
        }
    }

    /// Cancel all timers. Called when the exchange terminates.
    pub fn cancel_all(&mut self) {
        for (_, handle) in self.timers.drain() {
            handle.abort();
        }
    }

    /// Get the number of active timers.
    pub fn active_count(&self) -> usize {
        self.timers.len()
    }
}

impl Drop for TimerManager {
    fn drop(&mut self) {
        self.cancel_all();
    }
}
