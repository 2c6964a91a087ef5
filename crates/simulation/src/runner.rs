//! Deterministic simulation runner.
//!
//! Drives one exchange state machine against in-memory replicas. Events
//! live in a `BTreeMap` keyed by (virtual time, sequence number), so
//! processing order is fully deterministic; reply latencies come from a
//! seeded RNG. Given the same seed and replica contents, a run produces
//! identical results every time.

use crate::replica::SimReplica;
use crate::tree::FlatTree;
use converge_core::{Action, Event, FetchRequest, Outcome, StateMachine, TimerId};
use converge_exchange::{ExchangeConfig, ExchangeState};
use converge_types::{Colour, ExchangeId, KeyClock};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;
use tracing::trace;

/// Configuration for one simulated exchange.
#[derive(Debug, Clone)]
pub struct SimulationConfig {
    /// Base latency between a dispatch and the reply it produces.
    pub reply_latency: Duration,
    /// Latency jitter as a fraction of the base (0.0 - 1.0).
    pub jitter_fraction: f64,
    /// Silently drop every blue reply (targets that never answer).
    pub drop_blue_replies: bool,
    /// Silently drop every pink reply.
    pub drop_pink_replies: bool,
    /// Exchange protocol constants.
    pub exchange: ExchangeConfig,
    /// Seed for both the exchange jitter and the latency model.
    pub seed: u64,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            reply_latency: Duration::from_millis(10),
            jitter_fraction: 0.1,
            drop_blue_replies: false,
            drop_pink_replies: false,
            exchange: ExchangeConfig::default(),
            seed: 42,
        }
    }
}

/// Statistics collected during a simulation.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct SimulationStats {
    /// Total events processed.
    pub events_processed: u64,
    /// Replies scheduled for delivery.
    pub replies_delivered: u64,
    /// Replies dropped by configuration.
    pub replies_dropped: u64,
    /// Dispatches by request type.
    pub root_fetches: u64,
    pub branch_fetches: u64,
    pub clock_fetches: u64,
    /// Largest branch / segment sets ever requested.
    pub max_branches_requested: usize,
    pub max_segments_requested: usize,
    /// Timers set and cancelled.
    pub timers_set: u64,
    pub timers_cancelled: u64,
}

/// Deterministic event ordering key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
struct EventKey {
    time: Duration,
    seq: u64,
}

/// Runs one exchange against blue and pink replica vectors.
pub struct SimulationRunner {
    exchange: ExchangeState,
    blue: Vec<SimReplica>,
    pink: Vec<SimReplica>,
    queue: BTreeMap<EventKey, Event>,
    sequence: u64,
    now: Duration,
    rng: ChaCha8Rng,
    timers: HashMap<TimerId, EventKey>,
    config: SimulationConfig,
    outcome: Option<Outcome>,
    repair: Option<Vec<KeyClock>>,
    stats: SimulationStats,
}

impl SimulationRunner {
    /// Create a runner for one exchange.
    ///
    /// Both replica vectors play the role of target lists: one reply per
    /// replica per phase.
    pub fn new(
        config: SimulationConfig,
        tree: FlatTree,
        blue: Vec<SimReplica>,
        pink: Vec<SimReplica>,
    ) -> Self {
        assert!(!blue.is_empty() && !pink.is_empty(), "empty target list");

        let exchange = ExchangeState::new(
            ExchangeId(1),
            blue.len(),
            pink.len(),
            Arc::new(tree),
            config.exchange.clone(),
            config.seed,
        );
        Self {
            exchange,
            blue,
            pink,
            queue: BTreeMap::new(),
            sequence: 0,
            now: Duration::ZERO,
            rng: ChaCha8Rng::seed_from_u64(config.seed),
            timers: HashMap::new(),
            config,
            outcome: None,
            repair: None,
            stats: SimulationStats::default(),
        }
    }

    /// Current virtual time.
    pub fn now(&self) -> Duration {
        self.now
    }

    pub fn stats(&self) -> &SimulationStats {
        &self.stats
    }

    /// The terminal outcome, once the exchange ended.
    pub fn outcome(&self) -> Option<Outcome> {
        self.outcome
    }

    /// The repair set, if the repair action was invoked.
    pub fn repair(&self) -> Option<&[KeyClock]> {
        self.repair.as_deref()
    }

    /// Run the exchange until it terminates and return the outcome.
    pub fn run_to_completion(&mut self) -> Outcome {
        let actions = self.exchange.begin();
        for action in actions {
            self.process_action(action);
        }

        while self.outcome.is_none() {
            let Some((key, event)) = self.queue.pop_first() else {
                break;
            };
            self.now = key.time;
            // drop timer bookkeeping for the entry that just fired
            self.timers.retain(|_, armed| *armed != key);

            self.stats.events_processed += 1;
            self.exchange.set_time(self.now);
            let actions = self.exchange.handle(event);
            for action in actions {
                self.process_action(action);
            }
        }

        self.outcome
            .expect("event queue drained before the exchange terminated")
    }

    fn schedule(&mut self, delay: Duration, event: Event) -> EventKey {
        let key = EventKey {
            time: self.now + delay,
            seq: self.sequence,
        };
        self.sequence += 1;
        self.queue.insert(key, event);
        key
    }

    fn process_action(&mut self, action: Action) {
        match action {
            Action::Dispatch { request, lead: _ } => self.fan_out(request),

            Action::SetTimer { id, duration } => {
                if let Some(old) = self.timers.remove(&id) {
                    self.queue.remove(&old);
                }
                let event = match id {
                    TimerId::Pause => Event::PauseElapsed,
                    TimerId::Deadline => Event::DeadlineElapsed,
                };
                let key = self.schedule(duration, event);
                self.timers.insert(id, key);
                self.stats.timers_set += 1;
            }

            Action::CancelTimer { id } => {
                if let Some(key) = self.timers.remove(&id) {
                    self.queue.remove(&key);
                    self.stats.timers_cancelled += 1;
                }
            }

            Action::EmitRepair { keys } => self.repair = Some(keys),

            Action::Terminate { outcome } => {
                trace!(%outcome, now = ?self.now, "simulated exchange terminated");
                self.outcome = Some(outcome);
            }
        }
    }

    /// Deliver `request` to every replica of both colours, scheduling one
    /// reply each under the latency model.
    fn fan_out(&mut self, request: FetchRequest) {
        match &request {
            FetchRequest::Root => self.stats.root_fetches += 1,
            FetchRequest::Branches(ids) => {
                self.stats.branch_fetches += 1;
                self.stats.max_branches_requested =
                    self.stats.max_branches_requested.max(ids.len());
            }
            FetchRequest::Clocks(segments) => {
                self.stats.clock_fetches += 1;
                self.stats.max_segments_requested =
                    self.stats.max_segments_requested.max(segments.len());
            }
        }

        for colour in Colour::BOTH {
            let (replicas, dropped) = match colour {
                Colour::Blue => (&self.blue, self.config.drop_blue_replies),
                Colour::Pink => (&self.pink, self.config.drop_pink_replies),
            };
            if dropped {
                self.stats.replies_dropped += replicas.len() as u64;
                continue;
            }
            let payloads: Vec<_> = replicas
                .iter()
                .map(|replica| replica.respond(&request))
                .collect();
            for payload in payloads {
                let latency = self.sample_latency();
                self.schedule(latency, Event::ReplyReceived { colour, payload });
                self.stats.replies_delivered += 1;
            }
        }
    }

    fn sample_latency(&mut self) -> Duration {
        let jitter = 1.0 + self.config.jitter_fraction * (self.rng.gen::<f64>() * 2.0 - 1.0);
        self.config.reply_latency.mul_f64(jitter.max(0.0))
    }
}
