//! Exchange runtime: starts exchanges and drives them to termination.

use crate::capability::Target;
use crate::dispatcher;
use crate::metrics::metrics;
use crate::timers::TimerManager;
use converge_core::{Action, Event, Outcome, StateMachine};
use converge_exchange::{ExchangeConfig, ExchangeState};
use converge_types::{Colour, ExchangeId, KeyClock, TreeCodec};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tracing::trace;

/// One-shot callback receiving the final repair set.
pub type RepairAction = Box<dyn FnOnce(Vec<KeyClock>) + Send + 'static>;

/// One-shot callback receiving the terminal outcome.
pub type ReplyAction = Box<dyn FnOnce(Outcome) + Send + 'static>;

/// Errors from starting an exchange.
#[derive(Debug, Error)]
pub enum StartError {
    #[error("{0} target list is empty")]
    EmptyTargets(Colour),
}

static NEXT_EXCHANGE_ID: AtomicU64 = AtomicU64::new(1);

/// Builder for one exchange.
///
/// Required fields:
/// - `blue_targets` / `pink_targets` - the two target lists, both non-empty
///
/// Optional fields:
/// - `on_repair` / `on_reply` - one-shot callbacks (no-ops when unset)
/// - `config` - protocol constants (defaults per [`ExchangeConfig`])
/// - `seed` - jitter seed (random when unset; fix it for deterministic tests)
pub struct ExchangeBuilder {
    tree: Arc<dyn TreeCodec>,
    config: ExchangeConfig,
    seed: Option<u64>,
    blue: Vec<Target>,
    pink: Vec<Target>,
    repair_action: Option<RepairAction>,
    reply_action: Option<ReplyAction>,
    channel_capacity: usize,
}

impl ExchangeBuilder {
    pub fn new(tree: Arc<dyn TreeCodec>) -> Self {
        Self {
            tree,
            config: ExchangeConfig::default(),
            seed: None,
            blue: Vec::new(),
            pink: Vec::new(),
            repair_action: None,
            reply_action: None,
            channel_capacity: 256,
        }
    }

    pub fn config(mut self, config: ExchangeConfig) -> Self {
        self.config = config;
        self
    }

    pub fn seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    pub fn blue_targets(mut self, targets: Vec<Target>) -> Self {
        self.blue = targets;
        self
    }

    pub fn pink_targets(mut self, targets: Vec<Target>) -> Self {
        self.pink = targets;
        self
    }

    /// Invoked with the computed repair set at the ClockCompare exit.
    pub fn on_repair(mut self, action: impl FnOnce(Vec<KeyClock>) + Send + 'static) -> Self {
        self.repair_action = Some(Box::new(action));
        self
    }

    /// Invoked exactly once with the terminal phase name.
    pub fn on_reply(mut self, action: impl FnOnce(Outcome) + Send + 'static) -> Self {
        self.reply_action = Some(Box::new(action));
        self
    }

    /// Validate the target lists, allocate an identifier, spawn the exchange
    /// task, and return immediately.
    pub fn start(self) -> Result<ExchangeId, StartError> {
        if self.blue.is_empty() {
            return Err(StartError::EmptyTargets(Colour::Blue));
        }
        if self.pink.is_empty() {
            return Err(StartError::EmptyTargets(Colour::Pink));
        }

        let id = ExchangeId(NEXT_EXCHANGE_ID.fetch_add(1, Ordering::Relaxed));
        let seed = self.seed.unwrap_or_else(rand::random);
        let fsm = ExchangeState::new(
            id,
            self.blue.len(),
            self.pink.len(),
            self.tree,
            self.config,
            seed,
        );

        metrics().exchanges_started.inc();
        metrics().active_exchanges.inc();

        let (events_tx, events_rx) = mpsc::channel(self.channel_capacity);
        tokio::spawn(run_exchange(
            fsm,
            self.blue,
            self.pink,
            self.repair_action,
            self.reply_action,
            events_tx,
            events_rx,
        ));
        Ok(id)
    }
}

/// Start an exchange with default configuration and a random jitter seed.
///
/// Convenience wrapper around [`ExchangeBuilder`].
pub fn start(
    blue: Vec<Target>,
    pink: Vec<Target>,
    repair_action: RepairAction,
    reply_action: ReplyAction,
    tree: Arc<dyn TreeCodec>,
) -> Result<ExchangeId, StartError> {
    ExchangeBuilder::new(tree)
        .blue_targets(blue)
        .pink_targets(pink)
        .on_repair(repair_action)
        .on_reply(reply_action)
        .start()
}

/// Drive one exchange from start to termination.
///
/// One event at a time: the state machine never sees concurrent events, and
/// every action is executed before the next event is taken. Dropping the
/// event receiver on return is what invalidates late reply sinks.
async fn run_exchange(
    mut fsm: ExchangeState,
    blue: Vec<Target>,
    pink: Vec<Target>,
    mut repair_action: Option<RepairAction>,
    mut reply_action: Option<ReplyAction>,
    events_tx: mpsc::Sender<Event>,
    mut events_rx: mpsc::Receiver<Event>,
) {
    let started = Instant::now();
    let mut timers = TimerManager::new(events_tx.clone());
    let mut actions = fsm.begin();

    loop {
        for action in actions {
            match action {
                Action::Dispatch { request, lead } => {
                    dispatcher::dispatch(fsm.id(), &request, &blue, &pink, lead, &events_tx);
                }
                Action::SetTimer { id, duration } => timers.set_timer(id, duration),
                Action::CancelTimer { id } => timers.cancel_timer(id),
                Action::EmitRepair { keys } => {
                    metrics().repair_keys.inc_by(keys.len() as f64);
                    if let Some(repair) = repair_action.take() {
                        repair(keys);
                    }
                }
                Action::Terminate { outcome } => {
                    timers.cancel_all();
                    metrics()
                        .exchanges_terminated
                        .with_label_values(&[outcome.as_str()])
                        .inc();
                    metrics().active_exchanges.dec();
                    if let Some(reply) = reply_action.take() {
                        reply(outcome);
                    }
                    return;
                }
            }
        }

        let Some(event) = events_rx.recv().await else {
            // all senders gone; nothing can ever wake us again
            trace!(exchange = %fsm.id(), "event channel closed");
            return;
        };
        fsm.set_time(started.elapsed());
        actions = fsm.handle(event);
    }
}
