//! The exchange state machine.
//!
//! One [`ExchangeState`] drives one exchange between a blue and a pink
//! target set through six phases:
//!
//! 1. **Prepare** → fetch both sides' tree roots
//! 2. **RootCompare** → diff the roots, refetch for confirmation
//! 3. **RootConfirm** → intersect the two observations, narrow to 16 branches
//! 4. **BranchCompare** → diff the branch blobs, refetch for confirmation
//! 5. **BranchConfirm** → intersect, narrow to 128 segments
//! 6. **ClockCompare** → symmetric-difference the clock lists, emit repair
//!
//! Each compare/confirm pair is separated by a jittered pause so writes in
//! flight during the first observation have converged by the second; only
//! the intersection of both observations moves forward. An empty delta at
//! any point ends the exchange early reporting that phase; a phase deadline
//! ends it reporting a timeout.

use crate::accumulator::AccKind;
use crate::collector::{Absorb, Collector};
use crate::compare::{compare_branches, compare_clocks, compare_roots};
use crate::config::ExchangeConfig;
use crate::select::{intersect, select};
use converge_core::{Action, Event, FetchRequest, Outcome, ReplyPayload, StateMachine, TimerId};
use converge_types::{BranchId, Colour, ExchangeId, KeyClock, SegmentId, TreeCodec};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, trace, warn};

/// Phases of one exchange.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Prepare,
    RootCompare,
    RootConfirm,
    BranchCompare,
    BranchConfirm,
    ClockCompare,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Phase::Prepare => "Prepare",
            Phase::RootCompare => "RootCompare",
            Phase::RootConfirm => "RootConfirm",
            Phase::BranchCompare => "BranchCompare",
            Phase::BranchConfirm => "BranchConfirm",
            Phase::ClockCompare => "ClockCompare",
        };
        f.write_str(name)
    }
}

/// Where the machine currently is between events.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Step {
    /// Waiting out a jittered pause before entering `next`.
    Pausing { next: Phase },
    /// Waiting for replies; `pending` runs when both colours complete.
    Collecting { pending: Phase },
    /// Reply action invoked; all further events are discarded.
    Terminated,
}

/// State machine for one exchange.
///
/// Synchronous and deterministic: the jitter source is a per-exchange seeded
/// RNG, time is injected by the runner through [`StateMachine::set_time`],
/// and all I/O happens through the returned [`Action`]s.
pub struct ExchangeState {
    /// This exchange's identifier.
    id: ExchangeId,

    /// Protocol constants.
    config: ExchangeConfig,

    /// Capability onto the external hash-tree library.
    tree: Arc<dyn TreeCodec>,

    /// Jitter source, seeded per exchange.
    rng: ChaCha8Rng,

    /// Current step.
    step: Step,

    /// Colour dispatched first at each rank of the next fan-out.
    lead: Colour,

    /// Per-colour accumulators and progress for the current phase.
    collector: Collector,

    /// Expected reply counts, fixed at start from the target list lengths.
    blue_expected: usize,
    pink_expected: usize,

    /// When the current phase's request was dispatched.
    phase_started: Duration,

    // Delta carriers, one per observation.
    root_compare_deltas: Vec<BranchId>,
    root_confirm_deltas: Vec<BranchId>,
    branch_compare_deltas: Vec<SegmentId>,
    branch_confirm_deltas: Vec<SegmentId>,
    key_deltas: Vec<KeyClock>,

    /// Current time (set by runner before each handle call).
    now: Duration,
}

impl fmt::Debug for ExchangeState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExchangeState")
            .field("id", &self.id)
            .field("step", &self.step)
            .field("blue", &self.collector.progress(Colour::Blue))
            .field("pink", &self.collector.progress(Colour::Pink))
            .field("now", &self.now)
            .finish()
    }
}

impl ExchangeState {
    /// Create the state machine for one exchange.
    ///
    /// # Arguments
    ///
    /// * `id` - Exchange identifier (allocated by the runtime)
    /// * `blue_expected` / `pink_expected` - target list lengths, which fix
    ///   the per-colour expected reply counts for every phase
    /// * `tree` - hash-tree capability
    /// * `config` - protocol constants
    /// * `seed` - jitter seed; inject a fixed one for deterministic tests
    pub fn new(
        id: ExchangeId,
        blue_expected: usize,
        pink_expected: usize,
        tree: Arc<dyn TreeCodec>,
        config: ExchangeConfig,
        seed: u64,
    ) -> Self {
        Self {
            id,
            config,
            tree,
            rng: ChaCha8Rng::seed_from_u64(seed),
            step: Step::Pausing {
                next: Phase::Prepare,
            },
            lead: Colour::Blue,
            collector: Collector::new(AccKind::Root, blue_expected, pink_expected),
            blue_expected,
            pink_expected,
            phase_started: Duration::ZERO,
            root_compare_deltas: Vec::new(),
            root_confirm_deltas: Vec::new(),
            branch_compare_deltas: Vec::new(),
            branch_confirm_deltas: Vec::new(),
            key_deltas: Vec::new(),
            now: Duration::ZERO,
        }
    }

    pub fn id(&self) -> ExchangeId {
        self.id
    }

    pub fn is_terminated(&self) -> bool {
        matches!(self.step, Step::Terminated)
    }

    /// The repair set computed at the ClockCompare exit. Empty before then.
    pub fn key_deltas(&self) -> &[KeyClock] {
        &self.key_deltas
    }

    /// Start the exchange: log the start record and arm the initial
    /// jittered pause before Prepare dispatches.
    pub fn begin(&mut self) -> Vec<Action> {
        info!(
            code = "EX001",
            exchange = %self.id,
            blue_targets = self.blue_expected,
            pink_targets = self.pink_expected,
            "exchange started"
        );
        vec![Action::SetTimer {
            id: TimerId::Pause,
            duration: self.jittered_pause(),
        }]
    }

    /// Uniform draw from `[pause, 1.5 × pause]`.
    ///
    /// Successive observations stay separated by at least the base pause
    /// while simultaneous exchanges spread apart.
    fn jittered_pause(&mut self) -> Duration {
        let base = self.config.transition_pause;
        base + base.mul_f64(0.5 * self.rng.gen::<f64>())
    }

    /// Reply budget for the collection feeding `pending`.
    fn phase_budget(&self, pending: Phase) -> Duration {
        if pending == Phase::ClockCompare {
            self.config.scan_timeout
        } else {
            self.config.cache_timeout
        }
    }

    /// Reset the collector for the next accumulator shape, fan the request
    /// out, and arm the phase deadline.
    fn dispatch(&mut self, request: FetchRequest, kind: AccKind, pending: Phase) -> Vec<Action> {
        self.collector
            .reset(kind, self.blue_expected, self.pink_expected);
        self.phase_started = self.now;
        self.step = Step::Collecting { pending };
        let lead = self.lead;
        self.lead = lead.other();

        debug!(
            exchange = %self.id,
            request = request.type_name(),
            pending = %pending,
            "dispatching phase request"
        );
        vec![
            Action::Dispatch { request, lead },
            Action::SetTimer {
                id: TimerId::Deadline,
                duration: self.phase_budget(pending),
            },
        ]
    }

    /// Single termination path: every exit funnels through here.
    fn terminate(&mut self, outcome: Outcome) -> Vec<Action> {
        self.step = Step::Terminated;
        info!(code = "EX003", exchange = %self.id, %outcome, "exchange terminated");
        vec![
            Action::CancelTimer { id: TimerId::Pause },
            Action::CancelTimer {
                id: TimerId::Deadline,
            },
            Action::Terminate { outcome },
        ]
    }

    fn on_reply(&mut self, pending: Phase, colour: Colour, payload: ReplyPayload) -> Vec<Action> {
        match self.collector.absorb(colour, payload, self.tree.as_ref()) {
            Absorb::Malformed => {
                error!(
                    exchange = %self.id,
                    %colour,
                    pending = %pending,
                    "malformed reply discarded"
                );
                return vec![];
            }
            Absorb::Surplus => {
                warn!(exchange = %self.id, %colour, "surplus reply discarded");
                return vec![];
            }
            Absorb::Merged => {}
        }

        if self.collector.is_complete() {
            self.step = Step::Pausing { next: pending };
            vec![
                Action::CancelTimer {
                    id: TimerId::Deadline,
                },
                Action::SetTimer {
                    id: TimerId::Pause,
                    duration: self.jittered_pause(),
                },
            ]
        } else {
            // keep total phase time bounded no matter how replies trickle in
            let elapsed = self.now.saturating_sub(self.phase_started);
            vec![Action::SetTimer {
                id: TimerId::Deadline,
                duration: self.phase_budget(pending).saturating_sub(elapsed),
            }]
        }
    }

    fn on_deadline(&mut self, pending: Phase) -> Vec<Action> {
        error!(
            code = "EX002",
            exchange = %self.id,
            pending = %pending,
            missing = self.collector.missing(),
            "phase deadline elapsed"
        );
        self.terminate(Outcome::TimedOut)
    }

    fn enter_phase(&mut self, phase: Phase) -> Vec<Action> {
        match phase {
            Phase::Prepare => self.dispatch(FetchRequest::Root, AccKind::Root, Phase::RootCompare),

            Phase::RootCompare => {
                let deltas = compare_roots(
                    self.tree.as_ref(),
                    self.collector.acc(Colour::Blue).as_root(),
                    self.collector.acc(Colour::Pink).as_root(),
                );
                if deltas.is_empty() {
                    return self.terminate(Outcome::RootCompare);
                }
                debug!(
                    exchange = %self.id,
                    candidates = deltas.len(),
                    "root compare found candidate branches"
                );
                self.root_compare_deltas = deltas;
                // independent second observation of the same roots
                self.dispatch(FetchRequest::Root, AccKind::Root, Phase::RootConfirm)
            }

            Phase::RootConfirm => {
                let second = compare_roots(
                    self.tree.as_ref(),
                    self.collector.acc(Colour::Blue).as_root(),
                    self.collector.acc(Colour::Pink).as_root(),
                );
                let confirmed = intersect(&second, &self.root_compare_deltas);
                let narrowed = select(&confirmed, self.config.max_branch_results);
                if narrowed.is_empty() {
                    return self.terminate(Outcome::RootConfirm);
                }
                debug!(
                    exchange = %self.id,
                    confirmed = confirmed.len(),
                    narrowed = narrowed.len(),
                    "branch set confirmed"
                );
                self.root_confirm_deltas = narrowed.clone();
                self.dispatch(
                    FetchRequest::Branches(narrowed),
                    AccKind::Branches,
                    Phase::BranchCompare,
                )
            }

            Phase::BranchCompare => {
                let deltas = compare_branches(
                    self.tree.as_ref(),
                    self.collector.acc(Colour::Blue).as_branches(),
                    self.collector.acc(Colour::Pink).as_branches(),
                );
                if deltas.is_empty() {
                    return self.terminate(Outcome::BranchCompare);
                }
                debug!(
                    exchange = %self.id,
                    candidates = deltas.len(),
                    "branch compare found candidate segments"
                );
                self.branch_compare_deltas = deltas;
                // refetch the same branches for an independent second observation
                self.dispatch(
                    FetchRequest::Branches(self.root_confirm_deltas.clone()),
                    AccKind::Branches,
                    Phase::BranchConfirm,
                )
            }

            Phase::BranchConfirm => {
                let second = compare_branches(
                    self.tree.as_ref(),
                    self.collector.acc(Colour::Blue).as_branches(),
                    self.collector.acc(Colour::Pink).as_branches(),
                );
                let confirmed = intersect(&second, &self.branch_compare_deltas);
                let narrowed = select(&confirmed, self.config.max_results);
                if narrowed.is_empty() {
                    return self.terminate(Outcome::BranchConfirm);
                }
                debug!(
                    exchange = %self.id,
                    confirmed = confirmed.len(),
                    narrowed = narrowed.len(),
                    "segment set confirmed"
                );
                self.branch_confirm_deltas = narrowed.clone();
                self.dispatch(
                    FetchRequest::Clocks(narrowed),
                    AccKind::Clocks,
                    Phase::ClockCompare,
                )
            }

            Phase::ClockCompare => {
                let keys = compare_clocks(
                    self.collector.acc(Colour::Blue).as_clocks(),
                    self.collector.acc(Colour::Pink).as_clocks(),
                );
                self.key_deltas = keys.clone();
                info!(
                    code = "EX004",
                    exchange = %self.id,
                    keys = keys.len(),
                    "repair set computed"
                );
                let mut actions = vec![Action::EmitRepair { keys }];
                actions.extend(self.terminate(Outcome::Complete));
                actions
            }
        }
    }
}

impl StateMachine for ExchangeState {
    fn handle(&mut self, event: Event) -> Vec<Action> {
        match (self.step, event) {
            (Step::Terminated, event) => {
                trace!(
                    exchange = %self.id,
                    event = event.type_name(),
                    "event after termination discarded"
                );
                vec![]
            }
            (Step::Pausing { next }, Event::PauseElapsed) => self.enter_phase(next),
            (Step::Collecting { pending }, Event::ReplyReceived { colour, payload }) => {
                self.on_reply(pending, colour, payload)
            }
            (Step::Collecting { pending }, Event::DeadlineElapsed) => self.on_deadline(pending),
            (step, event) => {
                trace!(
                    exchange = %self.id,
                    ?step,
                    event = event.type_name(),
                    "event ignored in current step"
                );
                vec![]
            }
        }
    }

    fn set_time(&mut self, now: Duration) {
        self.now = now;
    }

    fn now(&self) -> Duration {
        self.now
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::{blob, XorTree};
    use converge_types::VersionClock;

    const PAUSE: Duration = Duration::from_millis(1000);

    fn kc(key: &[u8], clock: u8) -> KeyClock {
        KeyClock::new(key.to_vec(), VersionClock::new([clock]))
    }

    fn machine(blue: usize, pink: usize) -> ExchangeState {
        ExchangeState::new(
            ExchangeId(1),
            blue,
            pink,
            Arc::new(XorTree {
                leaves_per_branch: 4,
            }),
            ExchangeConfig::default(),
            42,
        )
    }

    fn reply(colour: Colour, payload: ReplyPayload) -> Event {
        Event::ReplyReceived { colour, payload }
    }

    /// Unwrap the single jittered-pause timer out of an action list.
    fn pause_duration(actions: &[Action]) -> Duration {
        actions
            .iter()
            .find_map(|a| match a {
                Action::SetTimer {
                    id: TimerId::Pause,
                    duration,
                } => Some(*duration),
                _ => None,
            })
            .expect("no pause timer in actions")
    }

    fn terminal_outcome(actions: &[Action]) -> Option<Outcome> {
        actions.iter().find_map(|a| match a {
            Action::Terminate { outcome } => Some(*outcome),
            _ => None,
        })
    }

    fn dispatched_request(actions: &[Action]) -> Option<&FetchRequest> {
        actions.iter().find_map(|a| match a {
            Action::Dispatch { request, .. } => Some(request),
            _ => None,
        })
    }

    /// Run one collect-then-pause round: feed both colours the given
    /// payloads, then fire the pause and return the next phase's actions.
    fn complete_round(
        fsm: &mut ExchangeState,
        blue: ReplyPayload,
        pink: ReplyPayload,
    ) -> Vec<Action> {
        let first = fsm.handle(reply(Colour::Blue, blue));
        assert!(terminal_outcome(&first).is_none());
        let second = fsm.handle(reply(Colour::Pink, pink));
        pause_duration(&second);
        fsm.handle(Event::PauseElapsed)
    }

    #[test]
    fn begin_arms_a_jittered_prepare_pause() {
        let mut fsm = machine(1, 1);
        let actions = fsm.begin();
        let pause = pause_duration(&actions);
        assert!(pause >= PAUSE);
        assert!(pause <= PAUSE.mul_f64(1.5));
    }

    #[test]
    fn prepare_dispatches_root_fetch_with_cache_deadline() {
        let mut fsm = machine(2, 3);
        fsm.begin();
        let actions = fsm.handle(Event::PauseElapsed);

        assert_eq!(dispatched_request(&actions), Some(&FetchRequest::Root));
        assert!(actions.iter().any(|a| matches!(
            a,
            Action::SetTimer {
                id: TimerId::Deadline,
                duration,
            } if *duration == Duration::from_secs(60)
        )));
    }

    #[test]
    fn identical_roots_terminate_at_root_compare() {
        let mut fsm = machine(1, 1);
        fsm.begin();
        fsm.handle(Event::PauseElapsed);

        let root = blob(4, &[(0, 0x07)]);
        let actions = complete_round(
            &mut fsm,
            ReplyPayload::Root(root.clone()),
            ReplyPayload::Root(root),
        );

        assert_eq!(terminal_outcome(&actions), Some(Outcome::RootCompare));
        assert!(!actions.iter().any(|a| matches!(a, Action::EmitRepair { .. })));
        assert!(fsm.is_terminated());
    }

    #[test]
    fn full_walk_to_complete_with_one_divergent_key() {
        let mut fsm = machine(1, 1);
        fsm.begin();
        fsm.handle(Event::PauseElapsed);

        let blue_root = ReplyPayload::Root(blob(4, &[(1, 0xaa)]));
        let pink_root = ReplyPayload::Root(blob(4, &[(1, 0xbb)]));
        let blue_branch =
            ReplyPayload::Branches(vec![(BranchId(1), blob(4, &[(2, 0x01)]))]);
        let pink_branch =
            ReplyPayload::Branches(vec![(BranchId(1), blob(4, &[(2, 0x02)]))]);

        // RootCompare: roots differ at branch 1, refetch roots
        let actions = complete_round(&mut fsm, blue_root.clone(), pink_root.clone());
        assert_eq!(dispatched_request(&actions), Some(&FetchRequest::Root));

        // RootConfirm: intersection holds, fetch branch 1
        let actions = complete_round(&mut fsm, blue_root, pink_root);
        assert_eq!(
            dispatched_request(&actions),
            Some(&FetchRequest::Branches(vec![BranchId(1)]))
        );

        // BranchCompare: leaf 2 differs, refetch the same branch
        let actions = complete_round(&mut fsm, blue_branch.clone(), pink_branch.clone());
        assert_eq!(
            dispatched_request(&actions),
            Some(&FetchRequest::Branches(vec![BranchId(1)]))
        );

        // BranchConfirm: segment 6 confirmed, fetch clocks with scan deadline
        let actions = complete_round(&mut fsm, blue_branch, pink_branch);
        assert_eq!(
            dispatched_request(&actions),
            Some(&FetchRequest::Clocks(vec![SegmentId(6)]))
        );
        assert!(actions.iter().any(|a| matches!(
            a,
            Action::SetTimer {
                id: TimerId::Deadline,
                duration,
            } if *duration == Duration::from_secs(600)
        )));

        // ClockCompare: symmetric difference goes to repair
        let actions = complete_round(
            &mut fsm,
            ReplyPayload::Clocks(vec![kc(b"k", 1)]),
            ReplyPayload::Clocks(vec![kc(b"k", 2)]),
        );
        let repair = actions
            .iter()
            .find_map(|a| match a {
                Action::EmitRepair { keys } => Some(keys.clone()),
                _ => None,
            })
            .expect("no repair emitted");
        assert_eq!(repair, vec![kc(b"k", 1), kc(b"k", 2)]);
        assert_eq!(terminal_outcome(&actions), Some(Outcome::Complete));
        assert_eq!(fsm.key_deltas(), repair.as_slice());
    }

    #[test]
    fn equal_branches_after_differing_roots_exit_at_branch_compare() {
        let mut fsm = machine(1, 1);
        fsm.begin();
        fsm.handle(Event::PauseElapsed);

        let blue_root = ReplyPayload::Root(blob(4, &[(0, 0x01)]));
        let pink_root = ReplyPayload::Root(blob(4, &[(0, 0x02)]));
        complete_round(&mut fsm, blue_root.clone(), pink_root.clone());
        complete_round(&mut fsm, blue_root, pink_root);

        // the race settled: both sides now agree on branch 0
        let branch = ReplyPayload::Branches(vec![(BranchId(0), blob(4, &[(1, 0x03)]))]);
        let actions = complete_round(&mut fsm, branch.clone(), branch);
        assert_eq!(terminal_outcome(&actions), Some(Outcome::BranchCompare));
    }

    #[test]
    fn partial_reply_rearms_the_deadline_from_phase_start() {
        let mut fsm = machine(1, 1);
        fsm.begin();
        fsm.handle(Event::PauseElapsed);

        fsm.set_time(Duration::from_secs(10));
        let actions = fsm.handle(reply(Colour::Blue, ReplyPayload::Root(blob(1, &[(0, 1)]))));
        assert!(actions.iter().any(|a| matches!(
            a,
            Action::SetTimer {
                id: TimerId::Deadline,
                duration,
            } if *duration == Duration::from_secs(50)
        )));
    }

    #[test]
    fn deadline_terminates_with_timed_out() {
        let mut fsm = machine(1, 2);
        fsm.begin();
        fsm.handle(Event::PauseElapsed);

        fsm.handle(reply(Colour::Blue, ReplyPayload::Root(blob(1, &[(0, 1)]))));
        let actions = fsm.handle(Event::DeadlineElapsed);
        assert_eq!(terminal_outcome(&actions), Some(Outcome::TimedOut));
        assert!(!actions.iter().any(|a| matches!(a, Action::EmitRepair { .. })));
    }

    #[test]
    fn events_after_termination_are_discarded() {
        let mut fsm = machine(1, 1);
        fsm.begin();
        fsm.handle(Event::PauseElapsed);
        fsm.handle(Event::DeadlineElapsed);
        assert!(fsm.is_terminated());

        let late = fsm.handle(reply(Colour::Pink, ReplyPayload::Root(blob(1, &[(0, 1)]))));
        assert!(late.is_empty());
        assert!(fsm.handle(Event::PauseElapsed).is_empty());
        assert!(fsm.handle(Event::DeadlineElapsed).is_empty());
    }

    #[test]
    fn malformed_reply_does_not_advance_collection() {
        let mut fsm = machine(1, 1);
        fsm.begin();
        fsm.handle(Event::PauseElapsed);

        let actions = fsm.handle(reply(Colour::Blue, ReplyPayload::Clocks(vec![kc(b"a", 1)])));
        assert!(actions.is_empty());

        // both well-formed replies still complete the phase
        let root = blob(1, &[(0, 1)]);
        fsm.handle(reply(Colour::Blue, ReplyPayload::Root(root.clone())));
        let actions = fsm.handle(reply(Colour::Pink, ReplyPayload::Root(root)));
        pause_duration(&actions);
    }

    #[test]
    fn root_confirm_narrows_to_sixteen_branches() {
        let mut fsm = machine(1, 1);
        fsm.begin();
        fsm.handle(Event::PauseElapsed);

        // 20 dirty branches on a 32-branch root
        let marks: Vec<(usize, u8)> = (0..20).map(|i| (i, 0x10 + i as u8)).collect();
        let blue_root = ReplyPayload::Root(blob(32, &[]));
        let pink_root = ReplyPayload::Root(blob(32, &marks));

        complete_round(&mut fsm, blue_root.clone(), pink_root.clone());
        let actions = complete_round(&mut fsm, blue_root, pink_root);

        match dispatched_request(&actions) {
            Some(FetchRequest::Branches(ids)) => assert_eq!(ids.len(), 16),
            other => panic!("expected branch fetch, got {other:?}"),
        }
    }

    #[test]
    fn alternates_the_lead_colour_across_dispatches() {
        let mut fsm = machine(1, 1);
        fsm.begin();
        let first = fsm.handle(Event::PauseElapsed);
        let first_lead = first.iter().find_map(|a| match a {
            Action::Dispatch { lead, .. } => Some(*lead),
            _ => None,
        });

        let root_a = ReplyPayload::Root(blob(1, &[(0, 1)]));
        let root_b = ReplyPayload::Root(blob(1, &[(0, 2)]));
        let second = complete_round(&mut fsm, root_a, root_b);
        let second_lead = second.iter().find_map(|a| match a {
            Action::Dispatch { lead, .. } => Some(*lead),
            _ => None,
        });

        assert_eq!(first_lead, Some(Colour::Blue));
        assert_eq!(second_lead, Some(Colour::Pink));
    }
}
