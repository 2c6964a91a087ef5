//! End-to-end exchange scenarios against simulated replicas.

use converge_core::Outcome;
use converge_exchange::compare_clocks;
use converge_simulation::{FlatTree, SimReplica, SimulationConfig, SimulationRunner};
use converge_types::{KeyClock, VersionClock};
use std::time::Duration;

fn clock(n: u8) -> VersionClock {
    VersionClock::new([n])
}

fn tree() -> FlatTree {
    FlatTree::new(64, 16)
}

/// Blue and pink replicas holding `count` keys each, the first `diverge` of
/// which carry different clocks on the pink side.
fn seeded_pair(count: usize, diverge: usize) -> (SimReplica, SimReplica) {
    let mut blue = SimReplica::new(tree());
    let mut pink = SimReplica::new(tree());
    for i in 0..count {
        let key = format!("key-{i}").into_bytes();
        blue.insert(key.clone(), clock(1));
        let version: u8 = if i < diverge { 2 } else { 1 };
        pink.insert(key, clock(version));
    }
    (blue, pink)
}

fn runner(blue: Vec<SimReplica>, pink: Vec<SimReplica>) -> SimulationRunner {
    SimulationRunner::new(SimulationConfig::default(), tree(), blue, pink)
}

#[test]
fn identical_content_exits_at_root_compare() {
    let (blue, pink) = seeded_pair(200, 0);
    let mut sim = runner(vec![blue], vec![pink]);

    assert_eq!(sim.run_to_completion(), Outcome::RootCompare);
    assert!(sim.repair().is_none(), "repair must not run on convergence");
    assert_eq!(sim.stats().root_fetches, 1);
    assert_eq!(sim.stats().branch_fetches, 0);
}

#[test]
fn identical_content_finishes_within_the_pause_bound() {
    let (blue, pink) = seeded_pair(50, 0);
    let mut sim = runner(vec![blue], vec![pink]);
    sim.run_to_completion();

    // one Prepare pause plus one collection pause, each ≤ 1.5 × base,
    // plus reply latency
    let bound = Duration::from_millis(1000).mul_f64(3.0) + Duration::from_millis(100);
    assert!(sim.now() <= bound, "took {:?}", sim.now());
}

#[test]
fn key_missing_on_one_side_is_repaired() {
    let (blue, mut pink) = seeded_pair(100, 0);
    pink.insert(b"lonely".to_vec(), clock(9));
    let mut sim = runner(vec![blue], vec![pink]);

    assert_eq!(sim.run_to_completion(), Outcome::Complete);
    assert_eq!(
        sim.repair().unwrap(),
        &[KeyClock::new(b"lonely".to_vec(), clock(9))]
    );
}

#[test]
fn divergent_clocks_surface_both_versions() {
    let (blue, pink) = seeded_pair(100, 1);
    let mut sim = runner(vec![blue], vec![pink]);

    assert_eq!(sim.run_to_completion(), Outcome::Complete);
    let repair = sim.repair().unwrap();
    assert_eq!(
        repair,
        &[
            KeyClock::new(b"key-0".to_vec(), clock(1)),
            KeyClock::new(b"key-0".to_vec(), clock(2)),
        ]
    );
}

#[test]
fn silent_colour_times_the_exchange_out() {
    let (blue, pink) = seeded_pair(100, 1);
    let config = SimulationConfig {
        drop_pink_replies: true,
        ..SimulationConfig::default()
    };
    let mut sim = SimulationRunner::new(config, tree(), vec![blue], vec![pink]);

    assert_eq!(sim.run_to_completion(), Outcome::TimedOut);
    assert!(sim.repair().is_none());
    // timed out at the first collection: pause + cache deadline
    assert!(sim.now() >= Duration::from_secs(60));
    assert!(sim.now() < Duration::from_secs(62));
}

#[test]
fn narrowing_limits_bound_every_fetch() {
    let (blue, pink) = seeded_pair(2000, 600);
    let mut sim = runner(vec![blue.clone()], vec![pink.clone()]);

    assert_eq!(sim.run_to_completion(), Outcome::Complete);
    let stats = sim.stats();
    assert!(stats.max_branches_requested <= 16);
    assert!(stats.max_segments_requested <= 128);

    // bounded effort: a subset of the true difference, never a superset
    let full_difference = compare_clocks(
        &blue.clocks(&all_segments()),
        &pink.clocks(&all_segments()),
    );
    let repair = sim.repair().unwrap();
    assert!(!repair.is_empty());
    for entry in repair {
        assert!(full_difference.contains(entry));
    }
}

fn all_segments() -> Vec<converge_types::SegmentId> {
    (0..tree().total_leaves())
        .map(converge_types::SegmentId)
        .collect()
}

#[test]
fn repair_set_is_invariant_to_reply_timing() {
    let outcomes: Vec<_> = [1u64, 2, 3]
        .into_iter()
        .map(|seed| {
            let (blue, pink) = seeded_pair(300, 5);
            let config = SimulationConfig {
                seed,
                ..SimulationConfig::default()
            };
            let mut sim = SimulationRunner::new(config, tree(), vec![blue], vec![pink]);
            let outcome = sim.run_to_completion();
            (outcome, sim.repair().unwrap().to_vec())
        })
        .collect();

    for (outcome, repair) in &outcomes {
        assert_eq!(*outcome, Outcome::Complete);
        assert_eq!(repair, &outcomes[0].1);
    }
}

#[test]
fn split_replicas_merge_to_their_union() {
    // blue holds the keyspace in two disjoint halves; pink holds the union
    let shape = tree();
    let mut blue_left = SimReplica::new(shape.clone());
    let mut blue_right = SimReplica::new(shape.clone());
    let mut pink = SimReplica::new(shape.clone());
    for i in 0..200u32 {
        let key = format!("key-{i}").into_bytes();
        pink.insert(key.clone(), clock(1));
        if i % 2 == 0 {
            blue_left.insert(key, clock(1));
        } else {
            blue_right.insert(key, clock(1));
        }
    }

    let mut sim = runner(vec![blue_left, blue_right], vec![pink]);
    assert_eq!(sim.run_to_completion(), Outcome::RootCompare);
    assert!(sim.repair().is_none());
}
