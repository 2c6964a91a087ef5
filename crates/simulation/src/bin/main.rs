//! Converge deterministic simulator CLI.
//!
//! Runs one exchange between two simulated replica groups and prints the
//! outcome. Given the same arguments, produces identical results every run.
//!
//! # Example
//!
//! ```bash
//! # 500 keys, 5 of them diverging
//! converge-sim --keys 500 --diverge 5
//!
//! # force a timeout by silencing the pink group
//! converge-sim --drop-pink
//! ```

use clap::Parser;
use converge_exchange::ExchangeConfig;
use converge_simulation::{FlatTree, SimReplica, SimulationConfig, SimulationRunner};
use converge_types::VersionClock;
use std::time::Duration;
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Converge deterministic exchange simulator.
#[derive(Parser, Debug)]
#[command(name = "converge-sim")]
#[command(version, about, long_about = None)]
struct Args {
    /// Random seed for jitter and latency
    #[arg(long, default_value = "42")]
    seed: u64,

    /// Number of keys on each replica
    #[arg(short, long, default_value = "200")]
    keys: usize,

    /// Number of keys whose clocks diverge between the groups
    #[arg(short, long, default_value = "3")]
    diverge: usize,

    /// Branches in the hash tree
    #[arg(long, default_value = "64")]
    branches: u64,

    /// Leaves per branch
    #[arg(long, default_value = "16")]
    leaves: u64,

    /// Base inter-phase pause in milliseconds
    #[arg(long, default_value = "1000")]
    pause_ms: u64,

    /// Drop every pink reply (forces a phase timeout)
    #[arg(long)]
    drop_pink: bool,
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("warn,converge_exchange=info")),
        )
        .init();

    let args = Args::parse();

    info!(
        seed = args.seed,
        keys = args.keys,
        diverge = args.diverge,
        branches = args.branches,
        leaves = args.leaves,
        "starting simulated exchange"
    );

    let tree = FlatTree::new(args.branches, args.leaves);
    let mut blue = SimReplica::new(tree.clone());
    let mut pink = SimReplica::new(tree.clone());
    for i in 0..args.keys {
        let key = format!("key-{i}").into_bytes();
        blue.insert(key.clone(), VersionClock::new([1]));
        let version: u8 = if i < args.diverge { 2 } else { 1 };
        pink.insert(key, VersionClock::new([version]));
    }

    let config = SimulationConfig {
        drop_pink_replies: args.drop_pink,
        exchange: ExchangeConfig {
            transition_pause: Duration::from_millis(args.pause_ms),
            ..ExchangeConfig::default()
        },
        seed: args.seed,
        ..SimulationConfig::default()
    };

    let mut runner = SimulationRunner::new(config, tree, vec![blue], vec![pink]);
    let outcome = runner.run_to_completion();
    let stats = runner.stats();

    println!("\n=== Exchange Complete ===");
    println!("Outcome:        {outcome}");
    println!(
        "Repair keys:    {}",
        runner.repair().map(|keys| keys.len()).unwrap_or(0)
    );
    println!("Virtual time:   {:.3}s", runner.now().as_secs_f64());
    println!("Events:         {}", stats.events_processed);
    println!(
        "Fetches:        {} root / {} branch / {} clock",
        stats.root_fetches, stats.branch_fetches, stats.clock_fetches
    );
    println!(
        "Replies:        {} delivered / {} dropped",
        stats.replies_delivered, stats.replies_dropped
    );
}
