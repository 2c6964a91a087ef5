//! Deterministic simulation harness for converge exchanges.
//!
//! Runs one [`converge_exchange::ExchangeState`] against in-memory replicas
//! with virtual time, a deterministically seeded latency model, and optional
//! reply dropping. Given the same seed and replica contents, a simulation
//! produces identical results every run, which is the property the
//! determinism tests pin down.

mod replica;
mod runner;
mod tree;

pub use replica::SimReplica;
pub use runner::{SimulationConfig, SimulationRunner, SimulationStats};
pub use tree::{FlatTree, SEGMENT_WIDTH};
