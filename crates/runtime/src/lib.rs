//! Tokio runtime for converge exchanges.
//!
//! The runtime owns everything the state machine must not: timers, fan-out
//! to user-supplied [`SendCapability`] implementations, and the one-shot
//! repair/reply callbacks. Each exchange runs as one independent tokio task
//! processing one event at a time; exchanges share nothing.
//!
//! # Example
//!
//! ```no_run
//! use converge_runtime::{ExchangeBuilder, Preflist, SendCapability};
//! use std::sync::Arc;
//!
//! # fn example(tree: Arc<dyn converge_types::TreeCodec>,
//! #            capability: Arc<dyn SendCapability>) {
//! let id = ExchangeBuilder::new(tree)
//!     .blue_targets(vec![(capability.clone(), Preflist::default())])
//!     .pink_targets(vec![(capability, Preflist::default())])
//!     .on_repair(|keys| println!("repair {} keys", keys.len()))
//!     .on_reply(|outcome| println!("exchange ended: {outcome}"))
//!     .start()
//!     .expect("non-empty targets");
//! println!("started {id}");
//! # }
//! ```

mod capability;
mod dispatcher;
mod metrics;
mod runner;
mod timers;

pub use capability::{Preflist, ReplySink, SendCapability, Target, TargetDescriptor};
pub use dispatcher::dispatch;
pub use metrics::{metrics, Metrics};
pub use runner::{start, ExchangeBuilder, RepairAction, ReplyAction, StartError};
pub use timers::TimerManager;
