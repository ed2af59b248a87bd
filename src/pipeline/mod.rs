//! Generic staged pipeline.
//!
//! A pipeline is a chain of stages joined by unbounded mpsc connectors:
//! 1. `Pipeline::from_items()` — pre-populates and closes the first connector
//! 2. `Pipeline::stage()` — spawns one stage wired to the previous connector
//! 3. `Pipeline::collect()` — drains the last connector, then joins every stage
//!
//! Each stage closes its output by dropping its sender once all of its own
//! spawned work has finished. That is the only completion signal downstream
//! gets.

pub mod runner;
pub mod types;

pub use runner::{FnStage, Pipeline, Stage, join_tasks};
pub use types::{Address, ClassifiedMessage, Message, MessageId, User};
