//! The four stages of the spam pipeline, in pipeline order:
//! 1. `ResolveStage` — address -> unique `User`
//! 2. `FetchStage` — batches users, fans messages back out one by one
//! 3. `ClassifyStage` — bounded-parallel spam check per message
//! 4. `AggregateStage` — sorts everything and renders report lines

pub mod aggregate;
pub mod classify;
pub mod fetch;
pub mod resolve;

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

pub use aggregate::{AggregateStage, sort_report};
pub use classify::ClassifyStage;
pub use fetch::{FetchStage, next_batch};
pub use resolve::ResolveStage;

/// Count of items a stage dropped after a collaborator failure.
///
/// Cloning shares the count, so a caller can keep a handle while the stage
/// itself is moved into the pipeline.
#[derive(Debug, Clone, Default)]
pub struct DropCounter(Arc<AtomicUsize>);

impl DropCounter {
    pub fn record(&self) {
        self.0.fetch_add(1, Ordering::Relaxed);
    }

    pub fn get(&self) -> usize {
        self.0.load(Ordering::Relaxed)
    }
}
