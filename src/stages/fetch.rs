//! Batch-fetch stage — groups users and fetches their messages in bulk.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender};
use tokio::task::JoinSet;
use tracing::{debug, warn};

use super::DropCounter;
use crate::pipeline::{MessageId, Stage, User, join_tasks};
use crate::services::MessageStore;

const STAGE: &str = "fetch";

/// Wait for the next batch of up to `max` items.
///
/// Returns as soon as the batch is full or the input closes, so the last
/// batch may be short. `None` once the input is closed and empty.
pub async fn next_batch<T>(input: &mut UnboundedReceiver<T>, max: usize) -> Option<Vec<T>> {
    let first = input.recv().await?;

    // `max` comes from config and may be huge; don't reserve it up front.
    let mut batch = Vec::with_capacity(max.min(64));
    batch.push(first);
    while batch.len() < max {
        match input.recv().await {
            Some(item) => batch.push(item),
            None => break,
        }
    }
    Some(batch)
}

/// Fetches messages one batch per call and forwards their ids individually.
///
/// A failed fetch drops the whole batch.
pub struct FetchStage {
    store: Arc<dyn MessageStore>,
    batch_size: usize,
    failures: DropCounter,
}

impl FetchStage {
    pub fn new(store: Arc<dyn MessageStore>, batch_size: usize) -> Self {
        Self {
            store,
            batch_size: batch_size.max(1),
            failures: DropCounter::default(),
        }
    }

    /// Handle on the number of batches dropped after a failed fetch.
    pub fn failures(&self) -> DropCounter {
        self.failures.clone()
    }
}

#[async_trait]
impl Stage for FetchStage {
    type Input = User;
    type Output = MessageId;

    fn name(&self) -> &'static str {
        STAGE
    }

    async fn run(self, mut input: UnboundedReceiver<User>, output: UnboundedSender<MessageId>) {
        let mut tasks = JoinSet::new();
        let mut dispatched = 0usize;

        while let Some(batch) = next_batch(&mut input, self.batch_size).await {
            dispatched += 1;
            let store = Arc::clone(&self.store);
            let output = output.clone();
            let failures = self.failures.clone();

            tasks.spawn(async move {
                match store.fetch_messages(&batch).await {
                    Ok(messages) => {
                        debug!(
                            stage = STAGE,
                            batch_size = batch.len(),
                            messages = messages.len(),
                            "Fetched batch"
                        );
                        for message in messages {
                            if output.send(message.id).is_err() {
                                debug!(stage = STAGE, "Downstream closed, dropping messages");
                                return;
                            }
                        }
                    }
                    Err(e) => {
                        warn!(
                            stage = STAGE,
                            batch_size = batch.len(),
                            error = %e,
                            "Batch fetch failed, dropping its messages"
                        );
                        failures.record();
                    }
                }
            });
        }

        join_tasks(STAGE, tasks).await;
        debug!(
            stage = STAGE,
            batches = dispatched,
            failed = self.failures.get(),
            "All batches fetched"
        );
    }
}
