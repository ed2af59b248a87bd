//! Bounded-classify stage — one task per message, gated by a semaphore.
//!
//! Every message gets its own task immediately; the semaphore only bounds how
//! many of them are inside `SpamClassifier::classify` at once. A permit is
//! held for exactly the duration of the call.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Semaphore;
use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender};
use tokio::task::JoinSet;
use tracing::{debug, warn};

use super::DropCounter;
use crate::pipeline::{ClassifiedMessage, MessageId, Stage, join_tasks};
use crate::services::SpamClassifier;

const STAGE: &str = "classify";

pub struct ClassifyStage {
    classifier: Arc<dyn SpamClassifier>,
    max_concurrent: usize,
    failures: DropCounter,
}

impl ClassifyStage {
    pub fn new(classifier: Arc<dyn SpamClassifier>, max_concurrent: usize) -> Self {
        Self {
            classifier,
            max_concurrent: max_concurrent.clamp(1, Semaphore::MAX_PERMITS),
            failures: DropCounter::default(),
        }
    }

    /// Handle on the number of messages dropped after a failed classify call.
    pub fn failures(&self) -> DropCounter {
        self.failures.clone()
    }
}

#[async_trait]
impl Stage for ClassifyStage {
    type Input = MessageId;
    type Output = ClassifiedMessage;

    fn name(&self) -> &'static str {
        STAGE
    }

    async fn run(
        self,
        mut input: UnboundedReceiver<MessageId>,
        output: UnboundedSender<ClassifiedMessage>,
    ) {
        let gate = Arc::new(Semaphore::new(self.max_concurrent));
        let mut tasks = JoinSet::new();

        while let Some(id) = input.recv().await {
            let classifier = Arc::clone(&self.classifier);
            let gate = Arc::clone(&gate);
            let output = output.clone();
            let failures = self.failures.clone();

            tasks.spawn(async move {
                // The gate is never closed, so acquire only fails if that changes.
                let Ok(permit) = gate.acquire().await else {
                    warn!(
                        stage = STAGE,
                        message_id = %id,
                        "Classify gate closed, dropping message"
                    );
                    return;
                };
                let verdict = classifier.classify(id).await;
                drop(permit);

                match verdict {
                    Ok(has_spam) => {
                        if output.send(ClassifiedMessage { id, has_spam }).is_err() {
                            debug!(stage = STAGE, "Downstream closed, dropping verdict");
                        }
                    }
                    Err(e) => {
                        warn!(
                            stage = STAGE,
                            message_id = %id,
                            error = %e,
                            "Classification failed, dropping message"
                        );
                        failures.record();
                    }
                }
            });
        }

        join_tasks(STAGE, tasks).await;
        debug!(stage = STAGE, failed = self.failures.get(), "All messages classified");
    }
}
