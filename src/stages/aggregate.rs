//! Aggregate stage — waits for every verdict, sorts, emits report lines.

use async_trait::async_trait;
use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender};
use tracing::debug;

use crate::pipeline::{ClassifiedMessage, Stage};

const STAGE: &str = "aggregate";

/// Sort into report order: spam first, then ascending id.
pub fn sort_report(messages: &mut [ClassifiedMessage]) {
    messages.sort_by(ClassifiedMessage::report_order);
}

/// Sequential barrier at the end of the pipeline. Nothing is emitted until the
/// input has closed.
#[derive(Debug, Default)]
pub struct AggregateStage;

#[async_trait]
impl Stage for AggregateStage {
    type Input = ClassifiedMessage;
    type Output = String;

    fn name(&self) -> &'static str {
        STAGE
    }

    async fn run(
        self,
        mut input: UnboundedReceiver<ClassifiedMessage>,
        output: UnboundedSender<String>,
    ) {
        let mut results = Vec::new();
        while let Some(message) = input.recv().await {
            results.push(message);
        }

        sort_report(&mut results);
        debug!(stage = STAGE, messages = results.len(), "Emitting report");

        for message in results {
            if output.send(message.to_string()).is_err() {
                debug!(stage = STAGE, "Downstream closed, report truncated");
                return;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::Pipeline;

    fn shuffled() -> Vec<ClassifiedMessage> {
        vec![
            ClassifiedMessage::new(10, false),
            ClassifiedMessage::new(3, true),
            ClassifiedMessage::new(2, false),
            ClassifiedMessage::new(11, true),
            ClassifiedMessage::new(1, true),
        ]
    }

    #[test]
    fn sort_is_idempotent() {
        let mut once = shuffled();
        sort_report(&mut once);
        let mut twice = once.clone();
        sort_report(&mut twice);
        assert_eq!(once, twice);
    }

    #[test]
    fn sort_orders_spam_first_then_id() {
        let mut messages = shuffled();
        sort_report(&mut messages);

        let split = messages.iter().position(|m| !m.has_spam).unwrap();
        assert!(messages[..split].iter().all(|m| m.has_spam));
        assert!(messages[split..].iter().all(|m| !m.has_spam));
        assert!(messages[..split].windows(2).all(|w| w[0].id < w[1].id));
        assert!(messages[split..].windows(2).all(|w| w[0].id < w[1].id));
    }

    #[tokio::test]
    async fn renders_sorted_lines() {
        let lines = Pipeline::from_items(shuffled())
            .stage(AggregateStage)
            .collect()
            .await
            .unwrap();
        assert_eq!(
            lines,
            vec!["true 1", "true 3", "true 11", "false 2", "false 10"]
        );
    }

    #[tokio::test]
    async fn empty_input_empty_report() {
        let lines = Pipeline::from_items(Vec::<ClassifiedMessage>::new())
            .stage(AggregateStage)
            .collect()
            .await
            .unwrap();
        assert!(lines.is_empty());
    }
}
