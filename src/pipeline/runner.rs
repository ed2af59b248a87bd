//! Pipeline runner — wires typed stages into a chain and waits for it to drain.

use std::future::Future;
use std::marker::PhantomData;

use async_trait::async_trait;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::task::{JoinHandle, JoinSet};
use tracing::{debug, warn};

use crate::error::PipelineError;

/// One step of a pipeline.
///
/// A stage reads `input` until it is closed and writes to `output`. The output
/// connector closes when `run` returns and every sender clone it handed to
/// spawned work has been dropped, so a stage must not return before its own
/// spawned work is done (see [`join_tasks`]).
#[async_trait]
pub trait Stage: Send + Sized + 'static {
    type Input: Send + 'static;
    type Output: Send + 'static;

    /// Stage name for logging.
    fn name(&self) -> &'static str;

    /// Consume the input stream and produce the output stream.
    async fn run(
        self,
        input: UnboundedReceiver<Self::Input>,
        output: UnboundedSender<Self::Output>,
    );
}

/// Adapts a plain async function into a [`Stage`].
pub struct FnStage<I, O, F> {
    name: &'static str,
    f: F,
    _items: PhantomData<fn(I) -> O>,
}

impl<I, O, F> FnStage<I, O, F> {
    pub fn new(name: &'static str, f: F) -> Self {
        Self {
            name,
            f,
            _items: PhantomData,
        }
    }
}

#[async_trait]
impl<I, O, F, Fut> Stage for FnStage<I, O, F>
where
    I: Send + 'static,
    O: Send + 'static,
    F: FnOnce(UnboundedReceiver<I>, UnboundedSender<O>) -> Fut + Send + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    type Input = I;
    type Output = O;

    fn name(&self) -> &'static str {
        self.name
    }

    async fn run(self, input: UnboundedReceiver<I>, output: UnboundedSender<O>) {
        (self.f)(input, output).await
    }
}

/// A running chain of stages whose last connector carries `T`.
pub struct Pipeline<T> {
    output: UnboundedReceiver<T>,
    stages: Vec<(&'static str, JoinHandle<()>)>,
}

impl<T: Send + 'static> Pipeline<T> {
    /// Start a pipeline whose first connector already holds every item and is closed.
    pub fn from_items<I>(items: I) -> Self
    where
        I: IntoIterator<Item = T>,
    {
        let (tx, rx) = mpsc::unbounded_channel();
        for item in items {
            // The receiver is alive right here, so sending cannot fail.
            let _ = tx.send(item);
        }
        Self {
            output: rx,
            stages: Vec::new(),
        }
    }

    /// Spawn `stage` reading from the current tail of the chain.
    pub fn stage<S>(mut self, stage: S) -> Pipeline<S::Output>
    where
        S: Stage<Input = T>,
    {
        let (tx, rx) = mpsc::unbounded_channel();
        let name = stage.name();
        let input = self.output;

        let handle = tokio::spawn(async move {
            debug!(stage = name, "Stage started");
            stage.run(input, tx).await;
            debug!(stage = name, "Stage finished, output closed");
        });
        self.stages.push((name, handle));

        Pipeline {
            output: rx,
            stages: self.stages,
        }
    }

    /// Number of stages spawned so far.
    pub fn len(&self) -> usize {
        self.stages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }

    /// Drain the final connector, then wait for every stage to terminate.
    ///
    /// A panic in any stage is re-raised here, so a crashed run never yields
    /// a partial result.
    pub async fn collect(self) -> Result<Vec<T>, PipelineError> {
        let Self { mut output, stages } = self;

        let mut items = Vec::new();
        while let Some(item) = output.recv().await {
            items.push(item);
        }

        for (name, handle) in stages {
            match handle.await {
                Ok(()) => {}
                Err(e) if e.is_panic() => std::panic::resume_unwind(e.into_panic()),
                Err(_) => return Err(PipelineError::StageAborted { stage: name }),
            }
        }

        Ok(items)
    }
}

/// Wait for every task a stage spawned. Panics are re-raised in the stage.
pub async fn join_tasks(stage: &'static str, mut tasks: JoinSet<()>) {
    while let Some(joined) = tasks.join_next().await {
        if let Err(e) = joined {
            if e.is_panic() {
                std::panic::resume_unwind(e.into_panic());
            }
            warn!(stage, error = %e, "Stage task was cancelled");
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    struct Doubler;

    #[async_trait]
    impl Stage for Doubler {
        type Input = u32;
        type Output = u32;

        fn name(&self) -> &'static str {
            "double"
        }

        async fn run(self, mut input: UnboundedReceiver<u32>, output: UnboundedSender<u32>) {
            while let Some(n) = input.recv().await {
                let _ = output.send(n * 2);
            }
        }
    }

    #[tokio::test]
    async fn no_stages_returns_seed_items() {
        let items = Pipeline::from_items(vec![1, 2, 3]).collect().await.unwrap();
        assert_eq!(items, vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn stages_chain_in_order() {
        let render = FnStage::new(
            "render",
            |mut rx: UnboundedReceiver<u32>, tx: UnboundedSender<String>| async move {
                while let Some(n) = rx.recv().await {
                    let _ = tx.send(format!("n={n}"));
                }
            },
        );
        let pipeline = Pipeline::from_items(1..=4u32)
            .stage(Doubler)
            .stage(Doubler)
            .stage(render);
        assert_eq!(pipeline.len(), 3);

        let items = pipeline.collect().await.unwrap();
        assert_eq!(items, vec!["n=4", "n=8", "n=12", "n=16"]);
    }

    #[tokio::test]
    async fn empty_input_drains_whole_chain() {
        let items = Pipeline::from_items(Vec::<u32>::new())
            .stage(Doubler)
            .stage(Doubler)
            .collect()
            .await
            .unwrap();
        assert!(items.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn output_stays_open_until_spawned_work_finishes() {
        let slow = FnStage::new(
            "slow",
            |mut rx: UnboundedReceiver<u64>, tx: UnboundedSender<u64>| async move {
                let mut tasks = JoinSet::new();
                while let Some(n) = rx.recv().await {
                    let tx = tx.clone();
                    tasks.spawn(async move {
                        tokio::time::sleep(Duration::from_millis(100 * n)).await;
                        let _ = tx.send(n);
                    });
                }
                join_tasks("slow", tasks).await;
            },
        );

        let mut items = Pipeline::from_items(vec![3, 1, 2])
            .stage(slow)
            .collect()
            .await
            .unwrap();
        items.sort_unstable();
        assert_eq!(items, vec![1, 2, 3]);
    }

    #[tokio::test]
    #[should_panic(expected = "stage blew up")]
    async fn stage_panic_aborts_the_run() {
        let faulty = FnStage::new(
            "faulty",
            |_rx: UnboundedReceiver<u32>, _tx: UnboundedSender<u32>| async move {
                panic!("stage blew up");
            },
        );
        let _ = Pipeline::from_items(vec![1])
            .stage(faulty)
            .stage(Doubler)
            .collect()
            .await;
    }

    #[tokio::test]
    #[should_panic(expected = "task blew up")]
    async fn spawned_task_panic_aborts_the_run() {
        let faulty = FnStage::new(
            "faulty",
            |mut rx: UnboundedReceiver<u32>, _tx: UnboundedSender<u32>| async move {
                let mut tasks = JoinSet::new();
                while rx.recv().await.is_some() {
                    tasks.spawn(async move {
                        panic!("task blew up");
                    });
                }
                join_tasks("faulty", tasks).await;
            },
        );
        let _ = Pipeline::from_items(vec![1]).stage(faulty).collect().await;
    }

    #[tokio::test]
    async fn cancelled_stage_reports_which_stage_aborted() {
        let stuck = FnStage::new(
            "stuck",
            |_rx: UnboundedReceiver<u32>, _tx: UnboundedSender<u32>| async move {
                std::future::pending::<()>().await;
            },
        );
        let pipeline = Pipeline::from_items(vec![1, 2]).stage(Doubler).stage(stuck);
        // Dropping the aborted task drops its sender, which closes the output.
        pipeline.stages[1].1.abort();

        let result = pipeline.collect().await;
        assert!(matches!(
            result,
            Err(PipelineError::StageAborted { stage: "stuck" })
        ));
    }
}
