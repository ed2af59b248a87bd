//! The spam pipeline: addresses in, ordered report lines out.
//!
//! Flow:
//! 1. `ResolveStage` — resolve + dedup users
//! 2. `FetchStage` — batched message fetch
//! 3. `ClassifyStage` — bounded-parallel spam check
//! 4. `AggregateStage` — total order + rendering
//!
//! Failed fetches and classifications only shrink the report; they never fail
//! the run. How many were dropped is reported next to the lines.

use serde::Serialize;
use tracing::{info, instrument};

use crate::config::PipelineConfig;
use crate::error::Result;
use crate::pipeline::{Address, Pipeline};
use crate::services::Services;
use crate::stages::{AggregateStage, ClassifyStage, FetchStage, ResolveStage};

/// Output of one run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SpamReport {
    /// `"<has_spam> <id>"`, spam first, then ascending id.
    pub lines: Vec<String>,
    /// Batches whose messages were dropped because the fetch failed.
    pub failed_batches: usize,
    /// Messages dropped because classification failed.
    pub failed_classifications: usize,
}

pub struct SpamPipeline {
    services: Services,
    config: PipelineConfig,
}

impl SpamPipeline {
    pub fn new(services: Services, config: PipelineConfig) -> Self {
        Self { services, config }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Run all four stages over `addresses` and wait for the chain to drain.
    #[instrument(skip_all, fields(addresses = addresses.len()))]
    pub async fn run(&self, addresses: Vec<Address>) -> Result<SpamReport> {
        self.config.validate()?;

        let fetch = FetchStage::new(self.services.messages.clone(), self.config.batch_size);
        let classify = ClassifyStage::new(
            self.services.classifier.clone(),
            self.config.max_concurrent_classify,
        );
        let failed_batches = fetch.failures();
        let failed_classifications = classify.failures();

        let lines = Pipeline::from_items(addresses)
            .stage(ResolveStage::new(self.services.users.clone()))
            .stage(fetch)
            .stage(classify)
            .stage(AggregateStage)
            .collect()
            .await?;

        let report = SpamReport {
            lines,
            failed_batches: failed_batches.get(),
            failed_classifications: failed_classifications.get(),
        };
        info!(
            lines = report.lines.len(),
            failed_batches = report.failed_batches,
            failed_classifications = report.failed_classifications,
            "Pipeline run complete"
        );
        Ok(report)
    }
}
