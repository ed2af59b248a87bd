//! Spammer — concurrent spam-report pipeline.
//!
//! Resolves candidate addresses to unique users, fetches their messages in
//! batches, classifies each message with bounded parallelism and renders a
//! deterministically ordered report.

pub mod config;
pub mod error;
pub mod pipeline;
pub mod services;
pub mod spammer;
pub mod stages;

pub use config::{OutputFormat, PipelineConfig, SimulationConfig};
pub use error::{Error, Result};
pub use services::Services;
pub use spammer::{SpamPipeline, SpamReport};
