use anyhow::Context;
use tokio::io::{AsyncBufReadExt, BufReader};

use spammer::{OutputFormat, PipelineConfig, Services, SimulationConfig, SpamPipeline};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Logs go to stderr; stdout carries only the report.
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let config = PipelineConfig::from_env().context("invalid pipeline configuration")?;
    let sim = SimulationConfig::from_env().context("invalid simulation configuration")?;
    let format = OutputFormat::from_env().context("invalid output format")?;

    // Addresses from argv, or one per line on stdin.
    let mut addresses: Vec<String> = std::env::args().skip(1).collect();
    if addresses.is_empty() {
        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        while let Some(line) = lines.next_line().await.context("failed to read stdin")? {
            let line = line.trim();
            if !line.is_empty() {
                addresses.push(line.to_string());
            }
        }
    }

    let services = Services::simulated(&sim, &config);
    let pipeline = SpamPipeline::new(services, config);

    tracing::info!(
        addresses = addresses.len(),
        batch_size = pipeline.config().batch_size,
        max_concurrent_classify = pipeline.config().max_concurrent_classify,
        "Starting spam pipeline"
    );

    let report = pipeline.run(addresses).await?;

    match format {
        OutputFormat::Text => {
            for line in &report.lines {
                println!("{line}");
            }
        }
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
    }

    Ok(())
}
