//! Ladder Engine - allocation planning service.

use anyhow::Result;
use ladder_common::config::Config;
use ladder_common::logging::init_logging_with_exclusions;
use ladder_common::Validate;
use ladder_engine::{AllocatorConfig, AllocatorService};

#[tokio::main]
async fn main() -> Result<()> {
    let startup_start = std::time::Instant::now();

    let config = Config::load_with_env()?;
    init_logging_with_exclusions(
        &config.observability.log_level,
        &config.observability.log_format,
        &config.observability.excluded_targets,
    );

    config.validate()?;
    let allocator = AllocatorConfig::from_config(&config)?;

    tracing::info!(
        benchmark = %allocator.universe.benchmark_ticker,
        bootstrap_cap = allocator.bootstrap_cap,
        "Ladder Engine v{}",
        env!("CARGO_PKG_VERSION")
    );

    let service = AllocatorService::new(config, allocator);

    let startup_duration = startup_start.elapsed();
    tracing::info!(
        duration_ms = startup_duration.as_millis() as u64,
        "Service initialized in {:?}",
        startup_duration
    );

    service.start().await
}
