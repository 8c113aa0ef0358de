//! Imports OSM data into a search engine, layer by layer.

use std::process::ExitCode;

use clap::Parser;
use dotenv::dotenv;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use osm_indexer::{Cli, Dependencies, IndexingError, RunConfig};
use osm_indexer_shared::RunReport;

#[tokio::main]
async fn main() -> ExitCode {
    dotenv().ok();
    let cli = Cli::parse();
    let config = RunConfig::from(cli);

    init_tracing(config.verbose);

    match run(&config).await {
        Ok(report) => {
            log_summary(&report);
            if report.succeeded() {
                info!("Import done");
                ExitCode::SUCCESS
            } else {
                error!("Import finished with failed layers");
                ExitCode::FAILURE
            }
        }
        Err(error) => {
            error!(error = %error, "Import aborted");
            ExitCode::FAILURE
        }
    }
}

async fn run(config: &RunConfig) -> Result<RunReport, IndexingError> {
    info!("Starting import process");
    let dependencies = Dependencies::new(config).await?;
    let report = dependencies.orchestrator.run().await?;
    Ok(report)
}

fn init_tracing(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

/// Final per-layer summary table.
fn log_summary(report: &RunReport) {
    for layer in &report.layers {
        info!(
            layer = %layer.layer,
            state = ?layer.state,
            attempted = layer.attempted,
            indexed = layer.indexed,
            skipped = layer.skipped,
            final_count = ?layer.final_count,
            error = ?layer.error,
            "Layer summary"
        );
    }
    info!(
        indexed = report.total_indexed(),
        skipped = report.total_skipped(),
        "Run totals"
    );
}
