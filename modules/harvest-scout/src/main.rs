use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use clap::Parser;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use harvest_common::{ConfigError, EnvConfig, HarvestError};
use harvest_fetch::HttpPageFetcher;
use harvest_scout::cli::Cli;
use harvest_scout::{write_report, write_reviews, PipelineOrchestrator};

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_tracing(cli.log_json);

    let code = match run(cli).await {
        Ok(()) => 0,
        Err(e) => {
            error!(error = %e, "Harvest failed");
            e.exit_code()
        }
    };
    std::process::exit(code);
}

fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("review_harvest=info,harvest_scout=info,harvest_fetch=info,harvest_common=info,browserless_client=info"));
    let json = json
        || std::env::var("LOG_FORMAT")
            .map(|v| v.eq_ignore_ascii_case("json"))
            .unwrap_or(false);

    if json {
        tracing_subscriber::fmt().with_env_filter(filter).json().init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}

async fn run(cli: Cli) -> Result<(), HarvestError> {
    let env = EnvConfig::from_env();
    let config = cli.into_config(&env)?;
    config.log_summary();

    let fetcher = Arc::new(
        HttpPageFetcher::from_config(&config).map_err(|e| ConfigError::Backend(format!("{e:#}")))?,
    );

    let cancel = Arc::new(AtomicBool::new(false));
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("Interrupt received, finishing in-flight pages");
                cancel.store(true, Ordering::Relaxed);
            }
        });
    }

    let orchestrator = PipelineOrchestrator::new(config.clone(), fetcher.clone(), cancel);
    let (reviews, report) = orchestrator.run().await;
    fetcher.shutdown();

    write_reviews(&config.output_path, &reviews)?;
    write_report(&config.report_path(), &report)?;
    info!("{report}");

    for source in report.flagged_sources() {
        if let Some(r) = report.sources.get(&source) {
            warn!(source = %source, status = ?r.status, warnings = r.warnings.len(), "Source did not complete");
        }
    }

    if !report.any_source_produced_data() {
        return Err(HarvestError::NoData);
    }
    Ok(())
}
