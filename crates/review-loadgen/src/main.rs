//! Review Load Generator
//!
//! Runs one catalogue scenario against the review-assignment service and
//! prints the run report as JSON on stdout. Logs go to stderr.
//!
//! Exit codes: 0 when every threshold passed, 99 when any threshold was
//! crossed, 1 when the run could not complete.

use anyhow::Context;
use common::config::ObservabilityConfig;
use common::fixtures::FixtureSet;
use review_loadgen::config::Config;
use review_loadgen::observability::metrics::init_metrics_exporter;
use review_loadgen::runner;
use review_loadgen::scenarios;
use std::process::ExitCode;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Exit code when the run completed but thresholds were crossed.
const THRESHOLDS_CROSSED: u8 = 99;

fn init_tracing(observability: &ObservabilityConfig) {
    let filter = tracing_subscriber::EnvFilter::try_new(&observability.log_level)
        .unwrap_or_else(|_| common::config::DEFAULT_LOG_FILTER.into());

    let json = observability.json_logs.then(|| {
        tracing_subscriber::fmt::layer()
            .json()
            .with_writer(std::io::stderr)
    });
    let plain = (!observability.json_logs)
        .then(|| tracing_subscriber::fmt::layer().with_writer(std::io::stderr));

    tracing_subscriber::registry()
        .with(filter)
        .with(json)
        .with(plain)
        .init();
}

#[tokio::main]
async fn main() -> ExitCode {
    let config = Config::from_env();
    let observability = config
        .as_ref()
        .map(|c| c.observability.clone())
        .unwrap_or_default();
    init_tracing(&observability);

    let result = match config {
        Ok(config) => run(config).await,
        Err(e) => Err(e.into()),
    };

    match result {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::from(THRESHOLDS_CROSSED),
        Err(e) => {
            error!("Load generator failed: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(mut config: Config) -> anyhow::Result<bool> {
    // A positional argument overrides LOADGEN_SCENARIO.
    if let Some(arg) = std::env::args().nth(1) {
        if arg == "list" {
            for scenario in scenarios::catalogue() {
                println!("{:<16} {}", scenario.name, scenario.description);
            }
            return Ok(true);
        }
        config.scenario = arg;
    }

    if let Some(addr) = config.metrics_addr {
        init_metrics_exporter(addr).map_err(anyhow::Error::msg)?;
        info!(%addr, "Prometheus metrics exporter listening");
    }

    let scenario = scenarios::find(&config.scenario)?.with_overrides(&config);
    let fixtures = FixtureSet::load(&config.fixtures_path).with_context(|| {
        format!(
            "Failed to load fixtures from {}",
            config.fixtures_path.display()
        )
    })?;

    info!(
        scenario = scenario.name,
        base_url = %config.base_url,
        teams = fixtures.teams().len(),
        users = fixtures.user_count(),
        seed = ?config.seed,
        "Configuration loaded successfully"
    );

    let cancel = CancellationToken::new();
    tokio::spawn(shutdown_signal(cancel.clone()));

    let report = runner::run_scenario(&config, &scenario, &fixtures, &cancel).await?;
    println!("{}", serde_json::to_string_pretty(&report)?);

    if !report.passed {
        warn!(scenario = scenario.name, "Thresholds crossed");
    }
    Ok(report.passed)
}

/// Cancels the run on SIGINT. In-flight iterations drain before the report
/// is printed.
async fn shutdown_signal(cancel: CancellationToken) {
    match signal::ctrl_c().await {
        Ok(()) => {
            info!("Received SIGINT, stopping scenario...");
            cancel.cancel();
        }
        Err(e) => error!("Failed to listen for SIGINT: {}", e),
    }
}
