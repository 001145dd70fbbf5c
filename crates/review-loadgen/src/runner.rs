//! Scenario orchestration.
//!
//! A run goes through health check, team setup, seeding, the scheduled
//! window, optional cleanup and threshold evaluation, in that order.

use crate::client::ReviewClient;
use crate::config::Config;
use crate::errors::LoadgenError;
use crate::observability::{MetricsCollector, RunMetrics};
use crate::provisioner::{self, ProvisionReport, SeedStrategy};
use crate::scenarios::{RunContext, Scenario, ScenarioWorkload, TeamSetup, WorkloadKind};
use crate::scheduler::{Scheduler, SchedulerReport};
use crate::teardown::{self, CleanupSummary};
use crate::thresholds::{self, ThresholdReport};
use chrono::{DateTime, Utc};
use common::fixtures::FixtureSet;
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::Serialize;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{info, instrument, warn};
use uuid::Uuid;

/// Everything a run produced.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub scenario: String,
    pub started_at: DateTime<Utc>,
    /// Per-run token embedded in generated team names.
    pub run_base: String,
    pub provision: ProvisionReport,
    pub scheduler: SchedulerReport,
    pub cleanup: Option<CleanupSummary>,
    pub metrics: RunMetrics,
    pub thresholds: ThresholdReport,
    pub passed: bool,
}

/// `<yyyymmddHHMMSS>_<8 hex>`, unique per run.
fn run_base(started_at: DateTime<Utc>) -> String {
    let id: String = Uuid::new_v4().simple().to_string().chars().take(8).collect();
    format!("{}_{id}", started_at.format("%Y%m%d%H%M%S"))
}

/// Fixtures as the service will see them for this scenario.
fn prepare_fixtures(teams: TeamSetup, fixtures: &FixtureSet, run_base: &str) -> FixtureSet {
    match teams {
        TeamSetup::UniqueSuffix => fixtures.with_unique_suffix(run_base).with_all_active(),
        TeamSetup::None | TeamSetup::Fixtures => fixtures.clone(),
    }
}

/// Run `scenario` against the configured service.
///
/// Service-side failures never abort a run; they land in the metrics and
/// the threshold report.
///
/// # Errors
///
/// Returns an error when the HTTP client cannot be built, the health check
/// fails or the profile is unschedulable.
#[instrument(skip_all, fields(scenario = %scenario.name))]
pub async fn run_scenario(
    config: &Config,
    scenario: &Scenario,
    fixtures: &FixtureSet,
    cancel: &CancellationToken,
) -> Result<RunReport, LoadgenError> {
    scenario.executor.validate()?;

    let started_at = Utc::now();
    let run_base = run_base(started_at);
    let collector = MetricsCollector::new();
    let client = ReviewClient::new(
        &config.base_url,
        config.http_timeout,
        collector.clone(),
        config.reassign_field,
    )?;

    info!(
        target: "loadgen.runner",
        base_url = %config.base_url,
        run_base = %run_base,
        thresholds = scenario.thresholds.len(),
        "Starting scenario"
    );

    if config.skip_healthcheck {
        info!(target: "loadgen.runner", "Skipping health check");
    } else {
        client.health_check().await?;
    }

    let fixtures = prepare_fixtures(scenario.teams, fixtures, &run_base);
    let mut setup_rng = match config.seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    };

    let (provisioned, provision_report) = if scenario.teams == TeamSetup::None {
        let mut report = ProvisionReport::default();
        let result = provisioner::seed_pull_requests(
            &client,
            &fixtures,
            scenario.seed,
            &mut setup_rng,
            &mut report,
        )
        .await;
        (result, report)
    } else {
        provisioner::provision(&client, &fixtures, scenario.seed, &mut setup_rng).await
    };

    let run = Arc::new(RunContext::new(
        client.clone(),
        fixtures,
        provisioned.pr_ids.clone(),
        config.seed,
        run_base.clone(),
        config.chaos_burst,
    ));

    if scenario.workload == WorkloadKind::SliReassign {
        if provisioned.chaos_entries.is_empty() && scenario.seed != SeedStrategy::None {
            warn!(
                target: "loadgen.runner",
                "No seeded pull requests have reviewers, reassign iterations will idle"
            );
        }
        run.registry.publish(provisioned.chaos_entries.clone()).await;
    }

    let workload = Arc::new(ScenarioWorkload::new(scenario.workload, Arc::clone(&run)));
    let window_started = Instant::now();
    let scheduler_report = Scheduler::new(scenario.executor.clone(), collector.clone())
        .run(workload, cancel)
        .await?;
    let window = window_started.elapsed();

    let cleanup = if scenario.cleanup {
        let mut pr_ids = provisioned.pr_ids;
        pr_ids.extend(run.registry.pr_ids().await);
        Some(teardown::cleanup_pull_requests(&client, &pr_ids).await)
    } else {
        None
    };

    let metrics = collector.snapshot(measured_window(window, &scheduler_report));
    let threshold_report = thresholds::evaluate(&scenario.thresholds, &metrics);
    let passed = threshold_report.passed();

    info!(
        target: "loadgen.runner",
        iterations = scheduler_report.iterations,
        dropped_iterations = scheduler_report.dropped_iterations,
        measured_requests = metrics.measured.requests,
        passed,
        "Scenario complete"
    );
    for failure in threshold_report.failures() {
        warn!(
            target: "loadgen.runner",
            threshold = %failure.threshold,
            observed = failure.observed,
            "Threshold crossed"
        );
    }

    Ok(RunReport {
        scenario: scenario.name.to_string(),
        started_at,
        run_base,
        provision: provision_report,
        scheduler: scheduler_report,
        cleanup,
        metrics,
        thresholds: threshold_report,
        passed,
    })
}

/// Rates are computed over the scheduled window, not setup or cleanup.
fn measured_window(wall: Duration, report: &SchedulerReport) -> Duration {
    if report.elapsed_secs > 0.0 {
        Duration::from_secs_f64(report.elapsed_secs)
    } else {
        wall
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    const FIXTURES: &str = r#"[
        {"team": "backend", "users": [{"user_id": "u1", "is_active": false}, "u2"]}
    ]"#;

    #[test]
    fn test_run_base_shape() {
        let base = run_base(Utc::now());
        let (stamp, id) = base.split_once('_').unwrap();
        assert_eq!(stamp.len(), 14);
        assert!(stamp.chars().all(|c| c.is_ascii_digit()));
        assert_eq!(id.len(), 8);
    }

    #[test]
    fn test_unique_suffix_setup_renames_and_activates() {
        let fixtures = FixtureSet::parse(FIXTURES).unwrap();
        let prepared = prepare_fixtures(TeamSetup::UniqueSuffix, &fixtures, "run1");

        let team = prepared.teams().first().unwrap();
        assert_ne!(team.name, "backend");
        assert!(team.name.contains("run1"));
        assert!(team.members.iter().all(|m| m.is_active));
    }

    #[test]
    fn test_fixture_setup_keeps_names() {
        let fixtures = FixtureSet::parse(FIXTURES).unwrap();
        let prepared = prepare_fixtures(TeamSetup::Fixtures, &fixtures, "run1");
        assert_eq!(prepared, fixtures);
    }

    #[test]
    fn test_measured_window_prefers_scheduler_elapsed() {
        let report = SchedulerReport {
            elapsed_secs: 2.5,
            ..SchedulerReport::default()
        };
        assert_eq!(
            measured_window(Duration::from_secs(9), &report),
            Duration::from_millis(2500)
        );
        assert_eq!(
            measured_window(Duration::from_secs(9), &SchedulerReport::default()),
            Duration::from_secs(9)
        );
    }
}
