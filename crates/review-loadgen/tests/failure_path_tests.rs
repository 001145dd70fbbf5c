//! Failure-path tests.
//!
//! Tests best-effort behavior when the service misbehaves or a workload has
//! nothing to do:
//!
//! - cleanup tallies failed merges and keeps going
//! - provisioning records a failed team and keeps going
//! - idle workloads back off without issuing requests
//!
//! # Test Setup
//!
//! Tests use wiremock to stand in for the review-assignment service.

// Test code is allowed to use expect/unwrap for assertions
#![allow(clippy::unwrap_used, clippy::expect_used)]

use anyhow::Result;
use common::fixtures::FixtureSet;
use common::types::ReassignField;
use rand::rngs::StdRng;
use rand::SeedableRng;
use review_loadgen::client::ReviewClient;
use review_loadgen::mixer::ThinkTime;
use review_loadgen::observability::MetricsCollector;
use review_loadgen::provisioner::{self, SeedStrategy};
use review_loadgen::scenarios::{RunContext, ScenarioWorkload, WorkloadKind};
use review_loadgen::scheduler::{ExecutorConfig, IterationContext, Scheduler, Workload};
use review_loadgen::teardown;
use serde_json::json;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use wiremock::matchers::{any, body_partial_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

// ============================================================================
// Test Helpers
// ============================================================================

fn client_for(server: &MockServer) -> ReviewClient {
    ReviewClient::new(
        server.uri(),
        Duration::from_secs(2),
        MetricsCollector::new(),
        ReassignField::default(),
    )
    .unwrap()
}

/// Fails the test on drop if any request reaches the server.
async fn silent_server() -> MockServer {
    let server = MockServer::start().await;
    Mock::given(any())
        .respond_with(ResponseTemplate::new(500))
        .expect(0)
        .mount(&server)
        .await;
    server
}

fn workload(server: &MockServer, fixtures: &str, kind: WorkloadKind) -> ScenarioWorkload {
    let run = RunContext::new(
        client_for(server),
        FixtureSet::parse(fixtures).unwrap(),
        Vec::new(),
        Some(9),
        "test".to_string(),
        10,
    );
    ScenarioWorkload::new(kind, Arc::new(run))
}

const MEMBERLESS: &str = r#"[{ "team": "ghosts", "users": [] }]"#;

const THREE_TEAMS: &str = r#"[
    { "team": "backend", "users": ["u1", "u2", "u3"] },
    { "team": "frontend", "users": ["u4", "u5", "u6"] },
    { "team": "platform", "users": ["u7", "u8", "u9"] }
]"#;

// ============================================================================
// Cleanup
// ============================================================================

#[tokio::test]
async fn test_cleanup_counts_failed_merge_and_continues() -> Result<()> {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/pullRequest/merge"))
        .and(body_partial_json(json!({"pull_request_id": "pr-2"})))
        .respond_with(ResponseTemplate::new(500))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/pullRequest/merge"))
        .and(body_partial_json(json!({"pull_request_id": "pr-3"})))
        .respond_with(ResponseTemplate::new(404))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/pullRequest/merge"))
        .respond_with(ResponseTemplate::new(200))
        .expect(2)
        .mount(&server)
        .await;

    let client = client_for(&server);
    let ids: Vec<String> = ["pr-1", "pr-2", "pr-3", "pr-4"]
        .iter()
        .map(ToString::to_string)
        .collect();

    let summary = teardown::cleanup_pull_requests(&client, &ids).await;

    assert_eq!(summary.attempted, 4);
    assert_eq!(summary.merged, 2);
    assert_eq!(summary.failed, 2);
    let metrics = client.collector().snapshot(Duration::from_secs(1));
    assert_eq!(metrics.prep.requests, 4);
    assert_eq!(metrics.measured.requests, 0);
    Ok(())
}

// ============================================================================
// Provisioning
// ============================================================================

#[tokio::test]
async fn test_team_server_error_is_recorded_and_provisioning_continues() -> Result<()> {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/team/add"))
        .and(body_partial_json(json!({"team_name": "frontend"})))
        .respond_with(ResponseTemplate::new(503))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/team/add"))
        .respond_with(ResponseTemplate::new(201))
        .expect(2)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/pullRequest/create"))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({
            "pr": {
                "pull_request_id": "ignored",
                "pull_request_name": "feat: x",
                "author_id": "u1",
                "status": "OPEN",
                "assigned_reviewers": ["u2"]
            }
        })))
        .expect(3)
        .mount(&server)
        .await;

    let client = client_for(&server);
    let fixtures = FixtureSet::parse(THREE_TEAMS)?;
    let mut rng = StdRng::seed_from_u64(4);

    let (result, report) = provisioner::provision(
        &client,
        &fixtures,
        SeedStrategy::Random { count: 3 },
        &mut rng,
    )
    .await;

    assert_eq!(report.teams_created, 2);
    assert_eq!(report.teams_failed, 1);
    assert_eq!(report.pull_requests_created, 3);
    assert_eq!(result.pr_ids.len(), 3);

    let metrics = client.collector().snapshot(Duration::from_secs(1));
    assert_eq!(metrics.prep.requests, 6);
    assert_eq!(metrics.prep.failed, 1);
    Ok(())
}

// ============================================================================
// Idle Workloads
// ============================================================================

#[tokio::test]
async fn test_chaos_consumer_is_silent_until_registry_published() -> Result<()> {
    let server = silent_server().await;
    let workload = workload(
        &server,
        THREE_TEAMS,
        WorkloadKind::ChaosReassign {
            think: ThinkTime::millis(0, 0),
        },
    );

    // Stream 2 never produces.
    let ctx = IterationContext::new(2, 0, CancellationToken::new());
    let started = Instant::now();
    workload.iteration(&ctx).await;

    assert!(started.elapsed() >= Duration::from_millis(900));
    assert!(server.received_requests().await.unwrap_or_default().is_empty());
    Ok(())
}

#[tokio::test]
async fn test_create_without_members_backs_off() -> Result<()> {
    let server = silent_server().await;
    let workload = workload(&server, MEMBERLESS, WorkloadKind::SpikeCreate);

    let ctx = IterationContext::new(1, 0, CancellationToken::new());
    let started = Instant::now();
    workload.iteration(&ctx).await;

    assert!(started.elapsed() >= Duration::from_millis(450));
    Ok(())
}

#[tokio::test]
async fn test_memberless_streams_do_not_spin() -> Result<()> {
    let server = silent_server().await;
    let workload: Arc<dyn Workload> =
        Arc::new(workload(&server, MEMBERLESS, WorkloadKind::SliPrCreate));
    let scheduler = Scheduler::new(
        ExecutorConfig::ConstantVus {
            vus: 4,
            duration: Duration::from_secs(1),
        },
        MetricsCollector::new(),
    );

    let report = scheduler.run(workload, &CancellationToken::new()).await?;

    // Four streams backing off 500ms each fit a handful of iterations in 1s.
    assert!(
        report.iterations <= 16,
        "streams spun: {} iterations",
        report.iterations
    );
    Ok(())
}
