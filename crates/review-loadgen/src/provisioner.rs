//! Fixture provisioning.
//!
//! Runs once before the measured window. Every call is tagged `prep`, and
//! every call is best-effort: a failure is logged and counted and
//! provisioning moves on to the next entity.

use crate::actions;
use crate::client::ReviewClient;
use crate::outcome::{Accepted, Tag};
use crate::registry::ProvisionResult;
use common::fixtures::FixtureSet;
use rand::Rng;
use serde::Serialize;
use tracing::{debug, info, warn};

/// How seed pull requests are distributed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SeedStrategy {
    #[default]
    None,
    /// `count` pull requests, each in a uniformly random team.
    Random { count: usize },
    /// `per_team` pull requests in every team with at least `min_members`.
    PerTeam { per_team: usize, min_members: usize },
}

impl SeedStrategy {
    /// Same distribution with a different size. `None` stays `None` unless
    /// a positive count is requested, which becomes `Random`.
    #[must_use]
    pub fn with_count(self, count: usize) -> Self {
        match self {
            SeedStrategy::None | SeedStrategy::Random { .. } if count == 0 => SeedStrategy::None,
            SeedStrategy::None | SeedStrategy::Random { .. } => SeedStrategy::Random { count },
            SeedStrategy::PerTeam { min_members, .. } => SeedStrategy::PerTeam {
                per_team: count,
                min_members,
            },
        }
    }
}

/// Counts of what provisioning did.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ProvisionReport {
    pub teams_created: usize,
    pub teams_existing: usize,
    pub teams_failed: usize,
    pub pull_requests_created: usize,
    pub pull_requests_failed: usize,
    /// Seeded pull requests that came back without reviewers.
    pub pull_requests_without_reviewers: usize,
}

/// Create every fixture team.
pub async fn create_teams(
    client: &ReviewClient,
    fixtures: &FixtureSet,
    report: &mut ProvisionReport,
) {
    for team in fixtures.teams() {
        let outcome = actions::create_team(client, team, Tag::Prep).await;
        match outcome.status {
            200 | 201 => {
                report.teams_created += 1;
                debug!(target: "loadgen.provision", team = %team.name, "Team created");
            }
            400 | 409 => {
                report.teams_existing += 1;
                debug!(target: "loadgen.provision", team = %team.name, "Team already exists");
            }
            status => {
                report.teams_failed += 1;
                warn!(
                    target: "loadgen.provision",
                    team = %team.name,
                    status,
                    "Team creation failed"
                );
            }
        }
    }
}

/// Seed pull requests according to `strategy`.
pub async fn seed_pull_requests<R: Rng + Send>(
    client: &ReviewClient,
    fixtures: &FixtureSet,
    strategy: SeedStrategy,
    rng: &mut R,
    report: &mut ProvisionReport,
) -> ProvisionResult {
    let mut result = ProvisionResult::default();

    match strategy {
        SeedStrategy::None => {}
        SeedStrategy::Random { count } => {
            for _ in 0..count {
                let creation = actions::create_pull_request(
                    client,
                    fixtures,
                    rng,
                    Tag::Prep,
                    Accepted::PR_CREATE_PREP,
                )
                .await;
                absorb(creation, &mut result, report);
            }
        }
        SeedStrategy::PerTeam {
            per_team,
            min_members,
        } => {
            for team in fixtures.teams() {
                if team.members.len() < min_members {
                    debug!(
                        target: "loadgen.provision",
                        team = %team.name,
                        members = team.members.len(),
                        min_members,
                        "Team too small for seeding, skipping"
                    );
                    continue;
                }
                for _ in 0..per_team {
                    let creation = actions::create_pull_request_in(
                        client,
                        team,
                        rng,
                        Tag::Prep,
                        Accepted::PR_CREATE_PREP,
                    )
                    .await;
                    absorb(creation, &mut result, report);
                }
            }
        }
    }

    result
}

fn absorb(
    creation: actions::PullRequestCreation,
    result: &mut ProvisionResult,
    report: &mut ProvisionReport,
) {
    match creation.created {
        Some(entry) => {
            report.pull_requests_created += 1;
            result.pr_ids.push(entry.pr_id.clone());
            if entry.reviewers.is_empty() {
                report.pull_requests_without_reviewers += 1;
            } else {
                result.chaos_entries.push(entry);
            }
        }
        None if creation.outcome.is_skipped() => {}
        None => {
            report.pull_requests_failed += 1;
            warn!(
                target: "loadgen.provision",
                status = creation.outcome.status,
                "Seed pull request creation failed"
            );
        }
    }
}

/// Create teams, then seed pull requests.
pub async fn provision<R: Rng + Send>(
    client: &ReviewClient,
    fixtures: &FixtureSet,
    strategy: SeedStrategy,
    rng: &mut R,
) -> (ProvisionResult, ProvisionReport) {
    let mut report = ProvisionReport::default();

    create_teams(client, fixtures, &mut report).await;
    let result = seed_pull_requests(client, fixtures, strategy, rng, &mut report).await;

    info!(
        target: "loadgen.provision",
        teams_created = report.teams_created,
        teams_existing = report.teams_existing,
        teams_failed = report.teams_failed,
        pull_requests_created = report.pull_requests_created,
        pull_requests_failed = report.pull_requests_failed,
        "Provisioning complete"
    );

    (result, report)
}
