//! Per-iteration behavior of each scenario.

use super::WorkloadKind;
use crate::actions;
use crate::client::ReviewClient;
use crate::mixer::{realistic_mix, MixAction, ThinkTime, WeightedMix};
use crate::outcome::{Accepted, ActionOutcome, Tag};
use crate::registry::{ChaosRegistry, ChaosRegistryEntry};
use crate::scheduler::{IterationContext, Workload};
use async_trait::async_trait;
use common::fixtures::FixtureSet;
use common::types::Team;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::Rng;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, info};

/// Back-off when the chaos registry has nothing to offer yet.
const CHAOS_EMPTY_BACKOFF: Duration = Duration::from_secs(1);

/// Pause after the chaos producer publishes.
const CHAOS_PUBLISH_PAUSE: Duration = Duration::from_secs(3);

/// Back-off when a target cannot be reassigned or nothing was seeded.
const SKIP_BACKOFF: Duration = Duration::from_millis(500);

/// Smoke iteration pause.
const SMOKE_PAUSE: Duration = Duration::from_secs(1);

/// Most recent created pull requests kept as merge targets.
const KNOWN_PR_CAPACITY: usize = 10_000;

/// Shared, read-mostly state of one run.
#[derive(Debug)]
pub struct RunContext {
    pub client: ReviewClient,
    /// Fixtures as used against the service (possibly renamed).
    pub fixtures: FixtureSet,
    pub user_ids: Vec<String>,
    pub registry: ChaosRegistry,
    /// Pull requests seeded during setup.
    pub seed_pr_ids: Vec<String>,
    pub seed: Option<u64>,
    /// Per-run token used in generated names.
    pub run_base: String,
    pub chaos_burst: usize,
    team_counter: AtomicU64,
    /// Open pull requests the mix may merge, oldest first.
    known_pr_ids: Mutex<VecDeque<String>>,
}

impl RunContext {
    #[must_use]
    pub fn new(
        client: ReviewClient,
        fixtures: FixtureSet,
        seed_pr_ids: Vec<String>,
        seed: Option<u64>,
        run_base: String,
        chaos_burst: usize,
    ) -> Self {
        let user_ids = fixtures.all_user_ids();
        let known_pr_ids = seed_pr_ids.iter().cloned().collect();
        Self {
            client,
            fixtures,
            user_ids,
            registry: ChaosRegistry::new(),
            seed_pr_ids,
            seed,
            run_base,
            chaos_burst,
            team_counter: AtomicU64::new(0),
            known_pr_ids: Mutex::new(known_pr_ids),
        }
    }

    fn next_team_name(&self) -> String {
        let n = self.team_counter.fetch_add(1, Ordering::Relaxed);
        format!("sli_team_{}_{n}", self.run_base)
    }

    /// Offer a created pull request as a merge target.
    pub async fn remember_pull_request(&self, pr_id: String) {
        let mut known = self.known_pr_ids.lock().await;
        if known.len() >= KNOWN_PR_CAPACITY {
            known.pop_front();
        }
        known.push_back(pr_id);
    }

    /// Remove and return a random known pull request.
    pub async fn take_known_pull_request<R: Rng>(&self, rng: &mut R) -> Option<String> {
        let mut known = self.known_pr_ids.lock().await;
        if known.is_empty() {
            return None;
        }
        let index = rng.gen_range(0..known.len());
        known.swap_remove_back(index)
    }
}

/// A [`WorkloadKind`] bound to a run.
pub struct ScenarioWorkload {
    kind: WorkloadKind,
    run: Arc<RunContext>,
    mix: WeightedMix<MixAction>,
}

impl ScenarioWorkload {
    #[must_use]
    pub fn new(kind: WorkloadKind, run: Arc<RunContext>) -> Self {
        Self {
            kind,
            run,
            mix: realistic_mix(),
        }
    }

    /// Replace the realistic-mix action table.
    #[must_use]
    pub fn with_mix(mut self, mix: WeightedMix<MixAction>) -> Self {
        self.mix = mix;
        self
    }

    async fn smoke(&self, ctx: &IterationContext) {
        if let Some(team) = self.run.fixtures.teams().first() {
            let outcome = actions::fetch_team(&self.run.client, &team.name, Tag::Measured).await;
            let echoed = outcome
                .body
                .as_ref()
                .and_then(|body| body.get("team_name"))
                .and_then(|name| name.as_str())
                == Some(team.name.as_str());
            let collector = self.run.client.collector();
            collector.record_check("status is 200", outcome.status == 200);
            collector.record_check("response has team name", echoed);
        }
        ctx.sleep(SMOKE_PAUSE).await;
    }

    /// Back off after an action whose precondition was unmet, so a stream
    /// with nothing to send does not spin.
    async fn back_off_if_skipped(&self, ctx: &IterationContext, outcome: &ActionOutcome) {
        if outcome.is_skipped() {
            ctx.sleep(SKIP_BACKOFF).await;
        }
    }

    async fn realistic_mix(&self, ctx: &IterationContext, rng: &mut StdRng, think: ThinkTime) {
        let run = &self.run;
        match self.mix.choose(rng) {
            MixAction::CreatePullRequest => {
                let creation = actions::create_pull_request(
                    &run.client,
                    &run.fixtures,
                    rng,
                    Tag::Measured,
                    Accepted::PR_CREATE_LOAD,
                )
                .await;
                if let Some(entry) = creation.created {
                    run.remember_pull_request(entry.pr_id).await;
                }
            }
            MixAction::MergePullRequest => {
                let known = run.take_known_pull_request(rng).await;
                actions::merge_pull_request(&run.client, known, rng, Tag::Measured).await;
            }
            MixAction::ReassignReviewer => {
                actions::reassign_synthetic(&run.client, &run.user_ids, rng, Tag::Measured).await;
            }
            MixAction::FetchUserReviews => {
                actions::fetch_user_reviews(&run.client, &run.user_ids, rng, Tag::Measured).await;
            }
            MixAction::SetUserActive => {
                let is_active = rng.gen::<f64>() > 0.9;
                actions::set_user_active(&run.client, &run.user_ids, rng, is_active, Tag::Measured)
                    .await;
            }
        }
        ctx.sleep(think.draw(rng)).await;
    }

    async fn chaos_produce(&self, ctx: &IterationContext, rng: &mut StdRng) {
        let run = &self.run;
        info!(
            target: "loadgen.chaos",
            burst = run.chaos_burst,
            "Chaos producer creating pull requests"
        );

        let mut batch = Vec::new();
        for _ in 0..run.chaos_burst {
            if ctx.is_stopping() {
                break;
            }
            let creation = actions::create_pull_request(
                &run.client,
                &run.fixtures,
                rng,
                Tag::Prep,
                Accepted::PR_CREATE_LOAD,
            )
            .await;
            if let Some(entry) = creation.created {
                batch.push(entry);
            }
        }

        run.registry.publish(batch).await;
        let registered = run.registry.len().await;
        info!(target: "loadgen.chaos", registered, "Chaos registry ready");
        ctx.sleep(CHAOS_PUBLISH_PAUSE).await;
    }

    async fn chaos_reassign(&self, ctx: &IterationContext, rng: &mut StdRng, think: ThinkTime) {
        if ctx.is_first() {
            self.chaos_produce(ctx, rng).await;
        }

        let Some(entry) = self.run.registry.random_entry(rng).await else {
            // Early streams routinely find the registry empty.
            ctx.sleep(CHAOS_EMPTY_BACKOFF).await;
            return;
        };

        actions::reassign_entry(&self.run.client, &self.run.registry, &entry, rng, Tag::Measured)
            .await;
        ctx.sleep(think.draw(rng)).await;
    }

    async fn sli_merge(&self, ctx: &IterationContext, rng: &mut StdRng) {
        let Some(pr_id) = self.run.seed_pr_ids.choose(rng).cloned() else {
            ctx.sleep(SKIP_BACKOFF).await;
            return;
        };
        self.run
            .client
            .merge_pull_request(&pr_id, Tag::Measured, Accepted::MERGE)
            .await;
    }

    /// Team members that could replace a reviewer of `entry`.
    fn replacement_candidates(&self, entry: &ChaosRegistryEntry) -> Vec<String> {
        self.run
            .fixtures
            .team(&entry.team_name)
            .map(|team| {
                team.members
                    .iter()
                    .map(|m| m.user_id.clone())
                    .filter(|id| *id != entry.author_id && !entry.reviewers.contains(id))
                    .collect()
            })
            .unwrap_or_default()
    }

    async fn sli_reassign(&self, ctx: &IterationContext, rng: &mut StdRng) {
        let run = &self.run;
        let Some(entry) = run.registry.random_entry(rng).await else {
            debug!(target: "loadgen.scenario", "No reassign targets available");
            ctx.sleep(SKIP_BACKOFF).await;
            return;
        };

        actions::fetch_team(&run.client, &entry.team_name, Tag::Measured).await;

        if entry.reviewers.is_empty() || self.replacement_candidates(&entry).is_empty() {
            debug!(
                target: "loadgen.scenario",
                pr_id = %entry.pr_id,
                "No replacement candidates, skipping"
            );
            ctx.sleep(SKIP_BACKOFF).await;
            return;
        }

        // Team state right before the reassignment.
        actions::fetch_team(&run.client, &entry.team_name, Tag::Measured).await;
        let outcome =
            actions::reassign_entry(&run.client, &run.registry, &entry, rng, Tag::Measured).await;
        if !outcome.is_skipped() {
            run.client
                .collector()
                .record_check("reassign ok (sli_reassign)", outcome.is_accepted());
        }
    }

    async fn sli_team_add(&self) {
        let team = Team {
            team_name: self.run.next_team_name(),
            members: Vec::new(),
        };
        self.run
            .client
            .add_team(&team, Tag::Measured, Accepted::TEAM_ADD)
            .await;
    }

    async fn sli_team_get(&self, ctx: &IterationContext, rng: &mut StdRng) {
        match self.run.fixtures.teams().choose(rng) {
            Some(team) => {
                actions::fetch_team(&self.run.client, &team.name, Tag::Measured).await;
            }
            None => ctx.sleep(SKIP_BACKOFF).await,
        }
    }
}

#[async_trait]
impl Workload for ScenarioWorkload {
    async fn iteration(&self, ctx: &IterationContext) {
        let mut rng = ctx.rng(self.run.seed);
        let run = &self.run;

        match self.kind {
            WorkloadKind::Smoke => self.smoke(ctx).await,
            WorkloadKind::RealisticMix { think } => self.realistic_mix(ctx, &mut rng, think).await,
            WorkloadKind::SpikeCreate => {
                let creation = actions::create_pull_request(
                    &run.client,
                    &run.fixtures,
                    &mut rng,
                    Tag::Measured,
                    Accepted::NO_SERVER_ERROR,
                )
                .await;
                self.back_off_if_skipped(ctx, &creation.outcome).await;
            }
            WorkloadKind::ChaosReassign { think } => {
                self.chaos_reassign(ctx, &mut rng, think).await;
            }
            WorkloadKind::SliPrCreate => {
                let creation = actions::create_pull_request(
                    &run.client,
                    &run.fixtures,
                    &mut rng,
                    Tag::Measured,
                    Accepted::PR_CREATE_LOAD,
                )
                .await;
                self.back_off_if_skipped(ctx, &creation.outcome).await;
            }
            WorkloadKind::SliMerge => self.sli_merge(ctx, &mut rng).await,
            WorkloadKind::SliReassign => self.sli_reassign(ctx, &mut rng).await,
            WorkloadKind::SliTeamAdd => self.sli_team_add().await,
            WorkloadKind::SliTeamGet => self.sli_team_get(ctx, &mut rng).await,
            WorkloadKind::SliSetActive => {
                let is_active = rng.gen_bool(0.5);
                let outcome = actions::set_user_active(
                    &run.client,
                    &run.user_ids,
                    &mut rng,
                    is_active,
                    Tag::Measured,
                )
                .await;
                self.back_off_if_skipped(ctx, &outcome).await;
            }
        }
    }
}
