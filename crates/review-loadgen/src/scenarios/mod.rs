//! Scenario catalogue.
//!
//! A scenario bundles a concurrency profile, thresholds, the setup it needs,
//! the workload each iteration runs and whether seeded pull requests are
//! cleaned up afterwards.

pub mod workloads;

pub use workloads::{RunContext, ScenarioWorkload};

use crate::config::Config;
use crate::errors::LoadgenError;
use crate::mixer::ThinkTime;
use crate::outcome::Tag;
use crate::provisioner::SeedStrategy;
use crate::scheduler::{ExecutorConfig, Stage};
use crate::thresholds::Threshold;
use std::time::Duration;

/// Team setup performed before the measured window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TeamSetup {
    /// No teams are created.
    None,
    /// Fixture teams under their own names.
    Fixtures,
    /// Fixture teams renamed with a per-run suffix, all members active.
    UniqueSuffix,
}

/// What one iteration does.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkloadKind {
    /// Fetch the first fixture team and check the echo.
    Smoke,
    /// Weighted five-way mix followed by think time.
    RealisticMix { think: ThinkTime },
    /// Create a pull request, accepting anything below 500.
    SpikeCreate,
    /// Chaos producer burst, then a reassign storm against the registry.
    ChaosReassign { think: ThinkTime },
    SliPrCreate,
    SliMerge,
    SliReassign,
    SliTeamAdd,
    SliTeamGet,
    SliSetActive,
}

#[derive(Debug, Clone)]
pub struct Scenario {
    pub name: &'static str,
    pub description: &'static str,
    pub executor: ExecutorConfig,
    pub thresholds: Vec<Threshold>,
    pub teams: TeamSetup,
    pub seed: SeedStrategy,
    pub workload: WorkloadKind,
    /// Merge seeded and registered pull requests after the run.
    pub cleanup: bool,
}

impl Scenario {
    /// Apply profile, threshold and seed-count overrides from `config`.
    #[must_use]
    pub fn with_overrides(mut self, config: &Config) -> Self {
        if let Some(profile) = &config.profile_override {
            self.executor = profile.clone();
        }
        if let Some(thresholds) = &config.thresholds_override {
            self.thresholds.clone_from(thresholds);
        }
        if let Some(count) = config.seed_pull_requests {
            self.seed = self.seed.with_count(count);
        }
        self
    }
}

const fn secs(n: u64) -> Duration {
    Duration::from_secs(n)
}

const fn mins(n: u64) -> Duration {
    Duration::from_secs(n * 60)
}

/// Fixed-rate SLI profile: `rate`/s for one minute.
fn sli_profile(rate: u64, max_vus: u64) -> ExecutorConfig {
    ExecutorConfig::ConstantArrivalRate {
        rate,
        time_unit: secs(1),
        duration: mins(1),
        pre_allocated_vus: 1,
        max_vus,
    }
}

/// `http_req_failed{prep:false} < 0.1%`, `p(95){prep:false} < 300ms`.
fn sli_thresholds(tag: Option<Tag>) -> Vec<Threshold> {
    vec![
        Threshold::failure_rate_below(tag, 0.001),
        Threshold::latency_percentile_below(tag, 95.0, 300.0),
    ]
}

fn load_thresholds(failure_rate: f64, p95_ms: f64) -> Vec<Threshold> {
    vec![
        Threshold::failure_rate_below(None, failure_rate),
        Threshold::latency_percentile_below(None, 95.0, p95_ms),
    ]
}

/// Every scenario, in catalogue order.
#[must_use]
pub fn catalogue() -> Vec<Scenario> {
    let mix = WorkloadKind::RealisticMix {
        think: ThinkTime::seconds(1, 5),
    };

    vec![
        Scenario {
            name: "smoke",
            description: "One VU fetching a team for 30s",
            executor: ExecutorConfig::ConstantVus {
                vus: 1,
                duration: secs(30),
            },
            thresholds: load_thresholds(0.01, 500.0),
            teams: TeamSetup::Fixtures,
            seed: SeedStrategy::None,
            workload: WorkloadKind::Smoke,
            cleanup: false,
        },
        Scenario {
            name: "average_load",
            description: "Realistic mix ramping to 100 VUs over 15m",
            executor: ExecutorConfig::RampingVus {
                start_vus: 0,
                stages: vec![
                    Stage::new(mins(5), 100),
                    Stage::new(mins(5), 100),
                    Stage::new(mins(5), 0),
                ],
            },
            thresholds: load_thresholds(0.01, 1200.0),
            teams: TeamSetup::Fixtures,
            seed: SeedStrategy::None,
            workload: mix,
            cleanup: false,
        },
        Scenario {
            name: "stress",
            description: "Realistic mix stepping up to 2000 VUs",
            executor: ExecutorConfig::RampingVus {
                start_vus: 0,
                stages: vec![
                    Stage::new(mins(1), 5),
                    Stage::new(mins(1), 20),
                    Stage::new(mins(1), 100),
                    Stage::new(mins(1), 500),
                    Stage::new(mins(1), 1000),
                    Stage::new(mins(1), 2000),
                    Stage::new(mins(1), 0),
                ],
            },
            thresholds: Vec::new(),
            teams: TeamSetup::None,
            seed: SeedStrategy::None,
            workload: mix,
            cleanup: false,
        },
        Scenario {
            name: "spike",
            description: "Pull request creation spiking to 1500 VUs",
            executor: ExecutorConfig::RampingVus {
                start_vus: 0,
                stages: vec![
                    Stage::new(mins(1), 50),
                    Stage::new(secs(30), 1500),
                    Stage::new(mins(3), 100),
                ],
            },
            thresholds: Vec::new(),
            teams: TeamSetup::Fixtures,
            seed: SeedStrategy::None,
            workload: WorkloadKind::SpikeCreate,
            cleanup: false,
        },
        Scenario {
            name: "chaos_reassign",
            description: "Reassign storm against a burst of freshly created pull requests",
            executor: ExecutorConfig::ConstantVus {
                vus: 200,
                duration: mins(10),
            },
            thresholds: load_thresholds(0.2, 3000.0),
            teams: TeamSetup::Fixtures,
            seed: SeedStrategy::None,
            workload: WorkloadKind::ChaosReassign {
                think: ThinkTime::millis(200, 700),
            },
            cleanup: true,
        },
        Scenario {
            name: "realistic_mix",
            description: "Realistic mix at 100 VUs for 30m",
            executor: ExecutorConfig::ConstantVus {
                vus: 100,
                duration: mins(30),
            },
            thresholds: load_thresholds(0.01, 1000.0),
            teams: TeamSetup::Fixtures,
            seed: SeedStrategy::None,
            workload: mix,
            cleanup: false,
        },
        Scenario {
            name: "sli_pr_create",
            description: "Pull request creation at 5/s",
            executor: sli_profile(5, 200),
            thresholds: sli_thresholds(Some(Tag::Measured)),
            teams: TeamSetup::Fixtures,
            seed: SeedStrategy::None,
            workload: WorkloadKind::SliPrCreate,
            cleanup: false,
        },
        Scenario {
            name: "sli_merge",
            description: "Merging seeded pull requests at 1000/s",
            executor: sli_profile(1000, 2000),
            thresholds: sli_thresholds(Some(Tag::Measured)),
            teams: TeamSetup::Fixtures,
            seed: SeedStrategy::Random { count: 150 },
            workload: WorkloadKind::SliMerge,
            cleanup: true,
        },
        Scenario {
            name: "sli_reassign",
            description: "Reviewer reassignment at 5/s on uniquely named teams",
            executor: sli_profile(5, 200),
            thresholds: sli_thresholds(Some(Tag::Measured)),
            teams: TeamSetup::UniqueSuffix,
            seed: SeedStrategy::PerTeam {
                per_team: 30,
                min_members: 4,
            },
            workload: WorkloadKind::SliReassign,
            cleanup: true,
        },
        Scenario {
            name: "sli_team_add",
            description: "Empty team creation at 5/s",
            executor: sli_profile(5, 200),
            thresholds: sli_thresholds(None),
            teams: TeamSetup::None,
            seed: SeedStrategy::None,
            workload: WorkloadKind::SliTeamAdd,
            cleanup: false,
        },
        Scenario {
            name: "sli_team_get",
            description: "Team fetches at 5/s",
            executor: sli_profile(5, 200),
            thresholds: sli_thresholds(Some(Tag::Measured)),
            teams: TeamSetup::Fixtures,
            seed: SeedStrategy::None,
            workload: WorkloadKind::SliTeamGet,
            cleanup: false,
        },
        Scenario {
            name: "sli_set_active",
            description: "Activity toggles at 5/s",
            executor: sli_profile(5, 200),
            thresholds: sli_thresholds(Some(Tag::Measured)),
            teams: TeamSetup::Fixtures,
            seed: SeedStrategy::None,
            workload: WorkloadKind::SliSetActive,
            cleanup: false,
        },
    ]
}

/// Names of every scenario, in catalogue order.
#[must_use]
pub fn names() -> Vec<&'static str> {
    catalogue().iter().map(|s| s.name).collect()
}

/// Look a scenario up by name.
///
/// # Errors
///
/// Returns `LoadgenError::UnknownScenario` listing the known names.
pub fn find(name: &str) -> Result<Scenario, LoadgenError> {
    catalogue()
        .into_iter()
        .find(|s| s.name == name)
        .ok_or_else(|| LoadgenError::UnknownScenario {
            name: name.to_string(),
            known: names().join(", "),
        })
}
