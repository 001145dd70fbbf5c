//! Load generator configuration.
//!
//! Configuration is loaded from environment variables. Profile and
//! threshold overrides replace the selected scenario's defaults wholesale.

use crate::scheduler::{ExecutorConfig, Stage};
use crate::thresholds::{parse_threshold_list, Threshold};
use common::config::{parse_bool, ObservabilityConfig};
use common::types::ReassignField;
use std::collections::HashMap;
use std::env;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Default service under test.
pub const DEFAULT_BASE_URL: &str = "http://localhost:8080";

/// Default scenario.
pub const DEFAULT_SCENARIO: &str = "smoke";

/// Default fixture file, relative to the working directory.
pub const DEFAULT_FIXTURES_PATH: &str = "data/teams.json";

/// Default per-request timeout in seconds.
pub const DEFAULT_HTTP_TIMEOUT_SECONDS: u64 = 10;

/// Default number of PRs the chaos producer creates.
pub const DEFAULT_CHAOS_BURST: usize = 1000;

/// Default `pre_allocated_vus` for an arrival-rate override.
pub const DEFAULT_PRE_ALLOCATED_VUS: u64 = 1;

/// Default `max_vus` for an arrival-rate override.
pub const DEFAULT_MAX_VUS: u64 = 200;

#[derive(Debug, Clone)]
pub struct Config {
    /// Service base URL, without trailing slash.
    pub base_url: String,

    /// Scenario name from the catalogue.
    pub scenario: String,

    pub fixtures_path: PathBuf,

    /// Per-request timeout.
    pub http_timeout: Duration,

    /// Deterministic RNG seed. Live randomness when unset.
    pub seed: Option<u64>,

    /// Replaces the scenario's concurrency profile.
    pub profile_override: Option<ExecutorConfig>,

    /// Replaces the scenario's thresholds.
    pub thresholds_override: Option<Vec<Threshold>>,

    /// JSON key used for the old reviewer in reassign requests. The service
    /// decodes `old_user_id`; some scenario variants sent `old_reviewer_id`.
    pub reassign_field: ReassignField,

    /// Replaces the scenario's seed PR count.
    pub seed_pull_requests: Option<usize>,

    /// Chaos producer burst size.
    pub chaos_burst: usize,

    /// Skip the pre-flight `/health` probe.
    pub skip_healthcheck: bool,

    /// Serve Prometheus metrics on this address while the run lasts.
    pub metrics_addr: Option<SocketAddr>,

    pub observability: ObservabilityConfig,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid value for {name}: {reason}")]
    InvalidVar { name: &'static str, reason: String },

    #[error("{name} is required when {because} is set")]
    MissingVar {
        name: &'static str,
        because: &'static str,
    },

    #[error("Conflicting profile overrides: {0}")]
    ConflictingOverrides(String),
}

impl Default for Config {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            scenario: DEFAULT_SCENARIO.to_string(),
            fixtures_path: PathBuf::from(DEFAULT_FIXTURES_PATH),
            http_timeout: Duration::from_secs(DEFAULT_HTTP_TIMEOUT_SECONDS),
            seed: None,
            profile_override: None,
            thresholds_override: None,
            reassign_field: ReassignField::default(),
            seed_pull_requests: None,
            chaos_burst: DEFAULT_CHAOS_BURST,
            skip_healthcheck: false,
            metrics_addr: None,
            observability: ObservabilityConfig::default(),
        }
    }
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` naming the first invalid variable.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_vars(&env::vars().collect())
    }

    /// Load configuration from a `HashMap` (for testing).
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` naming the first invalid variable.
    pub fn from_vars(vars: &HashMap<String, String>) -> Result<Self, ConfigError> {
        let base_url = vars
            .get("BASE_URL")
            .map(|url| url.trim_end_matches('/').to_string())
            .unwrap_or_else(|| DEFAULT_BASE_URL.to_string());
        if !(base_url.starts_with("http://") || base_url.starts_with("https://")) {
            return Err(ConfigError::InvalidVar {
                name: "BASE_URL",
                reason: format!("expected an http(s) URL, got '{base_url}'"),
            });
        }

        let scenario = vars
            .get("LOADGEN_SCENARIO")
            .map(|s| s.trim().to_string())
            .unwrap_or_else(|| DEFAULT_SCENARIO.to_string());

        let fixtures_path = vars
            .get("LOADGEN_FIXTURES")
            .map_or_else(|| PathBuf::from(DEFAULT_FIXTURES_PATH), PathBuf::from);

        let http_timeout = Duration::from_secs(
            parse_positive(vars, "LOADGEN_HTTP_TIMEOUT_SECONDS")?
                .unwrap_or(DEFAULT_HTTP_TIMEOUT_SECONDS),
        );

        let seed = parse_number::<u64>(vars, "LOADGEN_SEED")?;

        let reassign_field = match vars.get("LOADGEN_REASSIGN_FIELD") {
            Some(value) => {
                ReassignField::parse(value.trim()).ok_or_else(|| ConfigError::InvalidVar {
                    name: "LOADGEN_REASSIGN_FIELD",
                    reason: format!("expected old_user_id or old_reviewer_id, got '{value}'"),
                })?
            }
            None => ReassignField::default(),
        };

        let seed_pull_requests = parse_number::<usize>(vars, "LOADGEN_SEED_PULL_REQUESTS")?;

        let chaos_burst = parse_positive(vars, "LOADGEN_CHAOS_BURST")?
            .map_or(DEFAULT_CHAOS_BURST, |n| usize::try_from(n).unwrap_or(usize::MAX));

        let skip_healthcheck = parse_flag(vars, "LOADGEN_SKIP_HEALTHCHECK")?;

        let metrics_addr = parse_number::<SocketAddr>(vars, "LOADGEN_METRICS_ADDR")?;

        let thresholds_override = match vars.get("LOADGEN_THRESHOLDS") {
            Some(value) => Some(parse_threshold_list(value).map_err(|e| {
                ConfigError::InvalidVar {
                    name: "LOADGEN_THRESHOLDS",
                    reason: e.to_string(),
                }
            })?),
            None => None,
        };

        let profile_override = parse_profile_override(vars)?;

        let observability = ObservabilityConfig::from_vars(vars).map_err(|e| {
            ConfigError::InvalidVar {
                name: "LOADGEN_JSON_LOGS",
                reason: e.to_string(),
            }
        })?;

        Ok(Config {
            base_url,
            scenario,
            fixtures_path,
            http_timeout,
            seed,
            profile_override,
            thresholds_override,
            reassign_field,
            seed_pull_requests,
            chaos_burst,
            skip_healthcheck,
            metrics_addr,
            observability,
        })
    }
}

fn parse_number<T>(vars: &HashMap<String, String>, name: &'static str) -> Result<Option<T>, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    vars.get(name)
        .map(|value| {
            value.trim().parse::<T>().map_err(|e| ConfigError::InvalidVar {
                name,
                reason: format!("'{value}': {e}"),
            })
        })
        .transpose()
}

fn parse_positive(vars: &HashMap<String, String>, name: &'static str) -> Result<Option<u64>, ConfigError> {
    match parse_number::<u64>(vars, name)? {
        Some(0) => Err(ConfigError::InvalidVar {
            name,
            reason: "must be greater than 0".to_string(),
        }),
        other => Ok(other),
    }
}

fn parse_flag(vars: &HashMap<String, String>, name: &'static str) -> Result<bool, ConfigError> {
    match vars.get(name) {
        Some(value) => parse_bool(value).ok_or_else(|| ConfigError::InvalidVar {
            name,
            reason: format!("expected a boolean, got '{value}'"),
        }),
        None => Ok(false),
    }
}

fn parse_duration_var(
    vars: &HashMap<String, String>,
    name: &'static str,
) -> Result<Option<Duration>, ConfigError> {
    vars.get(name)
        .map(|value| parse_duration(value).map_err(|reason| ConfigError::InvalidVar { name, reason }))
        .transpose()
}

fn parse_profile_override(
    vars: &HashMap<String, String>,
) -> Result<Option<ExecutorConfig>, ConfigError> {
    let stages = vars.get("LOADGEN_STAGES");
    let vus = parse_positive(vars, "LOADGEN_VUS")?;
    let rate = parse_positive(vars, "LOADGEN_RATE")?;

    let chosen = [stages.is_some(), vus.is_some(), rate.is_some()]
        .iter()
        .filter(|set| **set)
        .count();
    if chosen > 1 {
        return Err(ConfigError::ConflictingOverrides(
            "set only one of LOADGEN_STAGES, LOADGEN_VUS, LOADGEN_RATE".to_string(),
        ));
    }

    let profile = if let Some(stages) = stages {
        let stages = parse_stages(stages).map_err(|reason| ConfigError::InvalidVar {
            name: "LOADGEN_STAGES",
            reason,
        })?;
        let start_vus = parse_number::<u64>(vars, "LOADGEN_START_VUS")?.unwrap_or(1);
        ExecutorConfig::RampingVus { start_vus, stages }
    } else if let Some(vus) = vus {
        let duration = parse_duration_var(vars, "LOADGEN_DURATION")?.ok_or(
            ConfigError::MissingVar {
                name: "LOADGEN_DURATION",
                because: "LOADGEN_VUS",
            },
        )?;
        ExecutorConfig::ConstantVus { vus, duration }
    } else if let Some(rate) = rate {
        let duration = parse_duration_var(vars, "LOADGEN_DURATION")?.ok_or(
            ConfigError::MissingVar {
                name: "LOADGEN_DURATION",
                because: "LOADGEN_RATE",
            },
        )?;
        let time_unit =
            parse_duration_var(vars, "LOADGEN_TIME_UNIT")?.unwrap_or(Duration::from_secs(1));
        let pre_allocated_vus = parse_positive(vars, "LOADGEN_PRE_ALLOCATED_VUS")?
            .unwrap_or(DEFAULT_PRE_ALLOCATED_VUS);
        let max_vus = parse_positive(vars, "LOADGEN_MAX_VUS")?
            .unwrap_or(DEFAULT_MAX_VUS.max(pre_allocated_vus));
        ExecutorConfig::ConstantArrivalRate {
            rate,
            time_unit,
            duration,
            pre_allocated_vus,
            max_vus,
        }
    } else {
        return Ok(None);
    };

    profile.validate().map_err(|e| ConfigError::InvalidVar {
        name: "LOADGEN_STAGES/LOADGEN_VUS/LOADGEN_RATE",
        reason: e.to_string(),
    })?;
    Ok(Some(profile))
}

/// Parse a human-readable duration such as `500ms`, `30s`, `1m30s`,
/// `1min` or `2 hours`.
///
/// # Errors
///
/// Returns a description of the problem for an empty value, a missing or
/// unknown unit, or a number that does not fit.
pub fn parse_duration(value: &str) -> Result<Duration, String> {
    humantime::parse_duration(value.trim()).map_err(|e| format!("'{value}': {e}"))
}

/// Parse a stage list such as `30s:10,1m:10,30s:0`.
///
/// # Errors
///
/// Returns a description of the first malformed stage.
pub fn parse_stages(value: &str) -> Result<Vec<Stage>, String> {
    let stages = value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|stage| {
            let (duration, target) = stage
                .split_once(':')
                .ok_or_else(|| format!("stage '{stage}' must be <duration>:<target>"))?;
            let duration = parse_duration(duration)?;
            let target: u64 = target
                .trim()
                .parse()
                .map_err(|e| format!("stage '{stage}' target: {e}"))?;
            Ok(Stage::new(duration, target))
        })
        .collect::<Result<Vec<_>, String>>()?;

    if stages.is_empty() {
        return Err("no stages given".to_string());
    }
    Ok(stages)
}
