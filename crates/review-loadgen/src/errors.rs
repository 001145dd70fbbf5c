//! Error types for the load generator.
//!
//! Individual service calls never surface here; they resolve to an
//! `ActionOutcome`. These errors cover the things that stop a run from
//! starting at all.

use crate::config::ConfigError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum LoadgenError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Fixture error: {0}")]
    Fixture(#[from] common::error::CommonError),

    #[error("Failed to build HTTP client: {0}")]
    HttpClient(#[source] reqwest::Error),

    #[error("Service health check failed: {message}")]
    HealthCheckFailed { message: String },

    #[error("Unknown scenario '{name}'. Known scenarios: {known}")]
    UnknownScenario { name: String, known: String },

    #[error("Invalid executor configuration: {0}")]
    InvalidExecutor(String),
}
