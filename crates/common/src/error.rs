//! Common error types for the review load generator.

use thiserror::Error;

/// Errors raised while loading or validating shared inputs.
#[derive(Error, Debug)]
pub enum CommonError {
    /// Fixture file could not be read
    #[error("Failed to read fixture file {path}: {source}")]
    FixtureIo {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// Fixture file is not valid JSON or does not match the expected shape
    #[error("Invalid fixture data: {0}")]
    FixtureFormat(#[from] serde_json::Error),

    /// Fixture file parsed but declares no teams
    #[error("Fixture set contains no teams")]
    EmptyFixtures,

    /// A team record has a blank name
    #[error("Fixture team at index {index} has an empty name")]
    EmptyTeamName { index: usize },

    /// Invalid configuration
    #[error("Configuration error: {0}")]
    Configuration(String),
}

/// Result type alias using `CommonError`
pub type Result<T> = std::result::Result<T, CommonError>;
