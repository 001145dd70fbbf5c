//! Common types shared by the review load generator and its test stub.

#![warn(clippy::pedantic)]

/// Module for common error types
pub mod error;

/// Module for the review service wire types
pub mod types;

/// Module for common configuration
pub mod config;

/// Module for static team fixture loading and normalization
pub mod fixtures;
