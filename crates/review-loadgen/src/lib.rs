//! Review Load Generator Library
//!
//! Synthetic traffic for the pull-request review-assignment service:
//! a catalogue of load scenarios, a VU scheduler, fixture provisioning,
//! and pass/fail threshold evaluation over the collected metrics.
//!
//! # Architecture
//!
//! ```text
//! runner.rs -> scenarios/*.rs -> actions.rs -> client.rs
//!           -> scheduler.rs
//!           -> provisioner.rs / teardown.rs
//!           -> thresholds.rs <- observability/collector.rs
//! ```
//!
//! # Modules
//!
//! - `config` - Run configuration from environment
//! - `errors` - Errors that prevent a run from starting
//! - `client` - HTTP client for the service under test
//! - `outcome` - Per-call outcome classification
//! - `actions` - Single-call action executors
//! - `mixer` - Weighted action selection and think time
//! - `registry` - Shared pull request registry for reassign traffic
//! - `scheduler` - Ramping, constant and arrival-rate executors
//! - `scenarios` - Scenario catalogue and per-iteration workloads
//! - `provisioner` / `teardown` - Setup and cleanup around the window
//! - `thresholds` - Threshold expressions and evaluation
//! - `observability` - Metrics emission and in-process collection

pub mod actions;
pub mod client;
pub mod config;
pub mod errors;
pub mod mixer;
pub mod observability;
pub mod outcome;
pub mod provisioner;
pub mod registry;
pub mod runner;
pub mod scenarios;
pub mod scheduler;
pub mod teardown;
pub mod thresholds;
