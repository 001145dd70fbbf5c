//! # Loadgen Test Utilities
//!
//! Shared test utilities for the review load generator.
//!
//! This crate provides:
//! - An in-memory stub of the review-assignment service (`StubService`)
//! - Server test harness (`TestReviewServer` for E2E tests)
//!
//! ## Usage
//!
//! ```rust,ignore
//! use loadgen_test_utils::*;
//!
//! #[tokio::test]
//! async fn test_example() -> Result<(), anyhow::Error> {
//!     let server = TestReviewServer::spawn().await?;
//!     let response = reqwest::get(format!("{}/health", server.url())).await?;
//!     assert_eq!(response.status(), 200);
//!     Ok(())
//! }
//! ```

pub mod server_harness;
pub mod stub_service;

// Re-export commonly used items
pub use server_harness::*;
pub use stub_service::StubService;
