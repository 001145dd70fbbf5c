//! Best-effort cleanup of created pull requests.
//!
//! Merging is the only way to retire a pull request. Teams are left in
//! place; the service has no delete operation.

use crate::client::ReviewClient;
use crate::outcome::{Accepted, Tag};
use serde::Serialize;
use std::collections::HashSet;
use tracing::{info, warn};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CleanupSummary {
    pub attempted: usize,
    pub merged: usize,
    pub failed: usize,
}

/// Merge every id once, in order, tagged `prep`. Duplicate ids are merged
/// once. Never fails; failures are tallied.
pub async fn cleanup_pull_requests(client: &ReviewClient, pr_ids: &[String]) -> CleanupSummary {
    let mut summary = CleanupSummary::default();
    let mut seen = HashSet::new();

    for pr_id in pr_ids {
        if !seen.insert(pr_id.as_str()) {
            continue;
        }
        summary.attempted += 1;

        let outcome = client
            .merge_pull_request(pr_id, Tag::Prep, Accepted::OK)
            .await;
        if outcome.status == 200 {
            summary.merged += 1;
        } else {
            summary.failed += 1;
            warn!(
                target: "loadgen.teardown",
                pr_id = %pr_id,
                status = outcome.status,
                "Cleanup merge failed"
            );
        }
    }

    info!(
        target: "loadgen.teardown",
        attempted = summary.attempted,
        merged = summary.merged,
        failed = summary.failed,
        "Cleanup complete"
    );

    summary
}
