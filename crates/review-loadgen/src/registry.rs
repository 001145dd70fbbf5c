//! Shared chaos registry.
//!
//! One producer publishes a batch of created pull requests; every other
//! stream reads it for the rest of the run. The batch becomes visible all at
//! once: entries are appended under the write lock and the ready flag flips
//! afterwards, so a reader sees either nothing or the complete batch.
//!
//! Reviewer lists are rewritten by any stream whose reassignment succeeds.
//! Those writes may race; the last writer wins and a reader may act on a
//! stale list, which the service answers with 404/409.

use rand::Rng;
use tokio::sync::{watch, RwLock};
use tracing::debug;

/// One pull request known to carry at least one reviewer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChaosRegistryEntry {
    pub pr_id: String,
    pub reviewers: Vec<String>,
    pub author_id: String,
    pub team_name: String,
}

/// Append-only registry with an explicit ready signal.
#[derive(Debug)]
pub struct ChaosRegistry {
    entries: RwLock<Vec<ChaosRegistryEntry>>,
    ready: watch::Sender<bool>,
}

impl Default for ChaosRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ChaosRegistry {
    #[must_use]
    pub fn new() -> Self {
        let (ready, _) = watch::channel(false);
        Self {
            entries: RwLock::new(Vec::new()),
            ready,
        }
    }

    /// Append a batch and mark the registry ready.
    ///
    /// Entries without reviewers are discarded. Publishing an empty batch
    /// still marks the registry ready.
    pub async fn publish(&self, batch: Vec<ChaosRegistryEntry>) {
        let total = batch.len();
        let batch: Vec<_> = batch
            .into_iter()
            .filter(|entry| !entry.reviewers.is_empty())
            .collect();
        let kept = batch.len();

        let len = {
            let mut entries = self.entries.write().await;
            entries.extend(batch);
            entries.len()
        };
        self.ready.send_replace(true);

        debug!(
            target: "loadgen.chaos",
            published = kept,
            discarded = total - kept,
            registry_size = len,
            "Registry published"
        );
    }

    #[must_use]
    pub fn is_ready(&self) -> bool {
        *self.ready.borrow()
    }

    /// A uniformly random entry, or `None` before publication or when empty.
    pub async fn random_entry<R: Rng>(&self, rng: &mut R) -> Option<ChaosRegistryEntry> {
        if !self.is_ready() {
            return None;
        }
        let entries = self.entries.read().await;
        if entries.is_empty() {
            return None;
        }
        let index = rng.gen_range(0..entries.len());
        entries.get(index).cloned()
    }

    /// Replace the stored reviewer list of `pr_id`. Last writer wins.
    ///
    /// Returns false if the id is unknown.
    pub async fn update_reviewers(&self, pr_id: &str, reviewers: Vec<String>) -> bool {
        let mut entries = self.entries.write().await;
        match entries.iter_mut().find(|entry| entry.pr_id == pr_id) {
            Some(entry) => {
                entry.reviewers = reviewers;
                true
            }
            None => false,
        }
    }

    /// Every registered pull request id, for teardown.
    pub async fn pr_ids(&self) -> Vec<String> {
        self.entries
            .read()
            .await
            .iter()
            .map(|entry| entry.pr_id.clone())
            .collect()
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }

    /// Copy of all entries.
    pub async fn entries(&self) -> Vec<ChaosRegistryEntry> {
        self.entries.read().await.clone()
    }
}

/// What provisioning produced, handed to every iteration.
#[derive(Debug, Clone, Default)]
pub struct ProvisionResult {
    /// Every seeded pull request id, for teardown and id-based workloads.
    pub pr_ids: Vec<String>,
    /// Seeded pull requests that came back with reviewers.
    pub chaos_entries: Vec<ChaosRegistryEntry>,
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use std::sync::Arc;
    use std::time::Duration;

    fn entry(id: &str, reviewers: &[&str]) -> ChaosRegistryEntry {
        ChaosRegistryEntry {
            pr_id: id.to_string(),
            reviewers: reviewers.iter().map(|r| (*r).to_string()).collect(),
            author_id: "u1".to_string(),
            team_name: "backend".to_string(),
        }
    }

    #[tokio::test]
    async fn test_empty_before_publish() {
        let registry = ChaosRegistry::new();
        let mut rng = StdRng::seed_from_u64(1);
        assert!(!registry.is_ready());
        assert!(registry.random_entry(&mut rng).await.is_none());
    }

    #[tokio::test]
    async fn test_publish_discards_reviewerless_entries() {
        let registry = ChaosRegistry::new();
        registry
            .publish(vec![entry("pr-1", &["u2"]), entry("pr-2", &[]), entry("pr-3", &["u3", "u4"])])
            .await;

        assert!(registry.is_ready());
        assert_eq!(registry.len().await, 2);
        assert_eq!(registry.pr_ids().await, vec!["pr-1", "pr-3"]);
        for e in registry.entries().await {
            assert!(!e.reviewers.is_empty());
        }
    }

    #[tokio::test]
    async fn test_empty_publish_is_ready_but_yields_nothing() {
        let registry = ChaosRegistry::new();
        registry.publish(vec![entry("pr-1", &[])]).await;
        let mut rng = StdRng::seed_from_u64(1);
        assert!(registry.is_ready());
        assert!(registry.is_empty().await);
        assert!(registry.random_entry(&mut rng).await.is_none());
    }

    #[tokio::test]
    async fn test_update_reviewers_last_writer_wins() {
        let registry = ChaosRegistry::new();
        registry.publish(vec![entry("pr-1", &["u2", "u3"])]).await;

        assert!(registry.update_reviewers("pr-1", vec!["u4".into(), "u3".into()]).await);
        assert!(registry.update_reviewers("pr-1", vec!["u5".into(), "u3".into()]).await);
        assert!(!registry.update_reviewers("pr-404", vec![]).await);

        let mut rng = StdRng::seed_from_u64(9);
        let e = registry.random_entry(&mut rng).await.unwrap();
        assert_eq!(e.reviewers, vec!["u5", "u3"]);
    }

    #[tokio::test]
    async fn test_readers_never_see_partial_batch() {
        let registry = Arc::new(ChaosRegistry::new());
        let batch: Vec<_> = (0..500).map(|i| entry(&format!("pr-{i}"), &["u2"])).collect();

        let mut readers = Vec::new();
        for seed in 0..8u64 {
            let registry = Arc::clone(&registry);
            readers.push(tokio::spawn(async move {
                let mut rng = StdRng::seed_from_u64(seed);
                for _ in 0..200 {
                    if registry.is_ready() {
                        let len = registry.len().await;
                        assert_eq!(len, 500, "ready registry must hold the full batch");
                        assert!(registry.random_entry(&mut rng).await.is_some());
                    } else {
                        assert!(registry.random_entry(&mut rng).await.is_none());
                    }
                    tokio::task::yield_now().await;
                }
            }));
        }

        tokio::time::sleep(Duration::from_millis(1)).await;
        registry.publish(batch).await;

        for reader in readers {
            reader.await.unwrap();
        }
    }
}
