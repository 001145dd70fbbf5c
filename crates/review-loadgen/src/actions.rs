//! Action executors.
//!
//! Each executor issues at most one service call and resolves to an
//! [`ActionOutcome`]. Unmet preconditions (no active author, nothing to
//! reassign, no users) resolve to a skipped outcome without a request.

use crate::client::ReviewClient;
use crate::outcome::{Accepted, ActionKind, ActionOutcome, Tag};
use crate::registry::{ChaosRegistry, ChaosRegistryEntry};
use chrono::Utc;
use common::fixtures::{FixtureSet, Member, TeamFixture};
use common::types::CreatePullRequestRequest;
use rand::distributions::Alphanumeric;
use rand::seq::SliceRandom;
use rand::Rng;
use tracing::debug;

/// Lowest synthetic pull request number used for negative-path traffic.
pub const SYNTHETIC_ID_MIN: u32 = 1000;

/// Highest synthetic pull request number used for negative-path traffic.
pub const SYNTHETIC_ID_MAX: u32 = 99_999;

/// A new pull request id and title. Ids embed the wall clock in
/// milliseconds plus eight random digits.
pub fn generate_pull_request<R: Rng>(rng: &mut R, author_id: &str) -> CreatePullRequestRequest {
    let suffix: u32 = rng.gen_range(0..100_000_000);
    let title: String = (0..10)
        .map(|_| char::from(rng.sample(Alphanumeric)))
        .collect();
    CreatePullRequestRequest {
        pull_request_id: format!("pr-{}-{suffix:08}", Utc::now().timestamp_millis()),
        pull_request_name: format!("feat: {title}"),
        author_id: author_id.to_string(),
    }
}

/// A synthetic id that was never created, `pr-<1000..=99999>`.
pub fn synthetic_pull_request_id<R: Rng>(rng: &mut R) -> String {
    format!("pr-{}", rng.gen_range(SYNTHETIC_ID_MIN..=SYNTHETIC_ID_MAX))
}

/// A random active member, falling back to the first member when none is
/// marked active. `None` for a team without members.
pub fn pick_author<'a, R: Rng>(team: &'a TeamFixture, rng: &mut R) -> Option<&'a Member> {
    let active: Vec<&Member> = team.active_members().collect();
    match active.choose(rng) {
        Some(member) => Some(*member),
        None => team.members.first(),
    }
}

/// A created pull request together with its outcome.
#[derive(Debug, Clone)]
pub struct PullRequestCreation {
    pub outcome: ActionOutcome,
    /// Present when the service answered 201.
    pub created: Option<ChaosRegistryEntry>,
}

/// `POST /team/add` for a fixture team. Created and already-exists are both
/// accepted.
pub async fn create_team(client: &ReviewClient, team: &TeamFixture, tag: Tag) -> ActionOutcome {
    client
        .add_team(&team.to_create_request(), tag, Accepted::TEAM_ADD)
        .await
}

/// `GET /team/get`
pub async fn fetch_team(client: &ReviewClient, team_name: &str, tag: Tag) -> ActionOutcome {
    client.get_team(team_name, tag).await
}

/// Create a pull request authored by a member of `team`.
pub async fn create_pull_request_in<R: Rng + Send>(
    client: &ReviewClient,
    team: &TeamFixture,
    rng: &mut R,
    tag: Tag,
    accepted: Accepted,
) -> PullRequestCreation {
    let Some(author) = pick_author(team, rng) else {
        debug!(target: "loadgen.actions", team = %team.name, "Team has no members, skipping create");
        return PullRequestCreation {
            outcome: ActionOutcome::skipped(ActionKind::CreatePullRequest, tag),
            created: None,
        };
    };
    let request = generate_pull_request(rng, &author.user_id);

    let outcome = client.create_pull_request(&request, tag, accepted).await;
    let created = (outcome.status == 201).then(|| ChaosRegistryEntry {
        pr_id: request.pull_request_id.clone(),
        reviewers: outcome.assigned_reviewers().unwrap_or_default(),
        author_id: request.author_id.clone(),
        team_name: team.name.clone(),
    });

    PullRequestCreation { outcome, created }
}

/// Create a pull request in a uniformly random team.
pub async fn create_pull_request<R: Rng + Send>(
    client: &ReviewClient,
    fixtures: &FixtureSet,
    rng: &mut R,
    tag: Tag,
    accepted: Accepted,
) -> PullRequestCreation {
    match fixtures.teams().choose(rng) {
        Some(team) => create_pull_request_in(client, team, rng, tag, accepted).await,
        None => PullRequestCreation {
            outcome: ActionOutcome::skipped(ActionKind::CreatePullRequest, tag),
            created: None,
        },
    }
}

/// Merge `known_id` when given, otherwise a synthetic id.
pub async fn merge_pull_request<R: Rng + Send>(
    client: &ReviewClient,
    known_id: Option<String>,
    rng: &mut R,
    tag: Tag,
) -> ActionOutcome {
    let pr_id = known_id.unwrap_or_else(|| synthetic_pull_request_id(rng));
    client.merge_pull_request(&pr_id, tag, Accepted::MERGE).await
}

/// Reassign a random current reviewer of a registry entry.
///
/// On 200 the returned reviewer list replaces the registry's copy.
pub async fn reassign_entry<R: Rng + Send>(
    client: &ReviewClient,
    registry: &ChaosRegistry,
    entry: &ChaosRegistryEntry,
    rng: &mut R,
    tag: Tag,
) -> ActionOutcome {
    let Some(old_reviewer) = entry.reviewers.choose(rng).cloned() else {
        return ActionOutcome::skipped(ActionKind::ReassignReviewer, tag);
    };

    let outcome = client
        .reassign_reviewer(&entry.pr_id, &old_reviewer, tag)
        .await;

    if outcome.status == 200 {
        if let Some(reviewers) = outcome.assigned_reviewers() {
            registry.update_reviewers(&entry.pr_id, reviewers).await;
        }
    }
    outcome
}

/// Reassign against a synthetic id with a random user as the old reviewer.
pub async fn reassign_synthetic<R: Rng + Send>(
    client: &ReviewClient,
    user_ids: &[String],
    rng: &mut R,
    tag: Tag,
) -> ActionOutcome {
    let Some(old_reviewer) = user_ids.choose(rng).cloned() else {
        return ActionOutcome::skipped(ActionKind::ReassignReviewer, tag);
    };
    let pr_id = synthetic_pull_request_id(rng);
    client.reassign_reviewer(&pr_id, &old_reviewer, tag).await
}

/// `GET /users/getReview` for a random user.
pub async fn fetch_user_reviews<R: Rng + Send>(
    client: &ReviewClient,
    user_ids: &[String],
    rng: &mut R,
    tag: Tag,
) -> ActionOutcome {
    let Some(user_id) = user_ids.choose(rng).cloned() else {
        return ActionOutcome::skipped(ActionKind::FetchUserReviews, tag);
    };
    client.get_user_reviews(&user_id, tag).await
}

/// Set a random user's active flag.
pub async fn set_user_active<R: Rng + Send>(
    client: &ReviewClient,
    user_ids: &[String],
    rng: &mut R,
    is_active: bool,
    tag: Tag,
) -> ActionOutcome {
    let Some(user_id) = user_ids.choose(rng).cloned() else {
        return ActionOutcome::skipped(ActionKind::SetUserActive, tag);
    };
    client.set_is_active(&user_id, is_active, tag).await
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use common::fixtures::UserRef;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn team(users: &[UserRef]) -> TeamFixture {
        TeamFixture::new("backend", users)
    }

    fn detailed(id: &str, is_active: bool) -> UserRef {
        UserRef::Detailed {
            user_id: id.to_string(),
            is_active,
        }
    }

    #[test]
    fn test_generated_ids_have_expected_shape() {
        let mut rng = StdRng::seed_from_u64(11);
        let request = generate_pull_request(&mut rng, "u1");

        let parts: Vec<&str> = request.pull_request_id.split('-').collect();
        assert_eq!(parts.len(), 3);
        assert_eq!(parts.first(), Some(&"pr"));
        assert!(parts.get(1).unwrap().parse::<i64>().is_ok());
        assert_eq!(parts.get(2).unwrap().len(), 8);

        let title = request.pull_request_name.strip_prefix("feat: ").unwrap();
        assert_eq!(title.len(), 10);
        assert!(title.chars().all(|c| c.is_ascii_alphanumeric()));
        assert_eq!(request.author_id, "u1");
    }

    #[test]
    fn test_generated_ids_are_distinct() {
        let mut rng = StdRng::seed_from_u64(5);
        let ids: std::collections::HashSet<_> = (0..200)
            .map(|_| generate_pull_request(&mut rng, "u1").pull_request_id)
            .collect();
        assert_eq!(ids.len(), 200);
    }

    #[test]
    fn test_synthetic_ids_in_range() {
        let mut rng = StdRng::seed_from_u64(2);
        for _ in 0..500 {
            let id = synthetic_pull_request_id(&mut rng);
            let n: u32 = id.strip_prefix("pr-").unwrap().parse().unwrap();
            assert!((SYNTHETIC_ID_MIN..=SYNTHETIC_ID_MAX).contains(&n));
        }
    }

    #[test]
    fn test_author_is_an_active_member() {
        let team = team(&[
            detailed("u1", false),
            UserRef::PlainId("u2".to_string()),
            detailed("u3", true),
        ]);
        let mut rng = StdRng::seed_from_u64(1);
        for _ in 0..100 {
            let author = pick_author(&team, &mut rng).unwrap();
            assert_ne!(author.user_id, "u1");
        }
    }

    #[test]
    fn test_author_falls_back_to_first_member() {
        let team = team(&[detailed("u1", false), detailed("u2", false)]);
        let mut rng = StdRng::seed_from_u64(1);
        assert_eq!(pick_author(&team, &mut rng).unwrap().user_id, "u1");
    }

    #[test]
    fn test_author_absent_for_empty_team() {
        let mut rng = StdRng::seed_from_u64(1);
        assert!(pick_author(&team(&[]), &mut rng).is_none());
    }
}
