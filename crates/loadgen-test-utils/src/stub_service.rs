//! In-memory review-assignment service.
//!
//! Mirrors the status codes and payload shapes of the real service closely
//! enough to drive the load generator end to end:
//!
//! | Endpoint | Success | Failures |
//! |----------|---------|----------|
//! | `POST /team/add` | 201 `{team}` | 400 `TEAM_EXISTS` |
//! | `GET /team/get` | 200 team | 404 |
//! | `POST /pullRequest/create` | 201 `{pr}` | 404 author, 409 `PR_EXISTS` |
//! | `POST /pullRequest/merge` | 200 `{pr}`, idempotent | 404 |
//! | `POST /pullRequest/reassign` | 200 `{pr, replaced_by}` | 404, 409 `PR_MERGED` / `NOT_ASSIGNED` / `NO_CANDIDATE` |
//! | `GET /users/getReview` | 200 | 404 |
//! | `POST /users/setIsActive` | 200 `{user}` | 404 |
//! | `GET /health` | 200 | none |

use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use common::types::{
    CreatePullRequestRequest, CreateTeamRequest, ErrorDetail, ErrorResponse, GetReviewResponse,
    MergePullRequestRequest, PullRequest, PullRequestResponse, PullRequestStatus,
    ReassignRequest, ReassignResponse, SetIsActiveRequest, Team, TeamMember, TeamResponse, User,
    UserResponse,
};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use serde::Deserialize;
use serde_json::json;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;

/// Reviewers assigned to a new pull request.
pub const REVIEWERS_PER_PULL_REQUEST: usize = 2;

/// Error returned by a stub handler.
#[derive(Debug)]
pub struct StubError {
    status: StatusCode,
    code: &'static str,
    message: String,
}

impl StubError {
    fn not_found(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::NOT_FOUND,
            code: "NOT_FOUND",
            message: message.into(),
        }
    }

    fn conflict(code: &'static str, message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::CONFLICT,
            code,
            message: message.into(),
        }
    }
}

impl IntoResponse for StubError {
    fn into_response(self) -> Response {
        let body = ErrorResponse {
            error: ErrorDetail {
                code: self.code.to_string(),
                message: self.message,
            },
        };
        (self.status, Json(body)).into_response()
    }
}

#[derive(Debug, Clone)]
struct StoredUser {
    username: String,
    team_name: String,
    is_active: bool,
}

#[derive(Debug, Default)]
struct Store {
    /// Team name to ordered member ids.
    teams: HashMap<String, Vec<String>>,
    users: HashMap<String, StoredUser>,
    pull_requests: HashMap<String, PullRequest>,
}

impl Store {
    fn team(&self, name: &str) -> Option<Team> {
        let member_ids = self.teams.get(name)?;
        let members = member_ids
            .iter()
            .filter_map(|id| {
                self.users.get(id).map(|user| TeamMember {
                    user_id: id.clone(),
                    username: user.username.clone(),
                    is_active: user.is_active,
                })
            })
            .collect();
        Some(Team {
            team_name: name.to_string(),
            members,
        })
    }

    /// Active members of `team_name` other than the excluded ids.
    fn active_candidates(&self, team_name: &str, exclude: &[&str]) -> Vec<String> {
        self.teams
            .get(team_name)
            .map(|ids| {
                ids.iter()
                    .filter(|id| !exclude.contains(&id.as_str()))
                    .filter(|id| self.users.get(*id).is_some_and(|u| u.is_active))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default()
    }

    fn user(&self, user_id: &str) -> Option<User> {
        self.users.get(user_id).map(|u| User {
            user_id: user_id.to_string(),
            username: u.username.clone(),
            team_name: u.team_name.clone(),
            is_active: u.is_active,
        })
    }
}

/// Shared stub state.
#[derive(Debug)]
pub struct StubService {
    store: Mutex<Store>,
    rng: Mutex<StdRng>,
    latency: Option<Duration>,
}

impl Default for StubService {
    fn default() -> Self {
        Self::new()
    }
}

impl StubService {
    pub fn new() -> Self {
        Self {
            store: Mutex::new(Store::default()),
            rng: Mutex::new(StdRng::seed_from_u64(0x5eed)),
            latency: None,
        }
    }

    /// Delay every response by `latency`.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    async fn delay(&self) {
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
    }

    /// A stored pull request.
    pub async fn pull_request(&self, pull_request_id: &str) -> Option<PullRequest> {
        self.store
            .lock()
            .await
            .pull_requests
            .get(pull_request_id)
            .cloned()
    }

    /// Number of pull requests ever created.
    pub async fn pull_request_count(&self) -> usize {
        self.store.lock().await.pull_requests.len()
    }

    /// Number of merged pull requests.
    pub async fn merged_count(&self) -> usize {
        self.store
            .lock()
            .await
            .pull_requests
            .values()
            .filter(|pr| pr.status == Some(PullRequestStatus::Merged))
            .count()
    }

    /// Names of every stored team.
    pub async fn team_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.store.lock().await.teams.keys().cloned().collect();
        names.sort();
        names
    }
}

/// Build the stub router.
pub fn build_routes(service: Arc<StubService>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/team/add", post(add_team))
        .route("/team/get", get(get_team))
        .route("/pullRequest/create", post(create_pull_request))
        .route("/pullRequest/merge", post(merge_pull_request))
        .route("/pullRequest/reassign", post(reassign_reviewer))
        .route("/users/getReview", get(get_user_reviews))
        .route("/users/setIsActive", post(set_is_active))
        .with_state(service)
}

async fn health() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok" }))
}

async fn add_team(
    State(service): State<Arc<StubService>>,
    Json(request): Json<CreateTeamRequest>,
) -> Result<(StatusCode, Json<TeamResponse>), StubError> {
    service.delay().await;
    let mut store = service.store.lock().await;

    if store.teams.contains_key(&request.team_name) {
        return Err(StubError {
            status: StatusCode::BAD_REQUEST,
            code: "TEAM_EXISTS",
            message: format!("{} already exists", request.team_name),
        });
    }

    let member_ids = request.members.iter().map(|m| m.user_id.clone()).collect();
    for member in &request.members {
        store.users.insert(
            member.user_id.clone(),
            StoredUser {
                username: member.username.clone(),
                team_name: request.team_name.clone(),
                is_active: member.is_active,
            },
        );
    }
    store.teams.insert(request.team_name.clone(), member_ids);

    Ok((StatusCode::CREATED, Json(TeamResponse { team: request })))
}

#[derive(Debug, Deserialize)]
struct TeamQuery {
    team_name: String,
}

async fn get_team(
    State(service): State<Arc<StubService>>,
    Query(query): Query<TeamQuery>,
) -> Result<Json<Team>, StubError> {
    service.delay().await;
    let store = service.store.lock().await;
    store
        .team(&query.team_name)
        .map(Json)
        .ok_or_else(|| StubError::not_found(format!("team {} not found", query.team_name)))
}

async fn create_pull_request(
    State(service): State<Arc<StubService>>,
    Json(request): Json<CreatePullRequestRequest>,
) -> Result<(StatusCode, Json<PullRequestResponse>), StubError> {
    service.delay().await;
    let mut store = service.store.lock().await;

    if store.pull_requests.contains_key(&request.pull_request_id) {
        return Err(StubError::conflict(
            "PR_EXISTS",
            format!("{} already exists", request.pull_request_id),
        ));
    }
    let Some(author) = store.users.get(&request.author_id).cloned() else {
        return Err(StubError::not_found(format!(
            "author {} not found",
            request.author_id
        )));
    };

    let mut candidates = store.active_candidates(&author.team_name, &[&request.author_id]);
    candidates.shuffle(&mut *service.rng.lock().await);
    candidates.truncate(REVIEWERS_PER_PULL_REQUEST);

    let pr = PullRequest {
        pull_request_id: request.pull_request_id.clone(),
        pull_request_name: request.pull_request_name,
        author_id: request.author_id,
        status: Some(PullRequestStatus::Open),
        assigned_reviewers: candidates,
    };
    store
        .pull_requests
        .insert(request.pull_request_id, pr.clone());

    Ok((StatusCode::CREATED, Json(PullRequestResponse { pr })))
}

async fn merge_pull_request(
    State(service): State<Arc<StubService>>,
    Json(request): Json<MergePullRequestRequest>,
) -> Result<Json<PullRequestResponse>, StubError> {
    service.delay().await;
    let mut store = service.store.lock().await;
    let Some(pr) = store.pull_requests.get_mut(&request.pull_request_id) else {
        return Err(StubError::not_found(format!(
            "pull request {} not found",
            request.pull_request_id
        )));
    };
    pr.status = Some(PullRequestStatus::Merged);
    Ok(Json(PullRequestResponse { pr: pr.clone() }))
}

async fn reassign_reviewer(
    State(service): State<Arc<StubService>>,
    Json(request): Json<ReassignRequest>,
) -> Result<Json<ReassignResponse>, StubError> {
    service.delay().await;
    let mut store = service.store.lock().await;

    let Some(pr) = store.pull_requests.get(&request.pull_request_id).cloned() else {
        return Err(StubError::not_found(format!(
            "pull request {} not found",
            request.pull_request_id
        )));
    };
    let Some(old_reviewer) = store.users.get(&request.old_user_id).cloned() else {
        return Err(StubError::not_found(format!(
            "user {} not found",
            request.old_user_id
        )));
    };
    if pr.status == Some(PullRequestStatus::Merged) {
        return Err(StubError::conflict(
            "PR_MERGED",
            "cannot reassign on merged PR",
        ));
    }
    if !pr.assigned_reviewers.contains(&request.old_user_id) {
        return Err(StubError::conflict(
            "NOT_ASSIGNED",
            "reviewer is not assigned to this PR",
        ));
    }

    let mut exclude: Vec<&str> = pr.assigned_reviewers.iter().map(String::as_str).collect();
    exclude.push(&pr.author_id);
    let candidates = store.active_candidates(&old_reviewer.team_name, &exclude);
    let Some(replacement) = candidates.choose(&mut *service.rng.lock().await).cloned() else {
        return Err(StubError::conflict(
            "NO_CANDIDATE",
            "no active replacement candidate in team",
        ));
    };

    let assigned_reviewers = pr
        .assigned_reviewers
        .iter()
        .map(|id| {
            if *id == request.old_user_id {
                replacement.clone()
            } else {
                id.clone()
            }
        })
        .collect();
    let updated = PullRequest {
        assigned_reviewers,
        ..pr
    };
    store
        .pull_requests
        .insert(updated.pull_request_id.clone(), updated.clone());

    Ok(Json(ReassignResponse {
        pr: updated,
        replaced_by: Some(replacement),
    }))
}

#[derive(Debug, Deserialize)]
struct UserQuery {
    user_id: String,
}

async fn get_user_reviews(
    State(service): State<Arc<StubService>>,
    Query(query): Query<UserQuery>,
) -> Result<Json<GetReviewResponse>, StubError> {
    service.delay().await;
    let store = service.store.lock().await;
    if !store.users.contains_key(&query.user_id) {
        return Err(StubError::not_found(format!(
            "user {} not found",
            query.user_id
        )));
    }
    let pull_requests = store
        .pull_requests
        .values()
        .filter(|pr| pr.assigned_reviewers.contains(&query.user_id))
        .cloned()
        .collect();
    Ok(Json(GetReviewResponse {
        user_id: query.user_id,
        pull_requests,
    }))
}

async fn set_is_active(
    State(service): State<Arc<StubService>>,
    Json(request): Json<SetIsActiveRequest>,
) -> Result<Json<UserResponse>, StubError> {
    service.delay().await;
    let mut store = service.store.lock().await;
    let Some(user) = store.users.get_mut(&request.user_id) else {
        return Err(StubError::not_found(format!(
            "user {} not found",
            request.user_id
        )));
    };
    user.is_active = request.is_active;
    let user = store
        .user(&request.user_id)
        .ok_or_else(|| StubError::not_found(format!("user {} not found", request.user_id)))?;
    Ok(Json(UserResponse { user }))
}
