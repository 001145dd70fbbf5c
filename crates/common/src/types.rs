//! Wire types of the pull-request review-assignment service.
//!
//! These mirror the JSON bodies exchanged with the service endpoints. The
//! load generator serializes requests from them and the test stub
//! deserializes the same shapes, so both sides agree on field names.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A team member as submitted to `/team/add` and returned by `/team/get`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TeamMember {
    pub user_id: String,
    pub username: String,
    pub is_active: bool,
}

/// A team with its ordered member list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Team {
    pub team_name: String,
    #[serde(default)]
    pub members: Vec<TeamMember>,
}

/// Request body for `POST /team/add`.
pub type CreateTeamRequest = Team;

/// Response body wrapping a team (`{"team": {...}}`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TeamResponse {
    pub team: Team,
}

/// Pull request lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum PullRequestStatus {
    Open,
    Merged,
}

/// A pull request as returned by the service.
///
/// `assigned_reviewers` is always service-assigned; the generator never
/// computes it locally.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PullRequest {
    pub pull_request_id: String,
    pub pull_request_name: String,
    pub author_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<PullRequestStatus>,
    #[serde(default)]
    pub assigned_reviewers: Vec<String>,
}

/// Request body for `POST /pullRequest/create`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreatePullRequestRequest {
    pub pull_request_id: String,
    pub pull_request_name: String,
    pub author_id: String,
}

/// Request body for `POST /pullRequest/merge`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MergePullRequestRequest {
    pub pull_request_id: String,
}

/// Response body wrapping a pull request (`{"pr": {...}}`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PullRequestResponse {
    pub pr: PullRequest,
}

/// Response body of a successful reassignment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReassignResponse {
    pub pr: PullRequest,
    #[serde(default)]
    pub replaced_by: Option<String>,
}

/// Name of the JSON field carrying the reviewer being replaced.
///
/// The service's scenario fixtures have used both spellings for the same
/// logical field, so the sender picks one explicitly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReassignField {
    #[default]
    OldUserId,
    OldReviewerId,
}

impl ReassignField {
    /// The JSON key for this variant.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            ReassignField::OldUserId => "old_user_id",
            ReassignField::OldReviewerId => "old_reviewer_id",
        }
    }

    /// Parse a JSON key back into a variant.
    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "old_user_id" => Some(ReassignField::OldUserId),
            "old_reviewer_id" => Some(ReassignField::OldReviewerId),
            _ => None,
        }
    }
}

impl fmt::Display for ReassignField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Request body for `POST /pullRequest/reassign` as received by a server.
///
/// Accepts either spelling of the old reviewer field.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ReassignRequest {
    pub pull_request_id: String,
    #[serde(alias = "old_reviewer_id")]
    pub old_user_id: String,
}

/// Request body for `POST /users/setIsActive`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SetIsActiveRequest {
    pub user_id: String,
    pub is_active: bool,
}

/// A user record as returned by `/users/setIsActive`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub user_id: String,
    pub username: String,
    pub team_name: String,
    pub is_active: bool,
}

/// Response body of `/users/setIsActive`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserResponse {
    pub user: User,
}

/// Response body of `/users/getReview`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GetReviewResponse {
    pub user_id: String,
    #[serde(default)]
    pub pull_requests: Vec<PullRequest>,
}

/// Error payload returned for every non-2xx response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: ErrorDetail,
}

/// Machine-readable error code plus message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorDetail {
    pub code: String,
    pub message: String,
}
