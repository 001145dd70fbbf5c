//! HTTP client for the review-assignment service.
//!
//! Every endpoint method issues exactly one request and resolves to an
//! [`ActionOutcome`]; no service response is an error at this level. The
//! caller supplies the accepted status set, the client classifies the
//! response against it and records the sample into the run's
//! [`MetricsCollector`].

use crate::errors::LoadgenError;
use crate::observability::MetricsCollector;
use crate::outcome::{Accepted, ActionKind, ActionOutcome, Tag, Verdict, TRANSPORT_FAILURE};
use common::types::{
    CreatePullRequestRequest, CreateTeamRequest, MergePullRequestRequest, ReassignField,
    SetIsActiveRequest,
};
use reqwest::{Client, RequestBuilder};
use serde_json::{Map, Value};
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// Maximum number of body characters carried into a log line.
const MAX_LOGGED_BODY_LEN: usize = 256;

/// Client for the review-assignment service.
#[derive(Debug, Clone)]
pub struct ReviewClient {
    base_url: String,
    http_client: Client,
    collector: MetricsCollector,
    reassign_field: ReassignField,
}

impl ReviewClient {
    /// Create a client with a per-request timeout.
    ///
    /// # Errors
    ///
    /// Returns `LoadgenError::HttpClient` if the TLS backend cannot be
    /// initialized.
    pub fn new(
        base_url: impl Into<String>,
        timeout: Duration,
        collector: MetricsCollector,
        reassign_field: ReassignField,
    ) -> Result<Self, LoadgenError> {
        let http_client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(LoadgenError::HttpClient)?;

        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            http_client,
            collector,
            reassign_field,
        })
    }

    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// The collector every request is recorded into.
    #[must_use]
    pub fn collector(&self) -> &MetricsCollector {
        &self.collector
    }

    fn url(&self, action: ActionKind) -> String {
        format!("{}{}", self.base_url, action.endpoint())
    }

    /// Check `GET /health`. Not recorded as traffic.
    ///
    /// # Errors
    ///
    /// Returns `LoadgenError::HealthCheckFailed` when the service is
    /// unreachable or answers with a non-2xx status.
    pub async fn health_check(&self) -> Result<(), LoadgenError> {
        let response = self
            .http_client
            .get(self.url(ActionKind::HealthCheck))
            .send()
            .await
            .map_err(|e| LoadgenError::HealthCheckFailed {
                message: format!("{} unreachable: {e}", self.base_url),
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(LoadgenError::HealthCheckFailed {
                message: format!("status {}: {}", status.as_u16(), truncate(&body)),
            });
        }
        Ok(())
    }

    /// `POST /team/add`
    pub async fn add_team(
        &self,
        team: &CreateTeamRequest,
        tag: Tag,
        accepted: Accepted,
    ) -> ActionOutcome {
        let request = self
            .http_client
            .post(self.url(ActionKind::CreateTeam))
            .json(team);
        self.send(ActionKind::CreateTeam, tag, accepted, request).await
    }

    /// `GET /team/get?team_name=`
    pub async fn get_team(&self, team_name: &str, tag: Tag) -> ActionOutcome {
        let request = self
            .http_client
            .get(self.url(ActionKind::FetchTeam))
            .query(&[("team_name", team_name)]);
        self.send(ActionKind::FetchTeam, tag, Accepted::OK, request).await
    }

    /// `POST /pullRequest/create`
    pub async fn create_pull_request(
        &self,
        pull_request: &CreatePullRequestRequest,
        tag: Tag,
        accepted: Accepted,
    ) -> ActionOutcome {
        let request = self
            .http_client
            .post(self.url(ActionKind::CreatePullRequest))
            .json(pull_request);
        self.send(ActionKind::CreatePullRequest, tag, accepted, request)
            .await
    }

    /// `POST /pullRequest/merge`
    pub async fn merge_pull_request(
        &self,
        pull_request_id: &str,
        tag: Tag,
        accepted: Accepted,
    ) -> ActionOutcome {
        let body = MergePullRequestRequest {
            pull_request_id: pull_request_id.to_string(),
        };
        let request = self
            .http_client
            .post(self.url(ActionKind::MergePullRequest))
            .json(&body);
        self.send(ActionKind::MergePullRequest, tag, accepted, request)
            .await
    }

    /// `POST /pullRequest/reassign`
    ///
    /// The old reviewer is sent under the configured field name.
    pub async fn reassign_reviewer(
        &self,
        pull_request_id: &str,
        old_reviewer_id: &str,
        tag: Tag,
    ) -> ActionOutcome {
        let mut body = Map::new();
        body.insert(
            "pull_request_id".to_string(),
            Value::String(pull_request_id.to_string()),
        );
        body.insert(
            self.reassign_field.as_str().to_string(),
            Value::String(old_reviewer_id.to_string()),
        );
        let request = self
            .http_client
            .post(self.url(ActionKind::ReassignReviewer))
            .json(&body);
        self.send(ActionKind::ReassignReviewer, tag, Accepted::REASSIGN, request)
            .await
    }

    /// `GET /users/getReview?user_id=`
    pub async fn get_user_reviews(&self, user_id: &str, tag: Tag) -> ActionOutcome {
        let request = self
            .http_client
            .get(self.url(ActionKind::FetchUserReviews))
            .query(&[("user_id", user_id)]);
        self.send(ActionKind::FetchUserReviews, tag, Accepted::OK, request)
            .await
    }

    /// `POST /users/setIsActive`
    pub async fn set_is_active(&self, user_id: &str, is_active: bool, tag: Tag) -> ActionOutcome {
        let body = SetIsActiveRequest {
            user_id: user_id.to_string(),
            is_active,
        };
        let request = self
            .http_client
            .post(self.url(ActionKind::SetUserActive))
            .json(&body);
        self.send(ActionKind::SetUserActive, tag, Accepted::SET_ACTIVE, request)
            .await
    }

    async fn send(
        &self,
        action: ActionKind,
        tag: Tag,
        accepted: Accepted,
        request: RequestBuilder,
    ) -> ActionOutcome {
        let started = Instant::now();

        let (status, body) = match request.send().await {
            Ok(response) => {
                let status = response.status().as_u16();
                // Error bodies and empty bodies are not always JSON.
                let body = match response.bytes().await {
                    Ok(bytes) => serde_json::from_slice::<Value>(&bytes).ok(),
                    Err(e) => {
                        debug!(
                            target: "loadgen.client",
                            endpoint = action.endpoint(),
                            error = %e,
                            "Failed to read response body"
                        );
                        None
                    }
                };
                (status, body)
            }
            Err(e) => {
                warn!(
                    target: "loadgen.client",
                    endpoint = action.endpoint(),
                    tag = %tag,
                    timeout = e.is_timeout(),
                    error = %e,
                    "Request failed without a response"
                );
                (TRANSPORT_FAILURE, None)
            }
        };

        let elapsed = started.elapsed();
        let verdict = if accepted.contains(status) {
            Verdict::Accepted
        } else {
            Verdict::Unexpected
        };

        if verdict == Verdict::Unexpected && status != TRANSPORT_FAILURE {
            debug!(
                target: "loadgen.client",
                endpoint = action.endpoint(),
                tag = %tag,
                status,
                body = %body.as_ref().map(|b| truncate(&b.to_string())).unwrap_or_default(),
                "Unexpected status"
            );
        }

        self.collector.record_request(action, tag, verdict, elapsed);

        ActionOutcome {
            action,
            tag,
            status,
            body,
            verdict,
        }
    }
}

fn truncate(body: &str) -> String {
    if body.chars().count() > MAX_LOGGED_BODY_LEN {
        let head: String = body.chars().take(MAX_LOGGED_BODY_LEN).collect();
        format!("{head}...[truncated]")
    } else {
        body.to_string()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate_long_bodies() {
        let long = "x".repeat(MAX_LOGGED_BODY_LEN + 10);
        let truncated = truncate(&long);
        assert!(truncated.ends_with("...[truncated]"));
        assert_eq!(truncate("short"), "short");
    }

    #[test]
    fn test_base_url_trailing_slash_trimmed() {
        let client = ReviewClient::new(
            "http://localhost:8080/",
            Duration::from_secs(1),
            MetricsCollector::new(),
            ReassignField::default(),
        )
        .unwrap();
        assert_eq!(client.base_url(), "http://localhost:8080");
        assert_eq!(
            client.url(ActionKind::MergePullRequest),
            "http://localhost:8080/pullRequest/merge"
        );
    }
}
