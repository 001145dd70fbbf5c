//! Outcome classification for a single service call.
//!
//! Every action resolves to an [`ActionOutcome`]; nothing an action does
//! aborts the run. Whether a status code counts as a pass is decided by the
//! action's [`Accepted`] set, not by HTTP success classes: a 409 on a
//! duplicate create under load is a pass, a 200 where only 201 was expected
//! is not.

use serde::Serialize;
use serde_json::Value;
use std::fmt;

/// Traffic classification used to partition metrics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Tag {
    /// Setup and teardown traffic.
    Prep,
    /// Traffic issued during the measured window.
    Measured,
}

impl Tag {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Tag::Prep => "prep",
            Tag::Measured => "measured",
        }
    }

    /// Value of the `prep` tag in selector syntax (`{prep:true}`).
    #[must_use]
    pub fn prep_label(self) -> &'static str {
        match self {
            Tag::Prep => "true",
            Tag::Measured => "false",
        }
    }
}

impl fmt::Display for Tag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Status codes an action treats as a pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Accepted {
    /// Exactly these codes.
    Codes(&'static [u16]),
    /// Any code strictly below the bound (and not a transport failure).
    Below(u16),
}

impl Accepted {
    /// Team creation during load: created, or already exists.
    pub const TEAM_ADD: Accepted = Accepted::Codes(&[200, 201, 400, 409]);
    /// Create PR under mixed load: created, or duplicate id.
    pub const PR_CREATE_LOAD: Accepted = Accepted::Codes(&[201, 409]);
    /// Create PR during provisioning, where duplicates are unexpected.
    pub const PR_CREATE_PREP: Accepted = Accepted::Codes(&[201]);
    pub const MERGE: Accepted = Accepted::Codes(&[200, 404]);
    pub const REASSIGN: Accepted = Accepted::Codes(&[200, 404, 409]);
    pub const SET_ACTIVE: Accepted = Accepted::Codes(&[200, 404]);
    pub const OK: Accepted = Accepted::Codes(&[200]);
    /// Anything the server did not fail on.
    pub const NO_SERVER_ERROR: Accepted = Accepted::Below(500);

    #[must_use]
    pub fn contains(self, status: u16) -> bool {
        match self {
            Accepted::Codes(codes) => codes.contains(&status),
            Accepted::Below(bound) => status != TRANSPORT_FAILURE && status < bound,
        }
    }
}

/// Status recorded when no HTTP response was received.
pub const TRANSPORT_FAILURE: u16 = 0;

/// The service operations the generator drives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionKind {
    CreateTeam,
    FetchTeam,
    CreatePullRequest,
    MergePullRequest,
    ReassignReviewer,
    FetchUserReviews,
    SetUserActive,
    HealthCheck,
}

impl ActionKind {
    /// Endpoint path, used as a bounded metric label.
    #[must_use]
    pub fn endpoint(self) -> &'static str {
        match self {
            ActionKind::CreateTeam => "/team/add",
            ActionKind::FetchTeam => "/team/get",
            ActionKind::CreatePullRequest => "/pullRequest/create",
            ActionKind::MergePullRequest => "/pullRequest/merge",
            ActionKind::ReassignReviewer => "/pullRequest/reassign",
            ActionKind::FetchUserReviews => "/users/getReview",
            ActionKind::SetUserActive => "/users/setIsActive",
            ActionKind::HealthCheck => "/health",
        }
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            ActionKind::CreateTeam => "create_team",
            ActionKind::FetchTeam => "fetch_team",
            ActionKind::CreatePullRequest => "create_pull_request",
            ActionKind::MergePullRequest => "merge_pull_request",
            ActionKind::ReassignReviewer => "reassign_reviewer",
            ActionKind::FetchUserReviews => "fetch_user_reviews",
            ActionKind::SetUserActive => "set_user_active",
            ActionKind::HealthCheck => "health_check",
        }
    }
}

impl fmt::Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How an action resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Verdict {
    /// Status within the accepted set.
    Accepted,
    /// Status outside the accepted set, or a transport failure.
    Unexpected,
    /// Precondition unmet; no request was issued.
    Skipped,
}

/// Result of one action.
#[derive(Debug, Clone)]
pub struct ActionOutcome {
    pub action: ActionKind,
    pub tag: Tag,
    /// HTTP status, [`TRANSPORT_FAILURE`] when no response arrived or the
    /// action was skipped.
    pub status: u16,
    pub body: Option<Value>,
    pub verdict: Verdict,
}

impl ActionOutcome {
    /// Precondition-unmet no-op.
    #[must_use]
    pub fn skipped(action: ActionKind, tag: Tag) -> Self {
        Self {
            action,
            tag,
            status: TRANSPORT_FAILURE,
            body: None,
            verdict: Verdict::Skipped,
        }
    }

    #[must_use]
    pub fn is_accepted(&self) -> bool {
        self.verdict == Verdict::Accepted
    }

    #[must_use]
    pub fn is_skipped(&self) -> bool {
        self.verdict == Verdict::Skipped
    }

    /// `pr.assigned_reviewers` from a create or reassign response body.
    #[must_use]
    pub fn assigned_reviewers(&self) -> Option<Vec<String>> {
        let reviewers = self.body.as_ref()?.get("pr")?.get("assigned_reviewers")?;
        serde_json::from_value(reviewers.clone()).ok()
    }
}
