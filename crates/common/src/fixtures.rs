//! Static team fixtures.
//!
//! Fixture files are a JSON array of `{"team": "...", "users": [...]}`
//! records where each user is either a bare id string or a
//! `{"user_id": "...", "is_active": bool}` object. Both spellings are
//! normalized into [`Member`] at load time so nothing downstream has to
//! care which one a file used.
//!
//! A [`FixtureSet`] is never mutated after loading. Per-run renaming
//! (see [`FixtureSet::with_unique_suffix`]) produces a new set.

use crate::error::{CommonError, Result};
use crate::types::{CreateTeamRequest, TeamMember};
use serde::Deserialize;
use std::path::Path;
use tracing::debug;

/// A user reference as written in a fixture file.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum UserRef {
    /// Bare user id; implicitly active.
    PlainId(String),
    /// Structured record.
    Detailed {
        user_id: String,
        #[serde(default = "default_active")]
        is_active: bool,
    },
}

fn default_active() -> bool {
    true
}

impl UserRef {
    /// Normalize to the canonical member record.
    #[must_use]
    pub fn normalize(&self) -> Member {
        match self {
            UserRef::PlainId(user_id) => Member {
                user_id: user_id.clone(),
                is_active: true,
            },
            UserRef::Detailed { user_id, is_active } => Member {
                user_id: user_id.clone(),
                is_active: *is_active,
            },
        }
    }
}

/// Canonical user record.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Member {
    pub user_id: String,
    pub is_active: bool,
}

#[derive(Debug, Deserialize)]
struct RawTeam {
    team: String,
    #[serde(default)]
    users: Vec<UserRef>,
}

/// One team of the fixture set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TeamFixture {
    /// Name used against the service.
    pub name: String,
    /// Name as written in the fixture file, set once the team was renamed.
    pub original_name: Option<String>,
    /// Ordered, normalized members.
    pub members: Vec<Member>,
}

impl TeamFixture {
    /// Build a team from a name and raw user references.
    pub fn new(name: impl Into<String>, users: &[UserRef]) -> Self {
        Self {
            name: name.into(),
            original_name: None,
            members: users.iter().map(UserRef::normalize).collect(),
        }
    }

    /// Members not explicitly marked inactive.
    pub fn active_members(&self) -> impl Iterator<Item = &Member> {
        self.members.iter().filter(|m| m.is_active)
    }

    /// Member ids in fixture order.
    #[must_use]
    pub fn user_ids(&self) -> Vec<String> {
        self.members.iter().map(|m| m.user_id.clone()).collect()
    }

    /// Payload for `POST /team/add`. Usernames are derived as `<user_id>_name`.
    #[must_use]
    pub fn to_create_request(&self) -> CreateTeamRequest {
        CreateTeamRequest {
            team_name: self.name.clone(),
            members: self
                .members
                .iter()
                .map(|m| TeamMember {
                    user_id: m.user_id.clone(),
                    username: format!("{}_name", m.user_id),
                    is_active: m.is_active,
                })
                .collect(),
        }
    }
}

/// The full, immutable fixture set for a run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FixtureSet {
    teams: Vec<TeamFixture>,
}

impl FixtureSet {
    /// Build from already-normalized teams.
    ///
    /// # Errors
    ///
    /// Returns an error when `teams` is empty or a team name is blank.
    pub fn new(teams: Vec<TeamFixture>) -> Result<Self> {
        if teams.is_empty() {
            return Err(CommonError::EmptyFixtures);
        }
        if let Some(index) = teams.iter().position(|t| t.name.trim().is_empty()) {
            return Err(CommonError::EmptyTeamName { index });
        }
        Ok(Self { teams })
    }

    /// Parse a fixture document.
    ///
    /// # Errors
    ///
    /// Returns an error on malformed JSON or an invalid team list.
    pub fn parse(json: &str) -> Result<Self> {
        let raw: Vec<RawTeam> = serde_json::from_str(json)?;
        let teams = raw
            .into_iter()
            .map(|t| TeamFixture::new(t.team, &t.users))
            .collect();
        Self::new(teams)
    }

    /// Read and parse a fixture file.
    ///
    /// # Errors
    ///
    /// Returns an error when the file cannot be read or parsed.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|source| CommonError::FixtureIo {
            path: path.display().to_string(),
            source,
        })?;
        let set = Self::parse(&contents)?;
        debug!(
            path = %path.display(),
            teams = set.teams.len(),
            users = set.user_count(),
            "Loaded team fixtures"
        );
        Ok(set)
    }

    /// Teams in fixture order.
    #[must_use]
    pub fn teams(&self) -> &[TeamFixture] {
        &self.teams
    }

    /// Look a team up by its service-facing name.
    #[must_use]
    pub fn team(&self, name: &str) -> Option<&TeamFixture> {
        self.teams.iter().find(|t| t.name == name)
    }

    /// Every member id across all teams, in fixture order.
    #[must_use]
    pub fn all_user_ids(&self) -> Vec<String> {
        self.teams.iter().flat_map(TeamFixture::user_ids).collect()
    }

    /// Total number of members across teams.
    #[must_use]
    pub fn user_count(&self) -> usize {
        self.teams.iter().map(|t| t.members.len()).sum()
    }

    /// Derive a set whose team names carry `_<suffix>_<index>`, so a run
    /// never collides with teams left behind by an earlier run.
    #[must_use]
    pub fn with_unique_suffix(&self, suffix: &str) -> Self {
        let teams = self
            .teams
            .iter()
            .enumerate()
            .map(|(index, team)| TeamFixture {
                name: format!("{}_{}_{}", team.name, suffix, index),
                original_name: Some(
                    team.original_name
                        .clone()
                        .unwrap_or_else(|| team.name.clone()),
                ),
                members: team.members.clone(),
            })
            .collect();
        Self { teams }
    }

    /// Derive a set with every member marked active.
    #[must_use]
    pub fn with_all_active(&self) -> Self {
        let teams = self
            .teams
            .iter()
            .map(|team| TeamFixture {
                members: team
                    .members
                    .iter()
                    .map(|m| Member {
                        user_id: m.user_id.clone(),
                        is_active: true,
                    })
                    .collect(),
                ..team.clone()
            })
            .collect();
        Self { teams }
    }

    /// Keep only the teams whose name satisfies `keep`.
    #[must_use]
    pub fn retain_teams<F>(&self, mut keep: F) -> Self
    where
        F: FnMut(&TeamFixture) -> bool,
    {
        Self {
            teams: self.teams.iter().filter(|t| keep(t)).cloned().collect(),
        }
    }
}
