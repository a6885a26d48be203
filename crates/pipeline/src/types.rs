//! Shared value types for the classfleet domain.
//!
//! Unlike the newtype identifiers in [`crate::identifiers`], these types carry
//! meaningful values exchanged with the remote API through
//! [`crate::ClassroomApi`].

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{BranchName, CommitSha, RepositoryId};

// ---------------------------------------------------------------------------
// Remote repository data
// ---------------------------------------------------------------------------

/// A repository as reported by the organization listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteRepository {
    /// `owner/name` identifier.
    pub id: RepositoryId,
    /// Browser URL as reported by the API.
    pub html_url: String,
    /// Whether the repository is archived (read-only).
    pub archived: bool,
    /// Whether the repository is marked as a template repository.
    pub is_template: bool,
}

/// The head of a repository's default branch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BranchHead {
    /// Default branch name.
    pub branch: BranchName,
    /// Commit the branch points at.
    pub sha: CommitSha,
}

/// Result of asking GitHub to bring a fork's branch up to date with upstream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MergeUpstreamOutcome {
    /// The branch already contained upstream's head.
    AlreadyUpToDate,
    /// The branch was fast-forwarded.
    FastForward,
    /// A merge commit was created.
    Merged,
}

// ---------------------------------------------------------------------------
// Collaborators
// ---------------------------------------------------------------------------

/// A user's relationship to a repository, as observed remotely.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "status")]
pub enum CollaboratorStatus {
    /// The user is a collaborator.
    Active,
    /// An invitation exists but has not been accepted.
    PendingInvitation {
        /// Invitation id, needed to cancel it.
        invitation_id: u64,
    },
    /// The user has neither access nor an invitation.
    Absent,
}

impl CollaboratorStatus {
    /// Returns `true` if the user can currently work in the repository.
    pub fn has_access(self) -> bool {
        matches!(self, CollaboratorStatus::Active)
    }
}

/// Repository permission granted to an invited collaborator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Permission {
    Pull,
    Triage,
    #[default]
    Push,
    Maintain,
    Admin,
}

impl Permission {
    /// Returns the value GitHub expects in the `permission` request field.
    pub fn as_str(self) -> &'static str {
        match self {
            Permission::Pull => "pull",
            Permission::Triage => "triage",
            Permission::Push => "push",
            Permission::Maintain => "maintain",
            Permission::Admin => "admin",
        }
    }
}

// ---------------------------------------------------------------------------
// Secrets
// ---------------------------------------------------------------------------

/// A plaintext secret value.
///
/// `Debug` is redacted so values never reach logs or reports.
#[derive(Clone, PartialEq, Eq)]
pub struct SecretValue(String);

impl SecretValue {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Exposes the plaintext for sealing.
    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Debug for SecretValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("SecretValue(<redacted>)")
    }
}

// ---------------------------------------------------------------------------
// Time
// ---------------------------------------------------------------------------

/// A UTC wall-clock timestamp.
///
/// Wraps [`chrono::DateTime<Utc>`] so callers never depend on `chrono` types
/// directly; the underlying representation can change without affecting the
/// domain API.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Timestamp(DateTime<Utc>);

impl Timestamp {
    /// Returns the current UTC time as a [`Timestamp`].
    pub fn now() -> Self {
        Self(Utc::now())
    }

    /// Creates a [`Timestamp`] from a [`DateTime<Utc>`].
    pub fn from_utc(dt: DateTime<Utc>) -> Self {
        Self(dt)
    }

    /// Creates a [`Timestamp`] from seconds since the Unix epoch.
    pub fn from_unix_seconds(secs: i64) -> Option<Self> {
        DateTime::<Utc>::from_timestamp(secs, 0).map(Self)
    }

    /// Returns the underlying [`DateTime<Utc>`].
    pub fn as_datetime(self) -> DateTime<Utc> {
        self.0
    }

    /// Returns how far `self` lies after `earlier`, or zero if it does not.
    pub fn duration_since(self, earlier: Timestamp) -> Duration {
        (self.0 - earlier.0).to_std().unwrap_or(Duration::ZERO)
    }

    /// Returns this timestamp shifted forward by `delta`.
    pub fn plus(self, delta: Duration) -> Self {
        match chrono::Duration::from_std(delta) {
            Ok(d) => Self(self.0 + d),
            Err(_) => self,
        }
    }
}

impl std::fmt::Display for Timestamp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0.to_rfc3339())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn duration_since_saturates_at_zero() {
        let early = Timestamp::from_unix_seconds(100).unwrap();
        let late = Timestamp::from_unix_seconds(160).unwrap();
        assert_eq!(late.duration_since(early), Duration::from_secs(60));
        assert_eq!(early.duration_since(late), Duration::ZERO);
        assert_eq!(early.plus(Duration::from_secs(60)), late);
    }

    #[test]
    fn secret_value_debug_is_redacted() {
        let secret = SecretValue::new("hunter2");
        assert_eq!(format!("{secret:?}"), "SecretValue(<redacted>)");
        assert_eq!(secret.expose(), "hunter2");
    }

    #[test]
    fn only_active_collaborators_have_access() {
        assert!(CollaboratorStatus::Active.has_access());
        assert!(!CollaboratorStatus::PendingInvitation { invitation_id: 7 }.has_access());
        assert!(!CollaboratorStatus::Absent.has_access());
    }
}
