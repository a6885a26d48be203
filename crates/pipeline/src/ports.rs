//! Port traits implemented by infrastructure crates.
//!
//! [`ClassroomApi`] is the remote API surface (implemented by the `github`
//! crate); every method performs exactly one attempt and returns an
//! already-classified [`ApiError`]. Retrying is the resilience layer's job.
//!
//! [`RosterStore`] is the roster's persistence boundary (implemented by the
//! `roster` crate). Implementations must serialize writes per record.

use async_trait::async_trait;
use thiserror::Error;

use crate::{
    ApiError, BranchHead, BranchName, CollaboratorStatus, Email, GithubUsername,
    MergeUpstreamOutcome, OrgName, Permission, RemoteRepository, RepositoryId, RosterRecord,
    SecretName, SecretValue,
};

/// Page size used when listing organization repositories.
pub const REPOSITORY_PAGE_SIZE: usize = 100;

/// Remote operations the pipeline needs from GitHub.
///
/// Methods documented as *mutating* change remote state; the orchestrator
/// never calls them while previewing a dry run.
#[async_trait]
pub trait ClassroomApi: Send + Sync {
    /// Lists one page (1-based) of the organization's repositories.
    ///
    /// A page shorter than [`REPOSITORY_PAGE_SIZE`] is the last one.
    async fn list_org_repositories(
        &self,
        org: &OrgName,
        page: u32,
    ) -> Result<Vec<RemoteRepository>, ApiError>;

    /// Returns the head of the repository's default branch.
    async fn default_branch_head(&self, repo: &RepositoryId) -> Result<BranchHead, ApiError>;

    /// *Mutating.* Brings `branch` of a fork up to date with its upstream.
    async fn merge_upstream(
        &self,
        repo: &RepositoryId,
        branch: &BranchName,
    ) -> Result<MergeUpstreamOutcome, ApiError>;

    /// Lists the names of the repository's Actions secrets.
    async fn list_secret_names(&self, repo: &RepositoryId) -> Result<Vec<SecretName>, ApiError>;

    /// *Mutating.* Creates or replaces an Actions secret.
    async fn put_secret(
        &self,
        repo: &RepositoryId,
        name: &SecretName,
        value: &SecretValue,
    ) -> Result<(), ApiError>;

    /// Reports whether `user` is a collaborator, has a pending invitation, or
    /// neither.
    async fn collaborator_status(
        &self,
        repo: &RepositoryId,
        user: &GithubUsername,
    ) -> Result<CollaboratorStatus, ApiError>;

    /// *Mutating.* Removes `user` as a collaborator and cancels any pending
    /// invitation. Succeeds if the user had no access to begin with.
    async fn remove_collaborator(
        &self,
        repo: &RepositoryId,
        user: &GithubUsername,
    ) -> Result<(), ApiError>;

    /// *Mutating.* Invites `user` with `permission`. Succeeds if the user is
    /// already a collaborator.
    async fn invite_collaborator(
        &self,
        repo: &RepositoryId,
        user: &GithubUsername,
        permission: Permission,
    ) -> Result<(), ApiError>;
}

// ---------------------------------------------------------------------------

/// Failures of a [`RosterStore`].
#[derive(Debug, Error)]
pub enum RosterStoreError {
    /// No record with this email exists in the store.
    #[error("no roster record for '{email}'")]
    NotFound { email: Email },

    /// The backing storage could not be read or written.
    #[error("roster storage error: {message}")]
    Storage { message: String },
}

/// CRUD boundary of the roster's persistent storage.
#[async_trait]
pub trait RosterStore: Send + Sync {
    /// Finds the record in `org` whose login matches `username`
    /// case-insensitively.
    async fn find_by_username(
        &self,
        org: &OrgName,
        username: &GithubUsername,
    ) -> Result<Option<RosterRecord>, RosterStoreError>;

    /// Lists every record of `org`, sorted by email.
    async fn list_by_org(&self, org: &OrgName) -> Result<Vec<RosterRecord>, RosterStoreError>;

    /// Sets the repository link of the record keyed by `email`.
    async fn update_link(&self, email: &Email, repository_url: &str)
        -> Result<(), RosterStoreError>;

    /// Inserts `record`, or replaces the record with the same email.
    async fn upsert(&self, record: RosterRecord) -> Result<(), RosterStoreError>;
}
