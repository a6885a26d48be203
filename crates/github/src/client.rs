//! `reqwest`-based [`ClassroomApi`] implementation.
//!
//! Each method performs a single attempt. Non-success responses are
//! classified by [`crate::classify`]; retrying is the orchestrator's job.

use async_trait::async_trait;
use pipeline::{
    ApiError, BranchHead, BranchName, ClassroomApi, CollaboratorStatus, CommitSha,
    GithubUsername, MergeUpstreamOutcome, OrgName, Permission, RemoteRepository, RepoName,
    RepositoryId, SecretName, SecretValue, Timestamp, REPOSITORY_PAGE_SIZE,
};
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, AUTHORIZATION};
use reqwest::{Method, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::Serialize;
use thiserror::Error;

use crate::classify::{classify_status, classify_transport};
use crate::models;
use crate::sealing::seal_secret;

/// Public GitHub REST endpoint.
pub const DEFAULT_API_URL: &str = "https://api.github.com";

const API_VERSION: &str = "2022-11-28";

/// Connection settings for [`GithubClient`].
#[derive(Clone)]
pub struct GithubConfig {
    /// API root without a trailing slash.
    pub base_url: String,
    pub token: String,
    pub user_agent: String,
}

impl std::fmt::Debug for GithubConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GithubConfig")
            .field("base_url", &self.base_url)
            .field("token", &"<redacted>")
            .field("user_agent", &self.user_agent)
            .finish()
    }
}

impl GithubConfig {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            base_url: DEFAULT_API_URL.to_string(),
            token: token.into(),
            user_agent: concat!("classfleet/", env!("CARGO_PKG_VERSION")).to_string(),
        }
    }

    #[must_use]
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }
}

/// Errors building a [`GithubClient`].
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("GitHub token is empty")]
    MissingToken,

    #[error("GitHub token contains characters not allowed in a header")]
    InvalidToken,

    #[error("failed to build HTTP client: {0}")]
    Build(#[from] reqwest::Error),
}

/// GitHub REST adapter.
#[derive(Debug, Clone)]
pub struct GithubClient {
    http: reqwest::Client,
    base_url: String,
}

impl GithubClient {
    /// # Errors
    ///
    /// Returns [`ClientError`] if the token is unusable or the HTTP client
    /// cannot be built.
    pub fn new(config: GithubConfig) -> Result<Self, ClientError> {
        if config.token.trim().is_empty() {
            return Err(ClientError::MissingToken);
        }
        let mut auth = HeaderValue::from_str(&format!("Bearer {}", config.token.trim()))
            .map_err(|_| ClientError::InvalidToken)?;
        auth.set_sensitive(true);

        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, auth);
        headers.insert(ACCEPT, HeaderValue::from_static("application/vnd.github+json"));
        headers.insert("x-github-api-version", HeaderValue::from_static(API_VERSION));

        let http = reqwest::Client::builder()
            .user_agent(config.user_agent)
            .default_headers(headers)
            .build()?;
        Ok(Self {
            http,
            base_url: config.base_url,
        })
    }

    async fn send<B: Serialize + ?Sized>(
        &self,
        method: Method,
        path: &str,
        body: Option<&B>,
    ) -> Result<Response, ApiError> {
        let url = format!("{}{}", self.base_url, path);
        tracing::trace!(%method, %url, "GitHub request");
        let mut request = self.http.request(method, url);
        if let Some(body) = body {
            request = request.json(body);
        }
        request.send().await.map_err(|e| classify_transport(&e))
    }

    async fn failure(response: Response) -> ApiError {
        let status = response.status();
        let headers = response.headers().clone();
        let body = response.text().await.unwrap_or_default();
        let error = classify_status(status, &headers, &body, Timestamp::now());
        tracing::debug!(%status, kind = %error.kind, message = %error.message, "GitHub request failed");
        error
    }

    async fn expect_success(response: Response) -> Result<Response, ApiError> {
        if response.status().is_success() {
            Ok(response)
        } else {
            Err(Self::failure(response).await)
        }
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T, ApiError> {
        let response = self.send::<()>(Method::GET, path, None).await?;
        let response = Self::expect_success(response).await?;
        response
            .json::<T>()
            .await
            .map_err(|e| ApiError::permanent(format!("unexpected response body from {path}: {e}")))
    }

    async fn pending_invitation(
        &self,
        repo: &RepositoryId,
        user: &GithubUsername,
    ) -> Result<Option<u64>, ApiError> {
        let wanted = user.lookup_key();
        let mut page = 1;
        loop {
            let invitations: Vec<models::Invitation> = self
                .get_json(&format!(
                    "/repos/{repo}/invitations?per_page={REPOSITORY_PAGE_SIZE}&page={page}"
                ))
                .await?;
            let found = invitations.iter().find(|i| {
                i.invitee
                    .as_ref()
                    .is_some_and(|u| u.login.to_lowercase() == wanted)
            });
            if let Some(invitation) = found {
                return Ok(Some(invitation.id));
            }
            if invitations.len() < REPOSITORY_PAGE_SIZE {
                return Ok(None);
            }
            page += 1;
        }
    }

    /// DELETE that treats 404 as already done.
    async fn delete_idempotent(&self, path: &str) -> Result<(), ApiError> {
        let response = self.send::<()>(Method::DELETE, path, None).await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(());
        }
        Self::expect_success(response).await.map(|_| ())
    }
}

fn to_remote(repo: models::Repository) -> Result<RemoteRepository, ApiError> {
    let owner = OrgName::new(repo.owner.login.as_str());
    let name = RepoName::new(repo.name.as_str());
    match (owner, name) {
        (Some(owner), Some(name)) => Ok(RemoteRepository {
            id: RepositoryId::new(owner, name),
            html_url: repo.html_url,
            archived: repo.archived,
            is_template: repo.is_template,
        }),
        _ => Err(ApiError::permanent(format!(
            "repository listing contained a blank name: '{}/{}'",
            repo.owner.login, repo.name
        ))),
    }
}

#[async_trait]
impl ClassroomApi for GithubClient {
    async fn list_org_repositories(
        &self,
        org: &OrgName,
        page: u32,
    ) -> Result<Vec<RemoteRepository>, ApiError> {
        let repos: Vec<models::Repository> = self
            .get_json(&format!(
                "/orgs/{org}/repos?type=all&per_page={REPOSITORY_PAGE_SIZE}&page={page}"
            ))
            .await?;
        repos.into_iter().map(to_remote).collect()
    }

    async fn default_branch_head(&self, repo: &RepositoryId) -> Result<BranchHead, ApiError> {
        let details: models::Repository = self.get_json(&format!("/repos/{repo}")).await?;
        let branch = details
            .default_branch
            .ok_or_else(|| ApiError::permanent(format!("{repo} has no default branch")))?;
        let head: models::Branch = self
            .get_json(&format!("/repos/{repo}/branches/{branch}"))
            .await?;
        Ok(BranchHead {
            branch: BranchName::new(head.name)
                .ok_or_else(|| ApiError::permanent("blank branch name"))?,
            sha: CommitSha::new(head.commit.sha)
                .ok_or_else(|| ApiError::permanent("blank commit sha"))?,
        })
    }

    async fn merge_upstream(
        &self,
        repo: &RepositoryId,
        branch: &BranchName,
    ) -> Result<MergeUpstreamOutcome, ApiError> {
        let body = models::MergeUpstreamRequest {
            branch: branch.as_str(),
        };
        let response = self
            .send(Method::POST, &format!("/repos/{repo}/merge-upstream"), Some(&body))
            .await?;
        let response = Self::expect_success(response).await?;
        let result: models::MergeUpstreamResponse = response
            .json()
            .await
            .map_err(|e| ApiError::permanent(format!("unexpected merge-upstream body: {e}")))?;
        Ok(match result.merge_type.as_deref() {
            Some("fast-forward") => MergeUpstreamOutcome::FastForward,
            Some("merge") => MergeUpstreamOutcome::Merged,
            _ => MergeUpstreamOutcome::AlreadyUpToDate,
        })
    }

    async fn list_secret_names(&self, repo: &RepositoryId) -> Result<Vec<SecretName>, ApiError> {
        let mut names = Vec::new();
        let mut page = 1;
        loop {
            let list: models::SecretList = self
                .get_json(&format!(
                    "/repos/{repo}/actions/secrets?per_page={REPOSITORY_PAGE_SIZE}&page={page}"
                ))
                .await?;
            let fetched = list.secrets.len();
            names.extend(list.secrets.into_iter().filter_map(|s| SecretName::new(s.name)));
            if fetched < REPOSITORY_PAGE_SIZE || names.len() >= list.total_count {
                return Ok(names);
            }
            page += 1;
        }
    }

    async fn put_secret(
        &self,
        repo: &RepositoryId,
        name: &SecretName,
        value: &SecretValue,
    ) -> Result<(), ApiError> {
        let key: models::PublicKey = self
            .get_json(&format!("/repos/{repo}/actions/secrets/public-key"))
            .await?;
        let encrypted = seal_secret(&key.key, value.expose())?;
        let body = models::PutSecretRequest {
            encrypted_value: &encrypted,
            key_id: &key.key_id,
        };
        let response = self
            .send(
                Method::PUT,
                &format!("/repos/{repo}/actions/secrets/{name}"),
                Some(&body),
            )
            .await?;
        Self::expect_success(response).await.map(|_| ())
    }

    async fn collaborator_status(
        &self,
        repo: &RepositoryId,
        user: &GithubUsername,
    ) -> Result<CollaboratorStatus, ApiError> {
        let response = self
            .send::<()>(Method::GET, &format!("/repos/{repo}/collaborators/{user}"), None)
            .await?;
        match response.status() {
            StatusCode::NO_CONTENT => Ok(CollaboratorStatus::Active),
            StatusCode::NOT_FOUND => Ok(match self.pending_invitation(repo, user).await? {
                Some(invitation_id) => CollaboratorStatus::PendingInvitation { invitation_id },
                None => CollaboratorStatus::Absent,
            }),
            _ => Err(Self::failure(response).await),
        }
    }

    async fn remove_collaborator(
        &self,
        repo: &RepositoryId,
        user: &GithubUsername,
    ) -> Result<(), ApiError> {
        self.delete_idempotent(&format!("/repos/{repo}/collaborators/{user}"))
            .await?;
        if let Some(id) = self.pending_invitation(repo, user).await? {
            self.delete_idempotent(&format!("/repos/{repo}/invitations/{id}"))
                .await?;
        }
        Ok(())
    }

    async fn invite_collaborator(
        &self,
        repo: &RepositoryId,
        user: &GithubUsername,
        permission: Permission,
    ) -> Result<(), ApiError> {
        let body = models::InviteRequest {
            permission: permission.as_str(),
        };
        let response = self
            .send(
                Method::PUT,
                &format!("/repos/{repo}/collaborators/{user}"),
                Some(&body),
            )
            .await?;
        Self::expect_success(response).await.map(|_| ())
    }
}
