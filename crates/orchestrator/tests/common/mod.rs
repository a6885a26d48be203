#![allow(dead_code)]

use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use orchestrator::{AbortSignal, ResilientExecutor, RetryConfig, RunContext};
use pipeline::{
    ApiError, AssignmentPrefix, BranchHead, BranchName, ClassroomApi, CollaboratorStatus,
    CommitSha, Email, GithubUsername, MergeUpstreamOutcome, OrgName, Permission,
    RemoteRepository, RepositoryId, RosterRecord, RunSettings, SecretName, SecretSpec,
    SecretValue, TemplateSettings, REPOSITORY_PAGE_SIZE,
};
use roster::InMemoryRosterStore;

pub const ORG: &str = "cs101";
pub const PREFIX: &str = "hw1";

struct ScriptedFailure {
    operation: &'static str,
    target: Option<String>,
    error: ApiError,
    /// `None` fails forever.
    remaining: Option<usize>,
}

/// In-memory stand-in for GitHub.
#[derive(Default)]
pub struct FakeClassroom {
    repos: Mutex<Vec<RemoteRepository>>,
    heads: Mutex<HashMap<RepositoryId, BranchHead>>,
    template: Mutex<Option<(RepositoryId, RepositoryId)>>,
    secrets: Mutex<HashMap<RepositoryId, BTreeSet<SecretName>>>,
    collaborators: Mutex<HashMap<(RepositoryId, String), CollaboratorStatus>>,
    invisible_invites: Mutex<HashSet<String>>,
    failures: Mutex<Vec<ScriptedFailure>>,
    calls: Mutex<Vec<String>>,
    mutations: AtomicUsize,
    next_invitation: AtomicU64,
}

pub fn repo_id(name: &str) -> RepositoryId {
    RepositoryId::parse(&format!("{ORG}/{name}")).unwrap()
}

pub fn user(login: &str) -> GithubUsername {
    GithubUsername::new(login).unwrap()
}

impl FakeClassroom {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_repos(self, names: &[&str]) -> Self {
        for name in names {
            self.add_repo(name);
        }
        self
    }

    pub fn add_repo(&self, name: &str) {
        let id = repo_id(name);
        self.repos.lock().unwrap().push(RemoteRepository {
            html_url: id.html_url(),
            id,
            archived: false,
            is_template: false,
        });
    }

    pub fn with_template(self, source: &str, classroom: &str, source_sha: &str, classroom_sha: &str) -> Self {
        let source = RepositoryId::parse(source).unwrap();
        let classroom = RepositoryId::parse(classroom).unwrap();
        let head = |sha: &str| BranchHead {
            branch: BranchName::new("main").unwrap(),
            sha: CommitSha::new(sha).unwrap(),
        };
        {
            let mut heads = self.heads.lock().unwrap();
            heads.insert(source.clone(), head(source_sha));
            heads.insert(classroom.clone(), head(classroom_sha));
        }
        *self.template.lock().unwrap() = Some((source, classroom));
        self
    }

    pub fn with_collaborator(self, repo: &str, login: &str, status: CollaboratorStatus) -> Self {
        self.collaborators
            .lock()
            .unwrap()
            .insert((repo_id(repo), login.to_lowercase()), status);
        self
    }

    pub fn with_secret(self, repo: &str, name: &str) -> Self {
        self.secrets
            .lock()
            .unwrap()
            .entry(repo_id(repo))
            .or_default()
            .insert(SecretName::new(name).unwrap());
        self
    }

    /// Invitations for `login` are accepted but never show up.
    pub fn hide_invitations_for(self, login: &str) -> Self {
        self.invisible_invites.lock().unwrap().insert(login.to_lowercase());
        self
    }

    pub fn fail(&self, operation: &'static str, target: Option<&str>, error: ApiError, times: Option<usize>) {
        self.failures.lock().unwrap().push(ScriptedFailure {
            operation,
            target: target.map(str::to_string),
            error,
            remaining: times,
        });
    }

    pub fn mutations(&self) -> usize {
        self.mutations.load(Ordering::SeqCst)
    }

    pub fn calls_to(&self, operation: &str) -> usize {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|c| c.as_str() == operation)
            .count()
    }

    pub fn secret_names(&self, repo: &str) -> Vec<String> {
        self.secrets
            .lock()
            .unwrap()
            .get(&repo_id(repo))
            .map(|s| s.iter().map(|n| n.to_string()).collect())
            .unwrap_or_default()
    }

    pub fn status_of(&self, repo: &str, login: &str) -> CollaboratorStatus {
        self.collaborators
            .lock()
            .unwrap()
            .get(&(repo_id(repo), login.to_lowercase()))
            .copied()
            .unwrap_or(CollaboratorStatus::Absent)
    }

    fn check(&self, operation: &'static str, target: &str) -> Result<(), ApiError> {
        self.calls.lock().unwrap().push(operation.to_string());
        let mut failures = self.failures.lock().unwrap();
        for failure in failures.iter_mut() {
            let applies = failure.operation == operation
                && failure.target.as_deref().map_or(true, |t| t == target)
                && failure.remaining != Some(0);
            if applies {
                if let Some(n) = failure.remaining.as_mut() {
                    *n -= 1;
                }
                return Err(failure.error.clone());
            }
        }
        Ok(())
    }

    fn mutate(&self) {
        self.mutations.fetch_add(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl ClassroomApi for FakeClassroom {
    async fn list_org_repositories(
        &self,
        org: &OrgName,
        page: u32,
    ) -> Result<Vec<RemoteRepository>, ApiError> {
        self.check("list_org_repositories", org.as_str())?;
        let repos = self.repos.lock().unwrap();
        let start = (page.saturating_sub(1) as usize) * REPOSITORY_PAGE_SIZE;
        Ok(repos
            .iter()
            .skip(start)
            .take(REPOSITORY_PAGE_SIZE)
            .cloned()
            .collect())
    }

    async fn default_branch_head(&self, repo: &RepositoryId) -> Result<BranchHead, ApiError> {
        self.check("default_branch_head", &repo.to_string())?;
        self.heads
            .lock()
            .unwrap()
            .get(repo)
            .cloned()
            .ok_or_else(|| ApiError::not_found(format!("{repo} not found")))
    }

    async fn merge_upstream(
        &self,
        repo: &RepositoryId,
        _branch: &BranchName,
    ) -> Result<MergeUpstreamOutcome, ApiError> {
        self.check("merge_upstream", &repo.to_string())?;
        self.mutate();
        let template = self.template.lock().unwrap().clone();
        let Some((source, classroom)) = template.filter(|(_, c)| c == repo) else {
            return Err(ApiError::validation("not a fork"));
        };
        let mut heads = self.heads.lock().unwrap();
        let upstream = heads.get(&source).cloned();
        match (upstream, heads.get_mut(&classroom)) {
            (Some(up), Some(head)) if up.sha == head.sha => Ok(MergeUpstreamOutcome::AlreadyUpToDate),
            (Some(up), Some(head)) => {
                head.sha = up.sha;
                Ok(MergeUpstreamOutcome::FastForward)
            }
            _ => Err(ApiError::not_found("branch not found")),
        }
    }

    async fn list_secret_names(&self, repo: &RepositoryId) -> Result<Vec<SecretName>, ApiError> {
        self.check("list_secret_names", &repo.to_string())?;
        Ok(self
            .secrets
            .lock()
            .unwrap()
            .get(repo)
            .map(|s| s.iter().cloned().collect())
            .unwrap_or_default())
    }

    async fn put_secret(
        &self,
        repo: &RepositoryId,
        name: &SecretName,
        _value: &SecretValue,
    ) -> Result<(), ApiError> {
        self.check("put_secret", &repo.to_string())?;
        self.mutate();
        self.secrets
            .lock()
            .unwrap()
            .entry(repo.clone())
            .or_default()
            .insert(name.clone());
        Ok(())
    }

    async fn collaborator_status(
        &self,
        repo: &RepositoryId,
        user: &GithubUsername,
    ) -> Result<CollaboratorStatus, ApiError> {
        self.check("collaborator_status", &repo.to_string())?;
        Ok(self
            .collaborators
            .lock()
            .unwrap()
            .get(&(repo.clone(), user.lookup_key()))
            .copied()
            .unwrap_or(CollaboratorStatus::Absent))
    }

    async fn remove_collaborator(
        &self,
        repo: &RepositoryId,
        user: &GithubUsername,
    ) -> Result<(), ApiError> {
        self.check("remove_collaborator", &repo.to_string())?;
        self.mutate();
        self.collaborators
            .lock()
            .unwrap()
            .remove(&(repo.clone(), user.lookup_key()));
        Ok(())
    }

    async fn invite_collaborator(
        &self,
        repo: &RepositoryId,
        user: &GithubUsername,
        _permission: Permission,
    ) -> Result<(), ApiError> {
        self.check("invite_collaborator", &repo.to_string())?;
        self.mutate();
        if self.invisible_invites.lock().unwrap().contains(&user.lookup_key()) {
            return Ok(());
        }
        let invitation_id = self.next_invitation.fetch_add(1, Ordering::SeqCst) + 1;
        self.collaborators
            .lock()
            .unwrap()
            .entry((repo.clone(), user.lookup_key()))
            .or_insert(CollaboratorStatus::PendingInvitation { invitation_id });
        Ok(())
    }
}

// ---------------------------------------------------------------------------

pub fn student(email: &str, login: &str) -> RosterRecord {
    RosterRecord::new(Email::new(email).unwrap(), email, OrgName::new(ORG).unwrap())
        .with_username(user(login))
}

pub fn settings() -> RunSettings {
    let mut settings = RunSettings::new(
        OrgName::new(ORG).unwrap(),
        AssignmentPrefix::new(PREFIX).unwrap(),
    );
    settings.template = Some(TemplateSettings {
        source: RepositoryId::parse("prof/hw1-template").unwrap(),
        classroom: repo_id("hw1-starter"),
    });
    settings.secrets = vec![SecretSpec {
        name: SecretName::new("GRADER_TOKEN").unwrap(),
        value: SecretValue::new("s3cret"),
        overwrite: false,
    }];
    settings
}

/// Three student repositories (alice, bob, carol) plus the template copy.
pub fn classroom() -> FakeClassroom {
    FakeClassroom::new()
        .with_repos(&["hw1-alice", "hw1-bob", "hw1-carol", "hw1-starter", "syllabus"])
        .with_template("prof/hw1-template", "cs101/hw1-starter", "aaa111", "bbb222")
}

pub fn roster() -> Arc<InMemoryRosterStore> {
    Arc::new(InMemoryRosterStore::with_records([
        student("alice@uni.edu", "Alice"),
        student("bob@uni.edu", "bob"),
        student("dave@uni.edu", "dave"),
    ]))
}

pub fn context(
    api: Arc<FakeClassroom>,
    store: Arc<InMemoryRosterStore>,
    settings: RunSettings,
) -> RunContext {
    let resilience = Arc::new(ResilientExecutor::new(RetryConfig::default(), AbortSignal::new()));
    RunContext::new(settings, api, store, resilience)
}
