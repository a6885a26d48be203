//! Validated run settings.
//!
//! The CLI loads the configuration file, resolves secret values, and hands the
//! result to the orchestrator as a [`RunSettings`]. Nothing in the pipeline
//! reads configuration from ambient state.

use crate::{
    AssignmentPrefix, FailurePolicy, OrgName, Permission, RepoName, RepositoryId, SecretName,
    SecretValue, StepToggles,
};

/// Default number of concurrent repository workers.
pub const DEFAULT_PARALLELISM: usize = 5;

/// Upper bound on concurrent repository workers.
pub const MAX_PARALLELISM: usize = 32;

/// Template repositories for the `sync` step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TemplateSettings {
    /// Repository the assignment is authored in.
    pub source: RepositoryId,
    /// Classroom-owned fork that student repositories are created from.
    pub classroom: RepositoryId,
}

/// One secret to distribute.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SecretSpec {
    pub name: SecretName,
    pub value: SecretValue,
    /// Replace the secret even if a secret with this name already exists.
    pub overwrite: bool,
}

/// Everything a run needs to know besides the remote API and roster store.
#[derive(Debug, Clone)]
pub struct RunSettings {
    pub organization: OrgName,
    pub assignment_prefix: AssignmentPrefix,
    pub template: Option<TemplateSettings>,
    pub secrets: Vec<SecretSpec>,
    pub parallelism: usize,
    pub cycle_permission: Permission,
    /// Repository names never treated as student repositories.
    pub exclude_repositories: Vec<RepoName>,
    pub failure_policy: FailurePolicy,
    pub toggles: StepToggles,
}

impl RunSettings {
    /// Creates settings with defaults for everything but the assignment.
    pub fn new(organization: OrgName, assignment_prefix: AssignmentPrefix) -> Self {
        Self {
            organization,
            assignment_prefix,
            template: None,
            secrets: Vec::new(),
            parallelism: DEFAULT_PARALLELISM,
            cycle_permission: Permission::default(),
            exclude_repositories: Vec::new(),
            failure_policy: FailurePolicy::default(),
            toggles: StepToggles::default(),
        }
    }

    /// Returns `true` if `name` must not be treated as a student repository.
    ///
    /// Template repositories inside the organization are always excluded.
    pub fn is_excluded(&self, name: &RepoName) -> bool {
        if self.exclude_repositories.contains(name) {
            return true;
        }
        self.template.as_ref().is_some_and(|t| {
            let in_org = |id: &RepositoryId| id.owner() == &self.organization && id.name() == name;
            in_org(&t.source) || in_org(&t.classroom)
        })
    }

    /// Parallelism clamped to `1..=MAX_PARALLELISM`.
    pub fn effective_parallelism(&self) -> usize {
        self.parallelism.clamp(1, MAX_PARALLELISM)
    }
}
