//! `assist`: report students whose repository access needs attention.
//!
//! Read-only. The `cycle` step is the one that repairs access.

use std::sync::Arc;

use async_trait::async_trait;
use pipeline::{ClassifiedError, CollaboratorStatus, GithubUsername, RepoHandle, RepositoryId};
use serde::Serialize;

use crate::context::RunContext;
use crate::pool::{for_each_bounded, WorkOutcome};
use crate::resilience::CallOptions;
use crate::step::{ExecutionMode, StepError, StepExecutor, StepOutput, StepReport};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AccessProblem {
    pub repository: RepositoryId,
    pub username: GithubUsername,
    pub status: CollaboratorStatus,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct AssistOutput {
    pub checked: usize,
    pub healthy: usize,
    /// Invited but not yet accepted, or no access at all.
    pub needs_attention: Vec<AccessProblem>,
    /// Repositories whose name yields no student login.
    pub unparsable: Vec<RepositoryId>,
}

pub struct AssistStep;

#[async_trait]
impl StepExecutor for AssistStep {
    async fn execute(&self, ctx: &RunContext, _mode: ExecutionMode) -> Result<StepReport, StepError> {
        let discovery = ctx.discovery().await?;
        let mut output = AssistOutput {
            unparsable: discovery
                .handles
                .iter()
                .filter(|h| !h.parsable)
                .map(|h| h.repository.clone())
                .collect(),
            ..AssistOutput::default()
        };

        let pairs: Vec<(RepoHandle, GithubUsername)> = discovery
            .parsable()
            .filter_map(|h| GithubUsername::new(h.student_token.as_str()).map(|u| (h.clone(), u)))
            .collect();

        let api = Arc::clone(&ctx.api);
        let resilience = Arc::clone(&ctx.resilience);
        let results = for_each_bounded(
            pairs,
            ctx.settings.effective_parallelism(),
            ctx.abort(),
            move |(handle, username): (RepoHandle, GithubUsername)| {
                let api = Arc::clone(&api);
                let resilience = Arc::clone(&resilience);
                async move {
                    let api = &api;
                    let repo = &handle.repository;
                    let user = &username;
                    resilience
                        .execute(
                            "collaborator_status",
                            CallOptions::new().target(format!("{repo}@{user}")),
                            move || async move { api.collaborator_status(repo, user).await },
                        )
                        .await
                }
            },
        )
        .await;

        let mut failures: Vec<ClassifiedError> = Vec::new();
        for ((handle, username), outcome) in results {
            let target = Some(format!("{}@{}", handle.repository, username));
            match outcome {
                WorkOutcome::Completed(Ok(status)) => {
                    output.checked += 1;
                    if status.has_access() {
                        output.healthy += 1;
                    } else {
                        output.needs_attention.push(AccessProblem {
                            repository: handle.repository,
                            username,
                            status,
                        });
                    }
                }
                WorkOutcome::Completed(Err(err)) => failures.push(err),
                WorkOutcome::NotDispatched => failures.push(ClassifiedError::cancelled(
                    "collaborator_status",
                    target,
                    "run aborted",
                )),
                WorkOutcome::Crashed(message) => failures.push(ClassifiedError::from_attempt(
                    "collaborator_status",
                    target,
                    pipeline::ApiError::permanent(message),
                    0,
                )),
            }
        }

        tracing::info!(
            checked = output.checked,
            healthy = output.healthy,
            needs_attention = output.needs_attention.len(),
            unparsable = output.unparsable.len(),
            "Access check finished"
        );
        Ok(StepReport::with_failures(StepOutput::Assist(output), failures))
    }
}
