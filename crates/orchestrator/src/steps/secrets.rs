//! `secrets`: distribute Actions secrets to every student repository.
//!
//! Existing secrets are left alone unless the secret is configured with
//! `overwrite`, so re-running the step only adds what is missing.

use std::sync::Arc;

use async_trait::async_trait;
use pipeline::{ClassifiedError, RepoHandle, RepositoryId, SecretName};
use serde::Serialize;

use crate::context::RunContext;
use crate::pool::{for_each_bounded, WorkOutcome};
use crate::resilience::CallOptions;
use crate::step::{ExecutionMode, StepError, StepExecutor, StepOutput, StepReport};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SecretChange {
    pub repository: RepositoryId,
    pub secret: SecretName,
    /// The secret existed and was overwritten.
    pub replaced: bool,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct SecretsOutput {
    pub repositories: usize,
    pub secrets_configured: usize,
    /// Written (or, when previewing, to be written).
    pub changes: Vec<SecretChange>,
    pub previewed: bool,
    /// Secrets already present and not overwritten.
    pub unchanged: usize,
    pub failed_repositories: usize,
}

#[derive(Debug, Default)]
struct RepoSecrets {
    changes: Vec<SecretChange>,
    unchanged: usize,
    error: Option<ClassifiedError>,
}

pub struct SecretsStep;

#[async_trait]
impl StepExecutor for SecretsStep {
    async fn execute(&self, ctx: &RunContext, mode: ExecutionMode) -> Result<StepReport, StepError> {
        let discovery = ctx.discovery().await?;
        let mut output = SecretsOutput {
            repositories: discovery.handles.len(),
            secrets_configured: ctx.settings.secrets.len(),
            previewed: mode.is_preview(),
            ..SecretsOutput::default()
        };

        if ctx.settings.secrets.is_empty() {
            tracing::warn!("No secrets configured; nothing to distribute");
            return Ok(StepReport::ok(StepOutput::Secrets(output)));
        }

        let api = Arc::clone(&ctx.api);
        let resilience = Arc::clone(&ctx.resilience);
        let settings = Arc::clone(&ctx.settings);
        let preview = mode.is_preview();

        let results = for_each_bounded(
            discovery.handles.clone(),
            ctx.settings.effective_parallelism(),
            ctx.abort(),
            move |handle: RepoHandle| {
                let api = Arc::clone(&api);
                let resilience = Arc::clone(&resilience);
                let settings = Arc::clone(&settings);
                async move {
                    let repo = &handle.repository;
                    let api = &api;
                    let mut result = RepoSecrets::default();

                    let existing = match resilience
                        .execute(
                            "list_secret_names",
                            CallOptions::new().target(repo),
                            move || async move { api.list_secret_names(repo).await },
                        )
                        .await
                    {
                        Ok(names) => names,
                        Err(err) => {
                            result.error = Some(err);
                            return result;
                        }
                    };

                    for secret in &settings.secrets {
                        let present = existing.contains(&secret.name);
                        if present && !secret.overwrite {
                            result.unchanged += 1;
                            continue;
                        }
                        if !preview {
                            let written = resilience
                                .execute(
                                    "put_secret",
                                    CallOptions::new().target(format!("{repo}:{}", secret.name)),
                                    move || async move {
                                        api.put_secret(repo, &secret.name, &secret.value).await
                                    },
                                )
                                .await;
                            if let Err(err) = written {
                                result.error = Some(err);
                                return result;
                            }
                        }
                        result.changes.push(SecretChange {
                            repository: repo.clone(),
                            secret: secret.name.clone(),
                            replaced: present,
                        });
                    }
                    result
                }
            },
        )
        .await;

        let mut failures = Vec::new();
        for (handle, outcome) in results {
            let repo_result = match outcome {
                WorkOutcome::Completed(r) => r,
                WorkOutcome::NotDispatched => RepoSecrets {
                    error: Some(ClassifiedError::cancelled(
                        "distribute_secrets",
                        Some(handle.repository.to_string()),
                        "run aborted",
                    )),
                    ..RepoSecrets::default()
                },
                WorkOutcome::Crashed(message) => RepoSecrets {
                    error: Some(ClassifiedError::from_attempt(
                        "distribute_secrets",
                        Some(handle.repository.to_string()),
                        pipeline::ApiError::permanent(message),
                        0,
                    )),
                    ..RepoSecrets::default()
                },
            };
            output.changes.extend(repo_result.changes);
            output.unchanged += repo_result.unchanged;
            if let Some(err) = repo_result.error {
                output.failed_repositories += 1;
                failures.push(err);
            }
        }

        tracing::info!(
            repositories = output.repositories,
            changes = output.changes.len(),
            unchanged = output.unchanged,
            failed = output.failed_repositories,
            preview,
            "Secret distribution finished"
        );
        Ok(StepReport::with_failures(StepOutput::Secrets(output), failures))
    }
}
