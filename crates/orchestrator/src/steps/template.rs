//! `sync`: bring the classroom copy of the template up to date with its
//! source repository.

use async_trait::async_trait;
use pipeline::{BranchHead, MergeUpstreamOutcome, RepositoryId};
use serde::Serialize;

use crate::context::RunContext;
use crate::resilience::CallOptions;
use crate::step::{ExecutionMode, StepError, StepExecutor, StepOutput, StepReport};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum TemplateAction {
    AlreadyInSync,
    WouldSync,
    Synced { outcome: MergeUpstreamOutcome },
}

#[derive(Debug, Clone, Serialize)]
pub struct TemplateSyncOutput {
    pub source: RepositoryId,
    pub classroom: RepositoryId,
    pub source_head: BranchHead,
    pub classroom_head: BranchHead,
    pub action: TemplateAction,
}

pub struct TemplateSyncStep;

async fn head(ctx: &RunContext, repo: &RepositoryId) -> Result<BranchHead, StepError> {
    let api = &ctx.api;
    let head = ctx
        .resilience
        .execute(
            "default_branch_head",
            CallOptions::new().target(repo),
            move || async move { api.default_branch_head(repo).await },
        )
        .await?;
    Ok(head)
}

#[async_trait]
impl StepExecutor for TemplateSyncStep {
    async fn execute(&self, ctx: &RunContext, mode: ExecutionMode) -> Result<StepReport, StepError> {
        let template = ctx.settings.template.as_ref().ok_or_else(|| {
            StepError::Precondition("no [template] section is configured".to_string())
        })?;

        let source_head = head(ctx, &template.source).await?;
        let classroom_head = head(ctx, &template.classroom).await?;

        let action = if source_head.sha == classroom_head.sha {
            TemplateAction::AlreadyInSync
        } else if mode.is_preview() {
            TemplateAction::WouldSync
        } else {
            let api = &ctx.api;
            let classroom = &template.classroom;
            let branch = &classroom_head.branch;
            let outcome = ctx
                .resilience
                .execute(
                    "merge_upstream",
                    CallOptions::new().target(classroom),
                    move || async move { api.merge_upstream(classroom, branch).await },
                )
                .await?;
            TemplateAction::Synced { outcome }
        };

        tracing::info!(
            source = %template.source,
            classroom = %template.classroom,
            source_sha = %source_head.sha,
            classroom_sha = %classroom_head.sha,
            ?action,
            "Template sync evaluated"
        );

        Ok(StepReport::ok(StepOutput::Template(TemplateSyncOutput {
            source: template.source.clone(),
            classroom: template.classroom.clone(),
            source_head,
            classroom_head,
            action,
        })))
    }
}
