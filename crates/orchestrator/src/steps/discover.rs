//! `discover`: list the organization and resolve the assignment's student
//! repositories.

use async_trait::async_trait;
use pipeline::{ClassifiedError, RepoHandle, REPOSITORY_PAGE_SIZE};
use serde::Serialize;

use crate::context::RunContext;
use crate::resilience::CallOptions;
use crate::step::{ExecutionMode, StepError, StepExecutor, StepOutput, StepReport};

#[derive(Debug, Clone, Default, Serialize)]
pub struct DiscoveryOutput {
    /// Student repositories, sorted by `owner/name`.
    pub handles: Vec<RepoHandle>,
    /// Organization repositories listed.
    pub scanned: usize,
    /// Assignment repositories left out by the exclude list.
    pub excluded: usize,
    /// Archived assignment repositories left out.
    pub archived: usize,
    pub pages: u32,
}

impl DiscoveryOutput {
    pub fn parsable(&self) -> impl Iterator<Item = &RepoHandle> {
        self.handles.iter().filter(|h| h.parsable)
    }

    pub fn unparsable_count(&self) -> usize {
        self.handles.iter().filter(|h| !h.parsable).count()
    }
}

pub(crate) async fn discover_repositories(
    ctx: &RunContext,
) -> Result<DiscoveryOutput, ClassifiedError> {
    let org = &ctx.settings.organization;
    let resolver = ctx.resolver();
    let api = &ctx.api;
    let mut output = DiscoveryOutput::default();

    let mut page: u32 = 1;
    loop {
        let repos = ctx
            .resilience
            .execute(
                "list_org_repositories",
                CallOptions::new().target(format!("{org} page {page}")),
                move || async move { api.list_org_repositories(org, page).await },
            )
            .await?;
        output.pages = page;
        output.scanned += repos.len();
        let last_page = repos.len() < REPOSITORY_PAGE_SIZE;

        for repo in repos {
            let name = repo.id.name();
            if !resolver.belongs_to_assignment(name.as_str()) {
                continue;
            }
            if ctx.settings.is_excluded(name) {
                output.excluded += 1;
                continue;
            }
            if repo.archived {
                output.archived += 1;
                continue;
            }
            output.handles.push(resolver.resolve_record(&repo));
        }

        if last_page {
            break;
        }
        page += 1;
    }

    output.handles.sort_by(|a, b| a.repository.cmp(&b.repository));
    tracing::info!(
        organization = %org,
        prefix = %ctx.settings.assignment_prefix,
        scanned = output.scanned,
        found = output.handles.len(),
        unparsable = output.unparsable_count(),
        excluded = output.excluded,
        archived = output.archived,
        "Discovered student repositories"
    );
    Ok(output)
}

pub struct DiscoverStep;

#[async_trait]
impl StepExecutor for DiscoverStep {
    async fn execute(
        &self,
        ctx: &RunContext,
        _mode: ExecutionMode,
    ) -> Result<StepReport, StepError> {
        let discovery = ctx.discovery().await?;
        Ok(StepReport::ok(StepOutput::Discovery((*discovery).clone())))
    }
}
