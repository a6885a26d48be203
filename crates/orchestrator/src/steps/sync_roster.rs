//! `sync-roster`: link discovered repositories to roster records.

use async_trait::async_trait;
use serde::Serialize;

use crate::context::RunContext;
use crate::roster_sync::{RosterSyncOutcome, RosterSynchronizer};
use crate::step::{ExecutionMode, StepError, StepExecutor, StepOutput, StepReport};

#[derive(Debug, Clone, Serialize)]
pub struct RosterSyncOutput {
    #[serde(flatten)]
    pub outcome: RosterSyncOutcome,
    pub acceptance_rate: f64,
}

pub struct SyncRosterStep;

#[async_trait]
impl StepExecutor for SyncRosterStep {
    async fn execute(&self, ctx: &RunContext, mode: ExecutionMode) -> Result<StepReport, StepError> {
        let discovery = ctx.discovery().await?;
        let synchronizer = RosterSynchronizer::new(
            ctx.roster.clone(),
            ctx.settings.effective_parallelism(),
            ctx.abort().clone(),
        );

        let outcome = synchronizer
            .sync(&ctx.settings.organization, &discovery.handles, mode.is_preview())
            .await?;
        let failures = outcome.link_failures.clone();
        let acceptance_rate = outcome.result.acceptance_rate();

        Ok(StepReport::with_failures(
            StepOutput::Roster(RosterSyncOutput {
                outcome,
                acceptance_rate,
            }),
            failures,
        ))
    }
}
