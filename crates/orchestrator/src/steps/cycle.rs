//! `cycle`: remove and re-invite students to restore repository access.

use std::sync::Arc;

use async_trait::async_trait;
use pipeline::{ApiError, ClassifiedError, GithubUsername, RepoHandle};
use serde::Serialize;

use crate::context::RunContext;
use crate::cycler::{CollaboratorCycler, CycleAction, CycleMode, CycleReport};
use crate::pool::{for_each_bounded, WorkOutcome};
use crate::step::{ExecutionMode, StepError, StepExecutor, StepOutput, StepReport};

#[derive(Debug, Clone, Serialize)]
pub struct CycleOutput {
    pub mode: CycleMode,
    pub pairs: usize,
    pub already_healthy: usize,
    pub cycled: usize,
    pub would_cycle: usize,
    pub failed: usize,
    pub reports: Vec<CycleReport>,
}

pub struct CycleStep;

#[async_trait]
impl StepExecutor for CycleStep {
    async fn execute(&self, ctx: &RunContext, mode: ExecutionMode) -> Result<StepReport, StepError> {
        let discovery = ctx.discovery().await?;
        let cycle_mode = if ctx.force_cycle {
            CycleMode::Force
        } else {
            CycleMode::Repair
        };
        let preview = mode.is_preview();

        let pairs: Vec<(RepoHandle, GithubUsername)> = discovery
            .parsable()
            .filter_map(|h| GithubUsername::new(h.student_token.as_str()).map(|u| (h.clone(), u)))
            .collect();

        let cycler = Arc::new(CollaboratorCycler::new(
            Arc::clone(&ctx.api),
            Arc::clone(&ctx.resilience),
            ctx.settings.cycle_permission,
        ));
        let results = for_each_bounded(
            pairs,
            ctx.settings.effective_parallelism(),
            ctx.abort(),
            move |(handle, username): (RepoHandle, GithubUsername)| {
                let cycler = Arc::clone(&cycler);
                async move {
                    cycler
                        .cycle(&handle.repository, &username, cycle_mode, preview)
                        .await
                }
            },
        )
        .await;

        let mut output = CycleOutput {
            mode: cycle_mode,
            pairs: results.len(),
            already_healthy: 0,
            cycled: 0,
            would_cycle: 0,
            failed: 0,
            reports: Vec::with_capacity(results.len()),
        };
        let mut failures: Vec<ClassifiedError> = Vec::new();

        for ((handle, username), outcome) in results {
            let target = Some(format!("{}@{}", handle.repository, username));
            let report = match outcome {
                WorkOutcome::Completed(report) => report,
                WorkOutcome::NotDispatched => {
                    output.failed += 1;
                    failures.push(ClassifiedError::cancelled("cycle", target, "run aborted"));
                    continue;
                }
                WorkOutcome::Crashed(message) => {
                    output.failed += 1;
                    failures.push(ClassifiedError::from_attempt(
                        "cycle",
                        target,
                        ApiError::permanent(message),
                        0,
                    ));
                    continue;
                }
            };
            match report.action {
                CycleAction::AlreadyHealthy => output.already_healthy += 1,
                CycleAction::Cycled => output.cycled += 1,
                CycleAction::WouldCycle => output.would_cycle += 1,
                CycleAction::Failed => output.failed += 1,
            }
            if let Some(err) = &report.error {
                failures.push(err.clone());
            }
            output.reports.push(report);
        }

        tracing::info!(
            mode = ?cycle_mode,
            pairs = output.pairs,
            cycled = output.cycled,
            would_cycle = output.would_cycle,
            healthy = output.already_healthy,
            failed = output.failed,
            "Collaborator cycle finished"
        );
        Ok(StepReport::with_failures(StepOutput::Cycle(output), failures))
    }
}
