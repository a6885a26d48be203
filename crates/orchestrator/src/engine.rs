//! Workflow Orchestrator.
//!
//! Runs the selected steps strictly in pipeline order and folds their
//! results into a [`RunReport`].
//!
//! ## Run rules
//!
//! - A mutating step runs in [`ExecutionMode::Preview`] during a dry run.
//! - Under [`FailurePolicy::StopOnFailure`] the first failed step aborts the
//!   run and every later step is recorded as `Skipped`.
//! - A raised abort signal (authentication failure, Ctrl-C) skips every step
//!   not yet started, whatever the policy.

use std::collections::HashSet;
use std::time::Instant;

use pipeline::{
    ClassifiedError, FailurePolicy, MatchNote, PipelineError, RunId, RunStatus, StepFilter,
    StepName, StepStatus, Timestamp, UnlinkedStudent, UnmatchedRepo,
};
use serde::Serialize;
use tracing::Instrument;

use crate::abort::AbortReason;
use crate::context::RunContext;
use crate::resilience::RecoveredCall;
use crate::step::{ExecutionMode, Step, StepOutput};

/// Outcome of one step.
#[derive(Debug, Clone, Serialize)]
pub struct StepResult {
    pub step: StepName,
    pub ordinal: usize,
    pub status: StepStatus,
    pub output: Option<StepOutput>,
    /// Per-item failures, and the step's own failure if it had no output.
    pub failures: Vec<ClassifiedError>,
    /// Error that stopped the step, or why it was skipped.
    pub error: Option<String>,
    /// Remote call attempts made while the step ran.
    pub attempts: u64,
    pub recovered: Vec<RecoveredCall>,
    pub duration_ms: u64,
}

impl StepResult {
    fn skipped(step: &Step, reason: impl Into<String>) -> Self {
        Self {
            step: step.name,
            ordinal: step.ordinal,
            status: StepStatus::Skipped,
            output: None,
            failures: Vec::new(),
            error: Some(reason.into()),
            attempts: 0,
            recovered: Vec::new(),
            duration_ms: 0,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StepCounts {
    pub selected: usize,
    /// Executed, whatever their outcome.
    pub run: usize,
    pub succeeded: usize,
    pub previewed: usize,
    pub failed: usize,
    pub skipped: usize,
}

/// Roster figures surfaced at the top of the report.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RosterSummary {
    pub matched: usize,
    pub unmatched_repositories: Vec<UnmatchedRepo>,
    pub unlinked_students: Vec<UnlinkedStudent>,
    pub notes: Vec<MatchNote>,
    pub links_written: usize,
    pub links_pending: usize,
    pub acceptance_rate: f64,
}

/// Everything a run did.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub run_id: RunId,
    pub status: RunStatus,
    pub abort_reason: Option<AbortReason>,
    /// Set when `StopOnFailure` stopped the run.
    pub stopped_at: Option<StepName>,
    pub dry_run: bool,
    pub failure_policy: FailurePolicy,
    pub excluded_steps: Vec<StepName>,
    pub counts: StepCounts,
    pub steps: Vec<StepResult>,
    pub roster: Option<RosterSummary>,
    /// Calls that failed transiently and then succeeded.
    pub transient_recovered: Vec<RecoveredCall>,
    /// Failures the operator should look at.
    pub failures_requiring_action: Vec<ClassifiedError>,
    pub started_at: Timestamp,
    pub duration_ms: u64,
}

impl RunReport {
    pub fn step(&self, name: StepName) -> Option<&StepResult> {
        self.steps.iter().find(|s| s.step == name)
    }

    /// `true` if the run stopped because a rate limit outlasted the retry
    /// budget.
    pub fn rate_limit_exhausted(&self) -> bool {
        self.failures_requiring_action
            .iter()
            .any(ClassifiedError::is_rate_limit_exhaustion)
    }
}

// ---------------------------------------------------------------------------

/// An ordered plan of steps with its run-level policy.
#[derive(Debug, Clone)]
pub struct WorkflowRun {
    steps: Vec<Step>,
    excluded: Vec<StepName>,
    policy: FailurePolicy,
}

impl WorkflowRun {
    /// Builds a run from explicit steps, sorted into pipeline order.
    ///
    /// # Errors
    ///
    /// [`PipelineError::ConfigurationError`] if a step name appears twice.
    pub fn new(mut steps: Vec<Step>, policy: FailurePolicy) -> Result<Self, PipelineError> {
        let mut seen = HashSet::new();
        for step in &steps {
            if !seen.insert(step.name) {
                return Err(PipelineError::ConfigurationError {
                    message: format!("step '{}' is listed more than once", step.name),
                });
            }
        }
        steps.sort_by_key(|s| s.ordinal);
        let excluded = StepName::ALL
            .into_iter()
            .filter(|name| !seen.contains(name))
            .collect();
        Ok(Self {
            steps,
            excluded,
            policy,
        })
    }

    /// Selects the built-in steps chosen by `filter` and the configuration
    /// toggles.
    pub fn plan(ctx: &RunContext, filter: &StepFilter) -> Self {
        let (selected, excluded) = filter.select(&ctx.settings.toggles);
        Self {
            steps: selected.into_iter().map(Step::standard).collect(),
            excluded,
            policy: ctx.settings.failure_policy,
        }
    }

    pub fn steps(&self) -> &[Step] {
        &self.steps
    }

    /// Runs every step and returns the report. Never fails as a whole; each
    /// failure is recorded in its step result.
    pub async fn execute(self, ctx: &RunContext) -> RunReport {
        let started_at = Timestamp::now();
        let clock = Instant::now();
        let run_span = tracing::info_span!(
            "run",
            run_id = %ctx.run_id,
            organization = %ctx.settings.organization,
            assignment = %ctx.settings.assignment_prefix,
            dry_run = ctx.dry_run,
        );

        let steps = self.steps;
        let policy = self.policy;
        let results = async {
            tracing::info!(
                steps = ?steps.iter().map(|s| s.name.as_str()).collect::<Vec<_>>(),
                excluded = ?self.excluded.iter().map(|s| s.as_str()).collect::<Vec<_>>(),
                ?policy,
                "Starting run"
            );

            let mut results = Vec::with_capacity(steps.len());
            let mut stop_reason: Option<String> = None;
            let mut stopped_at = None;

            for step in &steps {
                if stop_reason.is_none() && ctx.abort().is_raised() {
                    let reason = ctx
                        .abort()
                        .reason()
                        .map_or_else(|| "run aborted".to_string(), |r| r.to_string());
                    stop_reason = Some(format!("not run: {reason}"));
                }
                if let Some(reason) = &stop_reason {
                    tracing::info!(step = %step.name, "Skipping step");
                    results.push(StepResult::skipped(step, reason.clone()));
                    continue;
                }

                let result = run_step(step, ctx).await;
                let failed = result.status == StepStatus::Failed;
                results.push(result);

                if failed && policy == FailurePolicy::StopOnFailure {
                    tracing::warn!(step = %step.name, "Step failed; stopping run");
                    stop_reason = Some(format!("not run: step '{}' failed", step.name));
                    stopped_at = Some(step.name);
                }
            }
            (results, stopped_at)
        }
        .instrument(run_span.clone())
        .await;
        let (results, stopped_at) = results;

        let report = build_report(
            ctx,
            results,
            stopped_at,
            self.excluded,
            policy,
            started_at,
            clock.elapsed().as_millis() as u64,
        );
        run_span.in_scope(|| {
            tracing::info!(
                status = ?report.status,
                run = report.counts.run,
                failed = report.counts.failed,
                skipped = report.counts.skipped,
                duration_ms = report.duration_ms,
                "Run finished"
            );
        });
        report
    }
}

/// Plans and executes a run.
pub async fn orchestrate(ctx: &RunContext, filter: &StepFilter) -> RunReport {
    WorkflowRun::plan(ctx, filter).execute(ctx).await
}

async fn run_step(step: &Step, ctx: &RunContext) -> StepResult {
    let mode = if ctx.dry_run && step.mutating {
        ExecutionMode::Preview
    } else {
        ExecutionMode::Live
    };
    let span = tracing::info_span!("step", step = %step.name, ordinal = step.ordinal, ?mode);
    let mark = ctx.resilience.ledger().mark();
    let clock = Instant::now();

    let outcome = step.executor().execute(ctx, mode).instrument(span.clone()).await;

    let (attempts, recovered) = ctx.resilience.ledger().since(mark);
    let duration_ms = clock.elapsed().as_millis() as u64;
    let mut result = StepResult {
        step: step.name,
        ordinal: step.ordinal,
        status: StepStatus::Success,
        output: None,
        failures: Vec::new(),
        error: None,
        attempts,
        recovered,
        duration_ms,
    };

    match outcome {
        Ok(report) => {
            result.status = if !report.failures.is_empty() {
                StepStatus::Failed
            } else if mode == ExecutionMode::Preview {
                StepStatus::DryRunPreview
            } else {
                StepStatus::Success
            };
            if !report.failures.is_empty() {
                result.error = Some(format!("{} item(s) failed", report.failures.len()));
            }
            result.output = Some(report.output);
            result.failures = report.failures;
        }
        Err(err) => {
            result.status = StepStatus::Failed;
            result.error = Some(err.to_string());
            if let Some(classified) = err.classified() {
                result.failures.push(classified.clone());
            }
        }
    }

    span.in_scope(|| match result.status {
        StepStatus::Failed => tracing::warn!(
            error = result.error.as_deref().unwrap_or(""),
            failures = result.failures.len(),
            attempts,
            duration_ms,
            "Step failed"
        ),
        status => tracing::info!(?status, attempts = result.attempts, duration_ms, "Step finished"),
    });
    result
}

fn build_report(
    ctx: &RunContext,
    steps: Vec<StepResult>,
    stopped_at: Option<StepName>,
    excluded_steps: Vec<StepName>,
    failure_policy: FailurePolicy,
    started_at: Timestamp,
    duration_ms: u64,
) -> RunReport {
    let mut counts = StepCounts {
        selected: steps.len(),
        ..StepCounts::default()
    };
    for step in &steps {
        match step.status {
            StepStatus::Success => counts.succeeded += 1,
            StepStatus::DryRunPreview => counts.previewed += 1,
            StepStatus::Failed => counts.failed += 1,
            StepStatus::Skipped => counts.skipped += 1,
        }
    }
    counts.run = counts.selected - counts.skipped;

    let abort_reason = ctx.abort().reason();
    let status = if abort_reason.is_some() || stopped_at.is_some() {
        RunStatus::Aborted
    } else if counts.failed > 0 {
        RunStatus::CompletedWithWarnings
    } else {
        RunStatus::Completed
    };

    let roster = steps.iter().find_map(|s| match &s.output {
        Some(StepOutput::Roster(out)) => Some(RosterSummary {
            matched: out.outcome.result.matched.len(),
            unmatched_repositories: out.outcome.result.unmatched.clone(),
            unlinked_students: out.outcome.result.unlinked_students.clone(),
            notes: out.outcome.result.notes.clone(),
            links_written: out.outcome.links_written,
            links_pending: out.outcome.links_pending,
            acceptance_rate: out.acceptance_rate,
        }),
        _ => None,
    });

    let transient_recovered = steps.iter().flat_map(|s| s.recovered.clone()).collect();
    let failures_requiring_action = steps.iter().flat_map(|s| s.failures.clone()).collect();

    RunReport {
        run_id: ctx.run_id,
        status,
        abort_reason,
        stopped_at,
        dry_run: ctx.dry_run,
        failure_policy,
        excluded_steps,
        counts,
        steps,
        roster,
        transient_recovered,
        failures_requiring_action,
        started_at,
        duration_ms,
    }
}
