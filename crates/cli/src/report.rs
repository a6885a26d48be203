//! Run report rendering and exit codes.

use std::fmt::Write as _;

use orchestrator::steps::template::TemplateAction;
use orchestrator::{AbortReason, RunReport, StepOutput, StepResult};
use pipeline::{RunStatus, StepStatus};

use crate::args::ReportFormat;

pub const EXIT_OK: u8 = 0;
pub const EXIT_FAILURE: u8 = 1;
pub const EXIT_USAGE: u8 = 2;
pub const EXIT_AUTH: u8 = 3;
pub const EXIT_RATE_LIMIT: u8 = 4;
pub const EXIT_INTERRUPTED: u8 = 130;

/// Maps a finished run to the process exit code.
///
/// Warnings from a run that kept going exit `0`; only an abort is an error.
pub fn exit_code(report: &RunReport) -> u8 {
    match &report.abort_reason {
        Some(AbortReason::Interrupted) => return EXIT_INTERRUPTED,
        Some(AbortReason::AuthFailure { .. }) => return EXIT_AUTH,
        None => {}
    }
    if report.stopped_at.is_none() {
        return EXIT_OK;
    }
    if report.rate_limit_exhausted() {
        EXIT_RATE_LIMIT
    } else {
        EXIT_FAILURE
    }
}

/// Renders `report` for stdout.
///
/// # Errors
///
/// Only JSON serialization can fail.
pub fn render(report: &RunReport, format: ReportFormat) -> anyhow::Result<String> {
    match format {
        ReportFormat::Json => Ok(serde_json::to_string_pretty(report)?),
        ReportFormat::Text => Ok(render_text(report)),
    }
}

fn status_label(status: RunStatus) -> &'static str {
    match status {
        RunStatus::Completed => "completed",
        RunStatus::CompletedWithWarnings => "completed with warnings",
        RunStatus::Aborted => "aborted",
    }
}

fn step_label(status: StepStatus) -> &'static str {
    match status {
        StepStatus::Success => "ok",
        StepStatus::Skipped => "skipped",
        StepStatus::Failed => "FAILED",
        StepStatus::DryRunPreview => "preview",
    }
}

fn render_text(report: &RunReport) -> String {
    let mut out = String::new();
    let _ = writeln!(
        out,
        "Run {} {}{} in {} ms",
        report.run_id,
        status_label(report.status),
        if report.dry_run { " (dry run)" } else { "" },
        report.duration_ms
    );
    if let Some(reason) = &report.abort_reason {
        let _ = writeln!(out, "Aborted: {reason}");
    }
    if let Some(step) = report.stopped_at {
        let _ = writeln!(out, "Stopped after step '{step}' failed");
    }

    out.push('\n');
    for step in &report.steps {
        let _ = writeln!(
            out,
            "  {:<12} {:<8} {:>6} ms  {} call(s)",
            step.step.as_str(),
            step_label(step.status),
            step.duration_ms,
            step.attempts
        );
        if let Some(summary) = summarize(step) {
            let _ = writeln!(out, "               {summary}");
        }
        if let Some(error) = &step.error {
            let _ = writeln!(out, "               {error}");
        }
    }
    if !report.excluded_steps.is_empty() {
        let names: Vec<_> = report.excluded_steps.iter().map(|s| s.as_str()).collect();
        let _ = writeln!(out, "  not selected: {}", names.join(", "));
    }

    if let Some(roster) = &report.roster {
        let _ = writeln!(
            out,
            "\nRoster: {} matched, {} unmatched repositories, {} students without a repository ({:.1}% accepted)",
            roster.matched,
            roster.unmatched_repositories.len(),
            roster.unlinked_students.len(),
            roster.acceptance_rate
        );
        for repo in &roster.unmatched_repositories {
            let _ = writeln!(out, "  unmatched {} ({:?})", repo.repository, repo.reason);
        }
        for student in &roster.unlinked_students {
            let _ = writeln!(out, "  no repository for {} <{}>", student.name, student.email);
        }
    }

    if !report.transient_recovered.is_empty() {
        let _ = writeln!(
            out,
            "\n{} call(s) recovered after transient failures",
            report.transient_recovered.len()
        );
    }

    if !report.failures_requiring_action.is_empty() {
        let _ = writeln!(out, "\nNeeds attention:");
        for failure in &report.failures_requiring_action {
            match &failure.target {
                Some(target) => {
                    let _ = writeln!(out, "  {target}: {failure}");
                }
                None => {
                    let _ = writeln!(out, "  {failure}");
                }
            }
        }
    }
    out
}

fn summarize(step: &StepResult) -> Option<String> {
    let summary = match step.output.as_ref()? {
        StepOutput::Template(t) => match &t.action {
            TemplateAction::AlreadyInSync => format!("{} already matches {}", t.classroom, t.source),
            TemplateAction::WouldSync => format!(
                "{} would be updated from {} ({} -> {})",
                t.classroom, t.source, t.classroom_head.sha, t.source_head.sha
            ),
            TemplateAction::Synced { outcome } => {
                format!("{} updated from {} ({outcome:?})", t.classroom, t.source)
            }
        },
        StepOutput::Discovery(d) => format!(
            "{} student repositories ({} scanned, {} excluded, {} archived, {} unparsable)",
            d.handles.len(),
            d.scanned,
            d.excluded,
            d.archived,
            d.unparsable_count()
        ),
        StepOutput::Roster(r) => format!(
            "{} matched, {} link(s) written, {} pending",
            r.outcome.result.matched.len(),
            r.outcome.links_written,
            r.outcome.links_pending
        ),
        StepOutput::Secrets(s) => format!(
            "{} change(s){} across {} repositories, {} unchanged, {} failed",
            s.changes.len(),
            if s.previewed { " previewed" } else { "" },
            s.repositories,
            s.unchanged,
            s.failed_repositories
        ),
        StepOutput::Assist(a) => {
            let mut line = format!(
                "{} checked, {} healthy, {} need attention",
                a.checked,
                a.healthy,
                a.needs_attention.len()
            );
            for problem in &a.needs_attention {
                let _ = write!(line, "\n                 {} in {}", problem.username, problem.repository);
            }
            line
        }
        StepOutput::Cycle(c) => format!(
            "{:?}: {} pair(s), {} healthy, {} cycled, {} would cycle, {} failed",
            c.mode, c.pairs, c.already_healthy, c.cycled, c.would_cycle, c.failed
        ),
    };
    Some(summary)
}
