//! classfleet CLI entry point.
//!
//! This binary is the composition root for the entire system. Responsibilities:
//!
//! 1. **Parse arguments and configuration**: load `.classfleet/config.toml`
//!    and validate it before anything touches the network.
//! 2. **Wire observability**: install the `tracing` subscriber (see
//!    [`telemetry`]). Every span and event from every crate flows through it.
//! 3. **Construct infrastructure**: build the `GithubClient`, the JSON roster
//!    store, and the resilience layer, and inject them into a `RunContext`.
//! 4. **Run**: confirm with the operator, execute the planned steps, print the
//!    report, and translate its outcome into an exit code.

mod args;
mod config;
mod report;
mod telemetry;

use std::io::{BufRead, Write};
use std::path::Path;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use github::{GithubClient, GithubConfig};
use orchestrator::{AbortReason, AbortSignal, ResilientExecutor, RunContext, WorkflowRun};
use pipeline::{FailurePolicy, PipelineError, StepFilter};
use roster::JsonFileRosterStore;

use crate::args::{Cli, Command, OrchestrateArgs};
use crate::report::{EXIT_FAILURE, EXIT_OK, EXIT_USAGE};

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let telemetry = match telemetry::init(cli.verbose, cli.log_format) {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("error: failed to initialise logging: {e:#}");
            return ExitCode::from(EXIT_FAILURE);
        }
    };

    let code = match cli.command {
        Command::Orchestrate(args) => match run_orchestrate(&cli.config, args).await {
            Ok(code) => code,
            Err(e) => {
                tracing::error!(error = %format!("{e:#}"), "classfleet failed");
                eprintln!("error: {e:#}");
                if is_usage_error(&e) {
                    EXIT_USAGE
                } else {
                    EXIT_FAILURE
                }
            }
        },
    };

    telemetry.shutdown();
    ExitCode::from(code)
}

fn is_usage_error(error: &anyhow::Error) -> bool {
    matches!(
        error.downcast_ref::<PipelineError>(),
        Some(PipelineError::UnknownStep { .. } | PipelineError::ConflictingStepFilters)
    )
}

async fn run_orchestrate(config_path: &Path, args: OrchestrateArgs) -> anyhow::Result<u8> {
    let filter = StepFilter::from_args(&args.step, &args.skip)?;

    let mut config = config::load(config_path)
        .with_context(|| format!("invalid configuration in {}", config_path.display()))?;
    if args.stop_on_failure {
        config.settings.failure_policy = FailurePolicy::StopOnFailure;
    }

    let token = std::env::var(&config.token_env).with_context(|| {
        format!(
            "no GitHub token: environment variable {} is not set",
            config.token_env
        )
    })?;
    let api = GithubClient::new(GithubConfig::new(token).with_base_url(config.api_base_url.clone()))
        .context("cannot create the GitHub client")?;
    let roster = JsonFileRosterStore::open(config.roster_path.clone())
        .await
        .with_context(|| format!("cannot open roster {}", config.roster_path.display()))?;

    let abort = AbortSignal::new();
    let resilience = Arc::new(ResilientExecutor::new(config.retry.clone(), abort.clone()));
    let ctx = RunContext::new(config.settings, Arc::new(api), Arc::new(roster), resilience)
        .with_dry_run(args.dry_run)
        .with_force_cycle(args.force);

    let run = WorkflowRun::plan(&ctx, &filter);
    if run.steps().is_empty() {
        tracing::warn!("No steps selected; nothing to do");
    }

    let mutating: Vec<_> = run
        .steps()
        .iter()
        .filter(|s| s.mutating)
        .map(|s| s.name.as_str())
        .collect();
    if !args.dry_run && !args.yes && !mutating.is_empty() && !confirm(&ctx, &mutating)? {
        eprintln!("Cancelled; nothing was changed.");
        return Ok(EXIT_OK);
    }

    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupt received; finishing in-flight calls");
            abort.raise(AbortReason::Interrupted);
        }
    });

    let report = run.execute(&ctx).await;
    println!("{}", report::render(&report, args.format)?);
    Ok(report::exit_code(&report))
}

/// Asks the operator before mutating steps run. Anything but `y`/`yes`,
/// including end of input, declines.
fn confirm(ctx: &RunContext, mutating: &[&str]) -> anyhow::Result<bool> {
    let mut stderr = std::io::stderr().lock();
    write!(
        stderr,
        "About to run {} against {} assignment '{}'. Continue? [y/N] ",
        mutating.join(", "),
        ctx.settings.organization,
        ctx.settings.assignment_prefix
    )?;
    stderr.flush()?;

    let mut answer = String::new();
    std::io::stdin().lock().read_line(&mut answer)?;
    Ok(matches!(answer.trim().to_lowercase().as_str(), "y" | "yes"))
}
