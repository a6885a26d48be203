//! Command-line surface.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

/// Default location of the configuration file, relative to the working
/// directory.
pub const DEFAULT_CONFIG_PATH: &str = ".classfleet/config.toml";

#[derive(Debug, Parser)]
#[command(
    name = "classfleet",
    version,
    about = "Bulk operations across a classroom's student repositories"
)]
pub struct Cli {
    /// Configuration file.
    #[arg(long, global = true, env = "CLASSFLEET_CONFIG", default_value = DEFAULT_CONFIG_PATH)]
    pub config: PathBuf,

    /// Log at debug level unless RUST_LOG says otherwise.
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Format of the diagnostic log written to stderr.
    #[arg(long, global = true, value_enum, default_value_t = LogFormat::Text)]
    pub log_format: LogFormat,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Run the configured steps against every student repository.
    Orchestrate(OrchestrateArgs),
}

#[derive(Debug, Args)]
pub struct OrchestrateArgs {
    /// Run only these steps (comma separated), whatever the configuration
    /// enables.
    #[arg(long, value_delimiter = ',', conflicts_with = "skip")]
    pub step: Vec<String>,

    /// Leave these steps out of the configured sequence.
    #[arg(long, value_delimiter = ',')]
    pub skip: Vec<String>,

    /// Describe what mutating steps would do without changing anything.
    #[arg(long)]
    pub dry_run: bool,

    /// Do not ask for confirmation.
    #[arg(short = 'y', long)]
    pub yes: bool,

    /// Cycle every matched student, not only those who lost access.
    #[arg(long)]
    pub force: bool,

    /// Stop at the first failed step, overriding the configured policy.
    #[arg(long)]
    pub stop_on_failure: bool,

    /// Format of the run report written to stdout.
    #[arg(long, value_enum, default_value_t = ReportFormat::Text)]
    pub format: ReportFormat,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    Text,
    Json,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ReportFormat {
    Text,
    Json,
}
