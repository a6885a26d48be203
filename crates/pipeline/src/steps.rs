//! Step vocabulary, status, and run-level policy types.
//!
//! The pipeline runs a fixed, ordered set of six named steps. A run selects a
//! subset of them, either from the configuration toggles, from an explicit
//! `--step` list, or from the toggled-on sequence minus a `--skip` list.

use serde::{Deserialize, Serialize};

use crate::PipelineError;

/// One named unit of orchestrated work, in pipeline order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum StepName {
    /// Bring the classroom template copy up to date with its source.
    #[serde(rename = "sync")]
    SyncTemplate,
    /// List and resolve the assignment's student repositories.
    #[serde(rename = "discover")]
    Discover,
    /// Link discovered repositories to roster records.
    #[serde(rename = "sync-roster")]
    SyncRoster,
    /// Distribute Actions secrets to student repositories.
    #[serde(rename = "secrets")]
    Secrets,
    /// Report students whose repository access needs help.
    #[serde(rename = "assist")]
    Assist,
    /// Remove and re-invite students whose access is broken.
    #[serde(rename = "cycle")]
    Cycle,
}

impl StepName {
    /// All steps, in pipeline order.
    pub const ALL: [StepName; 6] = [
        StepName::SyncTemplate,
        StepName::Discover,
        StepName::SyncRoster,
        StepName::Secrets,
        StepName::Assist,
        StepName::Cycle,
    ];

    /// The name used on the command line and in reports.
    pub fn as_str(self) -> &'static str {
        match self {
            StepName::SyncTemplate => "sync",
            StepName::Discover => "discover",
            StepName::SyncRoster => "sync-roster",
            StepName::Secrets => "secrets",
            StepName::Assist => "assist",
            StepName::Cycle => "cycle",
        }
    }

    /// Whether the step changes remote or roster state.
    pub fn is_mutating(self) -> bool {
        !matches!(self, StepName::Discover | StepName::Assist)
    }

    /// Position in the pipeline order.
    pub fn ordinal(self) -> usize {
        Self::ALL.iter().position(|s| *s == self).unwrap_or(0)
    }
}

impl std::fmt::Display for StepName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for StepName {
    type Err = PipelineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim();
        StepName::ALL
            .into_iter()
            .find(|step| step.as_str() == wanted)
            .ok_or_else(|| PipelineError::UnknownStep {
                name: wanted.to_string(),
                expected: StepName::ALL
                    .iter()
                    .map(|s| s.as_str())
                    .collect::<Vec<_>>()
                    .join(", "),
            })
    }
}

// ---------------------------------------------------------------------------

/// Configuration switches that decide the default step sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepToggles {
    pub sync_template: bool,
    pub discover: bool,
    pub sync_roster: bool,
    pub secrets: bool,
    pub assist: bool,
    pub cycle: bool,
}

impl Default for StepToggles {
    fn default() -> Self {
        Self {
            sync_template: false,
            discover: true,
            sync_roster: false,
            secrets: true,
            assist: false,
            cycle: false,
        }
    }
}

impl StepToggles {
    pub fn is_enabled(&self, step: StepName) -> bool {
        match step {
            StepName::SyncTemplate => self.sync_template,
            StepName::Discover => self.discover,
            StepName::SyncRoster => self.sync_roster,
            StepName::Secrets => self.secrets,
            StepName::Assist => self.assist,
            StepName::Cycle => self.cycle,
        }
    }
}

/// Restricts which steps a run executes.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum StepFilter {
    /// Every toggled-on step.
    #[default]
    All,
    /// Exactly these steps, in pipeline order, regardless of toggles.
    Only(Vec<StepName>),
    /// Every toggled-on step except these.
    Skip(Vec<StepName>),
}

impl StepFilter {
    /// Builds a filter from the raw `--step` and `--skip` values.
    ///
    /// # Errors
    ///
    /// [`PipelineError::ConflictingStepFilters`] if both lists are non-empty,
    /// [`PipelineError::UnknownStep`] for names outside the vocabulary.
    pub fn from_args(only: &[String], skip: &[String]) -> Result<Self, PipelineError> {
        let parse = |names: &[String]| -> Result<Vec<StepName>, PipelineError> {
            names
                .iter()
                .flat_map(|n| n.split(','))
                .filter(|n| !n.trim().is_empty())
                .map(str::parse)
                .collect()
        };
        let only = parse(only)?;
        let skip = parse(skip)?;
        match (only.is_empty(), skip.is_empty()) {
            (false, false) => Err(PipelineError::ConflictingStepFilters),
            (false, true) => Ok(StepFilter::Only(only)),
            (true, false) => Ok(StepFilter::Skip(skip)),
            (true, true) => Ok(StepFilter::All),
        }
    }

    /// Returns the steps to run, in pipeline order, and the ones left out.
    pub fn select(&self, toggles: &StepToggles) -> (Vec<StepName>, Vec<StepName>) {
        StepName::ALL.into_iter().partition(|step| match self {
            StepFilter::All => toggles.is_enabled(*step),
            StepFilter::Only(names) => names.contains(step),
            StepFilter::Skip(names) => toggles.is_enabled(*step) && !names.contains(step),
        })
    }
}

// ---------------------------------------------------------------------------

/// Terminal outcome of one step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    Success,
    Skipped,
    Failed,
    DryRunPreview,
}

/// What the run does after a failed step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailurePolicy {
    /// Abort at the first failure and skip every remaining step.
    StopOnFailure,
    /// Record the failure and keep going.
    #[default]
    ContinueOnError,
}

/// Run-level summary status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    /// Every step succeeded (or previewed).
    Completed,
    /// At least one step failed, and the run continued.
    CompletedWithWarnings,
    /// The run stopped before its last step.
    Aborted,
}
