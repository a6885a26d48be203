//! The step contract.
//!
//! A [`Step`] pairs a [`StepName`] with the [`StepExecutor`] that does its
//! work. The engine decides the [`ExecutionMode`]; an executor never looks at
//! the dry-run flag itself.

use std::sync::Arc;

use async_trait::async_trait;
use pipeline::{ClassifiedError, RosterStoreError, StepName};
use serde::Serialize;
use thiserror::Error;

use crate::context::RunContext;
use crate::steps::{
    assist::{AssistOutput, AssistStep},
    cycle::{CycleOutput, CycleStep},
    discover::{DiscoverStep, DiscoveryOutput},
    secrets::{SecretsOutput, SecretsStep},
    sync_roster::{RosterSyncOutput, SyncRosterStep},
    template::{TemplateSyncOutput, TemplateSyncStep},
};

/// How a step is allowed to touch remote state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionMode {
    Live,
    /// Read-only calls only; mutations are reported as intended actions.
    Preview,
}

impl ExecutionMode {
    pub fn is_preview(self) -> bool {
        self == ExecutionMode::Preview
    }
}

/// Step-specific result payload.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StepOutput {
    Template(TemplateSyncOutput),
    Discovery(DiscoveryOutput),
    Roster(RosterSyncOutput),
    Secrets(SecretsOutput),
    Assist(AssistOutput),
    Cycle(CycleOutput),
}

/// What an executor hands back when it ran to the end.
///
/// A non-empty `failures` list means some items failed; the engine marks the
/// step failed but keeps the output.
#[derive(Debug, Clone)]
pub struct StepReport {
    pub output: StepOutput,
    pub failures: Vec<ClassifiedError>,
}

impl StepReport {
    pub fn ok(output: StepOutput) -> Self {
        Self {
            output,
            failures: Vec::new(),
        }
    }

    pub fn with_failures(output: StepOutput, failures: Vec<ClassifiedError>) -> Self {
        Self { output, failures }
    }
}

/// A step that could not produce an output at all.
#[derive(Debug, Error)]
pub enum StepError {
    #[error(transparent)]
    Api(#[from] ClassifiedError),

    #[error(transparent)]
    Roster(#[from] RosterStoreError),

    /// The step cannot run with the current configuration.
    #[error("{0}")]
    Precondition(String),
}

impl StepError {
    pub fn classified(&self) -> Option<&ClassifiedError> {
        match self {
            StepError::Api(err) => Some(err),
            _ => None,
        }
    }
}

#[async_trait]
pub trait StepExecutor: Send + Sync {
    async fn execute(&self, ctx: &RunContext, mode: ExecutionMode)
        -> Result<StepReport, StepError>;
}

/// A named, ordered unit of work.
#[derive(Clone)]
pub struct Step {
    pub name: StepName,
    pub ordinal: usize,
    pub mutating: bool,
    executor: Arc<dyn StepExecutor>,
}

impl std::fmt::Debug for Step {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Step")
            .field("name", &self.name)
            .field("ordinal", &self.ordinal)
            .field("mutating", &self.mutating)
            .finish_non_exhaustive()
    }
}

impl Step {
    pub fn new(name: StepName, executor: Arc<dyn StepExecutor>) -> Self {
        Self {
            name,
            ordinal: name.ordinal(),
            mutating: name.is_mutating(),
            executor,
        }
    }

    /// The built-in implementation of `name`.
    pub fn standard(name: StepName) -> Self {
        let executor: Arc<dyn StepExecutor> = match name {
            StepName::SyncTemplate => Arc::new(TemplateSyncStep),
            StepName::Discover => Arc::new(DiscoverStep),
            StepName::SyncRoster => Arc::new(SyncRosterStep),
            StepName::Secrets => Arc::new(SecretsStep),
            StepName::Assist => Arc::new(AssistStep),
            StepName::Cycle => Arc::new(CycleStep),
        };
        Self::new(name, executor)
    }

    pub fn executor(&self) -> &Arc<dyn StepExecutor> {
        &self.executor
    }
}
