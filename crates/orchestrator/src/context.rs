//! Shared state of one run.

use std::sync::Arc;

use pipeline::{ClassifiedError, ClassroomApi, RepositoryResolver, RosterStore, RunId, RunSettings};
use tokio::sync::OnceCell;

use crate::abort::AbortSignal;
use crate::resilience::ResilientExecutor;
use crate::step::StepError;
use crate::steps::discover::{discover_repositories, DiscoveryOutput};

/// Everything a step needs: settings, adapters, the resilience layer, and
/// the lazily discovered repository list.
pub struct RunContext {
    pub run_id: RunId,
    pub settings: Arc<RunSettings>,
    pub api: Arc<dyn ClassroomApi>,
    pub roster: Arc<dyn RosterStore>,
    pub resilience: Arc<ResilientExecutor>,
    /// Mutating steps only describe what they would do.
    pub dry_run: bool,
    /// Cycle every matched student, not only those without access.
    pub force_cycle: bool,
    discovery: OnceCell<Result<Arc<DiscoveryOutput>, ClassifiedError>>,
}

impl RunContext {
    pub fn new(
        settings: RunSettings,
        api: Arc<dyn ClassroomApi>,
        roster: Arc<dyn RosterStore>,
        resilience: Arc<ResilientExecutor>,
    ) -> Self {
        Self {
            run_id: RunId::new_random(),
            settings: Arc::new(settings),
            api,
            roster,
            resilience,
            dry_run: false,
            force_cycle: false,
            discovery: OnceCell::new(),
        }
    }

    pub fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    pub fn with_force_cycle(mut self, force: bool) -> Self {
        self.force_cycle = force;
        self
    }

    pub fn abort(&self) -> &AbortSignal {
        self.resilience.abort()
    }

    pub fn resolver(&self) -> RepositoryResolver {
        RepositoryResolver::new(
            self.settings.organization.clone(),
            self.settings.assignment_prefix.clone(),
        )
    }

    /// Student repositories of the assignment.
    ///
    /// Listed on first use and shared by every later step, so steps selected
    /// without `discover` still see the repositories. A failed listing is
    /// also kept: the step that ran it reports the classified error, later
    /// steps fail without calling the API again.
    pub async fn discovery(&self) -> Result<Arc<DiscoveryOutput>, StepError> {
        let mut listed_here = false;
        let flag = &mut listed_here;
        let outcome = self
            .discovery
            .get_or_init(|| async move {
                *flag = true;
                discover_repositories(self).await.map(Arc::new)
            })
            .await;
        match outcome {
            Ok(found) => Ok(Arc::clone(found)),
            Err(err) if listed_here => Err(StepError::Api(err.clone())),
            Err(err) => Err(StepError::Precondition(format!(
                "repository discovery failed earlier in this run ({} on {})",
                err.kind, err.operation
            ))),
        }
    }
}
