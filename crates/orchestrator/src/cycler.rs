//! Collaborator Cycler.
//!
//! Restores a student's repository access by removing and re-inviting them.
//! Each pair moves through [`CycleState`] strictly forward; any failed call
//! ends the pair in `Failed` and leaves the other pairs alone.
//!
//! ```text
//! HasAccess -> Removing -> Removed -> Inviting -> PendingAcceptance -> Verified
//!       \__________\__________\__________\______________\-----> Failed
//! ```

use std::sync::Arc;

use pipeline::{
    ApiError, ClassifiedError, ClassroomApi, CollaboratorStatus, CycleState, CycleTracker,
    ErrorKind, GithubUsername, Permission, RepositoryId,
};
use serde::Serialize;

use crate::resilience::{CallOptions, ResilientExecutor};

/// Which pairs get cycled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CycleMode {
    /// Only students without active access, including those stuck on a
    /// pending invitation.
    Repair,
    /// Every student, regardless of current access.
    Force,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CycleAction {
    /// Access was fine; nothing was changed.
    AlreadyHealthy,
    /// Preview only: the pair would have been cycled.
    WouldCycle,
    /// Removed, re-invited, and verified.
    Cycled,
    Failed,
}

/// Result for one repository/student pair.
#[derive(Debug, Clone, Serialize)]
pub struct CycleReport {
    pub repository: RepositoryId,
    pub username: GithubUsername,
    pub mode: CycleMode,
    pub action: CycleAction,
    pub final_state: CycleState,
    pub history: Vec<CycleState>,
    /// Last collaborator status seen for the pair.
    pub last_observed: Option<CollaboratorStatus>,
    pub error: Option<ClassifiedError>,
}

pub struct CollaboratorCycler {
    api: Arc<dyn ClassroomApi>,
    resilience: Arc<ResilientExecutor>,
    permission: Permission,
}

impl CollaboratorCycler {
    pub fn new(
        api: Arc<dyn ClassroomApi>,
        resilience: Arc<ResilientExecutor>,
        permission: Permission,
    ) -> Self {
        Self {
            api,
            resilience,
            permission,
        }
    }

    /// Cycles `username` on `repository`.
    ///
    /// In `Repair` mode the current status is checked first and healthy pairs
    /// are left untouched. With `preview` set no mutating call is made.
    pub async fn cycle(
        &self,
        repository: &RepositoryId,
        username: &GithubUsername,
        mode: CycleMode,
        preview: bool,
    ) -> CycleReport {
        let mut run = PairRun {
            repository,
            username,
            mode,
            tracker: CycleTracker::new(),
            last_observed: None,
        };
        let api = &self.api;
        let target = format!("{repository}@{username}");

        if mode == CycleMode::Repair {
            let status = self
                .resilience
                .execute(
                    "collaborator_status",
                    CallOptions::new().target(&target),
                    move || async move { api.collaborator_status(repository, username).await },
                )
                .await;
            match status {
                Ok(status) => {
                    run.last_observed = Some(status);
                    if status.has_access() {
                        return run.finish(CycleAction::AlreadyHealthy, None);
                    }
                }
                Err(err) => return run.fail(err),
            }
        }

        if preview {
            return run.finish(CycleAction::WouldCycle, None);
        }

        run.advance(CycleState::Removing);
        let removed = self
            .resilience
            .execute(
                "remove_collaborator",
                CallOptions::new().target(&target),
                move || async move { api.remove_collaborator(repository, username).await },
            )
            .await;
        if let Err(err) = removed {
            return run.fail(err);
        }
        run.advance(CycleState::Removed);

        run.advance(CycleState::Inviting);
        let permission = self.permission;
        let invited = self
            .resilience
            .execute(
                "invite_collaborator",
                CallOptions::new().target(&target),
                move || async move {
                    api.invite_collaborator(repository, username, permission)
                        .await
                },
            )
            .await;
        if let Err(err) = invited {
            return run.fail(err);
        }
        run.advance(CycleState::PendingAcceptance);

        // GitHub creates invitations asynchronously; an absent pair right
        // after inviting is retried like a transient failure.
        let verified = self
            .resilience
            .execute(
                "verify_invitation",
                CallOptions::new().target(&target).not_found_retryable(),
                move || async move {
                    match api.collaborator_status(repository, username).await? {
                        CollaboratorStatus::Absent => Err(ApiError::not_found(
                            "neither a collaborator nor a pending invitation",
                        )),
                        status => Ok(status),
                    }
                },
            )
            .await;
        match verified {
            Ok(status) => {
                run.last_observed = Some(status);
                run.advance(CycleState::Verified);
                run.finish(CycleAction::Cycled, None)
            }
            Err(err) => {
                if err.kind == ErrorKind::NotFound || err.last_kind == Some(ErrorKind::NotFound) {
                    run.last_observed = Some(CollaboratorStatus::Absent);
                }
                run.fail(err)
            }
        }
    }
}

struct PairRun<'a> {
    repository: &'a RepositoryId,
    username: &'a GithubUsername,
    mode: CycleMode,
    tracker: CycleTracker,
    last_observed: Option<CollaboratorStatus>,
}

impl PairRun<'_> {
    fn advance(&mut self, next: CycleState) {
        if let Err(err) = self.tracker.advance(next) {
            tracing::error!(
                repository = %self.repository,
                username = %self.username,
                error = %err,
                "Collaborator cycle state machine rejected a transition"
            );
        }
    }

    fn fail(mut self, err: ClassifiedError) -> CycleReport {
        if let Err(invalid) = self.tracker.fail() {
            tracing::error!(error = %invalid, "Collaborator cycle already finished");
        }
        tracing::warn!(
            repository = %self.repository,
            username = %self.username,
            error = %err,
            "Collaborator cycle failed"
        );
        self.finish(CycleAction::Failed, Some(err))
    }

    fn finish(self, action: CycleAction, error: Option<ClassifiedError>) -> CycleReport {
        tracing::debug!(
            repository = %self.repository,
            username = %self.username,
            ?action,
            state = %self.tracker.state(),
            "Collaborator cycle finished"
        );
        CycleReport {
            repository: self.repository.clone(),
            username: self.username.clone(),
            mode: self.mode,
            action,
            final_state: self.tracker.state(),
            history: self.tracker.history().to_vec(),
            last_observed: self.last_observed,
            error,
        }
    }
}
