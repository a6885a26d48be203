//! Collaborator permission cycle state machine.
//!
//! One [`CycleTracker`] follows one (repository, username) pair through
//!
//! ```text
//! HasAccess -> Removing -> Removed -> Inviting -> PendingAcceptance -> Verified
//! ```
//!
//! Only forward moves are accepted; any non-terminal state may drop to
//! `Failed`. `Verified` and `Failed` are terminal.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Progress of one permission-cycle operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CycleState {
    HasAccess,
    Removing,
    Removed,
    Inviting,
    PendingAcceptance,
    Verified,
    Failed,
}

impl CycleState {
    fn rank(self) -> Option<u8> {
        match self {
            CycleState::HasAccess => Some(0),
            CycleState::Removing => Some(1),
            CycleState::Removed => Some(2),
            CycleState::Inviting => Some(3),
            CycleState::PendingAcceptance => Some(4),
            CycleState::Verified => Some(5),
            CycleState::Failed => None,
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, CycleState::Verified | CycleState::Failed)
    }
}

impl std::fmt::Display for CycleState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            CycleState::HasAccess => "has_access",
            CycleState::Removing => "removing",
            CycleState::Removed => "removed",
            CycleState::Inviting => "inviting",
            CycleState::PendingAcceptance => "pending_acceptance",
            CycleState::Verified => "verified",
            CycleState::Failed => "failed",
        };
        f.write_str(label)
    }
}

/// A rejected state change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("invalid collaborator cycle transition {from} -> {to}")]
pub struct InvalidTransition {
    pub from: CycleState,
    pub to: CycleState,
}

/// Tracks one pair's progress and the states it went through.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CycleTracker {
    state: CycleState,
    history: Vec<CycleState>,
}

impl Default for CycleTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl CycleTracker {
    /// Starts a tracker in `HasAccess`.
    pub fn new() -> Self {
        Self {
            state: CycleState::HasAccess,
            history: vec![CycleState::HasAccess],
        }
    }

    pub fn state(&self) -> CycleState {
        self.state
    }

    pub fn history(&self) -> &[CycleState] {
        &self.history
    }

    /// Moves to `next`, which must lie strictly after the current state.
    ///
    /// # Errors
    ///
    /// Returns [`InvalidTransition`] for backward moves, repeats, moves out of
    /// a terminal state, and moves to `Failed` (use [`CycleTracker::fail`]).
    pub fn advance(&mut self, next: CycleState) -> Result<(), InvalidTransition> {
        let invalid = InvalidTransition {
            from: self.state,
            to: next,
        };
        if self.state.is_terminal() {
            return Err(invalid);
        }
        match (self.state.rank(), next.rank()) {
            (Some(current), Some(target)) if target > current => {
                self.state = next;
                self.history.push(next);
                Ok(())
            }
            _ => Err(invalid),
        }
    }

    /// Drops to `Failed` from any non-terminal state.
    ///
    /// # Errors
    ///
    /// Returns [`InvalidTransition`] if the cycle already finished.
    pub fn fail(&mut self) -> Result<(), InvalidTransition> {
        if self.state.is_terminal() {
            return Err(InvalidTransition {
                from: self.state,
                to: CycleState::Failed,
            });
        }
        self.state = CycleState::Failed;
        self.history.push(CycleState::Failed);
        Ok(())
    }
}
