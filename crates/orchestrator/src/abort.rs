//! Run-wide abort flag.
//!
//! Raised by the resilience layer on an authentication failure and by the CLI
//! on Ctrl-C. Workers check it before dispatching new work; calls already in
//! flight finish their current attempt.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};

use serde::{Deserialize, Serialize};

/// Why a run was aborted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum AbortReason {
    /// A call was rejected for bad credentials or missing scope.
    AuthFailure { operation: String, message: String },
    /// The operator interrupted the run.
    Interrupted,
}

impl std::fmt::Display for AbortReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AbortReason::AuthFailure { operation, message } => {
                write!(f, "authentication failed during {operation}: {message}")
            }
            AbortReason::Interrupted => f.write_str("interrupted by signal"),
        }
    }
}

#[derive(Debug, Default)]
struct Inner {
    raised: AtomicBool,
    reason: OnceLock<AbortReason>,
}

/// Cloneable handle to the abort flag shared by every worker of a run.
#[derive(Debug, Clone, Default)]
pub struct AbortSignal {
    inner: Arc<Inner>,
}

impl AbortSignal {
    pub fn new() -> Self {
        Self::default()
    }

    /// Raises the flag. The first reason recorded wins.
    pub fn raise(&self, reason: AbortReason) {
        if self.inner.reason.set(reason.clone()).is_ok() {
            tracing::warn!(%reason, "Run abort requested");
        }
        self.inner.raised.store(true, Ordering::SeqCst);
    }

    pub fn is_raised(&self) -> bool {
        self.inner.raised.load(Ordering::SeqCst)
    }

    pub fn reason(&self) -> Option<AbortReason> {
        self.inner.reason.get().cloned()
    }
}
