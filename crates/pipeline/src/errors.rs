//! Error taxonomy and retry-policy types for the classfleet domain.
//!
//! Every remote failure is classified exactly once, at the call boundary, into
//! an [`ErrorKind`]. The classification travels with the failure as an
//! [`ApiError`] (one attempt) and, once the resilience layer gives up, as a
//! [`ClassifiedError`] (the surfaced failure with operation name and attempt
//! count). Nothing downstream re-derives a classification from a message.
//!
//! [`PipelineError`] covers conditions that prevent a run from starting at all.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::Timestamp;

// ---------------------------------------------------------------------------
// Classification
// ---------------------------------------------------------------------------

/// Taxonomy tag for a remote failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// The remote quota is exhausted; retry after the reset time.
    RateLimited,
    /// The credential is missing, invalid, or lacks the required scope.
    ///
    /// Never retried. Raises the run-wide abort flag.
    AuthFailure,
    /// The addressed resource does not exist.
    NotFound,
    /// The request was rejected as malformed (bad input, conflicting state).
    ValidationError,
    /// Timeouts, connection resets, and 5xx responses.
    TransientNetwork,
    /// Unexpected responses, and retryable failures whose attempts ran out.
    PermanentApi,
}

impl ErrorKind {
    /// Returns `true` if a failure of this kind may be retried.
    ///
    /// `NotFound` is only retryable when the caller opted in (e.g. verifying a
    /// resource that GitHub creates asynchronously).
    pub fn is_retryable(self, not_found_retryable: bool) -> bool {
        match self {
            ErrorKind::RateLimited | ErrorKind::TransientNetwork => true,
            ErrorKind::NotFound => not_found_retryable,
            ErrorKind::AuthFailure | ErrorKind::ValidationError | ErrorKind::PermanentApi => false,
        }
    }

    /// Returns `true` if this kind invalidates every subsequent call of the run.
    pub fn is_fatal(self) -> bool {
        matches!(self, ErrorKind::AuthFailure)
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            ErrorKind::RateLimited => "rate_limited",
            ErrorKind::AuthFailure => "auth_failure",
            ErrorKind::NotFound => "not_found",
            ErrorKind::ValidationError => "validation_error",
            ErrorKind::TransientNetwork => "transient_network",
            ErrorKind::PermanentApi => "permanent_api",
        };
        f.write_str(label)
    }
}

// ---------------------------------------------------------------------------
// Retry semantics
// ---------------------------------------------------------------------------

/// Whether an error condition is safe to retry and, if so, after what delay.
///
/// Produced by [`ApiError::retry_policy`] to let the resilience layer decide
/// whether to re-invoke an operation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum RetryPolicy {
    /// The operation may be retried.
    ///
    /// `after` optionally specifies the minimum delay before retrying, derived
    /// from `x-ratelimit-reset` or `Retry-After` response headers.
    Retryable {
        /// Minimum back-off before the next attempt. `None` means apply the
        /// caller's own back-off schedule.
        after: Option<Duration>,
    },
    /// The operation must not be retried.
    NonRetryable,
}

// ---------------------------------------------------------------------------
// Attempt-level failure
// ---------------------------------------------------------------------------

/// Quota information carried by a rate-limited response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RateLimitInfo {
    /// Requests left in the current window, if the response reported it.
    pub remaining: Option<u64>,
    /// When the window resets, if the response reported it.
    pub reset_at: Option<Timestamp>,
}

/// One classified failure of one remote call attempt.
#[derive(Debug, Clone, PartialEq, Error, Serialize, Deserialize)]
#[error("{kind}: {message}")]
pub struct ApiError {
    /// Classification computed at the call boundary.
    pub kind: ErrorKind,
    /// Human-readable description (status line, transport error text).
    pub message: String,
    /// Quota information, present for rate-limited responses that carried it.
    pub rate_limit: Option<RateLimitInfo>,
}

impl ApiError {
    /// Creates an error of the given kind.
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            rate_limit: None,
        }
    }

    /// Attaches quota information.
    #[must_use]
    pub fn with_rate_limit(mut self, info: RateLimitInfo) -> Self {
        self.rate_limit = Some(info);
        self
    }

    pub fn rate_limited(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::RateLimited, message)
    }

    pub fn auth(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::AuthFailure, message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::NotFound, message)
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::ValidationError, message)
    }

    pub fn transient(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::TransientNetwork, message)
    }

    pub fn permanent(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::PermanentApi, message)
    }

    /// Returns the reset time reported by a rate-limited response.
    pub fn rate_limit_reset(&self) -> Option<Timestamp> {
        self.rate_limit.as_ref().and_then(|r| r.reset_at)
    }

    /// Decides whether this failure may be retried, and after what minimum
    /// delay.
    ///
    /// Rate-limited failures with a reset time yield `after = reset - now`
    /// (zero if the reset is already in the past). The ceiling is applied by
    /// the resilience layer, not here.
    pub fn retry_policy(&self, not_found_retryable: bool, now: Timestamp) -> RetryPolicy {
        if !self.kind.is_retryable(not_found_retryable) {
            return RetryPolicy::NonRetryable;
        }
        let after = match (self.kind, self.rate_limit_reset()) {
            (ErrorKind::RateLimited, Some(reset)) => Some(reset.duration_since(now)),
            _ => None,
        };
        RetryPolicy::Retryable { after }
    }
}

// ---------------------------------------------------------------------------
// Surfaced failure
// ---------------------------------------------------------------------------

/// A failure surfaced by the resilience layer to its caller.
///
/// Carries the operation name, the classification, and the number of attempts
/// made, so every user-visible error can be traced back to a specific call.
#[derive(Debug, Clone, PartialEq, Error, Serialize, Deserialize)]
#[error("{operation} failed ({kind}) after {attempts} attempt(s): {message}")]
pub struct ClassifiedError {
    /// Operation name given to the resilience layer (e.g. `"put_secret"`).
    pub operation: String,
    /// What the operation was acting on (e.g. `"org/hw1-alice"`), if known.
    pub target: Option<String>,
    /// Final classification. `PermanentApi` when retries were exhausted.
    pub kind: ErrorKind,
    /// The classification of the last attempt when `kind` is the result of
    /// exhausting retries.
    pub last_kind: Option<ErrorKind>,
    /// Number of attempts made, including the failing one.
    pub attempts: u32,
    /// Description of the last failure.
    pub message: String,
}

impl ClassifiedError {
    /// Surfaces a non-retryable failure as-is.
    pub fn from_attempt(
        operation: impl Into<String>,
        target: Option<String>,
        error: ApiError,
        attempts: u32,
    ) -> Self {
        Self {
            operation: operation.into(),
            target,
            kind: error.kind,
            last_kind: None,
            attempts,
            message: error.message,
        }
    }

    /// Surfaces a retryable failure whose attempts were exhausted.
    pub fn exhausted(
        operation: impl Into<String>,
        target: Option<String>,
        last: ApiError,
        attempts: u32,
    ) -> Self {
        Self {
            operation: operation.into(),
            target,
            kind: ErrorKind::PermanentApi,
            last_kind: Some(last.kind),
            attempts,
            message: last.message,
        }
    }

    /// Creates a failure for a call that was never attempted because the run
    /// was aborted.
    pub fn cancelled(operation: impl Into<String>, target: Option<String>, reason: &str) -> Self {
        Self {
            operation: operation.into(),
            target,
            kind: ErrorKind::PermanentApi,
            last_kind: None,
            attempts: 0,
            message: format!("not attempted: {reason}"),
        }
    }

    /// Returns `true` if this failure is a rate limit that outlasted the
    /// retry budget.
    pub fn is_rate_limit_exhaustion(&self) -> bool {
        self.kind == ErrorKind::PermanentApi && self.last_kind == Some(ErrorKind::RateLimited)
    }
}

// ---------------------------------------------------------------------------
// Run-level errors
// ---------------------------------------------------------------------------

/// Errors that prevent a run from starting.
#[derive(Debug, Error, PartialEq, Serialize, Deserialize)]
pub enum PipelineError {
    /// `--step` and `--skip` were both given.
    #[error("--step and --skip are mutually exclusive")]
    ConflictingStepFilters,

    /// A step filter named a step outside the pipeline vocabulary.
    #[error("Unknown step '{name}' (expected one of: {expected})")]
    UnknownStep {
        /// The name as given.
        name: String,
        /// Comma-separated list of valid step names.
        expected: String,
    },

    /// The configuration is invalid.
    ///
    /// Produced at load time; the pipeline never starts with an invalid config.
    #[error("Configuration error: {message}")]
    ConfigurationError {
        /// Description of the configuration problem.
        message: String,
    },
}
