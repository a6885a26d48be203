//! classfleet workflow orchestrator.
//!
//! This crate drives a run: it sequences the six pipeline steps, routes every
//! remote call through the resilience layer, fans per-repository work out to a
//! bounded worker pool, and assembles the final [`RunReport`].
//!
//! ## Architectural Layer
//!
//! **Orchestration layer.** Steps sequence calls between business logic in the
//! [`pipeline`] crate and the infrastructure traits (`ClassroomApi`,
//! `RosterStore`). They contain no domain rules of their own.
//!
//! ## Module Layout
//!
//! | Module | Contents |
//! |--------|----------|
//! | [`abort`] | Run-wide abort flag |
//! | [`resilience`] | Retry, back-off, rate-limit gate, per-attempt timeout |
//! | [`pool`] | Bounded worker pool |
//! | [`context`] | `RunContext` shared by every step |
//! | [`roster_sync`] | Roster Sync Engine driver |
//! | [`cycler`] | Collaborator Cycler |
//! | [`step`] | `Step`, `StepExecutor`, and step outputs |
//! | [`steps`] | Built-in step implementations |
//! | [`engine`] | Workflow Orchestrator and `RunReport` |

pub mod abort;
pub mod context;
pub mod cycler;
pub mod engine;
pub mod pool;
pub mod resilience;
pub mod roster_sync;
pub mod step;
pub mod steps;

pub use abort::{AbortReason, AbortSignal};
pub use context::RunContext;
pub use cycler::{CollaboratorCycler, CycleAction, CycleMode, CycleReport};
pub use engine::{orchestrate, RosterSummary, RunReport, StepCounts, StepResult, WorkflowRun};
pub use resilience::{
    apply_jitter, backoff_delay, rate_limit_sleep, ApiCallAttempt, CallOptions, RateLimitGate,
    RecoveredCall, ResilientExecutor, RetryConfig,
};
pub use roster_sync::{RosterSyncOutcome, RosterSynchronizer};
pub use step::{ExecutionMode, Step, StepError, StepExecutor, StepOutput, StepReport};
