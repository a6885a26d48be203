//! Core domain for classfleet.
//!
//! This crate contains every domain concept, newtype identifier, shared value
//! type, and the error taxonomy used throughout the pipeline. Infrastructure
//! crates implement the traits defined here; they never add domain rules.
//!
//! ## Architectural Layer
//!
//! **Business logic + port definitions.** This crate has no I/O dependencies.
//! It defines *what* is needed; infrastructure crates define *how* to supply it.
//!
//! ## Module Layout
//!
//! | Module | Contents |
//! |--------|----------|
//! | [`identifiers`] | Newtype identifiers (`OrgName`, `RepositoryId`, `Email`, etc.) |
//! | [`types`] | Shared value types (`RemoteRepository`, `CollaboratorStatus`, `Timestamp`, etc.) |
//! | [`errors`] | Error taxonomy (`ErrorKind`, `ApiError`, `ClassifiedError`) and `RetryPolicy` |
//! | [`ports`] | `ClassroomApi` and `RosterStore` traits |
//! | [`resolver`] | Repository Resolver and `RepoHandle` |
//! | [`roster`] | Roster records and the roster matching plan |
//! | [`cycle`] | Collaborator permission cycle state machine |
//! | [`steps`] | Step vocabulary, filters, statuses, and policies |
//! | [`settings`] | Validated run settings |

pub mod cycle;
pub mod errors;
pub mod identifiers;
pub mod ports;
pub mod resolver;
pub mod roster;
pub mod settings;
pub mod steps;
pub mod types;

// Re-export everything at the crate root for ergonomic usage by downstream crates.
pub use cycle::{CycleState, CycleTracker, InvalidTransition};
pub use errors::{ApiError, ClassifiedError, ErrorKind, PipelineError, RateLimitInfo, RetryPolicy};
pub use identifiers::{
    AssignmentPrefix, BranchName, CommitSha, Email, GithubUsername, OrgName, RepoName,
    RepositoryId, RunId, SecretName,
};
pub use ports::{ClassroomApi, RosterStore, RosterStoreError, REPOSITORY_PAGE_SIZE};
pub use resolver::{RepoHandle, RepositoryResolver};
pub use roster::{
    plan_sync, LinkUpdate, MatchNote, MatchedPair, RosterRecord, StudentStatus, SyncPlan,
    SyncResult, UnlinkedStudent, UnmatchReason, UnmatchedRepo,
};
pub use settings::{RunSettings, SecretSpec, TemplateSettings, DEFAULT_PARALLELISM, MAX_PARALLELISM};
pub use steps::{FailurePolicy, RunStatus, StepFilter, StepName, StepStatus, StepToggles};
pub use types::{
    BranchHead, CollaboratorStatus, MergeUpstreamOutcome, Permission, RemoteRepository,
    SecretValue, Timestamp,
};
