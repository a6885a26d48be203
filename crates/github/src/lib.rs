//! classfleet GitHub infrastructure adapter.
//!
//! Implements [`pipeline::ClassroomApi`] against the GitHub REST API with
//! `reqwest`.
//!
//! ## Architectural Layer
//!
//! **Infrastructure.** This crate must not contain domain rules.
//! All GitHub API details (status codes, rate-limit headers, pagination,
//! secret encryption) are handled here; the [`pipeline`] crate never sees
//! them.
//!
//! | Module | Contents |
//! |--------|----------|
//! | [`client`] | `GithubClient`, one attempt per trait call |
//! | [`classify`] | Response and transport error classification |
//! | [`sealing`] | Sealed-box encryption of Actions secrets |

pub mod classify;
pub mod client;
mod models;
pub mod sealing;

pub use classify::{classify_status, classify_transport, rate_limit_info};
pub use client::{ClientError, GithubClient, GithubConfig, DEFAULT_API_URL};
