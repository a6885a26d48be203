//! Built-in step implementations, one module per [`pipeline::StepName`].
//!
//! | Module | Step | Mutating |
//! |--------|------|----------|
//! | [`template`] | `sync` | yes |
//! | [`discover`] | `discover` | no |
//! | [`sync_roster`] | `sync-roster` | yes |
//! | [`secrets`] | `secrets` | yes |
//! | [`assist`] | `assist` | no |
//! | [`cycle`] | `cycle` | yes |

pub mod assist;
pub mod cycle;
pub mod discover;
pub mod secrets;
pub mod sync_roster;
pub mod template;
