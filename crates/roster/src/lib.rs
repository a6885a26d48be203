//! Roster storage for classfleet.
//!
//! Implements [`pipeline::RosterStore`]. Records are keyed by email; writes to
//! one record are serialized, writes to different records are not.
//!
//! | Module | Contents |
//! |--------|----------|
//! | [`memory`] | `InMemoryRosterStore` |
//! | [`json_file`] | `JsonFileRosterStore`, persisted to a JSON document |

pub mod json_file;
pub mod memory;

pub use json_file::JsonFileRosterStore;
pub use memory::InMemoryRosterStore;
