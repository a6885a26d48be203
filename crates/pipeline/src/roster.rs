//! Roster model and the matching algorithm of the Roster Synchronization
//! Engine.
//!
//! [`plan_sync`] is pure: given the resolved handles and a snapshot of the
//! organization's roster it computes the [`SyncResult`] and the link writes
//! needed to bring the roster up to date. The orchestrator crate applies those
//! writes through a [`crate::RosterStore`].
//!
//! Matching is exact and case-insensitive on the GitHub login. No fuzzy
//! matching is attempted. Two active records claiming the same login is a data
//! integrity problem; the handle is left unmatched and both candidates are
//! reported.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::{Email, GithubUsername, OrgName, RepoHandle, RepositoryId};

// ---------------------------------------------------------------------------
// Roster records
// ---------------------------------------------------------------------------

/// Enrollment status of a student.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StudentStatus {
    #[default]
    Active,
    Inactive,
    Dropped,
}

/// A roster's view of one student.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RosterRecord {
    /// Unique key within the organization.
    pub email: Email,
    /// Full name.
    pub name: String,
    /// GitHub login, once known.
    #[serde(default)]
    pub github_username: Option<GithubUsername>,
    /// Organization the student is enrolled in.
    pub organization: OrgName,
    /// Only `active` students take part in matching.
    #[serde(default)]
    pub status: StudentStatus,
    /// Repository link written by the sync engine.
    #[serde(default)]
    pub repository_url: Option<String>,
}

impl RosterRecord {
    /// Creates an active record with no GitHub login and no link.
    pub fn new(email: Email, name: impl Into<String>, organization: OrgName) -> Self {
        Self {
            email,
            name: name.into(),
            github_username: None,
            organization,
            status: StudentStatus::Active,
            repository_url: None,
        }
    }

    #[must_use]
    pub fn with_username(mut self, username: GithubUsername) -> Self {
        self.github_username = Some(username);
        self
    }

    #[must_use]
    pub fn with_status(mut self, status: StudentStatus) -> Self {
        self.status = status;
        self
    }

    pub fn is_active(&self) -> bool {
        self.status == StudentStatus::Active
    }
}

// ---------------------------------------------------------------------------
// Sync result
// ---------------------------------------------------------------------------

/// A repository linked to a roster record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchedPair {
    pub repository: RepositoryId,
    pub url: String,
    pub student_token: String,
    pub email: Email,
    pub name: String,
}

/// Why a repository could not be linked.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnmatchReason {
    /// The name did not follow `{prefix}-{token}`.
    Unparsable,
    /// No active roster record has this login.
    NoRosterEntry,
    /// More than one active roster record has this login.
    AmbiguousUsername,
    /// The student was already matched to another repository in this pass.
    DuplicateHandle,
}

/// A repository that could not be linked.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnmatchedRepo {
    pub repository: RepositoryId,
    pub url: String,
    pub student_token: String,
    pub reason: UnmatchReason,
}

/// An active student with no matched repository.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnlinkedStudent {
    pub email: Email,
    pub name: String,
    pub github_username: Option<GithubUsername>,
}

/// A match-confidence or data-integrity remark.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum MatchNote {
    /// Several roster records share one login; none was picked.
    AmbiguousUsername {
        token: String,
        repository: RepositoryId,
        candidates: Vec<Email>,
    },
    /// Two repositories resolved to the same student.
    DuplicateHandle {
        email: Email,
        kept: RepositoryId,
        ignored: RepositoryId,
    },
    /// The repository name did not contain the assignment prefix.
    Unparsable { repository: RepositoryId },
}

/// Outcome of one roster synchronization pass.
///
/// `matched.len() + unmatched.len() == total_repos` always holds, and every
/// list is sorted so repeated passes over unchanged inputs compare equal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncResult {
    pub organization: OrgName,
    pub total_repos: usize,
    pub active_students: usize,
    pub matched: Vec<MatchedPair>,
    pub unmatched: Vec<UnmatchedRepo>,
    pub unlinked_students: Vec<UnlinkedStudent>,
    pub notes: Vec<MatchNote>,
}

impl SyncResult {
    /// Percentage of active students with a matched repository.
    pub fn acceptance_rate(&self) -> f64 {
        if self.active_students == 0 {
            return 0.0;
        }
        (self.matched.len() as f64 / self.active_students as f64) * 100.0
    }
}

/// A write needed to bring a roster record's link up to date.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkUpdate {
    pub email: Email,
    pub repository_url: String,
}

/// What a sync pass found, and what it needs to write.
#[derive(Debug, Clone, PartialEq)]
pub struct SyncPlan {
    pub result: SyncResult,
    /// Only records whose stored link differs from the matched URL.
    pub link_updates: Vec<LinkUpdate>,
}

// ---------------------------------------------------------------------------
// Matching
// ---------------------------------------------------------------------------

/// Matches handles against the organization's active roster records.
pub fn plan_sync(
    organization: &OrgName,
    handles: &[RepoHandle],
    records: &[RosterRecord],
) -> SyncPlan {
    let mut active: Vec<&RosterRecord> = records
        .iter()
        .filter(|r| &r.organization == organization && r.is_active())
        .collect();
    active.sort_by(|a, b| a.email.cmp(&b.email));

    let mut lookup: BTreeMap<String, Vec<&RosterRecord>> = BTreeMap::new();
    for &record in &active {
        if let Some(username) = &record.github_username {
            lookup.entry(username.lookup_key()).or_default().push(record);
        }
    }

    let mut ordered: Vec<&RepoHandle> = handles.iter().collect();
    ordered.sort_by(|a, b| a.repository.cmp(&b.repository));

    let mut matched = Vec::new();
    let mut unmatched = Vec::new();
    let mut notes = Vec::new();
    let mut link_updates = Vec::new();
    let mut claimed: BTreeMap<Email, RepositoryId> = BTreeMap::new();

    for handle in ordered {
        let unmatched_with = |reason| UnmatchedRepo {
            repository: handle.repository.clone(),
            url: handle.url.clone(),
            student_token: handle.student_token.clone(),
            reason,
        };

        if !handle.parsable {
            notes.push(MatchNote::Unparsable {
                repository: handle.repository.clone(),
            });
            unmatched.push(unmatched_with(UnmatchReason::Unparsable));
            continue;
        }

        let candidates = lookup
            .get(&handle.student_token.to_lowercase())
            .map(Vec::as_slice)
            .unwrap_or_default();

        match candidates {
            [] => {
                tracing::debug!(
                    repository = %handle.repository,
                    token = %handle.student_token,
                    "No roster entry for student token"
                );
                unmatched.push(unmatched_with(UnmatchReason::NoRosterEntry));
            }
            [record] => {
                if let Some(kept) = claimed.get(&record.email) {
                    notes.push(MatchNote::DuplicateHandle {
                        email: record.email.clone(),
                        kept: kept.clone(),
                        ignored: handle.repository.clone(),
                    });
                    unmatched.push(unmatched_with(UnmatchReason::DuplicateHandle));
                    continue;
                }
                claimed.insert(record.email.clone(), handle.repository.clone());
                if record.repository_url.as_deref() != Some(handle.url.as_str()) {
                    link_updates.push(LinkUpdate {
                        email: record.email.clone(),
                        repository_url: handle.url.clone(),
                    });
                }
                matched.push(MatchedPair {
                    repository: handle.repository.clone(),
                    url: handle.url.clone(),
                    student_token: handle.student_token.clone(),
                    email: record.email.clone(),
                    name: record.name.clone(),
                });
            }
            many => {
                tracing::warn!(
                    repository = %handle.repository,
                    token = %handle.student_token,
                    candidates = many.len(),
                    "Several roster records share one GitHub login"
                );
                notes.push(MatchNote::AmbiguousUsername {
                    token: handle.student_token.clone(),
                    repository: handle.repository.clone(),
                    candidates: many.iter().map(|r| r.email.clone()).collect(),
                });
                unmatched.push(unmatched_with(UnmatchReason::AmbiguousUsername));
            }
        }
    }

    let linked: BTreeSet<&Email> = claimed.keys().collect();
    let unlinked_students = active
        .iter()
        .filter(|r| !linked.contains(&r.email))
        .map(|r| UnlinkedStudent {
            email: r.email.clone(),
            name: r.name.clone(),
            github_username: r.github_username.clone(),
        })
        .collect();

    SyncPlan {
        result: SyncResult {
            organization: organization.clone(),
            total_repos: handles.len(),
            active_students: active.len(),
            matched,
            unmatched,
            unlinked_students,
            notes,
        },
        link_updates,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{AssignmentPrefix, RepositoryResolver};

    fn org() -> OrgName {
        OrgName::new("x-org").unwrap()
    }

    fn student(email: &str, username: Option<&str>) -> RosterRecord {
        let record = RosterRecord::new(Email::new(email).unwrap(), email, org());
        match username {
            Some(u) => record.with_username(GithubUsername::new(u).unwrap()),
            None => record,
        }
    }

    fn handle(name: &str) -> RepoHandle {
        RepositoryResolver::new(org(), AssignmentPrefix::new("hw1").unwrap())
            .resolve_identifier(name)
            .unwrap()
    }

    #[test]
    fn matches_case_insensitively() {
        let roster = vec![student("a@x.com", Some("alice"))];
        let plan = plan_sync(&org(), &[handle("hw1-Alice")], &roster);

        assert_eq!(plan.result.matched.len(), 1);
        assert_eq!(plan.result.unmatched.len(), 0);
        assert!(plan.result.unlinked_students.is_empty());
        assert_eq!(plan.result.matched[0].email.as_str(), "a@x.com");
        assert_eq!(plan.link_updates.len(), 1);
    }

    #[test]
    fn reports_unlinked_students() {
        let roster = vec![
            student("a@x.com", Some("alice")),
            student("b@x.com", Some("bob")),
        ];
        let plan = plan_sync(&org(), &[handle("hw1-alice")], &roster);

        assert_eq!(plan.result.matched.len(), 1);
        let unlinked: Vec<&str> = plan
            .result
            .unlinked_students
            .iter()
            .map(|s| s.email.as_str())
            .collect();
        assert_eq!(unlinked, vec!["b@x.com"]);
        assert!((plan.result.acceptance_rate() - 50.0).abs() < f64::EPSILON);
    }

    #[test]
    fn unknown_and_unparsable_handles_are_unmatched() {
        let roster = vec![student("a@x.com", Some("alice"))];
        let handles = [handle("hw1-zed"), handle("syllabus")];
        let plan = plan_sync(&org(), &handles, &roster);

        assert_eq!(plan.result.matched.len(), 0);
        assert_eq!(plan.result.total_repos, 2);
        let reasons: Vec<UnmatchReason> =
            plan.result.unmatched.iter().map(|u| u.reason).collect();
        assert_eq!(
            reasons,
            vec![UnmatchReason::NoRosterEntry, UnmatchReason::Unparsable]
        );
        assert!(plan.link_updates.is_empty());
    }

    #[test]
    fn ambiguous_usernames_are_reported_not_resolved() {
        let roster = vec![
            student("a1@x.com", Some("alice")),
            student("a2@x.com", Some("ALICE")),
        ];
        let plan = plan_sync(&org(), &[handle("hw1-alice")], &roster);

        assert!(plan.result.matched.is_empty());
        assert_eq!(
            plan.result.unmatched[0].reason,
            UnmatchReason::AmbiguousUsername
        );
        match &plan.result.notes[0] {
            MatchNote::AmbiguousUsername { candidates, .. } => {
                assert_eq!(candidates.len(), 2);
            }
            other => panic!("unexpected note {other:?}"),
        }
        assert_eq!(plan.result.unlinked_students.len(), 2);
    }

    #[test]
    fn inactive_and_foreign_records_are_ignored() {
        let other = OrgName::new("other-org").unwrap();
        let mut foreign = student("c@x.com", Some("carol"));
        foreign.organization = other;
        let roster = vec![
            student("a@x.com", Some("alice")).with_status(StudentStatus::Dropped),
            foreign,
        ];
        let plan = plan_sync(&org(), &[handle("hw1-alice"), handle("hw1-carol")], &roster);

        assert!(plan.result.matched.is_empty());
        assert_eq!(plan.result.active_students, 0);
        assert!(plan.result.unlinked_students.is_empty());
    }

    #[test]
    fn current_links_are_not_rewritten() {
        let mut record = student("a@x.com", Some("alice"));
        record.repository_url = Some("https://github.com/x-org/hw1-alice".into());
        let plan = plan_sync(&org(), &[handle("hw1-alice")], &[record]);

        assert_eq!(plan.result.matched.len(), 1);
        assert!(plan.link_updates.is_empty());
    }

    #[test]
    fn second_repository_for_same_student_is_a_duplicate() {
        let roster = vec![student("a@x.com", Some("alice"))];
        let plan = plan_sync(&org(), &[handle("hw1-hw1-alice"), handle("hw1-alice")], &roster);

        assert_eq!(plan.result.matched.len(), 1);
        assert_eq!(plan.result.matched[0].repository.name().as_str(), "hw1-alice");
        assert_eq!(
            plan.result.unmatched[0].reason,
            UnmatchReason::DuplicateHandle
        );
    }

    #[test]
    fn result_is_independent_of_input_order() {
        let roster = vec![
            student("b@x.com", Some("bob")),
            student("a@x.com", Some("alice")),
        ];
        let forward = plan_sync(&org(), &[handle("hw1-alice"), handle("hw1-bob")], &roster);
        let reverse = plan_sync(&org(), &[handle("hw1-bob"), handle("hw1-alice")], &roster);
        assert_eq!(forward.result, reverse.result);
    }
}
