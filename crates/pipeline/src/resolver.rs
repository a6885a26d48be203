//! Repository Resolver: turns discovered identifiers into [`RepoHandle`]s.
//!
//! Student repositories created by GitHub Classroom are named
//! `{prefix}-{token}`, where the token is normally the student's GitHub login.
//! The token is the suffix after the *last* occurrence of `{prefix}-`, so
//! prefixes that themselves contain dashes (`hw-1`) resolve correctly.
//!
//! A repository whose name does not contain the prefix still yields a handle,
//! flagged unparsable with an empty token. Such handles are reported but never
//! fed into roster matching.

use serde::{Deserialize, Serialize};

use crate::{ApiError, AssignmentPrefix, OrgName, RemoteRepository, RepoName, RepositoryId};

/// A resolved student repository.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepoHandle {
    /// Organization the repository belongs to.
    pub organization: OrgName,
    /// Assignment prefix the repository was resolved against.
    pub assignment_prefix: AssignmentPrefix,
    /// `owner/name` identifier.
    pub repository: RepositoryId,
    /// Extracted student token. Empty when the name did not follow the
    /// `{prefix}-{token}` pattern.
    pub student_token: String,
    /// Canonical `https://github.com/{owner}/{name}` URL.
    pub url: String,
    /// `false` when no token could be extracted.
    pub parsable: bool,
}

impl RepoHandle {
    /// Returns the repository name.
    pub fn name(&self) -> &RepoName {
        self.repository.name()
    }
}

/// Resolves raw repository identifiers for one organization and assignment.
#[derive(Debug, Clone)]
pub struct RepositoryResolver {
    organization: OrgName,
    prefix: AssignmentPrefix,
}

impl RepositoryResolver {
    pub fn new(organization: OrgName, prefix: AssignmentPrefix) -> Self {
        Self {
            organization,
            prefix,
        }
    }

    pub fn organization(&self) -> &OrgName {
        &self.organization
    }

    pub fn prefix(&self) -> &AssignmentPrefix {
        &self.prefix
    }

    fn marker(&self) -> String {
        format!("{}-", self.prefix)
    }

    /// Returns `true` if `repo_name` starts with `{prefix}-`, ignoring case.
    ///
    /// `hw10-alice` does not belong to `hw1`, nor does `old-hw1-alice`.
    pub fn belongs_to_assignment(&self, repo_name: &str) -> bool {
        repo_name
            .to_ascii_lowercase()
            .starts_with(&self.marker().to_ascii_lowercase())
    }

    /// Extracts the student token from a repository name.
    ///
    /// The prefix is matched ignoring ASCII case; the token keeps its original
    /// spelling. Returns `None` when the name does not contain `{prefix}-` or
    /// nothing follows it.
    pub fn extract_token(&self, repo_name: &str) -> Option<String> {
        let marker = self.marker().to_ascii_lowercase();
        // ASCII lowercasing keeps byte offsets aligned with `repo_name`.
        let start = repo_name.to_ascii_lowercase().rfind(&marker)? + marker.len();
        let token = &repo_name[start..];
        if token.is_empty() {
            None
        } else {
            Some(token.to_string())
        }
    }

    /// Builds a handle for a repository identifier.
    pub fn resolve(&self, repository: RepositoryId) -> RepoHandle {
        let token = self.extract_token(repository.name().as_str());
        if token.is_none() {
            tracing::debug!(
                repository = %repository,
                prefix = %self.prefix,
                "Repository name does not follow the assignment pattern"
            );
        }
        RepoHandle {
            organization: repository.owner().clone(),
            assignment_prefix: self.prefix.clone(),
            url: repository.html_url(),
            parsable: token.is_some(),
            student_token: token.unwrap_or_default(),
            repository,
        }
    }

    /// Builds a handle from an organization listing record.
    pub fn resolve_record(&self, record: &RemoteRepository) -> RepoHandle {
        self.resolve(record.id.clone())
    }

    /// Builds a handle from a raw identifier.
    ///
    /// Accepted forms: `https://github.com/owner/name[.git]`,
    /// `git@github.com:owner/name[.git]`, `owner/name`, or a bare `name`
    /// (resolved against the configured organization).
    ///
    /// # Errors
    ///
    /// Returns a [`crate::ErrorKind::ValidationError`] for empty or malformed
    /// identifiers.
    pub fn resolve_identifier(&self, raw: &str) -> Result<RepoHandle, ApiError> {
        let trimmed = raw.trim().trim_end_matches('/');
        if trimmed.is_empty() {
            return Err(ApiError::validation("empty repository identifier"));
        }

        let path = if let Some(rest) = trimmed
            .strip_prefix("https://github.com/")
            .or_else(|| trimmed.strip_prefix("http://github.com/"))
            .or_else(|| trimmed.strip_prefix("git@github.com:"))
        {
            rest.trim_end_matches(".git")
        } else if trimmed.contains("://") || trimmed.contains('@') {
            return Err(ApiError::validation(format!(
                "not a GitHub repository URL: '{raw}'"
            )));
        } else {
            trimmed
        };

        let repository = if path.contains('/') {
            RepositoryId::parse(path)
        } else {
            RepoName::new(path).map(|name| RepositoryId::new(self.organization.clone(), name))
        }
        .ok_or_else(|| ApiError::validation(format!("malformed repository identifier: '{raw}'")))?;

        Ok(self.resolve(repository))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ErrorKind;

    fn resolver(prefix: &str) -> RepositoryResolver {
        RepositoryResolver::new(
            OrgName::new("test-org").unwrap(),
            AssignmentPrefix::new(prefix).unwrap(),
        )
    }

    #[test]
    fn extracts_suffix_after_prefix() {
        let r = resolver("python-basics");
        assert_eq!(
            r.extract_token("python-basics-johndoe").as_deref(),
            Some("johndoe")
        );
    }

    #[test]
    fn uses_last_occurrence_of_prefix() {
        let r = resolver("hw");
        assert_eq!(r.extract_token("hw-hw-alice").as_deref(), Some("alice"));
    }

    #[test]
    fn missing_prefix_yields_no_token() {
        let r = resolver("python-basics");
        assert_eq!(r.extract_token("unrelated-repo"), None);
        assert_eq!(r.extract_token("python-basics-"), None);
    }

    #[test]
    fn unparsable_handle_is_flagged_with_empty_token() {
        let r = resolver("python-basics");
        let handle = r.resolve(RepositoryId::parse("test-org/course-notes").unwrap());
        assert!(!handle.parsable);
        assert_eq!(handle.student_token, "");
        assert_eq!(handle.url, "https://github.com/test-org/course-notes");
    }

    #[test]
    fn resolves_urls_and_short_forms() {
        let r = resolver("hw1");
        for raw in [
            "https://github.com/test-org/hw1-alice",
            "https://github.com/test-org/hw1-alice.git",
            "git@github.com:test-org/hw1-alice.git",
            "test-org/hw1-alice",
            "hw1-alice",
        ] {
            let handle = r.resolve_identifier(raw).unwrap();
            assert_eq!(handle.repository.to_string(), "test-org/hw1-alice", "{raw}");
            assert_eq!(handle.student_token, "alice", "{raw}");
            assert!(handle.parsable);
        }
    }

    #[test]
    fn malformed_identifiers_are_validation_errors() {
        let r = resolver("hw1");
        for raw in ["", "   ", "https://gitlab.com/org/hw1-alice", "a/b/c"] {
            let err = r.resolve_identifier(raw).unwrap_err();
            assert_eq!(err.kind, ErrorKind::ValidationError, "{raw}");
        }
    }

    #[test]
    fn assignment_membership_requires_leading_prefix_and_dash() {
        let r = resolver("hw1");
        assert!(r.belongs_to_assignment("hw1-alice"));
        assert!(r.belongs_to_assignment("HW1-alice"));
        assert!(!r.belongs_to_assignment("hw1_alice"));
        assert!(!r.belongs_to_assignment("hw1.alice"));
        assert!(!r.belongs_to_assignment("hw1"));
        assert!(!r.belongs_to_assignment("hw10-alice"));
        assert!(!r.belongs_to_assignment("old-hw1-alice"));
    }

    #[test]
    fn prefix_case_does_not_hide_the_token() {
        let r = resolver("hw1");
        let handle = r.resolve(RepositoryId::parse("test-org/HW1-Alice").unwrap());
        assert!(r.belongs_to_assignment(handle.name().as_str()));
        assert!(handle.parsable);
        assert_eq!(handle.student_token, "Alice");

        let upper = resolver("HW1");
        assert_eq!(upper.extract_token("hw1-bob").as_deref(), Some("bob"));
    }
}
