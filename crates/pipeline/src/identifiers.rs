//! Newtype domain identifiers.
//!
//! Every domain concept that has an identity is represented as a distinct newtype
//! wrapping a primitive. This prevents accidentally interchanging, for example,
//! an [`OrgName`] with a [`RepoName`] even though both are strings under the hood.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ---------------------------------------------------------------------------
// Macro for String-wrapped newtypes.
// Generates: struct, new() returning Option<Self>, as_str(), Display.
// ---------------------------------------------------------------------------
macro_rules! string_id {
    (
        $(#[$attr:meta])*
        $name:ident
    ) => {
        $(#[$attr])*
        #[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        pub struct $name(String);

        impl $name {
            /// Creates a new identifier, returning `None` if the value is empty
            /// or only whitespace.
            pub fn new(value: impl Into<String>) -> Option<Self> {
                let v = value.into();
                let trimmed = v.trim();
                if trimmed.is_empty() {
                    None
                } else {
                    Some(Self(trimmed.to_string()))
                }
            }

            /// Returns the identifier as a string slice.
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

// ---------------------------------------------------------------------------
// Identifiers — UUID-backed (internally generated)
// ---------------------------------------------------------------------------

/// Identifies a single orchestration run (one invocation of `orchestrate`).
///
/// Generated fresh for every CLI invocation; propagated through spans so all
/// activity from a single run can be correlated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RunId(Uuid);

impl RunId {
    /// Generates a new random run identifier.
    pub fn new_random() -> Self {
        Self(Uuid::new_v4())
    }

    /// Returns the underlying [`Uuid`].
    pub fn as_uuid(self) -> Uuid {
        self.0
    }
}

impl std::fmt::Display for RunId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// Identifiers — String-backed (GitHub names / configuration)
// ---------------------------------------------------------------------------

string_id! {
    /// A GitHub organization login (e.g. `"soc-cs3550-f25"`).
    ///
    /// Every roster record and every discovered repository belongs to exactly
    /// one organization.
    OrgName
}

string_id! {
    /// A repository name without its owner (e.g. `"python-basics-alice"`).
    RepoName
}

string_id! {
    /// The assignment prefix that student repositories are named after.
    ///
    /// Student repositories follow the `{prefix}-{token}` naming pattern.
    AssignmentPrefix
}

string_id! {
    /// A Git branch name (e.g. `"main"`).
    BranchName
}

string_id! {
    /// A Git commit SHA.
    CommitSha
}

string_id! {
    /// The name of a GitHub Actions repository secret.
    SecretName
}

string_id! {
    /// A GitHub user login.
    ///
    /// GitHub logins are case-insensitive; use [`GithubUsername::lookup_key`]
    /// when comparing.
    GithubUsername
}

impl GithubUsername {
    /// Returns the case-folded form used for matching.
    pub fn lookup_key(&self) -> String {
        self.0.to_lowercase()
    }
}

// ---------------------------------------------------------------------------

/// Identifies a GitHub repository in `"owner/repo"` form.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct RepositoryId {
    owner: OrgName,
    name: RepoName,
}

impl RepositoryId {
    /// Creates a repository identifier from its owner and name.
    pub fn new(owner: OrgName, name: RepoName) -> Self {
        Self { owner, name }
    }

    /// Parses an `"owner/repo"` string.
    ///
    /// Returns `None` unless the value contains exactly one `/` with non-empty
    /// segments on both sides.
    pub fn parse(value: &str) -> Option<Self> {
        let mut parts = value.trim().split('/');
        let owner = OrgName::new(parts.next()?)?;
        let name = RepoName::new(parts.next()?)?;
        if parts.next().is_some() {
            return None;
        }
        Some(Self { owner, name })
    }

    /// Returns the owning organization.
    pub fn owner(&self) -> &OrgName {
        &self.owner
    }

    /// Returns the repository name.
    pub fn name(&self) -> &RepoName {
        &self.name
    }

    /// Returns the canonical browser URL for this repository.
    pub fn html_url(&self) -> String {
        format!("https://github.com/{}/{}", self.owner, self.name)
    }
}

impl std::fmt::Display for RepositoryId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.owner, self.name)
    }
}

// ---------------------------------------------------------------------------

/// A student's email address, the unique roster key within an organization.
///
/// Stored lowercased and trimmed so lookups are insensitive to how the address
/// was typed into the roster.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Email(String);

impl Email {
    /// Creates a normalised email, returning `None` if the value is empty or
    /// has no `@`.
    pub fn new(value: impl Into<String>) -> Option<Self> {
        let v = value.into().trim().to_lowercase();
        match v.split_once('@') {
            Some((local, domain)) if !local.is_empty() && !domain.is_empty() => Some(Self(v)),
            _ => None,
        }
    }

    /// Returns the address as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for Email {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Email::new(value.clone()).ok_or_else(|| format!("invalid email address: '{value}'"))
    }
}

impl From<Email> for String {
    fn from(value: Email) -> Self {
        value.0
    }
}

impl std::fmt::Display for Email {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn string_ids_reject_blank_values() {
        assert!(OrgName::new("").is_none());
        assert!(OrgName::new("   ").is_none());
        assert_eq!(OrgName::new(" org ").unwrap().as_str(), "org");
    }

    #[test]
    fn repository_id_parses_owner_and_name() {
        let id = RepositoryId::parse("org/hw1-alice").unwrap();
        assert_eq!(id.owner().as_str(), "org");
        assert_eq!(id.name().as_str(), "hw1-alice");
        assert_eq!(id.to_string(), "org/hw1-alice");
        assert_eq!(id.html_url(), "https://github.com/org/hw1-alice");
    }

    #[test]
    fn repository_id_rejects_malformed_values() {
        assert!(RepositoryId::parse("org").is_none());
        assert!(RepositoryId::parse("org/").is_none());
        assert!(RepositoryId::parse("/repo").is_none());
        assert!(RepositoryId::parse("a/b/c").is_none());
    }

    #[test]
    fn email_is_normalised() {
        let email = Email::new("  Alice@Example.COM ").unwrap();
        assert_eq!(email.as_str(), "alice@example.com");
        assert!(Email::new("not-an-email").is_none());
        assert!(Email::new("@example.com").is_none());
    }

    #[test]
    fn username_lookup_key_is_case_folded() {
        let user = GithubUsername::new("Alice").unwrap();
        assert_eq!(user.as_str(), "Alice");
        assert_eq!(user.lookup_key(), "alice");
    }
}
