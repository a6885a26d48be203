//! Wire shapes of the GitHub REST responses and requests used here.

use serde::{Deserialize, Serialize};

#[derive(Debug, Deserialize)]
pub(crate) struct Owner {
    pub login: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct Repository {
    pub name: String,
    pub owner: Owner,
    pub html_url: String,
    #[serde(default)]
    pub archived: bool,
    #[serde(default)]
    pub is_template: bool,
    #[serde(default)]
    pub default_branch: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct Commit {
    pub sha: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct Branch {
    pub name: String,
    pub commit: Commit,
}

#[derive(Debug, Serialize)]
pub(crate) struct MergeUpstreamRequest<'a> {
    pub branch: &'a str,
}

#[derive(Debug, Deserialize)]
pub(crate) struct MergeUpstreamResponse {
    #[serde(default)]
    pub merge_type: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct SecretEntry {
    pub name: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct SecretList {
    #[serde(default)]
    pub total_count: usize,
    #[serde(default)]
    pub secrets: Vec<SecretEntry>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct PublicKey {
    pub key_id: String,
    pub key: String,
}

#[derive(Debug, Serialize)]
pub(crate) struct PutSecretRequest<'a> {
    pub encrypted_value: &'a str,
    pub key_id: &'a str,
}

#[derive(Debug, Deserialize)]
pub(crate) struct Invitation {
    pub id: u64,
    pub invitee: Option<Owner>,
}

#[derive(Debug, Serialize)]
pub(crate) struct InviteRequest<'a> {
    pub permission: &'a str,
}
