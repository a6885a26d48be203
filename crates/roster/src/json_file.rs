//! Roster store persisted as a JSON document.
//!
//! ```json
//! { "students": [ { "email": "...", "name": "...", "organization": "...", ... } ] }
//! ```
//!
//! The whole document is rewritten after every change, through a temporary
//! file and a rename, so a crash never leaves a half-written roster.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use pipeline::{Email, GithubUsername, OrgName, RosterRecord, RosterStore, RosterStoreError};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use crate::memory::InMemoryRosterStore;

#[derive(Debug, Default, Serialize, Deserialize)]
struct RosterDocument {
    #[serde(default)]
    students: Vec<RosterRecord>,
}

fn storage_error(path: &Path, action: &str, err: impl std::fmt::Display) -> RosterStoreError {
    RosterStoreError::Storage {
        message: format!("failed to {action} '{}': {err}", path.display()),
    }
}

/// File-backed roster store.
#[derive(Debug)]
pub struct JsonFileRosterStore {
    path: PathBuf,
    records: InMemoryRosterStore,
    persist_lock: Mutex<()>,
}

impl JsonFileRosterStore {
    /// Loads the roster at `path`. A missing file is an empty roster; it is
    /// created on the first write.
    ///
    /// # Errors
    ///
    /// [`RosterStoreError::Storage`] if the file exists but cannot be read or
    /// parsed.
    pub async fn open(path: impl Into<PathBuf>) -> Result<Self, RosterStoreError> {
        let path = path.into();
        let document = match tokio::fs::read_to_string(&path).await {
            Ok(text) => serde_json::from_str::<RosterDocument>(&text)
                .map_err(|e| storage_error(&path, "parse", e))?,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                tracing::info!(path = %path.display(), "Roster file not found; starting empty");
                RosterDocument::default()
            }
            Err(err) => return Err(storage_error(&path, "read", err)),
        };
        tracing::debug!(
            path = %path.display(),
            students = document.students.len(),
            "Roster loaded"
        );
        Ok(Self {
            records: InMemoryRosterStore::with_records(document.students),
            path,
            persist_lock: Mutex::new(()),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn persist(&self) -> Result<(), RosterStoreError> {
        let _guard = self.persist_lock.lock().await;
        let document = RosterDocument {
            students: self.records.snapshot().await,
        };
        let text = serde_json::to_string_pretty(&document)
            .map_err(|e| storage_error(&self.path, "serialize", e))?;

        let tmp = self.path.with_extension("json.tmp");
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| storage_error(parent, "create directory", e))?;
        }
        tokio::fs::write(&tmp, text)
            .await
            .map_err(|e| storage_error(&tmp, "write", e))?;
        tokio::fs::rename(&tmp, &self.path)
            .await
            .map_err(|e| storage_error(&self.path, "replace", e))?;
        Ok(())
    }
}

#[async_trait]
impl RosterStore for JsonFileRosterStore {
    async fn find_by_username(
        &self,
        org: &OrgName,
        username: &GithubUsername,
    ) -> Result<Option<RosterRecord>, RosterStoreError> {
        self.records.find_by_username(org, username).await
    }

    async fn list_by_org(&self, org: &OrgName) -> Result<Vec<RosterRecord>, RosterStoreError> {
        self.records.list_by_org(org).await
    }

    async fn update_link(&self, email: &Email, repository_url: &str) -> Result<(), RosterStoreError> {
        self.records.update_link(email, repository_url).await?;
        self.persist().await
    }

    async fn upsert(&self, record: RosterRecord) -> Result<(), RosterStoreError> {
        self.records.upsert(record).await?;
        self.persist().await
    }
}
