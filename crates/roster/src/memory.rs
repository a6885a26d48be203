//! In-memory roster store.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use pipeline::{Email, GithubUsername, OrgName, RosterRecord, RosterStore, RosterStoreError};
use tokio::sync::{Mutex, RwLock};

/// Roster store backed by a map keyed by email.
///
/// Each record sits behind its own lock, so concurrent writes to different
/// students proceed in parallel while writes to one student are serialized.
#[derive(Debug, Default)]
pub struct InMemoryRosterStore {
    records: RwLock<BTreeMap<Email, Arc<Mutex<RosterRecord>>>>,
}

impl InMemoryRosterStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_records(records: impl IntoIterator<Item = RosterRecord>) -> Self {
        let map = records
            .into_iter()
            .map(|r| (r.email.clone(), Arc::new(Mutex::new(r))))
            .collect();
        Self {
            records: RwLock::new(map),
        }
    }

    /// Copy of every record, sorted by email.
    pub async fn snapshot(&self) -> Vec<RosterRecord> {
        let map = self.records.read().await;
        let mut out = Vec::with_capacity(map.len());
        for record in map.values() {
            out.push(record.lock().await.clone());
        }
        out
    }

    pub async fn get(&self, email: &Email) -> Option<RosterRecord> {
        let entry = self.records.read().await.get(email).cloned()?;
        let record = entry.lock().await.clone();
        Some(record)
    }
}

#[async_trait]
impl RosterStore for InMemoryRosterStore {
    async fn find_by_username(
        &self,
        org: &OrgName,
        username: &GithubUsername,
    ) -> Result<Option<RosterRecord>, RosterStoreError> {
        let wanted = username.lookup_key();
        let mut matches = self
            .list_by_org(org)
            .await?
            .into_iter()
            .filter(|r| {
                r.github_username
                    .as_ref()
                    .is_some_and(|u| u.lookup_key() == wanted)
            });
        let first = matches.next();
        if first.is_some() && matches.next().is_some() {
            tracing::warn!(
                organization = %org,
                username = %username,
                "Several roster records share this login; returning the first by email"
            );
        }
        Ok(first)
    }

    async fn list_by_org(&self, org: &OrgName) -> Result<Vec<RosterRecord>, RosterStoreError> {
        Ok(self
            .snapshot()
            .await
            .into_iter()
            .filter(|r| &r.organization == org)
            .collect())
    }

    async fn update_link(&self, email: &Email, repository_url: &str) -> Result<(), RosterStoreError> {
        let entry = self
            .records
            .read()
            .await
            .get(email)
            .cloned()
            .ok_or_else(|| RosterStoreError::NotFound {
                email: email.clone(),
            })?;
        let mut record = entry.lock().await;
        record.repository_url = Some(repository_url.to_string());
        tracing::debug!(email = %email, repository_url, "Roster link updated");
        Ok(())
    }

    async fn upsert(&self, record: RosterRecord) -> Result<(), RosterStoreError> {
        let mut map = self.records.write().await;
        match map.get(&record.email) {
            Some(existing) => *existing.lock().await = record,
            None => {
                map.insert(record.email.clone(), Arc::new(Mutex::new(record)));
            }
        }
        Ok(())
    }
}
