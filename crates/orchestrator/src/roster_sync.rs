//! Roster Sync Engine driver.
//!
//! Matching itself is pure ([`pipeline::plan_sync`]); this module loads the
//! records, applies the planned link writes through the store with bounded
//! concurrency, and reports what was written.

use std::sync::Arc;

use pipeline::{
    plan_sync, ClassifiedError, ErrorKind, OrgName, RepoHandle, RosterStore, RosterStoreError,
    SyncResult,
};
use serde::Serialize;

use crate::abort::AbortSignal;
use crate::pool::{for_each_bounded, WorkOutcome};

/// A sync pass together with the store writes it caused.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RosterSyncOutcome {
    pub result: SyncResult,
    /// Links written to the store. Zero when previewing.
    pub links_written: usize,
    /// Links that differ from the store and would be written.
    pub links_pending: usize,
    /// Writes that failed.
    pub link_failures: Vec<ClassifiedError>,
}

pub struct RosterSynchronizer {
    store: Arc<dyn RosterStore>,
    parallelism: usize,
    abort: AbortSignal,
}

impl RosterSynchronizer {
    pub fn new(store: Arc<dyn RosterStore>, parallelism: usize, abort: AbortSignal) -> Self {
        Self {
            store,
            parallelism,
            abort,
        }
    }

    /// Matches `handles` against the active roster of `org` and records each
    /// new link.
    ///
    /// Running it again over unchanged inputs returns an identical
    /// [`SyncResult`] and writes nothing.
    ///
    /// # Errors
    ///
    /// Fails only if the roster cannot be read. Individual write failures are
    /// reported in [`RosterSyncOutcome::link_failures`].
    pub async fn sync(
        &self,
        org: &OrgName,
        handles: &[RepoHandle],
        preview: bool,
    ) -> Result<RosterSyncOutcome, RosterStoreError> {
        let records = self.store.list_by_org(org).await?;
        let plan = plan_sync(org, handles, &records);
        let links_pending = plan.link_updates.len();

        tracing::info!(
            organization = %org,
            total_repos = plan.result.total_repos,
            matched = plan.result.matched.len(),
            unmatched = plan.result.unmatched.len(),
            unlinked = plan.result.unlinked_students.len(),
            links_pending,
            preview,
            "Roster matching complete"
        );
        for note in &plan.result.notes {
            tracing::warn!(?note, "Roster match note");
        }

        if preview || plan.link_updates.is_empty() {
            return Ok(RosterSyncOutcome {
                result: plan.result,
                links_written: 0,
                links_pending,
                link_failures: Vec::new(),
            });
        }

        let store = Arc::clone(&self.store);
        let writes = for_each_bounded(plan.link_updates, self.parallelism, &self.abort, move |update| {
            let store = Arc::clone(&store);
            async move { store.update_link(&update.email, &update.repository_url).await }
        })
        .await;

        let mut links_written = 0;
        let mut link_failures = Vec::new();
        for (update, outcome) in writes {
            let message = match outcome {
                WorkOutcome::Completed(Ok(())) => {
                    links_written += 1;
                    continue;
                }
                WorkOutcome::Completed(Err(err)) => err.to_string(),
                WorkOutcome::Crashed(message) => message,
                WorkOutcome::NotDispatched => "not attempted: run aborted".to_string(),
            };
            tracing::warn!(email = %update.email, %message, "Roster link write failed");
            link_failures.push(ClassifiedError {
                operation: "update_link".to_string(),
                target: Some(update.email.to_string()),
                kind: ErrorKind::PermanentApi,
                last_kind: None,
                attempts: 1,
                message,
            });
        }

        Ok(RosterSyncOutcome {
            result: plan.result,
            links_written,
            links_pending: links_pending - links_written,
            link_failures,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use pipeline::{
        AssignmentPrefix, Email, GithubUsername, RepositoryId, RepositoryResolver, RosterRecord,
    };
    use std::sync::Mutex;

    /// Minimal store; the real ones live in the `roster` crate.
    #[derive(Default)]
    struct VecStore {
        records: Mutex<Vec<RosterRecord>>,
        writes: Mutex<usize>,
    }

    #[async_trait]
    impl RosterStore for VecStore {
        async fn find_by_username(
            &self,
            org: &OrgName,
            username: &GithubUsername,
        ) -> Result<Option<RosterRecord>, RosterStoreError> {
            Ok(self.records.lock().unwrap().iter().find(|r| {
                &r.organization == org
                    && r.github_username.as_ref().map(|u| u.lookup_key())
                        == Some(username.lookup_key())
            }).cloned())
        }

        async fn list_by_org(&self, org: &OrgName) -> Result<Vec<RosterRecord>, RosterStoreError> {
            let mut records: Vec<_> = self
                .records
                .lock()
                .unwrap()
                .iter()
                .filter(|r| &r.organization == org)
                .cloned()
                .collect();
            records.sort_by(|a, b| a.email.cmp(&b.email));
            Ok(records)
        }

        async fn update_link(&self, email: &Email, url: &str) -> Result<(), RosterStoreError> {
            let mut records = self.records.lock().unwrap();
            let record = records
                .iter_mut()
                .find(|r| &r.email == email)
                .ok_or_else(|| RosterStoreError::NotFound { email: email.clone() })?;
            record.repository_url = Some(url.to_string());
            *self.writes.lock().unwrap() += 1;
            Ok(())
        }

        async fn upsert(&self, record: RosterRecord) -> Result<(), RosterStoreError> {
            self.records.lock().unwrap().push(record);
            Ok(())
        }
    }

    fn org() -> OrgName {
        OrgName::new("org").unwrap()
    }

    fn fixture() -> (Arc<VecStore>, Vec<RepoHandle>) {
        let store = Arc::new(VecStore::default());
        for (email, login) in [("alice@uni.edu", "Alice"), ("bob@uni.edu", "bob")] {
            store.records.lock().unwrap().push(
                RosterRecord::new(Email::new(email).unwrap(), email, org())
                    .with_username(GithubUsername::new(login).unwrap()),
            );
        }
        let resolver = RepositoryResolver::new(org(), AssignmentPrefix::new("hw1").unwrap());
        let handles = ["org/hw1-alice", "org/hw1-carol"]
            .into_iter()
            .map(|id| resolver.resolve(RepositoryId::parse(id).unwrap()))
            .collect();
        (store, handles)
    }

    #[tokio::test]
    async fn second_pass_is_identical_and_writes_nothing() {
        let (store, handles) = fixture();
        let sync = RosterSynchronizer::new(store.clone(), 4, AbortSignal::new());

        let first = sync.sync(&org(), &handles, false).await.unwrap();
        assert_eq!(first.links_written, 1);
        assert_eq!(first.result.matched.len(), 1);
        assert_eq!(first.result.unlinked_students.len(), 1);

        let second = sync.sync(&org(), &handles, false).await.unwrap();
        assert_eq!(second.result, first.result);
        assert_eq!(second.links_written, 0);
        assert_eq!(*store.writes.lock().unwrap(), 1);
    }

    #[tokio::test]
    async fn preview_reports_pending_links_without_writing() {
        let (store, handles) = fixture();
        let sync = RosterSynchronizer::new(store.clone(), 4, AbortSignal::new());

        let outcome = sync.sync(&org(), &handles, true).await.unwrap();
        assert_eq!(outcome.links_pending, 1);
        assert_eq!(outcome.links_written, 0);
        assert_eq!(*store.writes.lock().unwrap(), 0);
    }
}
