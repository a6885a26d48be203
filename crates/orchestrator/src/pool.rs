//! Bounded worker pool for per-repository work.

use std::future::Future;
use std::sync::Arc;

use tokio::sync::Semaphore;

use crate::abort::AbortSignal;

/// What happened to one work item.
#[derive(Debug, Clone, PartialEq)]
pub enum WorkOutcome<T> {
    Completed(T),
    /// The run was aborted before the item was dispatched.
    NotDispatched,
    /// The worker task panicked.
    Crashed(String),
}

impl<T> WorkOutcome<T> {
    pub fn completed(self) -> Option<T> {
        match self {
            WorkOutcome::Completed(value) => Some(value),
            _ => None,
        }
    }
}

/// Runs `work` on every item with at most `parallelism` items in flight.
///
/// Results come back in input order. Once `abort` is raised no further item
/// is dispatched; items already running finish normally.
pub async fn for_each_bounded<I, T, F, Fut>(
    items: Vec<I>,
    parallelism: usize,
    abort: &AbortSignal,
    work: F,
) -> Vec<(I, WorkOutcome<T>)>
where
    I: Clone + Send + 'static,
    T: Send + 'static,
    F: Fn(I) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = T> + Send + 'static,
{
    let semaphore = Arc::new(Semaphore::new(parallelism.max(1)));
    let work = Arc::new(work);
    let mut handles = Vec::with_capacity(items.len());

    for item in &items {
        if abort.is_raised() {
            break;
        }
        let Ok(permit) = Arc::clone(&semaphore).acquire_owned().await else {
            break;
        };
        if abort.is_raised() {
            break;
        }
        let work = Arc::clone(&work);
        let item = item.clone();
        handles.push(tokio::spawn(async move {
            let _permit = permit;
            work(item).await
        }));
    }

    let dispatched = handles.len();
    if dispatched < items.len() {
        tracing::warn!(
            dispatched,
            skipped = items.len() - dispatched,
            "Run aborted; remaining work items were not dispatched"
        );
    }

    let mut outcomes = Vec::with_capacity(items.len());
    for handle in handles {
        let outcome = match handle.await {
            Ok(value) => WorkOutcome::Completed(value),
            Err(err) => {
                tracing::error!(error = %err, "Worker task failed");
                WorkOutcome::Crashed(err.to_string())
            }
        };
        outcomes.push(outcome);
    }
    outcomes.resize_with(items.len(), || WorkOutcome::NotDispatched);

    items.into_iter().zip(outcomes).collect()
}
