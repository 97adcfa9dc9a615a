//! Activity recording.
//!
//! Writes are best effort: a failed append is logged and counted, never
//! returned to the caller, so an audit outage cannot undo the business
//! operation that triggered it.

use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::models::{Activity, ActivityKind};
use crate::services::ServiceError;
use crate::store::ActivityStore;

#[derive(Clone)]
pub struct ActivityLog {
    store: Arc<dyn ActivityStore>,
    failed_writes: Arc<AtomicU64>,
}

impl ActivityLog {
    pub fn new(store: Arc<dyn ActivityStore>) -> Self {
        Self {
            store,
            failed_writes: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Append one activity.
    pub async fn record<P>(&self, actor_email: &str, kind: ActivityKind, payload: &P)
    where
        P: Serialize + Sync + ?Sized,
    {
        let activity = match Activity::new(actor_email, kind, payload) {
            Ok(activity) => activity,
            Err(e) => {
                self.report_failure(actor_email, kind, &anyhow::Error::from(e));
                return;
            }
        };

        let activity_id = activity.id;
        match self.store.append(activity).await {
            Ok(()) => {
                tracing::debug!(
                    activity_id = %activity_id,
                    kind = kind.as_str(),
                    "Activity recorded"
                );
            }
            Err(e) => self.report_failure(actor_email, kind, &anyhow::Error::from(e)),
        }
    }

    fn report_failure(&self, actor_email: &str, kind: ActivityKind, error: &anyhow::Error) {
        self.failed_writes.fetch_add(1, Ordering::Relaxed);
        tracing::error!(
            error = %error,
            actor = %actor_email,
            kind = kind.as_str(),
            "Failed to record activity"
        );
    }

    /// Appends that were dropped since startup.
    pub fn failed_writes(&self) -> u64 {
        self.failed_writes.load(Ordering::Relaxed)
    }

    /// Everything recorded for an actor, newest first.
    pub async fn read_all(&self, actor_email: &str) -> Result<Vec<Activity>, ServiceError> {
        self.store.list_for_actor(actor_email).await
    }

    pub async fn read_page(
        &self,
        actor_email: &str,
        offset: usize,
        limit: usize,
    ) -> Result<Vec<Activity>, ServiceError> {
        Ok(self
            .read_all(actor_email)
            .await?
            .into_iter()
            .skip(offset)
            .take(limit)
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::SessionPayload;
    use crate::store::InMemoryActivityStore;
    use async_trait::async_trait;
    use uuid::Uuid;

    struct BrokenStore;

    #[async_trait]
    impl ActivityStore for BrokenStore {
        async fn append(&self, _activity: Activity) -> Result<(), ServiceError> {
            Err(ServiceError::Internal(anyhow::anyhow!("disk full")))
        }

        async fn list_for_actor(&self, _actor_email: &str) -> Result<Vec<Activity>, ServiceError> {
            Ok(Vec::new())
        }
    }

    fn payload(sequence_id: u64) -> SessionPayload {
        SessionPayload {
            session_id: Uuid::new_v4(),
            sequence_id,
        }
    }

    #[tokio::test]
    async fn test_store_failure_is_counted_not_raised() {
        let log = ActivityLog::new(Arc::new(BrokenStore));
        log.record("a@example.com", ActivityKind::UserLogin, &payload(1))
            .await;
        assert_eq!(log.failed_writes(), 1);
    }

    #[tokio::test]
    async fn test_read_all_is_newest_first_and_pages() {
        let log = ActivityLog::new(Arc::new(InMemoryActivityStore::default()));
        for seq in 1..=5 {
            log.record("a@example.com", ActivityKind::UserLogin, &payload(seq))
                .await;
        }

        let all = log.read_all("A@example.com").await.unwrap();
        assert_eq!(all.len(), 5);
        let newest: SessionPayload = all[0].payload_as().unwrap();
        assert_eq!(newest.sequence_id, 5);

        let page = log.read_page("a@example.com", 1, 2).await.unwrap();
        let seqs: Vec<u64> = page
            .iter()
            .map(|a| a.payload_as::<SessionPayload>().unwrap().sequence_id)
            .collect();
        assert_eq!(seqs, vec![4, 3]);
        assert_eq!(log.failed_writes(), 0);
    }
}
