use std::sync::Arc;
use std::time::Duration;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use sqlx::PgPool;
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::metrics;
use crate::models::DeletionReason;
use crate::services::deletion::DeletionCoordinator;
use crate::services::media_store::MediaStore;

/// Process-scoped owner of the one-shot grace-delay deletion jobs. Created on
/// service init and shut down on exit; the handle is passed explicitly to
/// whatever needs to queue, cancel, or inspect jobs.
#[derive(Clone)]
pub struct DeletionScheduler {
    inner: Arc<Inner>,
}

struct Inner {
    db: PgPool,
    media: Arc<dyn MediaStore>,
    grace: Duration,
    pending: DashMap<Uuid, JoinHandle<()>>,
}

impl DeletionScheduler {
    pub fn new(db: PgPool, media: Arc<dyn MediaStore>, grace: Duration) -> Self {
        Self {
            inner: Arc::new(Inner {
                db,
                media,
                grace,
                pending: DashMap::new(),
            }),
        }
    }

    /// Queue a grace-delayed deletion for `message_id`. Returns false when a
    /// job is already pending, so duplicate completion detections collapse
    /// into a single job. If the sweeper (or anything else) deletes the
    /// message first, the job executes as a no-op.
    pub fn schedule(&self, message_id: Uuid) -> bool {
        match self.inner.pending.entry(message_id) {
            Entry::Occupied(_) => false,
            Entry::Vacant(slot) => {
                let inner = self.inner.clone();
                let handle = tokio::spawn(async move {
                    tokio::time::sleep(inner.grace).await;
                    let result = DeletionCoordinator::delete(
                        &inner.db,
                        &inner.media,
                        message_id,
                        DeletionReason::AllRecipientsReceived,
                    )
                    .await;
                    inner.pending.remove(&message_id);
                    if let Err(e) = result {
                        // the expiry sweeper is the backstop once the TTL elapses
                        tracing::warn!(%message_id, error = %e, "grace-delay deletion failed");
                    }
                });
                slot.insert(handle);
                metrics::record_deletion_scheduled();
                true
            }
        }
    }

    /// Abort a pending job. Purely an optimization: an un-cancelled job that
    /// loses the race no-ops on execution.
    pub fn cancel(&self, message_id: Uuid) -> bool {
        match self.inner.pending.remove(&message_id) {
            Some((_, handle)) => {
                handle.abort();
                true
            }
            None => false,
        }
    }

    pub fn pending_jobs(&self) -> usize {
        self.inner.pending.len()
    }

    /// Abort every pending job. Deletions lost here are re-discovered by the
    /// sweeper after the TTL.
    pub fn shutdown(&self) {
        self.inner.pending.retain(|_, handle| {
            handle.abort();
            false
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::media_store::NullMediaStore;
    use sqlx::postgres::PgPoolOptions;

    // A pool that points nowhere; scheduler bookkeeping never touches it until
    // a job actually fires.
    fn dead_pool() -> PgPool {
        PgPoolOptions::new()
            .acquire_timeout(Duration::from_millis(100))
            .connect_lazy("postgres://postgres@127.0.0.1:1/chat_service_test")
            .expect("lazy pool")
    }

    fn scheduler(grace: Duration) -> DeletionScheduler {
        DeletionScheduler::new(dead_pool(), Arc::new(NullMediaStore), grace)
    }

    #[tokio::test(start_paused = true)]
    async fn schedule_is_idempotent_while_pending() {
        let scheduler = scheduler(Duration::from_secs(30));
        let id = Uuid::new_v4();

        assert!(scheduler.schedule(id));
        assert!(!scheduler.schedule(id), "second detection must not queue a second job");
        assert_eq!(scheduler.pending_jobs(), 1);

        let other = Uuid::new_v4();
        assert!(scheduler.schedule(other), "jobs are per-message");
        assert_eq!(scheduler.pending_jobs(), 2);

        scheduler.shutdown();
        assert_eq!(scheduler.pending_jobs(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_frees_the_slot() {
        let scheduler = scheduler(Duration::from_secs(30));
        let id = Uuid::new_v4();

        assert!(scheduler.schedule(id));
        assert!(scheduler.cancel(id));
        assert!(!scheduler.cancel(id), "cancel of an absent job reports false");
        assert!(scheduler.schedule(id), "slot is reusable after cancel");

        scheduler.shutdown();
    }

    #[tokio::test]
    async fn fired_job_unregisters_itself() {
        let scheduler = scheduler(Duration::ZERO);
        let id = Uuid::new_v4();

        assert!(scheduler.schedule(id));
        // the job fires immediately, fails against the dead pool, and must
        // still clear its pending slot
        for _ in 0..200 {
            if scheduler.pending_jobs() == 0 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(scheduler.pending_jobs(), 0);
        assert!(scheduler.schedule(id), "slot is reusable after the job ran");
        scheduler.shutdown();
    }
}
