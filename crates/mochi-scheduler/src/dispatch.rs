use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use mochi_core::ScheduledEvent;
use tracing::{debug, warn};

use crate::error::SchedulerError;
use crate::store::ScheduleStore;

const REPOLL_CEILING: Duration = Duration::from_secs(60);

/// The app registry's dispatch seam, kept as a trait so the scheduler does
/// not depend directly on `mochi-registry`'s concrete type (mirrors the
/// kernel's generic-over-runtime shape).
#[async_trait]
pub trait ScheduleDispatcher: Send + Sync {
    /// Returns `true` if `(user, app, event)` still resolves to a live
    /// handler; the scheduler drops silently when it does not.
    async fn app_event_exists(&self, user: i64, app: &str, event: &str) -> bool;

    async fn dispatch_schedule(&self, event: &ScheduledEvent) -> Result<(), SchedulerError>;
}

/// Drives the dispatcher loop described in spec §4.3: poll `next()`, sleep
/// until due (re-targeting every 60s so external `create`s are noticed),
/// claim atomically, validate, invoke.
pub struct Scheduler<D: ScheduleDispatcher> {
    store: ScheduleStore,
    dispatcher: Arc<D>,
}

impl<D: ScheduleDispatcher> Scheduler<D> {
    pub fn new(store: ScheduleStore, dispatcher: Arc<D>) -> Self {
        Scheduler { store, dispatcher }
    }

    pub fn store(&self) -> &ScheduleStore {
        &self.store
    }

    /// Runs the dispatcher loop forever. Intended to be spawned as a
    /// background task for the process lifetime.
    pub async fn run(&self) {
        loop {
            match self.store.next().await {
                Ok(Some(event)) => self.wait_and_fire(event).await,
                Ok(None) => tokio::time::sleep(REPOLL_CEILING).await,
                Err(err) => {
                    warn!(error = %err, "scheduler poll failed, backing off");
                    tokio::time::sleep(REPOLL_CEILING).await;
                }
            }
        }
    }

    async fn wait_and_fire(&self, event: ScheduledEvent) {
        let now = now_unix();
        let remaining = event.due_unix - now;
        if remaining > REPOLL_CEILING.as_secs() as i64 {
            tokio::time::sleep(REPOLL_CEILING).await;
            return;
        }
        if remaining > 0 {
            tokio::time::sleep(Duration::from_secs(remaining as u64)).await;
        }

        match self.store.claim(&event).await {
            Ok(true) => self.fire(event).await,
            Ok(false) => debug!(id = %event.id, "lost claim race, another dispatcher fired this event"),
            Err(err) => warn!(error = %err, id = %event.id, "failed to claim due event"),
        }
    }

    async fn fire(&self, event: ScheduledEvent) {
        if !self
            .dispatcher
            .app_event_exists(event.user, &event.app, &event.event_name)
            .await
        {
            debug!(app = %event.app, event = %event.event_name, "dropping schedule for missing handler");
            return;
        }

        if let Err(err) = self.dispatcher.dispatch_schedule(&event).await {
            warn!(error = %err, id = %event.id, "scheduled dispatch failed");
        }
    }
}

fn now_unix() -> i64 {
    chrono::Utc::now().timestamp()
}

#[cfg(test)]
mod tests {
    use super::*;
    use mochi_store::{ensure_schema, ScheduleSchema, Store};
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingDispatcher {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl ScheduleDispatcher for CountingDispatcher {
        async fn app_event_exists(&self, _user: i64, _app: &str, _event: &str) -> bool {
            true
        }

        async fn dispatch_schedule(&self, _event: &ScheduledEvent) -> Result<(), SchedulerError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    #[tokio::test]
    async fn fire_invokes_dispatcher_once_for_a_one_shot_event() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(Store::open(&dir.path().join("schedule.db")).await.unwrap());
        ensure_schema(&store, &ScheduleSchema).await.unwrap();
        let schedule_store = ScheduleStore::new(store);
        let id = schedule_store
            .create(1, "auctions", now_unix() - 1, "tick", None, 0)
            .await
            .unwrap();
        let event = schedule_store.get(id).await.unwrap().unwrap();

        let dispatcher = Arc::new(CountingDispatcher {
            calls: AtomicUsize::new(0),
        });
        let scheduler = Scheduler::new(schedule_store, dispatcher.clone());

        scheduler.wait_and_fire(event).await;
        assert_eq!(dispatcher.calls.load(Ordering::SeqCst), 1);
        assert!(scheduler.store().next().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn missing_handler_drops_silently_without_dispatch() {
        struct NeverExists;

        #[async_trait]
        impl ScheduleDispatcher for NeverExists {
            async fn app_event_exists(&self, _user: i64, _app: &str, _event: &str) -> bool {
                false
            }
            async fn dispatch_schedule(&self, _event: &ScheduledEvent) -> Result<(), SchedulerError> {
                panic!("must not be called when the handler does not exist");
            }
        }

        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(Store::open(&dir.path().join("schedule.db")).await.unwrap());
        ensure_schema(&store, &ScheduleSchema).await.unwrap();
        let schedule_store = ScheduleStore::new(store);
        let id = schedule_store
            .create(1, "gone", now_unix() - 1, "tick", None, 0)
            .await
            .unwrap();
        let event = schedule_store.get(id).await.unwrap().unwrap();

        let scheduler = Scheduler::new(schedule_store, Arc::new(NeverExists));
        scheduler.wait_and_fire(event).await;
    }
}
