//! Shared fixture: every component wired to one in-memory store and a
//! recording notifier.

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use chrono::{TimeZone, Utc};
use deadman_core::types::{DbId, Timestamp};
use deadman_db::models::channel::{Channel, CreateChannel};
use deadman_db::models::check::{Check, CreateCheck};
use deadman_db::{MemoryStore, Store};
use deadman_events::{Dispatcher, RecordingNotifier};
use deadman_worker::{CheckAdmin, KeyedLocks, LogQuery, PingIngestor, SweepScheduler};
use tokio_util::sync::CancellationToken;

pub const PROJECT: DbId = 1;
pub const OTHER_PROJECT: DbId = 2;
pub const RETENTION: i64 = 100;

pub fn t0() -> Timestamp {
    Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap()
}

pub fn at(secs: i64) -> Timestamp {
    t0() + chrono::Duration::seconds(secs)
}

pub struct Harness {
    pub store: Arc<MemoryStore>,
    pub notifier: Arc<RecordingNotifier>,
    pub dispatcher: Arc<Dispatcher>,
    pub locks: Arc<KeyedLocks>,
    pub ingestor: PingIngestor,
    pub sweeper: SweepScheduler,
    pub log: LogQuery,
    pub admin: CheckAdmin,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_notifier(RecordingNotifier::new())
    }

    pub fn with_notifier(notifier: RecordingNotifier) -> Self {
        let store = Arc::new(MemoryStore::new());
        let notifier = Arc::new(notifier);
        let locks = Arc::new(KeyedLocks::new());
        let dispatcher = Arc::new(Dispatcher::new(
            store.clone(),
            notifier.clone(),
            Duration::from_secs(5),
            CancellationToken::new(),
        ));
        Self {
            ingestor: PingIngestor::new(store.clone(), dispatcher.clone(), locks.clone(), RETENTION),
            sweeper: SweepScheduler::new(
                store.clone(),
                dispatcher.clone(),
                locks.clone(),
                Duration::from_secs(2),
                4,
            ),
            log: LogQuery::new(store.clone(), RETENTION),
            admin: CheckAdmin::new(store.clone(), locks.clone()),
            store,
            notifier,
            dispatcher,
            locks,
        }
    }

    /// A second sweeper sharing the store but not the locks, standing in
    /// for another worker process.
    pub fn foreign_sweeper(&self) -> SweepScheduler {
        SweepScheduler::new(
            self.store.clone(),
            self.dispatcher.clone(),
            Arc::new(KeyedLocks::new()),
            Duration::from_secs(2),
            4,
        )
    }

    /// Interval check with the given timeout and grace, in seconds.
    pub async fn interval_check(&self, timeout_secs: i64, grace_secs: i64) -> Check {
        self.admin
            .create_check(
                &CreateCheck::interval(PROJECT, "backup", timeout_secs, grace_secs),
                t0(),
            )
            .await
            .unwrap()
    }

    pub async fn channel(&self, check: &Check, kind: &str, notify_up: bool, notify_down: bool) -> Channel {
        let channel = self
            .admin
            .create_channel(
                &CreateChannel {
                    project_id: PROJECT,
                    kind: kind.to_string(),
                    value: format!("{kind}-target"),
                    notify_up,
                    notify_down,
                },
                t0(),
            )
            .await
            .unwrap();
        self.admin
            .subscribe(PROJECT, &check.code.to_string(), &channel)
            .await
            .unwrap();
        channel
    }

    pub async fn status(&self, check: &Check) -> String {
        self.store
            .find_check(check.id)
            .await
            .unwrap()
            .unwrap()
            .status
    }
}
