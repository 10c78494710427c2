//! Turns flips into notifications.
//!
//! For each channel that wants a flip's direction the [`Dispatcher`] first
//! records a `pending` notification, which fails when one already exists
//! for the same flip and channel. Only once every notification is recorded
//! does delivery start, and only after that is the flip marked processed.
//! A flip left unprocessed by an error or a crash is picked up again by
//! [`Dispatcher::process_pending_flips`]. Every notification ends up
//! `sent`, `failed` or `cancelled`.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use deadman_core::channels::notify_direction;
use deadman_core::status::CheckStatus;
use deadman_core::types::{DbId, Timestamp};
use deadman_db::models::channel::Channel;
use deadman_db::models::check::Check;
use deadman_db::models::flip::Flip;
use deadman_db::models::notification::{NewNotification, Notification, NotificationStatus};
use deadman_db::{Store, StoreError};
use futures::future::join_all;
use tokio_util::sync::CancellationToken;

use crate::notifier::{DeliveryError, Notifier};

/// Error text written to notifications abandoned on shutdown.
pub const CANCELLED_ERROR: &str = "cancelled";

/// Result of delivering one flip to one channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeliveryOutcome {
    Sent { channel_id: DbId },
    Failed { channel_id: DbId, error: String },
    Cancelled { channel_id: DbId },
    /// A notification for this flip and channel already existed.
    AlreadySent { channel_id: DbId },
}

impl DeliveryOutcome {
    pub fn channel_id(&self) -> DbId {
        match self {
            DeliveryOutcome::Sent { channel_id }
            | DeliveryOutcome::Failed { channel_id, .. }
            | DeliveryOutcome::Cancelled { channel_id }
            | DeliveryOutcome::AlreadySent { channel_id } => *channel_id,
        }
    }
}

pub struct Dispatcher {
    store: Arc<dyn Store>,
    notifier: Arc<dyn Notifier>,
    delivery_timeout: Duration,
    cancel: CancellationToken,
    /// Source of `finished_at`. Deliveries can outlast the `now` they were
    /// started with, so completion is stamped when it happens.
    clock: fn() -> Timestamp,
}

impl Dispatcher {
    pub fn new(
        store: Arc<dyn Store>,
        notifier: Arc<dyn Notifier>,
        delivery_timeout: Duration,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            store,
            notifier,
            delivery_timeout,
            cancel,
            clock: Utc::now,
        }
    }

    /// Replace the clock used to stamp finished notifications.
    pub fn with_clock(mut self, clock: fn() -> Timestamp) -> Self {
        self.clock = clock;
        self
    }

    /// Dispatch a committed flip, then mark it processed.
    ///
    /// The flip stays unprocessed when recording its notifications fails,
    /// so a later [`process_pending_flips`](Self::process_pending_flips)
    /// finishes the job.
    pub async fn claim_and_dispatch(
        &self,
        check: &Check,
        flip: &Flip,
        now: Timestamp,
    ) -> Result<Vec<DeliveryOutcome>, StoreError> {
        let outcomes = self.dispatch(check, flip, now).await?;
        if !self.store.claim_flip(flip.id, now).await? {
            tracing::debug!(flip_id = flip.id, "Flip already claimed");
        }
        Ok(outcomes)
    }

    /// Deliver a flip to every subscribed channel that wants it, without
    /// marking it processed.
    ///
    /// All pending notifications are recorded before the first delivery.
    /// Channels are then delivered concurrently; a failing channel never
    /// stops the others and its error is recorded on its notification.
    /// When recording fails partway, the notifications already recorded
    /// are still delivered and the error is returned.
    pub async fn dispatch(
        &self,
        check: &Check,
        flip: &Flip,
        now: Timestamp,
    ) -> Result<Vec<DeliveryOutcome>, StoreError> {
        let previous = flip.old_status()?;
        let current = flip.new_status()?;
        let Some(direction) = notify_direction(previous, current) else {
            return Ok(Vec::new());
        };

        let channels: Vec<Channel> = self
            .store
            .channels_for_check(check.id)
            .await?
            .into_iter()
            .filter(|channel| channel.preferences().wants(direction))
            .collect();

        tracing::debug!(
            check_id = check.id,
            flip_id = flip.id,
            from = %previous,
            to = %current,
            channels = channels.len(),
            "Dispatching flip"
        );

        let mut recorded = Vec::with_capacity(channels.len());
        let mut failure = None;
        for channel in &channels {
            let input = NewNotification {
                check_id: check.id,
                channel_id: channel.id,
                flip_id: flip.id,
                check_status: current,
                created_at: now,
            };
            match self.store.create_notification(&input).await {
                Ok(notification) => recorded.push((channel, notification)),
                Err(e) => {
                    tracing::error!(
                        check_id = check.id,
                        flip_id = flip.id,
                        channel_id = channel.id,
                        error = %e,
                        "Failed to record notification"
                    );
                    failure = Some(e);
                    break;
                }
            }
        }

        let deliveries = recorded
            .into_iter()
            .map(|(channel, notification)| async move {
                match notification {
                    Some(notification) => {
                        self.deliver_one(channel, check, &notification, current).await
                    }
                    None => DeliveryOutcome::AlreadySent {
                        channel_id: channel.id,
                    },
                }
            });
        let outcomes = join_all(deliveries).await;

        match failure {
            Some(e) => Err(e),
            None => Ok(outcomes),
        }
    }

    /// Dispatch flips that were committed but never marked processed.
    ///
    /// A flip that fails is logged and left for the next pass; the rest of
    /// the batch still runs. Returns the number of flips completed.
    pub async fn process_pending_flips(
        &self,
        limit: i64,
        now: Timestamp,
    ) -> Result<usize, StoreError> {
        let mut completed = 0;
        for flip in self.store.list_unprocessed_flips(limit).await? {
            let check = match self.store.find_check(flip.check_id).await {
                Ok(Some(check)) if !check.is_deleted() => check,
                Ok(_) => {
                    tracing::debug!(
                        flip_id = flip.id,
                        check_id = flip.check_id,
                        "Dropping flip of deleted check"
                    );
                    if let Err(e) = self.store.claim_flip(flip.id, now).await {
                        tracing::error!(flip_id = flip.id, error = %e, "Failed to drop flip");
                    }
                    continue;
                }
                Err(e) => {
                    tracing::error!(flip_id = flip.id, error = %e, "Failed to load flip's check");
                    continue;
                }
            };

            match self.claim_and_dispatch(&check, &flip, now).await {
                Ok(_) => completed += 1,
                Err(e) => {
                    tracing::error!(
                        flip_id = flip.id,
                        check_id = check.id,
                        error = %e,
                        "Pending flip dispatch failed"
                    );
                }
            }
        }

        if completed > 0 {
            tracing::info!(completed, "Dispatched pending flips");
        }
        Ok(completed)
    }

    /// Fail notifications left `pending` for longer than `ttl`, e.g. by a
    /// process that crashed mid-delivery.
    pub async fn resolve_stale(&self, ttl: Duration, now: Timestamp) -> Result<u64, StoreError> {
        let ttl = chrono::Duration::from_std(ttl).unwrap_or(chrono::Duration::MAX);
        let cutoff = now.checked_sub_signed(ttl).unwrap_or(chrono::DateTime::<Utc>::MIN_UTC);
        let resolved = self.store.fail_stale_notifications(cutoff, now).await?;
        if resolved > 0 {
            tracing::warn!(resolved, "Resolved stale pending notifications");
        }
        Ok(resolved)
    }

    async fn deliver_one(
        &self,
        channel: &Channel,
        check: &Check,
        notification: &Notification,
        status: CheckStatus,
    ) -> DeliveryOutcome {
        let channel_id = channel.id;
        let send = tokio::time::timeout(
            self.delivery_timeout,
            self.notifier.send(channel, check, status),
        );

        let (status, error, outcome) = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => (
                NotificationStatus::Cancelled,
                Some(CANCELLED_ERROR.to_string()),
                DeliveryOutcome::Cancelled { channel_id },
            ),
            result = send => {
                let result = result
                    .unwrap_or(Err(DeliveryError::Timeout(self.delivery_timeout)));
                match result {
                    Ok(()) => (
                        NotificationStatus::Sent,
                        None,
                        DeliveryOutcome::Sent { channel_id },
                    ),
                    Err(e) => {
                        tracing::warn!(
                            check_id = check.id,
                            channel_id,
                            kind = %channel.kind,
                            error = %e,
                            "Notification delivery failed"
                        );
                        let error = e.to_string();
                        (
                            NotificationStatus::Failed,
                            Some(error.clone()),
                            DeliveryOutcome::Failed { channel_id, error },
                        )
                    }
                }
            }
        };

        self.finish(notification, status, error.as_deref()).await;
        outcome
    }

    /// Record a delivery result. A row that cannot be finished stays
    /// `pending` until [`resolve_stale`](Self::resolve_stale) fails it.
    async fn finish(
        &self,
        notification: &Notification,
        status: NotificationStatus,
        error: Option<&str>,
    ) {
        if let Err(e) = self
            .store
            .finish_notification(notification.id, status, error, (self.clock)())
            .await
        {
            tracing::error!(
                notification_id = notification.id,
                status = %status,
                error = %e,
                "Failed to record delivery result"
            );
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;
    use chrono::TimeZone;
    use deadman_core::log_events::SortOrder;
    use deadman_db::models::channel::CreateChannel;
    use deadman_db::models::check::{CreateCheck, StateUpdate};
    use deadman_db::models::flip::NewFlip;
    use deadman_db::models::ping::Ping;
    use deadman_db::{CheckCommit, Committed, EventWindow, MemoryStore};
    use uuid::Uuid;

    use super::*;
    use crate::notifier::RecordingNotifier;

    fn t0() -> Timestamp {
        Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap()
    }

    struct Fixture {
        store: Arc<MemoryStore>,
        check: Check,
        channels: Vec<Channel>,
    }

    /// A check with one channel per `(kind, notify_up, notify_down)`.
    async fn fixture(channels: &[(&str, bool, bool)]) -> Fixture {
        let store = Arc::new(MemoryStore::new());
        let check = store
            .create_check(&CreateCheck::interval(1, "backup", 300, 60), Uuid::new_v4(), t0())
            .await
            .unwrap();
        let mut created = Vec::new();
        for (kind, notify_up, notify_down) in channels {
            let channel = store
                .create_channel(
                    &CreateChannel {
                        project_id: 1,
                        kind: kind.to_string(),
                        value: format!("{kind}-target"),
                        notify_up: *notify_up,
                        notify_down: *notify_down,
                    },
                    Uuid::new_v4(),
                    t0(),
                )
                .await
                .unwrap();
            store.subscribe(check.id, channel.id).await.unwrap();
            created.push(channel);
        }
        Fixture {
            store,
            check,
            channels: created,
        }
    }

    async fn flip(fx: &Fixture, old: CheckStatus, new: CheckStatus) -> Flip {
        let check = fx.store.find_check(fx.check.id).await.unwrap().unwrap();
        fx.store
            .commit(&CheckCommit {
                check_id: check.id,
                expected_version: check.version,
                state: StateUpdate {
                    status: new,
                    last_ping: check.last_ping,
                    last_start: None,
                    last_duration_ms: None,
                    n_pings: check.n_pings,
                },
                ping: None,
                flip: Some(NewFlip {
                    created_at: t0(),
                    old_status: old,
                    new_status: new,
                }),
            })
            .await
            .unwrap()
            .unwrap()
            .flip
            .unwrap()
    }

    fn dispatcher(fx: &Fixture, notifier: Arc<RecordingNotifier>) -> Dispatcher {
        Dispatcher::new(
            fx.store.clone(),
            notifier,
            Duration::from_secs(5),
            CancellationToken::new(),
        )
    }

    #[tokio::test]
    async fn down_flip_reaches_down_subscribers_only() {
        let fx = fixture(&[("webhook", true, true), ("email", true, false)]).await;
        let notifier = Arc::new(RecordingNotifier::new());
        let dispatcher = dispatcher(&fx, notifier.clone());

        let flip = flip(&fx, CheckStatus::Grace, CheckStatus::Down).await;
        let outcomes = dispatcher.dispatch(&fx.check, &flip, t0()).await.unwrap();

        assert_eq!(
            outcomes,
            vec![DeliveryOutcome::Sent {
                channel_id: fx.channels[0].id
            }]
        );
        let sent = notifier.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].status, CheckStatus::Down);
    }

    #[tokio::test]
    async fn grace_flip_is_silent() {
        let fx = fixture(&[("webhook", true, true)]).await;
        let notifier = Arc::new(RecordingNotifier::new());
        let dispatcher = dispatcher(&fx, notifier.clone());

        let flip = flip(&fx, CheckStatus::Up, CheckStatus::Grace).await;
        assert!(dispatcher.dispatch(&fx.check, &flip, t0()).await.unwrap().is_empty());
        assert!(fx.store.all_notifications().await.is_empty());
    }

    #[tokio::test]
    async fn repeated_dispatch_sends_at_most_once() {
        let fx = fixture(&[("webhook", true, true), ("email", true, true)]).await;
        let notifier = Arc::new(RecordingNotifier::new());
        let dispatcher = dispatcher(&fx, notifier.clone());
        let flip = flip(&fx, CheckStatus::Up, CheckStatus::Down).await;

        dispatcher.dispatch(&fx.check, &flip, t0()).await.unwrap();
        let again = dispatcher.dispatch(&fx.check, &flip, t0()).await.unwrap();

        assert!(again
            .iter()
            .all(|o| matches!(o, DeliveryOutcome::AlreadySent { .. })));
        assert_eq!(notifier.sent().len(), 2);
        assert_eq!(fx.store.all_notifications().await.len(), 2);
    }

    #[tokio::test]
    async fn claimed_flip_is_not_dispatched_twice() {
        let fx = fixture(&[("webhook", true, true)]).await;
        let notifier = Arc::new(RecordingNotifier::new());
        let dispatcher = dispatcher(&fx, notifier.clone());
        let flip = flip(&fx, CheckStatus::Up, CheckStatus::Down).await;

        let first = dispatcher.claim_and_dispatch(&fx.check, &flip, t0()).await.unwrap();
        let second = dispatcher.claim_and_dispatch(&fx.check, &flip, t0()).await.unwrap();
        assert_matches!(first.as_slice(), [DeliveryOutcome::Sent { .. }]);
        assert_matches!(second.as_slice(), [DeliveryOutcome::AlreadySent { .. }]);
        assert_eq!(dispatcher.process_pending_flips(10, t0()).await.unwrap(), 0);
        assert_eq!(notifier.sent().len(), 1);
    }

    #[tokio::test]
    async fn finished_at_comes_from_the_clock() {
        fn an_hour_later() -> Timestamp {
            t0() + chrono::Duration::hours(1)
        }

        let fx = fixture(&[("webhook", true, true)]).await;
        let dispatcher =
            dispatcher(&fx, Arc::new(RecordingNotifier::new())).with_clock(an_hour_later);
        let flip = flip(&fx, CheckStatus::Up, CheckStatus::Down).await;

        dispatcher.dispatch(&fx.check, &flip, t0()).await.unwrap();

        let notification = &fx.store.all_notifications().await[0];
        assert_eq!(notification.created_at, t0());
        assert_eq!(notification.finished_at, Some(an_hour_later()));
    }

    #[tokio::test]
    async fn flip_stays_pending_until_every_notification_is_recorded() {
        let fx = fixture(&[("webhook", true, true), ("email", true, true)]).await;
        let store = Arc::new(FailingStore::new(fx.store.clone()));
        let notifier = Arc::new(RecordingNotifier::new());
        let dispatcher = Dispatcher::new(
            store.clone(),
            notifier.clone(),
            Duration::from_secs(5),
            CancellationToken::new(),
        );
        let flip = flip(&fx, CheckStatus::Up, CheckStatus::Down).await;

        // The second insert fails: the first channel is still delivered and
        // the flip is left for recovery.
        store.allow_inserts(1);
        assert_matches!(
            dispatcher.claim_and_dispatch(&fx.check, &flip, t0()).await,
            Err(StoreError::Corrupt(_))
        );
        assert_eq!(notifier.sent().len(), 1);
        assert_eq!(fx.store.list_unprocessed_flips(10).await.unwrap().len(), 1);

        store.allow_inserts(usize::MAX);
        assert_eq!(dispatcher.process_pending_flips(10, t0()).await.unwrap(), 1);

        assert_eq!(notifier.sent().len(), 2);
        let notifications = fx.store.all_notifications().await;
        assert_eq!(notifications.len(), 2);
        assert!(notifications.iter().all(|n| n.status == "sent"));
        assert!(fx.store.list_unprocessed_flips(10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn failing_flip_does_not_stop_the_recovery_batch() {
        let fx = fixture(&[("webhook", true, true)]).await;
        let store = Arc::new(FailingStore::new(fx.store.clone()));
        let notifier = Arc::new(RecordingNotifier::new());
        let dispatcher = Dispatcher::new(
            store.clone(),
            notifier.clone(),
            Duration::from_secs(5),
            CancellationToken::new(),
        );
        flip(&fx, CheckStatus::Up, CheckStatus::Down).await;
        flip(&fx, CheckStatus::Down, CheckStatus::Up).await;

        store.allow_inserts(1);
        assert_eq!(dispatcher.process_pending_flips(10, t0()).await.unwrap(), 1);
        assert_eq!(notifier.sent().len(), 1);
        assert_eq!(fx.store.list_unprocessed_flips(10).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn failing_channel_does_not_block_others() {
        let fx = fixture(&[("email", true, true), ("webhook", true, true)]).await;
        let notifier = Arc::new(RecordingNotifier::failing(&["email"]));
        let dispatcher = dispatcher(&fx, notifier.clone());
        let flip = flip(&fx, CheckStatus::Up, CheckStatus::Down).await;

        let outcomes = dispatcher.dispatch(&fx.check, &flip, t0()).await.unwrap();

        assert_matches!(&outcomes[0], DeliveryOutcome::Failed { .. });
        assert_matches!(&outcomes[1], DeliveryOutcome::Sent { .. });

        let notifications = fx.store.all_notifications().await;
        let failed = notifications
            .iter()
            .find(|n| n.channel_id == fx.channels[0].id)
            .unwrap();
        assert_eq!(failed.status, "failed");
        assert!(failed.error.as_deref().unwrap().contains("email"));
    }

    #[tokio::test]
    async fn slow_delivery_times_out_as_failed() {
        let fx = fixture(&[("webhook", true, true)]).await;
        let dispatcher = Dispatcher::new(
            fx.store.clone(),
            Arc::new(RecordingNotifier::slow(Duration::from_secs(30))),
            Duration::from_millis(50),
            CancellationToken::new(),
        );
        let flip = flip(&fx, CheckStatus::Up, CheckStatus::Down).await;

        let outcomes = dispatcher.dispatch(&fx.check, &flip, t0()).await.unwrap();
        assert_matches!(
            &outcomes[0],
            DeliveryOutcome::Failed { error, .. } if error.contains("timed out")
        );
        assert_eq!(fx.store.all_notifications().await[0].status, "failed");
    }

    #[tokio::test]
    async fn cancellation_marks_in_flight_notifications_cancelled() {
        let fx = fixture(&[("webhook", true, true)]).await;
        let cancel = CancellationToken::new();
        let dispatcher = Dispatcher::new(
            fx.store.clone(),
            Arc::new(RecordingNotifier::slow(Duration::from_secs(30))),
            Duration::from_secs(60),
            cancel.clone(),
        );
        let flip = flip(&fx, CheckStatus::Up, CheckStatus::Down).await;

        let canceller = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            cancel.cancel();
        });
        let outcomes = dispatcher.dispatch(&fx.check, &flip, t0()).await.unwrap();
        canceller.await.unwrap();

        assert_matches!(&outcomes[0], DeliveryOutcome::Cancelled { .. });
        let notification = &fx.store.all_notifications().await[0];
        assert_eq!(notification.status, "cancelled");
        assert_eq!(notification.error.as_deref(), Some(CANCELLED_ERROR));
    }

    #[tokio::test]
    async fn pending_flips_are_picked_up() {
        let fx = fixture(&[("webhook", true, true)]).await;
        let notifier = Arc::new(RecordingNotifier::new());
        let dispatcher = dispatcher(&fx, notifier.clone());
        flip(&fx, CheckStatus::New, CheckStatus::Up).await;
        flip(&fx, CheckStatus::Up, CheckStatus::Down).await;

        assert_eq!(dispatcher.process_pending_flips(10, t0()).await.unwrap(), 2);
        assert_eq!(notifier.sent().len(), 1);
        assert_eq!(dispatcher.process_pending_flips(10, t0()).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn stale_pending_notifications_are_resolved() {
        let fx = fixture(&[("webhook", true, true)]).await;
        let dispatcher = dispatcher(&fx, Arc::new(RecordingNotifier::new()));
        let flip = flip(&fx, CheckStatus::Up, CheckStatus::Down).await;
        fx.store
            .create_notification(&NewNotification {
                check_id: fx.check.id,
                channel_id: fx.channels[0].id,
                flip_id: flip.id,
                check_status: CheckStatus::Down,
                created_at: t0(),
            })
            .await
            .unwrap();

        let later = t0() + chrono::Duration::minutes(15);
        let resolved = dispatcher
            .resolve_stale(Duration::from_secs(600), later)
            .await
            .unwrap();
        assert_eq!(resolved, 1);
        assert_eq!(fx.store.all_notifications().await[0].status, "failed");
    }

    // -----------------------------------------------------------------------
    // Failing store
    // -----------------------------------------------------------------------

    /// Delegates to a [`MemoryStore`] but refuses notification inserts once
    /// its allowance is spent.
    struct FailingStore {
        inner: Arc<MemoryStore>,
        inserts_left: AtomicUsize,
    }

    impl FailingStore {
        fn new(inner: Arc<MemoryStore>) -> Self {
            Self {
                inner,
                inserts_left: AtomicUsize::new(usize::MAX),
            }
        }

        fn allow_inserts(&self, n: usize) {
            self.inserts_left.store(n, Ordering::SeqCst);
        }
    }

    #[async_trait]
    impl Store for FailingStore {
        async fn create_check(
            &self,
            input: &CreateCheck,
            code: Uuid,
            now: Timestamp,
        ) -> Result<Check, StoreError> {
            self.inner.create_check(input, code, now).await
        }

        async fn find_check(&self, id: DbId) -> Result<Option<Check>, StoreError> {
            self.inner.find_check(id).await
        }

        async fn find_check_by_code(&self, code: Uuid) -> Result<Option<Check>, StoreError> {
            self.inner.find_check_by_code(code).await
        }

        async fn list_sweepable_checks(&self) -> Result<Vec<Check>, StoreError> {
            self.inner.list_sweepable_checks().await
        }

        async fn soft_delete_check(&self, id: DbId, now: Timestamp) -> Result<bool, StoreError> {
            self.inner.soft_delete_check(id, now).await
        }

        async fn commit(&self, commit: &CheckCommit) -> Result<Option<Committed>, StoreError> {
            self.inner.commit(commit).await
        }

        async fn prune_pings(&self, check_id: DbId, min_n: i64) -> Result<u64, StoreError> {
            self.inner.prune_pings(check_id, min_n).await
        }

        async fn list_pings(
            &self,
            check_id: DbId,
            min_n: i64,
            after: Option<Timestamp>,
            order: SortOrder,
            limit: i64,
        ) -> Result<Vec<Ping>, StoreError> {
            self.inner.list_pings(check_id, min_n, after, order, limit).await
        }

        async fn oldest_ping_created_at(
            &self,
            check_id: DbId,
            min_n: i64,
        ) -> Result<Option<Timestamp>, StoreError> {
            self.inner.oldest_ping_created_at(check_id, min_n).await
        }

        async fn list_flips(
            &self,
            check_id: DbId,
            window: EventWindow,
            order: SortOrder,
            limit: i64,
        ) -> Result<Vec<Flip>, StoreError> {
            self.inner.list_flips(check_id, window, order, limit).await
        }

        async fn claim_flip(&self, flip_id: DbId, now: Timestamp) -> Result<bool, StoreError> {
            self.inner.claim_flip(flip_id, now).await
        }

        async fn list_unprocessed_flips(&self, limit: i64) -> Result<Vec<Flip>, StoreError> {
            self.inner.list_unprocessed_flips(limit).await
        }

        async fn create_channel(
            &self,
            input: &CreateChannel,
            code: Uuid,
            now: Timestamp,
        ) -> Result<Channel, StoreError> {
            self.inner.create_channel(input, code, now).await
        }

        async fn subscribe(&self, check_id: DbId, channel_id: DbId) -> Result<(), StoreError> {
            self.inner.subscribe(check_id, channel_id).await
        }

        async fn channels_for_check(&self, check_id: DbId) -> Result<Vec<Channel>, StoreError> {
            self.inner.channels_for_check(check_id).await
        }

        async fn list_channels(&self, project_id: DbId) -> Result<Vec<Channel>, StoreError> {
            self.inner.list_channels(project_id).await
        }

        async fn create_notification(
            &self,
            input: &NewNotification,
        ) -> Result<Option<Notification>, StoreError> {
            if self
                .inserts_left
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_err()
            {
                return Err(StoreError::Corrupt("connection reset".to_string()));
            }
            self.inner.create_notification(input).await
        }

        async fn finish_notification(
            &self,
            id: DbId,
            status: NotificationStatus,
            error: Option<&str>,
            now: Timestamp,
        ) -> Result<bool, StoreError> {
            self.inner.finish_notification(id, status, error, now).await
        }

        async fn list_notifications(
            &self,
            check_id: DbId,
            window: EventWindow,
            order: SortOrder,
            limit: i64,
        ) -> Result<Vec<Notification>, StoreError> {
            self.inner.list_notifications(check_id, window, order, limit).await
        }

        async fn fail_stale_notifications(
            &self,
            created_before: Timestamp,
            now: Timestamp,
        ) -> Result<u64, StoreError> {
            self.inner.fail_stale_notifications(created_before, now).await
        }
    }
}
