//! Postgres-backed [`Store`].

use async_trait::async_trait;
use deadman_core::log_events::SortOrder;
use deadman_core::types::{DbId, Timestamp};
use uuid::Uuid;

use crate::models::channel::{Channel, CreateChannel};
use crate::models::check::{Check, CreateCheck};
use crate::models::flip::Flip;
use crate::models::notification::{NewNotification, Notification, NotificationStatus};
use crate::models::ping::Ping;
use crate::repositories::{ChannelRepo, CheckRepo, FlipRepo, NotificationRepo, PingRepo};
use crate::store::{
    CheckCommit, Committed, EventWindow, Store, StoreError, STALE_NOTIFICATION_ERROR,
};
use crate::DbPool;

#[derive(Clone)]
pub struct PgStore {
    pool: DbPool,
}

impl PgStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &DbPool {
        &self.pool
    }
}

#[async_trait]
impl Store for PgStore {
    async fn create_check(
        &self,
        input: &CreateCheck,
        code: Uuid,
        now: Timestamp,
    ) -> Result<Check, StoreError> {
        Ok(CheckRepo::create(&self.pool, input, code, now).await?)
    }

    async fn find_check(&self, id: DbId) -> Result<Option<Check>, StoreError> {
        Ok(CheckRepo::find_by_id(&self.pool, id).await?)
    }

    async fn find_check_by_code(&self, code: Uuid) -> Result<Option<Check>, StoreError> {
        Ok(CheckRepo::find_by_code(&self.pool, code).await?)
    }

    async fn list_sweepable_checks(&self) -> Result<Vec<Check>, StoreError> {
        Ok(CheckRepo::list_sweepable(&self.pool).await?)
    }

    async fn soft_delete_check(&self, id: DbId, now: Timestamp) -> Result<bool, StoreError> {
        Ok(CheckRepo::soft_delete(&self.pool, id, now).await?)
    }

    async fn commit(&self, commit: &CheckCommit) -> Result<Option<Committed>, StoreError> {
        let mut tx = self.pool.begin().await?;

        let Some(version) = CheckRepo::update_state(
            &mut *tx,
            commit.check_id,
            commit.expected_version,
            &commit.state,
        )
        .await?
        else {
            tx.rollback().await?;
            tracing::debug!(
                check_id = commit.check_id,
                expected_version = commit.expected_version,
                "Commit lost version race",
            );
            return Ok(None);
        };

        let ping = match &commit.ping {
            Some(ping) => Some(PingRepo::insert(&mut *tx, commit.check_id, ping).await?),
            None => None,
        };
        let flip = match &commit.flip {
            Some(flip) => Some(FlipRepo::insert(&mut *tx, commit.check_id, flip).await?),
            None => None,
        };

        tx.commit().await?;
        Ok(Some(Committed {
            version,
            ping,
            flip,
        }))
    }

    async fn prune_pings(&self, check_id: DbId, min_n: i64) -> Result<u64, StoreError> {
        Ok(PingRepo::prune(&self.pool, check_id, min_n).await?)
    }

    async fn list_pings(
        &self,
        check_id: DbId,
        min_n: i64,
        after: Option<Timestamp>,
        order: SortOrder,
        limit: i64,
    ) -> Result<Vec<Ping>, StoreError> {
        Ok(PingRepo::list(&self.pool, check_id, min_n, after, order, limit).await?)
    }

    async fn oldest_ping_created_at(
        &self,
        check_id: DbId,
        min_n: i64,
    ) -> Result<Option<Timestamp>, StoreError> {
        Ok(PingRepo::oldest_created_at(&self.pool, check_id, min_n).await?)
    }

    async fn list_flips(
        &self,
        check_id: DbId,
        window: EventWindow,
        order: SortOrder,
        limit: i64,
    ) -> Result<Vec<Flip>, StoreError> {
        Ok(FlipRepo::list_for_check(&self.pool, check_id, window, order, limit).await?)
    }

    async fn claim_flip(&self, flip_id: DbId, now: Timestamp) -> Result<bool, StoreError> {
        Ok(FlipRepo::claim(&self.pool, flip_id, now).await?)
    }

    async fn list_unprocessed_flips(&self, limit: i64) -> Result<Vec<Flip>, StoreError> {
        Ok(FlipRepo::list_unprocessed(&self.pool, limit).await?)
    }

    async fn create_channel(
        &self,
        input: &CreateChannel,
        code: Uuid,
        now: Timestamp,
    ) -> Result<Channel, StoreError> {
        Ok(ChannelRepo::create(&self.pool, input, code, now).await?)
    }

    async fn subscribe(&self, check_id: DbId, channel_id: DbId) -> Result<(), StoreError> {
        Ok(ChannelRepo::subscribe(&self.pool, check_id, channel_id).await?)
    }

    async fn channels_for_check(&self, check_id: DbId) -> Result<Vec<Channel>, StoreError> {
        Ok(ChannelRepo::list_for_check(&self.pool, check_id).await?)
    }

    async fn list_channels(&self, project_id: DbId) -> Result<Vec<Channel>, StoreError> {
        Ok(ChannelRepo::list_for_project(&self.pool, project_id).await?)
    }

    async fn create_notification(
        &self,
        input: &NewNotification,
    ) -> Result<Option<Notification>, StoreError> {
        Ok(NotificationRepo::create(&self.pool, input).await?)
    }

    async fn finish_notification(
        &self,
        id: DbId,
        status: NotificationStatus,
        error: Option<&str>,
        now: Timestamp,
    ) -> Result<bool, StoreError> {
        Ok(NotificationRepo::finish(&self.pool, id, status, error, now).await?)
    }

    async fn list_notifications(
        &self,
        check_id: DbId,
        window: EventWindow,
        order: SortOrder,
        limit: i64,
    ) -> Result<Vec<Notification>, StoreError> {
        Ok(NotificationRepo::list_for_check(&self.pool, check_id, window, order, limit).await?)
    }

    async fn fail_stale_notifications(
        &self,
        created_before: Timestamp,
        now: Timestamp,
    ) -> Result<u64, StoreError> {
        Ok(
            NotificationRepo::fail_stale(&self.pool, created_before, STALE_NOTIFICATION_ERROR, now)
                .await?,
        )
    }
}
