//! Repository for the `channels` and `check_channels` tables.

use deadman_core::types::{DbId, Timestamp};
use sqlx::PgPool;
use uuid::Uuid;

use crate::models::channel::{Channel, CreateChannel};

/// Column list for `channels` queries.
const COLUMNS: &str = "id, code, project_id, kind, value, notify_up, notify_down, created_at";

/// Provides persistence for channels and their check subscriptions.
pub struct ChannelRepo;

impl ChannelRepo {
    pub async fn create(
        pool: &PgPool,
        input: &CreateChannel,
        code: Uuid,
        created_at: Timestamp,
    ) -> Result<Channel, sqlx::Error> {
        let query = format!(
            "INSERT INTO channels (code, project_id, kind, value, notify_up, notify_down, created_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7) \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, Channel>(&query)
            .bind(code)
            .bind(input.project_id)
            .bind(&input.kind)
            .bind(&input.value)
            .bind(input.notify_up)
            .bind(input.notify_down)
            .bind(created_at)
            .fetch_one(pool)
            .await
    }

    /// Subscribe a channel to a check. Subscribing twice is a no-op.
    pub async fn subscribe(
        pool: &PgPool,
        check_id: DbId,
        channel_id: DbId,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            "INSERT INTO check_channels (check_id, channel_id) VALUES ($1, $2) \
             ON CONFLICT DO NOTHING",
        )
        .bind(check_id)
        .bind(channel_id)
        .execute(pool)
        .await?;
        Ok(())
    }

    /// Channels subscribed to a check.
    pub async fn list_for_check(pool: &PgPool, check_id: DbId) -> Result<Vec<Channel>, sqlx::Error> {
        sqlx::query_as::<_, Channel>(
            "SELECT c.id, c.code, c.project_id, c.kind, c.value, c.notify_up, c.notify_down, \
                    c.created_at \
             FROM channels c \
             JOIN check_channels cc ON cc.channel_id = c.id \
             WHERE cc.check_id = $1 \
             ORDER BY c.id",
        )
        .bind(check_id)
        .fetch_all(pool)
        .await
    }

    pub async fn list_for_project(
        pool: &PgPool,
        project_id: DbId,
    ) -> Result<Vec<Channel>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM channels WHERE project_id = $1 ORDER BY id");
        sqlx::query_as::<_, Channel>(&query)
            .bind(project_id)
            .fetch_all(pool)
            .await
    }
}
