//! Repository for the `notifications` table.

use deadman_core::log_events::SortOrder;
use deadman_core::types::{DbId, Timestamp};
use sqlx::PgPool;

use crate::models::notification::{NewNotification, Notification, NotificationStatus};
use crate::store::EventWindow;

/// Column list for `notifications` queries.
const COLUMNS: &str = "id, check_id, channel_id, flip_id, check_status, status, error, \
    created_at, finished_at";

/// Provides persistence for notifications.
pub struct NotificationRepo;

impl NotificationRepo {
    /// Record a pending delivery.
    ///
    /// Returns `None` when a notification for the same flip and channel
    /// already exists.
    pub async fn create(
        pool: &PgPool,
        input: &NewNotification,
    ) -> Result<Option<Notification>, sqlx::Error> {
        let query = format!(
            "INSERT INTO notifications (check_id, channel_id, flip_id, check_status, status, created_at) \
             VALUES ($1, $2, $3, $4, $5, $6) \
             ON CONFLICT (flip_id, channel_id) DO NOTHING \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, Notification>(&query)
            .bind(input.check_id)
            .bind(input.channel_id)
            .bind(input.flip_id)
            .bind(input.check_status.as_str())
            .bind(NotificationStatus::Pending.as_str())
            .bind(input.created_at)
            .fetch_optional(pool)
            .await
    }

    /// Record the outcome of a delivery. Only pending notifications are
    /// updated; returns `true` if the row changed.
    pub async fn finish(
        pool: &PgPool,
        id: DbId,
        status: NotificationStatus,
        error: Option<&str>,
        finished_at: Timestamp,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE notifications SET status = $2, error = $3, finished_at = $4 \
             WHERE id = $1 AND status = $5",
        )
        .bind(id)
        .bind(status.as_str())
        .bind(error)
        .bind(finished_at)
        .bind(NotificationStatus::Pending.as_str())
        .execute(pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// List a check's notifications created after `after`.
    pub async fn list_for_check(
        pool: &PgPool,
        check_id: DbId,
        window: EventWindow,
        order: SortOrder,
        limit: i64,
    ) -> Result<Vec<Notification>, sqlx::Error> {
        let direction = match order {
            SortOrder::NewestFirst => "DESC",
            SortOrder::OldestFirst => "ASC",
        };
        let query = format!(
            "SELECT {COLUMNS} FROM notifications \
             WHERE check_id = $1 \
               AND ($2::timestamptz IS NULL OR created_at >= $2) \
               AND ($3::timestamptz IS NULL OR created_at > $3) \
             ORDER BY created_at {direction}, id {direction} \
             LIMIT $4"
        );
        sqlx::query_as::<_, Notification>(&query)
            .bind(check_id)
            .bind(window.not_before)
            .bind(window.after)
            .bind(limit)
            .fetch_all(pool)
            .await
    }

    /// Resolve notifications stuck in `pending` since before `created_before`
    /// to `failed`. Returns the number of rows resolved.
    pub async fn fail_stale(
        pool: &PgPool,
        created_before: Timestamp,
        error: &str,
        finished_at: Timestamp,
    ) -> Result<u64, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE notifications SET status = $1, error = $2, finished_at = $3 \
             WHERE status = $4 AND created_at < $5",
        )
        .bind(NotificationStatus::Failed.as_str())
        .bind(error)
        .bind(finished_at)
        .bind(NotificationStatus::Pending.as_str())
        .bind(created_before)
        .execute(pool)
        .await?;
        Ok(result.rows_affected())
    }
}
