//! Repository for the `flips` table.

use deadman_core::log_events::SortOrder;
use deadman_core::types::{DbId, Timestamp};
use sqlx::{PgConnection, PgPool};

use crate::models::flip::{Flip, NewFlip};
use crate::store::EventWindow;

/// Column list for `flips` queries.
const COLUMNS: &str = "id, check_id, created_at, old_status, new_status, processed_at";

/// Provides persistence for flips.
pub struct FlipRepo;

impl FlipRepo {
    /// Insert a flip as part of a commit.
    pub async fn insert(
        conn: &mut PgConnection,
        check_id: DbId,
        flip: &NewFlip,
    ) -> Result<Flip, sqlx::Error> {
        let query = format!(
            "INSERT INTO flips (check_id, created_at, old_status, new_status) \
             VALUES ($1, $2, $3, $4) \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, Flip>(&query)
            .bind(check_id)
            .bind(flip.created_at)
            .bind(flip.old_status.as_str())
            .bind(flip.new_status.as_str())
            .fetch_one(conn)
            .await
    }

    /// List a check's flips created after `after`.
    pub async fn list_for_check(
        pool: &PgPool,
        check_id: DbId,
        window: EventWindow,
        order: SortOrder,
        limit: i64,
    ) -> Result<Vec<Flip>, sqlx::Error> {
        let direction = match order {
            SortOrder::NewestFirst => "DESC",
            SortOrder::OldestFirst => "ASC",
        };
        let query = format!(
            "SELECT {COLUMNS} FROM flips \
             WHERE check_id = $1 \
               AND ($2::timestamptz IS NULL OR created_at >= $2) \
               AND ($3::timestamptz IS NULL OR created_at > $3) \
             ORDER BY created_at {direction}, id {direction} \
             LIMIT $4"
        );
        sqlx::query_as::<_, Flip>(&query)
            .bind(check_id)
            .bind(window.not_before)
            .bind(window.after)
            .bind(limit)
            .fetch_all(pool)
            .await
    }

    /// Atomically mark a flip as processed.
    ///
    /// Returns `true` for exactly one caller; every later claim of the same
    /// flip returns `false`.
    pub async fn claim(
        pool: &PgPool,
        flip_id: DbId,
        processed_at: Timestamp,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE flips SET processed_at = $2 WHERE id = $1 AND processed_at IS NULL",
        )
        .bind(flip_id)
        .bind(processed_at)
        .execute(pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Oldest flips no dispatcher has claimed yet.
    pub async fn list_unprocessed(pool: &PgPool, limit: i64) -> Result<Vec<Flip>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM flips \
             WHERE processed_at IS NULL \
             ORDER BY created_at ASC, id ASC \
             LIMIT $1"
        );
        sqlx::query_as::<_, Flip>(&query)
            .bind(limit)
            .fetch_all(pool)
            .await
    }
}
