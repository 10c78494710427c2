//! Repository for the `pings` table.

use deadman_core::log_events::SortOrder;
use deadman_core::types::{DbId, Timestamp};
use sqlx::{PgConnection, PgPool};

use crate::models::ping::{NewPing, Ping};

/// Column list for `pings` queries.
const COLUMNS: &str = "id, check_id, n, kind, created_at, body, exit_status, remote_addr, \
    method, user_agent, duration_ms";

/// Provides persistence for pings.
pub struct PingRepo;

impl PingRepo {
    /// Insert a ping as part of a commit.
    pub async fn insert(
        conn: &mut PgConnection,
        check_id: DbId,
        ping: &NewPing,
    ) -> Result<Ping, sqlx::Error> {
        let query = format!(
            "INSERT INTO pings \
                (check_id, n, kind, created_at, body, exit_status, remote_addr, method, \
                 user_agent, duration_ms) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10) \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, Ping>(&query)
            .bind(check_id)
            .bind(ping.n)
            .bind(ping.kind.as_str())
            .bind(ping.created_at)
            .bind(&ping.body)
            .bind(ping.exit_status)
            .bind(&ping.remote_addr)
            .bind(&ping.method)
            .bind(&ping.user_agent)
            .bind(ping.duration_ms)
            .fetch_one(conn)
            .await
    }

    /// List pings with `n >= min_n`, optionally only those created after
    /// `after`.
    pub async fn list(
        pool: &PgPool,
        check_id: DbId,
        min_n: i64,
        after: Option<Timestamp>,
        order: SortOrder,
        limit: i64,
    ) -> Result<Vec<Ping>, sqlx::Error> {
        let direction = match order {
            SortOrder::NewestFirst => "DESC",
            SortOrder::OldestFirst => "ASC",
        };
        let query = format!(
            "SELECT {COLUMNS} FROM pings \
             WHERE check_id = $1 AND n >= $2 AND ($3::timestamptz IS NULL OR created_at > $3) \
             ORDER BY n {direction} \
             LIMIT $4"
        );
        sqlx::query_as::<_, Ping>(&query)
            .bind(check_id)
            .bind(min_n)
            .bind(after)
            .bind(limit)
            .fetch_all(pool)
            .await
    }

    /// Timestamp of the lowest-numbered stored ping with `n >= min_n`.
    pub async fn oldest_created_at(
        pool: &PgPool,
        check_id: DbId,
        min_n: i64,
    ) -> Result<Option<Timestamp>, sqlx::Error> {
        sqlx::query_scalar(
            "SELECT created_at FROM pings WHERE check_id = $1 AND n >= $2 \
             ORDER BY n ASC LIMIT 1",
        )
        .bind(check_id)
        .bind(min_n)
        .fetch_optional(pool)
        .await
    }

    /// Delete pings numbered below `min_n`. Returns the number removed.
    pub async fn prune(pool: &PgPool, check_id: DbId, min_n: i64) -> Result<u64, sqlx::Error> {
        let result = sqlx::query("DELETE FROM pings WHERE check_id = $1 AND n < $2")
            .bind(check_id)
            .bind(min_n)
            .execute(pool)
            .await?;
        Ok(result.rows_affected())
    }
}
