//! Repository for the `checks` table.

use deadman_core::status::CheckStatus;
use deadman_core::types::{DbId, Timestamp};
use sqlx::{PgConnection, PgPool};
use uuid::Uuid;

use crate::models::check::{Check, CreateCheck, StateUpdate};

/// Column list for `checks` queries.
const COLUMNS: &str = "id, code, project_id, name, kind, timeout_secs, schedule, tz, \
    grace_secs, status, last_ping, last_start, last_duration_ms, n_pings, \
    manual_resume, version, created_at, deleted_at";

/// Provides persistence for checks.
pub struct CheckRepo;

impl CheckRepo {
    /// Insert a new check in status `new`. The input must already be
    /// validated.
    pub async fn create(
        pool: &PgPool,
        input: &CreateCheck,
        code: Uuid,
        created_at: Timestamp,
    ) -> Result<Check, sqlx::Error> {
        let query = format!(
            "INSERT INTO checks \
                (code, project_id, name, kind, timeout_secs, schedule, tz, grace_secs, \
                 manual_resume, created_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10) \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, Check>(&query)
            .bind(code)
            .bind(input.project_id)
            .bind(&input.name)
            .bind(&input.kind)
            .bind(input.timeout_secs())
            .bind(input.schedule_expression())
            .bind(input.tz())
            .bind(input.grace_secs())
            .bind(input.manual_resume)
            .bind(created_at)
            .fetch_one(pool)
            .await
    }

    /// Find a check by its internal ID, including soft-deleted ones.
    pub async fn find_by_id(pool: &PgPool, id: DbId) -> Result<Option<Check>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM checks WHERE id = $1");
        sqlx::query_as::<_, Check>(&query)
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    /// Find a live check by its public code.
    pub async fn find_by_code(pool: &PgPool, code: Uuid) -> Result<Option<Check>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM checks WHERE code = $1 AND deleted_at IS NULL");
        sqlx::query_as::<_, Check>(&query)
            .bind(code)
            .fetch_optional(pool)
            .await
    }

    /// All live checks the sweeper has to look at (`up` or `grace`).
    pub async fn list_sweepable(pool: &PgPool) -> Result<Vec<Check>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM checks \
             WHERE deleted_at IS NULL AND status IN ($1, $2) \
             ORDER BY id"
        );
        sqlx::query_as::<_, Check>(&query)
            .bind(CheckStatus::Up.as_str())
            .bind(CheckStatus::Grace.as_str())
            .fetch_all(pool)
            .await
    }

    /// Soft-delete a check. Returns `true` if a live check was deleted.
    pub async fn soft_delete(
        pool: &PgPool,
        id: DbId,
        deleted_at: Timestamp,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE checks SET deleted_at = $2, version = version + 1 \
             WHERE id = $1 AND deleted_at IS NULL",
        )
        .bind(id)
        .bind(deleted_at)
        .execute(pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Write new state columns if the row is still at `expected_version`.
    ///
    /// Returns the new version, or `None` when another writer got there
    /// first (or the check was deleted).
    pub async fn update_state(
        conn: &mut PgConnection,
        id: DbId,
        expected_version: i64,
        update: &StateUpdate,
    ) -> Result<Option<i64>, sqlx::Error> {
        sqlx::query_scalar(
            "UPDATE checks SET \
                status = $3, last_ping = $4, last_start = $5, last_duration_ms = $6, \
                n_pings = $7, version = version + 1 \
             WHERE id = $1 AND version = $2 AND deleted_at IS NULL \
             RETURNING version",
        )
        .bind(id)
        .bind(expected_version)
        .bind(update.status.as_str())
        .bind(update.last_ping)
        .bind(update.last_start)
        .bind(update.last_duration_ms)
        .bind(update.n_pings)
        .fetch_optional(conn)
        .await
    }
}
