//! Ping entity model and insert DTO.

use deadman_core::error::CoreError;
use deadman_core::status::PingKind;
use deadman_core::types::{DbId, Timestamp};
use serde::Serialize;
use sqlx::FromRow;

/// A row from the `pings` table. Immutable once written.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Ping {
    pub id: DbId,
    pub check_id: DbId,
    /// Sequence number, strictly increasing per check.
    pub n: i64,
    pub kind: String,
    pub created_at: Timestamp,
    pub body: Option<String>,
    pub exit_status: Option<i16>,
    pub remote_addr: Option<String>,
    pub method: Option<String>,
    pub user_agent: Option<String>,
    /// Set when the ping closed a started run.
    pub duration_ms: Option<i64>,
}

impl Ping {
    pub fn kind(&self) -> Result<PingKind, CoreError> {
        self.kind.parse()
    }
}

/// Fully resolved ping ready to be written as part of a commit.
#[derive(Debug, Clone)]
pub struct NewPing {
    pub n: i64,
    pub kind: PingKind,
    pub created_at: Timestamp,
    pub body: Option<String>,
    pub exit_status: Option<i16>,
    pub remote_addr: Option<String>,
    pub method: Option<String>,
    pub user_agent: Option<String>,
    pub duration_ms: Option<i64>,
}
