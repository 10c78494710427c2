//! Flip entity model: one persisted status change of a check.

use deadman_core::error::CoreError;
use deadman_core::status::CheckStatus;
use deadman_core::types::{DbId, Timestamp};
use serde::Serialize;
use sqlx::FromRow;

/// A row from the `flips` table.
///
/// Written in the same commit as the status change it records. Notifications
/// reference the flip, which makes "one notification per channel per
/// transition" a unique constraint.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Flip {
    pub id: DbId,
    pub check_id: DbId,
    pub created_at: Timestamp,
    pub old_status: String,
    pub new_status: String,
    /// When a dispatcher claimed this flip; `None` until then.
    pub processed_at: Option<Timestamp>,
}

impl Flip {
    pub fn old_status(&self) -> Result<CheckStatus, CoreError> {
        self.old_status.parse()
    }

    pub fn new_status(&self) -> Result<CheckStatus, CoreError> {
        self.new_status.parse()
    }
}

/// DTO for recording a status change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NewFlip {
    pub created_at: Timestamp,
    pub old_status: CheckStatus,
    pub new_status: CheckStatus,
}
