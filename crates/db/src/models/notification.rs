//! Notification entity model, delivery status and insert DTO.

use std::fmt;
use std::str::FromStr;

use deadman_core::error::CoreError;
use deadman_core::status::CheckStatus;
use deadman_core::types::{DbId, Timestamp};
use serde::Serialize;
use sqlx::FromRow;

/// A row from the `notifications` table: one delivery attempt of one flip
/// to one channel.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Notification {
    pub id: DbId,
    pub check_id: DbId,
    pub channel_id: DbId,
    pub flip_id: DbId,
    /// Check status the notification announced.
    pub check_status: String,
    pub status: String,
    /// Delivery error, when `status` is `failed` or `cancelled`.
    pub error: Option<String>,
    pub created_at: Timestamp,
    pub finished_at: Option<Timestamp>,
}

impl Notification {
    pub fn status(&self) -> Result<NotificationStatus, CoreError> {
        self.status.parse()
    }
}

/// Delivery state of a notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum NotificationStatus {
    /// Created, delivery in flight.
    Pending,
    Sent,
    Failed,
    /// Delivery abandoned on shutdown.
    Cancelled,
}

impl NotificationStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            NotificationStatus::Pending => "pending",
            NotificationStatus::Sent => "sent",
            NotificationStatus::Failed => "failed",
            NotificationStatus::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for NotificationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for NotificationStatus {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(NotificationStatus::Pending),
            "sent" => Ok(NotificationStatus::Sent),
            "failed" => Ok(NotificationStatus::Failed),
            "cancelled" => Ok(NotificationStatus::Cancelled),
            other => Err(CoreError::Validation(format!(
                "unknown notification status '{other}'"
            ))),
        }
    }
}

/// DTO for recording a delivery attempt before it is made.
#[derive(Debug, Clone, Copy)]
pub struct NewNotification {
    pub check_id: DbId,
    pub channel_id: DbId,
    pub flip_id: DbId,
    pub check_status: CheckStatus,
    pub created_at: Timestamp,
}
