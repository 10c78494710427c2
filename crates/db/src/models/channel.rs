//! Channel entity model and DTO.

use deadman_core::channels::ChannelPreferences;
use deadman_core::types::{DbId, Timestamp};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// A row from the `channels` table.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Channel {
    pub id: DbId,
    pub code: Uuid,
    pub project_id: DbId,
    /// Transport kind, see [`deadman_core::channels`].
    pub kind: String,
    /// Kind-specific target: an email address, a URL, ...
    pub value: String,
    pub notify_up: bool,
    pub notify_down: bool,
    pub created_at: Timestamp,
}

impl Channel {
    pub fn preferences(&self) -> ChannelPreferences {
        ChannelPreferences {
            notify_up: self.notify_up,
            notify_down: self.notify_down,
        }
    }
}

/// DTO for creating a channel.
#[derive(Debug, Clone, Deserialize)]
pub struct CreateChannel {
    pub project_id: DbId,
    pub kind: String,
    pub value: String,
    #[serde(default = "default_true")]
    pub notify_up: bool,
    #[serde(default = "default_true")]
    pub notify_down: bool,
}

fn default_true() -> bool {
    true
}
