//! Persistence interface used by the ingestor, sweeper, dispatcher and log
//! query.
//!
//! [`PgStore`](crate::pg::PgStore) is the production implementation;
//! [`MemoryStore`](crate::memory::MemoryStore) keeps everything in process
//! and backs the test suites.

use async_trait::async_trait;
use deadman_core::error::CoreError;
use deadman_core::log_events::{is_within_visible_history, SortOrder};
use deadman_core::types::{DbId, Timestamp};
use uuid::Uuid;

use crate::models::channel::{Channel, CreateChannel};
use crate::models::check::{Check, CreateCheck, StateUpdate};
use crate::models::flip::{Flip, NewFlip};
use crate::models::notification::{NewNotification, Notification, NotificationStatus};
use crate::models::ping::{NewPing, Ping};

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: DbId },

    /// A stored row could not be interpreted (unknown status, bad schedule).
    #[error("Corrupt row: {0}")]
    Corrupt(String),
}

impl From<CoreError> for StoreError {
    fn from(err: CoreError) -> Self {
        StoreError::Corrupt(err.to_string())
    }
}

// ---------------------------------------------------------------------------
// Listing window
// ---------------------------------------------------------------------------

/// Time bounds applied when listing flips and notifications.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EventWindow {
    /// Inclusive lower bound: the oldest visible ping.
    pub not_before: Option<Timestamp>,
    /// Exclusive lower bound supplied by the caller.
    pub after: Option<Timestamp>,
}

impl EventWindow {
    pub fn contains(&self, created: Timestamp) -> bool {
        is_within_visible_history(created, self.not_before)
            && self.after.map_or(true, |after| created > after)
    }
}

// ---------------------------------------------------------------------------
// Commit
// ---------------------------------------------------------------------------

/// One atomic write to a check: new state columns plus the ping and flip
/// that produced them.
#[derive(Debug, Clone)]
pub struct CheckCommit {
    pub check_id: DbId,
    /// Version the state was computed from. The commit is rejected if the
    /// stored row has moved on.
    pub expected_version: i64,
    pub state: StateUpdate,
    pub ping: Option<NewPing>,
    pub flip: Option<NewFlip>,
}

/// What a successful [`Store::commit`] wrote.
#[derive(Debug, Clone)]
pub struct Committed {
    pub version: i64,
    pub ping: Option<Ping>,
    pub flip: Option<Flip>,
}

// ---------------------------------------------------------------------------
// Store
// ---------------------------------------------------------------------------

/// Error text written to notifications left pending by a crashed process.
pub const STALE_NOTIFICATION_ERROR: &str = "interrupted";

#[async_trait]
pub trait Store: Send + Sync {
    // -- checks --

    /// Insert a validated check in status `new`.
    async fn create_check(
        &self,
        input: &CreateCheck,
        code: Uuid,
        now: Timestamp,
    ) -> Result<Check, StoreError>;

    /// Find a check by ID, including soft-deleted ones.
    async fn find_check(&self, id: DbId) -> Result<Option<Check>, StoreError>;

    /// Find a live (not deleted) check by its public code.
    async fn find_check_by_code(&self, code: Uuid) -> Result<Option<Check>, StoreError>;

    /// Live checks in status `up` or `grace`.
    async fn list_sweepable_checks(&self) -> Result<Vec<Check>, StoreError>;

    async fn soft_delete_check(&self, id: DbId, now: Timestamp) -> Result<bool, StoreError>;

    /// Apply a [`CheckCommit`] atomically.
    ///
    /// Returns `None`, writing nothing, when the check is no longer at
    /// `expected_version` or has been deleted.
    async fn commit(&self, commit: &CheckCommit) -> Result<Option<Committed>, StoreError>;

    // -- pings --

    /// Delete a check's pings numbered below `min_n`.
    async fn prune_pings(&self, check_id: DbId, min_n: i64) -> Result<u64, StoreError>;

    async fn list_pings(
        &self,
        check_id: DbId,
        min_n: i64,
        after: Option<Timestamp>,
        order: SortOrder,
        limit: i64,
    ) -> Result<Vec<Ping>, StoreError>;

    /// Timestamp of the lowest-numbered stored ping with `n >= min_n`.
    async fn oldest_ping_created_at(
        &self,
        check_id: DbId,
        min_n: i64,
    ) -> Result<Option<Timestamp>, StoreError>;

    // -- flips --

    async fn list_flips(
        &self,
        check_id: DbId,
        window: EventWindow,
        order: SortOrder,
        limit: i64,
    ) -> Result<Vec<Flip>, StoreError>;

    /// Mark a flip processed. `true` for exactly one caller per flip.
    async fn claim_flip(&self, flip_id: DbId, now: Timestamp) -> Result<bool, StoreError>;

    async fn list_unprocessed_flips(&self, limit: i64) -> Result<Vec<Flip>, StoreError>;

    // -- channels --

    async fn create_channel(
        &self,
        input: &CreateChannel,
        code: Uuid,
        now: Timestamp,
    ) -> Result<Channel, StoreError>;

    async fn subscribe(&self, check_id: DbId, channel_id: DbId) -> Result<(), StoreError>;

    async fn channels_for_check(&self, check_id: DbId) -> Result<Vec<Channel>, StoreError>;

    async fn list_channels(&self, project_id: DbId) -> Result<Vec<Channel>, StoreError>;

    // -- notifications --

    /// Insert a pending notification; `None` if one already exists for the
    /// same flip and channel.
    async fn create_notification(
        &self,
        input: &NewNotification,
    ) -> Result<Option<Notification>, StoreError>;

    /// Move a pending notification to its final status.
    async fn finish_notification(
        &self,
        id: DbId,
        status: NotificationStatus,
        error: Option<&str>,
        now: Timestamp,
    ) -> Result<bool, StoreError>;

    async fn list_notifications(
        &self,
        check_id: DbId,
        window: EventWindow,
        order: SortOrder,
        limit: i64,
    ) -> Result<Vec<Notification>, StoreError>;

    /// Fail notifications still pending that were created before
    /// `created_before`.
    async fn fail_stale_notifications(
        &self,
        created_before: Timestamp,
        now: Timestamp,
    ) -> Result<u64, StoreError>;
}
