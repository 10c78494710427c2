//! In-process [`Store`] with the same semantics as the Postgres one.
//!
//! Every operation takes a single lock, so each call is atomic the way a
//! transaction would be. Used by tests and for running the worker without
//! a database.

use std::collections::BTreeSet;

use async_trait::async_trait;
use deadman_core::log_events::SortOrder;
use deadman_core::status::CheckStatus;
use deadman_core::types::{DbId, Timestamp};
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::models::channel::{Channel, CreateChannel};
use crate::models::check::{Check, CreateCheck};
use crate::models::flip::Flip;
use crate::models::notification::{NewNotification, Notification, NotificationStatus};
use crate::models::ping::Ping;
use crate::store::{
    CheckCommit, Committed, EventWindow, Store, StoreError, STALE_NOTIFICATION_ERROR,
};

#[derive(Default)]
struct Tables {
    checks: Vec<Check>,
    pings: Vec<Ping>,
    flips: Vec<Flip>,
    channels: Vec<Channel>,
    subscriptions: BTreeSet<(DbId, DbId)>,
    notifications: Vec<Notification>,
    next_ping_id: DbId,
}

impl Tables {
    fn check_mut(&mut self, id: DbId) -> Option<&mut Check> {
        self.checks.iter_mut().find(|c| c.id == id)
    }
}

#[derive(Default)]
pub struct MemoryStore {
    tables: Mutex<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every notification across all checks, in creation order.
    pub async fn all_notifications(&self) -> Vec<Notification> {
        self.tables.lock().await.notifications.clone()
    }

    /// Overwrite a check's version, simulating a write by another process.
    pub async fn bump_version(&self, check_id: DbId) {
        if let Some(check) = self.tables.lock().await.check_mut(check_id) {
            check.version += 1;
        }
    }
}

fn next_id(len: usize) -> DbId {
    len as DbId + 1
}

fn take_ordered<T, K, F>(mut rows: Vec<T>, order: SortOrder, limit: i64, key: F) -> Vec<T>
where
    K: Ord,
    F: FnMut(&T) -> K,
{
    rows.sort_by_key(key);
    if order == SortOrder::NewestFirst {
        rows.reverse();
    }
    rows.truncate(limit.max(0) as usize);
    rows
}

fn newer_than(created: Timestamp, after: Option<Timestamp>) -> bool {
    after.map_or(true, |after| created > after)
}

#[async_trait]
impl Store for MemoryStore {
    async fn create_check(
        &self,
        input: &CreateCheck,
        code: Uuid,
        now: Timestamp,
    ) -> Result<Check, StoreError> {
        let mut tables = self.tables.lock().await;
        let check = Check {
            id: next_id(tables.checks.len()),
            code,
            project_id: input.project_id,
            name: input.name.clone(),
            kind: input.kind.clone(),
            timeout_secs: input.timeout_secs(),
            schedule: input.schedule_expression().to_string(),
            tz: input.tz().to_string(),
            grace_secs: input.grace_secs(),
            status: CheckStatus::New.as_str().to_string(),
            last_ping: None,
            last_start: None,
            last_duration_ms: None,
            n_pings: 0,
            manual_resume: input.manual_resume,
            version: 0,
            created_at: now,
            deleted_at: None,
        };
        tables.checks.push(check.clone());
        Ok(check)
    }

    async fn find_check(&self, id: DbId) -> Result<Option<Check>, StoreError> {
        let tables = self.tables.lock().await;
        Ok(tables.checks.iter().find(|c| c.id == id).cloned())
    }

    async fn find_check_by_code(&self, code: Uuid) -> Result<Option<Check>, StoreError> {
        let tables = self.tables.lock().await;
        Ok(tables
            .checks
            .iter()
            .find(|c| c.code == code && !c.is_deleted())
            .cloned())
    }

    async fn list_sweepable_checks(&self) -> Result<Vec<Check>, StoreError> {
        let tables = self.tables.lock().await;
        Ok(tables
            .checks
            .iter()
            .filter(|c| !c.is_deleted() && c.status().is_ok_and(|s| s.is_sweepable()))
            .cloned()
            .collect())
    }

    async fn soft_delete_check(&self, id: DbId, now: Timestamp) -> Result<bool, StoreError> {
        let mut tables = self.tables.lock().await;
        match tables.check_mut(id) {
            Some(check) if !check.is_deleted() => {
                check.deleted_at = Some(now);
                check.version += 1;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn commit(&self, commit: &CheckCommit) -> Result<Option<Committed>, StoreError> {
        let mut tables = self.tables.lock().await;

        let version = match tables.check_mut(commit.check_id) {
            Some(check) if !check.is_deleted() && check.version == commit.expected_version => {
                let version = check.version + 1;
                check.apply(&commit.state, version);
                version
            }
            _ => return Ok(None),
        };

        let ping = commit.ping.as_ref().map(|ping| {
            tables.next_ping_id += 1;
            let row = Ping {
                id: tables.next_ping_id,
                check_id: commit.check_id,
                n: ping.n,
                kind: ping.kind.as_str().to_string(),
                created_at: ping.created_at,
                body: ping.body.clone(),
                exit_status: ping.exit_status,
                remote_addr: ping.remote_addr.clone(),
                method: ping.method.clone(),
                user_agent: ping.user_agent.clone(),
                duration_ms: ping.duration_ms,
            };
            tables.pings.push(row.clone());
            row
        });

        let flip = commit.flip.as_ref().map(|flip| {
            let row = Flip {
                id: next_id(tables.flips.len()),
                check_id: commit.check_id,
                created_at: flip.created_at,
                old_status: flip.old_status.as_str().to_string(),
                new_status: flip.new_status.as_str().to_string(),
                processed_at: None,
            };
            tables.flips.push(row.clone());
            row
        });

        Ok(Some(Committed {
            version,
            ping,
            flip,
        }))
    }

    async fn prune_pings(&self, check_id: DbId, min_n: i64) -> Result<u64, StoreError> {
        let mut tables = self.tables.lock().await;
        let before = tables.pings.len();
        tables
            .pings
            .retain(|p| p.check_id != check_id || p.n >= min_n);
        Ok((before - tables.pings.len()) as u64)
    }

    async fn list_pings(
        &self,
        check_id: DbId,
        min_n: i64,
        after: Option<Timestamp>,
        order: SortOrder,
        limit: i64,
    ) -> Result<Vec<Ping>, StoreError> {
        let tables = self.tables.lock().await;
        let rows = tables
            .pings
            .iter()
            .filter(|p| p.check_id == check_id && p.n >= min_n && newer_than(p.created_at, after))
            .cloned()
            .collect();
        Ok(take_ordered(rows, order, limit, |p| p.n))
    }

    async fn oldest_ping_created_at(
        &self,
        check_id: DbId,
        min_n: i64,
    ) -> Result<Option<Timestamp>, StoreError> {
        let tables = self.tables.lock().await;
        Ok(tables
            .pings
            .iter()
            .filter(|p| p.check_id == check_id && p.n >= min_n)
            .min_by_key(|p| p.n)
            .map(|p| p.created_at))
    }

    async fn list_flips(
        &self,
        check_id: DbId,
        window: EventWindow,
        order: SortOrder,
        limit: i64,
    ) -> Result<Vec<Flip>, StoreError> {
        let tables = self.tables.lock().await;
        let rows = tables
            .flips
            .iter()
            .filter(|f| f.check_id == check_id && window.contains(f.created_at))
            .cloned()
            .collect();
        Ok(take_ordered(rows, order, limit, |f| (f.created_at, f.id)))
    }

    async fn claim_flip(&self, flip_id: DbId, now: Timestamp) -> Result<bool, StoreError> {
        let mut tables = self.tables.lock().await;
        match tables.flips.iter_mut().find(|f| f.id == flip_id) {
            Some(flip) if flip.processed_at.is_none() => {
                flip.processed_at = Some(now);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn list_unprocessed_flips(&self, limit: i64) -> Result<Vec<Flip>, StoreError> {
        let tables = self.tables.lock().await;
        let rows = tables
            .flips
            .iter()
            .filter(|f| f.processed_at.is_none())
            .cloned()
            .collect();
        Ok(take_ordered(rows, SortOrder::OldestFirst, limit, |f| {
            (f.created_at, f.id)
        }))
    }

    async fn create_channel(
        &self,
        input: &CreateChannel,
        code: Uuid,
        now: Timestamp,
    ) -> Result<Channel, StoreError> {
        let mut tables = self.tables.lock().await;
        let channel = Channel {
            id: next_id(tables.channels.len()),
            code,
            project_id: input.project_id,
            kind: input.kind.clone(),
            value: input.value.clone(),
            notify_up: input.notify_up,
            notify_down: input.notify_down,
            created_at: now,
        };
        tables.channels.push(channel.clone());
        Ok(channel)
    }

    async fn subscribe(&self, check_id: DbId, channel_id: DbId) -> Result<(), StoreError> {
        let mut tables = self.tables.lock().await;
        if !tables.checks.iter().any(|c| c.id == check_id) {
            return Err(StoreError::NotFound {
                entity: "check",
                id: check_id,
            });
        }
        if !tables.channels.iter().any(|c| c.id == channel_id) {
            return Err(StoreError::NotFound {
                entity: "channel",
                id: channel_id,
            });
        }
        tables.subscriptions.insert((check_id, channel_id));
        Ok(())
    }

    async fn channels_for_check(&self, check_id: DbId) -> Result<Vec<Channel>, StoreError> {
        let tables = self.tables.lock().await;
        Ok(tables
            .channels
            .iter()
            .filter(|c| tables.subscriptions.contains(&(check_id, c.id)))
            .cloned()
            .collect())
    }

    async fn list_channels(&self, project_id: DbId) -> Result<Vec<Channel>, StoreError> {
        let tables = self.tables.lock().await;
        Ok(tables
            .channels
            .iter()
            .filter(|c| c.project_id == project_id)
            .cloned()
            .collect())
    }

    async fn create_notification(
        &self,
        input: &NewNotification,
    ) -> Result<Option<Notification>, StoreError> {
        let mut tables = self.tables.lock().await;
        let exists = tables
            .notifications
            .iter()
            .any(|n| n.flip_id == input.flip_id && n.channel_id == input.channel_id);
        if exists {
            return Ok(None);
        }

        let notification = Notification {
            id: next_id(tables.notifications.len()),
            check_id: input.check_id,
            channel_id: input.channel_id,
            flip_id: input.flip_id,
            check_status: input.check_status.as_str().to_string(),
            status: NotificationStatus::Pending.as_str().to_string(),
            error: None,
            created_at: input.created_at,
            finished_at: None,
        };
        tables.notifications.push(notification.clone());
        Ok(Some(notification))
    }

    async fn finish_notification(
        &self,
        id: DbId,
        status: NotificationStatus,
        error: Option<&str>,
        now: Timestamp,
    ) -> Result<bool, StoreError> {
        let mut tables = self.tables.lock().await;
        let pending = NotificationStatus::Pending.as_str();
        match tables
            .notifications
            .iter_mut()
            .find(|n| n.id == id && n.status == pending)
        {
            Some(notification) => {
                notification.status = status.as_str().to_string();
                notification.error = error.map(str::to_string);
                notification.finished_at = Some(now);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn list_notifications(
        &self,
        check_id: DbId,
        window: EventWindow,
        order: SortOrder,
        limit: i64,
    ) -> Result<Vec<Notification>, StoreError> {
        let tables = self.tables.lock().await;
        let rows = tables
            .notifications
            .iter()
            .filter(|n| n.check_id == check_id && window.contains(n.created_at))
            .cloned()
            .collect();
        Ok(take_ordered(rows, order, limit, |n| (n.created_at, n.id)))
    }

    async fn fail_stale_notifications(
        &self,
        created_before: Timestamp,
        now: Timestamp,
    ) -> Result<u64, StoreError> {
        let mut tables = self.tables.lock().await;
        let pending = NotificationStatus::Pending.as_str();
        let mut resolved = 0;
        for notification in tables
            .notifications
            .iter_mut()
            .filter(|n| n.status == pending && n.created_at < created_before)
        {
            notification.status = NotificationStatus::Failed.as_str().to_string();
            notification.error = Some(STALE_NOTIFICATION_ERROR.to_string());
            notification.finished_at = Some(now);
            resolved += 1;
        }
        Ok(resolved)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
