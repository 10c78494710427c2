//! Check and channel management: registration, manual pause and resume,
//! deletion, subscriptions.

use std::sync::Arc;

use deadman_core::error::CoreError;
use deadman_core::state_machine::{CheckState, TransitionResult};
use deadman_core::types::{DbId, Timestamp};
use deadman_db::models::channel::{Channel, CreateChannel};
use deadman_db::models::check::{Check, CreateCheck, StateUpdate};
use deadman_db::models::flip::NewFlip;
use deadman_db::{CheckCommit, Store, StoreError};
use uuid::Uuid;

use crate::error::{MonitorError, MonitorResult};
use crate::locks::KeyedLocks;

pub struct CheckAdmin {
    store: Arc<dyn Store>,
    locks: Arc<KeyedLocks>,
}

impl CheckAdmin {
    pub fn new(store: Arc<dyn Store>, locks: Arc<KeyedLocks>) -> Self {
        Self { store, locks }
    }

    /// Register a check. The schedule is validated before anything is
    /// stored.
    pub async fn create_check(&self, input: &CreateCheck, now: Timestamp) -> MonitorResult<Check> {
        if input.name.trim().is_empty() {
            return Err(CoreError::Validation("name must not be empty".to_string()).into());
        }
        input.validate()?;

        let check = self.store.create_check(input, Uuid::new_v4(), now).await?;
        tracing::info!(
            check_id = check.id,
            code = %check.code,
            kind = %check.kind,
            "Check created"
        );
        Ok(check)
    }

    pub async fn pause(
        &self,
        project_id: DbId,
        code: &str,
        now: Timestamp,
    ) -> MonitorResult<TransitionResult> {
        self.transition(project_id, code, now, CheckState::pause).await
    }

    /// Resume a paused check. It starts over in `new` and waits for its
    /// next ping.
    pub async fn resume(
        &self,
        project_id: DbId,
        code: &str,
        now: Timestamp,
    ) -> MonitorResult<TransitionResult> {
        self.transition(project_id, code, now, CheckState::resume).await
    }

    pub async fn delete(&self, project_id: DbId, code: &str, now: Timestamp) -> MonitorResult<()> {
        let check = self.owned_check(project_id, code).await?;
        let _guard = self.locks.lock(check.id).await;
        if !self.store.soft_delete_check(check.id, now).await? {
            return Err(MonitorError::check_not_found(code));
        }
        tracing::info!(check_id = check.id, "Check deleted");
        Ok(())
    }

    pub async fn create_channel(
        &self,
        input: &CreateChannel,
        now: Timestamp,
    ) -> MonitorResult<Channel> {
        if input.value.trim().is_empty() {
            return Err(
                CoreError::Validation("channel value must not be empty".to_string()).into(),
            );
        }
        Ok(self.store.create_channel(input, Uuid::new_v4(), now).await?)
    }

    /// Subscribe a channel to a check of the same project.
    pub async fn subscribe(
        &self,
        project_id: DbId,
        code: &str,
        channel: &Channel,
    ) -> MonitorResult<()> {
        let check = self.owned_check(project_id, code).await?;
        if channel.project_id != project_id {
            return Err(CoreError::NotFound {
                entity: "channel",
                key: channel.code.to_string(),
            }
            .into());
        }
        Ok(self.store.subscribe(check.id, channel.id).await?)
    }

    async fn owned_check(&self, project_id: DbId, code: &str) -> MonitorResult<Check> {
        let uuid = Uuid::parse_str(code).map_err(|_| MonitorError::check_not_found(code))?;
        match self.store.find_check_by_code(uuid).await? {
            Some(check) if check.project_id == project_id => Ok(check),
            _ => Err(MonitorError::check_not_found(code)),
        }
    }

    async fn transition<F>(
        &self,
        project_id: DbId,
        code: &str,
        now: Timestamp,
        apply: F,
    ) -> MonitorResult<TransitionResult>
    where
        F: Fn(&mut CheckState) -> Result<TransitionResult, CoreError>,
    {
        let check = self.owned_check(project_id, code).await?;
        let _guard = self.locks.lock(check.id).await;

        let check = match self.store.find_check(check.id).await? {
            Some(check) if !check.is_deleted() => check,
            _ => return Err(MonitorError::check_not_found(code)),
        };
        let mut state = check.state().map_err(StoreError::from)?;
        let transition = apply(&mut state)?;

        let commit = CheckCommit {
            check_id: check.id,
            expected_version: check.version,
            state: StateUpdate::from(&state),
            ping: None,
            flip: Some(NewFlip {
                created_at: now,
                old_status: transition.previous,
                new_status: transition.current,
            }),
        };
        let committed = self
            .store
            .commit(&commit)
            .await?
            .ok_or_else(|| MonitorError::contention(code, 1))?;

        // Manual flips are never notified; mark them processed right away.
        if let Some(flip) = committed.flip {
            self.store.claim_flip(flip.id, now).await?;
        }

        tracing::info!(
            check_id = check.id,
            from = %transition.previous,
            to = %transition.current,
            "Check status changed manually"
        );
        Ok(transition)
    }
}
