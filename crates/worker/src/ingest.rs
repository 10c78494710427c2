//! Ping ingestion.
//!
//! A ping is applied under the check's lock: reload the row, run the state
//! machine, then commit the ping, the new state and any flip in one write
//! guarded by the row version. A lost version race (another process wrote
//! in between) reloads and retries.

use std::sync::Arc;

use deadman_core::error::CoreError;
use deadman_core::log_events::first_visible_ping;
use deadman_core::state_machine::TransitionResult;
use deadman_core::status::PingKind;
use deadman_core::types::{DbId, Timestamp};
use deadman_db::models::check::{Check, StateUpdate};
use deadman_db::models::flip::{Flip, NewFlip};
use deadman_db::models::ping::{NewPing, Ping};
use deadman_db::{CheckCommit, Store, StoreError};
use deadman_events::{DeliveryOutcome, Dispatcher};
use uuid::Uuid;

use crate::error::{MonitorError, MonitorResult};
use crate::locks::KeyedLocks;

/// Commit attempts before giving up on a contended check.
const MAX_COMMIT_ATTEMPTS: usize = 5;

/// Ping bodies longer than this are truncated.
pub const MAX_BODY_BYTES: usize = 10_000;

// ---------------------------------------------------------------------------
// Input / output
// ---------------------------------------------------------------------------

/// A received ping, before it is numbered.
#[derive(Debug, Clone)]
pub struct NewPingInput {
    pub kind: PingKind,
    pub body: Option<String>,
    pub exit_status: Option<i16>,
    pub remote_addr: Option<String>,
    pub method: Option<String>,
    pub user_agent: Option<String>,
}

impl NewPingInput {
    pub fn new(kind: PingKind) -> Self {
        Self {
            kind,
            body: None,
            exit_status: None,
            remote_addr: None,
            method: None,
            user_agent: None,
        }
    }

    /// A ping reporting a process exit status: 0 is a success, 1..=255 a
    /// failure.
    pub fn exit_status(exit_status: i32) -> Result<Self, CoreError> {
        let kind = PingKind::from_exit_status(exit_status)?;
        let mut input = Self::new(kind);
        input.exit_status = i16::try_from(exit_status).ok();
        Ok(input)
    }

    pub fn with_body(mut self, body: impl Into<String>) -> Self {
        let mut body = body.into();
        if body.len() > MAX_BODY_BYTES {
            let mut end = MAX_BODY_BYTES;
            while !body.is_char_boundary(end) {
                end -= 1;
            }
            body.truncate(end);
        }
        self.body = Some(body);
        self
    }

    fn numbered(&self, n: i64, created_at: Timestamp, duration_ms: Option<i64>) -> NewPing {
        NewPing {
            n,
            kind: self.kind,
            created_at,
            body: self.body.clone(),
            exit_status: self.exit_status,
            remote_addr: self.remote_addr.clone(),
            method: self.method.clone(),
            user_agent: self.user_agent.clone(),
            duration_ms,
        }
    }
}

#[derive(Debug, Clone)]
pub struct IngestOutcome {
    pub check_id: DbId,
    pub ping: Ping,
    pub transition: TransitionResult,
    /// Deliveries made because of this ping's transition, if any.
    pub deliveries: Vec<DeliveryOutcome>,
}

struct CommittedPing {
    check: Check,
    ping: Ping,
    transition: TransitionResult,
    flip: Option<Flip>,
}

// ---------------------------------------------------------------------------
// PingIngestor
// ---------------------------------------------------------------------------

pub struct PingIngestor {
    store: Arc<dyn Store>,
    dispatcher: Arc<Dispatcher>,
    locks: Arc<KeyedLocks>,
    retention: i64,
}

impl PingIngestor {
    pub fn new(
        store: Arc<dyn Store>,
        dispatcher: Arc<Dispatcher>,
        locks: Arc<KeyedLocks>,
        retention: i64,
    ) -> Self {
        Self {
            store,
            dispatcher,
            locks,
            retention,
        }
    }

    /// Record a ping for the check identified by `code`.
    ///
    /// Unknown, malformed and deleted codes all fail with the same
    /// not-found error.
    pub async fn record(
        &self,
        code: &str,
        input: NewPingInput,
        now: Timestamp,
    ) -> MonitorResult<IngestOutcome> {
        let uuid = Uuid::parse_str(code).map_err(|_| MonitorError::check_not_found(code))?;
        let check = self
            .store
            .find_check_by_code(uuid)
            .await?
            .ok_or_else(|| MonitorError::check_not_found(code))?;

        let guard = self.locks.lock(check.id).await;
        let CommittedPing {
            check,
            ping,
            transition,
            flip,
        } = self.commit_ping(check.id, code, &input, now).await?;
        drop(guard);

        if ping.n > self.retention {
            let min_n = first_visible_ping(ping.n, self.retention);
            if let Err(e) = self.store.prune_pings(check.id, min_n).await {
                tracing::warn!(check_id = check.id, error = %e, "Failed to prune pings");
            }
        }

        let deliveries = match flip {
            Some(flip) => match self.dispatcher.claim_and_dispatch(&check, &flip, now).await {
                Ok(deliveries) => deliveries,
                Err(e) => {
                    tracing::error!(
                        check_id = check.id,
                        flip_id = flip.id,
                        error = %e,
                        "Failed to dispatch flip"
                    );
                    Vec::new()
                }
            },
            None => Vec::new(),
        };

        tracing::debug!(
            check_id = check.id,
            n = ping.n,
            kind = %input.kind,
            from = %transition.previous,
            to = %transition.current,
            "Ping recorded"
        );

        Ok(IngestOutcome {
            check_id: check.id,
            ping,
            transition,
            deliveries,
        })
    }

    async fn commit_ping(
        &self,
        check_id: DbId,
        code: &str,
        input: &NewPingInput,
        now: Timestamp,
    ) -> MonitorResult<CommittedPing> {
        for attempt in 1..=MAX_COMMIT_ATTEMPTS {
            let mut check = match self.store.find_check(check_id).await? {
                Some(check) if !check.is_deleted() => check,
                _ => return Err(MonitorError::check_not_found(code)),
            };

            let mut state = check.state().map_err(StoreError::from)?;
            let outcome = state.record_ping(input.kind, now);
            let transition = outcome.transition;
            let update = StateUpdate::from(&state);

            let commit = CheckCommit {
                check_id,
                expected_version: check.version,
                state: update.clone(),
                ping: Some(input.numbered(
                    outcome.n,
                    now,
                    outcome.duration.map(|d| d.num_milliseconds()),
                )),
                flip: transition.occurred().then_some(NewFlip {
                    created_at: now,
                    old_status: transition.previous,
                    new_status: transition.current,
                }),
            };

            match self.store.commit(&commit).await? {
                Some(committed) => {
                    check.apply(&update, committed.version);
                    let ping = committed.ping.ok_or_else(|| {
                        CoreError::Internal("commit did not return the ping".to_string())
                    })?;
                    return Ok(CommittedPing {
                        check,
                        ping,
                        transition,
                        flip: committed.flip,
                    });
                }
                None => {
                    tracing::debug!(check_id, attempt, "Check version moved, retrying ping");
                }
            }
        }

        Err(MonitorError::contention(code, MAX_COMMIT_ATTEMPTS))
    }
}
