//! Periodic sweep of checks that stopped pinging.
//!
//! Each tick lists the live `up` and `grace` checks and advances the ones
//! whose deadline has passed. Ticks are awaited one after another, so a
//! process never runs two sweeps at once; concurrent processes are kept
//! apart by the version check on commit and by flip claiming.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use deadman_core::types::{DbId, Timestamp};
use deadman_db::models::check::{Check, StateUpdate};
use deadman_db::models::flip::{Flip, NewFlip};
use deadman_db::{CheckCommit, Store, StoreError};
use deadman_events::Dispatcher;
use futures::stream::{self, StreamExt};
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use crate::locks::KeyedLocks;

/// Leftover flips dispatched per tick.
const PENDING_FLIP_BATCH: i64 = 100;

/// Totals of one sweep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub checked: usize,
    pub transitions: usize,
    pub errors: usize,
}

enum CheckSwept {
    Unchanged,
    Transitioned,
    Failed,
}

pub struct SweepScheduler {
    store: Arc<dyn Store>,
    dispatcher: Arc<Dispatcher>,
    locks: Arc<KeyedLocks>,
    interval: Duration,
    concurrency: usize,
}

impl SweepScheduler {
    pub fn new(
        store: Arc<dyn Store>,
        dispatcher: Arc<Dispatcher>,
        locks: Arc<KeyedLocks>,
        interval: Duration,
        concurrency: usize,
    ) -> Self {
        Self {
            store,
            dispatcher,
            locks,
            interval,
            concurrency: concurrency.max(1),
        }
    }

    /// Sweep every tick until `cancel` is triggered.
    pub async fn run(self, cancel: CancellationToken) {
        tracing::info!(
            interval_ms = self.interval.as_millis() as u64,
            concurrency = self.concurrency,
            "Sweep scheduler started"
        );

        let mut interval = tokio::time::interval(self.interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    tracing::info!("Sweep scheduler stopping");
                    break;
                }
                _ = interval.tick() => {
                    match self.sweep_once(Utc::now()).await {
                        Ok(report) if report.transitions > 0 || report.errors > 0 => {
                            tracing::info!(
                                checked = report.checked,
                                transitions = report.transitions,
                                errors = report.errors,
                                "Sweep finished"
                            );
                        }
                        Ok(_) => {}
                        Err(e) => {
                            tracing::error!(error = %e, "Sweep failed");
                        }
                    }
                }
            }
        }
    }

    /// Advance every overdue check once, then dispatch leftover flips.
    pub async fn sweep_once(&self, now: Timestamp) -> Result<SweepReport, StoreError> {
        let checks = self.store.list_sweepable_checks().await?;
        let mut report = SweepReport {
            checked: checks.len(),
            ..SweepReport::default()
        };

        let results: Vec<CheckSwept> = stream::iter(checks)
            .map(|check| self.sweep_check(check.id, now))
            .buffer_unordered(self.concurrency)
            .collect()
            .await;

        for result in results {
            match result {
                CheckSwept::Unchanged => {}
                CheckSwept::Transitioned => report.transitions += 1,
                CheckSwept::Failed => report.errors += 1,
            }
        }

        if let Err(e) = self
            .dispatcher
            .process_pending_flips(PENDING_FLIP_BATCH, now)
            .await
        {
            tracing::error!(error = %e, "Failed to dispatch pending flips");
            report.errors += 1;
        }

        Ok(report)
    }

    async fn sweep_check(&self, check_id: DbId, now: Timestamp) -> CheckSwept {
        match self.advance(check_id, now).await {
            Ok(Some((check, flip))) => {
                if let Err(e) = self.dispatcher.claim_and_dispatch(&check, &flip, now).await {
                    tracing::error!(
                        check_id,
                        flip_id = flip.id,
                        error = %e,
                        "Failed to dispatch flip"
                    );
                }
                CheckSwept::Transitioned
            }
            Ok(None) => CheckSwept::Unchanged,
            Err(e) => {
                tracing::error!(check_id, error = %e, "Failed to sweep check");
                CheckSwept::Failed
            }
        }
    }

    /// Apply a sweep to one check under its lock. Returns the updated
    /// check and its flip when the status moved.
    async fn advance(
        &self,
        check_id: DbId,
        now: Timestamp,
    ) -> Result<Option<(Check, Flip)>, StoreError> {
        let _guard = self.locks.lock(check_id).await;

        // Reload: a ping may have landed since the listing.
        let mut check = match self.store.find_check(check_id).await? {
            Some(check) if !check.is_deleted() => check,
            _ => return Ok(None),
        };

        let mut state = check.state()?;
        let transition = match state.sweep(now) {
            Ok(transition) if transition.occurred() => transition,
            Ok(_) => return Ok(None),
            Err(e) => {
                tracing::warn!(
                    check_id,
                    error = %e,
                    "Check is unschedulable, leaving status as is"
                );
                return Ok(None);
            }
        };

        let update = StateUpdate::from(&state);
        let commit = CheckCommit {
            check_id,
            expected_version: check.version,
            state: update.clone(),
            ping: None,
            flip: Some(NewFlip {
                created_at: now,
                old_status: transition.previous,
                new_status: transition.current,
            }),
        };

        let Some(committed) = self.store.commit(&commit).await? else {
            tracing::debug!(check_id, "Check changed under the sweep, skipping");
            return Ok(None);
        };

        check.apply(&update, committed.version);
        tracing::info!(
            check_id,
            from = %transition.previous,
            to = %transition.current,
            "Check status changed"
        );
        Ok(committed.flip.map(|flip| (check, flip)))
    }
}
