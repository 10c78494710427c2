//! Check lifecycle state machine.
//!
//! ```text
//!   new ──► up ⇄ grace ⇄ down        (pings and sweeps)
//!   new ──► down                     (fail ping)
//!   any non-paused ──► paused        (manual)
//!   paused ──► new                   (manual resume)
//! ```
//!
//! [`CheckState`] holds everything the transitions depend on. The
//! operations mutate it in place and report a [`TransitionResult`]; the
//! caller persists the new state together with a flip record when a
//! transition occurred, so a repeated call observes the new status and
//! reports nothing.

use chrono::Duration;

use crate::error::CoreError;
use crate::schedule::{evaluate, Phase, Schedule, ScheduleError};
use crate::status::{CheckStatus, PingKind};
use crate::types::Timestamp;

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// Mutable lifecycle state of one check.
#[derive(Debug, Clone)]
pub struct CheckState {
    pub schedule: Schedule,
    pub grace: Duration,
    pub status: CheckStatus,
    pub last_ping: Option<Timestamp>,
    /// Set by a `start` ping, cleared when the run completes.
    pub last_start: Option<Timestamp>,
    /// Duration of the most recently completed run.
    pub last_duration: Option<Duration>,
    pub n_pings: i64,
    /// When set, pings do not un-pause a paused check.
    pub manual_resume: bool,
}

/// Outcome of a state-machine operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransitionResult {
    pub previous: CheckStatus,
    pub current: CheckStatus,
}

impl TransitionResult {
    fn between(previous: CheckStatus, current: CheckStatus) -> Self {
        Self { previous, current }
    }

    fn unchanged(status: CheckStatus) -> Self {
        Self::between(status, status)
    }

    /// Whether the status actually changed.
    pub fn occurred(&self) -> bool {
        self.previous != self.current
    }
}

/// Result of [`CheckState::record_ping`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PingOutcome {
    /// Sequence number assigned to the ping.
    pub n: i64,
    pub transition: TransitionResult,
    /// Run duration, when this ping closed a started run.
    pub duration: Option<Duration>,
}

// ---------------------------------------------------------------------------
// Transitions
// ---------------------------------------------------------------------------

impl CheckState {
    /// A freshly registered check.
    pub fn new(schedule: Schedule, grace: Duration) -> Self {
        Self {
            schedule,
            grace,
            status: CheckStatus::New,
            last_ping: None,
            last_start: None,
            last_duration: None,
            n_pings: 0,
            manual_resume: false,
        }
    }

    /// Evaluate the schedule against the stored last ping.
    pub fn evaluate(&self, now: Timestamp) -> Result<Phase, ScheduleError> {
        evaluate(&self.schedule, self.last_ping, self.grace, now).map(|e| e.phase)
    }

    /// Apply one received ping.
    ///
    /// Every ping gets the next sequence number. Only `success` and `fail`
    /// pings move `last_ping`; `start` opens a run; `log` and `ign` are
    /// recorded without effect. A paused check with `manual_resume` set
    /// ignores every ping.
    pub fn record_ping(&mut self, kind: PingKind, now: Timestamp) -> PingOutcome {
        self.n_pings += 1;
        let previous = self.status;
        let mut duration = None;

        let kind = if previous == CheckStatus::Paused && self.manual_resume {
            PingKind::Ign
        } else {
            kind
        };

        match kind {
            PingKind::Start => {
                self.last_start = Some(now);
            }
            PingKind::Success | PingKind::Fail => {
                duration = self.close_run(now);
                self.last_ping = Some(now);
                self.status = if kind == PingKind::Fail {
                    CheckStatus::Down
                } else {
                    match self.evaluate(now) {
                        Ok(phase) => phase.into(),
                        // Unschedulable: leave the status where it was.
                        Err(_) => previous,
                    }
                };
            }
            PingKind::Log | PingKind::Ign => {}
        }

        PingOutcome {
            n: self.n_pings,
            transition: TransitionResult::between(previous, self.status),
            duration,
        }
    }

    /// Re-evaluate a check that received no ping.
    ///
    /// Only forward movement is applied (`up → grace → down`); `new`,
    /// `down` and `paused` checks are left alone. On a schedule error the
    /// state is untouched and the error is returned for the caller to log.
    pub fn sweep(&mut self, now: Timestamp) -> Result<TransitionResult, ScheduleError> {
        let previous = self.status;
        let current = match previous {
            CheckStatus::Up => Phase::Up,
            CheckStatus::Grace => Phase::Grace,
            CheckStatus::New | CheckStatus::Down | CheckStatus::Paused => {
                return Ok(TransitionResult::unchanged(previous));
            }
        };

        let phase = self.evaluate(now)?;
        if phase > current {
            self.status = phase.into();
        }

        Ok(TransitionResult::between(previous, self.status))
    }

    /// Manually pause the check.
    pub fn pause(&mut self) -> Result<TransitionResult, CoreError> {
        let previous = self.status;
        if previous == CheckStatus::Paused {
            return Err(CoreError::Conflict("check is already paused".to_string()));
        }
        self.status = CheckStatus::Paused;
        self.last_start = None;
        Ok(TransitionResult::between(previous, self.status))
    }

    /// Manually resume a paused check. Schedule position is cleared, so
    /// the check waits for its first ping again.
    pub fn resume(&mut self) -> Result<TransitionResult, CoreError> {
        let previous = self.status;
        if previous != CheckStatus::Paused {
            return Err(CoreError::Conflict("check is not paused".to_string()));
        }
        self.status = CheckStatus::New;
        self.last_ping = None;
        self.last_start = None;
        Ok(TransitionResult::between(previous, self.status))
    }

    fn close_run(&mut self, now: Timestamp) -> Option<Duration> {
        let started = self.last_start.take()?;
        let duration = now - started;
        self.last_duration = Some(duration);
        Some(duration)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
