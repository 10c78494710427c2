//! Schedule evaluation: when is the next ping due, and which phase is a
//! check in right now.
//!
//! Two schedule kinds share one contract:
//!
//! - [`Schedule::Interval`] expects a ping every fixed period.
//! - [`Schedule::Cron`] expects a ping at each occurrence of a cron
//!   expression, evaluated on wall-clock time in an IANA timezone so
//!   occurrences stay at the intended local time across DST changes.
//!   A wall-clock time that happens twice resolves to its first
//!   occurrence; one skipped by the clocks going forward fires the same
//!   distance past the gap.
//!
//! [`evaluate`] is pure: the caller supplies `now`.

use std::str::FromStr;

use chrono::{Duration, LocalResult, NaiveDateTime, Offset, TimeZone, Utc};
use chrono_tz::Tz;

use crate::status::CheckStatus;
use crate::types::Timestamp;

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

/// Stored `kind` for fixed-interval schedules.
pub const KIND_SIMPLE: &str = "simple";

/// Stored `kind` for cron schedules.
pub const KIND_CRON: &str = "cron";

/// Shortest accepted interval or grace period (one minute).
pub const MIN_PERIOD_SECS: i64 = 60;

/// Longest accepted interval or grace period (365 days).
pub const MAX_PERIOD_SECS: i64 = 365 * 24 * 60 * 60;

/// Timezone used when a cron check does not name one.
pub const DEFAULT_TIMEZONE: &str = "UTC";

/// Day names indexed by Unix day-of-week number.
const WEEKDAYS: [&str; 7] = ["SUN", "MON", "TUE", "WED", "THU", "FRI", "SAT"];

// ---------------------------------------------------------------------------
// Error
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ScheduleError {
    #[error(
        "{field} must be between {min} and {max} seconds, got {got}",
        min = MIN_PERIOD_SECS,
        max = MAX_PERIOD_SECS
    )]
    PeriodOutOfRange { field: &'static str, got: i64 },

    #[error("invalid cron expression '{expr}': {reason}")]
    InvalidCron { expr: String, reason: String },

    #[error("unknown timezone '{0}'")]
    UnknownTimezone(String),

    #[error("unknown schedule kind '{0}'")]
    UnknownKind(String),

    /// The expression is valid but never fires again (e.g. a past year).
    #[error("cron expression '{0}' has no upcoming occurrence")]
    NoUpcomingOccurrence(String),

    #[error("next deadline is outside the representable time range")]
    DeadlineOutOfRange,
}

// ---------------------------------------------------------------------------
// Schedule
// ---------------------------------------------------------------------------

/// A validated cron expression bound to a timezone.
#[derive(Debug, Clone)]
pub struct CronSchedule {
    expression: String,
    timezone: Tz,
    compiled: cron::Schedule,
}

impl CronSchedule {
    /// Parse and validate a cron expression and timezone name.
    ///
    /// Classic five-field expressions (`min hour dom month dow`) are
    /// accepted with Unix day numbering (0 and 7 are Sunday) and run at
    /// second zero. Six- and seven-field expressions (with seconds, and
    /// optionally year) are used as given, with days numbered 1 (Sunday)
    /// to 7.
    pub fn new(expression: &str, timezone: &str) -> Result<Self, ScheduleError> {
        let expression = expression.trim();
        let fields: Vec<&str> = expression.split_whitespace().collect();
        let normalized = match fields.as_slice() {
            [minute, hour, dom, month, dow] => {
                let dow = unix_weekdays(dow).ok_or_else(|| ScheduleError::InvalidCron {
                    expr: expression.to_string(),
                    reason: format!("invalid day-of-week field '{dow}'"),
                })?;
                format!("0 {minute} {hour} {dom} {month} {dow}")
            }
            _ => expression.to_string(),
        };

        let compiled =
            cron::Schedule::from_str(&normalized).map_err(|e| ScheduleError::InvalidCron {
                expr: expression.to_string(),
                reason: e.to_string(),
            })?;

        let timezone: Tz = timezone
            .parse()
            .map_err(|_| ScheduleError::UnknownTimezone(timezone.to_string()))?;

        Ok(Self {
            expression: expression.to_string(),
            timezone,
            compiled,
        })
    }

    /// The expression as supplied by the user.
    pub fn expression(&self) -> &str {
        &self.expression
    }

    pub fn timezone(&self) -> Tz {
        self.timezone
    }

    /// First occurrence strictly after `after`.
    ///
    /// Occurrences are generated on naive wall-clock time (carried in a
    /// UTC value) and only then placed in the timezone.
    pub fn next_after(&self, after: Timestamp) -> Result<Timestamp, ScheduleError> {
        let wall = after.with_timezone(&self.timezone).naive_local();
        self.compiled
            .after(&Utc.from_utc_datetime(&wall))
            .filter_map(|occurrence| self.resolve_wall_clock(occurrence.naive_utc()))
            .find(|instant| *instant > after)
            .ok_or_else(|| ScheduleError::NoUpcomingOccurrence(self.expression.clone()))
    }

    fn resolve_wall_clock(&self, wall: NaiveDateTime) -> Option<Timestamp> {
        match self.timezone.from_local_datetime(&wall) {
            LocalResult::Single(local) => Some(local.with_timezone(&Utc)),
            LocalResult::Ambiguous(earliest, _) => Some(earliest.with_timezone(&Utc)),
            LocalResult::None => {
                // Skipped: read the time with the offset in force before the gap.
                let day_before = wall.checked_sub_signed(Duration::days(1))?;
                let offset = self.timezone.offset_from_utc_datetime(&day_before).fix();
                let utc = wall
                    .checked_sub_signed(Duration::seconds(i64::from(offset.local_minus_utc())))?;
                Some(Utc.from_utc_datetime(&utc))
            }
        }
    }
}

/// Rewrite a Unix day-of-week field as day names, which mean the same in
/// the six-field dialect. Fields already using names pass through.
fn unix_weekdays(field: &str) -> Option<String> {
    if field == "*" || field == "?" || field.chars().any(|c| c.is_ascii_alphabetic()) {
        return Some(field.to_string());
    }

    let mut days = [false; 7];
    for part in field.split(',') {
        let (range, step) = match part.split_once('/') {
            Some((range, step)) => (range, Some(step.parse::<usize>().ok().filter(|s| *s > 0)?)),
            None => (part, None),
        };
        let (first, last): (usize, usize) = match range.split_once('-') {
            _ if range == "*" => (0, 6),
            Some((first, last)) => (first.parse().ok()?, last.parse().ok()?),
            None => {
                let first = range.parse().ok()?;
                (first, if step.is_some() { 6 } else { first })
            }
        };
        if first > last || last > 7 {
            return None;
        }
        for day in (first..=last).step_by(step.unwrap_or(1)) {
            days[day % 7] = true;
        }
    }

    let names: Vec<&str> = WEEKDAYS
        .iter()
        .zip(days)
        .filter_map(|(name, on)| on.then_some(*name))
        .collect();
    Some(names.join(","))
}

/// When pings are expected.
#[derive(Debug, Clone)]
pub enum Schedule {
    /// A ping every fixed period.
    Interval(Duration),
    /// A ping at every occurrence of a cron expression.
    Cron(CronSchedule),
}

impl Schedule {
    /// A validated fixed-interval schedule.
    pub fn interval_secs(secs: i64) -> Result<Self, ScheduleError> {
        validate_period("interval", secs).map(Schedule::Interval)
    }

    /// A validated cron schedule.
    pub fn cron(expression: &str, timezone: &str) -> Result<Self, ScheduleError> {
        CronSchedule::new(expression, timezone).map(Schedule::Cron)
    }

    /// Rebuild a schedule from its stored columns.
    pub fn from_columns(
        kind: &str,
        timeout_secs: i64,
        expression: &str,
        timezone: &str,
    ) -> Result<Self, ScheduleError> {
        match kind {
            KIND_SIMPLE => Self::interval_secs(timeout_secs),
            KIND_CRON => Self::cron(expression, timezone),
            other => Err(ScheduleError::UnknownKind(other.to_string())),
        }
    }

    /// Stored `kind` column value.
    pub fn kind(&self) -> &'static str {
        match self {
            Schedule::Interval(_) => KIND_SIMPLE,
            Schedule::Cron(_) => KIND_CRON,
        }
    }

    /// When the next ping is due, given the last one.
    pub fn next_expected(&self, last_ping: Timestamp) -> Result<Timestamp, ScheduleError> {
        match self {
            Schedule::Interval(period) => last_ping
                .checked_add_signed(*period)
                .ok_or(ScheduleError::DeadlineOutOfRange),
            Schedule::Cron(cron) => cron.next_after(last_ping),
        }
    }
}

/// Validate a grace period in seconds.
pub fn grace_secs(secs: i64) -> Result<Duration, ScheduleError> {
    validate_period("grace", secs)
}

fn validate_period(field: &'static str, secs: i64) -> Result<Duration, ScheduleError> {
    if !(MIN_PERIOD_SECS..=MAX_PERIOD_SECS).contains(&secs) {
        return Err(ScheduleError::PeriodOutOfRange { field, got: secs });
    }
    Ok(Duration::seconds(secs))
}

// ---------------------------------------------------------------------------
// Evaluation
// ---------------------------------------------------------------------------

/// Schedule-derived phase of a check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Phase {
    New,
    Up,
    Grace,
    Down,
}

impl From<Phase> for CheckStatus {
    fn from(phase: Phase) -> Self {
        match phase {
            Phase::New => CheckStatus::New,
            Phase::Up => CheckStatus::Up,
            Phase::Grace => CheckStatus::Grace,
            Phase::Down => CheckStatus::Down,
        }
    }
}

/// Result of [`evaluate`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Evaluation {
    /// Deadline for the next ping; `None` until the first ping arrives.
    pub expected_next: Option<Timestamp>,
    pub phase: Phase,
}

/// Compute the next expected ping and the current phase.
///
/// - `up` while `now < expected_next`
/// - `grace` while `expected_next <= now < expected_next + grace`
/// - `down` once `now >= expected_next + grace`
/// - `new` when the check has never been pinged
pub fn evaluate(
    schedule: &Schedule,
    last_ping: Option<Timestamp>,
    grace: Duration,
    now: Timestamp,
) -> Result<Evaluation, ScheduleError> {
    let Some(last_ping) = last_ping else {
        return Ok(Evaluation {
            expected_next: None,
            phase: Phase::New,
        });
    };

    let expected_next = schedule.next_expected(last_ping)?;
    let down_at = expected_next
        .checked_add_signed(grace)
        .ok_or(ScheduleError::DeadlineOutOfRange)?;

    let phase = if now < expected_next {
        Phase::Up
    } else if now < down_at {
        Phase::Grace
    } else {
        Phase::Down
    };

    Ok(Evaluation {
        expected_next: Some(expected_next),
        phase,
    })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
