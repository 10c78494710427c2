//! Visibility and filtering rules for a check's event log.
//!
//! Only the most recent [`DEFAULT_PING_RETENTION`] pings of a check are
//! kept. Anything older than the oldest retained ping (notifications,
//! flips) belongs to history that is no longer visible and is left out
//! of the log, so an event is never shown without the pings around it.

use std::collections::HashSet;

use chrono::DateTime;

use crate::error::CoreError;
use crate::status::PingKind;
use crate::types::Timestamp;

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

/// Number of pings retained per check.
pub const DEFAULT_PING_RETENTION: i64 = 100;

/// Upper bound on events returned by a single log query.
pub const MAX_LOG_EVENTS: usize = 1000;

/// Query key carrying the lower-bound timestamp.
pub const PARAM_LOWER_BOUND: &str = "u";

/// Query key selecting the sort order (`asc` or `desc`).
pub const PARAM_ORDER: &str = "order";

// ---------------------------------------------------------------------------
// EventKind
// ---------------------------------------------------------------------------

/// Kinds of entries that can appear in a check's log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    Success,
    Fail,
    Start,
    Log,
    Ign,
    Notification,
    Flip,
}

impl EventKind {
    pub const ALL: [EventKind; 7] = [
        EventKind::Success,
        EventKind::Fail,
        EventKind::Start,
        EventKind::Log,
        EventKind::Ign,
        EventKind::Notification,
        EventKind::Flip,
    ];

    /// Query-string key enabling this kind.
    pub fn as_str(self) -> &'static str {
        match self {
            EventKind::Success => "success",
            EventKind::Fail => "fail",
            EventKind::Start => "start",
            EventKind::Log => "log",
            EventKind::Ign => "ign",
            EventKind::Notification => "notification",
            EventKind::Flip => "flip",
        }
    }

    fn from_key(key: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.as_str() == key)
    }
}

impl From<PingKind> for EventKind {
    fn from(kind: PingKind) -> Self {
        match kind {
            PingKind::Success => EventKind::Success,
            PingKind::Fail => EventKind::Fail,
            PingKind::Start => EventKind::Start,
            PingKind::Log => EventKind::Log,
            PingKind::Ign => EventKind::Ign,
        }
    }
}

// ---------------------------------------------------------------------------
// LogFilter
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortOrder {
    #[default]
    NewestFirst,
    OldestFirst,
}

/// Which events a log query returns.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogFilter {
    kinds: HashSet<EventKind>,
    /// Only events strictly newer than this are returned.
    pub since: Option<Timestamp>,
    pub order: SortOrder,
}

impl LogFilter {
    /// Every kind, no lower bound, newest first.
    pub fn all() -> Self {
        Self {
            kinds: EventKind::ALL.into_iter().collect(),
            since: None,
            order: SortOrder::default(),
        }
    }

    /// Build a filter from query-string pairs.
    ///
    /// Kind keys (`success`, `fail`, `start`, `log`, `ign`,
    /// `notification`, `flip`) are enabled by `on`, `1` or `true`. When no
    /// kind is enabled, all kinds are returned. `u` sets the lower bound
    /// (seconds since the epoch, fractional allowed) and `order` is `asc`
    /// or `desc`. Unknown keys are ignored.
    pub fn from_query<'a, I>(pairs: I) -> Result<Self, CoreError>
    where
        I: IntoIterator<Item = (&'a str, &'a str)>,
    {
        let mut kinds = HashSet::new();
        let mut since = None;
        let mut order = SortOrder::default();

        for (key, value) in pairs {
            if let Some(kind) = EventKind::from_key(key) {
                if matches!(value, "on" | "1" | "true") {
                    kinds.insert(kind);
                }
            } else if key == PARAM_LOWER_BOUND {
                since = Some(parse_lower_bound(value)?);
            } else if key == PARAM_ORDER {
                order = match value {
                    "asc" => SortOrder::OldestFirst,
                    "desc" => SortOrder::NewestFirst,
                    other => {
                        return Err(CoreError::Validation(format!(
                            "order must be 'asc' or 'desc', got '{other}'"
                        )))
                    }
                };
            }
        }

        if kinds.is_empty() {
            kinds = EventKind::ALL.into_iter().collect();
        }

        Ok(Self {
            kinds,
            since,
            order,
        })
    }

    pub fn includes(&self, kind: EventKind) -> bool {
        self.kinds.contains(&kind)
    }

    /// Whether an event of `kind` created at `created` passes the filter.
    pub fn admits(&self, kind: EventKind, created: Timestamp) -> bool {
        self.includes(kind) && self.since.map_or(true, |since| created > since)
    }
}

impl Default for LogFilter {
    fn default() -> Self {
        Self::all()
    }
}

// ---------------------------------------------------------------------------
// Parsing and visibility
// ---------------------------------------------------------------------------

/// Parse a lower-bound timestamp given as (fractional) epoch seconds.
///
/// Non-numeric, non-finite and out-of-range values are validation errors.
pub fn parse_lower_bound(raw: &str) -> Result<Timestamp, CoreError> {
    let invalid = || CoreError::Validation(format!("invalid timestamp '{raw}'"));

    let value: f64 = raw.trim().parse().map_err(|_| invalid())?;
    // i64::MAX as f64 rounds up, so compare strictly below it.
    if !value.is_finite() || value.abs() >= i64::MAX as f64 {
        return Err(invalid());
    }

    let secs = value.floor();
    let nanos = ((value - secs) * 1e9).round().min(999_999_999.0) as u32;
    DateTime::from_timestamp(secs as i64, nanos).ok_or_else(invalid)
}

/// Whether ping `n` is still retained after `n_pings` pings.
pub fn is_ping_visible(n: i64, n_pings: i64, retention: i64) -> bool {
    n > n_pings - retention
}

/// Smallest retained ping number.
pub fn first_visible_ping(n_pings: i64, retention: i64) -> i64 {
    (n_pings - retention).max(0) + 1
}

/// Whether a non-ping event belongs to visible history: it is not older
/// than the oldest visible ping. An event sharing that ping's timestamp
/// (the flip and notifications the ping caused) is visible.
///
/// With no visible ping there is nothing to anchor to and every event is
/// shown.
pub fn is_within_visible_history(
    created: Timestamp,
    oldest_visible_ping: Option<Timestamp>,
) -> bool {
    oldest_visible_ping.map_or(true, |oldest| created >= oldest)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
