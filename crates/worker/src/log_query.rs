//! A check's event log: pings, flips and notifications merged into one
//! timeline.

use std::cmp::Ordering;
use std::sync::Arc;

use deadman_core::log_events::{
    first_visible_ping, EventKind, LogFilter, SortOrder, MAX_LOG_EVENTS,
};
use deadman_core::types::{DbId, Timestamp};
use deadman_db::models::flip::Flip;
use deadman_db::models::notification::Notification;
use deadman_db::models::ping::Ping;
use deadman_db::{EventWindow, Store};
use serde::Serialize;
use uuid::Uuid;

use crate::error::{MonitorError, MonitorResult};

// ---------------------------------------------------------------------------
// Params
// ---------------------------------------------------------------------------

/// Raw query parameters of a log request, as received.
#[derive(Debug, Clone, Default)]
pub struct LogParams {
    pairs: Vec<(String, String)>,
}

impl LogParams {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse an `a=b&c=d` query string. Keys without a value are treated
    /// as `on`.
    pub fn parse(query: &str) -> Self {
        let pairs = query
            .split('&')
            .filter(|part| !part.is_empty())
            .map(|part| match part.split_once('=') {
                Some((key, value)) => (key.to_string(), value.to_string()),
                None => (part.to_string(), "on".to_string()),
            })
            .collect();
        Self { pairs }
    }

    pub fn with(mut self, key: &str, value: &str) -> Self {
        self.pairs.push((key.to_string(), value.to_string()));
        self
    }

    /// Enable one event kind.
    pub fn kind(self, kind: EventKind) -> Self {
        self.with(kind.as_str(), "on")
    }

    fn filter(&self) -> MonitorResult<LogFilter> {
        Ok(LogFilter::from_query(
            self.pairs.iter().map(|(k, v)| (k.as_str(), v.as_str())),
        )?)
    }
}

// ---------------------------------------------------------------------------
// Events
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum LogEvent {
    Ping(Ping),
    Flip(Flip),
    Notification(Notification),
}

impl LogEvent {
    pub fn created_at(&self) -> Timestamp {
        match self {
            LogEvent::Ping(ping) => ping.created_at,
            LogEvent::Flip(flip) => flip.created_at,
            LogEvent::Notification(notification) => notification.created_at,
        }
    }

    /// Pings come before the flip they caused, which comes before its
    /// notifications.
    fn rank(&self) -> (u8, DbId) {
        match self {
            LogEvent::Ping(ping) => (0, ping.n),
            LogEvent::Flip(flip) => (1, flip.id),
            LogEvent::Notification(notification) => (2, notification.id),
        }
    }

    fn chronological(a: &LogEvent, b: &LogEvent) -> Ordering {
        a.created_at()
            .cmp(&b.created_at())
            .then_with(|| a.rank().cmp(&b.rank()))
    }
}

// ---------------------------------------------------------------------------
// LogQuery
// ---------------------------------------------------------------------------

pub struct LogQuery {
    store: Arc<dyn Store>,
    retention: i64,
}

impl LogQuery {
    pub fn new(store: Arc<dyn Store>, retention: i64) -> Self {
        Self { store, retention }
    }

    /// The visible events of the check `code` owned by `project_id`.
    ///
    /// A malformed code, an unknown or deleted check and a check owned by
    /// another project all fail with the same not-found error.
    pub async fn events(
        &self,
        project_id: DbId,
        code: &str,
        params: &LogParams,
    ) -> MonitorResult<Vec<LogEvent>> {
        let uuid = Uuid::parse_str(code).map_err(|_| MonitorError::check_not_found(code))?;
        let check = match self.store.find_check_by_code(uuid).await? {
            Some(check) if check.project_id == project_id => check,
            _ => return Err(MonitorError::check_not_found(code)),
        };
        let filter = params.filter()?;

        let min_n = first_visible_ping(check.n_pings, self.retention);
        let oldest_visible = if check.n_pings > 0 {
            self.store.oldest_ping_created_at(check.id, min_n).await?
        } else {
            None
        };
        let window = EventWindow {
            not_before: oldest_visible,
            after: filter.since,
        };

        let limit = MAX_LOG_EVENTS as i64;
        let mut events = Vec::new();

        let ping_kinds = [
            EventKind::Success,
            EventKind::Fail,
            EventKind::Start,
            EventKind::Log,
            EventKind::Ign,
        ];
        if ping_kinds.iter().any(|kind| filter.includes(*kind)) {
            let pings = self
                .store
                .list_pings(
                    check.id,
                    min_n,
                    filter.since,
                    filter.order,
                    limit.max(self.retention),
                )
                .await?;
            events.extend(
                pings
                    .into_iter()
                    .filter(|ping| {
                        ping.kind()
                            .is_ok_and(|kind| filter.includes(EventKind::from(kind)))
                    })
                    .map(LogEvent::Ping),
            );
        }

        if filter.includes(EventKind::Flip) {
            let flips = self
                .store
                .list_flips(check.id, window, filter.order, limit)
                .await?;
            events.extend(flips.into_iter().map(LogEvent::Flip));
        }

        if filter.includes(EventKind::Notification) {
            let notifications = self
                .store
                .list_notifications(check.id, window, filter.order, limit)
                .await?;
            events.extend(notifications.into_iter().map(LogEvent::Notification));
        }

        events.sort_by(LogEvent::chronological);
        if filter.order == SortOrder::NewestFirst {
            events.reverse();
        }
        events.truncate(MAX_LOG_EVENTS);
        Ok(events)
    }
}
