//! Notification channel kinds and delivery preferences.
//!
//! Kind constants must match the values stored in `channels.kind` and the
//! transports registered with the notifier.

use serde::Serialize;

use crate::status::CheckStatus;

/// Email delivered via SMTP.
pub const CHANNEL_EMAIL: &str = "email";

/// JSON POST to an external HTTP endpoint.
pub const CHANNEL_WEBHOOK: &str = "webhook";

// ---------------------------------------------------------------------------
// Direction
// ---------------------------------------------------------------------------

/// Which way a check moved, from the subscriber's point of view.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Up,
    Down,
}

/// Whether a status change is worth notifying, and in which direction.
///
/// Entering `down` from `new`, `up` or `grace` is a down event. Entering
/// `up` from `down` is an up event. Everything else is silent, including
/// every flip into or out of `paused`.
pub fn notify_direction(previous: CheckStatus, current: CheckStatus) -> Option<Direction> {
    use crate::status::CheckStatus::*;

    match (previous, current) {
        (New | Up | Grace, Down) => Some(Direction::Down),
        (Down, Up) => Some(Direction::Up),
        _ => None,
    }
}

// ---------------------------------------------------------------------------
// Preferences
// ---------------------------------------------------------------------------

/// Per-channel subscription to up and down events.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChannelPreferences {
    pub notify_up: bool,
    pub notify_down: bool,
}

impl ChannelPreferences {
    pub fn wants(&self, direction: Direction) -> bool {
        match direction {
            Direction::Up => self.notify_up,
            Direction::Down => self.notify_down,
        }
    }
}

impl Default for ChannelPreferences {
    fn default() -> Self {
        Self {
            notify_up: true,
            notify_down: true,
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
