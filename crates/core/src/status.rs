//! Check status and ping kind enums.
//!
//! Both are stored as lowercase text columns; [`CheckStatus::as_str`] and
//! [`PingKind::as_str`] are the canonical database spellings.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::CoreError;

// ---------------------------------------------------------------------------
// CheckStatus
// ---------------------------------------------------------------------------

/// Lifecycle status of a check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CheckStatus {
    /// Never pinged (or resumed after a pause).
    New,
    /// Pinged within its schedule.
    Up,
    /// Past the expected deadline but still inside the grace period.
    Grace,
    /// Past deadline + grace, or failed explicitly.
    Down,
    /// Manually paused; the sweep ignores it.
    Paused,
}

impl CheckStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            CheckStatus::New => "new",
            CheckStatus::Up => "up",
            CheckStatus::Grace => "grace",
            CheckStatus::Down => "down",
            CheckStatus::Paused => "paused",
        }
    }

    /// Statuses the sweep needs to look at: only these can silently advance.
    pub fn is_sweepable(self) -> bool {
        matches!(self, CheckStatus::Up | CheckStatus::Grace)
    }
}

impl fmt::Display for CheckStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CheckStatus {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "new" => Ok(CheckStatus::New),
            "up" => Ok(CheckStatus::Up),
            "grace" => Ok(CheckStatus::Grace),
            "down" => Ok(CheckStatus::Down),
            "paused" => Ok(CheckStatus::Paused),
            other => Err(CoreError::Validation(format!(
                "unknown check status '{other}'"
            ))),
        }
    }
}

// ---------------------------------------------------------------------------
// PingKind
// ---------------------------------------------------------------------------

/// What a received ping signals.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PingKind {
    Success,
    Fail,
    Start,
    Log,
    Ign,
}

/// Highest exit status a ping may report (POSIX exit codes are 0..=255).
pub const MAX_EXIT_STATUS: i32 = 255;

impl PingKind {
    pub fn as_str(self) -> &'static str {
        match self {
            PingKind::Success => "success",
            PingKind::Fail => "fail",
            PingKind::Start => "start",
            PingKind::Log => "log",
            PingKind::Ign => "ign",
        }
    }

    /// Map a reported process exit status to a ping kind.
    ///
    /// `0` is a success, `1..=255` a failure; anything else is rejected.
    pub fn from_exit_status(exit_status: i32) -> Result<Self, CoreError> {
        match exit_status {
            0 => Ok(PingKind::Success),
            1..=MAX_EXIT_STATUS => Ok(PingKind::Fail),
            other => Err(CoreError::Validation(format!(
                "exit status must be between 0 and {MAX_EXIT_STATUS}, got {other}"
            ))),
        }
    }
}

impl fmt::Display for PingKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PingKind {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "success" => Ok(PingKind::Success),
            "fail" => Ok(PingKind::Fail),
            "start" => Ok(PingKind::Start),
            "log" => Ok(PingKind::Log),
            "ign" => Ok(PingKind::Ign),
            other => Err(CoreError::Validation(format!("unknown ping kind '{other}'"))),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    #[test]
    fn status_round_trips_through_text() {
        for status in [
            CheckStatus::New,
            CheckStatus::Up,
            CheckStatus::Grace,
            CheckStatus::Down,
            CheckStatus::Paused,
        ] {
            assert_eq!(status.as_str().parse::<CheckStatus>().unwrap(), status);
        }
    }

    #[test]
    fn unknown_status_is_rejected() {
        assert_matches!("started".parse::<CheckStatus>(), Err(CoreError::Validation(_)));
    }

    #[test]
    fn only_up_and_grace_are_sweepable() {
        assert!(CheckStatus::Up.is_sweepable());
        assert!(CheckStatus::Grace.is_sweepable());
        assert!(!CheckStatus::New.is_sweepable());
        assert!(!CheckStatus::Down.is_sweepable());
        assert!(!CheckStatus::Paused.is_sweepable());
    }

    #[test]
    fn exit_status_zero_is_success() {
        assert_eq!(PingKind::from_exit_status(0).unwrap(), PingKind::Success);
    }

    #[test]
    fn nonzero_exit_status_is_fail() {
        assert_eq!(PingKind::from_exit_status(1).unwrap(), PingKind::Fail);
        assert_eq!(PingKind::from_exit_status(255).unwrap(), PingKind::Fail);
    }

    #[test]
    fn out_of_range_exit_status_is_rejected() {
        assert_matches!(PingKind::from_exit_status(256), Err(CoreError::Validation(_)));
        assert_matches!(PingKind::from_exit_status(-1), Err(CoreError::Validation(_)));
    }

    #[test]
    fn ping_kind_serializes_lowercase() {
        let json = serde_json::to_string(&PingKind::Ign).unwrap();
        assert_eq!(json, "\"ign\"");
    }
}
