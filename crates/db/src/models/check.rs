//! Check entity model, registration DTO and state update.

use chrono::Duration;
use deadman_core::error::CoreError;
use deadman_core::schedule::{self, Schedule, DEFAULT_TIMEZONE, KIND_CRON, KIND_SIMPLE};
use deadman_core::state_machine::CheckState;
use deadman_core::status::CheckStatus;
use deadman_core::types::{CheckCode, DbId, Timestamp};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Interval stored for checks registered without one (one day).
pub const DEFAULT_TIMEOUT_SECS: i64 = 86_400;

/// Grace stored for checks registered without one (one hour).
pub const DEFAULT_GRACE_SECS: i64 = 3_600;

/// Cron expression stored for interval checks.
pub const DEFAULT_CRON: &str = "* * * * *";

/// A row from the `checks` table.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Check {
    pub id: DbId,
    /// Public identifier pinged by clients.
    pub code: CheckCode,
    pub project_id: DbId,
    pub name: String,
    pub kind: String,
    pub timeout_secs: i64,
    pub schedule: String,
    pub tz: String,
    pub grace_secs: i64,
    pub status: String,
    pub last_ping: Option<Timestamp>,
    pub last_start: Option<Timestamp>,
    pub last_duration_ms: Option<i64>,
    pub n_pings: i64,
    pub manual_resume: bool,
    pub version: i64,
    pub created_at: Timestamp,
    pub deleted_at: Option<Timestamp>,
}

impl Check {
    pub fn status(&self) -> Result<CheckStatus, CoreError> {
        self.status.parse()
    }

    pub fn is_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }

    /// Rebuild the validated schedule from the stored columns.
    pub fn schedule(&self) -> Result<Schedule, CoreError> {
        Ok(Schedule::from_columns(
            &self.kind,
            self.timeout_secs,
            &self.schedule,
            &self.tz,
        )?)
    }

    /// Lift the row into the state machine's representation.
    pub fn state(&self) -> Result<CheckState, CoreError> {
        Ok(CheckState {
            schedule: self.schedule()?,
            grace: Duration::seconds(self.grace_secs),
            status: self.status()?,
            last_ping: self.last_ping,
            last_start: self.last_start,
            last_duration: self.last_duration_ms.map(Duration::milliseconds),
            n_pings: self.n_pings,
            manual_resume: self.manual_resume,
        })
    }

    /// Copy a committed state back onto this row.
    pub fn apply(&mut self, update: &StateUpdate, version: i64) {
        self.status = update.status.as_str().to_string();
        self.last_ping = update.last_ping;
        self.last_start = update.last_start;
        self.last_duration_ms = update.last_duration_ms;
        self.n_pings = update.n_pings;
        self.version = version;
    }
}

/// DTO for registering a new check.
#[derive(Debug, Clone, Deserialize)]
pub struct CreateCheck {
    pub project_id: DbId,
    pub name: String,
    /// `simple` or `cron`.
    pub kind: String,
    pub timeout_secs: Option<i64>,
    pub schedule: Option<String>,
    pub tz: Option<String>,
    pub grace_secs: Option<i64>,
    #[serde(default)]
    pub manual_resume: bool,
}

impl CreateCheck {
    /// A fixed-interval check.
    pub fn interval(project_id: DbId, name: &str, timeout_secs: i64, grace_secs: i64) -> Self {
        Self {
            project_id,
            name: name.to_string(),
            kind: KIND_SIMPLE.to_string(),
            timeout_secs: Some(timeout_secs),
            schedule: None,
            tz: None,
            grace_secs: Some(grace_secs),
            manual_resume: false,
        }
    }

    /// A cron check evaluated in `tz`.
    pub fn cron(project_id: DbId, name: &str, expression: &str, tz: &str, grace_secs: i64) -> Self {
        Self {
            project_id,
            name: name.to_string(),
            kind: KIND_CRON.to_string(),
            timeout_secs: None,
            schedule: Some(expression.to_string()),
            tz: Some(tz.to_string()),
            grace_secs: Some(grace_secs),
            manual_resume: false,
        }
    }

    pub fn timeout_secs(&self) -> i64 {
        self.timeout_secs.unwrap_or(DEFAULT_TIMEOUT_SECS)
    }

    pub fn grace_secs(&self) -> i64 {
        self.grace_secs.unwrap_or(DEFAULT_GRACE_SECS)
    }

    pub fn schedule_expression(&self) -> &str {
        self.schedule.as_deref().unwrap_or(DEFAULT_CRON)
    }

    pub fn tz(&self) -> &str {
        self.tz.as_deref().unwrap_or(DEFAULT_TIMEZONE)
    }

    /// Validate the schedule configuration. Runs before anything is
    /// written so a malformed schedule never reaches the evaluator.
    pub fn validate(&self) -> Result<Schedule, CoreError> {
        schedule::grace_secs(self.grace_secs())?;

        if self.kind == KIND_CRON && self.schedule.is_none() {
            return Err(CoreError::Validation(
                "cron checks require a schedule expression".to_string(),
            ));
        }

        Ok(Schedule::from_columns(
            &self.kind,
            self.timeout_secs(),
            self.schedule_expression(),
            self.tz(),
        )?)
    }
}

/// State columns written by a commit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StateUpdate {
    pub status: CheckStatus,
    pub last_ping: Option<Timestamp>,
    pub last_start: Option<Timestamp>,
    pub last_duration_ms: Option<i64>,
    pub n_pings: i64,
}

impl From<&CheckState> for StateUpdate {
    fn from(state: &CheckState) -> Self {
        Self {
            status: state.status,
            last_ping: state.last_ping,
            last_start: state.last_start,
            last_duration_ms: state.last_duration.map(|d| d.num_milliseconds()),
            n_pings: state.n_pings,
        }
    }
}
