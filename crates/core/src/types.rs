/// All database primary keys are PostgreSQL BIGSERIAL.
pub type DbId = i64;

/// All timestamps are UTC.
pub type Timestamp = chrono::DateTime<chrono::Utc>;

/// Public identifier of a check, used in ping URLs and log queries.
pub type CheckCode = uuid::Uuid;
