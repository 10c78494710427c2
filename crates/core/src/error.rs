use crate::schedule::ScheduleError;

#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    /// The entity does not exist or is not visible to the caller.
    #[error("{entity} not found: {key}")]
    NotFound { entity: &'static str, key: String },

    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<ScheduleError> for CoreError {
    fn from(err: ScheduleError) -> Self {
        CoreError::Validation(err.to_string())
    }
}
