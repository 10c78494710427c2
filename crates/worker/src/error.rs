use deadman_core::error::CoreError;
use deadman_db::StoreError;

/// Error type for ingestion, sweeping, administration and log queries.
#[derive(Debug, thiserror::Error)]
pub enum MonitorError {
    #[error(transparent)]
    Core(#[from] CoreError),

    #[error(transparent)]
    Store(#[from] StoreError),

    /// Every commit attempt lost the version race to another writer.
    #[error("check {code} is being updated concurrently ({attempts} attempts), try again")]
    Contention { code: String, attempts: usize },
}

pub type MonitorResult<T> = Result<T, MonitorError>;

impl MonitorError {
    pub(crate) fn contention(code: &str, attempts: usize) -> Self {
        MonitorError::Contention {
            code: code.to_string(),
            attempts,
        }
    }

    pub(crate) fn check_not_found(code: &str) -> Self {
        MonitorError::Core(CoreError::NotFound {
            entity: "check",
            key: code.to_string(),
        })
    }

    /// Whether the caller is at fault (bad input, unknown check) as opposed
    /// to an internal failure. Losing the version race is internal even
    /// though a retry may succeed.
    pub fn is_client_error(&self) -> bool {
        match self {
            MonitorError::Core(err) => !matches!(err, CoreError::Internal(_)),
            MonitorError::Store(_) | MonitorError::Contention { .. } => false,
        }
    }
}
