use thiserror::Error;

#[derive(Debug, Error)]
pub enum DriverError {
    #[error("create failed for {type_id}: {message}")]
    CreateFailed { type_id: String, message: String, retryable: bool },

    #[error("update failed for {type_id}/{uuid}: {message}")]
    UpdateFailed { type_id: String, uuid: String, message: String, retryable: bool },

    #[error("delete failed for {type_id}/{uuid}: {message}")]
    DeleteFailed { type_id: String, uuid: String, message: String, retryable: bool },

    #[error("no object found for {type_id}/{uuid}")]
    NotFound { type_id: String, uuid: String },

    #[error("commit failed: {0}")]
    CommitFailed(String),

    #[error("driver call timed out after {0}ms")]
    Timeout(u64),

    #[error("internal driver error: {0}")]
    Internal(String),
}

impl DriverError {
    pub fn code(&self) -> &'static str {
        "DriverError"
    }

    /// Whether an [`crate::ApplianceDriver`] call with this error should be
    /// retried by the engine (up to `APPLY_RETRIES`) before being treated
    /// as fatal. Transport-level failures are retryable; semantic
    /// rejections from the appliance (bad payload, object not found) are
    /// not.
    pub fn retryable(&self) -> bool {
        match self {
            DriverError::CreateFailed { retryable, .. } => *retryable,
            DriverError::UpdateFailed { retryable, .. } => *retryable,
            DriverError::DeleteFailed { retryable, .. } => *retryable,
            DriverError::Timeout(_) => true,
            DriverError::NotFound { .. } | DriverError::CommitFailed(_) | DriverError::Internal(_) => false,
        }
    }
}
