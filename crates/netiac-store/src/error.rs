use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("deployment not found: {0}")]
    NotFound(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("deployment '{0}' is locked by another operation")]
    Locked(String),

    #[error("state version mismatch: expected {expected}, found {found}")]
    Stale { expected: u64, found: u64 },

    #[error("checkpoint not found: {0}")]
    CheckpointNotFound(String),

    #[error("plan not found: {0}")]
    PlanNotFound(String),

    #[error("state integrity error: {0}")]
    Integrity(String),
}

impl StoreError {
    pub fn code(&self) -> &'static str {
        match self {
            StoreError::NotFound(_) => "ValidationError",
            StoreError::Serialization(_) => "IntegrityError",
            StoreError::Io(_) => "IntegrityError",
            StoreError::Locked(_) => "ErrLocked",
            StoreError::Stale { .. } => "ErrStale",
            StoreError::CheckpointNotFound(_) => "ValidationError",
            StoreError::PlanNotFound(_) => "ValidationError",
            StoreError::Integrity(_) => "IntegrityError",
        }
    }
}
