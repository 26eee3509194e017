use thiserror::Error;

#[derive(Debug, Error)]
pub enum DomainError {
    #[error("unknown resource type: {0}")]
    UnknownType(String),

    #[error("invalid resource name '{0}': must match ^[A-Za-z0-9-]+$")]
    InvalidName(String),

    #[error("validation failed for {path}: {message}")]
    Validation { path: String, message: String },

    #[error("malformed template reference: {0}")]
    MalformedTemplate(String),
}

impl DomainError {
    /// Stable string code surfaced through the Tool Surface error envelope.
    pub fn code(&self) -> &'static str {
        match self {
            DomainError::UnknownType(_) => "ValidationError",
            DomainError::InvalidName(_) => "ValidationError",
            DomainError::Validation { .. } => "ValidationError",
            DomainError::MalformedTemplate(_) => "UnresolvedReference",
        }
    }
}
