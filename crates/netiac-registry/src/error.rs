use thiserror::Error;

use netiac_domain::ResourceId;

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("registry is frozen; cannot register new types")]
    Frozen,

    #[error("type '{type_id}' is already registered with a different factory")]
    DuplicateType { type_id: String },

    #[error("unknown resource type: {0}")]
    UnknownType(String),

    #[error("properties for type '{type_id}' do not match its schema: {message}")]
    SchemaMismatch { type_id: String, message: String },

    #[error("dependency cycle detected, participants: {}", .participants.iter().map(ToString::to_string).collect::<Vec<_>>().join(", "))]
    Cycle { participants: Vec<ResourceId> },
}

impl RegistryError {
    pub fn code(&self) -> &'static str {
        match self {
            RegistryError::Frozen => "ValidationError",
            RegistryError::DuplicateType { .. } => "ValidationError",
            RegistryError::UnknownType(_) => "ValidationError",
            RegistryError::SchemaMismatch { .. } => "ValidationError",
            RegistryError::Cycle { .. } => "CycleError",
        }
    }
}
