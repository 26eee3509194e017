use thiserror::Error;

use netiac_domain::ResourceId;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("registry error: {0}")]
    Registry(#[from] netiac_registry::RegistryError),

    #[error("store error: {0}")]
    Store(#[from] netiac_store::StoreError),

    #[error("driver error: {0}")]
    Driver(#[from] netiac_driver::DriverError),

    #[error("template reference '${{{}:{}.{}}}' did not resolve to any known output", .0.type_id, .0.name, .0.output)]
    UnresolvedReference(netiac_domain::template::TemplateRef),

    #[error("deployment not found: {0}")]
    DeploymentNotFound(String),

    #[error("plan {plan_id} is stale: deployment is at version {found}, plan was computed against {expected}")]
    Stale { plan_id: String, expected: u64, found: u64 },

    #[error("rollback failed for {resource_id} while undoing change {change_index}: {message}")]
    RollbackFailed { resource_id: ResourceId, change_index: usize, message: String },

    #[error("internal engine error: {0}")]
    Internal(String),
}

impl EngineError {
    pub fn code(&self) -> &'static str {
        match self {
            EngineError::Registry(e) => e.code(),
            EngineError::Store(e) => e.code(),
            EngineError::Driver(_) => "DriverError",
            EngineError::UnresolvedReference(_) => "UnresolvedReference",
            EngineError::DeploymentNotFound(_) => "ValidationError",
            EngineError::Stale { .. } => "ErrStale",
            EngineError::RollbackFailed { .. } => "RollbackFailed",
            EngineError::Internal(_) => "ValidationError",
        }
    }

    pub fn retryable(&self) -> bool {
        matches!(self, EngineError::Driver(e) if e.retryable())
    }
}
