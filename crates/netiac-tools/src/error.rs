use serde::{Deserialize, Serialize};

/// Transport-agnostic error shape returned in a [`crate::dispatch::ToolResponse`].
/// `code` is the stable table from the engine's error taxonomy; a caller
/// decides how to map it onto whatever transport it speaks.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolError {
    pub code: String,
    pub message: String,
    pub retryable: bool,
}

impl ToolError {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        ToolError { code: code.into(), message: message.into(), retryable: false }
    }

    pub fn retryable(code: impl Into<String>, message: impl Into<String>, retryable: bool) -> Self {
        ToolError { code: code.into(), message: message.into(), retryable }
    }
}

impl From<netiac_registry::RegistryError> for ToolError {
    fn from(e: netiac_registry::RegistryError) -> Self {
        ToolError::new(e.code(), e.to_string())
    }
}

impl From<netiac_store::StoreError> for ToolError {
    fn from(e: netiac_store::StoreError) -> Self {
        ToolError::new(e.code(), e.to_string())
    }
}

impl From<netiac_engine::EngineError> for ToolError {
    fn from(e: netiac_engine::EngineError) -> Self {
        ToolError::retryable(e.code(), e.to_string(), e.retryable())
    }
}

impl From<netiac_domain::DomainError> for ToolError {
    fn from(e: netiac_domain::DomainError) -> Self {
        ToolError::new("ValidationError", e.to_string())
    }
}
