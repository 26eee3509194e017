use async_trait::async_trait;
use serde_json::Value;

use crate::error::DriverError;

/// Result of a successful `create` call: the driver-assigned handle and any
/// outputs the appliance produced (e.g. `deviceName`, `ruleUuid`).
#[derive(Debug, Clone)]
pub struct CreateResult {
    pub uuid: String,
    pub outputs: Value,
}

/// A single object as currently known to the appliance, returned by `list`.
#[derive(Debug, Clone)]
pub struct DriverObject {
    pub uuid: String,
    pub payload: Value,
}

/// Abstract port onto the network appliance. The only I/O collaborator in
/// the system; the engine never talks to the appliance any other way.
///
/// Verb-uniform across all resource kinds: the kind only affects the shape
/// of `payload`, carried opaquely as JSON. `apply` is a process-wide commit
/// (two-phase commit model) and must be called at most once per wave, after
/// every in-wave `create`/`update`/`delete` call has succeeded.
#[async_trait]
pub trait ApplianceDriver: Send + Sync + 'static {
    fn name(&self) -> &'static str;

    async fn create(&self, type_id: &str, payload: &Value) -> Result<CreateResult, DriverError>;

    async fn update(&self, type_id: &str, uuid: &str, payload: &Value) -> Result<Value, DriverError>;

    async fn delete(&self, type_id: &str, uuid: &str) -> Result<(), DriverError>;

    async fn get(&self, type_id: &str, uuid: &str) -> Result<Value, DriverError>;

    async fn list(&self, type_id: &str) -> Result<Vec<DriverObject>, DriverError>;

    /// Commits every pending create/update/delete issued since the last
    /// `apply`. Must not be called when any in-wave call this round failed.
    async fn apply(&self) -> Result<(), DriverError>;
}
