use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::debug;
use uuid::Uuid;

use crate::driver::{ApplianceDriver, CreateResult, DriverObject};
use crate::error::DriverError;

/// A stub driver that simulates the appliance locally.
///
/// - Produces synthetic uuids and stubbed outputs.
/// - Performs no actual I/O.
/// - Used by tests, dry-run output synthesis, and as the default when no
///   real driver is configured.
#[derive(Debug, Default)]
pub struct MockDriver {
    objects: Mutex<HashMap<String, Value>>,
    committed: Mutex<bool>,
}

impl MockDriver {
    pub fn new() -> Self {
        Self { objects: Mutex::new(HashMap::new()), committed: Mutex::new(true) }
    }

    fn key(type_id: &str, uuid: &str) -> String {
        format!("{type_id}/{uuid}")
    }

    /// Stub outputs for a subset of well-known property shapes; anything
    /// else produces an empty object.
    fn stub_outputs(type_id: &str, payload: &Value) -> Value {
        match type_id {
            "network:vlan" => {
                let interface = payload.get("interface").and_then(Value::as_str).unwrap_or("igc0");
                let tag = payload.get("tag").and_then(Value::as_u64).unwrap_or(0);
                json!({ "deviceName": format!("{interface}.{tag}") })
            }
            _ => json!({}),
        }
    }
}

#[async_trait]
impl ApplianceDriver for MockDriver {
    fn name(&self) -> &'static str {
        "mock"
    }

    async fn create(&self, type_id: &str, payload: &Value) -> Result<CreateResult, DriverError> {
        let uuid = Uuid::new_v4().to_string();
        debug!(type_id, %uuid, "MockDriver: create");
        let outputs = Self::stub_outputs(type_id, payload);
        self.objects.lock().unwrap().insert(Self::key(type_id, &uuid), payload.clone());
        *self.committed.lock().unwrap() = false;
        Ok(CreateResult { uuid, outputs })
    }

    async fn update(&self, type_id: &str, uuid: &str, payload: &Value) -> Result<Value, DriverError> {
        debug!(type_id, uuid, "MockDriver: update");
        let key = Self::key(type_id, uuid);
        let mut objects = self.objects.lock().unwrap();
        if !objects.contains_key(&key) {
            return Err(DriverError::NotFound { type_id: type_id.to_string(), uuid: uuid.to_string() });
        }
        objects.insert(key, payload.clone());
        drop(objects);
        *self.committed.lock().unwrap() = false;
        Ok(Self::stub_outputs(type_id, payload))
    }

    async fn delete(&self, type_id: &str, uuid: &str) -> Result<(), DriverError> {
        debug!(type_id, uuid, "MockDriver: delete");
        let removed = self.objects.lock().unwrap().remove(&Self::key(type_id, uuid));
        if removed.is_none() {
            return Err(DriverError::NotFound { type_id: type_id.to_string(), uuid: uuid.to_string() });
        }
        *self.committed.lock().unwrap() = false;
        Ok(())
    }

    async fn get(&self, type_id: &str, uuid: &str) -> Result<Value, DriverError> {
        self.objects
            .lock()
            .unwrap()
            .get(&Self::key(type_id, uuid))
            .cloned()
            .ok_or_else(|| DriverError::NotFound { type_id: type_id.to_string(), uuid: uuid.to_string() })
    }

    async fn list(&self, type_id: &str) -> Result<Vec<DriverObject>, DriverError> {
        let prefix = format!("{type_id}/");
        Ok(self
            .objects
            .lock()
            .unwrap()
            .iter()
            .filter_map(|(key, payload)| {
                key.strip_prefix(&prefix).map(|uuid| DriverObject { uuid: uuid.to_string(), payload: payload.clone() })
            })
            .collect())
    }

    async fn apply(&self) -> Result<(), DriverError> {
        debug!("MockDriver: apply");
        *self.committed.lock().unwrap() = true;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn create_stubs_vlan_device_name() {
        let driver = MockDriver::new();
        let result = driver.create("network:vlan", &json!({"interface": "igc1", "tag": 100})).await.unwrap();
        assert_eq!(result.outputs["deviceName"], "igc1.100");
    }

    #[tokio::test]
    async fn get_after_create_returns_stored_payload() {
        let driver = MockDriver::new();
        let result = driver.create("network:vlan", &json!({"interface": "igc1", "tag": 100})).await.unwrap();
        let fetched = driver.get("network:vlan", &result.uuid).await.unwrap();
        assert_eq!(fetched["tag"], 100);
    }

    #[tokio::test]
    async fn delete_unknown_object_is_not_found() {
        let driver = MockDriver::new();
        let err = driver.delete("network:vlan", "missing").await.unwrap_err();
        assert!(matches!(err, DriverError::NotFound { .. }));
    }

    #[tokio::test]
    async fn list_only_returns_matching_type() {
        let driver = MockDriver::new();
        driver.create("network:vlan", &json!({"interface": "igc1", "tag": 100})).await.unwrap();
        driver.create("firewall:rule", &json!({})).await.unwrap();
        let vlans = driver.list("network:vlan").await.unwrap();
        assert_eq!(vlans.len(), 1);
    }
}
