use std::collections::HashMap;
use std::fs::OpenOptions;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex as StdMutex};

use async_trait::async_trait;
use chrono::Utc;

use crate::crypto;
use crate::deployment::{Checkpoint, Deployment};
use crate::error::StoreError;
use crate::plan::Plan;
use crate::store::{LockGuard, StateStore};

/// Persistent state store backed by one JSON file per deployment under
/// `STATE_DIR`, optionally AES-256-GCM-encrypted at rest.
///
/// Plans are transient by design — they don't need to survive a restart —
/// and are kept in an in-memory table alongside the on-disk deployments.
pub struct FileStateStore {
    dir: PathBuf,
    encryption_key: Option<String>,
    plans: StdMutex<HashMap<String, Plan>>,
}

impl FileStateStore {
    /// Opens (creating if absent) a file-backed store rooted at `dir`.
    /// `encryption_key` is required when at-rest encryption is enabled; its
    /// absence in that configuration is a fatal error at the caller's
    /// construction site, not here (the store itself works either way).
    pub fn open(dir: &Path, encryption_key: Option<String>) -> Result<Self, StoreError> {
        std::fs::create_dir_all(dir)?;
        Ok(FileStateStore { dir: dir.to_path_buf(), encryption_key, plans: StdMutex::new(HashMap::new()) })
    }

    fn path_for(&self, deployment_id: &str) -> PathBuf {
        self.dir.join(format!("{deployment_id}.json"))
    }

    fn lock_path_for(&self, deployment_id: &str) -> PathBuf {
        self.dir.join(format!("{deployment_id}.lock"))
    }

    fn read_deployment(&self, path: &Path) -> Result<Option<Deployment>, StoreError> {
        let bytes = match std::fs::read(path) {
            Ok(b) => b,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let json_bytes = match &self.encryption_key {
            Some(key) => {
                let record = String::from_utf8(bytes)
                    .map_err(|_| StoreError::Integrity("encrypted record is not valid utf-8".into()))?;
                crypto::decrypt(key, &record)?
            }
            None => bytes,
        };
        let deployment: Deployment = serde_json::from_slice(&json_bytes)?;
        Ok(Some(deployment))
    }

    fn write_deployment(&self, deployment: &Deployment) -> Result<(), StoreError> {
        let json = serde_json::to_vec_pretty(deployment)?;
        let payload: Vec<u8> = match &self.encryption_key {
            Some(key) => crypto::encrypt(key, &json)?.into_bytes(),
            None => json,
        };
        let final_path = self.path_for(&deployment.id);
        let tmp_path = self.dir.join(format!("{}.json.tmp", deployment.id));
        std::fs::write(&tmp_path, payload)?;
        std::fs::rename(&tmp_path, &final_path)?;
        Ok(())
    }
}

struct FileLockGuard {
    deployment_id: String,
    path: PathBuf,
}

impl LockGuard for FileLockGuard {
    fn deployment_id(&self) -> &str {
        &self.deployment_id
    }
}

impl Drop for FileLockGuard {
    fn drop(&mut self) {
        let _ = std::fs::remove_file(&self.path);
    }
}

#[async_trait]
impl StateStore for FileStateStore {
    async fn load(&self, deployment_id: &str) -> Result<Option<Deployment>, StoreError> {
        self.read_deployment(&self.path_for(deployment_id))
    }

    async fn save(&self, deployment: &Deployment) -> Result<(), StoreError> {
        self.write_deployment(deployment)
    }

    async fn lock(&self, deployment_id: &str, timeout_ms: u64) -> Result<Box<dyn LockGuard>, StoreError> {
        let path = self.lock_path_for(deployment_id);
        let deadline = tokio::time::Instant::now() + std::time::Duration::from_millis(timeout_ms);
        loop {
            match OpenOptions::new().write(true).create_new(true).open(&path) {
                Ok(_) => {
                    return Ok(Box::new(FileLockGuard { deployment_id: deployment_id.to_string(), path }))
                }
                Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {}
                Err(e) => return Err(e.into()),
            }
            if tokio::time::Instant::now() >= deadline {
                return Err(StoreError::Locked(deployment_id.to_string()));
            }
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        }
    }

    async fn checkpoint(&self, deployment_id: &str, description: &str) -> Result<Checkpoint, StoreError> {
        let mut deployment = self
            .read_deployment(&self.path_for(deployment_id))?
            .ok_or_else(|| StoreError::NotFound(deployment_id.to_string()))?;
        let checkpoint = Checkpoint {
            id: format!("{deployment_id}-{}", deployment.state_version),
            description: description.to_string(),
            created_at: Utc::now(),
            resources: deployment.resources.clone(),
        };
        deployment.push_checkpoint(checkpoint.clone());
        self.write_deployment(&deployment)?;
        Ok(checkpoint)
    }

    async fn rollback(&self, deployment_id: &str, checkpoint_id: &str) -> Result<Deployment, StoreError> {
        let mut deployment = self
            .read_deployment(&self.path_for(deployment_id))?
            .ok_or_else(|| StoreError::NotFound(deployment_id.to_string()))?;
        let target = deployment
            .checkpoint(checkpoint_id)
            .cloned()
            .ok_or_else(|| StoreError::CheckpointNotFound(checkpoint_id.to_string()))?;
        let now = Utc::now();
        let pre_rollback = Checkpoint {
            id: format!("{deployment_id}-{}-pre-rollback", deployment.state_version),
            description: format!("automatic snapshot before rollback to {checkpoint_id}"),
            created_at: now,
            resources: deployment.resources.clone(),
        };
        deployment.push_checkpoint(pre_rollback);
        deployment.resources = target.resources;
        deployment.touch(now);
        self.write_deployment(&deployment)?;
        Ok(deployment)
    }

    async fn store_plan(&self, plan: &Plan) -> Result<(), StoreError> {
        self.plans.lock().unwrap().insert(plan.id.clone(), plan.clone());
        Ok(())
    }

    async fn get_plan(&self, plan_id: &str) -> Result<Option<Plan>, StoreError> {
        Ok(self.plans.lock().unwrap().get(plan_id).cloned())
    }

    async fn list(&self) -> Result<Vec<String>, StoreError> {
        let mut ids = Vec::new();
        for entry in std::fs::read_dir(&self.dir)? {
            let entry = entry?;
            let name = entry.file_name();
            let name = name.to_string_lossy();
            if let Some(id) = name.strip_suffix(".json") {
                ids.push(id.to_string());
            }
        }
        Ok(ids)
    }

    async fn delete(&self, deployment_id: &str) -> Result<(), StoreError> {
        match std::fs::remove_file(self.path_for(deployment_id)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use netiac_domain::{Resource, ResourceKind, VlanProperties};

    fn sample_deployment(id: &str) -> Deployment {
        let mut deployment = Deployment::new(id, Utc::now());
        let resource = Resource::new(
            "guest",
            ResourceKind::NetworkVlan(VlanProperties { interface: "igc1".into(), tag: 100, description: None }),
            Utc::now(),
        );
        deployment.resources.insert(resource.id(), resource);
        deployment
    }

    #[tokio::test]
    async fn save_then_load_round_trips_unencrypted() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStateStore::open(dir.path(), None).unwrap();
        let deployment = sample_deployment("d1");
        store.save(&deployment).await.unwrap();
        let loaded = store.load("d1").await.unwrap().unwrap();
        assert_eq!(loaded, deployment);
    }

    #[tokio::test]
    async fn save_then_load_round_trips_encrypted() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStateStore::open(dir.path(), Some("super-secret".into())).unwrap();
        let deployment = sample_deployment("d1");
        store.save(&deployment).await.unwrap();

        let raw = std::fs::read_to_string(dir.path().join("d1.json")).unwrap();
        assert!(raw.contains(':'), "on-disk record should be iv:tag:ciphertext hex");
        assert!(!raw.contains("network:vlan"), "plaintext type id must not appear on disk");

        let loaded = store.load("d1").await.unwrap().unwrap();
        assert_eq!(loaded, deployment);
    }

    #[tokio::test]
    async fn wrong_key_surfaces_integrity_error() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStateStore::open(dir.path(), Some("correct-key".into())).unwrap();
        store.save(&sample_deployment("d1")).await.unwrap();

        let other = FileStateStore::open(dir.path(), Some("wrong-key".into())).unwrap();
        let err = other.load("d1").await.unwrap_err();
        assert_eq!(err.code(), "IntegrityError");
    }

    #[tokio::test]
    async fn load_missing_deployment_returns_none() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStateStore::open(dir.path(), None).unwrap();
        assert!(store.load("missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn lock_excludes_concurrent_holders_via_sidecar_file() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStateStore::open(dir.path(), None).unwrap();
        let guard = store.lock("d1", 500).await.unwrap();
        assert!(dir.path().join("d1.lock").exists());
        let second = store.lock("d1", 50).await;
        assert!(matches!(second, Err(StoreError::Locked(_))));
        drop(guard);
        assert!(!dir.path().join("d1.lock").exists());
    }

    #[tokio::test]
    async fn list_reports_saved_deployments() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStateStore::open(dir.path(), None).unwrap();
        store.save(&sample_deployment("a")).await.unwrap();
        store.save(&sample_deployment("b")).await.unwrap();
        let mut ids = store.list().await.unwrap();
        ids.sort();
        assert_eq!(ids, vec!["a", "b"]);
    }
}
