use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex as StdMutex};

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;

use crate::deployment::{Checkpoint, Deployment};
use crate::error::StoreError;
use crate::plan::Plan;
use crate::store::{LockGuard, StateStore};

#[derive(Debug, Default)]
struct Inner {
    deployments: HashMap<String, Deployment>,
    plans: HashMap<String, Plan>,
}

/// In-memory implementation of [`StateStore`]. All data is lost on process
/// exit. Used by tests and as the default store when no [`STATE_DIR`] is
/// configured.
///
/// [`STATE_DIR`]: crate::file_store::FileStateStore
#[derive(Debug, Clone, Default)]
pub struct InMemoryStore {
    inner: Arc<RwLock<Inner>>,
    locks: Arc<StdMutex<HashSet<String>>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

struct MemoryLockGuard {
    deployment_id: String,
    locks: Arc<StdMutex<HashSet<String>>>,
}

impl LockGuard for MemoryLockGuard {
    fn deployment_id(&self) -> &str {
        &self.deployment_id
    }
}

impl Drop for MemoryLockGuard {
    fn drop(&mut self) {
        self.locks.lock().unwrap().remove(&self.deployment_id);
    }
}

#[async_trait]
impl StateStore for InMemoryStore {
    async fn load(&self, deployment_id: &str) -> Result<Option<Deployment>, StoreError> {
        let guard = self.inner.read().await;
        Ok(guard.deployments.get(deployment_id).cloned())
    }

    async fn save(&self, deployment: &Deployment) -> Result<(), StoreError> {
        let mut guard = self.inner.write().await;
        guard.deployments.insert(deployment.id.clone(), deployment.clone());
        Ok(())
    }

    async fn lock(&self, deployment_id: &str, timeout_ms: u64) -> Result<Box<dyn LockGuard>, StoreError> {
        let deadline = tokio::time::Instant::now() + std::time::Duration::from_millis(timeout_ms);
        loop {
            {
                let mut locks = self.locks.lock().unwrap();
                if !locks.contains(deployment_id) {
                    locks.insert(deployment_id.to_string());
                    return Ok(Box::new(MemoryLockGuard {
                        deployment_id: deployment_id.to_string(),
                        locks: self.locks.clone(),
                    }));
                }
            }
            if tokio::time::Instant::now() >= deadline {
                return Err(StoreError::Locked(deployment_id.to_string()));
            }
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        }
    }

    async fn checkpoint(&self, deployment_id: &str, description: &str) -> Result<Checkpoint, StoreError> {
        let mut guard = self.inner.write().await;
        let deployment = guard
            .deployments
            .get_mut(deployment_id)
            .ok_or_else(|| StoreError::NotFound(deployment_id.to_string()))?;
        let now = Utc::now();
        let checkpoint = Checkpoint {
            id: format!("{deployment_id}-{}", deployment.state_version),
            description: description.to_string(),
            created_at: now,
            resources: deployment.resources.clone(),
        };
        deployment.push_checkpoint(checkpoint.clone());
        Ok(checkpoint)
    }

    async fn rollback(&self, deployment_id: &str, checkpoint_id: &str) -> Result<Deployment, StoreError> {
        let mut guard = self.inner.write().await;
        let deployment = guard
            .deployments
            .get_mut(deployment_id)
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
        Ok(deployment.clone())
    }

    async fn store_plan(&self, plan: &Plan) -> Result<(), StoreError> {
        let mut guard = self.inner.write().await;
        guard.plans.insert(plan.id.clone(), plan.clone());
        Ok(())
    }

    async fn get_plan(&self, plan_id: &str) -> Result<Option<Plan>, StoreError> {
        let guard = self.inner.read().await;
        Ok(guard.plans.get(plan_id).cloned())
    }

    async fn list(&self) -> Result<Vec<String>, StoreError> {
        let guard = self.inner.read().await;
        Ok(guard.deployments.keys().cloned().collect())
    }

    async fn delete(&self, deployment_id: &str) -> Result<(), StoreError> {
        let mut guard = self.inner.write().await;
        guard.deployments.remove(deployment_id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn save_then_load_round_trips() {
        let store = InMemoryStore::new();
        let deployment = Deployment::new("d1", Utc::now());
        store.save(&deployment).await.unwrap();
        let loaded = store.load("d1").await.unwrap().unwrap();
        assert_eq!(loaded.id, "d1");
    }

    #[tokio::test]
    async fn list_returns_all_deployment_ids() {
        let store = InMemoryStore::new();
        store.save(&Deployment::new("a", Utc::now())).await.unwrap();
        store.save(&Deployment::new("b", Utc::now())).await.unwrap();
        let mut ids = store.list().await.unwrap();
        ids.sort();
        assert_eq!(ids, vec!["a", "b"]);
    }

    #[tokio::test]
    async fn checkpoint_then_rollback_restores_snapshot() {
        let store = InMemoryStore::new();
        let deployment = Deployment::new("d1", Utc::now());
        store.save(&deployment).await.unwrap();
        let checkpoint = store.checkpoint("d1", "before change").await.unwrap();

        let mut modified = store.load("d1").await.unwrap().unwrap();
        modified.resources.insert(
            netiac_domain::ResourceId::new("network:vlan", "guest"),
            netiac_domain::Resource::new(
                "guest",
                netiac_domain::ResourceKind::NetworkVlan(netiac_domain::VlanProperties {
                    interface: "igc1".into(),
                    tag: 10,
                    description: None,
                }),
                Utc::now(),
            ),
        );
        store.save(&modified).await.unwrap();

        let rolled_back = store.rollback("d1", &checkpoint.id).await.unwrap();
        assert!(rolled_back.resources.is_empty());
    }

    #[tokio::test]
    async fn lock_excludes_concurrent_holders() {
        let store = InMemoryStore::new();
        let _held = store.lock("d1", 1000).await.unwrap();
        let second = store.lock("d1", 50).await;
        assert!(matches!(second, Err(StoreError::Locked(_))));
    }
}
