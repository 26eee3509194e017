use async_trait::async_trait;
use netiac_domain::Resource;

use crate::deployment::{Checkpoint, Deployment};
use crate::error::StoreError;
use crate::plan::Plan;

/// An exclusive hold on a deployment, released on drop.
pub trait LockGuard: Send {
    fn deployment_id(&self) -> &str;
}

#[async_trait]
pub trait StateStore: Send + Sync + 'static {
    async fn load(&self, deployment_id: &str) -> Result<Option<Deployment>, StoreError>;

    /// Atomic write-temp-then-rename; bumps `state_version` and
    /// `updated_at` as a side effect via [`Deployment::touch`], which the
    /// caller is expected to have already called.
    async fn save(&self, deployment: &Deployment) -> Result<(), StoreError>;

    /// Acquires an exclusive, timeout-bounded lock on a deployment.
    async fn lock(
        &self,
        deployment_id: &str,
        timeout_ms: u64,
    ) -> Result<Box<dyn LockGuard>, StoreError>;

    async fn checkpoint(&self, deployment_id: &str, description: &str) -> Result<Checkpoint, StoreError>;

    /// Creates an automatic pre-rollback checkpoint, then swaps the
    /// deployment's resource set to the target checkpoint's snapshot.
    async fn rollback(&self, deployment_id: &str, checkpoint_id: &str) -> Result<Deployment, StoreError>;

    async fn store_plan(&self, plan: &Plan) -> Result<(), StoreError>;

    async fn get_plan(&self, plan_id: &str) -> Result<Option<Plan>, StoreError>;

    async fn list(&self) -> Result<Vec<String>, StoreError>;

    async fn delete(&self, deployment_id: &str) -> Result<(), StoreError>;
}

/// Convenience used by `applyResource` and tests: read-modify-write a
/// single resource inside a deployment, creating the deployment if absent.
pub async fn upsert_resource(
    store: &dyn StateStore,
    deployment_id: &str,
    resource: Resource,
    now: chrono::DateTime<chrono::Utc>,
) -> Result<Deployment, StoreError> {
    let mut deployment = match store.load(deployment_id).await? {
        Some(d) => d,
        None => Deployment::new(deployment_id, now),
    };
    deployment.resources.insert(resource.id(), resource);
    deployment.touch(now);
    store.save(&deployment).await?;
    Ok(deployment)
}
