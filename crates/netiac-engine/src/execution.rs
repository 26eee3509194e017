use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use netiac_domain::{LifecycleState, Resource, ResourceId};
use netiac_driver::{ApplianceDriver, DriverError};
use netiac_store::{ChangeKind, Deployment, ExecutionWave, Plan, ResourceChange, StateStore};
use serde_json::Value;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::error::EngineError;

/// Fixed backoff sequence for retryable driver errors, per `APPLY_RETRIES`.
const BACKOFF_MS: [u64; 3] = [1_000, 4_000, 16_000];

#[derive(Debug, Clone)]
pub struct ExecuteOptions {
    pub continue_on_error: bool,
    pub max_concurrency: usize,
    pub change_timeout: Duration,
    pub apply_retries: u32,
    pub dry_run: bool,
}

impl Default for ExecuteOptions {
    fn default() -> Self {
        ExecuteOptions {
            continue_on_error: false,
            max_concurrency: 1,
            change_timeout: Duration::from_secs(30),
            apply_retries: 3,
            dry_run: false,
        }
    }
}

#[derive(Debug, Clone)]
pub struct FailedChange {
    pub resource_id: ResourceId,
    pub reason: String,
    pub retryable: bool,
}

#[derive(Debug, Clone)]
pub struct ChangeResult {
    pub resource_id: ResourceId,
    pub ok: bool,
    pub outputs: Value,
    pub duration_ms: u64,
}

#[derive(Debug, Clone)]
pub struct ExecutionResult {
    pub executed: Vec<ResourceId>,
    pub results: Vec<ChangeResult>,
    pub failed: Vec<FailedChange>,
    pub rolled_back: bool,
}

struct CommittedStep {
    change: ResourceChange,
}

/// Executes a plan's waves sequentially, up to `max_concurrency` changes
/// concurrently within each wave. Checkpoints after every successful wave;
/// on fatal failure, inverts every committed step in reverse insertion
/// order.
pub async fn apply(
    store: Arc<dyn StateStore>,
    driver: Arc<dyn ApplianceDriver>,
    plan: &Plan,
    options: ExecuteOptions,
    cancel: CancellationToken,
) -> Result<ExecutionResult, EngineError> {
    let existing = store.load(&plan.deployment_id).await?;
    let base_version = existing.as_ref().map(|d| d.state_version).unwrap_or(0);

    if base_version != plan.base_state_version {
        return Err(EngineError::Stale { plan_id: plan.id.clone(), expected: plan.base_state_version, found: base_version });
    }

    let mut symbols: BTreeMap<ResourceId, BTreeMap<String, Value>> =
        existing.as_ref().map(|d| d.resources.iter().map(|(id, r)| (id.clone(), r.outputs.clone())).collect()).unwrap_or_default();

    let mut deployment = existing.unwrap_or_else(|| Deployment::new(plan.deployment_id.clone(), Utc::now()));

    let pre_plan_resources = deployment.resources.clone();
    let mut committed: Vec<CommittedStep> = Vec::new();
    let mut results: Vec<ChangeResult> = Vec::new();
    let mut failed: Vec<FailedChange> = Vec::new();
    let mut fatal = false;

    for (wave_index, wave) in plan.execution_waves.iter().enumerate() {
        if cancel.is_cancelled() {
            warn!(wave = wave_index, "cancellation observed before wave started; treating as wave failure");
            fatal = true;
            break;
        }

        let outcomes = run_wave(&driver, wave, &options, &symbols).await;
        let mut wave_had_success = false;

        for (change, outcome) in wave.changes.iter().zip(outcomes.into_iter()) {
            match outcome {
                Ok((resource, result)) => {
                    results.push(result);
                    match change.kind {
                        ChangeKind::Delete => {
                            symbols.remove(&change.resource.id());
                        }
                        _ => {
                            symbols.insert(resource.id(), resource.outputs.clone());
                        }
                    }
                    apply_to_deployment(&mut deployment, change, resource);
                    committed.push(CommittedStep { change: change.clone() });
                    wave_had_success = true;
                }
                Err(e) => {
                    failed.push(FailedChange { resource_id: change.resource.id(), reason: e.to_string(), retryable: e.retryable() });
                    if !options.continue_on_error {
                        fatal = true;
                    }
                }
            }
        }

        if wave_had_success && !options.dry_run {
            if let Err(e) = driver.apply().await {
                failed.push(FailedChange {
                    resource_id: ResourceId::new("engine", &format!("wave-{wave_index}-commit")),
                    reason: e.to_string(),
                    retryable: e.retryable(),
                });
                fatal = true;
            }
        }

        if !options.dry_run {
            deployment.touch(Utc::now());
            store.save(&deployment).await?;
            store.checkpoint(&deployment.id, &format!("wave-{wave_index}")).await?;
        }

        if fatal {
            break;
        }
    }

    let rolled_back = if fatal && !options.continue_on_error && !options.dry_run {
        match rollback_committed(&driver, &committed).await {
            Ok(()) => {
                deployment.resources = pre_plan_resources;
                deployment.touch(Utc::now());
                store.save(&deployment).await?;
                true
            }
            Err(e) => {
                deployment.partially_rolled_back = true;
                deployment.touch(Utc::now());
                store.save(&deployment).await?;
                return Err(e);
            }
        }
    } else {
        false
    };

    info!(
        deployment_id = %plan.deployment_id,
        executed = committed.len(),
        failed = failed.len(),
        rolled_back,
        "apply complete"
    );

    Ok(ExecutionResult { executed: committed.iter().map(|c| c.change.resource.id()).collect(), results, failed, rolled_back })
}

async fn run_wave(
    driver: &Arc<dyn ApplianceDriver>,
    wave: &ExecutionWave,
    options: &ExecuteOptions,
    symbols: &BTreeMap<ResourceId, BTreeMap<String, Value>>,
) -> Vec<Result<(Resource, ChangeResult), EngineError>> {
    let semaphore = Arc::new(Semaphore::new(options.max_concurrency.max(1)));
    let mut handles = Vec::with_capacity(wave.changes.len());

    for change in wave.changes.clone() {
        let semaphore = semaphore.clone();
        let timeout = options.change_timeout;
        let retries = options.apply_retries;

        if options.dry_run {
            handles.push(tokio::spawn(async move {
                let _permit = semaphore.acquire_owned().await.expect("semaphore is never closed");
                let started = Instant::now();
                let resource = simulate(&change);
                let result = ChangeResult {
                    resource_id: resource.id(),
                    ok: true,
                    outputs: serde_json::to_value(&resource.outputs).unwrap_or(Value::Null),
                    duration_ms: started.elapsed().as_millis() as u64,
                };
                Ok((resource, result))
            }));
            continue;
        }

        let payload = match resolve_payload(&change, symbols) {
            Ok(payload) => payload,
            Err(e) => {
                handles.push(tokio::spawn(async move { Err(e) }));
                continue;
            }
        };

        let driver = driver.clone();
        handles.push(tokio::spawn(async move {
            let _permit = semaphore.acquire_owned().await.expect("semaphore is never closed");
            let started = Instant::now();
            let outcome = execute_change(driver.as_ref(), &change, &payload, timeout, retries).await;
            let duration_ms = started.elapsed().as_millis() as u64;
            outcome.map(|resource| {
                let result = ChangeResult {
                    resource_id: resource.id(),
                    ok: true,
                    outputs: serde_json::to_value(&resource.outputs).unwrap_or(Value::Null),
                    duration_ms,
                };
                (resource, result)
            })
        }));
    }

    let mut outcomes = Vec::with_capacity(handles.len());
    for handle in handles {
        outcomes.push(handle.await.unwrap_or_else(|e| Err(EngineError::Internal(format!("wave task panicked: {e}")))));
    }
    outcomes
}

/// Substitutes every `${type:name.output}` reference in a change's payload
/// using the plan-scoped symbol table, which is seeded from the existing
/// deployment's outputs and updated as earlier waves commit. `Delete`
/// changes carry no payload.
fn resolve_payload(
    change: &ResourceChange,
    symbols: &BTreeMap<ResourceId, BTreeMap<String, Value>>,
) -> Result<Value, EngineError> {
    if matches!(change.kind, ChangeKind::Delete) {
        return Ok(Value::Null);
    }
    let payload = change.resource.kind.to_api_payload();
    netiac_domain::template::resolve_value(&payload, &mut |type_id, name, output| {
        symbols.get(&ResourceId::new(type_id, name)).and_then(|outputs| outputs.get(output)).map(template_value_to_string)
    })
    .map_err(EngineError::UnresolvedReference)
}

fn template_value_to_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

async fn execute_change(
    driver: &dyn ApplianceDriver,
    change: &ResourceChange,
    payload: &Value,
    timeout: Duration,
    retries: u32,
) -> Result<Resource, EngineError> {
    let type_id = change.resource.kind.type_id();

    match change.kind {
        ChangeKind::Create => {
            let result = with_retry(retries, || async {
                match tokio::time::timeout(timeout, driver.create(type_id, payload)).await {
                    Ok(inner) => inner,
                    Err(_) => Err(DriverError::Timeout(timeout.as_millis() as u64)),
                }
            })
            .await
            .map_err(EngineError::Driver)?;

            let mut resource = change.resource.clone();
            resource.backend_uuid = Some(result.uuid);
            resource.outputs = as_outputs(result.outputs);
            resource.lifecycle_state = LifecycleState::Created;
            Ok(resource)
        }
        ChangeKind::Update => {
            let uuid = change
                .before
                .as_ref()
                .and_then(|b| b.backend_uuid.clone())
                .ok_or_else(|| EngineError::Internal(format!("update of {} has no backend uuid on record", change.resource.id())))?;

            let outputs = with_retry(retries, || async {
                match tokio::time::timeout(timeout, driver.update(type_id, &uuid, payload)).await {
                    Ok(inner) => inner,
                    Err(_) => Err(DriverError::Timeout(timeout.as_millis() as u64)),
                }
            })
            .await
            .map_err(EngineError::Driver)?;

            let mut resource = change.resource.clone();
            resource.backend_uuid = Some(uuid);
            resource.outputs = as_outputs(outputs);
            resource.lifecycle_state = LifecycleState::Updated;
            Ok(resource)
        }
        ChangeKind::Delete => {
            if let Some(uuid) = change.before.as_ref().and_then(|b| b.backend_uuid.clone()) {
                with_retry(retries, || async {
                    match tokio::time::timeout(timeout, driver.delete(type_id, &uuid)).await {
                        Ok(inner) => inner,
                        Err(_) => Err(DriverError::Timeout(timeout.as_millis() as u64)),
                    }
                })
                .await
                .map_err(EngineError::Driver)?;
            }
            let mut resource = change.resource.clone();
            resource.lifecycle_state = LifecycleState::Deleted;
            Ok(resource)
        }
        ChangeKind::Replace | ChangeKind::NoOp => {
            unreachable!("the planner expands Replace into Delete+Create and omits NoOp from execution waves")
        }
    }
}

/// Opaque sentinel output synthesis for dry-run: only resource kinds whose
/// successors actually reference an output get a stand-in value, since a
/// dry-run has no real driver response to read one from.
fn simulate(change: &ResourceChange) -> Resource {
    let mut resource = change.resource.clone();
    match change.kind {
        ChangeKind::Create => {
            resource.backend_uuid = Some(format!("dryrun-{}", resource.id()));
            resource.lifecycle_state = LifecycleState::Created;
            if resource.kind.type_id() == "network:vlan" {
                resource.outputs.insert("deviceName".into(), Value::String(format!("sentinel/{}", resource.id())));
            }
        }
        ChangeKind::Update => resource.lifecycle_state = LifecycleState::Updated,
        ChangeKind::Delete => resource.lifecycle_state = LifecycleState::Deleted,
        ChangeKind::Replace | ChangeKind::NoOp => {}
    }
    resource
}

fn as_outputs(value: Value) -> BTreeMap<String, Value> {
    value.as_object().cloned().map(|m| m.into_iter().collect()).unwrap_or_default()
}

async fn with_retry<F, Fut, T>(retries: u32, mut attempt: F) -> Result<T, DriverError>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<T, DriverError>>,
{
    let attempts = retries.max(1);
    let mut last_err = None;
    for attempt_index in 0..attempts {
        match attempt().await {
            Ok(value) => return Ok(value),
            Err(err) => {
                let retryable = err.retryable();
                last_err = Some(err);
                if !retryable || attempt_index + 1 >= attempts {
                    break;
                }
                let backoff = BACKOFF_MS[(attempt_index as usize).min(BACKOFF_MS.len() - 1)];
                tokio::time::sleep(Duration::from_millis(backoff)).await;
            }
        }
    }
    Err(last_err.expect("loop always runs at least once"))
}

fn apply_to_deployment(deployment: &mut Deployment, change: &ResourceChange, resource: Resource) {
    match change.kind {
        ChangeKind::Delete => {
            deployment.resources.remove(&change.resource.id());
        }
        _ => {
            deployment.resources.insert(resource.id(), resource);
        }
    }
}

/// Inverts every committed step in reverse insertion order: `Create` → the
/// new object is deleted, `Update` → the captured `before` payload is
/// reapplied, `Delete` → the captured `before` payload is recreated.
async fn rollback_committed(driver: &Arc<dyn ApplianceDriver>, committed: &[CommittedStep]) -> Result<(), EngineError> {
    for (index, step) in committed.iter().enumerate().rev() {
        let change = &step.change;
        let type_id = change.resource.kind.type_id();
        let outcome: Result<(), DriverError> = match change.kind {
            ChangeKind::Create => match change.resource.backend_uuid.as_deref() {
                Some(uuid) => driver.delete(type_id, uuid).await,
                None => Ok(()),
            },
            ChangeKind::Update => match (&change.before, change.before.as_ref().and_then(|b| b.backend_uuid.as_deref())) {
                (Some(before), Some(uuid)) => driver.update(type_id, uuid, &before.kind.to_api_payload()).await.map(|_| ()),
                _ => Ok(()),
            },
            ChangeKind::Delete => match &change.before {
                Some(before) => driver.create(type_id, &before.kind.to_api_payload()).await.map(|_| ()),
                None => Ok(()),
            },
            ChangeKind::Replace | ChangeKind::NoOp => Ok(()),
        };
        if let Err(e) = outcome {
            return Err(EngineError::RollbackFailed { resource_id: change.resource.id(), change_index: index, message: e.to_string() });
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use netiac_domain::{Resource, ResourceKind, VlanProperties};
    use netiac_driver::MockDriver;
    use netiac_store::InMemoryStore;

    fn vlan(name: &str, tag: u16) -> Resource {
        Resource::new(name, ResourceKind::NetworkVlan(VlanProperties { interface: "igc1".into(), tag, description: None }), Utc::now())
    }

    fn interface_on_vlan(name: &str, vlan_name: &str) -> Resource {
        Resource::new(
            name,
            ResourceKind::NetworkInterface(netiac_domain::InterfaceProperties {
                device: format!("${{network:vlan:{vlan_name}.deviceName}}"),
                description: None,
                ipv4_address: None,
                enabled: true,
            }),
            Utc::now(),
        )
    }

    async fn plan_for(store: &InMemoryStore, deployment_id: &str, desired: Vec<Resource>) -> Plan {
        crate::planner::plan(store, deployment_id, desired).await.unwrap()
    }

    #[tokio::test]
    async fn create_plan_applies_and_assigns_backend_uuid() {
        let store = Arc::new(InMemoryStore::new());
        let driver = Arc::new(MockDriver::new());
        let plan = plan_for(&store, "d1", vec![vlan("guest", 100)]).await;

        let result = apply(store.clone(), driver, &plan, ExecuteOptions::default(), CancellationToken::new()).await.unwrap();
        assert_eq!(result.executed.len(), 1);
        assert!(result.failed.is_empty());

        let deployment = store.load("d1").await.unwrap().unwrap();
        let resource = deployment.resources.values().next().unwrap();
        assert!(resource.backend_uuid.is_some());
        assert_eq!(resource.outputs["deviceName"], "igc1.100");
    }

    #[tokio::test]
    async fn stale_plan_is_rejected_without_touching_the_driver() {
        let store = Arc::new(InMemoryStore::new());
        let driver = Arc::new(MockDriver::new());
        let plan = plan_for(&store, "d1", vec![vlan("guest", 100)]).await;

        // Someone else applies first, bumping state_version.
        let mut deployment = Deployment::new("d1", Utc::now());
        deployment.touch(Utc::now());
        store.save(&deployment).await.unwrap();

        let err = apply(store, driver, &plan, ExecuteOptions::default(), CancellationToken::new()).await.unwrap_err();
        assert_eq!(err.code(), "ErrStale");
    }

    #[tokio::test]
    async fn dry_run_never_calls_the_driver() {
        let store = Arc::new(InMemoryStore::new());
        let driver = Arc::new(MockDriver::new());
        let plan = plan_for(&store, "d1", vec![vlan("guest", 100)]).await;

        let options = ExecuteOptions { dry_run: true, ..ExecuteOptions::default() };
        let result = apply(store.clone(), driver.clone(), &plan, options, CancellationToken::new()).await.unwrap();
        assert_eq!(result.executed.len(), 1);
        assert!(driver.list("network:vlan").await.unwrap().is_empty(), "dry-run must not reach the driver");
    }

    #[tokio::test]
    async fn dry_run_does_not_persist_or_bump_state_version() {
        let store = Arc::new(InMemoryStore::new());
        let driver = Arc::new(MockDriver::new());
        let plan = plan_for(&store, "d1", vec![vlan("guest", 100)]).await;

        let options = ExecuteOptions { dry_run: true, ..ExecuteOptions::default() };
        apply(store.clone(), driver, &plan, options, CancellationToken::new()).await.unwrap();
        assert!(store.load("d1").await.unwrap().is_none(), "dry-run must not write to the store");
    }

    #[tokio::test]
    async fn successor_resolves_reference_to_predecessors_output() {
        let store = Arc::new(InMemoryStore::new());
        let driver = Arc::new(MockDriver::new());
        let plan = plan_for(&store, "d1", vec![vlan("guest", 100), interface_on_vlan("guest-if", "guest")]).await;

        let result = apply(store.clone(), driver.clone(), &plan, ExecuteOptions::default(), CancellationToken::new()).await.unwrap();
        assert!(result.failed.is_empty(), "{:?}", result.failed);

        let objects = driver.list("network:interface").await.unwrap();
        assert_eq!(objects[0].payload["device"], "igc1.100");
    }

    #[tokio::test]
    async fn unresolvable_reference_fails_the_change_without_calling_the_driver() {
        let store = Arc::new(InMemoryStore::new());
        let driver = Arc::new(MockDriver::new());
        let plan = plan_for(&store, "d1", vec![interface_on_vlan("guest-if", "missing")]).await;

        let result = apply(store.clone(), driver.clone(), &plan, ExecuteOptions::default(), CancellationToken::new()).await.unwrap();
        assert_eq!(result.failed.len(), 1);
        assert!(driver.list("network:interface").await.unwrap().is_empty());
    }
}
