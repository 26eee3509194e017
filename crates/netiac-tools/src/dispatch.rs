use chrono::Utc;
use netiac_domain::{Resource, ResourceId};
use netiac_engine::{apply as execute_apply, plan as compute_plan, ExecuteOptions};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::error::ToolError;
use crate::state::EngineContext;

/// Wire shape for a resource on the way in: the catalog type id, the name
/// half of its `ResourceId`, and its per-kind properties blob.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResourcePayload {
    pub name: String,
    #[serde(rename = "type")]
    pub type_id: String,
    #[serde(default)]
    pub properties: Value,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResourceAction {
    Create,
    Update,
    Delete,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RunOptions {
    #[serde(default)]
    pub dry_run: bool,
    #[serde(default)]
    pub continue_on_error: bool,
}

/// The nine named Tool Surface operations, tagged on the wire by `op`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "op", content = "params")]
pub enum ToolRequest {
    Validate { resources: Vec<ResourcePayload> },
    Plan { deployment_id: String, resources: Vec<ResourcePayload> },
    Apply { plan_id: String, #[serde(default)] options: RunOptions },
    Destroy { deployment_id: String, #[serde(default)] options: RunOptions },
    ListResourceTypes,
    DescribeResourceType { type_id: String },
    GetDeploymentState { deployment_id: String },
    CreateCheckpoint { deployment_id: String, description: String },
    Rollback { deployment_id: String, checkpoint_id: String },
    ApplyResource { action: ResourceAction, deployment_id: String, resource: ResourcePayload },
}

/// Uniform envelope every operation returns: exactly one of `data`/`error`
/// is set.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolResponse {
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ToolError>,
}

impl ToolResponse {
    fn ok(data: Value) -> Self {
        ToolResponse { ok: true, data: Some(data), error: None }
    }

    fn err(error: impl Into<ToolError>) -> Self {
        ToolResponse { ok: false, data: None, error: Some(error.into()) }
    }
}

/// Single entry point for every Tool Surface call. Transport-agnostic: a
/// caller decodes whatever wire format it speaks into a [`ToolRequest`] and
/// encodes this response back out.
pub async fn dispatch(request: ToolRequest, ctx: &EngineContext) -> ToolResponse {
    match request {
        ToolRequest::Validate { resources } => handle_validate(ctx, resources),
        ToolRequest::Plan { deployment_id, resources } => handle_plan(ctx, deployment_id, resources).await,
        ToolRequest::Apply { plan_id, options } => handle_apply(ctx, plan_id, options).await,
        ToolRequest::Destroy { deployment_id, options } => handle_destroy(ctx, deployment_id, options).await,
        ToolRequest::ListResourceTypes => handle_list_resource_types(ctx),
        ToolRequest::DescribeResourceType { type_id } => handle_describe_resource_type(ctx, &type_id),
        ToolRequest::GetDeploymentState { deployment_id } => handle_get_deployment_state(ctx, &deployment_id).await,
        ToolRequest::CreateCheckpoint { deployment_id, description } => {
            handle_create_checkpoint(ctx, &deployment_id, &description).await
        }
        ToolRequest::Rollback { deployment_id, checkpoint_id } => handle_rollback(ctx, &deployment_id, &checkpoint_id).await,
        ToolRequest::ApplyResource { action, deployment_id, resource } => {
            handle_apply_resource(ctx, action, &deployment_id, resource).await
        }
    }
}

fn construct(ctx: &EngineContext, payload: ResourcePayload) -> Result<Resource, ToolError> {
    let resource = ctx.registry.construct(&payload.type_id, &payload.name, payload.properties, Utc::now())?;
    let report = resource.kind.validate();
    if !report.ok() {
        let message = report.errors.iter().map(|e| format!("{}: {}", e.path, e.message)).collect::<Vec<_>>().join("; ");
        return Err(ToolError::new("ValidationError", message));
    }
    Ok(resource)
}

fn handle_validate(ctx: &EngineContext, resources: Vec<ResourcePayload>) -> ToolResponse {
    let mut errors = Vec::new();
    for payload in resources {
        let name = payload.name.clone();
        if let Err(e) = construct(ctx, payload) {
            errors.push(json!({ "resource": name, "code": e.code, "message": e.message }));
        }
    }
    if errors.is_empty() {
        ToolResponse::ok(json!({ "valid": true }))
    } else {
        ToolResponse::ok(json!({ "valid": false, "errors": errors }))
    }
}

async fn handle_plan(ctx: &EngineContext, deployment_id: String, resources: Vec<ResourcePayload>) -> ToolResponse {
    let mut desired = Vec::with_capacity(resources.len());
    for payload in resources {
        match construct(ctx, payload) {
            Ok(r) => desired.push(r),
            Err(e) => return ToolResponse::err(e),
        }
    }
    let _guard = match ctx.store.lock(&deployment_id, ctx.lock_timeout_ms).await {
        Ok(g) => g,
        Err(e) => return ToolResponse::err(e),
    };
    match compute_plan(ctx.store.as_ref(), &deployment_id, desired).await {
        Ok(plan) => ToolResponse::ok(serde_json::to_value(&plan).unwrap_or(Value::Null)),
        Err(e) => ToolResponse::err(e),
    }
}

async fn handle_apply(ctx: &EngineContext, plan_id: String, options: RunOptions) -> ToolResponse {
    let plan = match ctx.store.get_plan(&plan_id).await {
        Ok(Some(p)) => p,
        Ok(None) => return ToolResponse::err(ToolError::new("ValidationError", format!("no such plan: {plan_id}"))),
        Err(e) => return ToolResponse::err(e),
    };

    let _guard = match ctx.store.lock(&plan.deployment_id, ctx.lock_timeout_ms).await {
        Ok(g) => g,
        Err(e) => return ToolResponse::err(e),
    };

    let execute_options = ExecuteOptions {
        continue_on_error: options.continue_on_error,
        dry_run: options.dry_run || plan.dry_run,
        ..ExecuteOptions::default()
    };

    match execute_apply(ctx.store.clone(), ctx.driver.clone(), &plan, execute_options, CancellationToken::new()).await {
        Ok(result) => {
            info!(plan_id = %plan_id, executed = result.executed.len(), failed = result.failed.len(), "apply dispatched");
            ToolResponse::ok(json!({
                "executed": result.executed.iter().map(|id| id.as_str().to_string()).collect::<Vec<_>>(),
                "failed": result.failed.iter().map(|f| json!({
                    "resourceId": f.resource_id.as_str(),
                    "reason": f.reason,
                    "retryable": f.retryable,
                })).collect::<Vec<_>>(),
                "rolledBack": result.rolled_back,
            }))
        }
        Err(e) => ToolResponse::err(e),
    }
}

async fn handle_destroy(ctx: &EngineContext, deployment_id: String, options: RunOptions) -> ToolResponse {
    let plan_id = {
        let _guard = match ctx.store.lock(&deployment_id, ctx.lock_timeout_ms).await {
            Ok(g) => g,
            Err(e) => return ToolResponse::err(e),
        };
        match compute_plan(ctx.store.as_ref(), &deployment_id, Vec::new()).await {
            Ok(plan) => plan.id,
            Err(e) => return ToolResponse::err(e),
        }
    };
    handle_apply(ctx, plan_id, options).await
}

fn handle_list_resource_types(ctx: &EngineContext) -> ToolResponse {
    ToolResponse::ok(json!({ "types": ctx.registry.list_types() }))
}

fn handle_describe_resource_type(ctx: &EngineContext, type_id: &str) -> ToolResponse {
    match ctx.registry.describe(type_id) {
        Ok(schema) => ToolResponse::ok(serde_json::to_value(&schema).unwrap_or(Value::Null)),
        Err(e) => ToolResponse::err(e),
    }
}

async fn handle_get_deployment_state(ctx: &EngineContext, deployment_id: &str) -> ToolResponse {
    match ctx.store.load(deployment_id).await {
        Ok(Some(deployment)) => ToolResponse::ok(serde_json::to_value(&deployment).unwrap_or(Value::Null)),
        Ok(None) => ToolResponse::err(ToolError::new("ValidationError", format!("no such deployment: {deployment_id}"))),
        Err(e) => ToolResponse::err(e),
    }
}

async fn handle_create_checkpoint(ctx: &EngineContext, deployment_id: &str, description: &str) -> ToolResponse {
    match ctx.store.checkpoint(deployment_id, description).await {
        Ok(checkpoint) => ToolResponse::ok(serde_json::to_value(&checkpoint).unwrap_or(Value::Null)),
        Err(e) => ToolResponse::err(e),
    }
}

async fn handle_rollback(ctx: &EngineContext, deployment_id: &str, checkpoint_id: &str) -> ToolResponse {
    let _guard = match ctx.store.lock(deployment_id, ctx.lock_timeout_ms).await {
        Ok(g) => g,
        Err(e) => return ToolResponse::err(e),
    };
    match ctx.store.rollback(deployment_id, checkpoint_id).await {
        Ok(deployment) => ToolResponse::ok(serde_json::to_value(&deployment).unwrap_or(Value::Null)),
        Err(e) => ToolResponse::err(e),
    }
}

/// Out-of-band single-resource write: constructs a one-change plan against
/// the resource's deployment and executes it atomically, so the appliance
/// is actually driven (backend uuid and outputs assigned) rather than just
/// the on-disk record. Callers who already know exactly what they want
/// changed use this instead of the full `plan`+`apply` round trip.
async fn handle_apply_resource(
    ctx: &EngineContext,
    action: ResourceAction,
    deployment_id: &str,
    resource: ResourcePayload,
) -> ToolResponse {
    let target_id = ResourceId::new(&resource.type_id, &resource.name);

    let _guard = match ctx.store.lock(deployment_id, ctx.lock_timeout_ms).await {
        Ok(g) => g,
        Err(e) => return ToolResponse::err(e),
    };

    let existing = match ctx.store.load(deployment_id).await {
        Ok(d) => d,
        Err(e) => return ToolResponse::err(e),
    };
    let mut desired: Vec<Resource> = existing.as_ref().map(|d| d.resources.values().cloned().collect()).unwrap_or_default();

    match action {
        ResourceAction::Delete => {
            let before = desired.len();
            desired.retain(|r| r.id() != target_id);
            if desired.len() == before {
                return ToolResponse::err(ToolError::new("ValidationError", format!("no such resource: {target_id}")));
            }
        }
        ResourceAction::Create | ResourceAction::Update => {
            let constructed = match construct(ctx, resource) {
                Ok(r) => r,
                Err(e) => return ToolResponse::err(e),
            };
            desired.retain(|r| r.id() != target_id);
            desired.push(constructed);
        }
    }

    let plan = match compute_plan(ctx.store.as_ref(), deployment_id, desired).await {
        Ok(p) => p,
        Err(e) => return ToolResponse::err(e),
    };

    let result = match execute_apply(ctx.store.clone(), ctx.driver.clone(), &plan, ExecuteOptions::default(), CancellationToken::new()).await
    {
        Ok(r) => r,
        Err(e) => return ToolResponse::err(e),
    };

    if let Some(failure) = result.failed.first() {
        return ToolResponse::err(ToolError::retryable(
            "DriverError",
            format!("{} failed: {}", failure.resource_id, failure.reason),
            failure.retryable,
        ));
    }

    match ctx.store.load(deployment_id).await {
        Ok(Some(deployment)) => ToolResponse::ok(serde_json::to_value(&deployment).unwrap_or(Value::Null)),
        Ok(None) => ToolResponse::ok(json!({ "removed": target_id.as_str() })),
        Err(e) => ToolResponse::err(e),
    }
}
