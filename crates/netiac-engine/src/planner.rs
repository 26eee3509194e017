use std::collections::{BTreeMap, BTreeSet};

use chrono::Utc;
use netiac_domain::{validate, Resource, ResourceId};
use netiac_registry::build_graph;
use netiac_store::{ChangeKind, ChangeSummary, ExecutionWave, Plan, PropertyDiff, ResourceChange, StateStore};
use serde_json::Value;

use crate::error::EngineError;

pub struct PlanOptions {
    pub dry_run: bool,
}

impl Default for PlanOptions {
    fn default() -> Self {
        PlanOptions { dry_run: false }
    }
}

/// Diffs `desired` against the deployment's current resource set and
/// produces a `Plan`. Never mutates resources or touches the driver.
pub async fn plan(
    store: &dyn StateStore,
    deployment_id: &str,
    desired: Vec<Resource>,
) -> Result<Plan, EngineError> {
    plan_with_options(store, deployment_id, desired, PlanOptions::default()).await
}

pub async fn plan_with_options(
    store: &dyn StateStore,
    deployment_id: &str,
    desired: Vec<Resource>,
    options: PlanOptions,
) -> Result<Plan, EngineError> {
    let deployment = store.load(deployment_id).await?;
    let current: BTreeMap<ResourceId, Resource> =
        deployment.as_ref().map(|d| d.resources.clone()).unwrap_or_default();
    let base_state_version = deployment.as_ref().map(|d| d.state_version).unwrap_or(0);

    let desired_map: BTreeMap<ResourceId, Resource> = desired.into_iter().map(|r| (r.id(), r)).collect();

    let mut changes: BTreeMap<ResourceId, ResourceChange> = BTreeMap::new();

    for (id, desired_resource) in &desired_map {
        match current.get(id) {
            None => {
                changes.insert(
                    id.clone(),
                    ResourceChange {
                        kind: ChangeKind::Create,
                        resource: desired_resource.clone(),
                        before: None,
                        diff: BTreeMap::new(),
                    },
                );
            }
            Some(current_resource) => {
                let diff = diff_properties(current_resource, desired_resource);
                let kind = if diff.is_empty() {
                    ChangeKind::NoOp
                } else if forces_replace(desired_resource, &diff) {
                    ChangeKind::Replace
                } else {
                    ChangeKind::Update
                };
                changes.insert(
                    id.clone(),
                    ResourceChange { kind, resource: desired_resource.clone(), before: Some(current_resource.clone()), diff },
                );
            }
        }
    }
    for (id, current_resource) in &current {
        if !desired_map.contains_key(id) {
            changes.insert(
                id.clone(),
                ResourceChange {
                    kind: ChangeKind::Delete,
                    resource: current_resource.clone(),
                    before: Some(current_resource.clone()),
                    diff: BTreeMap::new(),
                },
            );
        }
    }

    let union: Vec<Resource> = desired_map
        .values()
        .cloned()
        .chain(current.iter().filter(|(id, _)| !desired_map.contains_key(id)).map(|(_, r)| r.clone()))
        .collect();
    let resolved = build_graph(&union)?;

    let mut summary = ChangeSummary::default();
    for change in changes.values() {
        match change.kind {
            ChangeKind::Create => summary.create += 1,
            ChangeKind::Update => summary.update += 1,
            ChangeKind::Delete => summary.delete += 1,
            ChangeKind::Replace => summary.replace += 1,
            ChangeKind::NoOp => {}
        }
    }

    let mut execution_waves = Vec::new();
    let mut wave_number = 0usize;

    // Deletion phase: reverse topological order, leaves first.
    for wave in resolved.waves.iter().rev() {
        let mut wave_changes = Vec::new();
        for id in wave {
            if let Some(change) = changes.get(id) {
                match change.kind {
                    ChangeKind::Delete => wave_changes.push(change.clone()),
                    ChangeKind::Replace => wave_changes.push(ResourceChange {
                        kind: ChangeKind::Delete,
                        resource: change.before.clone().expect("replace always carries a before"),
                        before: change.before.clone(),
                        diff: BTreeMap::new(),
                    }),
                    _ => {}
                }
            }
        }
        if !wave_changes.is_empty() {
            execution_waves.push(ExecutionWave { wave_number, changes: wave_changes });
            wave_number += 1;
        }
    }

    // Creation phase: forward topological order.
    for wave in &resolved.waves {
        let mut wave_changes = Vec::new();
        for id in wave {
            if let Some(change) = changes.get(id) {
                match change.kind {
                    ChangeKind::Create | ChangeKind::Update => wave_changes.push(change.clone()),
                    ChangeKind::Replace => wave_changes.push(ResourceChange {
                        kind: ChangeKind::Create,
                        resource: change.resource.clone(),
                        before: None,
                        diff: change.diff.clone(),
                    }),
                    ChangeKind::NoOp | ChangeKind::Delete => {}
                }
            }
        }
        if !wave_changes.is_empty() {
            execution_waves.push(ExecutionWave { wave_number, changes: wave_changes });
            wave_number += 1;
        }
    }

    let content_id = Plan::content_id(deployment_id, &execution_waves);
    let plan = Plan {
        id: content_id,
        deployment_id: deployment_id.to_string(),
        base_state_version,
        summary,
        execution_waves,
        created_at: Utc::now(),
        dry_run: options.dry_run,
    };

    store.store_plan(&plan).await?;
    Ok(plan)
}

fn diff_properties(current: &Resource, desired: &Resource) -> BTreeMap<String, PropertyDiff> {
    let current_payload = current.kind.to_api_payload();
    let desired_payload = desired.kind.to_api_payload();
    let current_props = current_payload.get("properties").and_then(Value::as_object).cloned().unwrap_or_default();
    let desired_props = desired_payload.get("properties").and_then(Value::as_object).cloned().unwrap_or_default();

    let keys: BTreeSet<&String> = current_props.keys().chain(desired_props.keys()).collect();
    let mut diff = BTreeMap::new();
    for key in keys {
        let old_value = current_props.get(key).cloned().unwrap_or(Value::Null);
        let new_value = desired_props.get(key).cloned().unwrap_or(Value::Null);
        if !properties_equivalent(&old_value, &new_value) {
            diff.insert(key.clone(), PropertyDiff { old_value, new_value });
        }
    }
    diff
}

fn forces_replace(desired: &Resource, diff: &BTreeMap<String, PropertyDiff>) -> bool {
    desired.kind.replace_forcing_paths().iter().any(|path| diff.contains_key(*path))
}

/// Normalized property equality: boolean-as-string, MAC case, IP
/// canonicalization, and property-order all collapse to the same value.
fn properties_equivalent(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Bool(x), Value::String(s)) | (Value::String(s), Value::Bool(x)) => loose_bool(s) == Some(*x),
        (Value::String(x), Value::String(y)) => normalize_string(x) == normalize_string(y),
        (Value::Object(x), Value::Object(y)) => {
            let keys: BTreeSet<&String> = x.keys().chain(y.keys()).collect();
            keys.into_iter().all(|k| {
                properties_equivalent(x.get(k).unwrap_or(&Value::Null), y.get(k).unwrap_or(&Value::Null))
            })
        }
        (Value::Array(x), Value::Array(y)) => {
            x.len() == y.len() && x.iter().zip(y.iter()).all(|(xi, yi)| properties_equivalent(xi, yi))
        }
        _ => a == b,
    }
}

fn loose_bool(s: &str) -> Option<bool> {
    match s {
        "1" | "true" | "True" | "TRUE" => Some(true),
        "0" | "false" | "False" | "FALSE" => Some(false),
        _ => None,
    }
}

fn normalize_string(s: &str) -> String {
    if let Some(mac) = validate::normalize_mac(s) {
        return mac;
    }
    if let Some((addr, prefix)) = validate::parse_cidr_v4(s) {
        return format!("{addr}/{prefix}");
    }
    if let Ok(addr) = s.parse::<std::net::Ipv4Addr>() {
        return addr.to_string();
    }
    s.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use netiac_domain::{ResourceKind, VlanProperties};
    use netiac_store::InMemoryStore;

    fn vlan(name: &str, tag: u16, description: Option<&str>) -> Resource {
        Resource::new(
            name,
            ResourceKind::NetworkVlan(VlanProperties {
                interface: "igc1".into(),
                tag,
                description: description.map(String::from),
            }),
            Utc::now(),
        )
    }

    #[tokio::test]
    async fn create_against_empty_deployment_is_a_single_create_wave() {
        let store = InMemoryStore::new();
        let result = plan(&store, "d1", vec![vlan("guest", 100, Some("Guest"))]).await.unwrap();
        assert_eq!(result.summary.create, 1);
        assert_eq!(result.execution_waves.len(), 1);
        assert_eq!(result.execution_waves[0].changes[0].kind, ChangeKind::Create);
    }

    #[tokio::test]
    async fn tag_change_forces_a_replace_with_delete_then_create_waves() {
        let store = InMemoryStore::new();
        let mut deployment = netiac_store::Deployment::new("d1", Utc::now());
        let existing = vlan("guest", 100, None);
        deployment.resources.insert(existing.id(), existing);
        store.save(&deployment).await.unwrap();

        let result = plan(&store, "d1", vec![vlan("guest", 200, None)]).await.unwrap();
        assert_eq!(result.summary.replace, 1);
        assert_eq!(result.execution_waves.len(), 2);
        assert_eq!(result.execution_waves[0].changes[0].kind, ChangeKind::Delete);
        assert_eq!(result.execution_waves[1].changes[0].kind, ChangeKind::Create);
    }

    #[tokio::test]
    async fn identical_properties_yield_no_op() {
        let store = InMemoryStore::new();
        let mut deployment = netiac_store::Deployment::new("d1", Utc::now());
        let resource = vlan("guest", 100, Some("Guest"));
        deployment.resources.insert(resource.id(), resource.clone());
        store.save(&deployment).await.unwrap();

        let result = plan(&store, "d1", vec![resource]).await.unwrap();
        assert_eq!(result.summary.create, 0);
        assert_eq!(result.summary.update, 0);
        assert!(result.execution_waves.is_empty(), "NoOp changes produce no execution waves");
    }

    #[test]
    fn boolean_as_string_is_equivalent_to_boolean() {
        assert!(properties_equivalent(&Value::Bool(true), &Value::String("1".into())));
        assert!(properties_equivalent(&Value::String("false".into()), &Value::Bool(false)));
    }

    #[test]
    fn mac_addresses_compare_case_insensitively() {
        assert!(properties_equivalent(
            &Value::String("AA:BB:CC:DD:EE:FF".into()),
            &Value::String("aa:bb:cc:dd:ee:ff".into())
        ));
    }

    #[tokio::test]
    async fn plan_is_deterministic_across_runs() {
        let store = InMemoryStore::new();
        let desired = vec![vlan("z", 10, None), vlan("a", 20, None)];
        let first = plan(&store, "d1", desired.clone()).await.unwrap();
        let second = plan(&store, "d1", desired).await.unwrap();
        assert_eq!(first.execution_waves.len(), second.execution_waves.len());
        let first_ids: Vec<_> = first.execution_waves[0].changes.iter().map(|c| c.resource.id()).collect();
        let second_ids: Vec<_> = second.execution_waves[0].changes.iter().map(|c| c.resource.id()).collect();
        assert_eq!(first_ids, second_ids);
    }
}
