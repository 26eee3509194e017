use chrono::{DateTime, Utc};
use netiac_domain::Resource;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub enum ChangeKind {
    Create,
    Update,
    Delete,
    Replace,
    NoOp,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PropertyDiff {
    pub old_value: serde_json::Value,
    pub new_value: serde_json::Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResourceChange {
    pub kind: ChangeKind,
    pub resource: Resource,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub before: Option<Resource>,
    #[serde(default)]
    pub diff: BTreeMap<String, PropertyDiff>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ChangeSummary {
    pub create: usize,
    pub update: usize,
    pub delete: usize,
    pub replace: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionWave {
    pub wave_number: usize,
    pub changes: Vec<ResourceChange>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Plan {
    pub id: String,
    pub deployment_id: String,
    /// The deployment's `state_version` this plan was computed against;
    /// used by the engine to detect a stale plan at apply time.
    pub base_state_version: u64,
    pub summary: ChangeSummary,
    pub execution_waves: Vec<ExecutionWave>,
    pub created_at: DateTime<Utc>,
    pub dry_run: bool,
}

impl Plan {
    /// Content address derived from the ordered list of changes, so an
    /// identical `(desired, current)` pair always yields the same plan id.
    pub fn content_id(deployment_id: &str, waves: &[ExecutionWave]) -> String {
        let mut hasher_input = String::new();
        hasher_input.push_str(deployment_id);
        for wave in waves {
            for change in &wave.changes {
                hasher_input.push('|');
                hasher_input.push_str(&format!("{:?}", change.kind));
                hasher_input.push(':');
                hasher_input.push_str(change.resource.id().as_str());
            }
        }
        use sha2::{Digest, Sha256};
        hex::encode(Sha256::digest(hasher_input.as_bytes()))
    }
}
