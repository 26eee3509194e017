use std::collections::{BTreeMap, VecDeque};

use chrono::{DateTime, Utc};
use netiac_domain::{Resource, ResourceId};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};

/// Maximum number of checkpoints retained per deployment; oldest evicted
/// first once the ring is full.
pub const MAX_CHECKPOINTS: usize = 10;

/// An immutable, named snapshot of a deployment's resource set, usable as a
/// rollback target.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Checkpoint {
    pub id: String,
    pub description: String,
    pub created_at: DateTime<Utc>,
    pub resources: BTreeMap<ResourceId, Resource>,
}

/// Named aggregate: the current resource set, version history marker, and a
/// bounded ring of rollback checkpoints.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Deployment {
    pub id: String,
    pub resources: BTreeMap<ResourceId, Resource>,
    /// Bumped on every [`Deployment::touch`]; used to detect a stale plan
    /// (the plan's captured version no longer matches at apply time).
    pub state_version: u64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub checkpoints: VecDeque<Checkpoint>,
    /// Set once by the engine after a failed rollback; blocks further
    /// automatic recovery until an operator intervenes.
    #[serde(default)]
    pub partially_rolled_back: bool,
    /// Unrecognized top-level keys from a previously persisted record,
    /// preserved verbatim across load/save round-trips.
    #[serde(flatten)]
    pub extra: serde_json::Map<String, Value>,
}

impl Deployment {
    pub fn new(id: impl Into<String>, now: DateTime<Utc>) -> Self {
        Deployment {
            id: id.into(),
            resources: BTreeMap::new(),
            state_version: 1,
            created_at: now,
            updated_at: now,
            checkpoints: VecDeque::new(),
            partially_rolled_back: false,
            extra: serde_json::Map::new(),
        }
    }

    pub fn touch(&mut self, now: DateTime<Utc>) {
        self.updated_at = now;
        self.state_version += 1;
    }

    /// Pushes a checkpoint, evicting the oldest once `MAX_CHECKPOINTS` is
    /// exceeded (FIFO).
    pub fn push_checkpoint(&mut self, checkpoint: Checkpoint) {
        self.checkpoints.push_back(checkpoint);
        while self.checkpoints.len() > MAX_CHECKPOINTS {
            self.checkpoints.pop_front();
        }
    }

    pub fn checkpoint(&self, id: &str) -> Option<&Checkpoint> {
        self.checkpoints.iter().find(|c| c.id == id)
    }
}

/// Canonicalizes a JSON value by recursively sorting object keys into a
/// `BTreeMap`, so hashing and diffing never depend on field order or
/// `HashMap` iteration order.
pub fn sort_json_keys(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            let sorted: BTreeMap<String, Value> =
                map.iter().map(|(k, v)| (k.clone(), sort_json_keys(v))).collect();
            serde_json::to_value(sorted).expect("BTreeMap<String, Value> is always representable")
        }
        Value::Array(items) => Value::Array(items.iter().map(sort_json_keys).collect()),
        other => other.clone(),
    }
}

/// SHA-256 hex digest of a value's canonical JSON form. Used by the planner
/// to detect whether a resource's normalized properties actually changed.
pub fn compute_hash<T: Serialize>(value: &T) -> String {
    let json = serde_json::to_value(value).expect("resource properties are always representable as JSON");
    let canonical = sort_json_keys(&json);
    let bytes = serde_json::to_vec(&canonical).expect("canonical value always serializes");
    let digest = Sha256::digest(&bytes);
    hex::encode(digest)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_is_stable_across_field_order() {
        let a = serde_json::json!({"a": 1, "b": 2});
        let b = serde_json::json!({"b": 2, "a": 1});
        assert_eq!(compute_hash(&a), compute_hash(&b));
    }

    #[test]
    fn checkpoint_ring_evicts_oldest() {
        let mut deployment = Deployment::new("d1", Utc::now());
        for i in 0..(MAX_CHECKPOINTS + 3) {
            deployment.push_checkpoint(Checkpoint {
                id: format!("cp-{i}"),
                description: String::new(),
                created_at: Utc::now(),
                resources: BTreeMap::new(),
            });
        }
        assert_eq!(deployment.checkpoints.len(), MAX_CHECKPOINTS);
        assert_eq!(deployment.checkpoints.front().unwrap().id, "cp-3");
        assert_eq!(deployment.checkpoints.back().unwrap().id, format!("cp-{}", MAX_CHECKPOINTS + 2));
    }
}
