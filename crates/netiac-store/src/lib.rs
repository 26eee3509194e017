pub mod crypto;
pub mod deployment;
pub mod error;
pub mod file_store;
pub mod memory;
pub mod plan;
pub mod store;

pub use deployment::{compute_hash, sort_json_keys, Checkpoint, Deployment, MAX_CHECKPOINTS};
pub use error::StoreError;
pub use file_store::FileStateStore;
pub use memory::InMemoryStore;
pub use plan::{ChangeKind, ChangeSummary, ExecutionWave, Plan, PropertyDiff, ResourceChange};
pub use store::{upsert_resource, LockGuard, StateStore};
