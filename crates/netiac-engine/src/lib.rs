pub mod config;
pub mod error;
pub mod execution;
pub mod planner;

pub use config::EngineConfig;
pub use error::EngineError;
pub use execution::{apply, ChangeResult, ExecuteOptions, ExecutionResult, FailedChange};
pub use planner::{plan, plan_with_options, PlanOptions};
