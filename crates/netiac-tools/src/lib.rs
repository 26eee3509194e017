pub mod dispatch;
pub mod error;
pub mod state;

pub use dispatch::{dispatch, ResourceAction, ResourcePayload, RunOptions, ToolRequest, ToolResponse};
pub use error::ToolError;
pub use state::EngineContext;
