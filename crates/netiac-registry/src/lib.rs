mod error;
mod graph;
mod registry;

pub use error::RegistryError;
pub use graph::{build_graph, ResolvedGraph};
pub use registry::{builtin_registry, Registry, TypeSchema};
