pub mod error;
pub mod template;
pub mod types;
pub mod validate;

#[cfg(test)]
mod tests;

pub use error::DomainError;
pub use types::{
    AliasType, Dependency, DependencyKind, DhcpRangeProperties, DhcpStaticProperties,
    DnsOverrideProperties, FirewallAction, FirewallAliasProperties, FirewallDirection,
    FirewallRuleProperties, HaproxyBackendProperties, HaproxyBalance, HaproxyFrontendProperties,
    HaproxyMode, HaproxyServerProperties, InterfaceProperties, LifecycleState, NatOutboundProperties,
    Resource, ResourceId, ResourceKind, ResourceMetadata, ValidationIssue, ValidationReport,
    VlanProperties,
};
