use std::collections::HashMap;

use chrono::{DateTime, Utc};
use netiac_domain::{Resource, ResourceKind};
use serde_json::Value;

use crate::error::RegistryError;

/// Schema/introspection record returned by `describe`.
#[derive(Debug, Clone, serde::Serialize)]
pub struct TypeSchema {
    pub type_id: &'static str,
    pub required_permissions: &'static [&'static str],
    pub replace_forcing_paths: &'static [&'static str],
}

/// Process-wide registry of resource types: `Initialize -> Register* -> Freeze`.
///
/// The resource catalog is a closed, compile-time-known set (see
/// [`netiac_domain::ResourceKind`]), so `register`/`construct` do not take
/// dynamic factory closures the way a plugin-style registry would; instead
/// `register` validates that a caller's declared factory tag for a type
/// stays consistent across calls, and `construct` dispatches to the fixed
/// per-kind deserializer. This mirrors the shape of a table-driven registry
/// without the indirection a closed catalog doesn't need.
pub struct Registry {
    frozen: bool,
    registered: HashMap<&'static str, &'static str>,
}

impl Registry {
    pub fn new() -> Self {
        Registry { frozen: false, registered: HashMap::new() }
    }

    /// Idempotent by type id; a second registration with a different
    /// factory tag is an error.
    pub fn register(&mut self, type_id: &'static str, factory_tag: &'static str) -> Result<(), RegistryError> {
        if self.frozen {
            return Err(RegistryError::Frozen);
        }
        match self.registered.get(type_id) {
            Some(existing) if *existing != factory_tag => {
                Err(RegistryError::DuplicateType { type_id: type_id.to_string() })
            }
            Some(_) => Ok(()),
            None => {
                self.registered.insert(type_id, factory_tag);
                Ok(())
            }
        }
    }

    pub fn freeze(&mut self) {
        self.frozen = true;
    }

    pub fn is_frozen(&self) -> bool {
        self.frozen
    }

    pub fn list_types(&self) -> Vec<&'static str> {
        let mut types: Vec<&'static str> = self.registered.keys().copied().collect();
        types.sort_unstable();
        types
    }

    pub fn describe(&self, type_id: &str) -> Result<TypeSchema, RegistryError> {
        let canonical = self
            .registered
            .get_key_value(type_id)
            .map(|(k, _)| *k)
            .ok_or_else(|| RegistryError::UnknownType(type_id.to_string()))?;
        let (required_permissions, replace_forcing_paths) = schema_for(canonical)?;
        Ok(TypeSchema { type_id: canonical, required_permissions, replace_forcing_paths })
    }

    /// Validates `props` against the type's schema and constructs a
    /// [`Resource`]. Returns `UnknownType` for anything outside the catalog.
    pub fn construct(
        &self,
        type_id: &str,
        name: &str,
        props: Value,
        now: DateTime<Utc>,
    ) -> Result<Resource, RegistryError> {
        if !self.registered.contains_key(type_id) {
            return Err(RegistryError::UnknownType(type_id.to_string()));
        }
        let kind = kind_from_value(type_id, props)?;
        Ok(Resource::new(name, kind, now))
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

/// Pre-registers and freezes the eleven built-in resource types.
pub fn builtin_registry() -> Registry {
    let mut registry = Registry::new();
    for type_id in ResourceKind::catalog() {
        registry
            .register(type_id, "builtin")
            .expect("builtin catalog never collides with itself");
    }
    registry.freeze();
    registry
}

fn kind_from_value(type_id: &str, props: Value) -> Result<ResourceKind, RegistryError> {
    let tagged = serde_json::json!({ "type": type_id, "properties": props });
    serde_json::from_value(tagged)
        .map_err(|e| RegistryError::SchemaMismatch { type_id: type_id.to_string(), message: e.to_string() })
}

fn schema_for(
    type_id: &'static str,
) -> Result<(&'static [&'static str], &'static [&'static str]), RegistryError> {
    // A zero-valued placeholder instance is enough to read the static schema
    // tables off `ResourceKind`, since those tables don't depend on the
    // instance's field values.
    let placeholder = placeholder_kind(type_id).ok_or_else(|| RegistryError::UnknownType(type_id.to_string()))?;
    Ok((placeholder.required_permissions(), placeholder.replace_forcing_paths()))
}

fn placeholder_kind(type_id: &str) -> Option<ResourceKind> {
    use netiac_domain::*;
    Some(match type_id {
        "network:vlan" => ResourceKind::NetworkVlan(VlanProperties {
            interface: String::new(),
            tag: 1,
            description: None,
        }),
        "network:interface" => ResourceKind::NetworkInterface(InterfaceProperties {
            device: String::new(),
            description: None,
            ipv4_address: None,
            enabled: true,
        }),
        "firewall:rule" => ResourceKind::FirewallRule(FirewallRuleProperties {
            interface: String::new(),
            action: FirewallAction::Block,
            direction: FirewallDirection::In,
            protocol: String::new(),
            source: String::new(),
            destination: String::new(),
            destination_port: None,
            description: None,
        }),
        "firewall:alias" => ResourceKind::FirewallAlias(FirewallAliasProperties {
            alias_type: AliasType::Host,
            entries: Vec::new(),
            description: None,
        }),
        "firewall:nat:outbound" => ResourceKind::FirewallNatOutbound(NatOutboundProperties {
            interface: String::new(),
            source: String::new(),
            destination: String::new(),
            target: String::new(),
            description: None,
        }),
        "services:dhcp:range" => ResourceKind::ServicesDhcpRange(DhcpRangeProperties {
            interface: String::new(),
            range_from: String::new(),
            range_to: String::new(),
            subnet: String::new(),
        }),
        "services:dhcp:static" => ResourceKind::ServicesDhcpStatic(DhcpStaticProperties {
            interface: String::new(),
            mac_address: String::new(),
            ip_address: String::new(),
            hostname: None,
        }),
        "services:dns:override" => ResourceKind::ServicesDnsOverride(DnsOverrideProperties {
            host: String::new(),
            domain: String::new(),
            ip_address: String::new(),
            description: None,
        }),
        "services:haproxy:backend" => ResourceKind::ServicesHaproxyBackend(HaproxyBackendProperties {
            mode: HaproxyMode::Http,
            balance: HaproxyBalance::Roundrobin,
        }),
        "services:haproxy:server" => ResourceKind::ServicesHaproxyServer(HaproxyServerProperties {
            backend: String::new(),
            address: String::new(),
            port: 1,
            ssl: false,
            check_enabled: true,
        }),
        "services:haproxy:frontend" => ResourceKind::ServicesHaproxyFrontend(HaproxyFrontendProperties {
            mode: HaproxyMode::Http,
            bind_address: String::new(),
            bind_port: 1,
            default_backend: String::new(),
        }),
        _ => return None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_registry_lists_eleven_types() {
        let registry = builtin_registry();
        assert_eq!(registry.list_types().len(), 11);
    }

    #[test]
    fn register_after_freeze_is_rejected() {
        let mut registry = Registry::new();
        registry.freeze();
        assert!(matches!(registry.register("network:vlan", "builtin"), Err(RegistryError::Frozen)));
    }

    #[test]
    fn duplicate_registration_with_same_factory_is_idempotent() {
        let mut registry = Registry::new();
        registry.register("network:vlan", "builtin").unwrap();
        assert!(registry.register("network:vlan", "builtin").is_ok());
    }

    #[test]
    fn duplicate_registration_with_different_factory_is_rejected() {
        let mut registry = Registry::new();
        registry.register("network:vlan", "builtin").unwrap();
        let err = registry.register("network:vlan", "custom").unwrap_err();
        assert!(matches!(err, RegistryError::DuplicateType { .. }));
    }

    #[test]
    fn construct_validates_shape() {
        let registry = builtin_registry();
        let props = serde_json::json!({ "interface": "igc1", "tag": 100 });
        let resource = registry.construct("network:vlan", "guest", props, Utc::now()).unwrap();
        assert_eq!(resource.id().as_str(), "network:vlan/guest");
    }

    #[test]
    fn construct_rejects_unknown_type() {
        let registry = builtin_registry();
        let err = registry
            .construct("network:nonexistent", "x", serde_json::json!({}), Utc::now())
            .unwrap_err();
        assert!(matches!(err, RegistryError::UnknownType(_)));
    }

    #[test]
    fn construct_rejects_wrong_shaped_properties_on_a_known_type() {
        let registry = builtin_registry();
        let props = serde_json::json!({ "interface": "igc1", "tag": "not-a-number" });
        let err = registry.construct("network:vlan", "guest", props, Utc::now()).unwrap_err();
        assert!(matches!(err, RegistryError::SchemaMismatch { .. }));
    }

    #[test]
    fn describe_returns_schema_for_known_type() {
        let registry = builtin_registry();
        let schema = registry.describe("services:haproxy:server").unwrap();
        assert_eq!(schema.replace_forcing_paths, &["backend"]);
    }
}
