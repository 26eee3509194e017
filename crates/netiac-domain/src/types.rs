use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::DomainError;
use crate::template::template_refs;

// ── Identifiers ──────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ResourceId(pub String);

impl ResourceId {
    pub fn new(type_id: &str, name: &str) -> Self {
        ResourceId(format!("{type_id}/{name}"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ResourceId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ── Lifecycle ────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub enum LifecycleState {
    Pending,
    Validating,
    Planned,
    Creating,
    Created,
    Updating,
    Updated,
    Deleting,
    Deleted,
    Failed,
}

impl Default for LifecycleState {
    fn default() -> Self {
        LifecycleState::Pending
    }
}

impl std::fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{self:?}")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DependencyKind {
    Hard,
    Soft,
    Reference,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dependency {
    pub target_id: ResourceId,
    pub kind: DependencyKind,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceMetadata {
    pub created_at: chrono::DateTime<chrono::Utc>,
    pub updated_at: chrono::DateTime<chrono::Utc>,
    pub version: u64,
}

impl ResourceMetadata {
    pub fn new(now: chrono::DateTime<chrono::Utc>) -> Self {
        ResourceMetadata { created_at: now, updated_at: now, version: 1 }
    }

    pub fn touch(&mut self, now: chrono::DateTime<chrono::Utc>) {
        self.updated_at = now;
        self.version += 1;
    }
}

// ── Validation ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationIssue {
    pub path: String,
    pub message: String,
}

impl ValidationIssue {
    pub fn new(path: impl Into<String>, message: impl Into<String>) -> Self {
        ValidationIssue { path: path.into(), message: message.into() }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationReport {
    pub errors: Vec<ValidationIssue>,
    pub warnings: Vec<ValidationIssue>,
}

impl ValidationReport {
    pub fn ok(&self) -> bool {
        self.errors.is_empty()
    }

    fn merge(&mut self, other: ValidationReport) {
        self.errors.extend(other.errors);
        self.warnings.extend(other.warnings);
    }
}

// ── Per-kind properties ──────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VlanProperties {
    pub interface: String,
    pub tag: u16,
    #[serde(default)]
    pub description: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InterfaceProperties {
    pub device: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub ipv4_address: Option<String>,
    #[serde(default = "default_true")]
    pub enabled: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FirewallAction {
    Pass,
    Block,
    Reject,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FirewallDirection {
    In,
    Out,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FirewallRuleProperties {
    pub interface: String,
    pub action: FirewallAction,
    pub direction: FirewallDirection,
    pub protocol: String,
    pub source: String,
    pub destination: String,
    #[serde(default)]
    pub destination_port: Option<u16>,
    #[serde(default)]
    pub description: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AliasType {
    Host,
    Network,
    Port,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FirewallAliasProperties {
    pub alias_type: AliasType,
    pub entries: Vec<String>,
    #[serde(default)]
    pub description: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NatOutboundProperties {
    pub interface: String,
    pub source: String,
    pub destination: String,
    pub target: String,
    #[serde(default)]
    pub description: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DhcpRangeProperties {
    pub interface: String,
    pub range_from: String,
    pub range_to: String,
    pub subnet: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DhcpStaticProperties {
    pub interface: String,
    pub mac_address: String,
    pub ip_address: String,
    #[serde(default)]
    pub hostname: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DnsOverrideProperties {
    pub host: String,
    pub domain: String,
    pub ip_address: String,
    #[serde(default)]
    pub description: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HaproxyMode {
    Http,
    Tcp,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum HaproxyBalance {
    Roundrobin,
    StaticRr,
    Leastconn,
    Source,
    Uri,
    #[serde(rename = "url_param")]
    UrlParam,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HaproxyBackendProperties {
    pub mode: HaproxyMode,
    pub balance: HaproxyBalance,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HaproxyServerProperties {
    pub backend: String,
    pub address: String,
    pub port: u16,
    #[serde(default)]
    pub ssl: bool,
    #[serde(default = "default_true")]
    pub check_enabled: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HaproxyFrontendProperties {
    pub mode: HaproxyMode,
    pub bind_address: String,
    pub bind_port: u16,
    pub default_backend: String,
}

fn default_true() -> bool {
    true
}

/// Tagged union over the resource catalog. One variant per supported type,
/// matching the closed enumeration; this is the "table-driven" value half of
/// the model — [`crate::Resource`] is the other half.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "properties")]
pub enum ResourceKind {
    #[serde(rename = "network:vlan")]
    NetworkVlan(VlanProperties),
    #[serde(rename = "network:interface")]
    NetworkInterface(InterfaceProperties),
    #[serde(rename = "firewall:rule")]
    FirewallRule(FirewallRuleProperties),
    #[serde(rename = "firewall:alias")]
    FirewallAlias(FirewallAliasProperties),
    #[serde(rename = "firewall:nat:outbound")]
    FirewallNatOutbound(NatOutboundProperties),
    #[serde(rename = "services:dhcp:range")]
    ServicesDhcpRange(DhcpRangeProperties),
    #[serde(rename = "services:dhcp:static")]
    ServicesDhcpStatic(DhcpStaticProperties),
    #[serde(rename = "services:dns:override")]
    ServicesDnsOverride(DnsOverrideProperties),
    #[serde(rename = "services:haproxy:backend")]
    ServicesHaproxyBackend(HaproxyBackendProperties),
    #[serde(rename = "services:haproxy:server")]
    ServicesHaproxyServer(HaproxyServerProperties),
    #[serde(rename = "services:haproxy:frontend")]
    ServicesHaproxyFrontend(HaproxyFrontendProperties),
}

impl ResourceKind {
    pub fn type_id(&self) -> &'static str {
        match self {
            ResourceKind::NetworkVlan(_) => "network:vlan",
            ResourceKind::NetworkInterface(_) => "network:interface",
            ResourceKind::FirewallRule(_) => "firewall:rule",
            ResourceKind::FirewallAlias(_) => "firewall:alias",
            ResourceKind::FirewallNatOutbound(_) => "firewall:nat:outbound",
            ResourceKind::ServicesDhcpRange(_) => "services:dhcp:range",
            ResourceKind::ServicesDhcpStatic(_) => "services:dhcp:static",
            ResourceKind::ServicesDnsOverride(_) => "services:dns:override",
            ResourceKind::ServicesHaproxyBackend(_) => "services:haproxy:backend",
            ResourceKind::ServicesHaproxyServer(_) => "services:haproxy:server",
            ResourceKind::ServicesHaproxyFrontend(_) => "services:haproxy:frontend",
        }
    }

    /// All type ids in the catalog, for `listResourceTypes`.
    pub fn catalog() -> &'static [&'static str] {
        &[
            "network:vlan",
            "network:interface",
            "firewall:rule",
            "firewall:alias",
            "firewall:nat:outbound",
            "services:dhcp:range",
            "services:dhcp:static",
            "services:dns:override",
            "services:haproxy:backend",
            "services:haproxy:server",
            "services:haproxy:frontend",
        ]
    }

    /// Local (non-I/O) validation: structural checks plus the per-kind
    /// semantic rules. Returns warnings for security-relevant combinations
    /// rather than rejecting them outright.
    pub fn validate(&self) -> ValidationReport {
        let mut report = ValidationReport::default();
        match self {
            ResourceKind::NetworkVlan(p) => {
                if !(1..=4094).contains(&p.tag) {
                    report.errors.push(ValidationIssue::new(
                        "tag",
                        format!("vlan tag {} out of range [1,4094]", p.tag),
                    ));
                }
            }
            ResourceKind::NetworkInterface(p) => {
                if let Some(ip) = &p.ipv4_address {
                    if crate::validate::parse_cidr_v4(ip).is_none() {
                        report
                            .errors
                            .push(ValidationIssue::new("ipv4_address", format!("invalid CIDR: {ip}")));
                    }
                }
            }
            ResourceKind::FirewallRule(p) => {
                if let Some(port) = p.destination_port {
                    if port == 0 {
                        report.errors.push(ValidationIssue::new(
                            "destination_port",
                            "port must be in [1,65535]",
                        ));
                    }
                }
                if matches!(p.action, FirewallAction::Pass)
                    && p.source == "any"
                    && p.destination == "any"
                {
                    report.warnings.push(ValidationIssue::new(
                        "source",
                        "rule passes traffic from any source to any destination",
                    ));
                }
            }
            ResourceKind::FirewallAlias(p) => {
                if p.entries.is_empty() {
                    report
                        .errors
                        .push(ValidationIssue::new("entries", "alias must declare at least one entry"));
                }
            }
            ResourceKind::FirewallNatOutbound(_) => {}
            ResourceKind::ServicesDhcpRange(p) => {
                match (
                    std::net::Ipv4Addr::from_str_checked(&p.range_from),
                    std::net::Ipv4Addr::from_str_checked(&p.range_to),
                ) {
                    (Some(from), Some(to)) if u32::from(from) > u32::from(to) => {
                        report.errors.push(ValidationIssue::new(
                            "range_to",
                            "range_to must not precede range_from",
                        ));
                    }
                    (Some(_), Some(_)) => {}
                    _ => report
                        .errors
                        .push(ValidationIssue::new("range_from", "range bounds must be valid IPv4 addresses")),
                }
                if crate::validate::parse_cidr_v4(&p.subnet).is_none() {
                    report
                        .errors
                        .push(ValidationIssue::new("subnet", format!("invalid CIDR: {}", p.subnet)));
                }
            }
            ResourceKind::ServicesDhcpStatic(p) => {
                if crate::validate::normalize_mac(&p.mac_address).is_none() {
                    report
                        .errors
                        .push(ValidationIssue::new("mac_address", format!("invalid MAC address: {}", p.mac_address)));
                }
                if std::net::Ipv4Addr::from_str_checked(&p.ip_address).is_none() {
                    report
                        .errors
                        .push(ValidationIssue::new("ip_address", format!("invalid IPv4 address: {}", p.ip_address)));
                }
                if let Some(h) = &p.hostname {
                    if !crate::validate::is_valid_hostname(h) {
                        report
                            .errors
                            .push(ValidationIssue::new("hostname", format!("invalid hostname: {h}")));
                    }
                }
            }
            ResourceKind::ServicesDnsOverride(p) => {
                if !crate::validate::is_valid_hostname(&p.host) {
                    report
                        .errors
                        .push(ValidationIssue::new("host", format!("invalid hostname: {}", p.host)));
                }
                if std::net::IpAddr::from_str_checked(&p.ip_address).is_none() {
                    report
                        .errors
                        .push(ValidationIssue::new("ip_address", format!("invalid IP address: {}", p.ip_address)));
                }
            }
            ResourceKind::ServicesHaproxyBackend(_) => {}
            ResourceKind::ServicesHaproxyServer(p) => {
                if p.port == 0 {
                    report
                        .errors
                        .push(ValidationIssue::new("port", "port must be in [1,65535]"));
                }
            }
            ResourceKind::ServicesHaproxyFrontend(p) => {
                if p.bind_port == 0 {
                    report
                        .errors
                        .push(ValidationIssue::new("bind_port", "bind_port must be in [1,65535]"));
                }
            }
        }
        report
    }

    /// Projects properties into the appliance driver's wire shape. Stable
    /// regardless of any backend UUID assigned after first create.
    pub fn to_api_payload(&self) -> Value {
        serde_json::to_value(self).expect("resource properties are always representable as JSON")
    }

    pub fn required_permissions(&self) -> &'static [&'static str] {
        match self {
            ResourceKind::NetworkVlan(_) => &["network:write"],
            ResourceKind::NetworkInterface(_) => &["network:write"],
            ResourceKind::FirewallRule(_) | ResourceKind::FirewallAlias(_) => &["firewall:write"],
            ResourceKind::FirewallNatOutbound(_) => &["firewall:write", "nat:write"],
            ResourceKind::ServicesDhcpRange(_) | ResourceKind::ServicesDhcpStatic(_) => {
                &["services:dhcp:write"]
            }
            ResourceKind::ServicesDnsOverride(_) => &["services:dns:write"],
            ResourceKind::ServicesHaproxyBackend(_)
            | ResourceKind::ServicesHaproxyServer(_)
            | ResourceKind::ServicesHaproxyFrontend(_) => &["services:haproxy:write"],
        }
    }

    /// Properties whose change forces Delete+Create rather than an
    /// in-place Update.
    pub fn replace_forcing_paths(&self) -> &'static [&'static str] {
        match self {
            ResourceKind::NetworkVlan(_) => &["interface", "tag"],
            ResourceKind::NetworkInterface(_) => &["device"],
            ResourceKind::FirewallRule(_) => &["interface"],
            ResourceKind::ServicesHaproxyServer(_) => &["backend"],
            _ => &[],
        }
    }

    /// Implicit hard dependencies plus any `${type:name.output}` template
    /// references found in string property values.
    pub fn dependency_refs(&self) -> Vec<Dependency> {
        let mut deps = Vec::new();
        match self {
            ResourceKind::ServicesHaproxyServer(p) => {
                deps.push(Dependency {
                    target_id: ResourceId::new("services:haproxy:backend", &p.backend),
                    kind: DependencyKind::Hard,
                });
            }
            ResourceKind::ServicesHaproxyFrontend(p) => {
                deps.push(Dependency {
                    target_id: ResourceId::new("services:haproxy:backend", &p.default_backend),
                    kind: DependencyKind::Hard,
                });
            }
            _ => {}
        }
        let payload = self.to_api_payload();
        for reference in template_refs(&payload) {
            deps.push(Dependency {
                target_id: ResourceId::new(&reference.type_id, &reference.name),
                kind: DependencyKind::Reference,
            });
        }
        deps
    }
}

/// A resource instance: a stable identity, its typed properties, learned
/// outputs, declared dependencies, and lifecycle bookkeeping.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Resource {
    pub name: String,
    pub kind: ResourceKind,
    #[serde(default)]
    pub outputs: BTreeMap<String, Value>,
    #[serde(default)]
    pub dependencies: Vec<Dependency>,
    pub metadata: ResourceMetadata,
    #[serde(default)]
    pub lifecycle_state: LifecycleState,
    /// Backend-assigned UUID, present once the resource has been created at
    /// least once. Stable across updates; changes only on Replace.
    #[serde(default)]
    pub backend_uuid: Option<String>,
}

impl Resource {
    pub fn new(name: impl Into<String>, kind: ResourceKind, now: chrono::DateTime<chrono::Utc>) -> Self {
        let mut resource = Resource {
            name: name.into(),
            kind,
            outputs: BTreeMap::new(),
            dependencies: Vec::new(),
            metadata: ResourceMetadata::new(now),
            lifecycle_state: LifecycleState::Pending,
            backend_uuid: None,
        };
        resource.dependencies = resource.kind.dependency_refs();
        resource
    }

    pub fn id(&self) -> ResourceId {
        ResourceId::new(self.kind.type_id(), &self.name)
    }

    pub fn validate_name(name: &str) -> Result<(), DomainError> {
        let valid = !name.is_empty()
            && name
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == ':' || c == '.');
        if valid {
            Ok(())
        } else {
            Err(DomainError::InvalidName(name.to_string()))
        }
    }
}

trait IpParse: Sized {
    fn from_str_checked(s: &str) -> Option<Self>;
}

impl IpParse for std::net::Ipv4Addr {
    fn from_str_checked(s: &str) -> Option<Self> {
        s.parse().ok()
    }
}

impl IpParse for std::net::IpAddr {
    fn from_str_checked(s: &str) -> Option<Self> {
        s.parse().ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn now() -> chrono::DateTime<chrono::Utc> {
        chrono::DateTime::parse_from_rfc3339("2026-01-01T00:00:00Z").unwrap().with_timezone(&chrono::Utc)
    }

    #[test]
    fn vlan_tag_out_of_range_is_rejected() {
        let kind = ResourceKind::NetworkVlan(VlanProperties {
            interface: "igc1".into(),
            tag: 5000,
            description: None,
        });
        let report = kind.validate();
        assert!(!report.ok());
    }

    #[test]
    fn vlan_tag_in_range_is_accepted() {
        let kind = ResourceKind::NetworkVlan(VlanProperties {
            interface: "igc1".into(),
            tag: 100,
            description: None,
        });
        assert!(kind.validate().ok());
    }

    #[test]
    fn haproxy_server_depends_on_its_backend() {
        let kind = ResourceKind::ServicesHaproxyServer(HaproxyServerProperties {
            backend: "web".into(),
            address: "10.0.0.5".into(),
            port: 8080,
            ssl: false,
            check_enabled: true,
        });
        let deps = kind.dependency_refs();
        assert_eq!(deps.len(), 1);
        assert_eq!(deps[0].target_id, ResourceId::new("services:haproxy:backend", "web"));
        assert_eq!(deps[0].kind, DependencyKind::Hard);
    }

    #[test]
    fn firewall_rule_any_any_pass_warns() {
        let kind = ResourceKind::FirewallRule(FirewallRuleProperties {
            interface: "wan".into(),
            action: FirewallAction::Pass,
            direction: FirewallDirection::In,
            protocol: "tcp".into(),
            source: "any".into(),
            destination: "any".into(),
            destination_port: None,
            description: None,
        });
        let report = kind.validate();
        assert!(report.ok());
        assert_eq!(report.warnings.len(), 1);
    }

    #[test]
    fn resource_round_trips_through_json() {
        let kind = ResourceKind::NetworkVlan(VlanProperties {
            interface: "igc1".into(),
            tag: 100,
            description: Some("Guest".into()),
        });
        let resource = Resource::new("guest", kind, now());
        let json = serde_json::to_string(&resource).unwrap();
        let back: Resource = serde_json::from_str(&json).unwrap();
        assert_eq!(resource, back);
        assert_eq!(resource.id(), ResourceId::new("network:vlan", "guest"));
    }

    #[test]
    fn invalid_resource_name_is_rejected() {
        assert!(Resource::validate_name("guest vlan").is_err());
        assert!(Resource::validate_name("guest-vlan").is_ok());
    }
}
