#[cfg(test)]
mod tests {
    use crate::types::*;

    #[test]
    fn haproxy_balance_rejects_unknown_values_at_deserialize() {
        let json = r#"{"mode":"http","balance":"weighted"}"#;
        let parsed: Result<HaproxyBackendProperties, _> = serde_json::from_str(json);
        assert!(parsed.is_err());
    }

    #[test]
    fn haproxy_balance_accepts_closed_set() {
        for value in ["roundrobin", "static-rr", "leastconn", "source", "uri", "url_param"] {
            let json = format!(r#"{{"mode":"http","balance":"{value}"}}"#);
            let parsed: Result<HaproxyBackendProperties, _> = serde_json::from_str(&json);
            assert!(parsed.is_ok(), "{value} should be accepted");
        }
    }

    #[test]
    fn haproxy_frontend_depends_on_default_backend() {
        let kind = ResourceKind::ServicesHaproxyFrontend(HaproxyFrontendProperties {
            mode: HaproxyMode::Http,
            bind_address: "0.0.0.0".into(),
            bind_port: 443,
            default_backend: "web".into(),
        });
        let deps = kind.dependency_refs();
        assert_eq!(deps[0].target_id, ResourceId::new("services:haproxy:backend", "web"));
    }

    #[test]
    fn dhcp_static_rejects_malformed_mac() {
        let kind = ResourceKind::ServicesDhcpStatic(DhcpStaticProperties {
            interface: "lan".into(),
            mac_address: "not-a-mac".into(),
            ip_address: "10.0.0.50".into(),
            hostname: None,
        });
        assert!(!kind.validate().ok());
    }

    #[test]
    fn dhcp_range_rejects_inverted_bounds() {
        let kind = ResourceKind::ServicesDhcpRange(DhcpRangeProperties {
            interface: "lan".into(),
            range_from: "10.0.0.200".into(),
            range_to: "10.0.0.100".into(),
            subnet: "10.0.0.0/24".into(),
        });
        assert!(!kind.validate().ok());
    }

    #[test]
    fn dns_override_rejects_invalid_hostname() {
        let kind = ResourceKind::ServicesDnsOverride(DnsOverrideProperties {
            host: "my.host".into(),
            domain: "example.lan".into(),
            ip_address: "10.0.0.5".into(),
            description: None,
        });
        assert!(!kind.validate().ok());
    }

    #[test]
    fn replace_forcing_paths_match_the_catalog() {
        let vlan = ResourceKind::NetworkVlan(VlanProperties {
            interface: "igc1".into(),
            tag: 10,
            description: None,
        });
        assert_eq!(vlan.replace_forcing_paths(), &["interface", "tag"]);

        let alias = ResourceKind::FirewallAlias(FirewallAliasProperties {
            alias_type: AliasType::Host,
            entries: vec!["10.0.0.1".into()],
            description: None,
        });
        assert!(alias.replace_forcing_paths().is_empty());
    }

    #[test]
    fn catalog_lists_all_eleven_kinds() {
        assert_eq!(ResourceKind::catalog().len(), 11);
    }
}
