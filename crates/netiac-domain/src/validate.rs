use std::net::Ipv4Addr;

/// Parses `a.b.c.d/n` and returns the address and prefix length if both are
/// well-formed. Does not require the host bits to be zero.
pub fn parse_cidr_v4(s: &str) -> Option<(Ipv4Addr, u8)> {
    let (addr, prefix) = s.split_once('/')?;
    let addr: Ipv4Addr = addr.parse().ok()?;
    let prefix: u8 = prefix.parse().ok()?;
    if prefix > 32 {
        return None;
    }
    Some((addr, prefix))
}

/// Normalizes a MAC address to lowercase `xx:xx:xx:xx:xx:xx`, accepting
/// `:` or `-` as the input separator. Returns `None` if malformed.
pub fn normalize_mac(s: &str) -> Option<String> {
    let parts: Vec<&str> = if s.contains(':') {
        s.split(':').collect()
    } else if s.contains('-') {
        s.split('-').collect()
    } else {
        return None;
    };
    if parts.len() != 6 {
        return None;
    }
    let mut octets = Vec::with_capacity(6);
    for part in parts {
        if part.len() != 2 || !part.chars().all(|c| c.is_ascii_hexdigit()) {
            return None;
        }
        octets.push(part.to_ascii_lowercase());
    }
    Some(octets.join(":"))
}

/// `^[A-Za-z0-9-]+$`
pub fn is_valid_hostname(s: &str) -> bool {
    !s.is_empty() && s.chars().all(|c| c.is_ascii_alphanumeric() || c == '-')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mac_address_normalizes_case_and_separator() {
        assert_eq!(normalize_mac("AA-BB-CC-DD-EE-FF"), Some("aa:bb:cc:dd:ee:ff".into()));
        assert_eq!(normalize_mac("aa:bb:cc:dd:ee:ff"), Some("aa:bb:cc:dd:ee:ff".into()));
    }

    #[test]
    fn mac_address_rejects_malformed_input() {
        assert_eq!(normalize_mac("not-a-mac"), None);
        assert_eq!(normalize_mac("aa:bb:cc:dd:ee"), None);
    }

    #[test]
    fn cidr_rejects_out_of_range_prefix() {
        assert!(parse_cidr_v4("10.0.0.0/33").is_none());
        assert!(parse_cidr_v4("10.0.0.0/24").is_some());
    }

    #[test]
    fn hostname_rejects_non_alphanumeric() {
        assert!(is_valid_hostname("host-1"));
        assert!(!is_valid_hostname("host_1"));
        assert!(!is_valid_hostname("host.example"));
    }
}
