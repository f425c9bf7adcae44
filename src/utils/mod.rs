use std::net::Ipv4Addr;

/// Normalize MAC address to lowercase with colons.
/// Returns None unless the input holds exactly six hex octets, optionally
/// separated by ':', '-' or '.' (Cisco dotted form).
pub fn normalize_mac(mac: &str) -> Option<String> {
    let trimmed = mac.trim();
    if trimmed.is_empty() {
        return None;
    }

    // Only hex digits and the known separators are allowed
    if !trimmed
        .chars()
        .all(|c| c.is_ascii_hexdigit() || c == ':' || c == '-' || c == '.')
    {
        return None;
    }

    let clean: String = trimmed.chars().filter(|c| c.is_ascii_hexdigit()).collect();
    if clean.len() != 12 {
        return None;
    }

    // Separated forms must group the digits evenly (aa:bb:.. or aabb.ccdd.eeff)
    let groups: Vec<&str> = trimmed.split([':', '-', '.']).collect();
    if groups.len() > 1 {
        let width = groups[0].len();
        if !(width == 2 || width == 4) || groups.iter().any(|g| g.len() != width) {
            return None;
        }
    }

    Some(
        clean
            .chars()
            .collect::<Vec<_>>()
            .chunks(2)
            .map(|c| c.iter().collect::<String>())
            .collect::<Vec<_>>()
            .join(":")
            .to_lowercase(),
    )
}

/// Validate a hostname as a DNS label sequence (letters, digits, hyphens).
/// Labels are 1-63 characters and may not start or end with a hyphen.
pub fn is_valid_hostname(hostname: &str) -> bool {
    let name = hostname.strip_suffix('.').unwrap_or(hostname);
    if name.is_empty() || name.len() > 253 {
        return false;
    }
    name.split('.').all(|label| {
        !label.is_empty()
            && label.len() <= 63
            && !label.starts_with('-')
            && !label.ends_with('-')
            && label.chars().all(|c| c.is_ascii_alphanumeric() || c == '-')
    })
}

/// Lowercase a DNS name and drop the trailing root dot
pub fn canonical_name(name: &str) -> String {
    name.trim().trim_end_matches('.').to_lowercase()
}

/// First label of a DNS name, lowercased ("Host1.corp.example." -> "host1")
pub fn host_label(name: &str) -> String {
    let name = canonical_name(name);
    match name.split_once('.') {
        Some((label, _)) => label.to_string(),
        None => name,
    }
}

/// Qualify a record owner name against its zone.
/// "@" is the zone apex, names ending in '.' are absolute, anything else is relative.
pub fn qualify_name(name: &str, zone: &str) -> String {
    let zone = canonical_name(zone);
    let name = name.trim();
    if name.is_empty() || name == "@" {
        return zone;
    }
    if name.ends_with('.') {
        return canonical_name(name);
    }
    let lower = name.to_lowercase();
    if zone.is_empty() || lower == zone || lower.ends_with(&format!(".{}", zone)) {
        lower
    } else {
        format!("{}.{}", lower, zone)
    }
}

/// Convert a reverse-lookup name to the IPv4 address it describes.
/// e.g., "5.0.0.10.in-addr.arpa" -> 10.0.0.5
pub fn reverse_name_to_ipv4(name: &str) -> Option<Ipv4Addr> {
    let name = canonical_name(name);
    let octets = name.strip_suffix(".in-addr.arpa")?;
    let parts: Vec<&str> = octets.split('.').collect();
    if parts.len() != 4 {
        return None;
    }
    let mut bytes = [0u8; 4];
    for (i, part) in parts.iter().rev().enumerate() {
        if part.is_empty() || part.len() > 3 || !part.chars().all(|c| c.is_ascii_digit()) {
            return None;
        }
        bytes[i] = part.parse().ok()?;
    }
    Some(Ipv4Addr::from(bytes))
}

/// Check whether an address falls inside a DHCP scope written as
/// "a.b.c.d" (assumed /24) or "a.b.c.d/len".
pub fn scope_contains(scope: &str, ip: Ipv4Addr) -> bool {
    let (network, prefix) = match scope.split_once('/') {
        Some((net, len)) => match len.trim().parse::<u8>() {
            Ok(len) if len <= 32 => (net, len),
            _ => return false,
        },
        None => (scope, 24),
    };
    let Ok(network) = network.trim().parse::<Ipv4Addr>() else {
        return false;
    };
    let mask = if prefix == 0 { 0 } else { u32::MAX << (32 - prefix) };
    u32::from(network) & mask == u32::from(ip) & mask
}

/// Split a list setting such as "[10.0.1.0, 10.0.2.0]" into its items
pub fn parse_list(value: &str) -> Vec<String> {
    value
        .trim()
        .trim_start_matches('[')
        .trim_end_matches(']')
        .split(',')
        .map(|s| s.trim().trim_matches(|c| c == '"' || c == '\'').to_string())
        .filter(|s| !s.is_empty())
        .collect()
}
