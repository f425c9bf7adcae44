use std::net::Ipv4Addr;

use crate::error::MalformedRecordError;
use crate::models::{LeaseFact, RawLease};
use crate::utils::{canonical_name, is_valid_hostname, normalize_mac};

/// Validate a raw lease and convert it into a canonical LeaseFact
pub fn normalize_lease(raw: &RawLease) -> Result<LeaseFact, MalformedRecordError> {
    if raw.mac.trim().is_empty() {
        return Err(MalformedRecordError::lease(format!("missing MAC for {}", raw.ip)));
    }
    let mac = normalize_mac(&raw.mac)
        .ok_or_else(|| MalformedRecordError::lease(format!("invalid MAC '{}'", raw.mac)))?;

    let ip: Ipv4Addr = raw
        .ip
        .trim()
        .parse()
        .map_err(|_| MalformedRecordError::lease(format!("invalid IPv4 '{}' for {}", raw.ip, mac)))?;

    let hostname = match raw.hostname.as_deref().map(str::trim) {
        None | Some("") => None,
        Some(name) if is_valid_hostname(name) => Some(canonical_name(name)),
        Some(name) => {
            return Err(MalformedRecordError::lease(format!(
                "invalid hostname '{}' for {}",
                name, mac
            )))
        }
    };

    Ok(LeaseFact {
        mac,
        ip,
        hostname,
        scope: raw.scope.clone(),
        expires_at: raw.expires_at,
        lease_kind: raw.lease_kind,
    })
}
