use anyhow::{Context, Result};
use async_trait::async_trait;
use std::net::Ipv4Addr;

use crate::models::{never_expires, LeaseKind, RawLease};
use crate::utils::scope_contains;

use super::DhcpSource;

/// Reads leases from a dnsmasq lease file, selecting each scope's subnet
pub struct DnsmasqLeaseSource {
    lease_path: String,
}

impl DnsmasqLeaseSource {
    pub fn new(lease_path: String) -> Self {
        Self { lease_path }
    }
}

#[async_trait]
impl DhcpSource for DnsmasqLeaseSource {
    async fn fetch_leases(&self, scope: &str) -> Result<Vec<RawLease>> {
        let content = tokio::fs::read_to_string(&self.lease_path)
            .await
            .with_context(|| format!("Failed to read lease file {}", self.lease_path))?;
        Ok(parse_lease_file(scope, &content))
    }
}

/// Parse dnsmasq lease file content, keeping the leases inside `scope`.
/// Lines whose address is unparseable are kept so the normalizer can report them.
pub fn parse_lease_file(scope: &str, content: &str) -> Vec<RawLease> {
    let mut leases = Vec::new();

    for line in content.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        if let Some(lease) = parse_lease_line(scope, line) {
            let in_scope = lease
                .ip
                .parse::<Ipv4Addr>()
                .map(|ip| scope_contains(scope, ip))
                .unwrap_or(true);
            if in_scope {
                leases.push(lease);
            }
        }
    }

    leases
}

/// Parse a single lease line.
/// Format: expiry_time mac_address ip_address hostname client_id
fn parse_lease_line(scope: &str, line: &str) -> Option<RawLease> {
    let fields: Vec<&str> = line.split_whitespace().collect();
    if fields.len() < 4 {
        return None;
    }

    // IPv6 lease lines ("duid ...") carry no MAC and are not ours
    if fields[0] == "duid" || fields[2].contains(':') {
        return None;
    }

    let expiry_time: i64 = fields[0].parse().ok()?;
    let expires_at = if expiry_time == 0 {
        Some(never_expires())
    } else {
        chrono::DateTime::from_timestamp(expiry_time, 0)
    };

    Some(RawLease {
        scope: scope.to_string(),
        ip: fields[2].to_string(),
        mac: fields[1].to_string(),
        hostname: Some(fields[3].to_string()).filter(|h| h != "*"),
        expires_at,
        lease_kind: LeaseKind::Dynamic,
    })
}
