//! Identity resolution: correlates DHCP leases with forward and reverse DNS
//! records into one [`ClientRecord`] per MAC address.
//!
//! DHCP is authoritative for MAC to IP. DNS only contributes hostnames and the
//! consistency flag, and DNS records whose address has no lease are ignored.

use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::net::Ipv4Addr;

use crate::config::HostnamePolicy;
use crate::models::{ClientRecord, DnsFact, LeaseFact, RecordType};
use crate::utils::host_label;

/// Resolve leases and DNS facts into client records, sorted by MAC
pub fn resolve(
    leases: &[LeaseFact],
    dns: &[DnsFact],
    policy: HostnamePolicy,
    now: DateTime<Utc>,
) -> Vec<ClientRecord> {
    // Phase 1: lookup tables
    let mut by_mac: HashMap<&str, &LeaseFact> = HashMap::with_capacity(leases.len());
    for lease in leases {
        match by_mac.get(lease.mac.as_str()).copied() {
            // absent expiry sorts lowest; ties go to the later observation
            Some(existing) if existing.expires_at > lease.expires_at => {
                tracing::debug!("Duplicate lease for {} on {} ignored (earlier expiry)", lease.mac, lease.ip);
            }
            Some(existing) => {
                tracing::debug!("Duplicate lease for {}: {} replaces {}", lease.mac, lease.ip, existing.ip);
                by_mac.insert(&lease.mac, lease);
            }
            None => {
                by_mac.insert(&lease.mac, lease);
            }
        }
    }

    let mut forward: HashMap<Ipv4Addr, String> = HashMap::new();
    let mut reverse: HashMap<Ipv4Addr, String> = HashMap::new();
    for fact in dns {
        let table = match fact.record_type {
            RecordType::A => &mut forward,
            RecordType::Ptr => &mut reverse,
        };
        table.insert(fact.ip, host_label(&fact.name));
    }

    // Phase 2: one record per MAC
    let mut records: Vec<ClientRecord> = by_mac
        .into_values()
        .map(|lease| {
            let lease_host = lease.hostname.as_deref().map(host_label);
            let a_host = forward.get(&lease.ip).cloned();
            let ptr_host = reverse.get(&lease.ip);

            let dns_consistent = match (&a_host, ptr_host) {
                (Some(a), Some(ptr)) if a == ptr => lease_host.as_ref().map_or(true, |l| l == a),
                _ => false,
            };

            // The PTR value alone never names a client
            let hostname = match policy {
                HostnamePolicy::LeaseFirst => lease_host.or(a_host),
                HostnamePolicy::DnsFirst => a_host.or(lease_host),
            };

            ClientRecord {
                mac: lease.mac.clone(),
                ip: lease.ip,
                hostname,
                scope: lease.scope.clone(),
                lease_kind: lease.lease_kind,
                lease_active: lease.is_active(now),
                dns_consistent,
            }
        })
        .collect();

    records.sort_by(|a, b| a.mac.cmp(&b.mac));
    records
}
