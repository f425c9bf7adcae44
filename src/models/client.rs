use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::Ipv4Addr;
use std::str::FromStr;

/// Expiry assigned to leases the DHCP server reports as never expiring.
pub fn never_expires() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(9999, 12, 31, 23, 59, 59)
        .single()
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}

/// How the DHCP server handed out the address
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LeaseKind {
    #[default]
    Dynamic,
    Reservation,
}

impl LeaseKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            LeaseKind::Dynamic => "dynamic",
            LeaseKind::Reservation => "reservation",
        }
    }
}

impl fmt::Display for LeaseKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LeaseKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "dynamic" => Ok(LeaseKind::Dynamic),
            "reservation" => Ok(LeaseKind::Reservation),
            other => Err(format!("unknown lease kind: {}", other)),
        }
    }
}

/// DNS record types the reconciler reads
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RecordType {
    A,
    #[serde(rename = "PTR")]
    Ptr,
}

impl RecordType {
    pub fn as_str(&self) -> &'static str {
        match self {
            RecordType::A => "A",
            RecordType::Ptr => "PTR",
        }
    }
}

impl fmt::Display for RecordType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// RawLease is one lease row as an upstream DHCP source reports it, before validation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawLease {
    pub scope: String,
    pub ip: String,
    pub mac: String,
    pub hostname: Option<String>,
    pub expires_at: Option<DateTime<Utc>>,
    pub lease_kind: LeaseKind,
}

/// RawDnsRecord is one resource record as an upstream DNS source reports it.
/// `name` is the owner name (relative or absolute), `data` the record data.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawDnsRecord {
    pub zone: String,
    pub name: String,
    pub record_type: RecordType,
    pub data: String,
}

/// LeaseFact is a validated DHCP lease observation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LeaseFact {
    pub mac: String,
    pub ip: Ipv4Addr,
    pub hostname: Option<String>,
    pub scope: String,
    pub expires_at: Option<DateTime<Utc>>,
    pub lease_kind: LeaseKind,
}

impl LeaseFact {
    /// A lease is active while its expiry lies in the future
    pub fn is_active(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|t| t > now)
    }
}

/// DnsFact is a validated A or PTR observation.
/// For PTR records `ip` is the owner address and `name` the target host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DnsFact {
    pub name: String,
    pub ip: Ipv4Addr,
    pub zone: String,
    pub record_type: RecordType,
}

/// ClientRecord is the canonical client entity produced by identity resolution
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientRecord {
    pub mac: String,
    pub ip: Ipv4Addr,
    pub hostname: Option<String>,
    pub scope: String,
    pub lease_kind: LeaseKind,
    pub lease_active: bool,
    pub dns_consistent: bool,
}

impl ClientRecord {
    /// Names of the attributes that differ between two observations of the same MAC
    pub fn changed_fields(&self, other: &ClientRecord) -> Vec<&'static str> {
        let mut changed = Vec::new();
        if self.ip != other.ip {
            changed.push("ip");
        }
        if self.hostname != other.hostname {
            changed.push("hostname");
        }
        if self.scope != other.scope {
            changed.push("scope");
        }
        if self.lease_kind != other.lease_kind {
            changed.push("lease_kind");
        }
        if self.lease_active != other.lease_active {
            changed.push("lease_active");
        }
        if self.dns_consistent != other.dns_consistent {
            changed.push("dns_consistent");
        }
        changed
    }
}

/// StoredClient is a persisted inventory row
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredClient {
    #[serde(flatten)]
    pub record: ClientRecord,
    pub first_seen_at: DateTime<Utc>,
    pub last_seen_at: DateTime<Utc>,
    pub missed_passes: u32,
    pub retired: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retired_at: Option<DateTime<Utc>>,
}
