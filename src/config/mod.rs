use anyhow::{bail, Result};
use std::env;
use std::str::FromStr;

use crate::utils::parse_list;

/// Which DHCP server flavour leases are read from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DhcpBackend {
    Netsh,
    Dnsmasq,
    Kea,
}

impl FromStr for DhcpBackend {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "netsh" | "windows" => Ok(DhcpBackend::Netsh),
            "dnsmasq" => Ok(DhcpBackend::Dnsmasq),
            "kea" => Ok(DhcpBackend::Kea),
            other => bail!("unknown DHCP_BACKEND '{}' (expected netsh, dnsmasq or kea)", other),
        }
    }
}

/// Which source wins when a lease hostname and the forward record disagree
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum HostnamePolicy {
    /// Lease hostname, then A record
    #[default]
    LeaseFirst,
    /// A record, then lease hostname
    DnsFirst,
}

impl FromStr for HostnamePolicy {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "lease" | "dhcp" => Ok(HostnamePolicy::LeaseFirst),
            "dns" => Ok(HostnamePolicy::DnsFirst),
            other => bail!("unknown HOSTNAME_PRECEDENCE '{}' (expected lease or dns)", other),
        }
    }
}

/// Immutable inputs of one reconciliation pass
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PassSettings {
    pub scopes: Vec<String>,
    pub forward_zone: Option<String>,
    pub reverse_zones: Vec<String>,
    pub retire_after_misses: u32,
    pub hostname_policy: HostnamePolicy,
}

impl Default for PassSettings {
    fn default() -> Self {
        Self {
            scopes: Vec::new(),
            forward_zone: None,
            reverse_zones: Vec::new(),
            retire_after_misses: 1,
            hostname_policy: HostnamePolicy::LeaseFirst,
        }
    }
}

/// Config holds all application configuration
#[derive(Debug, Clone)]
pub struct Config {
    pub scopes: Vec<String>,
    pub dhcp_backend: String,
    pub dhcp_server: String,
    pub dhcp_lease_path: String,
    pub dns_server: String,
    pub dns_zone: String,
    pub dns_reverse_zones: Vec<String>,
    pub database_uri: String,
    pub db_max_connections: u32,
    pub retire_after_misses: u32,
    pub hostname_precedence: String,
    pub upstream_timeout_secs: u64,
    pub listen_addr: String,
    pub reconcile_interval_secs: u64,
}

impl Config {
    /// Load configuration from environment variables with defaults
    pub fn load() -> Self {
        Self {
            scopes: parse_list(&get_env("SCOPES", "")),
            dhcp_backend: get_env("DHCP_BACKEND", "netsh"),
            dhcp_server: get_env("DHCP_SERVER", ""),
            dhcp_lease_path: get_env("DHCP_LEASE_PATH", "/var/lib/misc/dnsmasq.leases"),
            dns_server: get_env("DNS_SERVER", ""),
            dns_zone: get_env("DNS_ZONE", ""),
            dns_reverse_zones: parse_list(&get_env("DNS_REVERSE_ZONES", "")),
            database_uri: get_env("DATABASE_URI", "/data/clients.db"),
            db_max_connections: get_env("DB_MAX_CONNECTIONS", "5")
                .parse()
                .unwrap_or(5),
            retire_after_misses: get_env("RETIRE_AFTER_MISSES", "1")
                .parse()
                .unwrap_or(1),
            hostname_precedence: get_env("HOSTNAME_PRECEDENCE", "lease"),
            upstream_timeout_secs: get_env("UPSTREAM_TIMEOUT_SECS", "30")
                .parse()
                .unwrap_or(30),
            listen_addr: get_env("LISTEN_ADDR", "0.0.0.0:8080"),
            reconcile_interval_secs: get_env("RECONCILE_INTERVAL_SECS", "0")
                .parse()
                .unwrap_or(0),
        }
    }

    /// Reject settings a pass cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.scopes.is_empty() {
            bail!("SCOPES must list at least one DHCP scope");
        }
        let backend: DhcpBackend = self.dhcp_backend.parse()?;
        if backend != DhcpBackend::Dnsmasq && self.dhcp_server.is_empty() {
            bail!("DHCP_SERVER is required for the {} backend", self.dhcp_backend);
        }
        if !self.dns_server.is_empty() && self.dns_zone.is_empty() && self.dns_reverse_zones.is_empty() {
            bail!("DNS_SERVER is set but neither DNS_ZONE nor DNS_REVERSE_ZONES is");
        }
        if self.retire_after_misses == 0 {
            bail!("RETIRE_AFTER_MISSES must be at least 1");
        }
        if self.db_max_connections == 0 {
            bail!("DB_MAX_CONNECTIONS must be at least 1");
        }
        self.hostname_precedence.parse::<HostnamePolicy>()?;
        Ok(())
    }

    pub fn dhcp_backend(&self) -> Result<DhcpBackend> {
        self.dhcp_backend.parse()
    }

    /// Whether DNS enrichment is configured at all
    pub fn dns_enabled(&self) -> bool {
        !self.dns_server.is_empty()
    }

    /// Snapshot the values a reconciliation pass consumes
    pub fn pass_settings(&self) -> Result<PassSettings> {
        let dns = self.dns_enabled();
        Ok(PassSettings {
            scopes: self.scopes.clone(),
            forward_zone: (dns && !self.dns_zone.is_empty()).then(|| self.dns_zone.clone()),
            reverse_zones: if dns { self.dns_reverse_zones.clone() } else { Vec::new() },
            retire_after_misses: self.retire_after_misses,
            hostname_policy: self.hostname_precedence.parse()?,
        })
    }
}

fn get_env(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

#[cfg(test)]
impl Config {
    /// A valid netsh + dnscmd configuration for tests
    pub(crate) fn sample() -> Self {
        Self {
            scopes: vec!["10.0.1.0".to_string()],
            dhcp_backend: "netsh".to_string(),
            dhcp_server: "dhcp01".to_string(),
            dhcp_lease_path: String::new(),
            dns_server: "dns01".to_string(),
            dns_zone: "corp.example".to_string(),
            dns_reverse_zones: vec!["1.0.10.in-addr.arpa".to_string()],
            database_uri: "sqlite::memory:".to_string(),
            db_max_connections: 1,
            retire_after_misses: 1,
            hostname_precedence: "lease".to_string(),
            upstream_timeout_secs: 30,
            listen_addr: "127.0.0.1:0".to_string(),
            reconcile_interval_secs: 0,
        }
    }
}
