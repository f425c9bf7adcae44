pub mod kea;
pub mod leases;
pub mod netsh;
pub mod normalize;

use anyhow::Result;
use async_trait::async_trait;
use std::sync::Arc;

use crate::config::{Config, DhcpBackend};
use crate::models::RawLease;

pub use kea::KeaDhcpSource;
pub use leases::DnsmasqLeaseSource;
pub use netsh::NetshDhcpSource;
pub use normalize::normalize_lease;

/// A DHCP server the reconciler can read leases from.
/// Each call opens and releases its own session with the server.
#[async_trait]
pub trait DhcpSource: Send + Sync {
    async fn fetch_leases(&self, scope: &str) -> Result<Vec<RawLease>>;
}

/// Build the configured DHCP source
pub fn build_source(config: &Config) -> Result<Arc<dyn DhcpSource>> {
    let source: Arc<dyn DhcpSource> = match config.dhcp_backend()? {
        DhcpBackend::Netsh => Arc::new(NetshDhcpSource::new(
            config.dhcp_server.clone(),
            config.upstream_timeout_secs,
        )),
        DhcpBackend::Dnsmasq => Arc::new(DnsmasqLeaseSource::new(config.dhcp_lease_path.clone())),
        DhcpBackend::Kea => Arc::new(KeaDhcpSource::new(
            config.dhcp_server.clone(),
            config.upstream_timeout_secs,
        )?),
    };
    Ok(source)
}
