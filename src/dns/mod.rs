pub mod dnscmd;
pub mod normalize;

use anyhow::Result;
use async_trait::async_trait;
use std::sync::Arc;

use crate::config::Config;
use crate::models::{RawDnsRecord, RecordType};

pub use dnscmd::DnscmdSource;
pub use normalize::normalize_record;

/// A DNS server the reconciler can enumerate zone records from.
/// Each call opens and releases its own session with the server.
#[async_trait]
pub trait DnsSource: Send + Sync {
    async fn fetch_records(&self, zone: &str, record_type: RecordType) -> Result<Vec<RawDnsRecord>>;
}

/// Build the configured DNS source, if DNS enrichment is enabled
pub fn build_source(config: &Config) -> Option<Arc<dyn DnsSource>> {
    if !config.dns_enabled() {
        return None;
    }
    Some(Arc::new(DnscmdSource::new(
        config.dns_server.clone(),
        config.upstream_timeout_secs,
    )))
}
