use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use tokio::process::Command;
use tokio::time::{timeout, Duration};

use crate::models::{RawDnsRecord, RecordType};

use super::DnsSource;

const SUCCESS_MARKER: &str = "Command completed successfully";
const FAILURE_MARKER: &str = "Command failed";

/// Reads zone records from a Windows DNS server through `dnscmd`
pub struct DnscmdSource {
    server: String,
    timeout_secs: u64,
}

impl DnscmdSource {
    pub fn new(server: String, timeout_secs: u64) -> Self {
        Self { server, timeout_secs }
    }
}

#[async_trait]
impl DnsSource for DnscmdSource {
    async fn fetch_records(&self, zone: &str, record_type: RecordType) -> Result<Vec<RawDnsRecord>> {
        let output = timeout(
            Duration::from_secs(self.timeout_secs),
            Command::new("dnscmd")
                .args([
                    self.server.as_str(),
                    "/EnumRecords",
                    zone,
                    "@",
                    "/Type",
                    record_type.as_str(),
                    "/Continue",
                ])
                .kill_on_drop(true)
                .output(),
        )
        .await
        .with_context(|| format!("dnscmd timed out after {}s", self.timeout_secs))?
        .context("Failed to run dnscmd")?;

        let stdout = String::from_utf8_lossy(&output.stdout);
        if !output.status.success() {
            bail!("dnscmd exited with {}: {}", output.status, stdout.trim());
        }

        parse_enum_records(zone, record_type, &stdout)
    }
}

/// Parse `dnscmd /EnumRecords` output, keeping records of `record_type`.
/// Continuation lines (leading whitespace) belong to the previous owner name.
pub fn parse_enum_records(zone: &str, record_type: RecordType, output: &str) -> Result<Vec<RawDnsRecord>> {
    if let Some(line) = output.lines().find(|l| l.contains(FAILURE_MARKER)) {
        bail!("dnscmd failed for zone {}: {}", zone, line.trim());
    }
    if !output.contains(SUCCESS_MARKER) {
        bail!("unexpected dnscmd output for zone {}", zone);
    }

    let mut records = Vec::new();
    let mut owner: Option<String> = None;

    for line in output.lines() {
        if line.trim().is_empty()
            || line.starts_with("Returned records")
            || line.contains(SUCCESS_MARKER)
        {
            continue;
        }

        let mut tokens = line.split_whitespace();
        if !line.starts_with(char::is_whitespace) {
            owner = tokens.next().map(str::to_string);
        }
        let Some(name) = owner.as_deref() else {
            continue;
        };

        // Skip aging stamp and TTL, the next token is the record type
        let mut tokens = tokens.skip_while(|t| t.starts_with("[Aging:") || t.chars().all(|c| c.is_ascii_digit()));
        let (Some(rtype), data) = (tokens.next(), tokens.next()) else {
            continue;
        };
        if !rtype.eq_ignore_ascii_case(record_type.as_str()) {
            continue;
        }

        records.push(RawDnsRecord {
            zone: zone.to_string(),
            name: name.to_string(),
            record_type,
            data: data.unwrap_or_default().to_string(),
        });
    }

    Ok(records)
}
