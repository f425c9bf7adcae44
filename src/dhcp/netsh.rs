use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Local, NaiveDateTime, TimeZone, Utc};
use regex_lite::Regex;
use tokio::process::Command;
use tokio::time::{timeout, Duration};

use crate::models::{never_expires, LeaseKind, RawLease};

use super::DhcpSource;

/// Lease table row of `netsh dhcp server ... show clients 1`:
/// IP - Subnet Mask - Unique ID - Lease Expires -Type- Name
const CLIENT_LINE: &str =
    r"^\s*(\d{1,3}\.\d{1,3}\.\d{1,3}\.\d{1,3})\s*-\s*(\S+)\s*-\s*(\S+)\s*-\s*(.*?)\s*-([A-Z])-\s*(.*?)\s*$";

/// Footer netsh prints after a successful scope listing
const FOOTER_MARKER: &str = "No of Clients";

const EXPIRY_FORMATS: &[&str] = &[
    "%m/%d/%Y %I:%M:%S %p",
    "%m/%d/%Y %H:%M:%S",
    "%d.%m.%Y %H:%M:%S",
    "%Y-%m-%d %H:%M:%S",
];

/// Reads leases from a Windows DHCP server through `netsh`
pub struct NetshDhcpSource {
    server: String,
    timeout_secs: u64,
}

impl NetshDhcpSource {
    pub fn new(server: String, timeout_secs: u64) -> Self {
        Self { server, timeout_secs }
    }
}

#[async_trait]
impl DhcpSource for NetshDhcpSource {
    async fn fetch_leases(&self, scope: &str) -> Result<Vec<RawLease>> {
        let server = format!("\\\\{}", self.server);
        let output = timeout(
            Duration::from_secs(self.timeout_secs),
            Command::new("netsh")
                .args(["dhcp", "server", &server, "scope", scope, "show", "clients", "1"])
                .kill_on_drop(true)
                .output(),
        )
        .await
        .with_context(|| format!("netsh timed out after {}s", self.timeout_secs))?
        .context("Failed to run netsh")?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            bail!("netsh exited with {}: {}", output.status, stderr.trim());
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        parse_netsh_clients(scope, &stdout)
    }
}

/// Parse the client table printed by netsh for one scope.
/// Output without the trailing client count is treated as a failed query.
pub fn parse_netsh_clients(scope: &str, output: &str) -> Result<Vec<RawLease>> {
    if !output.contains(FOOTER_MARKER) {
        let first = output.lines().find(|l| !l.trim().is_empty()).unwrap_or("").trim();
        bail!("unexpected netsh output for scope {}: {}", scope, first);
    }

    let re = Regex::new(CLIENT_LINE).context("Failed to compile netsh line pattern")?;
    let mut leases = Vec::new();

    for line in output.lines() {
        let Some(caps) = re.captures(line) else {
            continue;
        };

        let ip = caps[1].to_string();
        let mac = caps[3].to_string();
        let expiry_text = caps[4].trim();
        let lease_kind = if &caps[5] == "R" {
            LeaseKind::Reservation
        } else {
            LeaseKind::Dynamic
        };
        let hostname = Some(caps[6].trim().to_string()).filter(|h| !h.is_empty());

        leases.push(RawLease {
            scope: scope.to_string(),
            ip,
            mac,
            hostname,
            expires_at: parse_expiry(expiry_text),
            lease_kind,
        });
    }

    Ok(leases)
}

/// "NEVER EXPIRES" maps to the never-expires sentinel; "INACTIVE" and
/// unparseable text leave the lease without an expiry (inactive).
fn parse_expiry(text: &str) -> Option<DateTime<Utc>> {
    if text.eq_ignore_ascii_case("NEVER EXPIRES") {
        return Some(never_expires());
    }
    EXPIRY_FORMATS.iter().find_map(|fmt| {
        let naive = NaiveDateTime::parse_from_str(text, fmt).ok()?;
        Local
            .from_local_datetime(&naive)
            .earliest()
            .map(|t| t.with_timezone(&Utc))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const SAMPLE: &str = "
Changed the current scope context to 10.0.1.0 scope.

Type : N - NONE, D - DHCP B - BOOTP, U - UNSPECIFIED, R - RESERVATION IP
============================================================================================
IP Address      - Subnet Mask    - Unique ID           - Lease Expires          -Type -Name
============================================================================================

10.0.1.10       - 255.255.255.0  - 00-11-22-33-44-55   - 10/20/2026 3:14:15 PM  -D-  host1.corp.example
10.0.1.11       - 255.255.255.0  - 00-11-22-33-44-66   - NEVER EXPIRES          -R-  printer
10.0.1.12       - 255.255.255.0  - 00-11-22-33-44-77   - INACTIVE               -N-

No of Clients(version 4): 3 in the Scope : 10.0.1.0.

Command completed successfully.
";

    #[test]
    fn test_parse_netsh_clients() {
        let leases = parse_netsh_clients("10.0.1.0", SAMPLE).unwrap();
        assert_eq!(leases.len(), 3);

        assert_eq!(leases[0].ip, "10.0.1.10");
        assert_eq!(leases[0].mac, "00-11-22-33-44-55");
        assert_eq!(leases[0].hostname.as_deref(), Some("host1.corp.example"));
        assert_eq!(leases[0].lease_kind, LeaseKind::Dynamic);
        assert!(leases[0].expires_at.is_some());

        assert_eq!(leases[1].lease_kind, LeaseKind::Reservation);
        assert_eq!(leases[1].expires_at, Some(never_expires()));

        assert_eq!(leases[2].hostname, None);
        assert_eq!(leases[2].expires_at, None);
        assert!(leases.iter().all(|l| l.scope == "10.0.1.0"));
    }

    #[test]
    fn test_empty_scope_is_not_an_error() {
        let out = "Changed the current scope context to 10.0.9.0 scope.\n\nNo of Clients(version 4): 0 in the Scope : 10.0.9.0.\n";
        assert!(parse_netsh_clients("10.0.9.0", out).unwrap().is_empty());
    }

    #[test]
    fn test_error_output_is_rejected() {
        let out = "The command needs a valid Scope IP Address.\n";
        let err = parse_netsh_clients("10.0.9.0", out).unwrap_err();
        assert!(err.to_string().contains("valid Scope IP Address"));
    }

    #[test]
    fn test_parse_expiry_formats() {
        assert!(parse_expiry("10/20/2026 3:14:15 PM").is_some());
        assert!(parse_expiry("20.10.2026 15:14:15").is_some());
        assert_eq!(parse_expiry("INACTIVE"), None);
    }
}
