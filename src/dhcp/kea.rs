use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::models::{never_expires, LeaseKind, RawLease};

use super::DhcpSource;

/// Kea result code for "command succeeded but returned nothing"
const KEA_RESULT_EMPTY: i64 = 3;

/// Kea lease state for expired-reclaimed leases
const KEA_STATE_EXPIRED_RECLAIMED: i64 = 2;

/// Lifetime value Kea uses for infinite leases
const KEA_INFINITE_LFT: u64 = u32::MAX as u64;

#[derive(Debug, Serialize)]
struct KeaCommand<'a> {
    command: &'a str,
    service: [&'a str; 1],
    arguments: KeaSubnetArgs,
}

#[derive(Debug, Serialize)]
struct KeaSubnetArgs {
    subnets: Vec<u32>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct KeaResponse {
    pub result: i64,
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub arguments: Option<KeaLeases>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct KeaLeases {
    #[serde(default)]
    pub leases: Vec<KeaLease>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct KeaLease {
    #[serde(rename = "ip-address")]
    pub ip_address: String,
    #[serde(rename = "hw-address", default)]
    pub hw_address: String,
    #[serde(default)]
    pub hostname: String,
    #[serde(default)]
    pub cltt: i64,
    #[serde(rename = "valid-lft", default)]
    pub valid_lft: u64,
    #[serde(default)]
    pub state: i64,
}

/// Kea control agent API client
pub struct KeaDhcpSource {
    base_url: String,
    client: Client,
}

impl KeaDhcpSource {
    pub fn new(url: String, timeout_secs: u64) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .map_err(|e| anyhow!("Failed to build HTTP client: {}", e))?;

        Ok(Self {
            base_url: url.trim_end_matches('/').to_string(),
            client,
        })
    }
}

#[async_trait]
impl DhcpSource for KeaDhcpSource {
    async fn fetch_leases(&self, scope: &str) -> Result<Vec<RawLease>> {
        let subnet_id: u32 = scope
            .trim()
            .parse()
            .with_context(|| format!("Kea scope '{}' is not a numeric subnet id", scope))?;

        let body = KeaCommand {
            command: "lease4-get-all",
            service: ["dhcp4"],
            arguments: KeaSubnetArgs {
                subnets: vec![subnet_id],
            },
        };

        let resp = self
            .client
            .post(&self.base_url)
            .header("Accept", "application/json")
            .json(&body)
            .send()
            .await?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            bail!("Kea API error {}: {}", status, body);
        }

        let responses: Vec<KeaResponse> = resp.json().await?;
        leases_from_responses(scope, responses)
    }
}

/// Flatten control agent responses (one per service) into raw leases
pub(crate) fn leases_from_responses(scope: &str, responses: Vec<KeaResponse>) -> Result<Vec<RawLease>> {
    let mut leases = Vec::new();

    for response in responses {
        match response.result {
            0 => {}
            KEA_RESULT_EMPTY => continue,
            code => bail!("Kea command failed ({}): {}", code, response.text),
        }

        for lease in response.arguments.map(|a| a.leases).unwrap_or_default() {
            let expires_at = if lease.state == KEA_STATE_EXPIRED_RECLAIMED {
                None
            } else if lease.valid_lft >= KEA_INFINITE_LFT {
                Some(never_expires())
            } else {
                chrono::DateTime::from_timestamp(lease.cltt + lease.valid_lft as i64, 0)
            };

            leases.push(RawLease {
                scope: scope.to_string(),
                ip: lease.ip_address,
                mac: lease.hw_address,
                hostname: Some(lease.hostname).filter(|h| !h.is_empty()),
                expires_at,
                lease_kind: LeaseKind::Dynamic,
            });
        }
    }

    Ok(leases)
}
