use anyhow::{anyhow, Context, Result};
use sqlx::{sqlite::SqliteRow, Row};
use std::net::Ipv4Addr;

use crate::models::*;

/// Filter empty strings to None (the DB may store '' instead of NULL)
pub fn none_if_empty(opt: Option<String>) -> Option<String> {
    opt.filter(|s| !s.is_empty())
}

/// Map a SQLite row to a StoredClient struct
pub fn map_client_row(row: &SqliteRow) -> Result<StoredClient> {
    let mac: String = row.get("mac");
    let ip: String = row.get("ip");
    let ip: Ipv4Addr = ip
        .parse()
        .with_context(|| format!("Stored IP '{}' for {} is not IPv4", ip, mac))?;
    let lease_kind: String = row.get("lease_kind");
    let lease_kind: LeaseKind = lease_kind.parse().map_err(|e: String| anyhow!(e))?;
    let missed_passes: i64 = row.get("missed_passes");

    Ok(StoredClient {
        record: ClientRecord {
            mac,
            ip,
            hostname: none_if_empty(row.get("hostname")),
            scope: row.get("scope"),
            lease_kind,
            lease_active: row.get("lease_active"),
            dns_consistent: row.get("dns_consistent"),
        },
        first_seen_at: row.get("first_seen_at"),
        last_seen_at: row.get("last_seen_at"),
        missed_passes: u32::try_from(missed_passes).unwrap_or(u32::MAX),
        retired: row.get("retired"),
        retired_at: row.get("retired_at"),
    })
}

/// Map a SQLite row to a ReconcileRun struct
pub fn map_run_row(row: &SqliteRow) -> ReconcileRun {
    ReconcileRun {
        id: row.get("id"),
        status: row.get("status"),
        phase: none_if_empty(row.get("phase")),
        error: none_if_empty(row.get("error")),
        inserted: row.get("inserted"),
        updated: row.get("updated"),
        reactivated: row.get("reactivated"),
        refreshed: row.get("refreshed"),
        retired: row.get("retired"),
        skipped: row.get("skipped"),
        started_at: row.get("started_at"),
        finished_at: row.get("finished_at"),
    }
}
