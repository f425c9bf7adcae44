use anyhow::{bail, Result};
use chrono::{DateTime, Utc};
use sqlx::SqliteExecutor;

use crate::models::*;

use super::row_helpers::map_client_row;

const CLIENT_COLUMNS: &str = "mac, ip, hostname, scope, lease_kind, lease_active, dns_consistent, \
     first_seen_at, last_seen_at, missed_passes, retired, retired_at";

/// Client inventory database operations
pub struct ClientRepo;

impl ClientRepo {
    pub async fn list_all(exec: impl SqliteExecutor<'_>) -> Result<Vec<StoredClient>> {
        let rows = sqlx::query(&format!("SELECT {} FROM clients ORDER BY mac", CLIENT_COLUMNS))
            .fetch_all(exec)
            .await?;
        rows.iter().map(map_client_row).collect()
    }

    pub async fn list(
        exec: impl SqliteExecutor<'_>,
        include_retired: bool,
        limit: i32,
        offset: i32,
    ) -> Result<Vec<StoredClient>> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM clients WHERE retired = 0 OR ? ORDER BY mac LIMIT ? OFFSET ?",
            CLIENT_COLUMNS
        ))
        .bind(include_retired)
        .bind(limit)
        .bind(offset)
        .fetch_all(exec)
        .await?;
        rows.iter().map(map_client_row).collect()
    }

    pub async fn get(exec: impl SqliteExecutor<'_>, mac: &str) -> Result<Option<StoredClient>> {
        let row = sqlx::query(&format!("SELECT {} FROM clients WHERE mac = ?", CLIENT_COLUMNS))
            .bind(mac)
            .fetch_optional(exec)
            .await?;
        row.as_ref().map(map_client_row).transpose()
    }

    pub async fn count(exec: impl SqliteExecutor<'_>) -> Result<i64> {
        let count: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM clients")
            .fetch_one(exec)
            .await?;
        Ok(count.0)
    }

    /// Insert a newly observed client. A MAC that already exists is an error.
    pub async fn insert(exec: impl SqliteExecutor<'_>, record: &ClientRecord, now: DateTime<Utc>) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO clients (mac, ip, hostname, scope, lease_kind, lease_active, dns_consistent,
                first_seen_at, last_seen_at, missed_passes, retired, retired_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, 0, 0, NULL)
            "#,
        )
        .bind(&record.mac)
        .bind(record.ip.to_string())
        .bind(&record.hostname)
        .bind(&record.scope)
        .bind(record.lease_kind.as_str())
        .bind(record.lease_active)
        .bind(record.dns_consistent)
        .bind(now)
        .bind(now)
        .execute(exec)
        .await?;
        Ok(())
    }

    /// Overwrite a client's attributes, clearing any retirement
    pub async fn update(exec: impl SqliteExecutor<'_>, record: &ClientRecord, now: DateTime<Utc>) -> Result<()> {
        let result = sqlx::query(
            r#"
            UPDATE clients SET ip = ?, hostname = ?, scope = ?, lease_kind = ?, lease_active = ?,
                dns_consistent = ?, last_seen_at = ?, missed_passes = 0, retired = 0, retired_at = NULL
            WHERE mac = ?
            "#,
        )
        .bind(record.ip.to_string())
        .bind(&record.hostname)
        .bind(&record.scope)
        .bind(record.lease_kind.as_str())
        .bind(record.lease_active)
        .bind(record.dns_consistent)
        .bind(now)
        .bind(&record.mac)
        .execute(exec)
        .await?;

        if result.rows_affected() != 1 {
            bail!("update of {} matched {} rows", record.mac, result.rows_affected());
        }
        Ok(())
    }

    pub async fn touch(exec: impl SqliteExecutor<'_>, mac: &str, now: DateTime<Utc>) -> Result<()> {
        let result = sqlx::query("UPDATE clients SET last_seen_at = ?, missed_passes = 0 WHERE mac = ?")
            .bind(now)
            .bind(mac)
            .execute(exec)
            .await?;

        if result.rows_affected() != 1 {
            bail!("refresh of {} matched {} rows", mac, result.rows_affected());
        }
        Ok(())
    }

    pub async fn record_miss(exec: impl SqliteExecutor<'_>, mac: &str, missed_passes: u32) -> Result<()> {
        let result = sqlx::query("UPDATE clients SET missed_passes = ? WHERE mac = ? AND retired = 0")
            .bind(missed_passes as i64)
            .bind(mac)
            .execute(exec)
            .await?;

        if result.rows_affected() != 1 {
            bail!("miss for {} matched {} active rows", mac, result.rows_affected());
        }
        Ok(())
    }

    /// Soft-retire a client; the row is kept for history
    pub async fn retire(exec: impl SqliteExecutor<'_>, mac: &str, now: DateTime<Utc>) -> Result<()> {
        let result = sqlx::query(
            "UPDATE clients SET retired = 1, retired_at = ?, missed_passes = missed_passes + 1 WHERE mac = ? AND retired = 0",
        )
        .bind(now)
        .bind(mac)
        .execute(exec)
        .await?;

        if result.rows_affected() != 1 {
            bail!("retirement of {} matched {} active rows", mac, result.rows_affected());
        }
        Ok(())
    }
}
