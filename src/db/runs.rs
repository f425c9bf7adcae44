use anyhow::Result;
use sqlx::{Pool, Sqlite};

use crate::models::*;

use super::row_helpers::map_run_row;

/// Reconcile run history database operations
pub struct RunRepo;

impl RunRepo {
    pub async fn create(pool: &Pool<Sqlite>, run: &ReconcileRun) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO reconcile_runs (id, status, phase, error, inserted, updated, reactivated,
                refreshed, retired, skipped, started_at, finished_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&run.id)
        .bind(&run.status)
        .bind(&run.phase)
        .bind(&run.error)
        .bind(run.inserted)
        .bind(run.updated)
        .bind(run.reactivated)
        .bind(run.refreshed)
        .bind(run.retired)
        .bind(run.skipped)
        .bind(run.started_at)
        .bind(run.finished_at)
        .execute(pool)
        .await?;
        Ok(())
    }

    pub async fn list(pool: &Pool<Sqlite>, limit: i32) -> Result<Vec<ReconcileRun>> {
        let limit = if limit <= 0 { 100 } else { limit };
        let rows = sqlx::query(
            r#"
            SELECT id, status, phase, error, inserted, updated, reactivated, refreshed,
                   retired, skipped, started_at, finished_at
            FROM reconcile_runs
            ORDER BY started_at DESC
            LIMIT ?
            "#,
        )
        .bind(limit)
        .fetch_all(pool)
        .await?;

        Ok(rows.iter().map(map_run_row).collect())
    }
}
