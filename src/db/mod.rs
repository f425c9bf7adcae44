mod clients;
pub(crate) mod row_helpers;
mod runs;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use sqlx::{sqlite::SqlitePoolOptions, Pool, Sqlite, Transaction};

use crate::models::*;
use crate::reconcile::ChangeSet;

pub use clients::ClientRepo;
pub use runs::RunRepo;

/// Typed error for "resource not found", downcast by the API error handler
#[derive(Debug)]
pub struct NotFoundError {
    pub resource: String,
    pub id: String,
}

impl NotFoundError {
    pub fn new(resource: &str, id: &str) -> Self {
        Self {
            resource: resource.to_string(),
            id: id.to_string(),
        }
    }
}

impl std::fmt::Display for NotFoundError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} not found: {}", self.resource, self.id)
    }
}

impl std::error::Error for NotFoundError {}

/// Whether an error was caused by another connection holding SQLite's write lock
pub fn is_lock_contention(err: &anyhow::Error) -> bool {
    err.chain().any(|cause| match cause.downcast_ref::<sqlx::Error>() {
        // SQLITE_BUSY and SQLITE_LOCKED, including their extended codes
        Some(sqlx::Error::Database(db)) => db
            .code()
            .and_then(|code| code.parse::<i32>().ok())
            .is_some_and(|code| matches!(code & 0xff, 5 | 6)),
        _ => false,
    })
}

/// Store handles all database operations, delegating to per-entity repo modules.
#[derive(Clone)]
pub struct Store {
    pool: Pool<Sqlite>,
}

impl Store {
    /// Create a new database store with a specific pool size.
    /// Accepts either a `sqlite:` URL or a plain file path.
    pub async fn with_pool_size(database_uri: &str, max_connections: u32) -> Result<Self> {
        let db_url = if database_uri.starts_with("sqlite:") {
            database_uri.to_string()
        } else {
            format!("sqlite:{}?mode=rwc", database_uri)
        };

        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect(&db_url)
            .await
            .context("Failed to connect to database")?;

        let store = Self { pool };
        store.migrate().await?;
        Ok(store)
    }

    /// Single-connection in-memory store
    #[cfg(test)]
    pub async fn in_memory() -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect("sqlite::memory:")
            .await
            .context("Failed to open in-memory database")?;

        let store = Self { pool };
        store.migrate().await?;
        Ok(store)
    }

    #[cfg(test)]
    pub(crate) fn pool(&self) -> &Pool<Sqlite> {
        &self.pool
    }

    /// Run database migrations
    async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .context("Failed to run database migrations")?;
        Ok(())
    }

    /// Open the single-writer transaction a reconciliation pass runs in.
    /// Claiming the lock row first takes SQLite's write lock, so a concurrent
    /// pass waits here instead of reading an inventory that is about to change.
    pub async fn begin_pass(&self, run_id: &str) -> Result<InventoryTx> {
        let mut tx = self.pool.begin().await.context("Failed to begin pass transaction")?;

        sqlx::query("UPDATE reconcile_lock SET holder = ?, acquired_at = ? WHERE id = 1")
            .bind(run_id)
            .bind(Utc::now())
            .execute(&mut *tx)
            .await
            .context("Failed to claim reconcile lock")?;

        Ok(InventoryTx { tx })
    }

    // ========== Client Operations ==========

    pub async fn list_clients(&self, include_retired: bool, limit: i32, offset: i32) -> Result<Vec<StoredClient>> {
        ClientRepo::list(&self.pool, include_retired, limit, offset).await
    }

    pub async fn get_client(&self, mac: &str) -> Result<StoredClient> {
        ClientRepo::get(&self.pool, mac)
            .await?
            .ok_or_else(|| NotFoundError::new("Client", mac).into())
    }

    pub async fn count_clients(&self) -> Result<i64> {
        ClientRepo::count(&self.pool).await
    }

    // ========== Run History Operations ==========

    pub async fn record_run(&self, run: &ReconcileRun) -> Result<()> {
        RunRepo::create(&self.pool, run).await
    }

    pub async fn list_runs(&self, limit: i32) -> Result<Vec<ReconcileRun>> {
        RunRepo::list(&self.pool, limit).await
    }
}

/// A fresh on-disk database path, for tests that need more than one connection
#[cfg(test)]
pub(crate) fn temp_database_path() -> String {
    std::env::temp_dir()
        .join(format!("clientparser-{}.db", uuid::Uuid::new_v4()))
        .to_string_lossy()
        .into_owned()
}

#[cfg(test)]
pub(crate) fn remove_database(path: &str) {
    for suffix in ["", "-wal", "-shm"] {
        let _ = std::fs::remove_file(format!("{}{}", path, suffix));
    }
}

/// The inventory as seen from inside one pass transaction.
/// Dropping it without `commit` rolls every write back.
pub struct InventoryTx {
    tx: Transaction<'static, Sqlite>,
}

impl InventoryTx {
    pub async fn current_inventory(&mut self) -> Result<Vec<StoredClient>> {
        ClientRepo::list_all(&mut *self.tx).await
    }

    /// Apply every write of a change set; the first failure stops the pass
    pub async fn apply_change_set(&mut self, changes: &ChangeSet, now: DateTime<Utc>) -> Result<()> {
        for record in &changes.inserts {
            ClientRepo::insert(&mut *self.tx, record, now)
                .await
                .with_context(|| format!("Failed to insert {}", record.mac))?;
        }
        for update in &changes.updates {
            ClientRepo::update(&mut *self.tx, &update.record, now)
                .await
                .with_context(|| format!("Failed to update {}", update.record.mac))?;
        }
        for mac in &changes.refreshes {
            ClientRepo::touch(&mut *self.tx, mac, now)
                .await
                .with_context(|| format!("Failed to refresh {}", mac))?;
        }
        for missed in &changes.missed {
            ClientRepo::record_miss(&mut *self.tx, &missed.mac, missed.missed_passes)
                .await
                .with_context(|| format!("Failed to record miss for {}", missed.mac))?;
        }
        for mac in &changes.retirements {
            ClientRepo::retire(&mut *self.tx, mac, now)
                .await
                .with_context(|| format!("Failed to retire {}", mac))?;
        }
        Ok(())
    }

    pub async fn commit(self) -> Result<()> {
        self.tx.commit().await.context("Failed to commit pass transaction")
    }

    pub async fn rollback(self) -> Result<()> {
        self.tx.rollback().await.context("Failed to roll back pass transaction")
    }
}
